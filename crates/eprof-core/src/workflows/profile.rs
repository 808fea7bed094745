use crate::core::surfaces::build_surface;
use crate::core::templates::TemplateLibrary;
use crate::engine::analysis::BindingSummary;
use crate::engine::backend::EnergyBackend;
use crate::engine::config::ProfileConfig;
use crate::engine::error::EngineError;
use crate::engine::normalize::normalize_profile;
use crate::engine::profile::ProfileResult;
use crate::engine::progress::{Progress, ProgressReporter};
use crate::engine::sampler::{self, BackendJob, SamplerOptions, SamplingTarget};
use crate::engine::sink::{self, PersistedPaths, SinkError};
use std::fmt;
use tracing::{info, instrument};

pub const DFT_METHOD_ID: &str = "dft";

const ML_MINUTES_PER_POINT: f64 = 0.5;
const DFT_MINUTES_PER_POINT: f64 = 5.0;

/// Already-constructed backends, one per method family.
#[derive(Default, Clone, Copy)]
pub struct ProfileBackends<'a> {
    pub ml: Option<&'a dyn EnergyBackend>,
    pub dft: Option<&'a dyn EnergyBackend>,
}

/// Rough wall-time estimate for a run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CostEstimate {
    pub ml_minutes: f64,
    pub dft_minutes: f64,
}

impl CostEstimate {
    pub fn new(ml_points: usize, dft_points: usize) -> Self {
        Self {
            ml_minutes: ml_points as f64 * ML_MINUTES_PER_POINT,
            dft_minutes: dft_points as f64 * DFT_MINUTES_PER_POINT,
        }
    }

    pub fn total_minutes(&self) -> f64 {
        self.ml_minutes + self.dft_minutes
    }
}

impl fmt::Display for CostEstimate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.dft_minutes > 0.0 {
            write!(
                f,
                "~{:.0} min ({:.0} min ML + {:.0} min DFT)",
                self.total_minutes(),
                self.ml_minutes,
                self.dft_minutes
            )
        } else {
            write!(f, "~{:.0} min (ML only)", self.total_minutes())
        }
    }
}

#[derive(Debug, Clone)]
pub struct ProfileRun {
    /// Normalized profile.
    pub result: ProfileResult,
    pub summary: BindingSummary,
    pub estimate: CostEstimate,
    pub saved: Option<PersistedPaths>,
}

#[instrument(skip_all, name = "energy_profile_workflow")]
pub fn run(
    config: &ProfileConfig,
    templates: &TemplateLibrary,
    backends: ProfileBackends,
    reporter: &ProgressReporter,
) -> Result<ProfileRun, EngineError> {
    // === Phase 0: Setup ===
    reporter.report(Progress::PhaseStart { name: "Setup" });
    let surface = build_surface(&config.surface)?;
    let orientation = match &config.orientation {
        Some(o) => o.clone(),
        None => templates.default_orientation(&config.species)?.to_string(),
    };
    templates.validate(&config.species, &orientation)?;

    let grid = config.range.to_grid()?;
    let dft_grid = config
        .dft
        .as_ref()
        .map(|dft| grid.every(dft.height_stride))
        .transpose()?;

    let mut jobs = Vec::new();
    if let Some(ml) = &config.ml {
        let backend = backends.ml.ok_or(EngineError::MissingBackend("ML"))?;
        for task in &ml.tasks {
            jobs.push(BackendJob::new(task, backend, task, grid.clone()));
        }
    }
    if let (Some(dft), Some(heights)) = (&config.dft, &dft_grid) {
        let backend = backends.dft.ok_or(EngineError::MissingBackend("DFT"))?;
        jobs.push(BackendJob::new(
            DFT_METHOD_ID,
            backend,
            &dft.functional,
            heights.clone(),
        ));
    }

    let artifacts_dir = match &config.output {
        Some(output) if output.save_structures => {
            std::fs::create_dir_all(&output.directory).map_err(|source| SinkError::Io {
                path: output.directory.to_string_lossy().to_string(),
                source,
            })?;
            Some(output.directory.clone())
        }
        _ => None,
    };

    info!(
        species = %config.species,
        surface = surface.name(),
        orientation = %orientation,
        points = grid.len(),
        "Energy profile setup complete. Placement over ({:.3}, {:.3}).",
        surface.center_xy().0,
        surface.center_xy().1
    );
    reporter.report(Progress::PhaseFinish);

    // === Phase 1: Cost estimate ===
    let ml_points = if config.ml.is_some() { grid.len() } else { 0 };
    let estimate = CostEstimate::new(ml_points, dft_grid.as_ref().map_or(0, |g| g.len()));
    info!("Estimated time: {estimate}");
    reporter.report(Progress::Message(format!("Estimated time: {estimate}")));

    // === Phase 2: Sampling ===
    let target = SamplingTarget {
        templates,
        species: &config.species,
        orientation: &orientation,
        surface: &surface,
    };
    let options = SamplerOptions {
        execution: config.execution,
        evaluation: config.evaluation.clone(),
        artifacts_dir,
    };
    let mut result = sampler::sample(&target, &jobs, &options, reporter)?;
    result.config.range = Some(config.range);
    result.config.dft_height_stride = config.dft.as_ref().map(|d| d.height_stride);

    // === Phase 3: Normalization ===
    reporter.report(Progress::PhaseStart {
        name: "Normalization",
    });
    normalize_profile(&mut result);
    reporter.report(Progress::PhaseFinish);

    // === Phase 4: Persistence ===
    let saved = match &config.output {
        Some(output) => {
            reporter.report(Progress::PhaseStart { name: "Saving" });
            let paths = sink::persist(&result, &output.directory)?;
            reporter.report(Progress::PhaseFinish);
            Some(paths)
        }
        None => None,
    };

    // === Phase 5: Analysis ===
    let summary = BindingSummary::from_profile(&result);
    for (method, s) in &summary.methods {
        info!(
            method = %method,
            binding_energy = s.binding_energy,
            optimal_height = s.optimal_height,
            "Binding statistics."
        );
    }

    info!("Energy profile calculation completed.");
    Ok(ProfileRun {
        result,
        summary,
        estimate,
        saved,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::element::Element;
    use crate::core::models::structure::Structure;
    use crate::core::surfaces::SurfaceSpec;
    use crate::engine::backend::{EvaluationError, EvaluationOptions};
    use crate::engine::config::ProfileConfigBuilder;
    use std::sync::Mutex;
    use tempfile::tempdir;

    /// Energy depends only on the z of the last (adsorbant) atom.
    struct Stub {
        tasks: Vec<String>,
        fail: bool,
        heights: Mutex<Vec<f64>>,
    }

    impl Stub {
        fn new(tasks: &[&str], fail: bool) -> Self {
            Self {
                tasks: tasks.iter().map(|t| t.to_string()).collect(),
                fail,
                heights: Mutex::new(Vec::new()),
            }
        }
    }

    impl EnergyBackend for Stub {
        fn name(&self) -> &str {
            "stub"
        }

        fn tasks(&self) -> Vec<String> {
            self.tasks.clone()
        }

        fn evaluate(
            &self,
            structure: &Structure,
            _elements: &[Element],
            _task: &str,
            _options: &EvaluationOptions,
        ) -> Result<f64, EvaluationError> {
            let z = structure.atoms().last().unwrap().position.z;
            self.heights.lock().unwrap().push(z);
            if self.fail {
                Err(EvaluationError::NotConverged)
            } else {
                Ok(-100.0 / z)
            }
        }
    }

    fn graphene() -> SurfaceSpec {
        SurfaceSpec::TwoD {
            material: "graphene".to_string(),
            size: [2, 2],
            vacuum: 10.0,
        }
    }

    #[test]
    fn cost_estimate_matches_rough_per_point_costs() {
        assert_eq!(
            CostEstimate::new(31, 15).to_string(),
            "~90 min (16 min ML + 75 min DFT)"
        );
        assert_eq!(CostEstimate::new(31, 0).to_string(), "~16 min (ML only)");
    }

    #[test]
    fn ml_and_dft_run_on_their_own_grids() {
        let ml = Stub::new(&["omat", "omc"], false);
        let dft = Stub::new(&["pbe"], false);
        let config = ProfileConfigBuilder::new()
            .species("H")
            .surface(graphene())
            .height_range(2.0, 4.0, 0.5)
            .ml_tasks(["omat", "omc"])
            .dft_functional("pbe")
            .dft_height_stride(2)
            .build()
            .unwrap();
        let backends = ProfileBackends {
            ml: Some(&ml),
            dft: Some(&dft),
        };
        let run = run(&config, &TemplateLibrary::new(), backends, &ProgressReporter::new()).unwrap();

        let result = &run.result;
        assert_eq!(result.series["omat"].len(), 5);
        assert_eq!(result.series["omc"].len(), 5);
        assert_eq!(result.series["dft"].heights, vec![2.0, 3.0, 4.0]);
        assert_eq!(result.series["dft"].task, "pbe");
        assert_eq!(result.config.orientation, "default");
        assert_eq!(result.config.dft_height_stride, Some(2));
        assert_eq!(result.series["omat"].energies[4], 0.0);
        assert_eq!(run.summary.methods["dft"].optimal_height, 2.0);
        assert!(run.saved.is_none());
        assert_eq!(ml.heights.lock().unwrap().len(), 10);
        assert_eq!(dft.heights.lock().unwrap().len(), 3);
    }

    #[test]
    fn failed_dft_sweep_still_returns_a_result() {
        let ml = Stub::new(&["omat"], false);
        let dft = Stub::new(&["pbe"], true);
        let config = ProfileConfigBuilder::new()
            .species("O")
            .surface(graphene())
            .height_range(2.0, 3.0, 0.5)
            .ml_tasks(["omat"])
            .dft_height_stride(1)
            .build()
            .unwrap();
        let backends = ProfileBackends {
            ml: Some(&ml),
            dft: Some(&dft),
        };
        let run = run(&config, &TemplateLibrary::new(), backends, &ProgressReporter::new()).unwrap();
        assert_eq!(run.result.series["dft"].missing_fraction(), 1.0);
        assert_eq!(run.summary.failed, vec!["dft".to_string()]);
        assert!(run.summary.methods.contains_key("omat"));
    }

    #[test]
    fn requested_family_without_backend_is_an_error() {
        let config = ProfileConfigBuilder::new()
            .species("H")
            .surface(graphene())
            .height_range(2.0, 3.0, 0.5)
            .dft_height_stride(1)
            .build()
            .unwrap();
        let err = run(
            &config,
            &TemplateLibrary::new(),
            ProfileBackends::default(),
            &ProgressReporter::new(),
        )
        .unwrap_err();
        assert!(matches!(err, EngineError::MissingBackend("DFT")));
    }

    #[test]
    fn unknown_species_is_rejected_during_setup() {
        let ml = Stub::new(&["omat"], false);
        let config = ProfileConfigBuilder::new()
            .species("Unobtainium")
            .surface(graphene())
            .height_range(2.0, 3.0, 0.5)
            .ml_tasks(["omat"])
            .build()
            .unwrap();
        let backends = ProfileBackends {
            ml: Some(&ml),
            dft: None,
        };
        let err = run(&config, &TemplateLibrary::new(), backends, &ProgressReporter::new())
            .unwrap_err();
        assert!(matches!(err, EngineError::Template(_)));
        assert!(ml.heights.lock().unwrap().is_empty());
    }

    #[test]
    fn output_directory_receives_results_and_structures() {
        let dir = tempdir().unwrap();
        let ml = Stub::new(&["omat"], false);
        let config = ProfileConfigBuilder::new()
            .species("CO")
            .orientation("c_down")
            .surface(graphene())
            .height_range(2.0, 3.0, 1.0)
            .ml_tasks(["omat"])
            .output_directory(dir.path())
            .save_structures(true)
            .build()
            .unwrap();
        let backends = ProfileBackends {
            ml: Some(&ml),
            dft: None,
        };
        let run = run(&config, &TemplateLibrary::new(), backends, &ProgressReporter::new()).unwrap();

        let saved = run.saved.unwrap();
        assert!(saved.json.ends_with("CO_graphene_profile.json"));
        assert!(saved.csv.is_file());
        assert!(dir.path().join("omat_structure_h2.0.xyz").is_file());
        assert!(dir.path().join("omat_structure_h3.0.xyz").is_file());

        let loaded = sink::load_json(&saved.json).unwrap();
        assert_eq!(loaded.config.range, Some(config.range));
        assert_eq!(loaded.series["omat"].energies[1], 0.0);
    }
}
