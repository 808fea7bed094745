use super::backend::{EnergyBackend, EvaluationOptions};
use super::config::SweepExecution;
use super::error::EngineError;
use super::grid::HeightGrid;
use super::profile::{EnergySeries, ProfileResult, SamplingRecord};
use super::progress::{Progress, ProgressReporter};
use crate::core::io::traits::StructureFile;
use crate::core::io::xyz::ExtXyzFile;
use crate::core::models::element::Element;
use crate::core::models::structure::Structure;
use crate::core::surfaces::Surface;
use crate::core::templates::TemplateLibrary;
use itertools::Itertools;
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument, warn};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// One method to sample: a backend, the task it is evaluated under and its heights.
pub struct BackendJob<'a> {
    pub method_id: String,
    pub backend: &'a dyn EnergyBackend,
    pub task: String,
    pub heights: HeightGrid,
}

impl<'a> BackendJob<'a> {
    pub fn new(
        method_id: impl Into<String>,
        backend: &'a dyn EnergyBackend,
        task: impl Into<String>,
        heights: HeightGrid,
    ) -> Self {
        Self {
            method_id: method_id.into(),
            backend,
            task: task.into(),
            heights,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct SamplerOptions {
    pub execution: SweepExecution,
    pub evaluation: EvaluationOptions,
    /// Write every sampled structure as `<method>_structure_h<height>.xyz` here.
    pub artifacts_dir: Option<PathBuf>,
}

/// The adsorbant being swept and the surface it is swept over.
pub struct SamplingTarget<'a> {
    pub templates: &'a TemplateLibrary,
    pub species: &'a str,
    pub orientation: &'a str,
    pub surface: &'a Surface,
}

/// Sweeps every job over its heights and collects the raw energy series.
///
/// Species, orientation and every backend are validated before the first evaluation;
/// any problem there is returned immediately. Afterwards a failed evaluation only turns
/// its own point into `NaN`.
///
/// # Errors
///
/// Returns [`EngineError`] for an unknown species, an invalid orientation, a duplicate
/// method id or a backend that cannot serve its task for this chemistry.
#[instrument(skip_all, name = "profile_sampler", fields(species = target.species))]
pub fn sample(
    target: &SamplingTarget,
    jobs: &[BackendJob],
    options: &SamplerOptions,
    reporter: &ProgressReporter,
) -> Result<ProfileResult, EngineError> {
    // === Setup checks: nothing below may evaluate an energy before these pass ===
    target
        .templates
        .validate(target.species, target.orientation)?;

    let mut seen = HashSet::new();
    if let Some(job) = jobs.iter().find(|j| !seen.insert(j.method_id.as_str())) {
        return Err(EngineError::DuplicateMethod(job.method_id.clone()));
    }

    let elements = system_elements(target)?;
    for job in jobs {
        job.backend
            .prepare(&elements, &job.task)
            .map_err(|source| EngineError::BackendUnavailable {
                method: job.method_id.clone(),
                source,
            })?;
    }

    // === Sweeps ===
    reporter.report(Progress::PhaseStart { name: "Sampling" });
    let total_points: usize = jobs.iter().map(|j| j.heights.len()).sum();
    info!(
        methods = jobs.len(),
        points = total_points,
        "Starting energy profile sweeps."
    );
    reporter.report(Progress::TaskStart {
        total_steps: total_points as u64,
    });

    let run_sweep = |job: &BackendJob| sweep(target, job, &elements, options, reporter);
    let sweeps: Vec<Result<EnergySeries, EngineError>> = match options.execution {
        SweepExecution::Sequential => jobs.iter().map(run_sweep).collect(),
        #[cfg(feature = "parallel")]
        SweepExecution::Parallel => jobs.par_iter().map(run_sweep).collect(),
        #[cfg(not(feature = "parallel"))]
        SweepExecution::Parallel => jobs.iter().map(run_sweep).collect(),
    };

    reporter.report(Progress::TaskFinish);

    let mut series = BTreeMap::new();
    for (job, result) in jobs.iter().zip(sweeps) {
        series.insert(job.method_id.clone(), result?);
    }

    let heights = jobs
        .iter()
        .flat_map(|j| j.heights.iter())
        .sorted_by(f64::total_cmp)
        .dedup_by(|a, b| (a - b).abs() < 1e-9)
        .collect();

    reporter.report(Progress::PhaseFinish);
    Ok(ProfileResult {
        species: target.species.to_string(),
        surface: target.surface.name().to_string(),
        heights,
        series,
        config: SamplingRecord {
            orientation: target.orientation.to_string(),
            range: None,
            dft_height_stride: None,
        },
    })
}

/// Unique elements of the surface followed by any new ones from the adsorbant.
fn system_elements(target: &SamplingTarget) -> Result<Vec<Element>, EngineError> {
    let adsorbant = target.templates.info(target.species)?.elements;
    Ok(target
        .surface
        .elements()
        .into_iter()
        .chain(adsorbant)
        .unique()
        .collect())
}

fn sweep(
    target: &SamplingTarget,
    job: &BackendJob,
    elements: &[Element],
    options: &SamplerOptions,
    reporter: &ProgressReporter,
) -> Result<EnergySeries, EngineError> {
    info!(
        method = %job.method_id,
        backend = job.backend.name(),
        task = %job.task,
        points = job.heights.len(),
        "Running sweep."
    );

    let mut energies = Vec::with_capacity(job.heights.len());
    for height in job.heights.iter() {
        let placement = target.surface.placement_point(height);
        let adsorbant = target
            .templates
            .get_template(target.species, &placement, target.orientation)?;
        let system = target.surface.structure().combined_with(&adsorbant);

        let energy = match job
            .backend
            .evaluate(&system, elements, &job.task, &options.evaluation)
        {
            Ok(e) if e.is_finite() => {
                debug!(method = %job.method_id, height, energy = e, "Point evaluated.");
                e
            }
            Ok(e) => {
                warn!(
                    method = %job.method_id,
                    height,
                    "Backend returned non-finite energy {e}; recording as missing."
                );
                f64::NAN
            }
            Err(err) => {
                warn!(method = %job.method_id, height, "Evaluation failed: {err}");
                f64::NAN
            }
        };
        energies.push(energy);

        if let Some(dir) = &options.artifacts_dir {
            save_artifact(dir, &job.method_id, height, &system);
        }
        reporter.report(Progress::TaskIncrement);
    }

    let series = EnergySeries::new(job.task.clone(), job.heights.heights().to_vec(), energies);
    if series.failed_count() > 0 {
        warn!(
            method = %job.method_id,
            failed = series.failed_count(),
            total = series.len(),
            "Sweep finished with missing points."
        );
    }
    Ok(series)
}

fn save_artifact(dir: &Path, method: &str, height: f64, system: &Structure) {
    let path = dir.join(format!("{method}_structure_h{height:.1}.xyz"));
    if let Err(e) = ExtXyzFile::write_to_path(system, &path) {
        warn!(path = %path.display(), "Could not save structure: {e}");
    }
}
