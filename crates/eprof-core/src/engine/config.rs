use super::backend::EvaluationOptions;
use super::backend::dft::DEFAULT_FUNCTIONAL;
use super::grid::HeightRange;
use crate::core::surfaces::SurfaceSpec;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum ConfigError {
    #[error("Missing required parameter: {0}")]
    MissingParameter(&'static str),

    #[error("Invalid value for '{parameter}': {reason}")]
    InvalidValue {
        parameter: &'static str,
        reason: String,
    },
}

/// How independent backend sweeps are scheduled. Heights within one sweep are always
/// evaluated in ascending order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SweepExecution {
    #[default]
    Sequential,
    /// One sweep per worker thread; results are identical to sequential execution.
    Parallel,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MlSettings {
    /// Each task becomes its own method id.
    pub tasks: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DftSettings {
    pub functional: String,
    /// DFT samples every `height_stride`-th height of the main grid.
    pub height_stride: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OutputSettings {
    pub directory: PathBuf,
    pub save_structures: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProfileConfig {
    pub species: String,
    /// `None` selects the species' first declared orientation.
    pub orientation: Option<String>,
    pub surface: SurfaceSpec,
    pub range: HeightRange,
    pub ml: Option<MlSettings>,
    pub dft: Option<DftSettings>,
    /// `None` keeps the result in memory only.
    pub output: Option<OutputSettings>,
    pub execution: SweepExecution,
    pub evaluation: EvaluationOptions,
}

#[derive(Default)]
pub struct ProfileConfigBuilder {
    species: Option<String>,
    orientation: Option<String>,
    surface: Option<SurfaceSpec>,
    range: Option<HeightRange>,
    ml_tasks: Option<Vec<String>>,
    dft_functional: Option<String>,
    dft_height_stride: Option<usize>,
    output_directory: Option<PathBuf>,
    save_structures: bool,
    execution: SweepExecution,
    timeout: Option<Duration>,
}

impl ProfileConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn species(mut self, species: impl Into<String>) -> Self {
        self.species = Some(species.into());
        self
    }
    pub fn orientation(mut self, orientation: impl Into<String>) -> Self {
        self.orientation = Some(orientation.into());
        self
    }
    pub fn surface(mut self, surface: SurfaceSpec) -> Self {
        self.surface = Some(surface);
        self
    }
    pub fn height_range(mut self, start: f64, end: f64, step: f64) -> Self {
        self.range = Some(HeightRange::new(start, end, step));
        self
    }
    pub fn ml_tasks<I, S>(mut self, tasks: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ml_tasks = Some(tasks.into_iter().map(Into::into).collect());
        self
    }
    pub fn dft_functional(mut self, functional: impl Into<String>) -> Self {
        self.dft_functional = Some(functional.into());
        self
    }
    pub fn dft_height_stride(mut self, stride: usize) -> Self {
        self.dft_height_stride = Some(stride);
        self
    }
    pub fn output_directory(mut self, directory: impl Into<PathBuf>) -> Self {
        self.output_directory = Some(directory.into());
        self
    }
    pub fn save_structures(mut self, save: bool) -> Self {
        self.save_structures = save;
        self
    }
    pub fn execution(mut self, execution: SweepExecution) -> Self {
        self.execution = execution;
        self
    }
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// # Errors
    ///
    /// Species, surface and height range are required, at least one method family must
    /// be enabled and ML tasks must be non-empty and unique.
    pub fn build(self) -> Result<ProfileConfig, ConfigError> {
        let ml = self
            .ml_tasks
            .map(|tasks| {
                if tasks.is_empty() {
                    return Err(ConfigError::InvalidValue {
                        parameter: "ml_tasks",
                        reason: "at least one task is required".to_string(),
                    });
                }
                if let Some(dup) = tasks.iter().enumerate().find_map(|(i, t)| {
                    tasks[..i].contains(t).then_some(t)
                }) {
                    return Err(ConfigError::InvalidValue {
                        parameter: "ml_tasks",
                        reason: format!("task '{dup}' is listed twice"),
                    });
                }
                Ok(MlSettings { tasks })
            })
            .transpose()?;

        let dft = match (self.dft_functional, self.dft_height_stride) {
            (None, None) => None,
            (functional, stride) => {
                let height_stride = stride.unwrap_or(1);
                if height_stride == 0 {
                    return Err(ConfigError::InvalidValue {
                        parameter: "dft_height_stride",
                        reason: "must be at least 1".to_string(),
                    });
                }
                Some(DftSettings {
                    functional: functional.unwrap_or_else(|| DEFAULT_FUNCTIONAL.to_string()),
                    height_stride,
                })
            }
        };

        if ml.is_none() && dft.is_none() {
            return Err(ConfigError::MissingParameter("ml_tasks or dft_functional"));
        }

        Ok(ProfileConfig {
            species: self
                .species
                .ok_or(ConfigError::MissingParameter("species"))?,
            orientation: self.orientation,
            surface: self
                .surface
                .ok_or(ConfigError::MissingParameter("surface"))?,
            range: self
                .range
                .ok_or(ConfigError::MissingParameter("height_range"))?,
            ml,
            dft,
            output: self.output_directory.map(|directory| OutputSettings {
                directory,
                save_structures: self.save_structures,
            }),
            execution: self.execution,
            evaluation: EvaluationOptions {
                timeout: self.timeout,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn surface() -> SurfaceSpec {
        SurfaceSpec::TwoD {
            material: "graphene".to_string(),
            size: [3, 3],
            vacuum: 14.0,
        }
    }

    #[test]
    fn builds_complete_config() {
        let config = ProfileConfigBuilder::new()
            .species("H2O")
            .orientation("flat")
            .surface(surface())
            .height_range(2.0, 8.0, 0.2)
            .ml_tasks(["omat", "omc"])
            .dft_functional("pbe")
            .dft_height_stride(2)
            .output_directory("./results")
            .save_structures(true)
            .timeout(Duration::from_secs(600))
            .build()
            .unwrap();
        assert_eq!(config.ml.unwrap().tasks, vec!["omat", "omc"]);
        assert_eq!(config.dft.unwrap().height_stride, 2);
        assert!(config.output.unwrap().save_structures);
        assert_eq!(config.evaluation.timeout, Some(Duration::from_secs(600)));
        assert_eq!(config.execution, SweepExecution::Sequential);
    }

    #[test]
    fn missing_species_is_reported() {
        let err = ProfileConfigBuilder::new()
            .surface(surface())
            .height_range(2.0, 8.0, 0.2)
            .ml_tasks(["omat"])
            .build()
            .unwrap_err();
        assert_eq!(err, ConfigError::MissingParameter("species"));
    }

    #[test]
    fn at_least_one_method_family_is_required() {
        let err = ProfileConfigBuilder::new()
            .species("H")
            .surface(surface())
            .height_range(2.0, 8.0, 0.2)
            .build()
            .unwrap_err();
        assert!(matches!(err, ConfigError::MissingParameter(_)));
    }

    #[test]
    fn dft_defaults_to_pbe_on_every_height() {
        let config = ProfileConfigBuilder::new()
            .species("H")
            .surface(surface())
            .height_range(2.0, 4.0, 1.0)
            .dft_height_stride(1)
            .build()
            .unwrap();
        let dft = config.dft.unwrap();
        assert_eq!(dft.functional, "pbe");
        assert_eq!(dft.height_stride, 1);
        assert!(config.ml.is_none());
        assert!(config.output.is_none());
    }

    #[test]
    fn invalid_method_settings_are_rejected() {
        let base = || {
            ProfileConfigBuilder::new()
                .species("H")
                .surface(surface())
                .height_range(2.0, 4.0, 1.0)
        };
        assert!(matches!(
            base().ml_tasks(["omat", "omat"]).build(),
            Err(ConfigError::InvalidValue { parameter: "ml_tasks", .. })
        ));
        assert!(matches!(
            base().ml_tasks(Vec::<String>::new()).build(),
            Err(ConfigError::InvalidValue { parameter: "ml_tasks", .. })
        ));
        assert!(matches!(
            base().dft_height_stride(0).build(),
            Err(ConfigError::InvalidValue { parameter: "dft_height_stride", .. })
        ));
    }
}
