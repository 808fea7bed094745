//! Energy backends.
//!
//! A backend is constructed once, up front, and then asked for many energies. Two
//! distinct failure channels keep a long sweep alive while still failing fast on a
//! broken setup:
//!
//! - [`BackendUnavailable`] is raised by construction or [`EnergyBackend::prepare`]
//!   (missing executable, model that fails to load, missing pseudopotentials,
//!   unsupported task) and aborts the run.
//! - [`EvaluationError`] is raised by a single [`EnergyBackend::evaluate`] call and is
//!   recorded by the sampler as a missing point.

pub mod dft;
pub mod ml;
mod process;

use crate::core::models::element::Element;
use crate::core::models::structure::Structure;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BackendUnavailable {
    #[error("Executable '{0}' was not found")]
    ExecutableNotFound(String),

    #[error("Task '{task}' is not supported. Available: {available}")]
    UnsupportedTask { task: String, available: String },

    #[error("Pseudopotential directory '{}' does not exist", .0.display())]
    PseudoDirMissing(PathBuf),

    #[error("No pseudopotential found for element '{element}' (functional '{functional}')")]
    MissingPseudopotential { element: Element, functional: String },

    #[error("Pseudopotential file '{}' does not exist", .0.display())]
    PseudopotentialFileMissing(PathBuf),

    #[error("Invalid backend configuration: {0}")]
    InvalidConfiguration(String),

    #[error("ML predictor failed to start: {0}")]
    PredictorStartup(String),
}

#[derive(Debug, Error)]
pub enum EvaluationError {
    #[error("Failed to run '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Process exited with {status}: {stderr}")]
    ProcessFailed { status: String, stderr: String },

    #[error("Evaluation timed out after {0:?}")]
    Timeout(Duration),

    #[error("SCF convergence not achieved")]
    NotConverged,

    #[error("Could not read an energy from the output: {0}")]
    MalformedOutput(String),

    #[error("Predictor reported an error: {0}")]
    Rejected(String),

    #[error("Backend returned a non-finite energy ({0})")]
    NonFinite(f64),

    #[error("Structure has no periodic cell")]
    MissingCell,

    #[error("Failed to serialize structure: {0}")]
    Serialize(String),

    #[error(transparent)]
    Unavailable(#[from] BackendUnavailable),
}

/// Per-call knobs shared by every backend.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EvaluationOptions {
    /// A call running longer than this is killed and counted as a failed point.
    pub timeout: Option<Duration>,
}

/// A constructed energy evaluator, shared read-only by every sweep that uses it.
pub trait EnergyBackend: Send + Sync {
    /// Short family label used in logs.
    fn name(&self) -> &str;

    /// Task labels (ML) or functionals (DFT) this backend can evaluate under.
    fn tasks(&self) -> Vec<String>;

    fn supports(&self, task: &str) -> bool {
        self.tasks().iter().any(|t| t == task)
    }

    /// Checks, before any evaluation, that `task` can be evaluated for a system made of
    /// `elements`.
    fn prepare(&self, elements: &[Element], task: &str) -> Result<(), BackendUnavailable> {
        let _ = elements;
        if self.supports(task) {
            Ok(())
        } else {
            Err(BackendUnavailable::UnsupportedTask {
                task: task.to_string(),
                available: self.tasks().join(", "),
            })
        }
    }

    /// Total energy of `structure` in eV.
    fn evaluate(
        &self,
        structure: &Structure,
        elements: &[Element],
        task: &str,
        options: &EvaluationOptions,
    ) -> Result<f64, EvaluationError>;
}
