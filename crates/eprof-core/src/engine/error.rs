use thiserror::Error;

use super::backend::BackendUnavailable;
use super::config::ConfigError;
use super::grid::GridError;
use super::sink::SinkError;
use crate::core::surfaces::SurfaceError;
use crate::core::templates::TemplateError;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Template(#[from] TemplateError),

    #[error(transparent)]
    Surface(#[from] SurfaceError),

    #[error("Invalid height grid: {0}")]
    Grid(#[from] GridError),

    #[error("Backend for method '{method}' is unavailable: {source}")]
    BackendUnavailable {
        method: String,
        #[source]
        source: BackendUnavailable,
    },

    #[error("No {0} backend was supplied although the configuration requests one")]
    MissingBackend(&'static str),

    #[error("Method id '{0}' is registered more than once")]
    DuplicateMethod(String),

    #[error("Failed to persist results: {0}")]
    Sink(#[from] SinkError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}
