//! Run configuration: a TOML file, `-S KEY=VALUE` overrides and command-line flags merged
//! over built-in defaults.

pub mod builder;
pub mod defaults;
pub mod file;
pub mod models;

pub use builder::{build_config, surface_spec};
pub use models::AppConfig;
