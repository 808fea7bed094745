use eprof::engine::backend::dft::DftConfig;
use eprof::engine::backend::ml::MlConfig;
use eprof::engine::config::ProfileConfig;
use std::path::PathBuf;

/// Everything `eprof run` needs: the engine configuration plus how to construct the
/// backends it asks for.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub profile: ProfileConfig,
    pub custom_species: Option<PathBuf>,
    /// Present exactly when the profile enables ML.
    pub ml: Option<MlConfig>,
    /// Present exactly when the profile enables DFT.
    pub dft: Option<DftConfig>,
}
