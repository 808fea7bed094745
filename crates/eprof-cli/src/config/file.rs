use crate::error::{CliError, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct FileSurfaceConfig {
    pub material: Option<String>,
    pub miller: Option<Vec<i32>>,
    pub size: Option<Vec<usize>>,
    pub vacuum: Option<f64>,
    pub crystal_structure: Option<String>,
    pub lattice_constant: Option<f64>,
    pub file: Option<PathBuf>,
}

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct FileAdsorbantConfig {
    pub species: Option<String>,
    pub orientation: Option<String>,
    pub custom_species: Option<PathBuf>,
}

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct FileSamplingConfig {
    pub z_start: Option<f64>,
    pub z_end: Option<f64>,
    pub z_step: Option<f64>,
    pub parallel: Option<bool>,
    pub timeout_secs: Option<u64>,
}

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct FileMlConfig {
    pub enabled: Option<bool>,
    pub command: Option<String>,
    pub args: Option<Vec<String>>,
    pub model: Option<String>,
    pub device: Option<String>,
    pub tasks: Option<Vec<String>>,
    pub startup_timeout_secs: Option<u64>,
}

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct FileDftConfig {
    pub enabled: Option<bool>,
    pub functional: Option<String>,
    pub height_stride: Option<usize>,
    pub pseudo_dir: Option<PathBuf>,
    pub num_cores: Option<usize>,
    /// An empty string runs the executable without an MPI launcher.
    pub launcher: Option<String>,
    pub executable: Option<String>,
    pub work_dir: Option<PathBuf>,
    pub keep_outputs: Option<bool>,
    pub ecutwfc: Option<f64>,
    pub ecutrho: Option<f64>,
    pub smearing: Option<String>,
    pub degauss: Option<f64>,
    pub vdw_corr: Option<String>,
    pub conv_thr: Option<f64>,
    pub kpts: Option<[u32; 3]>,
    /// Element symbol to file name, consulted before the built-in table.
    pub pseudopotentials: Option<BTreeMap<String, String>>,
}

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct FileOutputConfig {
    pub directory: Option<PathBuf>,
    pub save_structures: Option<bool>,
}

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub surface: Option<FileSurfaceConfig>,
    pub adsorbant: Option<FileAdsorbantConfig>,
    pub sampling: Option<FileSamplingConfig>,
    pub ml: Option<FileMlConfig>,
    pub dft: Option<FileDftConfig>,
    pub output: Option<FileOutputConfig>,
}

impl FileConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        debug!("Loading configuration from file: {:?}", path);
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content).map_err(|e| match e {
            CliError::FileParsing { source, .. } => CliError::FileParsing {
                path: path.to_path_buf(),
                source,
            },
            other => other,
        })
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| CliError::FileParsing {
            path: PathBuf::from("<inline>"),
            source: e.into(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn parses_every_section() {
        let config = FileConfig::from_toml(
            r#"
            [surface]
            material = "Pt"
            miller = [1, 0, 0]
            size = [2, 2, 3]
            vacuum = 12.0

            [adsorbant]
            species = "CO"
            orientation = "c_down"

            [sampling]
            z-start = 1.5
            z-end = 5.0
            z-step = 0.5
            parallel = true

            [ml]
            command = "predict-energy"
            tasks = ["omat"]

            [dft]
            pseudo-dir = "/opt/pseudo"
            height-stride = 3
            kpts = [4, 4, 1]
            pseudopotentials = { Pt = "pt_pbe_v1.4.uspp.F.UPF" }

            [output]
            directory = "out"
            save-structures = false
            "#,
        )
        .unwrap();

        let surface = config.surface.unwrap();
        assert_eq!(surface.miller, Some(vec![1, 0, 0]));
        assert_eq!(surface.size, Some(vec![2, 2, 3]));
        assert_eq!(config.sampling.unwrap().z_start, Some(1.5));
        assert_eq!(config.ml.unwrap().tasks, Some(vec!["omat".to_string()]));
        let dft = config.dft.unwrap();
        assert_eq!(dft.height_stride, Some(3));
        assert_eq!(dft.kpts, Some([4, 4, 1]));
        assert_eq!(dft.pseudopotentials.unwrap()["Pt"], "pt_pbe_v1.4.uspp.F.UPF");
        assert_eq!(config.output.unwrap().save_structures, Some(false));
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let result = FileConfig::from_toml("[sampling]\nz-begin = 2.0\n");
        assert!(matches!(result, Err(CliError::FileParsing { .. })));
    }

    #[test]
    fn parse_errors_carry_the_file_path() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("broken.toml");
        fs::write(&path, "[surface\nmaterial = 1").unwrap();
        match FileConfig::from_file(&path) {
            Err(CliError::FileParsing { path: p, .. }) => assert_eq!(p, path),
            other => panic!("Expected a parsing error, got {other:?}"),
        }
    }

    #[test]
    fn missing_file_is_io_error() {
        let result = FileConfig::from_file(Path::new("/no/such/eprof.toml"));
        assert!(matches!(result, Err(CliError::Io(_))));
    }
}
