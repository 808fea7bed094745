use super::profile::ProfileResult;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("I/O error for '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON error for '{path}': {source}")]
    Json {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("CSV error for '{path}': {source}")]
    Csv {
        path: String,
        #[source]
        source: csv::Error,
    },
}

/// Files written by [`persist`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistedPaths {
    pub json: PathBuf,
    pub csv: PathBuf,
}

/// `<species>_<surface>_profile`, the stem shared by both output files.
pub fn file_stem(species: &str, surface: &str) -> String {
    format!("{species}_{surface}_profile")
}

/// Writes `result` into `directory` as a full JSON document and a wide CSV table.
///
/// The CSV has one row per height of the union grid and, per method, a normalized
/// column named after the method and a `<method>_raw` column. Heights a method did not
/// sample, and failed points, are left empty.
pub fn persist(result: &ProfileResult, directory: &Path) -> Result<PersistedPaths, SinkError> {
    fs::create_dir_all(directory).map_err(|source| SinkError::Io {
        path: directory.to_string_lossy().to_string(),
        source,
    })?;
    let stem = file_stem(&result.species, &result.surface);
    let paths = PersistedPaths {
        json: directory.join(format!("{stem}.json")),
        csv: directory.join(format!("{stem}.csv")),
    };
    write_json(result, &paths.json)?;
    write_csv(result, &paths.csv)?;
    info!(
        json = %paths.json.display(),
        csv = %paths.csv.display(),
        "Results saved."
    );
    Ok(paths)
}

/// Reads a profile previously written by [`persist`].
pub fn load_json(path: &Path) -> Result<ProfileResult, SinkError> {
    let display = path.to_string_lossy().to_string();
    let file = File::open(path).map_err(|source| SinkError::Io {
        path: display.clone(),
        source,
    })?;
    serde_json::from_reader(BufReader::new(file)).map_err(|source| SinkError::Json {
        path: display,
        source,
    })
}

fn write_json(result: &ProfileResult, path: &Path) -> Result<(), SinkError> {
    let display = path.to_string_lossy().to_string();
    let io_err = |source| SinkError::Io {
        path: display.clone(),
        source,
    };
    let mut writer = BufWriter::new(File::create(path).map_err(io_err)?);
    serde_json::to_writer_pretty(&mut writer, result).map_err(|source| SinkError::Json {
        path: display.clone(),
        source,
    })?;
    writer.write_all(b"\n").map_err(io_err)?;
    writer.flush().map_err(io_err)
}

fn write_csv(result: &ProfileResult, path: &Path) -> Result<(), SinkError> {
    let csv_err = |source| SinkError::Csv {
        path: path.to_string_lossy().to_string(),
        source,
    };
    let mut writer = csv::Writer::from_path(path).map_err(csv_err)?;

    let mut header = vec!["height".to_string()];
    for method in result.methods() {
        header.push(method.to_string());
        header.push(format!("{method}_raw"));
    }
    writer.write_record(&header).map_err(csv_err)?;

    let cell = |value: Option<f64>| match value {
        Some(v) if v.is_finite() => v.to_string(),
        _ => String::new(),
    };
    for &height in &result.heights {
        let mut row = vec![height.to_string()];
        for series in result.series.values() {
            let index = series
                .heights
                .iter()
                .position(|&h| (h - height).abs() < 1e-9);
            row.push(cell(index.map(|i| series.energies[i])));
            row.push(cell(index.map(|i| series.raw[i])));
        }
        writer.write_record(&row).map_err(csv_err)?;
    }
    writer.flush().map_err(|source| SinkError::Io {
        path: path.to_string_lossy().to_string(),
        source,
    })
}
