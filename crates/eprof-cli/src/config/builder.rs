use super::defaults::DefaultsConfig;
use super::file::{FileConfig, FileDftConfig, FileSurfaceConfig};
use super::models::AppConfig;
use crate::cli::{RunArgs, SurfaceArgs};
use crate::error::{CliError, Result};
use eprof::core::surfaces::SurfaceSpec;
use eprof::core::surfaces::crystal::CrystalStructure;
use eprof::core::surfaces::layered::list_layer_materials;
use eprof::engine::backend::dft::{DftConfig, DftParameters};
use eprof::engine::backend::ml::MlConfig;
use eprof::engine::config::{ProfileConfigBuilder, SweepExecution};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

const DFT_WORK_SUBDIR: &str = "dft";

pub fn build_config(args: &RunArgs) -> Result<AppConfig> {
    let defaults = DefaultsConfig::default();

    let file_config = if let Some(config_path) = &args.config {
        FileConfig::from_file(config_path)?
    } else {
        FileConfig::default()
    };

    let mut file_config = apply_set_values(file_config, &args.set_values)?;

    let surface_file = file_config.surface.take().unwrap_or_default();
    let surface = surface_spec(&args.surface, &surface_file, &defaults)?;

    let adsorbant_file = file_config.adsorbant.take().unwrap_or_default();
    let species = args.species.clone().or(adsorbant_file.species).ok_or_else(|| {
        CliError::Config(
            "An adsorbant species is required via `--species` or `adsorbant.species`.".to_string(),
        )
    })?;
    let orientation = args.orientation.clone().or(adsorbant_file.orientation);
    let custom_species = args
        .custom_species
        .clone()
        .or(adsorbant_file.custom_species);

    let sampling_file = file_config.sampling.take().unwrap_or_default();
    let z_start = args
        .z_start
        .or(sampling_file.z_start)
        .unwrap_or(defaults.z_start);
    let z_end = args.z_end.or(sampling_file.z_end).unwrap_or(defaults.z_end);
    let z_step = args
        .z_step
        .or(sampling_file.z_step)
        .unwrap_or(defaults.z_step);
    let execution = if args.parallel || sampling_file.parallel.unwrap_or(false) {
        SweepExecution::Parallel
    } else {
        SweepExecution::Sequential
    };

    let output_file = file_config.output.take().unwrap_or_default();
    let output_directory = args
        .output_dir
        .clone()
        .or(output_file.directory)
        .unwrap_or(defaults.output_directory.clone());
    let save_structures = !args.no_save_structures
        && output_file
            .save_structures
            .unwrap_or(defaults.save_structures);

    let ml_file = file_config.ml.take().unwrap_or_default();
    let dft_file = file_config.dft.take().unwrap_or_default();
    let (use_ml, use_dft) = match (args.methods.ml_only, args.methods.dft_only) {
        (true, _) => (true, false),
        (_, true) => (false, true),
        _ => (
            ml_file.enabled.unwrap_or(defaults.use_ml),
            dft_file.enabled.unwrap_or(defaults.use_dft),
        ),
    };

    let mut builder = ProfileConfigBuilder::new()
        .species(species)
        .surface(surface)
        .height_range(z_start, z_end, z_step)
        .execution(execution)
        .output_directory(output_directory.clone())
        .save_structures(save_structures);
    if let Some(orientation) = orientation {
        builder = builder.orientation(orientation);
    }
    if let Some(secs) = args.timeout.or(sampling_file.timeout_secs) {
        builder = builder.timeout(Duration::from_secs(secs));
    }

    let ml = if use_ml {
        let tasks = args
            .ml_tasks
            .clone()
            .or(ml_file.tasks)
            .unwrap_or_else(|| defaults.ml_tasks.clone());
        let command = args.ml_command.clone().or(ml_file.command).ok_or_else(|| {
            CliError::Config(
                "The ML backend needs a predictor command via `--ml-command` or `ml.command` (use `--dft-only` to skip ML).".to_string(),
            )
        })?;
        builder = builder.ml_tasks(tasks.clone());

        let mut config = MlConfig::new(command);
        config.args = ml_file.args.unwrap_or_default();
        config.model = args
            .ml_model
            .clone()
            .or(ml_file.model)
            .unwrap_or_else(|| defaults.ml_model.clone());
        config.device = args
            .ml_device
            .clone()
            .or(ml_file.device)
            .unwrap_or_else(|| defaults.ml_device.clone());
        config.tasks = tasks;
        if let Some(secs) = ml_file.startup_timeout_secs {
            config.startup_timeout = Some(Duration::from_secs(secs));
        }
        Some(config)
    } else {
        None
    };

    let dft = if use_dft {
        let functional = args
            .dft_functional
            .clone()
            .or(dft_file.functional.clone())
            .unwrap_or_else(|| defaults.dft_functional.clone());
        let stride = args
            .dft_stride
            .or(dft_file.height_stride)
            .unwrap_or(defaults.dft_height_stride);
        builder = builder.dft_functional(functional).dft_height_stride(stride);
        Some(dft_config(args, dft_file, &output_directory)?)
    } else {
        None
    };

    let profile = builder
        .build()
        .map_err(|e| CliError::Config(e.to_string()))?;

    Ok(AppConfig {
        profile,
        custom_species,
        ml,
        dft,
    })
}

fn dft_config(args: &RunArgs, file: FileDftConfig, output_directory: &Path) -> Result<DftConfig> {
    let pseudo_dir = args.pseudo_dir.clone().or(file.pseudo_dir).ok_or_else(|| {
        CliError::Config(
            "DFT needs a pseudopotential directory via `--pseudo-dir` or `dft.pseudo-dir` (use `--ml-only` to skip DFT).".to_string(),
        )
    })?;

    let mut config = DftConfig::new(pseudo_dir);
    if let Some(cores) = args.dft_cores.or(file.num_cores) {
        config.num_cores = cores;
    }
    if let Some(launcher) = file.launcher {
        config.launcher = (!launcher.is_empty()).then_some(launcher);
    }
    if let Some(executable) = file.executable {
        config.executable = executable;
    }
    config.work_dir = file
        .work_dir
        .unwrap_or_else(|| output_directory.join(DFT_WORK_SUBDIR));
    if let Some(keep) = file.keep_outputs {
        config.keep_outputs = keep;
    }
    config.custom_pseudopotentials = file.pseudopotentials.unwrap_or_default();

    let defaults = DftParameters::default();
    config.parameters = DftParameters {
        ecutwfc: file.ecutwfc.unwrap_or(defaults.ecutwfc),
        ecutrho: file.ecutrho.unwrap_or(defaults.ecutrho),
        smearing: file.smearing.unwrap_or(defaults.smearing),
        degauss: file.degauss.unwrap_or(defaults.degauss),
        vdw_corr: match file.vdw_corr {
            Some(v) if v.is_empty() || v == "none" => None,
            Some(v) => Some(v),
            None => defaults.vdw_corr,
        },
        conv_thr: file.conv_thr.unwrap_or(defaults.conv_thr),
        kpts: file.kpts.unwrap_or(defaults.kpts),
        ..defaults
    };
    Ok(config)
}

/// Resolves the surface from CLI flags over file values. Materials from the 2D table
/// become layers; everything else is treated as a crystal slab.
pub fn surface_spec(
    args: &SurfaceArgs,
    file: &FileSurfaceConfig,
    defaults: &DefaultsConfig,
) -> Result<SurfaceSpec> {
    if let Some(path) = args.surface_file.clone().or_else(|| file.file.clone()) {
        return Ok(SurfaceSpec::File { path });
    }

    let material = args
        .material
        .clone()
        .or_else(|| file.material.clone())
        .ok_or_else(|| {
            CliError::Config(
                "A surface is required via `--material`, `--surface-file` or the `[surface]` section."
                    .to_string(),
            )
        })?;
    let vacuum = args.vacuum.or(file.vacuum).unwrap_or(defaults.vacuum);
    let size = args.size.clone().or_else(|| file.size.clone());

    if list_layer_materials()
        .iter()
        .any(|(name, _)| *name == material)
    {
        let size = match size.as_deref() {
            None => defaults.layer_size,
            Some(&[nx, ny]) | Some(&[nx, ny, _]) => [nx, ny],
            Some(other) => {
                return Err(CliError::Argument(format!(
                    "2D surface size must be 'nx,ny', got {other:?}"
                )));
            }
        };
        return Ok(SurfaceSpec::TwoD {
            material,
            size,
            vacuum,
        });
    }

    let miller = match &args.miller {
        Some(text) => parse_miller(text)?,
        None => file
            .miller
            .clone()
            .unwrap_or_else(|| defaults.miller.to_vec()),
    };
    let size = match size.as_deref() {
        None => defaults.crystal_size,
        Some(&[nx, ny, layers]) => [nx, ny, layers],
        Some(other) => {
            return Err(CliError::Argument(format!(
                "Crystal slab size must be 'nx,ny,layers', got {other:?}"
            )));
        }
    };
    let crystal_structure = file
        .crystal_structure
        .as_deref()
        .map(CrystalStructure::from_str)
        .transpose()
        .map_err(|e| CliError::Config(e.to_string()))?;

    Ok(SurfaceSpec::Crystal {
        material,
        miller,
        size,
        vacuum,
        crystal_structure,
        lattice_constant: file.lattice_constant,
    })
}

/// Accepts `111`, `-110`, `0001` or the comma-separated `1,1,1`.
fn parse_miller(text: &str) -> Result<Vec<i32>> {
    let invalid = || {
        CliError::Argument(format!(
            "Invalid Miller indices '{text}'. Expected e.g. '111' or '1,1,1'."
        ))
    };

    let indices: Vec<i32> = if text.contains(',') {
        text.split(',')
            .map(|part| part.trim().parse().map_err(|_| invalid()))
            .collect::<Result<_>>()?
    } else {
        let mut indices = Vec::new();
        let mut negative = false;
        for c in text.chars() {
            match (c, c.to_digit(10)) {
                ('-', _) if !negative => negative = true,
                (_, Some(d)) => {
                    let d = d as i32;
                    indices.push(if negative { -d } else { d });
                    negative = false;
                }
                _ => return Err(invalid()),
            }
        }
        if negative {
            return Err(invalid());
        }
        indices
    };

    if !(3..=4).contains(&indices.len()) {
        return Err(invalid());
    }
    Ok(indices)
}

fn parse_value<T: FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| CliError::Config(format!("Invalid value for {key}: {value}")))
}

fn apply_set_values(mut config: FileConfig, set_values: &[String]) -> Result<FileConfig> {
    for kv_pair in set_values {
        let Some((key, value_str)) = kv_pair.split_once('=') else {
            return Err(CliError::Config(format!(
                "Invalid --set format: '{kv_pair}'. Expected KEY=VALUE."
            )));
        };

        match key {
            "surface.material" => {
                config.surface.get_or_insert_with(Default::default).material =
                    Some(value_str.to_string());
            }
            "surface.vacuum" => {
                config.surface.get_or_insert_with(Default::default).vacuum =
                    Some(parse_value(key, value_str)?);
            }
            "adsorbant.species" => {
                config.adsorbant.get_or_insert_with(Default::default).species =
                    Some(value_str.to_string());
            }
            "adsorbant.orientation" => {
                config
                    .adsorbant
                    .get_or_insert_with(Default::default)
                    .orientation = Some(value_str.to_string());
            }
            "sampling.z-start" => {
                config.sampling.get_or_insert_with(Default::default).z_start =
                    Some(parse_value(key, value_str)?);
            }
            "sampling.z-end" => {
                config.sampling.get_or_insert_with(Default::default).z_end =
                    Some(parse_value(key, value_str)?);
            }
            "sampling.z-step" => {
                config.sampling.get_or_insert_with(Default::default).z_step =
                    Some(parse_value(key, value_str)?);
            }
            "sampling.parallel" => {
                config.sampling.get_or_insert_with(Default::default).parallel =
                    Some(parse_value(key, value_str)?);
            }
            "sampling.timeout-secs" => {
                config
                    .sampling
                    .get_or_insert_with(Default::default)
                    .timeout_secs = Some(parse_value(key, value_str)?);
            }
            "ml.enabled" => {
                config.ml.get_or_insert_with(Default::default).enabled =
                    Some(parse_value(key, value_str)?);
            }
            "ml.command" => {
                config.ml.get_or_insert_with(Default::default).command =
                    Some(value_str.to_string());
            }
            "ml.model" => {
                config.ml.get_or_insert_with(Default::default).model = Some(value_str.to_string());
            }
            "ml.device" => {
                config.ml.get_or_insert_with(Default::default).device =
                    Some(value_str.to_string());
            }
            "dft.enabled" => {
                config.dft.get_or_insert_with(Default::default).enabled =
                    Some(parse_value(key, value_str)?);
            }
            "dft.functional" => {
                config.dft.get_or_insert_with(Default::default).functional =
                    Some(value_str.to_string());
            }
            "dft.height-stride" => {
                config.dft.get_or_insert_with(Default::default).height_stride =
                    Some(parse_value(key, value_str)?);
            }
            "dft.pseudo-dir" => {
                config.dft.get_or_insert_with(Default::default).pseudo_dir =
                    Some(PathBuf::from(value_str));
            }
            "dft.num-cores" => {
                config.dft.get_or_insert_with(Default::default).num_cores =
                    Some(parse_value(key, value_str)?);
            }
            "output.directory" => {
                config.output.get_or_insert_with(Default::default).directory =
                    Some(PathBuf::from(value_str));
            }
            "output.save-structures" => {
                config
                    .output
                    .get_or_insert_with(Default::default)
                    .save_structures = Some(parse_value(key, value_str)?);
            }
            _ => {
                return Err(CliError::Config(format!(
                    "Unsupported configuration key for --set: '{key}'"
                )));
            }
        }
    }
    Ok(config)
}
