use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

const HELP_TEMPLATE: &str = "\
{before-help}{name} {version}
{author-with-newline}{about-with-newline}
{usage-heading} {usage}

{all-args}{after-help}
";

#[derive(Parser, Debug)]
#[command(
    version,
    about = "eprof - sample adsorption energy profiles of molecules above crystal and 2D-material surfaces with machine-learned potentials and DFT.",
    help_template = HELP_TEMPLATE,
)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity level (-v for INFO, -vv for DEBUG, -vvv for TRACE)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all log output except for errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Write logs to a specified file in addition to the console output
    #[arg(long, global = true, value_name = "PATH")]
    pub log_file: Option<PathBuf>,

    /// Set the number of threads used for parallel sweeps.
    /// Defaults to the number of available logical cores.
    #[arg(short = 'j', long, global = true, value_name = "NUM")]
    pub threads: Option<usize>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Sample the energy profile of an adsorbant above a surface.
    Run(RunArgs),
    /// List the available adsorbant species or describe one of them.
    Species(SpeciesArgs),
    /// List the supported crystal and 2D-layer materials.
    Surfaces,
    /// Build a surface and report its composition, geometry and adsorption sites.
    SurfaceInfo(SurfaceInfoArgs),
    /// Write a commented example configuration file.
    InitConfig(InitConfigArgs),
    /// Print binding energies and optimal heights of a saved profile.
    Summarize(SummarizeArgs),
}

/// Surface selection shared by `run` and `surface-info`.
#[derive(Args, Debug, Clone, Default)]
pub struct SurfaceArgs {
    /// Surface material (e.g., 'Au', 'Pt', 'MoS2', 'graphene').
    #[arg(short = 'm', long, value_name = "NAME")]
    pub material: Option<String>,

    /// Miller indices of a crystal facet, as '111' or '1,1,1'.
    #[arg(long, value_name = "HKL")]
    pub miller: Option<String>,

    /// Supercell size: 'nx,ny,layers' for crystals, 'nx,ny' for 2D layers.
    #[arg(long, value_name = "N,N[,N]", value_delimiter = ',')]
    pub size: Option<Vec<usize>>,

    /// Vacuum thickness in Å.
    #[arg(long, value_name = "FLOAT")]
    pub vacuum: Option<f64>,

    /// Load the slab from an extended XYZ file instead of building it.
    #[arg(long, value_name = "PATH", conflicts_with_all = ["material", "miller"])]
    pub surface_file: Option<PathBuf>,
}

/// Arguments for the `run` subcommand.
#[derive(Args, Debug, Default)]
pub struct RunArgs {
    /// Path to a configuration file in TOML format.
    #[arg(short, long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    // --- Surface ---
    #[command(flatten)]
    pub surface: SurfaceArgs,

    // --- Adsorbant ---
    /// Adsorbant species (e.g., 'H2O', 'CO', 'H').
    #[arg(short = 'a', long, value_name = "NAME")]
    pub species: Option<String>,

    /// Adsorbant orientation. Defaults to the species' first orientation.
    #[arg(long, value_name = "NAME")]
    pub orientation: Option<String>,

    /// TOML file with additional rigid species.
    #[arg(long, value_name = "PATH")]
    pub custom_species: Option<PathBuf>,

    // --- Height grid ---
    /// Lowest height above the surface in Å.
    #[arg(long, value_name = "FLOAT")]
    pub z_start: Option<f64>,

    /// Highest height above the surface in Å.
    #[arg(long, value_name = "FLOAT")]
    pub z_end: Option<f64>,

    /// Height increment in Å.
    #[arg(long, value_name = "FLOAT")]
    pub z_step: Option<f64>,

    // --- Methods ---
    #[command(flatten)]
    pub methods: MethodSelection,

    /// ML tasks to evaluate, each becoming its own profile.
    #[arg(long, value_name = "TASK", value_delimiter = ',')]
    pub ml_tasks: Option<Vec<String>>,

    /// Predictor command used by the ML backend.
    #[arg(long, value_name = "COMMAND")]
    pub ml_command: Option<String>,

    /// ML model name passed to the predictor.
    #[arg(long, value_name = "NAME")]
    pub ml_model: Option<String>,

    /// ML device passed to the predictor (e.g., 'cuda', 'cpu').
    #[arg(long, value_name = "NAME")]
    pub ml_device: Option<String>,

    /// Pseudopotential directory for DFT.
    #[arg(long, value_name = "PATH")]
    pub pseudo_dir: Option<PathBuf>,

    /// MPI ranks per DFT calculation.
    #[arg(long, value_name = "NUM")]
    pub dft_cores: Option<usize>,

    /// DFT exchange-correlation functional.
    #[arg(long, value_name = "NAME")]
    pub dft_functional: Option<String>,

    /// Run DFT on every N-th height of the grid.
    #[arg(long, value_name = "N")]
    pub dft_stride: Option<usize>,

    // --- Execution ---
    /// Run the sweeps of independent methods concurrently.
    #[arg(long)]
    pub parallel: bool,

    /// Abort a single energy evaluation after this many seconds.
    #[arg(long, value_name = "SECONDS")]
    pub timeout: Option<u64>,

    // --- Output ---
    /// Directory receiving the JSON and CSV results.
    #[arg(short, long, value_name = "PATH")]
    pub output_dir: Option<PathBuf>,

    /// Do not write the sampled structures next to the results.
    #[arg(long)]
    pub no_save_structures: bool,

    /// Set a specific configuration value, overriding the config file.
    /// Can be used multiple times. Example: -S sampling.z-step=0.1
    #[arg(short = 'S', long = "set", value_name = "KEY=VALUE", num_args(0..))]
    pub set_values: Vec<String>,
}

/// Mutually exclusive switches restricting a run to one method family.
#[derive(Args, Debug, Clone, Copy, Default)]
#[group(required = false, multiple = false)]
pub struct MethodSelection {
    /// Only run the ML backend.
    #[arg(long)]
    pub ml_only: bool,
    /// Only run the DFT backend.
    #[arg(long)]
    pub dft_only: bool,
}

#[derive(Args, Debug)]
pub struct SpeciesArgs {
    /// Describe a single species instead of listing all of them.
    #[arg(value_name = "NAME")]
    pub name: Option<String>,

    /// TOML file with additional rigid species.
    #[arg(long, value_name = "PATH")]
    pub custom_species: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct SurfaceInfoArgs {
    #[command(flatten)]
    pub surface: SurfaceArgs,

    /// Also list top, bridge and hollow adsorption sites.
    #[arg(long)]
    pub sites: bool,
}

#[derive(Args, Debug)]
pub struct InitConfigArgs {
    /// Where to write the configuration file.
    #[arg(value_name = "PATH", default_value = "eprof.toml")]
    pub path: PathBuf,

    /// Overwrite an existing file.
    #[arg(long)]
    pub force: bool,
}

#[derive(Args, Debug)]
pub struct SummarizeArgs {
    /// A `*_profile.json` file written by `eprof run`.
    #[arg(value_name = "PATH")]
    pub input: PathBuf,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_run_with_overrides() {
        let cli = Cli::parse_from([
            "eprof", "-vv", "run", "-m", "Pt", "--miller", "111", "--size", "2,2,3", "-a", "CO",
            "--orientation", "c_down", "--ml-only", "--ml-tasks", "omat,omc", "-S",
            "sampling.z-step=0.1",
        ]);
        assert_eq!(cli.verbose, 2);
        let Commands::Run(args) = cli.command else {
            panic!("Expected 'run' subcommand");
        };
        assert_eq!(args.surface.material.as_deref(), Some("Pt"));
        assert_eq!(args.surface.size, Some(vec![2, 2, 3]));
        assert!(args.methods.ml_only);
        assert_eq!(args.ml_tasks, Some(vec!["omat".to_string(), "omc".to_string()]));
        assert_eq!(args.set_values, vec!["sampling.z-step=0.1"]);
    }

    #[test]
    fn method_switches_are_exclusive() {
        let result = Cli::try_parse_from(["eprof", "run", "--ml-only", "--dft-only"]);
        assert!(result.is_err());
    }

    #[test]
    fn surface_file_conflicts_with_material() {
        let result = Cli::try_parse_from([
            "eprof",
            "surface-info",
            "--material",
            "Au",
            "--surface-file",
            "slab.xyz",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn init_config_has_a_default_path() {
        let cli = Cli::parse_from(["eprof", "init-config"]);
        let Commands::InitConfig(args) = cli.command else {
            panic!("Expected 'init-config' subcommand");
        };
        assert_eq!(args.path, PathBuf::from("eprof.toml"));
        assert!(!args.force);
    }
}
