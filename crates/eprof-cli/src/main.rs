mod cli;
mod commands;
mod config;
mod error;
mod logging;
mod utils;

use crate::cli::{Cli, Commands};
use crate::error::{CliError, Result};
use clap::Parser;
use tracing::{debug, error, info};

fn main() {
    if let Err(e) = run_app() {
        eprintln!("\n❌ Error: {}", e);
        std::process::exit(1);
    }
}

fn run_app() -> Result<()> {
    let cli = Cli::parse();
    logging::setup_logging(cli.verbose, cli.quiet, cli.log_file.clone())?;

    let (panic_hook, eyre_hook) = color_eyre::config::HookBuilder::default().into_hooks();
    eyre_hook.install().map_err(|e| CliError::Other(e.into()))?;
    std::panic::set_hook(Box::new(move |pi| {
        error!("{}", panic_hook.panic_report(pi));
    }));

    info!("🚀 eprof CLI v{} starting up.", env!("CARGO_PKG_VERSION"));
    debug!("Full CLI arguments parsed: {:?}", &cli);

    if let Some(num_threads) = cli.threads {
        info!(
            "Setting Rayon global thread pool to {} threads.",
            num_threads
        );
        rayon::ThreadPoolBuilder::new()
            .num_threads(num_threads)
            .build_global()
            .map_err(|e| {
                CliError::Other(anyhow::anyhow!("Failed to build global thread pool: {}", e))
            })?;
    }

    let command_result = match cli.command {
        Commands::Run(args) => {
            info!("Dispatching to 'run' command.");
            commands::run::run(args)
        }
        Commands::Species(args) => {
            info!("Dispatching to 'species' command.");
            commands::species::run(args)
        }
        Commands::Surfaces => {
            info!("Dispatching to 'surfaces' command.");
            commands::surfaces::list()
        }
        Commands::SurfaceInfo(args) => {
            info!("Dispatching to 'surface-info' command.");
            commands::surfaces::describe(args)
        }
        Commands::InitConfig(args) => {
            info!("Dispatching to 'init-config' command.");
            commands::init_config::run(args)
        }
        Commands::Summarize(args) => {
            info!("Dispatching to 'summarize' command.");
            commands::summarize::run(args)
        }
    };

    match &command_result {
        Ok(_) => {
            info!("✅ Command completed successfully.");
            println!("✅ Command completed successfully.");
        }
        Err(e) => {
            error!("❌ Command failed: {}", e);
        }
    }

    command_result
}
