use crate::error::{CliError, Result};
use std::fs::File;
use std::path::PathBuf;
use tracing_subscriber::{
    filter::{LevelFilter, Targets},
    fmt::{self},
    prelude::*,
};

/// Crates whose events follow the requested verbosity. Everything else stays at `WARN`.
const OWN_TARGETS: [&str; 2] = ["eprof", "eprof_cli"];

pub fn level_for(verbosity: u8, quiet: bool) -> LevelFilter {
    if quiet {
        return LevelFilter::ERROR;
    }
    match verbosity {
        0 => LevelFilter::WARN,
        1 => LevelFilter::INFO,
        2 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    }
}

fn targets(level: LevelFilter) -> Targets {
    OWN_TARGETS
        .iter()
        .fold(Targets::new().with_default(LevelFilter::WARN.min(level)), |t, name| {
            t.with_target(*name, level)
        })
}

pub fn setup_logging(verbosity: u8, quiet: bool, log_file: Option<PathBuf>) -> Result<()> {
    let level = level_for(verbosity, quiet);

    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(true)
        .with_target(false)
        .compact();

    let subscriber = tracing_subscriber::registry()
        .with(targets(level))
        .with(stderr_layer);

    if let Some(path) = log_file {
        let file = File::create(&path).map_err(CliError::Io)?;

        let file_layer = fmt::layer()
            .with_writer(file)
            .with_ansi(false)
            .with_thread_ids(true)
            .with_target(true);

        subscriber.with(file_layer).init();
    } else {
        subscriber.init();
    }

    Ok(())
}
