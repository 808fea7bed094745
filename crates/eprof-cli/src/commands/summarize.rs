use crate::cli::SummarizeArgs;
use crate::error::Result;
use eprof::engine::analysis::{BindingSummary, binding_energies, optimal_heights};
use eprof::engine::error::EngineError;
use eprof::engine::profile::ProfileResult;
use eprof::engine::sink::load_json;
use std::fmt::Write;
use tracing::info;

pub fn run(args: SummarizeArgs) -> Result<()> {
    info!("Loading profile from {:?}", args.input);
    let result = load_json(&args.input).map_err(EngineError::from)?;
    print!("{}", report(&result));
    Ok(())
}

fn report(result: &ProfileResult) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{}", "=".repeat(60));
    let _ = writeln!(out, "CALCULATION SUMMARY");
    let _ = writeln!(out, "{}", "=".repeat(60));
    let _ = writeln!(
        out,
        "System: {} ({}) on {}",
        result.species, result.config.orientation, result.surface
    );
    if let Some(range) = &result.config.range {
        let _ = writeln!(
            out,
            "Heights: {:.2} to {:.2} Å in steps of {:.2} Å",
            range.start, range.end, range.step
        );
    }

    let _ = writeln!(out, "\nBinding Energies:");
    for (method, energy) in binding_energies(result) {
        let _ = writeln!(out, "  {method}: {energy:.4} eV");
    }
    let _ = writeln!(out, "\nOptimal Heights:");
    for (method, height) in optimal_heights(result) {
        let _ = writeln!(out, "  {method}: {height:.1} Å");
    }
    let _ = writeln!(out, "\n{}", BindingSummary::from_profile(result));
    out
}
