use crate::cli::RunArgs;
use crate::config::{AppConfig, build_config};
use crate::error::Result;
use crate::utils::progress::CliProgressHandler;
use eprof::core::templates::TemplateLibrary;
use eprof::engine::backend::EnergyBackend;
use eprof::engine::backend::dft::QeBackend;
use eprof::engine::backend::ml::MlBackend;
use eprof::engine::error::EngineError;
use eprof::engine::progress::ProgressReporter;
use eprof::workflows::profile::{self, ProfileBackends};
use tracing::{info, warn};

pub fn run(args: RunArgs) -> Result<()> {
    info!("Merging configuration from file and CLI arguments...");
    let app = build_config(&args)?;

    let templates = load_templates(&app)?;

    info!("Constructing energy backends...");
    let ml = app.ml.clone().map(MlBackend::new).transpose()?;
    let dft = app.dft.clone().map(QeBackend::new).transpose()?;
    let backends = ProfileBackends {
        ml: ml.as_ref().map(|b| b as &dyn EnergyBackend),
        dft: dft.as_ref().map(|b| b as &dyn EnergyBackend),
    };

    let progress_handler = CliProgressHandler::new();
    let reporter = ProgressReporter::with_callback(progress_handler.get_callback());

    println!("Sampling the energy profile of {}...", app.profile.species);
    info!("Invoking the energy profile workflow...");
    let outcome = profile::run(&app.profile, &templates, backends, &reporter)?;

    println!("{}", outcome.summary);
    if !outcome.summary.failed.is_empty() {
        warn!(
            "Methods without a single valid point: {}",
            outcome.summary.failed.join(", ")
        );
    }
    if let Some((method, best)) = outcome.summary.strongest() {
        println!(
            "Strongest binding: {} ({:.4} eV at {:.2} Å)",
            method, best.binding_energy, best.optimal_height
        );
    }
    if let Some(saved) = &outcome.saved {
        println!("✓ Profile written to: {}", saved.json.display());
        println!("✓ Table written to:   {}", saved.csv.display());
    }

    Ok(())
}

fn load_templates(app: &AppConfig) -> Result<TemplateLibrary> {
    let library = TemplateLibrary::new();
    match &app.custom_species {
        Some(path) => {
            info!("Loading custom species from {:?}", path);
            Ok(library.load_custom(path).map_err(EngineError::from)?)
        }
        None => Ok(library),
    }
}
