use crate::cli::SpeciesArgs;
use crate::error::Result;
use eprof::core::templates::{SpeciesInfo, TemplateLibrary};
use eprof::engine::error::EngineError;

pub fn run(args: SpeciesArgs) -> Result<()> {
    let library = match &args.custom_species {
        Some(path) => TemplateLibrary::new()
            .load_custom(path)
            .map_err(EngineError::from)?,
        None => TemplateLibrary::new(),
    };

    match args.name {
        Some(name) => {
            let info = library.info(&name).map_err(EngineError::from)?;
            print!("{}", describe(&info));
        }
        None => {
            println!("Available adsorbants:");
            for name in library.species_names() {
                let info = library.info(&name).map_err(EngineError::from)?;
                print!("{}", describe(&info));
            }
        }
    }
    Ok(())
}

fn describe(info: &SpeciesInfo) -> String {
    let elements: Vec<String> = info.elements.iter().map(|e| e.to_string()).collect();
    format!(
        "  {}: {}\n    Elements: {}\n    Orientations: {}\n    Multiplicity: {}\n",
        info.name,
        info.description,
        elements.join(" "),
        info.orientations.join(", "),
        info.multiplicity
    )
}
