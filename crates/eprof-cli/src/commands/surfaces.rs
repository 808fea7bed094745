use crate::cli::SurfaceInfoArgs;
use crate::config::defaults::DefaultsConfig;
use crate::config::file::FileSurfaceConfig;
use crate::config::surface_spec;
use crate::error::Result;
use eprof::core::surfaces::crystal::{list_materials, supported_facets};
use eprof::core::surfaces::info::{AdsorptionSites, SurfaceInfo};
use eprof::core::surfaces::layered::list_layer_materials;
use eprof::core::surfaces::build_surface;
use eprof::engine::error::EngineError;
use nalgebra::Point3;
use std::fmt::Write;
use tracing::info;

pub fn list() -> Result<()> {
    print!("{}", materials_overview());
    Ok(())
}

pub fn describe(args: SurfaceInfoArgs) -> Result<()> {
    let spec = surface_spec(
        &args.surface,
        &FileSurfaceConfig::default(),
        &DefaultsConfig::default(),
    )?;
    info!("Building surface from {:?}", spec);
    let surface = build_surface(&spec).map_err(EngineError::from)?;

    print!("{}", format_info(&surface.info()));
    if args.sites {
        print!("{}", format_sites(&surface.adsorption_sites()));
    }
    Ok(())
}

fn materials_overview() -> String {
    let mut out = String::from("Supported materials and surfaces:\n");
    for (structure, materials) in list_materials() {
        let facets: Vec<String> = supported_facets(structure)
            .iter()
            .map(|m| m.iter().map(|i| i.to_string()).collect::<String>())
            .collect();
        let _ = writeln!(
            out,
            "\n{} materials: {}",
            structure.to_string().to_uppercase(),
            materials.join(", ")
        );
        let _ = writeln!(out, "  Supported Miller indices: {}", facets.join(", "));
    }
    let _ = writeln!(out, "\n2D materials:");
    for (name, description) in list_layer_materials() {
        let _ = writeln!(out, "  {name}: {description}");
    }
    out
}

fn format_info(info: &SurfaceInfo) -> String {
    let elements: Vec<String> = info.elements.iter().map(|e| e.to_string()).collect();
    let mut out = String::new();
    let _ = writeln!(out, "Surface: {}", info.name);
    let _ = writeln!(out, "  Atoms: {}", info.n_atoms);
    let _ = writeln!(out, "  Elements: {}", elements.join(", "));
    if let Some(cell) = &info.cell {
        let _ = writeln!(out, "  Cell (Å):");
        for row in cell {
            let _ = writeln!(out, "    {:>10.4} {:>10.4} {:>10.4}", row[0], row[1], row[2]);
        }
    }
    let _ = writeln!(
        out,
        "  Z range: {:.3} to {:.3} Å ({:.3} Å)",
        info.z_min,
        info.z_max,
        info.z_range()
    );
    if let Some(area) = info.surface_area {
        let _ = writeln!(out, "  Surface area: {area:.3} Å²");
    }
    let _ = writeln!(out, "  Layers: {}", info.layers.len());
    for layer in &info.layers {
        let _ = writeln!(
            out,
            "    #{:<3} z = {:>8.3} Å, {} atoms",
            layer.index,
            layer.z_average,
            layer.atom_indices.len()
        );
    }
    out
}

fn format_sites(sites: &AdsorptionSites) -> String {
    let mut out = String::from("  Adsorption sites:\n");
    for (kind, points) in [
        ("top", &sites.top),
        ("bridge", &sites.bridge),
        ("hollow", &sites.hollow),
    ] {
        let _ = writeln!(out, "    {kind}: {}", points.len());
        for p in points.iter().take(3) {
            let _ = writeln!(out, "      {}", format_point(p));
        }
    }
    out
}

fn format_point(p: &Point3<f64>) -> String {
    format!("({:.3}, {:.3}, {:.3})", p.x, p.y, p.z)
}

#[cfg(test)]
mod tests {
    use super::*;
    use eprof::core::surfaces::SurfaceSpec;

    #[test]
    fn overview_covers_crystals_and_layers() {
        let text = materials_overview();
        assert!(text.contains("FCC materials:"));
        assert!(text.contains("Au"));
        assert!(text.contains("111"));
        assert!(text.contains("2D materials:"));
        assert!(text.contains("MoS2"));
        assert!(text.contains("graphene"));
    }

    #[test]
    fn info_reports_geometry() {
        let surface = build_surface(&SurfaceSpec::Crystal {
            material: "Cu".to_string(),
            miller: vec![1, 1, 1],
            size: [2, 2, 3],
            vacuum: 10.0,
            crystal_structure: None,
            lattice_constant: None,
        })
        .unwrap();
        let text = format_info(&surface.info());
        assert!(text.starts_with("Surface: Cu(1,1,1)\n"));
        assert!(text.contains("  Atoms: 12\n"));
        assert!(text.contains("  Elements: Cu\n"));
        assert!(text.contains("  Layers: 3\n"));
        assert!(text.contains("Surface area:"));
    }

    #[test]
    fn sites_are_summarized_by_kind() {
        let sites = AdsorptionSites {
            top: vec![Point3::new(0.0, 0.0, 12.0)],
            bridge: Vec::new(),
            hollow: vec![Point3::new(1.0, 0.5, 12.0); 5],
        };
        let text = format_sites(&sites);
        assert!(text.contains("    top: 1\n      (0.000, 0.000, 12.000)\n"));
        assert!(text.contains("    bridge: 0\n"));
        assert!(text.contains("    hollow: 5\n"));
        assert_eq!(text.matches("(1.000, 0.500, 12.000)").count(), 3);
    }
}
