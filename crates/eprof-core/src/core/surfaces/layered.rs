use super::{SurfaceError, check_vacuum};
use crate::core::models::atom::Atom;
use crate::core::models::element::Element;
use crate::core::models::structure::{Cell, Structure};
use nalgebra::{Point3, Vector3};
use phf::{Map, phf_map};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LayerKind {
    /// 2H transition-metal dichalcogenide: one metal sheet between two chalcogen sheets
    /// separated by `thickness` (chalcogen to chalcogen).
    Mx2 {
        metal: &'static str,
        chalcogen: &'static str,
        thickness: f64,
    },
    /// A flat honeycomb with two (possibly identical) sublattices.
    Honeycomb {
        first: &'static str,
        second: &'static str,
    },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LayerMaterial {
    pub description: &'static str,
    pub a: f64,
    pub kind: LayerKind,
}

static LAYER_MATERIALS: Map<&'static str, LayerMaterial> = phf_map! {
    "MoS2" => LayerMaterial {
        description: "Molybdenum disulfide (2H)",
        a: 3.18,
        kind: LayerKind::Mx2 { metal: "Mo", chalcogen: "S", thickness: 3.19 },
    },
    "WS2" => LayerMaterial {
        description: "Tungsten disulfide (2H)",
        a: 3.18,
        kind: LayerKind::Mx2 { metal: "W", chalcogen: "S", thickness: 3.14 },
    },
    "MoSe2" => LayerMaterial {
        description: "Molybdenum diselenide (2H)",
        a: 3.32,
        kind: LayerKind::Mx2 { metal: "Mo", chalcogen: "Se", thickness: 3.34 },
    },
    "WSe2" => LayerMaterial {
        description: "Tungsten diselenide (2H)",
        a: 3.32,
        kind: LayerKind::Mx2 { metal: "W", chalcogen: "Se", thickness: 3.35 },
    },
    "graphene" => LayerMaterial {
        description: "Graphene",
        a: 2.46,
        kind: LayerKind::Honeycomb { first: "C", second: "C" },
    },
    "h-BN" => LayerMaterial {
        description: "Hexagonal boron nitride",
        a: 2.50,
        kind: LayerKind::Honeycomb { first: "B", second: "N" },
    },
};

pub fn layer_material(name: &str) -> Option<&'static LayerMaterial> {
    LAYER_MATERIALS.get(name)
}

/// Supported 2D materials with their descriptions, sorted by name.
pub fn list_layer_materials() -> Vec<(&'static str, &'static str)> {
    let mut materials: Vec<_> = LAYER_MATERIALS
        .entries()
        .map(|(name, m)| (*name, m.description))
        .collect();
    materials.sort_unstable();
    materials
}

/// Builds a single periodic layer of `size[0] x size[1]` hexagonal cells, centered
/// `vacuum` Angstroms above the bottom of the cell with the same vacuum above it.
pub fn build_layer(name: &str, size: [usize; 2], vacuum: f64) -> Result<Structure, SurfaceError> {
    let material = layer_material(name).ok_or_else(|| SurfaceError::UnknownMaterial {
        material: name.to_string(),
        available: list_layer_materials()
            .iter()
            .map(|(n, _)| *n)
            .collect::<Vec<_>>()
            .join(", "),
    })?;
    if size.contains(&0) {
        return Err(SurfaceError::InvalidParameter(format!(
            "layer size must be positive in both directions, got {size:?}"
        )));
    }
    check_vacuum(vacuum)?;

    let a = material.a;
    let b1 = Vector3::new(a, 0.0, 0.0);
    let b2 = Vector3::new(a / 2.0, a * 3f64.sqrt() / 2.0, 0.0);

    // (element, fractional position in the primitive cell, z offset from the mid-plane)
    let basis: Vec<(Element, [f64; 2], f64)> = match material.kind {
        LayerKind::Mx2 {
            metal,
            chalcogen,
            thickness,
        } => {
            let m: Element = metal.parse()?;
            let x: Element = chalcogen.parse()?;
            vec![
                (m, [1.0 / 3.0, 1.0 / 3.0], 0.0),
                (x, [2.0 / 3.0, 2.0 / 3.0], thickness / 2.0),
                (x, [2.0 / 3.0, 2.0 / 3.0], -thickness / 2.0),
            ]
        }
        LayerKind::Honeycomb { first, second } => vec![
            (first.parse()?, [1.0 / 3.0, 1.0 / 3.0], 0.0),
            (second.parse()?, [2.0 / 3.0, 2.0 / 3.0], 0.0),
        ],
    };

    let half_thickness = basis.iter().map(|(_, _, dz)| dz.abs()).fold(0.0, f64::max);
    let mid_plane = vacuum + half_thickness;

    let [nx, ny] = size;
    let mut atoms = Vec::with_capacity(nx * ny * basis.len());
    for j in 0..ny {
        for i in 0..nx {
            for (element, [fx, fy], dz) in &basis {
                let r = (i as f64 + fx) * b1 + (j as f64 + fy) * b2;
                atoms.push(Atom::new(*element, Point3::new(r.x, r.y, mid_plane + dz)));
            }
        }
    }

    let cell = Cell::from_vectors(
        b1 * nx as f64,
        b2 * ny as f64,
        Vector3::new(0.0, 0.0, 2.0 * (vacuum + half_thickness)),
    )?;
    Ok(Structure::periodic(atoms, cell, [true; 3]))
}
