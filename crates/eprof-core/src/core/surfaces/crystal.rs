use super::{SurfaceError, check_vacuum};
use crate::core::models::atom::Atom;
use crate::core::models::element::Element;
use crate::core::models::structure::{Cell, Structure};
use nalgebra::{Point3, Vector2, Vector3};
use phf::{Map, phf_map};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CrystalStructure {
    Fcc,
    Bcc,
    Hcp,
}

impl fmt::Display for CrystalStructure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CrystalStructure::Fcc => "fcc",
            CrystalStructure::Bcc => "bcc",
            CrystalStructure::Hcp => "hcp",
        })
    }
}

impl FromStr for CrystalStructure {
    type Err = SurfaceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "fcc" => Ok(CrystalStructure::Fcc),
            "bcc" => Ok(CrystalStructure::Bcc),
            "hcp" => Ok(CrystalStructure::Hcp),
            _ => Err(SurfaceError::InvalidParameter(format!(
                "unknown crystal structure '{s}' (expected fcc, bcc or hcp)"
            ))),
        }
    }
}

/// Bulk lattice data for a metal. `c` is only meaningful for hcp.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Material {
    pub structure: CrystalStructure,
    pub a: f64,
    pub c: f64,
}

static MATERIALS: Map<&'static str, Material> = phf_map! {
    "Au" => Material { structure: CrystalStructure::Fcc, a: 4.08, c: 0.0 },
    "Ag" => Material { structure: CrystalStructure::Fcc, a: 4.09, c: 0.0 },
    "Cu" => Material { structure: CrystalStructure::Fcc, a: 3.61, c: 0.0 },
    "Al" => Material { structure: CrystalStructure::Fcc, a: 4.05, c: 0.0 },
    "Ni" => Material { structure: CrystalStructure::Fcc, a: 3.52, c: 0.0 },
    "Pd" => Material { structure: CrystalStructure::Fcc, a: 3.89, c: 0.0 },
    "Pt" => Material { structure: CrystalStructure::Fcc, a: 3.92, c: 0.0 },
    "Rh" => Material { structure: CrystalStructure::Fcc, a: 3.80, c: 0.0 },
    "Ir" => Material { structure: CrystalStructure::Fcc, a: 3.84, c: 0.0 },
    "Pb" => Material { structure: CrystalStructure::Fcc, a: 4.95, c: 0.0 },
    "Fe" => Material { structure: CrystalStructure::Bcc, a: 2.87, c: 0.0 },
    "Cr" => Material { structure: CrystalStructure::Bcc, a: 2.88, c: 0.0 },
    "W" => Material { structure: CrystalStructure::Bcc, a: 3.16, c: 0.0 },
    "Mo" => Material { structure: CrystalStructure::Bcc, a: 3.15, c: 0.0 },
    "V" => Material { structure: CrystalStructure::Bcc, a: 3.03, c: 0.0 },
    "Nb" => Material { structure: CrystalStructure::Bcc, a: 3.30, c: 0.0 },
    "Ta" => Material { structure: CrystalStructure::Bcc, a: 3.31, c: 0.0 },
    "Zn" => Material { structure: CrystalStructure::Hcp, a: 2.66, c: 4.95 },
    "Cd" => Material { structure: CrystalStructure::Hcp, a: 2.98, c: 5.62 },
    "Ti" => Material { structure: CrystalStructure::Hcp, a: 2.95, c: 4.68 },
    "Zr" => Material { structure: CrystalStructure::Hcp, a: 3.23, c: 5.15 },
    "Mg" => Material { structure: CrystalStructure::Hcp, a: 3.21, c: 5.21 },
    "Be" => Material { structure: CrystalStructure::Hcp, a: 2.29, c: 3.58 },
    "Co" => Material { structure: CrystalStructure::Hcp, a: 2.51, c: 4.07 },
    "Ru" => Material { structure: CrystalStructure::Hcp, a: 2.70, c: 4.28 },
    "Re" => Material { structure: CrystalStructure::Hcp, a: 2.76, c: 4.46 },
};

const FCC_FACETS: &[&[i32]] = &[&[1, 1, 1], &[1, 0, 0], &[1, 1, 0]];
const BCC_FACETS: &[&[i32]] = &[&[1, 0, 0], &[1, 1, 0], &[1, 1, 1]];
const HCP_FACETS: &[&[i32]] = &[&[0, 0, 0, 1]];

pub fn material(name: &str) -> Option<&'static Material> {
    MATERIALS.get(name)
}

/// Supported materials grouped by crystal structure, each list sorted.
pub fn list_materials() -> BTreeMap<CrystalStructure, Vec<&'static str>> {
    let mut grouped: BTreeMap<CrystalStructure, Vec<&'static str>> = BTreeMap::new();
    for (name, data) in MATERIALS.entries() {
        grouped.entry(data.structure).or_default().push(name);
    }
    for names in grouped.values_mut() {
        names.sort_unstable();
    }
    grouped
}

pub fn supported_facets(structure: CrystalStructure) -> &'static [&'static [i32]] {
    match structure {
        CrystalStructure::Fcc => FCC_FACETS,
        CrystalStructure::Bcc => BCC_FACETS,
        CrystalStructure::Hcp => HCP_FACETS,
    }
}

/// In-plane primitive vectors, interlayer spacing and the fractional in-plane shift of
/// each layer in the stacking sequence.
struct FacetGeometry {
    b1: Vector2<f64>,
    b2: Vector2<f64>,
    spacing: f64,
    shifts: &'static [[f64; 2]],
}

const AB: &[[f64; 2]] = &[[0.0, 0.0], [0.5, 0.5]];
const ABC: &[[f64; 2]] = &[[0.0, 0.0], [1.0 / 3.0, 1.0 / 3.0], [2.0 / 3.0, 2.0 / 3.0]];
const HCP_AB: &[[f64; 2]] = &[[0.0, 0.0], [1.0 / 3.0, 1.0 / 3.0]];
const BCC110_AB: &[[f64; 2]] = &[[0.0, 0.0], [0.5, 0.0]];

fn facet_geometry(structure: CrystalStructure, miller: &[i32], a: f64, c: f64) -> Option<FacetGeometry> {
    let sqrt2 = 2f64.sqrt();
    let sqrt3 = 3f64.sqrt();
    let hex = |side: f64| (Vector2::new(side, 0.0), Vector2::new(side / 2.0, side * sqrt3 / 2.0));

    let geometry = match (structure, miller) {
        (CrystalStructure::Fcc, [1, 1, 1]) => {
            let (b1, b2) = hex(a / sqrt2);
            FacetGeometry { b1, b2, spacing: a / sqrt3, shifts: ABC }
        }
        (CrystalStructure::Fcc, [1, 0, 0]) => FacetGeometry {
            b1: Vector2::new(a / sqrt2, 0.0),
            b2: Vector2::new(0.0, a / sqrt2),
            spacing: a / 2.0,
            shifts: AB,
        },
        (CrystalStructure::Fcc, [1, 1, 0]) => FacetGeometry {
            b1: Vector2::new(a / sqrt2, 0.0),
            b2: Vector2::new(0.0, a),
            spacing: a / (2.0 * sqrt2),
            shifts: AB,
        },
        (CrystalStructure::Bcc, [1, 0, 0]) => FacetGeometry {
            b1: Vector2::new(a, 0.0),
            b2: Vector2::new(0.0, a),
            spacing: a / 2.0,
            shifts: AB,
        },
        (CrystalStructure::Bcc, [1, 1, 0]) => FacetGeometry {
            b1: Vector2::new(a, 0.0),
            b2: Vector2::new(a / 2.0, a / sqrt2),
            spacing: a / sqrt2,
            shifts: BCC110_AB,
        },
        (CrystalStructure::Bcc, [1, 1, 1]) => {
            let (b1, b2) = hex(a * sqrt2);
            FacetGeometry { b1, b2, spacing: a * sqrt3 / 6.0, shifts: ABC }
        }
        (CrystalStructure::Hcp, [0, 0, 0, 1]) => {
            let (b1, b2) = hex(a);
            FacetGeometry { b1, b2, spacing: c / 2.0, shifts: HCP_AB }
        }
        _ => return None,
    };
    Some(geometry)
}

/// Builds a slab of `size[2]` layers, each `size[0] x size[1]` surface cells, with
/// `vacuum` Angstroms of empty space below the bottom layer and above the top layer.
pub fn build_slab(
    material_name: &str,
    miller: &[i32],
    size: [usize; 3],
    vacuum: f64,
    structure_override: Option<CrystalStructure>,
    lattice_override: Option<f64>,
) -> Result<Structure, SurfaceError> {
    if size.contains(&0) {
        return Err(SurfaceError::InvalidParameter(format!(
            "slab size must be positive in every direction, got {size:?}"
        )));
    }
    check_vacuum(vacuum)?;
    let element: Element = material_name.parse()?;

    let known = material(material_name);
    let structure = structure_override
        .or(known.map(|m| m.structure))
        .ok_or_else(|| SurfaceError::UnknownMaterial {
            material: material_name.to_string(),
            available: MATERIALS.keys().copied().collect::<Vec<_>>().join(", "),
        })?;

    let a = match (lattice_override, known) {
        (Some(a), _) => a,
        (None, Some(m)) if m.structure == structure => m.a,
        _ => {
            return Err(SurfaceError::InvalidParameter(format!(
                "no {structure} lattice constant known for '{material_name}'; set one explicitly"
            )));
        }
    };
    if !a.is_finite() || a <= 0.0 {
        return Err(SurfaceError::InvalidParameter(format!(
            "lattice constant must be positive, got {a}"
        )));
    }
    let c = match known {
        Some(m) if m.structure == CrystalStructure::Hcp && lattice_override.is_none() => m.c,
        _ => a * (8.0f64 / 3.0).sqrt(),
    };

    let facet = facet_geometry(structure, miller, a, c).ok_or_else(|| {
        SurfaceError::UnsupportedFacet {
            structure,
            miller: format!("{miller:?}"),
            available: supported_facets(structure)
                .iter()
                .map(|m| format!("{m:?}"))
                .collect::<Vec<_>>()
                .join(", "),
        }
    })?;

    let [nx, ny, layers] = size;
    let mut atoms = Vec::with_capacity(nx * ny * layers);
    for layer in 0..layers {
        let [sx, sy] = facet.shifts[layer % facet.shifts.len()];
        let z = vacuum + layer as f64 * facet.spacing;
        for j in 0..ny {
            for i in 0..nx {
                let xy = (i as f64 + sx) * facet.b1 + (j as f64 + sy) * facet.b2;
                atoms.push(Atom::new(element, Point3::new(xy.x, xy.y, z)));
            }
        }
    }

    let a1 = facet.b1 * nx as f64;
    let a2 = facet.b2 * ny as f64;
    let height = (layers - 1) as f64 * facet.spacing + 2.0 * vacuum;
    let cell = Cell::from_vectors(
        Vector3::new(a1.x, a1.y, 0.0),
        Vector3::new(a2.x, a2.y, 0.0),
        Vector3::new(0.0, 0.0, height),
    )?;
    Ok(Structure::periodic(atoms, cell, [true; 3]))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn top_layer_z(s: &Structure) -> f64 {
        s.top_z().unwrap()
    }

    #[test]
    fn fcc111_has_expected_atom_count_cell_and_spacing() {
        let slab = build_slab("Au", &[1, 1, 1], [3, 3, 4], 10.0, None, None).unwrap();
        assert_eq!(slab.len(), 36);
        let a = 4.08;
        let spacing = a / 3f64.sqrt();
        assert!((top_layer_z(&slab) - (10.0 + 3.0 * spacing)).abs() < 1e-9);

        let cell = slab.cell().unwrap();
        assert!((cell.vector(2).z - (3.0 * spacing + 20.0)).abs() < 1e-9);
        let side = 3.0 * a / 2f64.sqrt();
        let expected_area = side * side * 3f64.sqrt() / 2.0;
        assert!((cell.in_plane_area() - expected_area).abs() < 1e-9);
        assert_eq!(slab.pbc(), [true; 3]);
    }

    #[test]
    fn slab_has_equal_vacuum_below_and_above() {
        let slab = build_slab("Fe", &[1, 0, 0], [2, 2, 3], 7.5, None, None).unwrap();
        let (lo, hi) = slab.z_range().unwrap();
        let c = slab.cell().unwrap().vector(2).z;
        assert!((lo - 7.5).abs() < 1e-9);
        assert!((c - hi - 7.5).abs() < 1e-9);
    }

    #[test]
    fn nearest_neighbour_distance_matches_lattice() {
        let slab = build_slab("Cu", &[1, 1, 1], [2, 2, 2], 5.0, None, None).unwrap();
        let atoms = slab.atoms();
        let mut min = f64::MAX;
        for (i, a) in atoms.iter().enumerate() {
            for b in &atoms[i + 1..] {
                min = min.min((a.position - b.position).norm());
            }
        }
        assert!((min - 3.61 / 2f64.sqrt()).abs() < 1e-9);
    }

    #[test]
    fn all_supported_facets_build() {
        for (material, structure) in [("Pt", CrystalStructure::Fcc), ("W", CrystalStructure::Bcc), ("Ru", CrystalStructure::Hcp)] {
            for miller in supported_facets(structure) {
                let slab = build_slab(material, miller, [2, 2, 3], 8.0, None, None).unwrap();
                assert_eq!(slab.len(), 12, "{material} {miller:?}");
            }
        }
    }

    #[test]
    fn unsupported_facet_lists_alternatives() {
        let err = build_slab("Zn", &[1, 1, 1], [2, 2, 2], 8.0, None, None).unwrap_err();
        match err {
            SurfaceError::UnsupportedFacet { structure, available, .. } => {
                assert_eq!(structure, CrystalStructure::Hcp);
                assert_eq!(available, "[0, 0, 0, 1]");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn unknown_material_requires_structure_and_lattice() {
        let err = build_slab("Sn", &[1, 1, 1], [2, 2, 2], 8.0, None, None).unwrap_err();
        assert!(matches!(err, SurfaceError::UnknownMaterial { .. }));

        let err = build_slab("Sn", &[1, 1, 1], [2, 2, 2], 8.0, Some(CrystalStructure::Fcc), None)
            .unwrap_err();
        assert!(matches!(err, SurfaceError::InvalidParameter(_)));

        let slab = build_slab("Sn", &[1, 1, 1], [2, 2, 2], 8.0, Some(CrystalStructure::Fcc), Some(6.49))
            .unwrap();
        assert_eq!(slab.len(), 8);
    }

    #[test]
    fn zero_size_and_negative_vacuum_are_rejected() {
        assert!(build_slab("Au", &[1, 1, 1], [0, 2, 2], 8.0, None, None).is_err());
        assert!(build_slab("Au", &[1, 1, 1], [2, 2, 2], -1.0, None, None).is_err());
    }

    #[test]
    fn materials_are_grouped_by_structure() {
        let grouped = list_materials();
        assert_eq!(grouped[&CrystalStructure::Fcc].len(), 10);
        assert_eq!(grouped[&CrystalStructure::Bcc].len(), 7);
        assert_eq!(grouped[&CrystalStructure::Hcp].len(), 9);
        assert_eq!(grouped[&CrystalStructure::Fcc][0], "Ag");
    }

    #[test]
    fn crystal_structure_parses_case_insensitively() {
        assert_eq!("FCC".parse::<CrystalStructure>().unwrap(), CrystalStructure::Fcc);
        assert_eq!(CrystalStructure::Hcp.to_string(), "hcp");
        assert!("diamond".parse::<CrystalStructure>().is_err());
    }
}
