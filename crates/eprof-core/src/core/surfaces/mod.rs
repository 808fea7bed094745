//! The Surface Provider: periodic slabs and 2D layers above which adsorbants are placed.
//!
//! A [`Surface`] wraps a periodic [`Structure`] together with the two geometry facts the
//! sampler needs, the z coordinate of its topmost atom and its in-plane center.
//! Surfaces are built from a [`SurfaceSpec`] by [`build_surface`]:
//!
//! - **Crystal slabs** ([`crystal`]) - fcc, bcc and hcp low-index facets from a built-in
//!   material table, with vacuum added on both sides of the slab.
//! - **2D layers** ([`layered`]) - 2H transition-metal dichalcogenides, graphene and h-BN.
//! - **Files** - any extended XYZ file carrying a `Lattice`.

pub mod crystal;
pub mod info;
pub mod layered;

use crate::core::io::traits::StructureFile;
use crate::core::io::xyz::{ExtXyzFile, XyzError};
use crate::core::models::element::{Element, ElementParseError};
use crate::core::models::structure::{Structure, StructureError};
use crystal::CrystalStructure;
use nalgebra::Point3;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SurfaceError {
    #[error("Unknown material '{material}'. Available: {available}")]
    UnknownMaterial { material: String, available: String },

    #[error("Miller indices {miller} are not supported for {structure}. Available: {available}")]
    UnsupportedFacet {
        structure: CrystalStructure,
        miller: String,
        available: String,
    },

    #[error("Invalid surface parameter: {0}")]
    InvalidParameter(String),

    #[error("Surface '{0}' contains no atoms")]
    Empty(String),

    #[error(transparent)]
    Element(#[from] ElementParseError),

    #[error(transparent)]
    Structure(#[from] StructureError),

    #[error("Failed to read surface file '{path}': {source}")]
    File {
        path: String,
        #[source]
        source: XyzError,
    },
}

/// How to obtain a surface.
#[derive(Debug, Clone, PartialEq)]
pub enum SurfaceSpec {
    /// A crystal slab cut from a bulk metal.
    Crystal {
        material: String,
        miller: Vec<i32>,
        /// Repetitions along the two in-plane vectors and number of layers.
        size: [usize; 3],
        vacuum: f64,
        /// Overrides the crystal structure from the material table.
        crystal_structure: Option<CrystalStructure>,
        /// Required for materials missing from the table.
        lattice_constant: Option<f64>,
    },
    /// A single 2D layer.
    TwoD {
        material: String,
        size: [usize; 2],
        vacuum: f64,
    },
    /// A pre-built slab in extended XYZ format.
    File { path: PathBuf },
}

/// A periodic slab with the geometry facts used for adsorbant placement.
#[derive(Debug, Clone, PartialEq)]
pub struct Surface {
    name: String,
    structure: Structure,
    top_z: f64,
    center_xy: (f64, f64),
}

impl Surface {
    /// Wraps a structure as a surface.
    ///
    /// The in-plane center is half of the first two diagonal cell entries when a cell is
    /// present, and the atomic centroid otherwise.
    ///
    /// # Errors
    ///
    /// Returns [`SurfaceError::Empty`] if the structure has no atoms.
    pub fn new(name: impl Into<String>, structure: Structure) -> Result<Self, SurfaceError> {
        let name = name.into();
        let Some(top_z) = structure.top_z() else {
            return Err(SurfaceError::Empty(name));
        };
        let center_xy = match structure.cell() {
            Some(cell) => {
                let m = cell.matrix();
                (m[(0, 0)] / 2.0, m[(1, 1)] / 2.0)
            }
            None => {
                let n = structure.len() as f64;
                let (sx, sy) = structure
                    .atoms()
                    .iter()
                    .fold((0.0, 0.0), |(x, y), a| (x + a.position.x, y + a.position.y));
                (sx / n, sy / n)
            }
        };
        Ok(Self {
            name,
            structure,
            top_z,
            center_xy,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn structure(&self) -> &Structure {
        &self.structure
    }

    pub fn top_z(&self) -> f64 {
        self.top_z
    }

    pub fn center_xy(&self) -> (f64, f64) {
        self.center_xy
    }

    pub fn elements(&self) -> Vec<Element> {
        self.structure.elements()
    }

    /// The point `height` Angstroms above the topmost atom, over the in-plane center.
    pub fn placement_point(&self, height: f64) -> Point3<f64> {
        Point3::new(self.center_xy.0, self.center_xy.1, self.top_z + height)
    }
}

/// Builds a surface from its specification.
pub fn build_surface(spec: &SurfaceSpec) -> Result<Surface, SurfaceError> {
    match spec {
        SurfaceSpec::Crystal {
            material,
            miller,
            size,
            vacuum,
            crystal_structure,
            lattice_constant,
        } => {
            let structure = crystal::build_slab(
                material,
                miller,
                *size,
                *vacuum,
                *crystal_structure,
                *lattice_constant,
            )?;
            let indices = miller
                .iter()
                .map(|i| i.to_string())
                .collect::<Vec<_>>()
                .join(",");
            Surface::new(format!("{material}({indices})"), structure)
        }
        SurfaceSpec::TwoD {
            material,
            size,
            vacuum,
        } => {
            let structure = layered::build_layer(material, *size, *vacuum)?;
            Surface::new(material.clone(), structure)
        }
        SurfaceSpec::File { path } => {
            let structure =
                ExtXyzFile::read_from_path(path).map_err(|source| SurfaceError::File {
                    path: path.to_string_lossy().to_string(),
                    source,
                })?;
            let name = path
                .file_stem()
                .map(|s| s.to_string_lossy().to_string())
                .unwrap_or_else(|| "custom".to_string());
            Surface::new(name, structure)
        }
    }
}

pub(crate) fn check_vacuum(vacuum: f64) -> Result<(), SurfaceError> {
    if !vacuum.is_finite() || vacuum < 0.0 {
        return Err(SurfaceError::InvalidParameter(format!(
            "vacuum must be a non-negative number, got {vacuum}"
        )));
    }
    Ok(())
}
