use super::builtins::{BUILTIN_SPECIES, BuiltinSpecies};
use crate::core::models::atom::Atom;
use crate::core::models::element::Element;
use crate::core::models::structure::Structure;
use nalgebra::{Point3, Vector3};
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use thiserror::Error;

const CUSTOM_ORIENTATION: &str = "default";

#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("Unknown adsorbant species '{name}'. Available: {available}")]
    UnknownSpecies { name: String, available: String },

    #[error("Orientation '{orientation}' is not available for {species}. Available: {available}")]
    InvalidOrientation {
        species: String,
        orientation: String,
        available: String,
    },

    #[error("Species '{0}' is already defined")]
    DuplicateSpecies(String),

    #[error("Malformed custom species '{name}': {reason}")]
    MalformedSpecies { name: String, reason: String },

    #[error("File I/O error for '{path}': {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("TOML parsing error for '{path}': {source}")]
    Toml {
        path: String,
        source: toml::de::Error,
    },
}

/// Read-only description of a species, built-in or custom.
#[derive(Debug, Clone, PartialEq)]
pub struct SpeciesInfo {
    pub name: String,
    pub description: String,
    pub elements: Vec<Element>,
    pub orientations: Vec<String>,
    pub multiplicity: u8,
}

/// A user-defined rigid adsorbant: atoms at fixed offsets from the placement point.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CustomSpecies {
    #[serde(default)]
    pub description: String,
    pub elements: Vec<Element>,
    pub offsets: Vec<[f64; 3]>,
    #[serde(default = "default_multiplicity")]
    pub multiplicity: u8,
}

fn default_multiplicity() -> u8 {
    1
}

impl CustomSpecies {
    fn validate(&self, name: &str) -> Result<(), TemplateError> {
        if self.elements.is_empty() {
            return Err(TemplateError::MalformedSpecies {
                name: name.to_string(),
                reason: "no atoms defined".to_string(),
            });
        }
        if self.elements.len() != self.offsets.len() {
            return Err(TemplateError::MalformedSpecies {
                name: name.to_string(),
                reason: format!(
                    "{} elements but {} offsets",
                    self.elements.len(),
                    self.offsets.len()
                ),
            });
        }
        Ok(())
    }
}

/// Places a rigid set of atoms so that every offset is taken relative to `center`.
pub fn create_custom_adsorbant(
    elements: &[Element],
    offsets: &[[f64; 3]],
    center: &Point3<f64>,
) -> Result<Structure, TemplateError> {
    if elements.len() != offsets.len() {
        return Err(TemplateError::MalformedSpecies {
            name: "<inline>".to_string(),
            reason: format!(
                "{} elements but {} offsets",
                elements.len(),
                offsets.len()
            ),
        });
    }
    let atoms = elements
        .iter()
        .zip(offsets)
        .map(|(&element, offset)| Atom::new(element, center + Vector3::from(*offset)))
        .collect();
    Ok(Structure::new(atoms))
}

enum Entry<'a> {
    Builtin(&'static BuiltinSpecies),
    Custom(&'a CustomSpecies),
}

/// The Structure Template Provider: resolves `(species, orientation)` to a rigid geometry.
///
/// The library always contains the built-in species table; custom species can be added
/// programmatically or loaded from a TOML file whose top-level tables are species names.
#[derive(Debug, Clone, Default)]
pub struct TemplateLibrary {
    custom: BTreeMap<String, CustomSpecies>,
}

impl TemplateLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads custom species from a TOML file and adds them to the built-in table.
    pub fn load_custom(mut self, path: &Path) -> Result<Self, TemplateError> {
        let content = std::fs::read_to_string(path).map_err(|e| TemplateError::Io {
            path: path.to_string_lossy().to_string(),
            source: e,
        })?;
        let entries: HashMap<String, CustomSpecies> =
            toml::from_str(&content).map_err(|e| TemplateError::Toml {
                path: path.to_string_lossy().to_string(),
                source: e,
            })?;
        for (name, species) in entries {
            self = self.with_custom(name, species)?;
        }
        Ok(self)
    }

    pub fn with_custom(
        mut self,
        name: impl Into<String>,
        species: CustomSpecies,
    ) -> Result<Self, TemplateError> {
        let name = name.into();
        if BUILTIN_SPECIES.contains_key(name.as_str()) || self.custom.contains_key(&name) {
            return Err(TemplateError::DuplicateSpecies(name));
        }
        species.validate(&name)?;
        self.custom.insert(name, species);
        Ok(self)
    }

    /// All species names, sorted.
    pub fn species_names(&self) -> Vec<String> {
        let mut names: Vec<String> = BUILTIN_SPECIES
            .keys()
            .map(|k| k.to_string())
            .chain(self.custom.keys().cloned())
            .collect();
        names.sort();
        names
    }

    pub fn info(&self, species: &str) -> Result<SpeciesInfo, TemplateError> {
        Ok(match self.entry(species)? {
            Entry::Builtin(b) => SpeciesInfo {
                name: species.to_string(),
                description: b.description.to_string(),
                elements: b.elements.to_vec(),
                orientations: b.orientations.iter().map(|(o, _)| o.to_string()).collect(),
                multiplicity: b.multiplicity,
            },
            Entry::Custom(c) => SpeciesInfo {
                name: species.to_string(),
                description: c.description.clone(),
                elements: c.elements.clone(),
                orientations: vec![CUSTOM_ORIENTATION.to_string()],
                multiplicity: c.multiplicity,
            },
        })
    }

    /// The first declared orientation of a species.
    pub fn default_orientation(&self, species: &str) -> Result<&'static str, TemplateError> {
        Ok(match self.entry(species)? {
            Entry::Builtin(b) => b
                .orientations
                .first()
                .map_or(CUSTOM_ORIENTATION, |(o, _)| *o),
            Entry::Custom(_) => CUSTOM_ORIENTATION,
        })
    }

    /// Checks that `species` exists and declares `orientation`, without building anything.
    pub fn validate(&self, species: &str, orientation: &str) -> Result<(), TemplateError> {
        match self.entry(species)? {
            Entry::Builtin(b) => {
                Self::builtin_builder(species, b, orientation)?;
            }
            Entry::Custom(_) => Self::check_custom_orientation(species, orientation)?,
        }
        Ok(())
    }

    /// Builds the rigid adsorbant with its anchor atom at `placement`.
    ///
    /// # Errors
    ///
    /// Returns [`TemplateError::UnknownSpecies`] if the species is not registered and
    /// [`TemplateError::InvalidOrientation`] if it does not declare `orientation`.
    pub fn get_template(
        &self,
        species: &str,
        placement: &Point3<f64>,
        orientation: &str,
    ) -> Result<Structure, TemplateError> {
        match self.entry(species)? {
            Entry::Builtin(b) => {
                let build = Self::builtin_builder(species, b, orientation)?;
                Ok(Structure::new(build(placement)))
            }
            Entry::Custom(c) => {
                Self::check_custom_orientation(species, orientation)?;
                create_custom_adsorbant(&c.elements, &c.offsets, placement)
            }
        }
    }

    fn entry(&self, species: &str) -> Result<Entry<'_>, TemplateError> {
        if let Some(builtin) = BUILTIN_SPECIES.get(species) {
            return Ok(Entry::Builtin(builtin));
        }
        self.custom
            .get(species)
            .map(Entry::Custom)
            .ok_or_else(|| TemplateError::UnknownSpecies {
                name: species.to_string(),
                available: self.species_names().join(", "),
            })
    }

    fn builtin_builder(
        species: &str,
        builtin: &'static BuiltinSpecies,
        orientation: &str,
    ) -> Result<super::builtins::GeometryBuilder, TemplateError> {
        builtin
            .orientations
            .iter()
            .find(|(name, _)| *name == orientation)
            .map(|(_, build)| *build)
            .ok_or_else(|| TemplateError::InvalidOrientation {
                species: species.to_string(),
                orientation: orientation.to_string(),
                available: builtin
                    .orientations
                    .iter()
                    .map(|(o, _)| *o)
                    .collect::<Vec<_>>()
                    .join(", "),
            })
    }

    fn check_custom_orientation(species: &str, orientation: &str) -> Result<(), TemplateError> {
        if orientation == CUSTOM_ORIENTATION {
            Ok(())
        } else {
            Err(TemplateError::InvalidOrientation {
                species: species.to_string(),
                orientation: orientation.to_string(),
                available: CUSTOM_ORIENTATION.to_string(),
            })
        }
    }
}
