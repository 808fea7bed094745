//! Rigid adsorbant geometries.
//!
//! Every built-in species registers one geometry function per orientation in a static
//! lookup table, so resolving `(species, orientation)` is a table lookup rather than a
//! chain of string comparisons. Custom rigid species can be layered on top from a TOML
//! file through [`library::TemplateLibrary`].

mod builtins;
pub mod library;

pub use library::{CustomSpecies, SpeciesInfo, TemplateError, TemplateLibrary, create_custom_adsorbant};
