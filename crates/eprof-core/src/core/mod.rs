//! # Core Module
//!
//! Stateless building blocks shared by the sampling engine.
//!
//! - **Models** ([`models`]) - Elements, atoms, periodic cells and immutable structures
//! - **Templates** ([`templates`]) - Rigid adsorbant geometries keyed by species and orientation
//! - **Surfaces** ([`surfaces`]) - Crystal slab and 2D layer builders plus surface geometry facts
//! - **I/O** ([`io`]) - Structure file formats (extended XYZ)

pub mod io;
pub mod models;
pub mod surfaces;
pub mod templates;
