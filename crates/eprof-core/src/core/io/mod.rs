//! Provides input/output functionality for atomic structure file formats.
//!
//! Structures are exchanged with external backends and written as side artifacts in
//! the extended XYZ format, which carries the periodic cell and periodicity flags in
//! its comment line.

pub mod traits;
pub mod xyz;
