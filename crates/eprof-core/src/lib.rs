//! # eprof Core Library
//!
//! A library for sampling adsorption energy profiles: the energy of an adsorbant
//! (a molecule, cluster or single atom) as a function of its height above a crystal
//! or 2D-material surface, evaluated with machine-learned potentials or DFT.
//!
//! ## Architectural Philosophy
//!
//! The library follows a strict three-layer architecture:
//!
//! - **[`core`]: The Foundation.** Stateless data models (`Atom`, `Structure`, `Cell`),
//!   the adsorbant template table, surface builders and structure file I/O.
//!
//! - **[`engine`]: The Logic Core.** The height grid, the pluggable energy backends,
//!   the profile sampler with its NaN-tolerant failure policy, normalization,
//!   binding-energy analysis and the result sink.
//!
//! - **[`workflows`]: The Public API.** Ties `engine` and `core` together into a single
//!   "calculate an energy profile" procedure with progress reporting and persistence.

pub mod core;
pub mod engine;
pub mod workflows;
