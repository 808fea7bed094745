//! # Engine Module
//!
//! The sampling engine: everything between "a surface and a species name" and "a
//! normalized energy profile with binding statistics".
//!
//! ## Architecture
//!
//! - **Height Grid** ([`grid`]) - Inclusive, drift-tolerant height sequences and subsets
//! - **Backends** ([`backend`]) - The [`backend::EnergyBackend`] contract plus the external
//!   ML predictor and Quantum ESPRESSO families
//! - **Sampler** ([`sampler`]) - Per-backend height sweeps with NaN-tolerant failure handling
//! - **Profile Data** ([`profile`]) - Energy series and the aggregate profile result
//! - **Normalizer** ([`normalize`]) - Rebasing every series on its last valid point
//! - **Analyzer** ([`analysis`]) - Binding energies, optimal heights and summary tables
//! - **Result Sink** ([`sink`]) - JSON and CSV persistence
//! - **Configuration** ([`config`]), **Progress** ([`progress`]) and **Errors** ([`error`])
//!
//! ## Failure Model
//!
//! Setup problems (unknown species, invalid orientation, unavailable backend, malformed
//! grid) abort before any energy is evaluated. A failed evaluation at a single height is
//! recorded as a missing (`NaN`) entry and the sweep continues.

pub mod analysis;
pub mod backend;
pub mod config;
pub mod error;
pub mod grid;
pub mod normalize;
pub mod profile;
pub mod progress;
pub mod sampler;
pub mod sink;
