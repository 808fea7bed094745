//! # Workflows Module
//!
//! High-level entry points that orchestrate a complete energy-profile calculation.
//!
//! ## Overview
//!
//! A workflow takes a validated [`crate::engine::config::ProfileConfig`], the template
//! library and already-constructed backends, and drives the whole pipeline: surface
//! construction, grid and DFT subset derivation, sampling, normalization, persistence and
//! binding analysis. Progress is reported through a
//! [`crate::engine::progress::ProgressReporter`].
//!
//! ## Architecture
//!
//! - **Profile Workflow** ([`profile`]) - Height sweep of one adsorbant over one surface
//!   under every configured ML task and, optionally, DFT.

pub mod profile;
