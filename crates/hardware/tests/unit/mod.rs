//! # Scenario Suites
//!
//! Integration scenarios grouped by subsystem. Every suite drives the public
//! API of `pimsim_core` through the shared `TestContext` harness.

/// Algebraic laws of the conflict-record combine.
pub mod conflict_laws;

/// Core issue, hazards and register forwarding.
pub mod core;

/// PIM macro hierarchy and PIM units.
pub mod pim;

/// Simulator driver, loader and reports.
pub mod sim;
