//! # Simulator Testing Library
//!
//! Single integration test binary for the simulator. Shared builders and the
//! run harness live in [`common`]; scenario suites grouped by subsystem live
//! in [`unit`].

/// Shared test infrastructure.
///
/// - **Builders**: Fluent construction of static instruction records.
/// - **Harness**: A `TestContext` producing configurations, programs and a
///   ready-to-run simulator, plus helpers to probe a run edge by edge.
pub mod common;

/// Scenario suites for the core, the PIM hierarchy and the simulator driver.
pub mod unit;
