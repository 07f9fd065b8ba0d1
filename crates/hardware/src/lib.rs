//! Processing-in-memory accelerator simulator library.
//!
//! This crate implements a cycle-accurate simulator of a multi-core PIM chip with the following:
//! 1. **Core:** Per-cycle issue loop, hazard detection and eight execution units (scalar, SIMD,
//!    transfer and the PIM compute, load, output, set and transfer units).
//! 2. **PIM:** The macro, macro group and macro group controller pipelines driven bit-serially.
//! 3. **ISA:** Static instruction records and their classification.
//! 4. **SoC:** Local memory banks, the global memory, the network and the chip.
//! 5. **Simulation:** Discrete-event kernel, clock, context, program loader and energy reports.

/// Common types and constants (errors, register counts, bit helpers).
pub mod common;
/// Simulator configuration (defaults, enums, hierarchical config structures).
pub mod config;
/// Core issue loop, hazard model and execution units.
pub mod core;
/// Instruction records, classification and disassembly.
pub mod isa;
/// Discrete-event kernel, clock, loader and simulator driver.
pub mod sim;
/// Chip, memories and network.
pub mod soc;
/// Energy and latency reporting.
pub mod stats;

/// Root configuration type; use `Config::default()` or deserialize from JSON.
pub use crate::config::Config;
/// One core of the chip; owns its execution units and local memory.
pub use crate::core::Core;
/// Simulation driver; loads a configuration and programs and produces a report.
pub use crate::sim::Simulator;
/// Top-level chip; construct with `Chip::new`.
pub use crate::soc::Chip;
/// Final report of a run.
pub use crate::stats::Reporter;
