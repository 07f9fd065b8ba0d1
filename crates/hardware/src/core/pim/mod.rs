//! PIM units.
//!
//! The compute unit drives a hierarchy of macro groups, each made of macros
//! and a controller chained through submodule sockets. The load, output, set
//! and transfer units each run a two-process issue/execute pair: the latch is
//! released as soon as the execute stage takes the instruction.

/// Macro group controller.
pub mod controller;
/// PIM compute unit.
pub mod compute;
/// Macro group.
pub mod group;
/// PIM load unit.
pub mod load;
/// PIM output unit.
pub mod output;
/// Payloads of the compute hierarchy.
pub mod payload;
/// A single macro.
pub mod pim_macro;
/// PIM set unit.
pub mod set;
/// PIM transfer unit.
pub mod transfer;

pub use compute::PimComputeUnit;
pub use group::MacroGroup;
pub use load::PimLoadUnit;
pub use output::PimOutputUnit;
pub use pim_macro::Macro;
pub use set::PimSetUnit;
pub use transfer::PimTransferUnit;
