//! Chip-level components.
//!
//! This module organizes the components outside the cores: the local memory
//! banks each core owns, the global memory, the network connecting them and
//! the [`Chip`] that assembles everything.

/// Chip construction and completion tracking.
pub mod chip;

/// Global memory shared by the cores.
pub mod global_memory;

/// Local memory banks and address decoding.
pub mod memory;

/// Network between the cores and global memory.
pub mod network;

pub use chip::Chip;
