//! Memory banks of a core.
//!
//! This module implements the storage side of the core. It provides:
//! 1. **Hardware:** cost models ([`Ram`], [`RegBuffer`]) that hold the bytes
//!    and turn one access into a delay and dynamic energy.
//! 2. **Bank:** [`MemoryBank`], a FIFO request queue with its own service
//!    process in front of one hardware model.
//! 3. **Local memory unit:** [`LocalMemoryUnit`], which maps byte addresses to
//!    banks, models weight writes into the PIM array and forwards global
//!    addresses to the chip's global memory.

/// Request queue and service process of one memory.
pub mod bank;

/// Address decoding across the banks of a core.
pub mod local;

/// Banked RAM cost model.
pub mod ram;

/// Register-buffer cost model.
pub mod reg_buffer;

pub use bank::{MemoryAccess, MemoryAccessType, MemoryBank};
pub use local::{GlobalMemoryPort, LocalMemoryUnit};
pub use ram::Ram;
pub use reg_buffer::RegBuffer;

use crate::stats::EnergyReporter;

/// Storage and cost model behind a [`MemoryBank`].
pub trait MemoryHardware {
    /// Performs `access` and returns its delay in nanoseconds.
    ///
    /// `access.address_byte` is relative to the start of the bank. A read fills
    /// `access.data`. An access outside the memory is logged, moves no data and
    /// takes no time.
    fn access(&self, access: &mut MemoryAccess) -> f64;

    /// Widest single access in bytes.
    fn data_width_byte(&self, access_type: MemoryAccessType) -> usize;

    /// Capacity in bytes.
    fn size_byte(&self) -> usize;

    /// Energy report with `read` and `write` sub-modules.
    fn energy_reporter(&self, running_time_ns: f64) -> EnergyReporter;
}

/// Whether `access` fits in a memory of `size_byte` bytes; logs it if not.
fn check_bounds(name: &str, access: &MemoryAccess, size_byte: usize) -> bool {
    let fits = access.address_byte >= 0 && access.address_byte as usize + access.size_byte <= size_byte;
    if !fits {
        tracing::error!(
            memory = name,
            pc = access.ins.pc,
            address = access.address_byte,
            size = access.size_byte,
            capacity = size_byte,
            "memory access out of range"
        );
    }
    fits
}
