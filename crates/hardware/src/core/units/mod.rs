//! Execution units of a core.
//!
//! Every unit sits behind an [`crate::core::fsm::Fsm`] latch and talks to the
//! core through its [`UnitPorts`]. This module contains:
//! 1. **Register unit:** [`reg::RegUnit`], the register files with bypass.
//! 2. **Scalar unit:** [`scalar::ScalarUnit`], ALU operations, loads, stores
//!    and register assignment.
//! 3. **SIMD unit:** [`simd::SimdUnit`], a read/execute/write vector pipeline.
//! 4. **Transfer unit:** [`transfer::TransferUnit`], batched memory moves.
//!
//! The PIM units live in [`crate::core::pim`].

/// Register files with write-to-read bypass.
pub mod reg;

/// Scalar ALU and memory access unit.
pub mod scalar;

/// SIMD vector unit.
pub mod simd;

/// Memory-to-memory transfer unit.
pub mod transfer;

use std::rc::Rc;

use crate::core::payload::{ExecuteUnitType, UnitPayload};
use crate::core::ports::UnitPorts;
use crate::stats::EnergyReporter;

/// Interface between the core's issue loop and one execution unit.
pub trait ExecuteUnit {
    /// Unit type served.
    fn unit_type(&self) -> ExecuteUnitType {
        self.ports().unit_type()
    }

    /// Channel between the core and the unit.
    fn ports(&self) -> &Rc<UnitPorts>;

    /// Offers a decoded instruction to the unit's latch.
    ///
    /// # Errors
    ///
    /// Hands the payload back if the latch is busy, the clock edge is not
    /// asserted or the payload belongs to another unit.
    fn try_issue(&self, payload: UnitPayload) -> Result<(), UnitPayload>;

    /// Energy report of the unit.
    fn energy_reporter(&self, running_time_ns: f64) -> EnergyReporter;
}
