//! Chip-level global memory.
//!
//! One RAM shared by all cores and reached through the network. Addresses are
//! absolute; the memory serves them relative to its configured offset.

use std::rc::Rc;

use super::memory::{MemoryBank, Ram};
use crate::common::SimResult;
use crate::config::{AddressSpaceConfig, RamConfig};
use crate::core::payload::InstructionPayload;
use crate::sim::SimContext;
use crate::stats::EnergyReporter;

/// Global memory node.
#[derive(Debug)]
pub struct GlobalMemory {
    node_id: usize,
    bank: Rc<MemoryBank>,
}

impl GlobalMemory {
    /// Creates the memory as network node `node_id`.
    ///
    /// # Errors
    ///
    /// Returns an error if the memory image cannot be read.
    pub fn new(
        ctx: &SimContext,
        config: &RamConfig,
        addressing: AddressSpaceConfig,
        node_id: usize,
    ) -> SimResult<Self> {
        let ram = Ram::new(ctx, "GlobalMemory", config)?;
        Ok(Self {
            node_id,
            bank: MemoryBank::new(ctx.kernel(), "GlobalMemory", addressing, Box::new(ram)),
        })
    }

    /// Network node of the memory.
    pub const fn node_id(&self) -> usize {
        self.node_id
    }

    /// Whether `address_byte` lies in global memory.
    pub fn contains(&self, address_byte: i64) -> bool {
        self.bank.contains(address_byte)
    }

    /// Capacity in bytes.
    pub fn size_byte(&self) -> usize {
        self.bank.size_byte()
    }

    /// Reads at an absolute address.
    pub async fn read(&self, ins: InstructionPayload, address_byte: i64, size_byte: usize) -> Vec<u8> {
        self.bank.read(ins, address_byte, size_byte).await
    }

    /// Writes at an absolute address.
    pub async fn write(&self, ins: InstructionPayload, address_byte: i64, size_byte: usize, data: Vec<u8>) {
        self.bank.write(ins, address_byte, size_byte, data).await;
    }

    /// Energy report of the RAM.
    pub fn energy_reporter(&self, running_time_ns: f64) -> EnergyReporter {
        self.bank.energy_reporter(running_time_ns)
    }
}
