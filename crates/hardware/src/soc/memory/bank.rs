//! Request queue in front of one memory.
//!
//! Each [`MemoryBank`] serves one access at a time, in arrival order. The
//! caller suspends until its access has been served; the bank's service
//! process waits out the delay reported by the hardware model before it
//! releases the caller. Scalar-unit accesses are served without delay.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::fmt;
use std::rc::Rc;

use super::MemoryHardware;
use crate::config::AddressSpaceConfig;
use crate::core::payload::{ExecuteUnitType, InstructionPayload};
use crate::sim::{Event, Kernel};
use crate::stats::EnergyReporter;

/// Direction of a memory access.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemoryAccessType {
    /// Data flows out of the memory.
    Read,
    /// Data flows into the memory.
    Write,
}

/// One access as seen by the hardware model.
#[derive(Debug, Clone)]
pub struct MemoryAccess {
    /// Instruction issuing the access.
    pub ins: InstructionPayload,
    /// Read or write.
    pub access_type: MemoryAccessType,
    /// Byte address relative to the start of the memory.
    pub address_byte: i64,
    /// Number of bytes.
    pub size_byte: usize,
    /// Bytes to write, or bytes read once served.
    pub data: Vec<u8>,
}

struct PendingAccess {
    access: RefCell<MemoryAccess>,
    finish: Event,
}

/// FIFO-served memory mapped at an address range.
pub struct MemoryBank {
    name: String,
    addressing: AddressSpaceConfig,
    hardware: Box<dyn MemoryHardware>,
    kernel: Kernel,
    queue: RefCell<VecDeque<Rc<PendingAccess>>>,
    start_process: Event,
}

impl fmt::Debug for MemoryBank {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryBank")
            .field("name", &self.name)
            .field("addressing", &self.addressing)
            .field("queued", &self.queue.borrow().len())
            .finish_non_exhaustive()
    }
}

impl MemoryBank {
    /// Creates the bank and spawns its service process.
    pub fn new(
        kernel: &Kernel,
        name: impl Into<String>,
        addressing: AddressSpaceConfig,
        hardware: Box<dyn MemoryHardware>,
    ) -> Rc<Self> {
        let name = name.into();
        let bank = Rc::new(Self {
            start_process: kernel.event(format!("{name}.start_process")),
            name,
            addressing,
            hardware,
            kernel: kernel.clone(),
            queue: RefCell::new(VecDeque::new()),
        });
        let this = Rc::clone(&bank);
        kernel.spawn(format!("{}.process", bank.name), async move { this.process().await });
        bank
    }

    async fn process(&self) {
        loop {
            let next = self.queue.borrow_mut().pop_front();
            let Some(pending) = next else {
                self.start_process.wait().await;
                continue;
            };
            let (delay_ns, unit_type) = {
                let mut access = pending.access.borrow_mut();
                (self.hardware.access(&mut access), access.ins.unit_type)
            };
            if unit_type != ExecuteUnitType::Scalar && delay_ns > 0.0 {
                self.kernel.wait_ns(delay_ns).await;
            }
            pending.finish.notify();
        }
    }

    /// Queues `access` and suspends until it has been served.
    ///
    /// Returns the bytes read; writes return an empty buffer.
    pub async fn access(&self, access: MemoryAccess) -> Vec<u8> {
        tracing::trace!(
            memory = %self.name,
            pc = access.ins.pc,
            ins_id = access.ins.ins_id,
            access = ?access.access_type,
            address = access.address_byte,
            size = access.size_byte,
            "memory access"
        );
        let pending = Rc::new(PendingAccess {
            access: RefCell::new(access),
            finish: self.kernel.event(format!("{}.finish_access", self.name)),
        });
        let finished = pending.finish.wait();
        self.queue.borrow_mut().push_back(Rc::clone(&pending));
        self.start_process.notify();
        finished.await;
        let mut access = pending.access.borrow_mut();
        std::mem::take(&mut access.data)
    }

    /// Reads `size_byte` bytes at absolute `address_byte`.
    pub async fn read(&self, ins: InstructionPayload, address_byte: i64, size_byte: usize) -> Vec<u8> {
        self.access(MemoryAccess {
            ins,
            access_type: MemoryAccessType::Read,
            address_byte: address_byte - self.addressing.offset_byte,
            size_byte,
            data: Vec::new(),
        })
        .await
    }

    /// Writes `data` as `size_byte` bytes at absolute `address_byte`.
    pub async fn write(&self, ins: InstructionPayload, address_byte: i64, size_byte: usize, data: Vec<u8>) {
        let _ = self
            .access(MemoryAccess {
                ins,
                access_type: MemoryAccessType::Write,
                address_byte: address_byte - self.addressing.offset_byte,
                size_byte,
                data,
            })
            .await;
    }

    /// Bank name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Address range of the bank.
    pub const fn addressing(&self) -> &AddressSpaceConfig {
        &self.addressing
    }

    /// Whether `address_byte` is mapped to this bank.
    pub const fn contains(&self, address_byte: i64) -> bool {
        self.addressing.contains(address_byte)
    }

    /// Widest single access in bytes.
    pub fn data_width_byte(&self, access_type: MemoryAccessType) -> usize {
        self.hardware.data_width_byte(access_type)
    }

    /// Capacity in bytes.
    pub fn size_byte(&self) -> usize {
        self.hardware.size_byte()
    }

    /// Energy report of the hardware model.
    pub fn energy_reporter(&self, running_time_ns: f64) -> EnergyReporter {
        self.hardware.energy_reporter(running_time_ns)
    }
}
