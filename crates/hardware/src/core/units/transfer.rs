//! Transfer unit.
//!
//! Moves a block of bytes between two memories in batches no wider than the
//! narrower of the source read width and the destination write width. A
//! transfer touching global memory moves in a single batch. Batches flow
//! through a read and a write stage; the two overlap only when pipelining is
//! enabled and source and destination are different local banks.

use std::fmt;
use std::rc::Rc;

use super::ExecuteUnit;
use crate::config::TransferUnitConfig;
use crate::core::fsm::Fsm;
use crate::core::payload::{TransferInsPayload, UnitPayload};
use crate::core::ports::UnitPorts;
use crate::core::socket::{BatchInfo, SubmoduleSocket};
use crate::sim::{Event, SimContext};
use crate::soc::memory::{LocalMemoryUnit, MemoryAccessType};
use crate::stats::EnergyReporter;

#[derive(Debug)]
struct TransferInsInfo {
    payload: TransferInsPayload,
    batch_max_size_byte: usize,
    use_pipeline: bool,
}

#[derive(Debug, Clone)]
struct TransferStagePayload {
    info: Rc<TransferInsInfo>,
    batch: BatchInfo,
    data: Vec<u8>,
}

impl TransferStagePayload {
    fn offset_byte(&self) -> i64 {
        (self.batch.batch_num * self.info.batch_max_size_byte) as i64
    }
}

/// Memory-to-memory transfer unit.
pub struct TransferUnit {
    ports: Rc<UnitPorts>,
    fsm: Fsm<TransferInsPayload>,
    memory: Rc<LocalMemoryUnit>,
    pipeline: bool,
    read_socket: SubmoduleSocket<TransferStagePayload>,
    write_socket: SubmoduleSocket<TransferStagePayload>,
    next_batch: Event,
}

impl fmt::Debug for TransferUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransferUnit")
            .field("fsm", &self.fsm)
            .field("pipeline", &self.pipeline)
            .finish_non_exhaustive()
    }
}

impl TransferUnit {
    /// Creates the unit and spawns its issue and stage processes.
    pub fn new(
        ctx: &SimContext,
        config: &TransferUnitConfig,
        ports: Rc<UnitPorts>,
        memory: Rc<LocalMemoryUnit>,
    ) -> Rc<Self> {
        let kernel = ctx.kernel();
        let unit = Rc::new(Self {
            ports,
            fsm: Fsm::new(kernel, ctx.clock(), "TransferUnit"),
            memory,
            pipeline: config.pipeline,
            read_socket: SubmoduleSocket::new(kernel, "TransferUnit.read"),
            write_socket: SubmoduleSocket::new(kernel, "TransferUnit.write"),
            next_batch: kernel.event("TransferUnit.next_batch"),
        });
        let this = Rc::clone(&unit);
        kernel.spawn("TransferUnit.issue", async move { this.process_issue().await });
        let this = Rc::clone(&unit);
        kernel.spawn("TransferUnit.read", async move { this.process_read().await });
        let this = Rc::clone(&unit);
        kernel.spawn("TransferUnit.write", async move { this.process_write().await });
        unit
    }

    fn decode(&self, payload: TransferInsPayload) -> TransferInsInfo {
        let src_id = self.memory.memory_id_by_address(payload.src_address_byte);
        let dst_id = self.memory.memory_id_by_address(payload.dst_address_byte);
        let src_width = src_id.and_then(|id| self.memory.memory_data_width_by_id(id, MemoryAccessType::Read));
        let dst_width = dst_id.and_then(|id| self.memory.memory_data_width_by_id(id, MemoryAccessType::Write));
        let global = self.memory.is_global_address(payload.src_address_byte)
            || self.memory.is_global_address(payload.dst_address_byte);
        let batch_max_size_byte = match (src_width, dst_width) {
            (Some(src), Some(dst)) if !global => src.min(dst),
            _ => payload.size_byte,
        };
        TransferInsInfo {
            use_pipeline: self.pipeline && !global && src_id != dst_id,
            batch_max_size_byte: batch_max_size_byte.max(1),
            payload,
        }
    }

    async fn process_issue(&self) {
        loop {
            let payload = self.fsm.wait_start().await;
            self.ports.set_busy(true);
            tracing::debug!(
                unit = "TransferUnit",
                pc = payload.ins.pc,
                ins_id = payload.ins.ins_id,
                src = payload.src_address_byte,
                dst = payload.dst_address_byte,
                size = payload.size_byte,
                "start"
            );

            let info = Rc::new(self.decode(payload));
            for batch in BatchInfo::split(info.payload.size_byte, info.batch_max_size_byte) {
                let next_batch = self.next_batch.wait();
                self.read_socket
                    .start(TransferStagePayload {
                        info: Rc::clone(&info),
                        batch,
                        data: Vec::new(),
                    })
                    .await;
                if !batch.last_batch {
                    next_batch.await;
                }
            }

            self.ports.set_busy(false);
            self.fsm.finish_exec();
        }
    }

    async fn process_read(&self) {
        loop {
            let mut stage = self.read_socket.wait_until_start().await;
            let ins = stage.info.payload.ins;
            tracing::trace!(pc = ins.pc, ins_id = ins.ins_id, batch = stage.batch.batch_num, "transfer read");

            let address_byte = stage.info.payload.src_address_byte + stage.offset_byte();
            stage.data = self
                .memory
                .read_data(ins, address_byte, stage.batch.batch_len)
                .await;

            let pipelined = stage.info.use_pipeline && !stage.batch.last_batch;
            self.write_socket.start(stage).await;
            if pipelined {
                self.next_batch.notify();
            }
            self.read_socket.finish();
        }
    }

    async fn process_write(&self) {
        loop {
            let stage = self.write_socket.wait_until_start().await;
            let ins = stage.info.payload.ins;
            tracing::trace!(pc = ins.pc, ins_id = ins.ins_id, batch = stage.batch.batch_num, "transfer write");

            if stage.batch.last_batch {
                self.ports.finish_ins(&ins);
            }
            let address_byte = stage.info.payload.dst_address_byte + stage.offset_byte();
            let notify_next = !stage.info.use_pipeline && !stage.batch.last_batch;
            let last_batch = stage.batch.last_batch;
            self.memory
                .write_data(ins, address_byte, stage.batch.batch_len, stage.data)
                .await;

            if notify_next {
                self.next_batch.notify();
            }
            self.write_socket.finish();
            if last_batch {
                tracing::debug!(unit = "TransferUnit", pc = ins.pc, ins_id = ins.ins_id, "complete");
                self.ports.complete(&ins);
            }
        }
    }
}

impl ExecuteUnit for TransferUnit {
    fn ports(&self) -> &Rc<UnitPorts> {
        &self.ports
    }

    fn try_issue(&self, payload: UnitPayload) -> Result<(), UnitPayload> {
        match payload {
            UnitPayload::Transfer(transfer) => self.fsm.try_latch(transfer).map_err(UnitPayload::Transfer),
            other => Err(other),
        }
    }

    fn energy_reporter(&self, _running_time_ns: f64) -> EnergyReporter {
        EnergyReporter::default()
    }
}
