//! PIM transfer unit: compacts the valid outputs of a PIM result vector.
//!
//! Outputs whose mask bit is set are copied one by one into a staging buffer.
//! Whenever the buffer is full, and after the last output, the buffer is
//! flushed to the destination. The buffer holds as many outputs as fit in the
//! bank it lives in.

use std::fmt;
use std::rc::Rc;

use crate::common::BYTE_TO_BIT;
use crate::common::bits::{count_mask_bits, div_ceil, mask_bit};
use crate::core::fsm::Fsm;
use crate::core::payload::{PimTransferInsPayload, UnitPayload};
use crate::core::ports::UnitPorts;
use crate::core::socket::SubmoduleSocket;
use crate::core::units::ExecuteUnit;
use crate::sim::SimContext;
use crate::soc::memory::LocalMemoryUnit;
use crate::stats::EnergyReporter;

/// PIM valid-output compaction unit.
pub struct PimTransferUnit {
    ports: Rc<UnitPorts>,
    fsm: Fsm<PimTransferInsPayload>,
    memory: Rc<LocalMemoryUnit>,
    execute_socket: SubmoduleSocket<PimTransferInsPayload>,
}

impl fmt::Debug for PimTransferUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PimTransferUnit")
            .field("fsm", &self.fsm)
            .field("execute", &self.execute_socket)
            .finish_non_exhaustive()
    }
}

impl PimTransferUnit {
    /// Creates the unit and spawns its issue and execute processes.
    pub fn new(ctx: &SimContext, ports: Rc<UnitPorts>, memory: Rc<LocalMemoryUnit>) -> Rc<Self> {
        let kernel = ctx.kernel();
        let unit = Rc::new(Self {
            ports,
            fsm: Fsm::new(kernel, ctx.clock(), "PimTransferUnit"),
            memory,
            execute_socket: SubmoduleSocket::new(kernel, "PimTransferUnit.execute"),
        });
        let this = Rc::clone(&unit);
        kernel.spawn("PimTransferUnit.issue", async move { this.process_issue().await });
        let this = Rc::clone(&unit);
        kernel.spawn("PimTransferUnit.execute", async move { this.process_execute().await });
        unit
    }

    async fn process_issue(&self) {
        loop {
            let payload = self.fsm.wait_start().await;
            self.ports.set_busy(true);
            tracing::debug!(
                unit = "PimTransferUnit",
                pc = payload.ins.pc,
                ins_id = payload.ins.ins_id,
                outputs = payload.output_num,
                "start"
            );
            self.execute_socket.start(payload).await;
            self.ports.set_busy(false);
            self.fsm.finish_exec();
        }
    }

    async fn process_execute(&self) {
        loop {
            let payload = self.execute_socket.wait_until_start().await;
            self.execute(&payload).await;
            self.ports.complete(&payload.ins);
            self.execute_socket.finish();
        }
    }

    async fn execute(&self, payload: &PimTransferInsPayload) {
        let ins = payload.ins;
        let mask = self
            .memory
            .read_data(ins, payload.output_mask_addr_byte, div_ceil(payload.output_num, BYTE_TO_BIT))
            .await;
        let valid_output_cnt = count_mask_bits(&mask, payload.output_num);

        let output_byte_width = div_ceil(payload.output_bit_width, BYTE_TO_BIT).max(1);
        let buffer_size_byte = self
            .memory
            .memory_id_by_address(payload.buffer_addr_byte)
            .map_or(0, |id| self.memory.memory_size_by_id(id));
        let buffer_max_output_cnt = (buffer_size_byte / output_byte_width).max(1);
        let buffer_max_size_byte = buffer_max_output_cnt * output_byte_width;
        let flush_cnt = div_ceil(valid_output_cnt, buffer_max_output_cnt);

        let mut buffered = 0;
        let mut flushed = 0;
        for i in 0..payload.output_num {
            if mask_bit(&mask, i) {
                let src = payload.src_addr_byte + (i * output_byte_width) as i64;
                let data = self.memory.read_data(ins, src, output_byte_width).await;
                let buffer = payload.buffer_addr_byte + (buffered * output_byte_width) as i64;
                self.memory.write_data(ins, buffer, output_byte_width, data).await;
                buffered += 1;
            }
            if buffered == buffer_max_output_cnt || (i + 1 == payload.output_num && buffered > 0) {
                let size_byte = buffered * output_byte_width;
                let data = self.memory.read_data(ins, payload.buffer_addr_byte, size_byte).await;
                if flushed + 1 == flush_cnt {
                    self.ports.finish_ins(&ins);
                }
                let dst = payload.dst_addr_byte + (flushed * buffer_max_size_byte) as i64;
                self.memory.write_data(ins, dst, size_byte, data).await;
                flushed += 1;
                buffered = 0;
            }
        }

        if flush_cnt == 0 {
            self.ports.finish_ins(&ins);
        }
        tracing::debug!(
            unit = "PimTransferUnit",
            pc = ins.pc,
            ins_id = ins.ins_id,
            valid_output_cnt,
            flushed,
            "complete"
        );
    }
}

impl ExecuteUnit for PimTransferUnit {
    fn ports(&self) -> &Rc<UnitPorts> {
        &self.ports
    }

    fn try_issue(&self, payload: UnitPayload) -> Result<(), UnitPayload> {
        match payload {
            UnitPayload::PimTransfer(transfer) => self.fsm.try_latch(transfer).map_err(UnitPayload::PimTransfer),
            other => Err(other),
        }
    }

    fn energy_reporter(&self, _running_time_ns: f64) -> EnergyReporter {
        EnergyReporter::default()
    }
}
