//! PIM load unit: writes weights from local memory into the SRAM arrays.

use std::fmt;
use std::rc::Rc;

use crate::common::BYTE_TO_BIT;
use crate::common::bits::div_ceil;
use crate::config::PimUnitConfig;
use crate::core::energy::EnergyCounter;
use crate::core::fsm::Fsm;
use crate::core::payload::{PimLoadInsPayload, UnitPayload};
use crate::core::ports::UnitPorts;
use crate::core::socket::SubmoduleSocket;
use crate::core::units::ExecuteUnit;
use crate::sim::SimContext;
use crate::soc::memory::LocalMemoryUnit;
use crate::stats::EnergyReporter;

/// PIM weight load unit.
///
/// The latch is released as soon as the instruction is handed to the execute
/// stage. The execute stage reads the weights, then writes them
/// `sram_write_bit_width` bits at a time; the instruction's resources are
/// released when the last write starts.
pub struct PimLoadUnit {
    ctx: SimContext,
    config: Rc<PimUnitConfig>,
    ports: Rc<UnitPorts>,
    fsm: Fsm<PimLoadInsPayload>,
    memory: Rc<LocalMemoryUnit>,
    execute_socket: SubmoduleSocket<PimLoadInsPayload>,
    sram_write_energy: EnergyCounter,
}

impl fmt::Debug for PimLoadUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PimLoadUnit")
            .field("fsm", &self.fsm)
            .field("execute", &self.execute_socket)
            .finish_non_exhaustive()
    }
}

impl PimLoadUnit {
    /// Creates the unit and spawns its issue and execute processes.
    pub fn new(
        ctx: &SimContext,
        config: &Rc<PimUnitConfig>,
        ports: Rc<UnitPorts>,
        memory: Rc<LocalMemoryUnit>,
    ) -> Rc<Self> {
        let kernel = ctx.kernel();
        let unit = Rc::new(Self {
            ctx: ctx.clone(),
            config: Rc::clone(config),
            ports,
            fsm: Fsm::new(kernel, ctx.clock(), "PimLoadUnit"),
            memory,
            execute_socket: SubmoduleSocket::new(kernel, "PimLoadUnit.execute"),
            sram_write_energy: EnergyCounter::default(),
        });
        let this = Rc::clone(&unit);
        kernel.spawn("PimLoadUnit.issue", async move { this.process_issue().await });
        let this = Rc::clone(&unit);
        kernel.spawn("PimLoadUnit.execute", async move { this.process_execute().await });
        unit
    }

    async fn process_issue(&self) {
        loop {
            let payload = self.fsm.wait_start().await;
            self.ports.set_busy(true);
            tracing::debug!(
                unit = "PimLoadUnit",
                pc = payload.ins.pc,
                ins_id = payload.ins.ins_id,
                size = payload.size_byte,
                "start"
            );
            self.execute_socket.start(payload).await;
            self.ports.set_busy(false);
            self.fsm.finish_exec();
        }
    }

    async fn process_execute(&self) {
        let pim_bit_width = self.config.sram_write_bit_width();
        let latency = self.ctx.cycles_ns(self.config.sram.write_latency_cycle);
        let power = self.config.sram.write_dynamic_power_per_bit_mw * pim_bit_width as f64;
        loop {
            let payload = self.execute_socket.wait_until_start().await;
            let ins = payload.ins;

            let _ = self
                .memory
                .read_data(ins, payload.src_address_byte, payload.size_byte)
                .await;

            let write_times = div_ceil(payload.size_byte * BYTE_TO_BIT, pim_bit_width).max(1);
            for i in 0..write_times {
                self.sram_write_energy.add_dynamic_energy(latency, power);
                if i + 1 == write_times {
                    self.ports.finish_ins(&ins);
                }
                if latency > 0.0 {
                    self.ctx.kernel().wait_ns(latency).await;
                }
            }

            tracing::debug!(unit = "PimLoadUnit", pc = ins.pc, ins_id = ins.ins_id, write_times, "complete");
            self.ports.complete(&ins);
            self.execute_socket.finish();
        }
    }
}

impl ExecuteUnit for PimLoadUnit {
    fn ports(&self) -> &Rc<UnitPorts> {
        &self.ports
    }

    fn try_issue(&self, payload: UnitPayload) -> Result<(), UnitPayload> {
        match payload {
            UnitPayload::PimLoad(load) => self.fsm.try_latch(load).map_err(UnitPayload::PimLoad),
            other => Err(other),
        }
    }

    fn energy_reporter(&self, running_time_ns: f64) -> EnergyReporter {
        let mut reporter = EnergyReporter::default();
        reporter.add_sub_module(
            "sram write",
            EnergyReporter::from_counter(&self.sram_write_energy, running_time_ns),
        );
        reporter
    }
}
