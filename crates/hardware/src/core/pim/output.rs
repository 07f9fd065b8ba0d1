//! PIM output unit: reads results out of the macro groups.
//!
//! Three readout modes are supported:
//! 1. **Only output:** every result is written out as is.
//! 2. **Output sum:** the results selected by a mask are summed in the result
//!    adders first, so fewer results are written.
//! 3. **Output sum move:** every result goes through the result adders.
//!
//! The results land in memory rather than in registers, so the instruction
//! does not wait for the last adder cycle before releasing its resources.

use std::fmt;
use std::rc::Rc;

use crate::common::BYTE_TO_BIT;
use crate::common::bits::{count_mask_bits, div_ceil};
use crate::config::PimUnitConfig;
use crate::core::energy::EnergyCounter;
use crate::core::fsm::Fsm;
use crate::core::payload::{PimOutputInsPayload, PimOutputType, UnitPayload};
use crate::core::ports::UnitPorts;
use crate::core::socket::SubmoduleSocket;
use crate::core::units::ExecuteUnit;
use crate::sim::SimContext;
use crate::soc::memory::LocalMemoryUnit;
use crate::stats::EnergyReporter;

/// PIM result readout unit.
pub struct PimOutputUnit {
    ctx: SimContext,
    config: Rc<PimUnitConfig>,
    ports: Rc<UnitPorts>,
    fsm: Fsm<PimOutputInsPayload>,
    memory: Rc<LocalMemoryUnit>,
    execute_socket: SubmoduleSocket<PimOutputInsPayload>,
    result_adder_energy: EnergyCounter,
}

impl fmt::Debug for PimOutputUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PimOutputUnit")
            .field("fsm", &self.fsm)
            .field("execute", &self.execute_socket)
            .finish_non_exhaustive()
    }
}

impl PimOutputUnit {
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
            fsm: Fsm::new(kernel, ctx.clock(), "PimOutputUnit"),
            memory,
            execute_socket: SubmoduleSocket::new(kernel, "PimOutputUnit.execute"),
            result_adder_energy: EnergyCounter::default(),
        });
        let this = Rc::clone(&unit);
        kernel.spawn("PimOutputUnit.issue", async move { this.process_issue().await });
        let this = Rc::clone(&unit);
        kernel.spawn("PimOutputUnit.execute", async move { this.process_execute().await });
        unit
    }

    async fn process_issue(&self) {
        loop {
            let payload = self.fsm.wait_start().await;
            self.ports.set_busy(true);
            tracing::debug!(
                unit = "PimOutputUnit",
                pc = payload.ins.pc,
                ins_id = payload.ins.ins_id,
                output_type = ?payload.output_type,
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
            let ins = payload.ins;

            let output_cnt_per_group = match payload.output_type {
                PimOutputType::OnlyOutput => {
                    self.ports.finish_ins(&ins);
                    payload.output_cnt_per_group
                }
                PimOutputType::OutputSum => {
                    let mask_size_byte = div_ceil(payload.output_cnt_per_group, BYTE_TO_BIT);
                    let mask = self
                        .memory
                        .read_data(ins, payload.output_mask_addr_byte, mask_size_byte)
                        .await;
                    let sum_times = count_mask_bits(&mask, payload.output_cnt_per_group);
                    self.sum(&payload, sum_times).await;
                    payload.output_cnt_per_group - sum_times
                }
                PimOutputType::OutputSumMove => {
                    self.sum(&payload, payload.output_cnt_per_group).await;
                    payload.output_cnt_per_group
                }
            };

            let size_byte = div_ceil(
                payload.output_bit_width * output_cnt_per_group * payload.activation_group_num,
                BYTE_TO_BIT,
            );
            self.memory
                .write_data(ins, payload.output_addr_byte, size_byte, Vec::new())
                .await;

            tracing::debug!(unit = "PimOutputUnit", pc = ins.pc, ins_id = ins.ins_id, size_byte, "complete");
            self.ports.complete(&ins);
            self.execute_socket.finish();
        }
    }

    /// Runs `sum_times_per_group` additions in every active group, then
    /// releases the instruction's resources.
    async fn sum(&self, payload: &PimOutputInsPayload, sum_times_per_group: usize) {
        let adder = &self.config.result_adder;
        self.result_adder_energy.add_dynamic_energy(
            self.ctx.cycles_ns(adder.latency_cycle),
            adder.dynamic_power_mw * (sum_times_per_group * payload.activation_group_num) as f64,
        );
        let stall_ns = self.ctx.cycles_ns(adder.latency_cycle.saturating_sub(1));
        if stall_ns > 0.0 {
            self.ctx.kernel().wait_ns(stall_ns).await;
        }
        self.ports.finish_ins(&payload.ins);
    }
}

impl ExecuteUnit for PimOutputUnit {
    fn ports(&self) -> &Rc<UnitPorts> {
        &self.ports
    }

    fn try_issue(&self, payload: UnitPayload) -> Result<(), UnitPayload> {
        match payload {
            UnitPayload::PimOutput(output) => self.fsm.try_latch(output).map_err(UnitPayload::PimOutput),
            other => Err(other),
        }
    }

    fn energy_reporter(&self, running_time_ns: f64) -> EnergyReporter {
        let mut reporter = EnergyReporter::default();
        reporter.add_sub_module(
            "result adder",
            EnergyReporter::from_counter(&self.result_adder_energy, running_time_ns),
        );
        reporter
    }
}
