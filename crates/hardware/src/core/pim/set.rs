//! PIM set unit: loads the element column mask of one or all macro groups.

use std::fmt;
use std::rc::Rc;

use super::compute::PimComputeUnit;
use crate::common::BYTE_TO_BIT;
use crate::common::bits::div_ceil;
use crate::config::PimUnitConfig;
use crate::core::fsm::Fsm;
use crate::core::payload::{PimSetInsPayload, UnitPayload};
use crate::core::ports::UnitPorts;
use crate::core::socket::SubmoduleSocket;
use crate::core::units::ExecuteUnit;
use crate::sim::SimContext;
use crate::soc::memory::LocalMemoryUnit;
use crate::stats::EnergyReporter;

/// PIM activation column set unit.
pub struct PimSetUnit {
    ports: Rc<UnitPorts>,
    fsm: Fsm<PimSetInsPayload>,
    memory: Rc<LocalMemoryUnit>,
    compute: Rc<PimComputeUnit>,
    mask_size_byte: usize,
    execute_socket: SubmoduleSocket<PimSetInsPayload>,
}

impl fmt::Debug for PimSetUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PimSetUnit")
            .field("fsm", &self.fsm)
            .field("mask_size_byte", &self.mask_size_byte)
            .finish_non_exhaustive()
    }
}

impl PimSetUnit {
    /// Creates the unit; masks are applied to the groups of `compute`.
    pub fn new(
        ctx: &SimContext,
        config: &PimUnitConfig,
        ports: Rc<UnitPorts>,
        memory: Rc<LocalMemoryUnit>,
        compute: Rc<PimComputeUnit>,
    ) -> Rc<Self> {
        let kernel = ctx.kernel();
        let unit = Rc::new(Self {
            ports,
            fsm: Fsm::new(kernel, ctx.clock(), "PimSetUnit"),
            memory,
            compute,
            mask_size_byte: div_ceil(config.group_element_cols(), BYTE_TO_BIT),
            execute_socket: SubmoduleSocket::new(kernel, "PimSetUnit.execute"),
        });
        let this = Rc::clone(&unit);
        kernel.spawn("PimSetUnit.issue", async move { this.process_issue().await });
        let this = Rc::clone(&unit);
        kernel.spawn("PimSetUnit.execute", async move { this.process_execute().await });
        unit
    }

    async fn process_issue(&self) {
        loop {
            let payload = self.fsm.wait_start().await;
            self.ports.set_busy(true);
            tracing::debug!(
                unit = "PimSetUnit",
                pc = payload.ins.pc,
                ins_id = payload.ins.ins_id,
                group = payload.group_id,
                broadcast = payload.group_broadcast,
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
            let mask = self
                .memory
                .read_data(payload.ins, payload.mask_addr_byte, self.mask_size_byte)
                .await;
            self.ports.finish_ins(&payload.ins);
            self.compute
                .set_activation_element_col_mask(&mask, payload.group_broadcast, payload.group_id);

            self.ports.complete(&payload.ins);
            self.execute_socket.finish();
        }
    }
}

impl ExecuteUnit for PimSetUnit {
    fn ports(&self) -> &Rc<UnitPorts> {
        &self.ports
    }

    fn try_issue(&self, payload: UnitPayload) -> Result<(), UnitPayload> {
        match payload {
            UnitPayload::PimSet(set) => self.fsm.try_latch(set).map_err(UnitPayload::PimSet),
            other => Err(other),
        }
    }

    fn energy_reporter(&self, _running_time_ns: f64) -> EnergyReporter {
        EnergyReporter::default()
    }
}
