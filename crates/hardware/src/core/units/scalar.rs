//! Scalar unit.
//!
//! Executes one instruction per latch: ALU operations, 32-bit loads and stores
//! and register assignment. Memory accesses from this unit are served without
//! bank delay, so every scalar instruction retires in the cycle it issued.

use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use super::ExecuteUnit;
use super::reg::{RegUnit, RegUnitWriteRequest};
use crate::common::WORD_BYTE_SIZE;
use crate::common::bits::{bytes_to_word, word_to_bytes};
use crate::config::ScalarUnitConfig;
use crate::core::energy::EnergyCounter;
use crate::core::fsm::Fsm;
use crate::core::payload::{ScalarInsPayload, ScalarOperator, UnitPayload};
use crate::core::ports::UnitPorts;
use crate::isa::AluOp;
use crate::sim::SimContext;
use crate::soc::memory::LocalMemoryUnit;
use crate::stats::EnergyReporter;

/// Integer ALU on 32-bit register words.
#[derive(Debug, Clone, Copy)]
pub struct Alu;

impl Alu {
    /// Applies `op` to `a` and `b`.
    ///
    /// Arithmetic wraps and shift amounts are taken modulo 32. Division or
    /// remainder by zero is logged and yields zero. `lui` places `b` in the
    /// upper half word.
    ///
    /// # Examples
    ///
    /// ```
    /// use pimsim_core::core::units::scalar::Alu;
    /// use pimsim_core::isa::AluOp;
    ///
    /// assert_eq!(Alu::execute(AluOp::Add, 40, 2), 42);
    /// assert_eq!(Alu::execute(AluOp::Srl, -1, 28), 0xF);
    /// assert_eq!(Alu::execute(AluOp::Lui, 0, 1), 1 << 16);
    /// assert_eq!(Alu::execute(AluOp::Div, 7, 0), 0);
    /// ```
    pub fn execute(op: AluOp, a: i32, b: i32) -> i32 {
        match op {
            AluOp::Add => a.wrapping_add(b),
            AluOp::Sub => a.wrapping_sub(b),
            AluOp::Mul => a.wrapping_mul(b),
            AluOp::Div | AluOp::Mod if b == 0 => {
                tracing::error!(op = op.name(), a, "scalar division by zero");
                0
            }
            AluOp::Div => a.wrapping_div(b),
            AluOp::Mod => a.wrapping_rem(b),
            AluOp::Sll => a.wrapping_shl(b as u32),
            AluOp::Srl => (a as u32).wrapping_shr(b as u32) as i32,
            AluOp::Sra => a.wrapping_shr(b as u32),
            AluOp::Min => a.min(b),
            AluOp::Lui => b.wrapping_shl(16),
        }
    }
}

/// Scalar execution unit.
pub struct ScalarUnit {
    ctx: SimContext,
    ports: Rc<UnitPorts>,
    fsm: Fsm<ScalarInsPayload>,
    reg: Rc<RegUnit>,
    memory: Rc<LocalMemoryUnit>,
    default_dynamic_power_mw: f64,
    functor_dynamic_power_mw: HashMap<String, f64>,
    energy: EnergyCounter,
}

impl fmt::Debug for ScalarUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScalarUnit")
            .field("fsm", &self.fsm)
            .field("ports", &self.ports)
            .finish_non_exhaustive()
    }
}

impl ScalarUnit {
    /// Creates the unit and spawns its process.
    pub fn new(
        ctx: &SimContext,
        config: &ScalarUnitConfig,
        ports: Rc<UnitPorts>,
        reg: Rc<RegUnit>,
        memory: Rc<LocalMemoryUnit>,
    ) -> Rc<Self> {
        let static_power_mw = config.default_functor_static_power_mw
            + config
                .functor_list
                .iter()
                .map(|functor| functor.static_power_mw)
                .sum::<f64>();
        let unit = Rc::new(Self {
            fsm: Fsm::new(ctx.kernel(), ctx.clock(), "ScalarUnit"),
            ctx: ctx.clone(),
            ports,
            reg,
            memory,
            default_dynamic_power_mw: config.default_functor_dynamic_power_mw,
            functor_dynamic_power_mw: config
                .functor_list
                .iter()
                .map(|functor| (functor.inst_name.clone(), functor.dynamic_power_mw))
                .collect(),
            energy: EnergyCounter::with_static_power(static_power_mw),
        });
        let this = Rc::clone(&unit);
        ctx.kernel().spawn("ScalarUnit.process", async move { this.process().await });
        unit
    }

    async fn process(&self) {
        loop {
            let payload = self.fsm.wait_start().await;
            self.ports.set_busy(true);
            tracing::debug!(
                unit = "ScalarUnit",
                pc = payload.ins.pc,
                ins_id = payload.ins.ins_id,
                op = payload.op.name(),
                "start"
            );

            let power = self
                .functor_dynamic_power_mw
                .get(payload.op.name())
                .copied()
                .unwrap_or(self.default_dynamic_power_mw);
            self.energy.add_dynamic_energy(self.ctx.period_ns(), power);

            self.execute(&payload).await;

            self.ports.finish_ins(&payload.ins);
            self.ports.complete(&payload.ins);
            self.ports.set_busy(false);
            self.fsm.finish_exec();
        }
    }

    async fn execute(&self, payload: &ScalarInsPayload) {
        let address_byte = i64::from(payload.src1_value) + i64::from(payload.offset);
        let value = match payload.op {
            ScalarOperator::Store => {
                let data = word_to_bytes(payload.src2_value).to_vec();
                self.memory
                    .write_data(payload.ins, address_byte, WORD_BYTE_SIZE, data)
                    .await;
                return;
            }
            ScalarOperator::Load => {
                let data = self
                    .memory
                    .read_data(payload.ins, address_byte, WORD_BYTE_SIZE)
                    .await;
                bytes_to_word(&data)
            }
            ScalarOperator::Alu(op) => Alu::execute(op, payload.src1_value, payload.src2_value),
            ScalarOperator::Assign => payload.src1_value,
        };
        self.reg.write_register(RegUnitWriteRequest {
            reg_id: payload.dst_reg,
            reg_value: value,
            write_special_register: payload.write_special_register,
        });
    }
}

impl ExecuteUnit for ScalarUnit {
    fn ports(&self) -> &Rc<UnitPorts> {
        &self.ports
    }

    fn try_issue(&self, payload: UnitPayload) -> Result<(), UnitPayload> {
        match payload {
            UnitPayload::Scalar(scalar) => self.fsm.try_latch(scalar).map_err(UnitPayload::Scalar),
            other => Err(other),
        }
    }

    fn energy_reporter(&self, running_time_ns: f64) -> EnergyReporter {
        EnergyReporter::from_counter(&self.energy, running_time_ns)
    }
}
