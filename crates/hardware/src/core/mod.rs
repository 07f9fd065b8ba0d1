//! Core implementation.
//!
//! A core fetches one static instruction per clock edge, decodes it into the
//! payload of one execution unit and issues it in order once no in-flight
//! instruction conflicts with it. This module contains:
//! 1. **Issue loop:** [`Core`], the program counter, the two-step hazard check
//!    and the run-one-round completion test.
//! 2. **Hazard model:** [`conflict`], [`ports`] and [`stall`].
//! 3. **Units:** [`units`] for the scalar, SIMD and transfer units and [`pim`]
//!    for the PIM units.

/// Resource footprints of in-flight instructions.
pub mod conflict;
/// Instruction decoder.
pub mod decode;
/// Energy accounting.
pub mod energy;
/// Instruction latch in front of every unit.
pub mod fsm;
/// Decoded instruction payloads.
pub mod payload;
/// PIM execution units.
pub mod pim;
/// Signals between the core and one unit.
pub mod ports;
/// Handshake between pipeline stages.
pub mod socket;
/// Per-unit stall decision.
pub mod stall;
/// Scalar, SIMD, transfer and register units.
pub mod units;

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use self::decode::{DecodedInstruction, Decoder};
use self::energy::EnergyCounter;
use self::payload::ExecuteUnitType;
use self::pim::{PimComputeUnit, PimLoadUnit, PimOutputUnit, PimSetUnit, PimTransferUnit};
use self::ports::UnitPorts;
use self::stall::StallHandler;
use self::units::ExecuteUnit;
use self::units::reg::RegUnit;
use self::units::scalar::ScalarUnit;
use self::units::simd::SimdUnit;
use self::units::transfer::TransferUnit;
use crate::common::SimResult;
use crate::config::{ControlUnitConfig, CoreConfig};
use crate::isa::Instruction;
use crate::sim::{Event, SimContext};
use crate::soc::memory::{GlobalMemoryPort, LocalMemoryUnit};
use crate::stats::{CoreStats, EnergyReporter};

/// Report name of the unit serving `unit_type`; the PIM units share one.
const fn report_name(unit_type: ExecuteUnitType) -> &'static str {
    match unit_type {
        ExecuteUnitType::PimCompute
        | ExecuteUnitType::PimLoad
        | ExecuteUnitType::PimOutput
        | ExecuteUnitType::PimSet
        | ExecuteUnitType::PimTransfer => "PimUnit",
        other => other.name(),
    }
}

/// Issue state advanced once per clock edge.
#[derive(Debug, Default)]
struct IssueState {
    /// One-based program counter; out of `1..=len` once the program is left.
    pc: i64,
    next_ins_id: u64,
    /// Decoded instruction waiting for its unit.
    pending: Option<DecodedInstruction>,
    stats: CoreStats,
}

/// Outcome of one issue attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum IssueStep {
    Issued,
    Stalled,
}

/// One core of the chip.
pub struct Core {
    core_id: usize,
    name: String,
    ctx: SimContext,
    program: Vec<Instruction>,
    reg: Rc<RegUnit>,
    memory: Rc<LocalMemoryUnit>,
    decoder: Decoder,
    units: Vec<Rc<dyn ExecuteUnit>>,
    stall_handlers: Vec<StallHandler>,
    activity: Event,
    finish: Event,
    finished: Cell<bool>,
    state: RefCell<IssueState>,
    control_config: ControlUnitConfig,
    control_energy: EnergyCounter,
}

impl fmt::Debug for Core {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Core")
            .field("name", &self.name)
            .field("program_len", &self.program.len())
            .field("finished", &self.finished.get())
            .field("state", &self.state.borrow())
            .finish_non_exhaustive()
    }
}

impl Core {
    /// Builds core `core_id` running `program` and spawns its issue process.
    ///
    /// `global` connects the core to global memory. `finish` is notified once
    /// the core has finished its program.
    ///
    /// # Errors
    ///
    /// Fails if the local memory banks cannot be built.
    pub fn new(
        ctx: &SimContext,
        core_id: usize,
        config: &CoreConfig,
        program: Vec<Instruction>,
        global: Option<GlobalMemoryPort>,
        finish: Event,
    ) -> SimResult<Rc<Self>> {
        let name = format!("Core_{core_id}");
        let kernel = ctx.kernel();
        let pim_config = Rc::new(config.pim_unit_config.clone());
        let memory = Rc::new(LocalMemoryUnit::new(
            ctx,
            core_id,
            &config.local_memory_unit_config,
            &pim_config,
            global,
        )?);
        let reg = Rc::new(RegUnit::new(ctx, &config.register_unit_config));
        let activity = kernel.event(format!("{name}.activity"));
        let end_pc = program.len();
        let ports = |unit_type| UnitPorts::new(unit_type, kernel, end_pc, true, activity.clone());

        let compute = PimComputeUnit::new(ctx, &pim_config, ports(ExecuteUnitType::PimCompute), Rc::clone(&memory));
        let units: Vec<Rc<dyn ExecuteUnit>> = vec![
            ScalarUnit::new(
                ctx,
                &config.scalar_unit_config,
                ports(ExecuteUnitType::Scalar),
                Rc::clone(&reg),
                Rc::clone(&memory),
            ),
            SimdUnit::new(ctx, &config.simd_unit_config, ports(ExecuteUnitType::Simd), Rc::clone(&memory)),
            TransferUnit::new(
                ctx,
                &config.transfer_unit_config,
                ports(ExecuteUnitType::Transfer),
                Rc::clone(&memory),
            ),
            Rc::clone(&compute) as Rc<dyn ExecuteUnit>,
            PimLoadUnit::new(ctx, &pim_config, ports(ExecuteUnitType::PimLoad), Rc::clone(&memory)),
            PimOutputUnit::new(ctx, &pim_config, ports(ExecuteUnitType::PimOutput), Rc::clone(&memory)),
            PimSetUnit::new(
                ctx,
                &pim_config,
                ports(ExecuteUnitType::PimSet),
                Rc::clone(&memory),
                compute,
            ),
            PimTransferUnit::new(ctx, ports(ExecuteUnitType::PimTransfer), Rc::clone(&memory)),
        ];
        let stall_handlers = units.iter().map(|u| StallHandler::new(Rc::clone(u.ports()))).collect();

        let control = &config.control_unit_config;
        let control_energy = EnergyCounter::with_static_power(
            control.controller_static_power_mw + control.fetch_static_power_mw + control.decode_static_power_mw,
        );
        let decoder = Decoder::new(
            Rc::clone(&reg),
            Rc::clone(&memory),
            pim_config,
            config.transfer_unit_config.pim_load_fast_path,
        );

        let core = Rc::new(Self {
            core_id,
            name: name.clone(),
            ctx: ctx.clone(),
            program,
            reg,
            memory,
            decoder,
            units,
            stall_handlers,
            activity,
            finish,
            finished: Cell::new(false),
            state: RefCell::new(IssueState {
                pc: 1,
                ..IssueState::default()
            }),
            control_config: control.clone(),
            control_energy,
        });
        let this = Rc::clone(&core);
        kernel.spawn(format!("{name}.issue"), async move { this.process_issue().await });
        Ok(core)
    }

    /// Index of the core in the chip.
    pub const fn core_id(&self) -> usize {
        self.core_id
    }

    /// Report name, `Core_<id>`.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether the program has been left and every unit is idle.
    pub fn is_finished(&self) -> bool {
        self.finished.get()
    }

    /// Issue statistics so far.
    pub fn stats(&self) -> CoreStats {
        self.state.borrow().stats
    }

    /// Current program counter.
    pub fn pc(&self) -> i64 {
        self.state.borrow().pc
    }

    /// Register files.
    pub const fn reg(&self) -> &Rc<RegUnit> {
        &self.reg
    }

    /// Local memory unit.
    pub const fn memory(&self) -> &Rc<LocalMemoryUnit> {
        &self.memory
    }

    /// Owner of the decoded instruction still waiting to issue, if any.
    pub fn pending_ins_id(&self) -> Option<u64> {
        self.state
            .borrow()
            .pending
            .as_ref()
            .and_then(|decoded| decoded.conflict.ins_id)
    }

    /// Channel of the unit serving `unit_type`.
    pub fn unit_ports(&self, unit_type: ExecuteUnitType) -> Option<&Rc<UnitPorts>> {
        self.unit(unit_type).map(|u| u.ports())
    }

    fn unit(&self, unit_type: ExecuteUnitType) -> Option<&Rc<dyn ExecuteUnit>> {
        self.units.iter().find(|u| u.unit_type() == unit_type)
    }

    fn program_left(&self, state: &IssueState) -> bool {
        state.pending.is_none() && !(1..=self.program.len() as i64).contains(&state.pc)
    }

    fn all_units_idle(&self) -> bool {
        self.units.iter().all(|u| u.ports().is_idle())
    }

    async fn process_issue(&self) {
        let clock = Rc::clone(self.ctx.clock());
        while !self.program_left(&self.state.borrow()) {
            clock.next_pos_edge().await;
            if let Err(error) = self.issue_edge() {
                self.ctx.fail(error);
                return;
            }
        }

        loop {
            if self.all_units_idle() {
                break;
            }
            self.activity.wait().await;
        }
        tracing::info!(core = %self.name, time_ns = self.ctx.now_ns(), stats = ?self.stats(), "core finished");
        self.finished.set(true);
        self.finish.notify();
    }

    /// Runs one clock edge of the issue stage.
    fn issue_edge(&self) -> SimResult<()> {
        let mut state = self.state.borrow_mut();
        let mut dynamic_power_mw = 0.0;

        if state.pending.is_none() {
            let pc = usize::try_from(state.pc).unwrap_or(0);
            let Some(ins) = self.program.get(pc.wrapping_sub(1)) else {
                return Ok(());
            };
            let footprint = self.decoder.register_footprint(ins, pc, state.next_ins_id)?;
            if self.units.iter().any(|u| u.ports().in_flight_conflict().register_conflicts_with(&footprint)) {
                tracing::trace!(core = %self.name, pc, "register operands in flight");
                state.stats.stall_cycles += 1;
                return Ok(());
            }
            let decoded = self.decoder.decode(ins, pc, state.next_ins_id)?;
            state.next_ins_id += 1;
            dynamic_power_mw += self.control_config.fetch_dynamic_power_mw + self.control_config.decode_dynamic_power_mw;
            state.pending = Some(decoded);
        }

        let step = self.dispatch(&mut state);
        match step {
            IssueStep::Issued => {
                state.stats.issue_cycles += 1;
                dynamic_power_mw += self.control_config.controller_dynamic_power_mw;
            }
            IssueStep::Stalled => state.stats.stall_cycles += 1,
        }
        if dynamic_power_mw > 0.0 {
            self.control_energy.add_dynamic_energy(self.ctx.period_ns(), dynamic_power_mw);
        }
        Ok(())
    }

    /// Hands the pending instruction to its unit if nothing blocks it.
    fn dispatch(&self, state: &mut IssueState) -> IssueStep {
        let Some(decoded) = state.pending.take() else {
            return IssueStep::Stalled;
        };
        let Some(payload) = decoded.payload else {
            state.pc += decoded.pc_increment;
            state.stats.control_instructions += 1;
            return IssueStep::Issued;
        };

        if self.stall_handlers.iter().any(|h| h.is_stalled(&decoded.conflict)) {
            state.pending = Some(DecodedInstruction {
                payload: Some(payload),
                ..decoded
            });
            return IssueStep::Stalled;
        }

        let unit_type = payload.unit_type();
        let Some(unit) = self.unit(unit_type) else {
            tracing::error!(core = %self.name, unit = %unit_type, "no unit serves instruction");
            state.pc += decoded.pc_increment;
            return IssueStep::Issued;
        };
        let ins = *payload.ins();
        match unit.try_issue(payload) {
            Ok(()) => {
                tracing::debug!(core = %self.name, pc = ins.pc, ins_id = ins.ins_id, unit = %unit_type, "issue");
                unit.ports().accept();
                unit.ports().publish_conflict(decoded.conflict);
                state.pc += decoded.pc_increment;
                state.stats.dispatched_instructions += 1;
                IssueStep::Issued
            }
            Err(payload) => {
                state.pending = Some(DecodedInstruction {
                    payload: Some(payload),
                    ..decoded
                });
                IssueStep::Stalled
            }
        }
    }

    /// Energy tree of the core over a run of `running_time_ns`.
    pub fn energy_reporter(&self, running_time_ns: f64) -> EnergyReporter {
        let mut reporter = EnergyReporter::default();
        for unit in &self.units {
            reporter.add_sub_module(report_name(unit.unit_type()), unit.energy_reporter(running_time_ns));
        }
        reporter.add_sub_module("LocalMemoryUnit", self.memory.energy_reporter(running_time_ns));
        reporter.add_sub_module("RegUnit", self.reg.energy_reporter(running_time_ns));
        reporter.add_sub_module(
            "ControlUnit",
            EnergyReporter::from_counter(&self.control_energy, running_time_ns),
        );
        reporter
    }
}
