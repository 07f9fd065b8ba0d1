//! Macro group.
//!
//! A group fans a sub-instruction out to its active macros, starts its
//! controller and holds its own socket until the controller signals the next
//! sub-instruction. The group's result adder closes the instruction on the
//! last group of the last sub-instruction. Without an output the instruction's
//! resources are released as the addition starts. With one, the results are
//! handed to the compute unit's output writer and the resources stay held
//! until the write is done.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use super::controller::MacroGroupController;
use super::payload::{
    MacroGroupControllerPayload, MacroGroupPayload, MacroGroupSubmodulePayload, MacroPayload, PimOutputWrite,
};
use super::pim_macro::Macro;
use crate::common::bits::{count_mask_bits, div_ceil};
use crate::config::PimUnitConfig;
use crate::core::ports::UnitPorts;
use crate::core::socket::SubmoduleSocket;
use crate::sim::{Event, SimContext};
use crate::stats::EnergyReporter;

/// Group of macros sharing a controller and a result adder.
pub struct MacroGroup {
    ctx: SimContext,
    name: String,
    config: Rc<PimUnitConfig>,
    ports: Rc<UnitPorts>,
    controller: Rc<MacroGroupController>,
    macros: Vec<Rc<Macro>>,
    group_socket: SubmoduleSocket<MacroGroupPayload>,
    result_adder_socket: Rc<SubmoduleSocket<MacroGroupSubmodulePayload>>,
    output_socket: Rc<SubmoduleSocket<PimOutputWrite>>,
    next_sub_ins: Event,
    activation_element_col_mask: RefCell<Vec<u8>>,
}

impl fmt::Debug for MacroGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MacroGroup")
            .field("name", &self.name)
            .field("macros", &self.macros.len())
            .field("busy", &self.group_socket.is_busy())
            .finish_non_exhaustive()
    }
}

impl MacroGroup {
    /// Creates the group, its controller and its macros.
    ///
    /// Every element column starts enabled. Result writes go to `output_socket`.
    pub fn new(
        ctx: &SimContext,
        name: impl Into<String>,
        config: &Rc<PimUnitConfig>,
        ports: Rc<UnitPorts>,
        output_socket: Rc<SubmoduleSocket<PimOutputWrite>>,
    ) -> Rc<Self> {
        let name = name.into();
        let kernel = ctx.kernel();
        let result_adder_socket = Rc::new(SubmoduleSocket::new(kernel, format!("{name}.result_adder")));
        let next_sub_ins = kernel.event(format!("{name}.next_sub_ins"));
        let controller = MacroGroupController::new(
            ctx,
            format!("{name}_controller"),
            config,
            next_sub_ins.clone(),
            Rc::clone(&result_adder_socket),
        );
        let macros = (0..config.macro_group_size)
            .map(|i| {
                Macro::new(
                    ctx,
                    format!("{name}_macro_{i}"),
                    config,
                    config.value_sparse || i == 0,
                    Some(Rc::clone(&result_adder_socket)),
                )
            })
            .collect();
        let columns = config.group_element_cols();

        let group = Rc::new(Self {
            ctx: ctx.clone(),
            group_socket: SubmoduleSocket::new(kernel, format!("{name}.group")),
            name,
            config: Rc::clone(config),
            ports,
            controller,
            macros,
            result_adder_socket,
            output_socket,
            next_sub_ins,
            activation_element_col_mask: RefCell::new(vec![0xFF; div_ceil(columns, 8)]),
        });
        let this = Rc::clone(&group);
        kernel.spawn(format!("{}.issue", group.name), async move { this.process_issue().await });
        let this = Rc::clone(&group);
        kernel.spawn(format!("{}.result_adder", group.name), async move {
            this.process_result_adder().await;
        });
        group
    }

    /// Waits until the group is free and hands it `payload`.
    pub async fn start_execute(&self, payload: MacroGroupPayload) {
        self.group_socket.start(payload).await;
    }

    /// Waits until the group has handed its current sub-instruction on.
    pub async fn wait_until_finish_if_busy(&self) {
        self.group_socket.wait_until_finish_if_busy().await;
    }

    /// Enables the element columns whose bit is set in `mask`.
    pub fn set_activation_element_col_mask(&self, mask: &[u8]) {
        let columns = self.config.group_element_cols();
        let mut current = self.activation_element_col_mask.borrow_mut();
        *current = (0..div_ceil(columns, 8))
            .map(|i| mask.get(i).copied().unwrap_or(0))
            .collect();
    }

    /// Number of enabled element columns.
    pub fn activation_element_col_cnt(&self) -> usize {
        count_mask_bits(&self.activation_element_col_mask.borrow(), self.config.group_element_cols())
    }

    /// Element columns an instruction asking for `requested` columns uses.
    ///
    /// Zero selects the columns enabled by the last `pim-set`.
    pub fn activation_element_col_num(&self, requested: usize) -> usize {
        let requested = if requested == 0 {
            self.activation_element_col_cnt()
        } else {
            requested
        };
        requested.min(self.config.group_element_cols())
    }

    async fn process_issue(&self) {
        let per_macro = self.config.macro_size.element_cnt_per_compartment;
        loop {
            let mut payload = self.group_socket.wait_until_start().await;
            let info = payload.pim_ins_info;
            tracing::trace!(unit = %self.name, pc = info.ins.pc, ins_id = info.ins.ins_id, "group start");

            let col_num = self.activation_element_col_num(payload.activation_element_col_num);
            let macro_num = div_ceil(col_num, per_macro);
            let mut inputs = std::mem::take(&mut payload.macro_inputs).into_iter();
            for (macro_id, macro_unit) in self.macros.iter().enumerate().take(macro_num) {
                let macro_col_num = if macro_id + 1 < macro_num {
                    per_macro
                } else {
                    col_num - macro_id * per_macro
                };
                macro_unit
                    .start_execute(MacroPayload {
                        pim_ins_info: info,
                        row: payload.row,
                        input_bit_width: payload.input_bit_width,
                        activation_element_col_num: macro_col_num,
                        bit_sparse: payload.bit_sparse,
                        inputs: inputs.next().unwrap_or_default(),
                    })
                    .await;
            }

            let next_sub_ins = self.next_sub_ins.wait();
            self.controller
                .start(MacroGroupControllerPayload {
                    pim_ins_info: info,
                    last_group: payload.last_group,
                    input_bit_width: payload.input_bit_width,
                    bit_sparse: payload.bit_sparse,
                    output: payload.output,
                })
                .await;
            next_sub_ins.await;

            self.group_socket.finish();
        }
    }

    async fn process_result_adder(&self) {
        loop {
            let payload = self.result_adder_socket.wait_until_start().await;
            let info = &payload.sub_ins_info;
            let ins = info.pim_ins_info.ins;
            let closes_ins = info.last_group && info.pim_ins_info.last_sub_ins;
            let output = if closes_ins { info.output } else { None };
            tracing::trace!(unit = %self.name, pc = ins.pc, ins_id = ins.ins_id, "result adder");

            if closes_ins && output.is_none() {
                self.ports.finish_ins(&ins);
            }
            let latency = self.ctx.cycles_ns(self.config.result_adder.latency_cycle);
            if latency > 0.0 {
                self.ctx.kernel().wait_ns(latency).await;
            }
            if let Some(write) = output {
                self.output_socket.start(write).await;
                self.output_socket.wait_until_finish_if_busy().await;
                self.ports.finish_ins(&ins);
            }
            if closes_ins {
                tracing::debug!(unit = "PimComputeUnit", pc = ins.pc, ins_id = ins.ins_id, "complete");
                self.ports.complete(&ins);
            }

            self.result_adder_socket.finish();
        }
    }

    /// Summed energy of every macro in the group.
    pub fn energy_reporter(&self, running_time_ns: f64) -> EnergyReporter {
        self.macros
            .iter()
            .fold(EnergyReporter::default(), |mut reporter, macro_unit| {
                reporter += &macro_unit.energy_reporter(running_time_ns);
                reporter
            })
    }
}
