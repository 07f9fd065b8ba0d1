//! One bit-serial PIM macro.
//!
//! Each non-skipped input bit plane is a batch that passes through six
//! stages, each linked to the next by a [`SubmoduleSocket`]:
//! 1. **IPU:** input staging, also the issue loop of the macro.
//! 2. **SRAM:** reads the weight row of every compartment.
//! 3. **Post process:** bit-sparse decoding, skipped unless enabled.
//! 4. **Adder tree 1 and 2:** the two adder tree stages, one cycle each.
//! 5. **Shift adder:** accumulates the batch into the running sum; the last
//!    batch also charges the group's result adder.
//!
//! Timing of the group is driven by its controller; a macro only accounts its
//! own energy.

use std::fmt;
use std::rc::Rc;

#[cfg(test)]
use std::cell::RefCell;

use super::payload::{MacroGroupSubmodulePayload, MacroPayload, MacroSubInsInfo, MacroSubmodulePayload};
use crate::config::PimUnitConfig;
use crate::core::energy::EnergyCounter;
use crate::core::socket::{BatchInfo, SubmoduleSocket};
use crate::sim::SimContext;
use crate::stats::EnergyReporter;

/// One PIM macro.
pub struct Macro {
    ctx: SimContext,
    name: String,
    config: Rc<PimUnitConfig>,
    independent_ipu: bool,
    result_adder_socket: Option<Rc<SubmoduleSocket<MacroGroupSubmodulePayload>>>,

    macro_socket: SubmoduleSocket<MacroPayload>,
    sram_socket: SubmoduleSocket<MacroSubmodulePayload>,
    post_process_socket: SubmoduleSocket<MacroSubmodulePayload>,
    adder_tree_socket_1: SubmoduleSocket<MacroSubmodulePayload>,
    adder_tree_socket_2: SubmoduleSocket<MacroSubmodulePayload>,
    shift_adder_socket: SubmoduleSocket<MacroSubmodulePayload>,

    ipu_energy: EnergyCounter,
    sram_energy: EnergyCounter,
    post_process_energy: EnergyCounter,
    adder_tree_energy: EnergyCounter,
    shift_adder_energy: EnergyCounter,
    result_adder_energy: EnergyCounter,

    #[cfg(test)]
    shifted_batches: RefCell<Vec<BatchInfo>>,
}

impl fmt::Debug for Macro {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Macro")
            .field("name", &self.name)
            .field("independent_ipu", &self.independent_ipu)
            .field("busy", &self.macro_socket.is_busy())
            .finish_non_exhaustive()
    }
}

impl Macro {
    /// Creates the macro and spawns its stage processes.
    ///
    /// A macro without an independent IPU shares the input staging of the
    /// first macro in its group and leaves it out of its report.
    pub fn new(
        ctx: &SimContext,
        name: impl Into<String>,
        config: &Rc<PimUnitConfig>,
        independent_ipu: bool,
        result_adder_socket: Option<Rc<SubmoduleSocket<MacroGroupSubmodulePayload>>>,
    ) -> Rc<Self> {
        let name = name.into();
        let kernel = ctx.kernel();
        let size = &config.macro_size;
        let post_process_cnt = if config.bit_sparse {
            size.row_cnt_per_element * size.element_cnt_per_compartment * size.compartment_cnt_per_macro
        } else {
            0
        };
        let column_cnt = size.element_cnt_per_compartment as f64;

        let unit = Rc::new(Self {
            macro_socket: SubmoduleSocket::new(kernel, format!("{name}.macro")),
            sram_socket: SubmoduleSocket::new(kernel, format!("{name}.sram")),
            post_process_socket: SubmoduleSocket::new(kernel, format!("{name}.post_process")),
            adder_tree_socket_1: SubmoduleSocket::new(kernel, format!("{name}.adder_tree_1")),
            adder_tree_socket_2: SubmoduleSocket::new(kernel, format!("{name}.adder_tree_2")),
            shift_adder_socket: SubmoduleSocket::new(kernel, format!("{name}.shift_adder")),
            ipu_energy: EnergyCounter::with_static_power(config.ipu.static_power_mw),
            sram_energy: EnergyCounter::with_static_power(config.sram.static_power_mw),
            post_process_energy: EnergyCounter::with_static_power(
                config.bit_sparse_config.static_power_mw * post_process_cnt as f64,
            ),
            adder_tree_energy: EnergyCounter::with_static_power(config.adder_tree.static_power_mw * column_cnt),
            shift_adder_energy: EnergyCounter::with_static_power(config.shift_adder.static_power_mw * column_cnt),
            result_adder_energy: EnergyCounter::with_static_power(config.result_adder.static_power_mw * column_cnt),
            ctx: ctx.clone(),
            name,
            config: Rc::clone(config),
            independent_ipu,
            result_adder_socket,
            #[cfg(test)]
            shifted_batches: RefCell::new(Vec::new()),
        });

        let this = Rc::clone(&unit);
        kernel.spawn(format!("{}.ipu", unit.name), async move { this.process_ipu_and_issue().await });
        let this = Rc::clone(&unit);
        kernel.spawn(format!("{}.sram", unit.name), async move { this.process_sram().await });
        let this = Rc::clone(&unit);
        kernel.spawn(format!("{}.post_process", unit.name), async move {
            this.process_post_process().await;
        });
        let this = Rc::clone(&unit);
        kernel.spawn(format!("{}.adder_tree_1", unit.name), async move {
            this.process_adder_tree(1).await;
        });
        let this = Rc::clone(&unit);
        kernel.spawn(format!("{}.adder_tree_2", unit.name), async move {
            this.process_adder_tree(2).await;
        });
        let this = Rc::clone(&unit);
        kernel.spawn(format!("{}.shift_adder", unit.name), async move {
            this.process_shift_adder().await;
        });
        unit
    }

    /// Name of the macro.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Waits until the macro is free and hands it `payload`.
    pub async fn start_execute(&self, payload: MacroPayload) {
        self.macro_socket.start(payload).await;
    }

    /// Waits until the macro has issued every batch of its current payload.
    pub async fn wait_until_finish_if_busy(&self) {
        self.macro_socket.wait_until_finish_if_busy().await;
    }

    /// Number of bit-plane batches and non-zero compartments of `payload`.
    ///
    /// Only the first `compartment_cnt_per_macro` inputs count. Without any
    /// non-zero input there is nothing to compute and no batch runs. With
    /// input bit sparsity enabled, only the bit planes holding a set bit are
    /// computed.
    pub fn batch_and_compartment_count(config: &PimUnitConfig, payload: &MacroPayload) -> (usize, usize) {
        let valid_cnt = config.macro_size.compartment_cnt_per_macro.min(payload.inputs.len());
        let inputs = &payload.inputs[..valid_cnt];
        let compartment_num = inputs.iter().filter(|&&input| input != 0).count();
        let bit_width = payload.input_bit_width.min(u64::BITS as usize);
        let batch_cnt = if config.input_bit_sparse && payload.bit_sparse {
            (0..bit_width)
                .filter(|&bit| inputs.iter().any(|&input| (input >> bit) & 1 != 0))
                .count()
        } else if compartment_num == 0 {
            0
        } else {
            payload.input_bit_width
        };
        (batch_cnt, compartment_num)
    }

    async fn stall(&self, latency_ns: f64) {
        if latency_ns > 0.0 {
            self.ctx.kernel().wait_ns(latency_ns).await;
        }
    }

    async fn process_ipu_and_issue(&self) {
        loop {
            let payload = self.macro_socket.wait_until_start().await;
            let ins = payload.pim_ins_info.ins;
            let (batch_cnt, compartment_num) = Self::batch_and_compartment_count(&self.config, &payload);
            tracing::trace!(
                unit = %self.name,
                pc = ins.pc,
                ins_id = ins.ins_id,
                batch_cnt,
                compartment_num,
                "macro start"
            );

            let sub_ins_info = Rc::new(MacroSubInsInfo {
                pim_ins_info: payload.pim_ins_info,
                compartment_num,
                element_col_num: payload.activation_element_col_num,
                bit_sparse: payload.bit_sparse,
            });
            for batch in BatchInfo::bit_planes(batch_cnt) {
                let latency = self.ctx.cycles_ns(self.config.ipu.latency_cycle);
                self.ipu_energy.add_dynamic_energy(latency, self.config.ipu.dynamic_power_mw);
                self.stall(latency).await;

                self.sram_socket
                    .start(MacroSubmodulePayload {
                        sub_ins_info: Rc::clone(&sub_ins_info),
                        batch,
                    })
                    .await;
            }

            self.macro_socket.finish();
        }
    }

    async fn process_sram(&self) {
        let size = &self.config.macro_size;
        let read_bits = size.bit_width_per_row * size.element_cnt_per_compartment * size.compartment_cnt_per_macro;
        loop {
            let payload = self.sram_socket.wait_until_start().await;
            tracing::trace!(unit = %self.name, batch = payload.batch.batch_num, "sram read");

            let latency = self.ctx.cycles_ns(self.config.sram.read_latency_cycle);
            self.sram_energy
                .add_dynamic_energy(latency, self.config.sram.read_dynamic_power_per_bit_mw * read_bits as f64);
            self.stall(latency).await;

            self.post_process_socket.start(payload).await;
            self.sram_socket.finish();
        }
    }

    async fn process_post_process(&self) {
        loop {
            let payload = self.post_process_socket.wait_until_start().await;
            if self.config.bit_sparse && payload.sub_ins_info.bit_sparse {
                let info = &payload.sub_ins_info;
                let bs = &self.config.bit_sparse_config;
                let latency = self.ctx.cycles_ns(bs.latency_cycle);
                let energy_latency = if latency == 0.0 { self.ctx.period_ns() } else { latency };
                self.post_process_energy.add_dynamic_energy(
                    energy_latency,
                    bs.dynamic_power_mw * (info.element_col_num * info.compartment_num) as f64,
                );
                self.stall(latency).await;
            }

            self.adder_tree_socket_1.start(payload).await;
            self.post_process_socket.finish();
        }
    }

    async fn process_adder_tree(&self, stage: u8) {
        let (socket, next) = if stage == 1 {
            (&self.adder_tree_socket_1, &self.adder_tree_socket_2)
        } else {
            (&self.adder_tree_socket_2, &self.shift_adder_socket)
        };
        loop {
            let payload = socket.wait_until_start().await;
            tracing::trace!(unit = %self.name, stage, batch = payload.batch.batch_num, "adder tree");

            // Both stages share one physical tree per column.
            let latency = self.ctx.period_ns();
            let now = self.ctx.kernel().now();
            for column in 0..payload.sub_ins_info.element_col_num {
                self.adder_tree_energy.add_tagged_dynamic_energy(
                    column,
                    now,
                    latency,
                    self.config.adder_tree.dynamic_power_mw,
                );
            }
            self.stall(latency).await;

            next.start(payload).await;
            socket.finish();
        }
    }

    async fn process_shift_adder(&self) {
        loop {
            let payload = self.shift_adder_socket.wait_until_start().await;
            let columns = payload.sub_ins_info.element_col_num as f64;
            tracing::trace!(unit = %self.name, batch = payload.batch.batch_num, "shift adder");

            let latency = self.ctx.cycles_ns(self.config.shift_adder.latency_cycle);
            self.shift_adder_energy
                .add_dynamic_energy(latency, self.config.shift_adder.dynamic_power_mw * columns);
            self.stall(latency).await;

            if payload.batch.last_batch {
                if let Some(result_adder) = &self.result_adder_socket {
                    result_adder.wait_until_finish_if_busy().await;
                }
                let latency = self.ctx.cycles_ns(self.config.result_adder.latency_cycle);
                self.result_adder_energy
                    .add_dynamic_energy(latency, self.config.result_adder.dynamic_power_mw * columns);
            }

            #[cfg(test)]
            self.shifted_batches.borrow_mut().push(payload.batch);
            self.shift_adder_socket.finish();
        }
    }

    /// Energy of every stage of the macro.
    pub fn energy_reporter(&self, running_time_ns: f64) -> EnergyReporter {
        let mut reporter = EnergyReporter::default();
        if self.independent_ipu {
            reporter.add_sub_module("ipu", EnergyReporter::from_counter(&self.ipu_energy, running_time_ns));
        }
        for (name, counter) in [
            ("sram read", &self.sram_energy),
            ("post process", &self.post_process_energy),
            ("adder tree", &self.adder_tree_energy),
            ("shift adder", &self.shift_adder_energy),
            ("result adder", &self.result_adder_energy),
        ] {
            reporter.add_sub_module(name, EnergyReporter::from_counter(counter, running_time_ns));
        }
        reporter
    }
}
