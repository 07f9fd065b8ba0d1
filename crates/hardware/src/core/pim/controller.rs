//! Macro group controller.
//!
//! Drives the control pulses of a whole group through the same stage chain as
//! a macro, one batch per input bit. It accounts no energy of its own. After
//! its last batch is issued it signals the group that the next sub-instruction
//! may start, and its shift adder stage hands the last batch to the group's
//! result adder.

use std::fmt;
use std::rc::Rc;

use super::payload::{MacroGroupControllerPayload, MacroGroupSubInsInfo, MacroGroupSubmodulePayload};
use crate::config::PimUnitConfig;
use crate::core::socket::{BatchInfo, SubmoduleSocket};
use crate::sim::{Event, SimContext};

/// Controller of one macro group.
pub struct MacroGroupController {
    ctx: SimContext,
    name: String,
    config: Rc<PimUnitConfig>,
    next_sub_ins: Event,
    result_adder_socket: Rc<SubmoduleSocket<MacroGroupSubmodulePayload>>,

    controller_socket: SubmoduleSocket<MacroGroupControllerPayload>,
    sram_socket: SubmoduleSocket<MacroGroupSubmodulePayload>,
    post_process_socket: SubmoduleSocket<MacroGroupSubmodulePayload>,
    adder_tree_socket_1: SubmoduleSocket<MacroGroupSubmodulePayload>,
    adder_tree_socket_2: SubmoduleSocket<MacroGroupSubmodulePayload>,
    shift_adder_socket: SubmoduleSocket<MacroGroupSubmodulePayload>,
}

impl fmt::Debug for MacroGroupController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MacroGroupController")
            .field("name", &self.name)
            .field("busy", &self.controller_socket.is_busy())
            .finish_non_exhaustive()
    }
}

impl MacroGroupController {
    /// Creates the controller and spawns its stage processes.
    pub fn new(
        ctx: &SimContext,
        name: impl Into<String>,
        config: &Rc<PimUnitConfig>,
        next_sub_ins: Event,
        result_adder_socket: Rc<SubmoduleSocket<MacroGroupSubmodulePayload>>,
    ) -> Rc<Self> {
        let name = name.into();
        let kernel = ctx.kernel();
        let unit = Rc::new(Self {
            controller_socket: SubmoduleSocket::new(kernel, format!("{name}.controller")),
            sram_socket: SubmoduleSocket::new(kernel, format!("{name}.sram")),
            post_process_socket: SubmoduleSocket::new(kernel, format!("{name}.post_process")),
            adder_tree_socket_1: SubmoduleSocket::new(kernel, format!("{name}.adder_tree_1")),
            adder_tree_socket_2: SubmoduleSocket::new(kernel, format!("{name}.adder_tree_2")),
            shift_adder_socket: SubmoduleSocket::new(kernel, format!("{name}.shift_adder")),
            ctx: ctx.clone(),
            name,
            config: Rc::clone(config),
            next_sub_ins,
            result_adder_socket,
        });

        let this = Rc::clone(&unit);
        kernel.spawn(format!("{}.ipu", unit.name), async move { this.process_ipu_and_issue().await });
        let this = Rc::clone(&unit);
        kernel.spawn(format!("{}.stages", unit.name), async move { this.process_stages().await });
        let this = Rc::clone(&unit);
        kernel.spawn(format!("{}.shift_adder", unit.name), async move {
            this.process_shift_adder().await;
        });
        unit
    }

    /// Waits until the controller is free and hands it `payload`.
    pub async fn start(&self, payload: MacroGroupControllerPayload) {
        self.controller_socket.start(payload).await;
    }

    /// Waits until the controller has issued every batch.
    pub async fn wait_until_finish_if_busy(&self) {
        self.controller_socket.wait_until_finish_if_busy().await;
    }

    async fn stall(&self, latency_ns: f64) {
        if latency_ns > 0.0 {
            self.ctx.kernel().wait_ns(latency_ns).await;
        }
    }

    async fn process_ipu_and_issue(&self) {
        loop {
            let payload = self.controller_socket.wait_until_start().await;
            let ins = payload.pim_ins_info.ins;
            tracing::trace!(unit = %self.name, pc = ins.pc, ins_id = ins.ins_id, "controller start");

            let sub_ins_info = Rc::new(MacroGroupSubInsInfo {
                pim_ins_info: payload.pim_ins_info,
                last_group: payload.last_group,
                bit_sparse: payload.bit_sparse,
                output: payload.output,
            });
            // A zero-width input still runs one batch so the result adder fires.
            for batch in BatchInfo::split(payload.input_bit_width, 1) {
                self.stall(self.ctx.cycles_ns(self.config.ipu.latency_cycle)).await;
                self.sram_socket
                    .start(MacroGroupSubmodulePayload {
                        sub_ins_info: Rc::clone(&sub_ins_info),
                        batch,
                    })
                    .await;
            }

            self.controller_socket.finish();
            self.next_sub_ins.notify();
        }
    }

    /// SRAM, post process and both adder tree stages, each in its own task.
    async fn process_stages(&self) {
        let stages: [(&SubmoduleSocket<_>, &SubmoduleSocket<_>, u32); 4] = [
            (&self.sram_socket, &self.post_process_socket, self.config.sram.read_latency_cycle),
            (
                &self.post_process_socket,
                &self.adder_tree_socket_1,
                if self.config.bit_sparse {
                    self.config.bit_sparse_config.latency_cycle
                } else {
                    0
                },
            ),
            (&self.adder_tree_socket_1, &self.adder_tree_socket_2, 1),
            (&self.adder_tree_socket_2, &self.shift_adder_socket, 1),
        ];
        let stage_tasks = stages.map(|(socket, next, latency_cycle)| async move {
            loop {
                let payload = socket.wait_until_start().await;
                self.stall(self.ctx.cycles_ns(latency_cycle)).await;
                next.start(payload).await;
                socket.finish();
            }
        });
        let _ = futures::future::join_all(stage_tasks).await;
    }

    async fn process_shift_adder(&self) {
        loop {
            let payload = self.shift_adder_socket.wait_until_start().await;
            self.stall(self.ctx.cycles_ns(self.config.shift_adder.latency_cycle))
                .await;

            if payload.batch.last_batch {
                self.result_adder_socket.start(payload).await;
            }
            self.shift_adder_socket.finish();
        }
    }
}
