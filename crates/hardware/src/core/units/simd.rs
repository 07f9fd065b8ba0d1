//! SIMD unit.
//!
//! An instruction is looked up by `(input_cnt << 8) | opcode` and bound to a
//! functor whose input and output widths match the operands. The vector is
//! then processed in batches of `functor_cnt` elements through a read, an
//! execute and a write stage connected by [`SubmoduleSocket`]s. With
//! pipelining enabled, and when no bank is both read and written, the next
//! batch enters the read stage as soon as the previous one has moved on;
//! otherwise it waits until the previous batch has been written back.

use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use super::ExecuteUnit;
use crate::common::bits::div_ceil;
use crate::common::{BYTE_TO_BIT, SimError};
use crate::common::constants::{SIMD_INSTRUCTION_OPCODE_BIT_LENGTH, SIMD_MAX_INPUT_NUM};
use crate::config::{SimdFunctorConfig, SimdInputType, SimdInstructionConfig, SimdUnitConfig};
use crate::core::energy::EnergyCounter;
use crate::core::fsm::Fsm;
use crate::core::payload::{SimdInsPayload, UnitPayload};
use crate::core::ports::UnitPorts;
use crate::core::socket::{BatchInfo, SubmoduleSocket};
use crate::sim::{Event, SimContext};
use crate::soc::memory::LocalMemoryUnit;
use crate::stats::EnergyReporter;

/// Key of a SIMD instruction in the configured instruction table.
pub const fn simd_instruction_key(input_cnt: u32, opcode: u32) -> u32 {
    (input_cnt << SIMD_INSTRUCTION_OPCODE_BIT_LENGTH) | opcode
}

/// One operand stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Operand {
    bit_width: usize,
    address_byte: i64,
}

/// Static description of the instruction in flight.
#[derive(Debug)]
struct SimdInsInfo {
    payload: SimdInsPayload,
    functor: SimdFunctorConfig,
    scalar_inputs: Vec<Operand>,
    vector_inputs: Vec<Operand>,
    output: Operand,
    use_pipeline: bool,
}

#[derive(Debug, Clone)]
struct SimdStagePayload {
    info: Rc<SimdInsInfo>,
    batch: BatchInfo,
}

/// SIMD execution unit.
pub struct SimdUnit {
    ctx: SimContext,
    ports: Rc<UnitPorts>,
    fsm: Fsm<SimdInsPayload>,
    memory: Rc<LocalMemoryUnit>,
    pipeline: bool,
    instructions: HashMap<u32, SimdInstructionConfig>,
    functors: HashMap<String, SimdFunctorConfig>,
    read_socket: SubmoduleSocket<SimdStagePayload>,
    execute_socket: SubmoduleSocket<SimdStagePayload>,
    write_socket: SubmoduleSocket<SimdStagePayload>,
    next_batch: Event,
    energy: EnergyCounter,
}

impl fmt::Debug for SimdUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SimdUnit")
            .field("fsm", &self.fsm)
            .field("instructions", &self.instructions.len())
            .field("functors", &self.functors.len())
            .finish_non_exhaustive()
    }
}

impl SimdUnit {
    /// Creates the unit and spawns its issue and stage processes.
    pub fn new(
        ctx: &SimContext,
        config: &SimdUnitConfig,
        ports: Rc<UnitPorts>,
        memory: Rc<LocalMemoryUnit>,
    ) -> Rc<Self> {
        let kernel = ctx.kernel();
        let static_power_mw = config
            .functor_list
            .iter()
            .map(|functor| functor.static_power_per_functor_mw * functor.functor_cnt as f64)
            .sum();
        let unit = Rc::new(Self {
            ctx: ctx.clone(),
            ports,
            fsm: Fsm::new(kernel, ctx.clock(), "SIMDUnit"),
            memory,
            pipeline: config.pipeline,
            instructions: config
                .instruction_list
                .iter()
                .map(|ins| (simd_instruction_key(ins.input_cnt, ins.opcode), ins.clone()))
                .collect(),
            functors: config
                .functor_list
                .iter()
                .map(|functor| (functor.name.clone(), functor.clone()))
                .collect(),
            read_socket: SubmoduleSocket::new(kernel, "SIMDUnit.read"),
            execute_socket: SubmoduleSocket::new(kernel, "SIMDUnit.execute"),
            write_socket: SubmoduleSocket::new(kernel, "SIMDUnit.write"),
            next_batch: kernel.event("SIMDUnit.next_batch"),
            energy: EnergyCounter::with_static_power(static_power_mw),
        });

        let this = Rc::clone(&unit);
        kernel.spawn("SIMDUnit.issue", async move { this.process_issue().await });
        let this = Rc::clone(&unit);
        kernel.spawn("SIMDUnit.read", async move { this.process_read().await });
        let this = Rc::clone(&unit);
        kernel.spawn("SIMDUnit.execute", async move { this.process_execute().await });
        let this = Rc::clone(&unit);
        kernel.spawn("SIMDUnit.write", async move { this.process_write().await });
        unit
    }

    /// Resolves the instruction and functor serving `payload`.
    fn bind(&self, payload: &SimdInsPayload) -> Result<(&SimdInstructionConfig, &SimdFunctorConfig), SimError> {
        let instruction = self
            .instructions
            .get(&simd_instruction_key(payload.input_cnt, payload.opcode))
            .ok_or(SimError::UnknownSimdInstruction {
                opcode: payload.opcode,
                input_cnt: payload.input_cnt,
            })?;
        instruction
            .functor_binding_list
            .iter()
            .filter(|binding| binding.input_bit_width.inputs() == payload.inputs_bit_width)
            .filter_map(|binding| self.functors.get(&binding.functor_name))
            .find(|functor| {
                functor.input_cnt == payload.input_cnt
                    && functor.data_bit_width.inputs() == payload.inputs_bit_width
                    && functor.data_bit_width.output == payload.output_bit_width
            })
            .map(|functor| (instruction, functor))
            .ok_or_else(|| SimError::NoSimdFunctorBinding {
                instruction: instruction.name.clone(),
                widths: payload.inputs_bit_width.to_vec(),
            })
    }

    fn decode(&self, payload: SimdInsPayload) -> Result<SimdInsInfo, SimError> {
        let (instruction, functor) = self.bind(&payload)?;
        let mut scalar_inputs = Vec::new();
        let mut vector_inputs = Vec::new();
        let input_cnt = (payload.input_cnt as usize).min(SIMD_MAX_INPUT_NUM);
        for (i, input_type) in instruction.inputs_type().iter().enumerate().take(input_cnt) {
            let operand = Operand {
                bit_width: payload.inputs_bit_width[i] as usize,
                address_byte: payload.inputs_address_byte[i],
            };
            match input_type {
                SimdInputType::Vector => vector_inputs.push(operand),
                SimdInputType::Scalar => scalar_inputs.push(operand),
            }
        }
        let output_bank = self.memory.memory_id_by_address(payload.output_address_byte);
        let shares_bank = vector_inputs
            .iter()
            .any(|input| self.memory.memory_id_by_address(input.address_byte) == output_bank);
        Ok(SimdInsInfo {
            output: Operand {
                bit_width: payload.output_bit_width as usize,
                address_byte: payload.output_address_byte,
            },
            functor: functor.clone(),
            scalar_inputs,
            vector_inputs,
            use_pipeline: self.pipeline && !shares_bank,
            payload,
        })
    }

    async fn process_issue(&self) {
        loop {
            let payload = self.fsm.wait_start().await;
            self.ports.set_busy(true);
            tracing::debug!(
                unit = "SIMDUnit",
                pc = payload.ins.pc,
                ins_id = payload.ins.ins_id,
                opcode = payload.opcode,
                len = payload.len,
                "start"
            );

            let info = match self.decode(payload) {
                Ok(info) => Rc::new(info),
                Err(error) => {
                    self.ctx.fail(error);
                    return;
                }
            };
            let total_len = if info.vector_inputs.is_empty() {
                1
            } else {
                info.payload.len
            };
            for batch in BatchInfo::split(total_len, info.functor.functor_cnt) {
                let next_batch = self.next_batch.wait();
                self.read_socket
                    .start(SimdStagePayload {
                        info: Rc::clone(&info),
                        batch,
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
            let stage = self.read_socket.wait_until_start().await;
            let info = &stage.info;
            let ins = info.payload.ins;
            tracing::trace!(pc = ins.pc, ins_id = ins.ins_id, batch = stage.batch.batch_num, "simd read");

            if stage.batch.first_batch {
                for input in &info.scalar_inputs {
                    let size_byte = div_ceil(input.bit_width, BYTE_TO_BIT);
                    let _ = self.memory.read_data(ins, input.address_byte, size_byte).await;
                }
            }
            for input in &info.vector_inputs {
                let address_byte = input.address_byte
                    + (stage.batch.batch_num * input.bit_width * info.functor.functor_cnt / BYTE_TO_BIT) as i64;
                let size_byte = div_ceil(input.bit_width * stage.batch.batch_len, BYTE_TO_BIT);
                let _ = self.memory.read_data(ins, address_byte, size_byte).await;
            }

            let pipelined = info.use_pipeline && !stage.batch.last_batch;
            self.execute_socket.start(stage).await;
            if pipelined {
                self.next_batch.notify();
            }
            self.read_socket.finish();
        }
    }

    async fn process_execute(&self) {
        loop {
            let stage = self.execute_socket.wait_until_start().await;
            let functor = &stage.info.functor;
            let latency = self.ctx.cycles_ns(functor.latency_cycle);
            self.energy.add_dynamic_energy(
                latency,
                functor.dynamic_power_per_functor_mw * stage.batch.batch_len as f64,
            );
            if latency > 0.0 {
                self.ctx.kernel().wait_ns(latency).await;
            }
            self.write_socket.start(stage).await;
            self.execute_socket.finish();
        }
    }

    async fn process_write(&self) {
        loop {
            let stage = self.write_socket.wait_until_start().await;
            let info = &stage.info;
            let ins = info.payload.ins;
            tracing::trace!(pc = ins.pc, ins_id = ins.ins_id, batch = stage.batch.batch_num, "simd write");

            if stage.batch.last_batch {
                self.ports.finish_ins(&ins);
            }
            let output = info.output;
            let address_byte = output.address_byte
                + (stage.batch.batch_num * output.bit_width * info.functor.functor_cnt / BYTE_TO_BIT) as i64;
            let size_byte = div_ceil(output.bit_width * stage.batch.batch_len, BYTE_TO_BIT);
            self.memory
                .write_data(ins, address_byte, size_byte, Vec::new())
                .await;

            if !info.use_pipeline && !stage.batch.last_batch {
                self.next_batch.notify();
            }
            self.write_socket.finish();
            if stage.batch.last_batch {
                tracing::debug!(unit = "SIMDUnit", pc = ins.pc, ins_id = ins.ins_id, "complete");
                self.ports.complete(&ins);
            }
        }
    }
}

impl ExecuteUnit for SimdUnit {
    fn ports(&self) -> &Rc<UnitPorts> {
        &self.ports
    }

    fn try_issue(&self, payload: UnitPayload) -> Result<(), UnitPayload> {
        match payload {
            UnitPayload::Simd(simd) => self.fsm.try_latch(simd).map_err(UnitPayload::Simd),
            other => Err(other),
        }
    }

    fn energy_reporter(&self, running_time_ns: f64) -> EnergyReporter {
        EnergyReporter::from_counter(&self.energy, running_time_ns)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_instruction_key() {
        assert_eq!(simd_instruction_key(2, 0x01), 0x201);
        assert_eq!(simd_instruction_key(1, 0xFF), 0x1FF);
    }
}
