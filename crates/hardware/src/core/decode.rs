//! Instruction decoder.
//!
//! Turns one static [`Instruction`] into the payload of the unit that executes
//! it, the conflict record the hazard check needs and the program counter
//! increment. Decoding happens in two steps:
//! 1. **Register footprint:** [`Decoder::register_footprint`] lists the
//!    registers the instruction reads and writes without touching their values,
//!    so the core can hold the instruction back while a producer is in flight.
//! 2. **Operand read:** [`Decoder::decode`] reads the registers, builds the
//!    payload and folds the memory banks the operands address into the record.

use std::fmt;
use std::rc::Rc;

use crate::common::{SimError, SimResult};
use crate::config::PimUnitConfig;
use crate::core::conflict::{DataConflictPayload, RegisterRef};
use crate::core::payload::{
    ExecuteUnitType, InstructionPayload, PimComputeInsPayload, PimLoadInsPayload,
    PimOutputInsPayload, PimOutputType, PimSetInsPayload, PimTransferInsPayload, ScalarInsPayload,
    ScalarOperator, SimdInsPayload, TransferInsPayload, UnitPayload,
};
use crate::core::units::reg::RegUnit;
use crate::isa::opcodes::{
    SPECIAL_ACTIVATION_ELEMENT_COL_NUM, SPECIAL_ACTIVATION_GROUP_NUM, SPECIAL_BIT_SPARSE_META_ADDR,
    SPECIAL_GROUP_INPUT_STEP, SPECIAL_PIM_INPUT_BIT_WIDTH, SPECIAL_PIM_OUTPUT_BIT_WIDTH,
    SPECIAL_SIMD_INPUT_1_BIT_WIDTH, SPECIAL_SIMD_OUTPUT_BIT_WIDTH, SPECIAL_VALUE_SPARSE_MASK_ADDR,
};
use crate::isa::disasm::disassemble;
use crate::isa::{AssignOp, ControlOp, Instruction, Operation, PimInstType, ScalarOp};
use crate::soc::memory::LocalMemoryUnit;

/// Most inputs a SIMD instruction takes.
const SIMD_MAX_INPUT_CNT: usize = 4;

/// Transfer `offset_mask` bit selecting the source address.
const OFFSET_MASK_SRC: u32 = 0b10;

/// Transfer `offset_mask` bit selecting the destination address.
const OFFSET_MASK_DST: u32 = 0b01;

/// One decoded instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedInstruction {
    /// Payload for the execution unit; `None` for branches and jumps.
    pub payload: Option<UnitPayload>,
    /// Footprint checked against the in-flight instructions.
    pub conflict: DataConflictPayload,
    /// Signed step to the next static instruction.
    pub pc_increment: i64,
}

/// Register operand a decoded field comes from.
#[derive(Debug, Clone, Copy)]
enum Operand {
    General(usize),
    Special(usize),
}

/// Register operands and destinations of one operation, in read order.
#[derive(Debug, Default)]
struct RegisterUse {
    reads: Vec<Operand>,
    writes: Vec<Operand>,
}

impl RegisterUse {
    fn read(mut self, operand: Operand) -> Self {
        self.reads.push(operand);
        self
    }

    fn write(mut self, operand: Operand) -> Self {
        self.writes.push(operand);
        self
    }
}

/// Decoder of one core.
pub struct Decoder {
    reg: Rc<RegUnit>,
    memory: Rc<LocalMemoryUnit>,
    pim_config: Rc<PimUnitConfig>,
    pim_load_fast_path: bool,
}

impl fmt::Debug for Decoder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Decoder")
            .field("pim_load_fast_path", &self.pim_load_fast_path)
            .finish_non_exhaustive()
    }
}

/// Converts a register value used as a count; negative values count as zero.
fn to_count(value: i32) -> usize {
    usize::try_from(value).unwrap_or(0)
}

fn classify(ins: &Instruction, pc: usize) -> SimResult<Operation> {
    ins.operation().ok_or_else(|| SimError::InvalidInstruction {
        pc,
        reason: format!(
            "unknown encoding class={:#b} type={} opcode={}",
            ins.class, ins.inst_type, ins.opcode
        ),
    })
}

const fn ins_payload(pc: usize, ins_id: u64, unit_type: ExecuteUnitType) -> InstructionPayload {
    InstructionPayload { pc, ins_id, unit_type }
}

/// Execution unit an operation is dispatched to.
const fn target_unit(op: Operation, pim_load: bool) -> ExecuteUnitType {
    match op {
        Operation::Scalar(_) => ExecuteUnitType::Scalar,
        Operation::Simd => ExecuteUnitType::Simd,
        Operation::Transfer if pim_load => ExecuteUnitType::PimLoad,
        Operation::Transfer => ExecuteUnitType::Transfer,
        Operation::Pim(PimInstType::Compute) => ExecuteUnitType::PimCompute,
        Operation::Pim(PimInstType::Set) => ExecuteUnitType::PimSet,
        Operation::Pim(PimInstType::Output) => ExecuteUnitType::PimOutput,
        Operation::Pim(PimInstType::Transfer) => ExecuteUnitType::PimTransfer,
        Operation::Control(_) => ExecuteUnitType::Control,
    }
}

fn register_use(ins: &Instruction, op: Operation, pc: usize) -> SimResult<RegisterUse> {
    use Operand::{General, Special};

    let regs = RegisterUse::default();
    Ok(match op {
        Operation::Scalar(ScalarOp::RegReg(_)) => regs.read(General(ins.rs1)).read(General(ins.rs2)).write(General(ins.rd)),
        Operation::Scalar(ScalarOp::RegImm(_)) => regs.read(General(ins.rs1)).write(General(ins.rd)),
        Operation::Scalar(ScalarOp::Load { .. }) => regs.read(General(ins.rs1)).write(General(ins.rs2)),
        Operation::Scalar(ScalarOp::Store { .. }) => regs.read(General(ins.rs1)).read(General(ins.rs2)),
        Operation::Scalar(ScalarOp::Assign(AssignOp::LiGeneral)) => regs.write(General(ins.rd)),
        Operation::Scalar(ScalarOp::Assign(AssignOp::LiSpecial)) => regs.write(Special(ins.rd)),
        Operation::Scalar(ScalarOp::Assign(AssignOp::GeneralToSpecial)) => {
            regs.read(General(ins.rs1)).write(Special(ins.rs2))
        }
        Operation::Scalar(ScalarOp::Assign(AssignOp::SpecialToGeneral)) => {
            regs.read(Special(ins.rs2)).write(General(ins.rs1))
        }
        Operation::Simd => {
            let mut regs = regs;
            for reg in simd_input_registers(ins, pc)? {
                regs = regs.read(General(reg));
            }
            for i in 0..simd_input_cnt(ins) {
                regs = regs.read(Special(SPECIAL_SIMD_INPUT_1_BIT_WIDTH + i));
            }
            regs.read(Special(SPECIAL_SIMD_OUTPUT_BIT_WIDTH))
                .read(General(ins.rd))
                .read(General(ins.rs3))
        }
        Operation::Transfer => regs.read(General(ins.rs1)).read(General(ins.rd)).read(General(ins.rs2)),
        Operation::Pim(PimInstType::Compute) => {
            let mut regs = regs
                .read(General(ins.rs1))
                .read(General(ins.rs2))
                .read(General(ins.rs3))
                .read(Special(SPECIAL_PIM_INPUT_BIT_WIDTH))
                .read(Special(SPECIAL_ACTIVATION_GROUP_NUM))
                .read(Special(SPECIAL_ACTIVATION_ELEMENT_COL_NUM))
                .read(Special(SPECIAL_GROUP_INPUT_STEP));
            if ins.value_sparse {
                regs = regs.read(Special(SPECIAL_VALUE_SPARSE_MASK_ADDR));
            }
            if ins.bit_sparse {
                regs = regs.read(Special(SPECIAL_BIT_SPARSE_META_ADDR));
            }
            if ins.rd != 0 {
                regs = regs.read(General(ins.rd)).read(Special(SPECIAL_PIM_OUTPUT_BIT_WIDTH));
            }
            regs
        }
        Operation::Pim(PimInstType::Output) => regs
            .read(General(ins.rd))
            .read(General(ins.rs1))
            .read(General(ins.rs2))
            .read(Special(SPECIAL_ACTIVATION_GROUP_NUM))
            .read(Special(SPECIAL_PIM_OUTPUT_BIT_WIDTH)),
        Operation::Pim(PimInstType::Set) => regs.read(General(ins.rs1)).read(General(ins.rs2)),
        Operation::Pim(PimInstType::Transfer) => regs
            .read(General(ins.rs1))
            .read(General(ins.rs2))
            .read(General(ins.rs3))
            .read(General(ins.rs4))
            .read(General(ins.rd))
            .read(Special(SPECIAL_PIM_OUTPUT_BIT_WIDTH)),
        Operation::Control(ControlOp::Jmp) => regs,
        Operation::Control(_) => regs.read(General(ins.rs1)).read(General(ins.rs2)),
    })
}

fn simd_input_cnt(ins: &Instruction) -> usize {
    (ins.input_num as usize).min(SIMD_MAX_INPUT_CNT)
}

/// Address registers of the SIMD inputs.
///
/// With three or four inputs the first two addresses come from `rs1` and
/// `rs1 + 1`, the others from `rs2` and `rs2 + 1`.
///
/// # Errors
///
/// Returns [`SimError::InvalidInstruction`] when a paired register id has no
/// successor.
fn simd_input_registers(ins: &Instruction, pc: usize) -> SimResult<Vec<usize>> {
    let next = |reg: usize| {
        reg.checked_add(1).ok_or_else(|| SimError::InvalidInstruction {
            pc,
            reason: format!("SIMD input register r{reg} has no paired successor"),
        })
    };
    Ok(match simd_input_cnt(ins) {
        0 => Vec::new(),
        1 => vec![ins.rs1],
        2 => vec![ins.rs1, ins.rs2],
        3 => vec![ins.rs1, next(ins.rs1)?, ins.rs2],
        _ => vec![ins.rs1, next(ins.rs1)?, ins.rs2, next(ins.rs2)?],
    })
}

impl Decoder {
    /// Creates the decoder of a core.
    ///
    /// With `pim_load_fast_path` set, transfers whose whole destination lies in
    /// the PIM address space are sent to the PIM load unit.
    pub const fn new(
        reg: Rc<RegUnit>,
        memory: Rc<LocalMemoryUnit>,
        pim_config: Rc<PimUnitConfig>,
        pim_load_fast_path: bool,
    ) -> Self {
        Self {
            reg,
            memory,
            pim_config,
            pim_load_fast_path,
        }
    }

    fn register_ref(&self, operand: Operand) -> Option<RegisterRef> {
        match operand {
            Operand::General(id) => self.reg.resolve(id, false),
            Operand::Special(id) => self.reg.resolve(id, true),
        }
    }

    fn read(&self, operand: Operand) -> i32 {
        match operand {
            Operand::General(id) => self.reg.read_register(id, false),
            Operand::Special(id) => self.reg.read_register(id, true),
        }
    }

    fn general(&self, id: usize) -> i32 {
        self.read(Operand::General(id))
    }

    fn special(&self, id: usize) -> i32 {
        self.read(Operand::Special(id))
    }

    fn address(&self, id: usize) -> i64 {
        i64::from(self.general(id))
    }

    /// Registers `ins` reads and writes, recorded on a footprint owned by `ins_id`.
    ///
    /// # Errors
    ///
    /// Returns [`SimError::InvalidInstruction`] for an unknown encoding or a
    /// SIMD register pair without a successor.
    pub fn register_footprint(&self, ins: &Instruction, pc: usize, ins_id: u64) -> SimResult<DataConflictPayload> {
        let op = classify(ins, pc)?;
        let mut conflict = DataConflictPayload::new(ins_id, target_unit(op, false));
        let regs = register_use(ins, op, pc)?;
        for reg in regs.reads.iter().filter_map(|&r| self.register_ref(r)) {
            conflict.add_read_register(reg);
        }
        for reg in regs.writes.iter().filter_map(|&r| self.register_ref(r)) {
            conflict.add_write_register(reg);
        }
        Ok(conflict)
    }

    /// Decodes `ins`, the static instruction at one-based `pc`, as instance `ins_id`.
    ///
    /// # Errors
    ///
    /// Returns [`SimError::InvalidInstruction`] for an unknown encoding.
    pub fn decode(&self, ins: &Instruction, pc: usize, ins_id: u64) -> SimResult<DecodedInstruction> {
        let op = classify(ins, pc)?;
        let mut conflict = self.register_footprint(ins, pc, ins_id)?;
        let mut pc_increment = 1;

        let payload = match op {
            Operation::Scalar(scalar) => {
                Some(self.decode_scalar(ins, scalar, ins_payload(pc, ins_id, ExecuteUnitType::Scalar), &mut conflict))
            }
            Operation::Simd => Some(self.decode_simd(ins, ins_payload(pc, ins_id, ExecuteUnitType::Simd), &mut conflict)?),
            Operation::Transfer => Some(self.decode_transfer(ins, pc, ins_id, &mut conflict)),
            Operation::Pim(PimInstType::Compute) => Some(self.decode_pim_compute(
                ins,
                ins_payload(pc, ins_id, ExecuteUnitType::PimCompute),
                &mut conflict,
            )),
            Operation::Pim(PimInstType::Output) => Some(self.decode_pim_output(
                ins,
                ins_payload(pc, ins_id, ExecuteUnitType::PimOutput),
                &mut conflict,
            )),
            Operation::Pim(PimInstType::Set) => Some(self.decode_pim_set(
                ins,
                ins_payload(pc, ins_id, ExecuteUnitType::PimSet),
                &mut conflict,
            )),
            Operation::Pim(PimInstType::Transfer) => Some(self.decode_pim_transfer(
                ins,
                ins_payload(pc, ins_id, ExecuteUnitType::PimTransfer),
                &mut conflict,
            )),
            Operation::Control(control) => {
                pc_increment = self.decode_control(ins, control);
                None
            }
        };

        if let Some(payload) = &payload {
            conflict.unit_type = Some(payload.unit_type());
        }
        tracing::trace!(pc, ins_id, asm = %disassemble(ins), unit = ?conflict.unit_type, pc_increment, "decoded");
        Ok(DecodedInstruction {
            payload,
            conflict,
            pc_increment,
        })
    }

    fn decode_scalar(
        &self,
        ins: &Instruction,
        op: ScalarOp,
        identity: InstructionPayload,
        conflict: &mut DataConflictPayload,
    ) -> UnitPayload {
        let mut payload = ScalarInsPayload {
            ins: identity,
            op: ScalarOperator::Assign,
            src1_value: 0,
            src2_value: 0,
            offset: 0,
            dst_reg: ins.rd,
            write_special_register: false,
        };
        match op {
            ScalarOp::RegReg(alu) => {
                payload.op = ScalarOperator::Alu(alu);
                payload.src1_value = self.general(ins.rs1);
                payload.src2_value = self.general(ins.rs2);
            }
            ScalarOp::RegImm(alu) => {
                payload.op = ScalarOperator::Alu(alu);
                payload.src1_value = self.general(ins.rs1);
                payload.src2_value = ins.imm;
            }
            ScalarOp::Load { .. } => {
                payload.op = ScalarOperator::Load;
                payload.src1_value = self.general(ins.rs1);
                payload.offset = ins.offset;
                payload.dst_reg = ins.rs2;
                let address = i64::from(payload.src1_value) + i64::from(payload.offset);
                conflict.add_read_memory(self.memory.memory_id_by_address(address));
            }
            ScalarOp::Store { .. } => {
                payload.op = ScalarOperator::Store;
                payload.src1_value = self.general(ins.rs1);
                payload.src2_value = self.general(ins.rs2);
                payload.offset = ins.offset;
                payload.dst_reg = 0;
                let address = i64::from(payload.src1_value) + i64::from(payload.offset);
                conflict.add_write_memory(self.memory.memory_id_by_address(address));
            }
            ScalarOp::Assign(AssignOp::LiGeneral) => payload.src1_value = ins.imm,
            ScalarOp::Assign(AssignOp::LiSpecial) => {
                payload.src1_value = ins.imm;
                payload.write_special_register = true;
            }
            ScalarOp::Assign(AssignOp::GeneralToSpecial) => {
                payload.src1_value = self.general(ins.rs1);
                payload.dst_reg = ins.rs2;
                payload.write_special_register = true;
            }
            ScalarOp::Assign(AssignOp::SpecialToGeneral) => {
                payload.src1_value = self.special(ins.rs2);
                payload.dst_reg = ins.rs1;
            }
        }
        UnitPayload::Scalar(payload)
    }

    fn decode_simd(
        &self,
        ins: &Instruction,
        identity: InstructionPayload,
        conflict: &mut DataConflictPayload,
    ) -> SimResult<UnitPayload> {
        let input_cnt = simd_input_cnt(ins);
        let mut inputs_address_byte = [0; SIMD_MAX_INPUT_CNT];
        for (address, reg) in inputs_address_byte.iter_mut().zip(simd_input_registers(ins, identity.pc)?) {
            *address = self.address(reg);
        }
        let mut inputs_bit_width = [0; SIMD_MAX_INPUT_CNT];
        for (i, width) in inputs_bit_width.iter_mut().enumerate().take(input_cnt) {
            *width = self.special(SPECIAL_SIMD_INPUT_1_BIT_WIDTH + i).max(0).unsigned_abs();
        }
        let payload = SimdInsPayload {
            ins: identity,
            input_cnt: ins.input_num,
            opcode: ins.opcode,
            inputs_bit_width,
            output_bit_width: self.special(SPECIAL_SIMD_OUTPUT_BIT_WIDTH).max(0).unsigned_abs(),
            inputs_address_byte,
            output_address_byte: self.address(ins.rd),
            len: to_count(self.general(ins.rs3)),
        };

        for &address in &payload.inputs_address_byte[..input_cnt] {
            conflict.add_read_memory(self.memory.memory_id_by_address(address));
        }
        conflict.add_write_memory(self.memory.memory_id_by_address(payload.output_address_byte));
        Ok(UnitPayload::Simd(payload))
    }

    fn decode_transfer(
        &self,
        ins: &Instruction,
        pc: usize,
        ins_id: u64,
        conflict: &mut DataConflictPayload,
    ) -> UnitPayload {
        let src_offset = if ins.offset_mask & OFFSET_MASK_SRC == 0 { 0 } else { i64::from(ins.offset) };
        let dst_offset = if ins.offset_mask & OFFSET_MASK_DST == 0 { 0 } else { i64::from(ins.offset) };
        let src_address_byte = self.address(ins.rs1) + src_offset;
        let dst_address_byte = self.address(ins.rd) + dst_offset;
        let size_byte = to_count(self.general(ins.rs2));

        let pim_space = &self.pim_config.address_space;
        let into_pim = pim_space.offset_byte <= dst_address_byte
            && dst_address_byte + size_byte as i64 <= pim_space.end();
        if self.pim_load_fast_path && into_pim {
            conflict.uses_pim_unit = true;
            conflict.add_read_memory(self.memory.memory_id_by_address(src_address_byte));
            return UnitPayload::PimLoad(PimLoadInsPayload {
                ins: ins_payload(pc, ins_id, ExecuteUnitType::PimLoad),
                src_address_byte,
                size_byte,
            });
        }

        let src_id = self.memory.memory_id_by_address(src_address_byte);
        let dst_id = self.memory.memory_id_by_address(dst_address_byte);
        if src_id == dst_id {
            conflict.add_read_write_memory(src_id);
        } else {
            conflict.add_read_memory(src_id);
            conflict.add_write_memory(dst_id);
        }
        UnitPayload::Transfer(TransferInsPayload {
            ins: ins_payload(pc, ins_id, ExecuteUnitType::Transfer),
            src_address_byte,
            dst_address_byte,
            size_byte,
        })
    }

    fn decode_pim_compute(
        &self,
        ins: &Instruction,
        identity: InstructionPayload,
        conflict: &mut DataConflictPayload,
    ) -> UnitPayload {
        let payload = PimComputeInsPayload {
            ins: identity,
            input_addr_byte: self.address(ins.rs1),
            input_len: to_count(self.general(ins.rs2)),
            input_bit_width: to_count(self.special(SPECIAL_PIM_INPUT_BIT_WIDTH)),
            activation_group_num: to_count(self.special(SPECIAL_ACTIVATION_GROUP_NUM)),
            activation_element_col_num: to_count(self.special(SPECIAL_ACTIVATION_ELEMENT_COL_NUM)),
            group_input_step_byte: i64::from(self.special(SPECIAL_GROUP_INPUT_STEP)),
            row: to_count(self.general(ins.rs3)),
            bit_sparse: ins.bit_sparse,
            bit_sparse_meta_addr_byte: if ins.bit_sparse {
                i64::from(self.special(SPECIAL_BIT_SPARSE_META_ADDR))
            } else {
                0
            },
            value_sparse: ins.value_sparse,
            value_sparse_mask_addr_byte: if ins.value_sparse {
                i64::from(self.special(SPECIAL_VALUE_SPARSE_MASK_ADDR))
            } else {
                0
            },
            output_addr_byte: (ins.rd != 0).then(|| self.address(ins.rd)),
            output_bit_width: if ins.rd == 0 {
                0
            } else {
                to_count(self.special(SPECIAL_PIM_OUTPUT_BIT_WIDTH))
            },
        };

        conflict.uses_pim_unit = true;
        conflict.add_read_memory(self.memory.memory_id_by_address(payload.input_addr_byte));
        if self.pim_config.value_sparse && payload.value_sparse {
            conflict.add_read_memory(self.memory.memory_id_by_address(payload.value_sparse_mask_addr_byte));
        }
        if self.pim_config.bit_sparse && payload.bit_sparse {
            conflict.add_read_memory(self.memory.memory_id_by_address(payload.bit_sparse_meta_addr_byte));
        }
        if let Some(address_byte) = payload.output_addr_byte {
            conflict.add_write_memory(self.memory.memory_id_by_address(address_byte));
        }
        UnitPayload::PimCompute(payload)
    }

    fn decode_pim_output(
        &self,
        ins: &Instruction,
        identity: InstructionPayload,
        conflict: &mut DataConflictPayload,
    ) -> UnitPayload {
        let output_type = if ins.outsum_move {
            PimOutputType::OutputSumMove
        } else if ins.outsum {
            PimOutputType::OutputSum
        } else {
            PimOutputType::OnlyOutput
        };
        let payload = PimOutputInsPayload {
            ins: identity,
            activation_group_num: to_count(self.special(SPECIAL_ACTIVATION_GROUP_NUM)),
            output_type,
            output_addr_byte: self.address(ins.rd),
            output_cnt_per_group: to_count(self.general(ins.rs1)),
            output_bit_width: to_count(self.special(SPECIAL_PIM_OUTPUT_BIT_WIDTH)),
            output_mask_addr_byte: self.address(ins.rs2),
        };

        conflict.uses_pim_unit = true;
        conflict.add_write_memory(self.memory.memory_id_by_address(payload.output_addr_byte));
        if output_type == PimOutputType::OutputSum {
            conflict.add_read_memory(self.memory.memory_id_by_address(payload.output_mask_addr_byte));
        }
        UnitPayload::PimOutput(payload)
    }

    fn decode_pim_set(
        &self,
        ins: &Instruction,
        identity: InstructionPayload,
        conflict: &mut DataConflictPayload,
    ) -> UnitPayload {
        let payload = PimSetInsPayload {
            ins: identity,
            group_broadcast: ins.group_broadcast,
            group_id: to_count(self.general(ins.rs1)),
            mask_addr_byte: self.address(ins.rs2),
        };
        conflict.uses_pim_unit = true;
        conflict.add_read_memory(self.memory.memory_id_by_address(payload.mask_addr_byte));
        UnitPayload::PimSet(payload)
    }

    fn decode_pim_transfer(
        &self,
        ins: &Instruction,
        identity: InstructionPayload,
        conflict: &mut DataConflictPayload,
    ) -> UnitPayload {
        let payload = PimTransferInsPayload {
            ins: identity,
            output_num: to_count(self.general(ins.rs2)),
            output_bit_width: to_count(self.special(SPECIAL_PIM_OUTPUT_BIT_WIDTH)),
            output_mask_addr_byte: self.address(ins.rs3),
            src_addr_byte: self.address(ins.rs1),
            dst_addr_byte: self.address(ins.rd),
            buffer_addr_byte: self.address(ins.rs4),
        };
        conflict.uses_pim_unit = true;
        conflict.add_read_memory(self.memory.memory_id_by_address(payload.src_addr_byte));
        conflict.add_read_memory(self.memory.memory_id_by_address(payload.output_mask_addr_byte));
        conflict.add_write_memory(self.memory.memory_id_by_address(payload.dst_addr_byte));
        conflict.add_read_write_memory(self.memory.memory_id_by_address(payload.buffer_addr_byte));
        UnitPayload::PimTransfer(payload)
    }

    fn decode_control(&self, ins: &Instruction, op: ControlOp) -> i64 {
        if op == ControlOp::Jmp {
            return i64::from(ins.offset);
        }
        let lhs = self.general(ins.rs1);
        let rhs = self.general(ins.rs2);
        let taken = match op {
            ControlOp::Beq => lhs == rhs,
            ControlOp::Bne => lhs != rhs,
            ControlOp::Bgt => lhs > rhs,
            ControlOp::Blt => lhs < rhs,
            ControlOp::Jmp => true,
        };
        if taken { i64::from(ins.offset) } else { 1 }
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;
    use crate::config::{
        AddressSpaceConfig, LocalMemoryConfig, LocalMemoryHardwareConfig, LocalMemoryUnitConfig,
        RamConfig, RegisterUnitConfig, SimConfig,
    };
    use crate::core::units::reg::RegUnitWriteRequest;
    use crate::isa::opcodes::{
        CLASS_CONTROL, CLASS_PIM, CLASS_SCALAR, CLASS_SIMD, CLASS_TRANSFER, CONTROL_BEQ, CONTROL_BLT,
        CONTROL_JMP, PIM_COMPUTE, PIM_OUTPUT, PIM_SET, PIM_TRANSFER, SCALAR_ASSIGN, SCALAR_RR,
        SCALAR_SL, SL_LOAD_LOCAL, SL_STORE_LOCAL, ASSIGN_SPECIAL_TO_GENERAL,
    };
    use crate::sim::SimContext;

    const PIM_OFFSET: i64 = 4096;

    struct Fixture {
        _ctx: SimContext,
        reg: Rc<RegUnit>,
        decoder: Decoder,
    }

    fn bank(name: &str, offset_byte: i64) -> LocalMemoryConfig {
        LocalMemoryConfig {
            name: name.to_owned(),
            addressing: AddressSpaceConfig { offset_byte, size_byte: 256 },
            hardware: LocalMemoryHardwareConfig::Ram(RamConfig {
                size_byte: 256,
                ..RamConfig::default()
            }),
        }
    }

    fn fixture(pim_load_fast_path: bool) -> Fixture {
        let ctx = SimContext::new(&SimConfig::default());
        let pim_config = Rc::new(PimUnitConfig {
            address_space: AddressSpaceConfig { offset_byte: PIM_OFFSET, size_byte: 4096 },
            value_sparse: true,
            ..PimUnitConfig::default()
        });
        let lmu_config = LocalMemoryUnitConfig {
            local_memory_list: vec![bank("a", 0), bank("b", 256), bank("c", 512)],
        };
        let memory = Rc::new(LocalMemoryUnit::new(&ctx, 0, &lmu_config, &pim_config, None).unwrap());
        let reg = Rc::new(RegUnit::new(&ctx, &RegisterUnitConfig::default()));
        let decoder = Decoder::new(Rc::clone(&reg), memory, pim_config, pim_load_fast_path);
        Fixture { _ctx: ctx, reg, decoder }
    }

    fn set(reg: &RegUnit, id: usize, value: i32, special: bool) {
        reg.write_register(RegUnitWriteRequest {
            reg_id: id,
            reg_value: value,
            write_special_register: special,
        });
    }

    fn ins(class: u32, inst_type: u32, opcode: u32) -> Instruction {
        Instruction {
            class,
            inst_type,
            opcode,
            ..Instruction::default()
        }
    }

    #[test]
    fn test_scalar_load_reads_bank_and_writes_register() {
        let f = fixture(false);
        set(&f.reg, 1, 300, false);
        let load = Instruction {
            rs1: 1,
            rs2: 5,
            offset: 4,
            ..ins(CLASS_SCALAR, SCALAR_SL, SL_LOAD_LOCAL)
        };
        let decoded = f.decoder.decode(&load, 3, 7).unwrap();
        let Some(UnitPayload::Scalar(payload)) = &decoded.payload else {
            panic!("expected a scalar payload");
        };
        assert_eq!(payload.op, ScalarOperator::Load);
        assert_eq!(payload.src1_value, 300);
        assert_eq!(payload.dst_reg, 5);
        assert_eq!(payload.ins.pc, 3);
        assert_eq!(payload.ins.ins_id, 7);
        assert!(decoded.conflict.read_memory_ids.contains(&1));
        assert!(decoded.conflict.write_register_ids.contains(&RegisterRef::General(5)));
        assert!(decoded.conflict.read_register_ids.contains(&RegisterRef::General(1)));
        assert_eq!(decoded.pc_increment, 1);
    }

    #[test]
    fn test_store_writes_bank() {
        let f = fixture(false);
        set(&f.reg, 2, 520, false);
        let store = Instruction {
            rs1: 2,
            rs2: 3,
            ..ins(CLASS_SCALAR, SCALAR_SL, SL_STORE_LOCAL)
        };
        let decoded = f.decoder.decode(&store, 1, 0).unwrap();
        assert!(decoded.conflict.write_memory_ids.contains(&2));
        assert!(decoded.conflict.write_register_ids.is_empty());
    }

    #[test]
    fn test_special_to_general_reads_special() {
        let f = fixture(false);
        set(&f.reg, 4, 9, true);
        let assign = Instruction {
            rs1: 6,
            rs2: 4,
            ..ins(CLASS_SCALAR, SCALAR_ASSIGN, ASSIGN_SPECIAL_TO_GENERAL)
        };
        let decoded = f.decoder.decode(&assign, 1, 0).unwrap();
        let Some(UnitPayload::Scalar(payload)) = &decoded.payload else {
            panic!("expected a scalar payload");
        };
        assert_eq!(payload.src1_value, 9);
        assert_eq!(payload.dst_reg, 6);
        assert!(!payload.write_special_register);
        assert!(decoded.conflict.read_register_ids.contains(&RegisterRef::Special(4)));
    }

    #[rstest]
    #[case(1, vec![1], vec![0])]
    #[case(2, vec![1, 3], vec![0, 256])]
    #[case(3, vec![1, 2, 3], vec![0, 10, 256])]
    #[case(4, vec![1, 2, 3, 4], vec![0, 10, 256, 266])]
    fn test_simd_input_addresses(#[case] input_num: u32, #[case] regs: Vec<usize>, #[case] addresses: Vec<i64>) {
        let f = fixture(false);
        for (reg, address) in [(1, 0), (2, 10), (3, 256), (4, 266), (10, 512)] {
            set(&f.reg, reg, address, false);
        }
        let simd = Instruction {
            rs1: 1,
            rs2: 3,
            rd: 10,
            input_num,
            ..ins(CLASS_SIMD, 0, 0)
        };
        assert_eq!(simd_input_registers(&simd, 1).unwrap(), regs);

        let decoded = f.decoder.decode(&simd, 1, 0).unwrap();
        let Some(UnitPayload::Simd(payload)) = &decoded.payload else {
            panic!("expected a SIMD payload");
        };
        assert_eq!(&payload.inputs_address_byte[..addresses.len()], addresses.as_slice());
        assert_eq!(payload.output_address_byte, 512);
        assert!(decoded.conflict.read_memory_ids.contains(&0));
        assert!(decoded.conflict.write_memory_ids.contains(&2));
    }

    #[test]
    fn test_simd_paired_register_without_successor_is_rejected() {
        let f = fixture(false);
        let simd = Instruction {
            rs1: 1,
            rs2: usize::MAX,
            input_num: 4,
            ..ins(CLASS_SIMD, 0, 0)
        };
        assert!(matches!(
            f.decoder.register_footprint(&simd, 6, 0),
            Err(SimError::InvalidInstruction { pc: 6, .. })
        ));
        assert!(matches!(
            f.decoder.decode(&simd, 6, 0),
            Err(SimError::InvalidInstruction { pc: 6, .. })
        ));
    }

    #[rstest]
    #[case::local_to_local_other_bank(0, 300, false, ExecuteUnitType::Transfer)]
    #[case::same_bank(0, 100, false, ExecuteUnitType::Transfer)]
    #[case::into_pim_disabled(0, PIM_OFFSET, false, ExecuteUnitType::Transfer)]
    #[case::into_pim_fast_path(0, PIM_OFFSET, true, ExecuteUnitType::PimLoad)]
    fn test_transfer_routing(
        #[case] src: i32,
        #[case] dst: i64,
        #[case] fast_path: bool,
        #[case] unit: ExecuteUnitType,
    ) {
        let f = fixture(fast_path);
        set(&f.reg, 1, src, false);
        set(&f.reg, 2, i32::try_from(dst).unwrap(), false);
        set(&f.reg, 3, 64, false);
        let transfer = Instruction {
            rs1: 1,
            rd: 2,
            rs2: 3,
            ..ins(CLASS_TRANSFER, 0, 0)
        };
        let decoded = f.decoder.decode(&transfer, 1, 0).unwrap();
        let payload = decoded.payload.unwrap();
        assert_eq!(payload.unit_type(), unit);
        assert_eq!(decoded.conflict.unit_type, Some(unit));
        assert_eq!(decoded.conflict.uses_pim_unit, unit == ExecuteUnitType::PimLoad);
        if dst == 100 {
            assert!(decoded.conflict.read_write_memory_ids.contains(&0));
        }
    }

    #[test]
    fn test_transfer_offset_mask() {
        let f = fixture(false);
        set(&f.reg, 1, 0, false);
        set(&f.reg, 2, 256, false);
        let transfer = Instruction {
            rs1: 1,
            rd: 2,
            offset: 8,
            offset_mask: 0b10,
            ..ins(CLASS_TRANSFER, 0, 0)
        };
        let Some(UnitPayload::Transfer(payload)) = f.decoder.decode(&transfer, 1, 0).unwrap().payload else {
            panic!("expected a transfer payload");
        };
        assert_eq!(payload.src_address_byte, 8);
        assert_eq!(payload.dst_address_byte, 256);
    }

    #[test]
    fn test_pim_compute_folds_sparsity_banks() {
        let f = fixture(false);
        set(&f.reg, 1, 0, false);
        set(&f.reg, SPECIAL_VALUE_SPARSE_MASK_ADDR, 300, true);
        set(&f.reg, SPECIAL_BIT_SPARSE_META_ADDR, 600, true);
        let compute = Instruction {
            rs1: 1,
            value_sparse: true,
            bit_sparse: true,
            ..ins(CLASS_PIM, PIM_COMPUTE, 0)
        };
        let decoded = f.decoder.decode(&compute, 1, 0).unwrap();
        assert!(decoded.conflict.uses_pim_unit);
        assert!(decoded.conflict.read_memory_ids.contains(&0));
        assert!(decoded.conflict.read_memory_ids.contains(&1));
        // bit sparsity is disabled in the hardware, so its metadata bank is not used
        assert!(!decoded.conflict.read_memory_ids.contains(&2));
    }

    #[test]
    fn test_pim_compute_output_register_claims_destination_bank() {
        let f = fixture(false);
        set(&f.reg, 1, 0, false);
        set(&f.reg, 7, 520, false);
        set(&f.reg, SPECIAL_PIM_OUTPUT_BIT_WIDTH, 32, true);
        let compute = Instruction {
            rs1: 1,
            rd: 7,
            ..ins(CLASS_PIM, PIM_COMPUTE, 0)
        };
        let decoded = f.decoder.decode(&compute, 1, 0).unwrap();
        let Some(UnitPayload::PimCompute(payload)) = &decoded.payload else {
            panic!("expected a PIM compute payload");
        };
        assert_eq!(payload.output_addr_byte, Some(520));
        assert_eq!(payload.output_bit_width, 32);
        assert!(decoded.conflict.write_memory_ids.contains(&2));
        assert!(decoded.conflict.read_register_ids.contains(&RegisterRef::General(7)));

        let plain = Instruction {
            rs1: 1,
            ..ins(CLASS_PIM, PIM_COMPUTE, 0)
        };
        let decoded = f.decoder.decode(&plain, 2, 1).unwrap();
        let Some(UnitPayload::PimCompute(payload)) = &decoded.payload else {
            panic!("expected a PIM compute payload");
        };
        assert_eq!(payload.output_addr_byte, None);
        assert!(decoded.conflict.write_memory_ids.is_empty());
    }

    #[test]
    fn test_pim_output_sum_reads_mask() {
        let f = fixture(false);
        set(&f.reg, 1, 520, false);
        set(&f.reg, 2, 300, false);
        let output = Instruction {
            rd: 1,
            rs2: 2,
            outsum: true,
            ..ins(CLASS_PIM, PIM_OUTPUT, 0)
        };
        let decoded = f.decoder.decode(&output, 1, 0).unwrap();
        let Some(UnitPayload::PimOutput(payload)) = &decoded.payload else {
            panic!("expected a PIM output payload");
        };
        assert_eq!(payload.output_type, PimOutputType::OutputSum);
        assert!(decoded.conflict.write_memory_ids.contains(&2));
        assert!(decoded.conflict.read_memory_ids.contains(&1));
    }

    #[test]
    fn test_pim_set_and_transfer_use_pim_unit() {
        let f = fixture(false);
        let set_ins = Instruction {
            group_broadcast: true,
            ..ins(CLASS_PIM, PIM_SET, 0)
        };
        let decoded = f.decoder.decode(&set_ins, 1, 0).unwrap();
        assert!(decoded.conflict.uses_pim_unit);
        assert!(matches!(decoded.payload, Some(UnitPayload::PimSet(PimSetInsPayload { group_broadcast: true, .. }))));

        set(&f.reg, 4, 300, false);
        let transfer = Instruction {
            rs4: 4,
            ..ins(CLASS_PIM, PIM_TRANSFER, 0)
        };
        let decoded = f.decoder.decode(&transfer, 2, 1).unwrap();
        assert!(decoded.conflict.uses_pim_unit);
        assert!(decoded.conflict.read_write_memory_ids.contains(&1));
        assert_eq!(decoded.conflict.unit_type, Some(ExecuteUnitType::PimTransfer));
    }

    #[rstest]
    #[case(CONTROL_JMP, 0, 0, -3, -3)]
    #[case(CONTROL_BEQ, 5, 5, 4, 4)]
    #[case(CONTROL_BEQ, 5, 6, 4, 1)]
    #[case(CONTROL_BLT, 1, 6, 2, 2)]
    #[case(CONTROL_BLT, 7, 6, 2, 1)]
    fn test_control_pc_increment(
        #[case] inst_type: u32,
        #[case] lhs: i32,
        #[case] rhs: i32,
        #[case] offset: i32,
        #[case] expected: i64,
    ) {
        let f = fixture(false);
        set(&f.reg, 1, lhs, false);
        set(&f.reg, 2, rhs, false);
        let branch = Instruction {
            rs1: 1,
            rs2: 2,
            offset,
            ..ins(CLASS_CONTROL, inst_type, 0)
        };
        let decoded = f.decoder.decode(&branch, 1, 0).unwrap();
        assert!(decoded.payload.is_none());
        assert_eq!(decoded.pc_increment, expected);
        assert_eq!(decoded.conflict.unit_type, Some(ExecuteUnitType::Control));
    }

    #[test]
    fn test_unknown_encoding_is_rejected() {
        let f = fixture(false);
        let bad = ins(CLASS_SCALAR, SCALAR_RR, 42);
        assert!(matches!(
            f.decoder.decode(&bad, 9, 0),
            Err(SimError::InvalidInstruction { pc: 9, .. })
        ));
    }
}
