//! Decoded instruction payloads.
//!
//! The core decodes each static instruction into exactly one payload for one
//! execution unit. Register operands are resolved at decode time, so a payload
//! carries plain values and addresses and never refers back to the register
//! file.

use std::fmt;

use crate::isa::AluOp;

/// Execution unit an instruction is dispatched to.
///
/// The order is used when conflict records are merged: the greater type wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ExecuteUnitType {
    /// Scalar ALU, loads, stores and register assignment.
    Scalar,
    /// SIMD vector unit.
    Simd,
    /// Memory-to-memory transfer unit.
    Transfer,
    /// PIM matrix-vector compute.
    PimCompute,
    /// PIM weight load.
    PimLoad,
    /// PIM result readout.
    PimOutput,
    /// PIM activation column set.
    PimSet,
    /// PIM valid-output compaction.
    PimTransfer,
    /// Branches and jumps, resolved by the core itself.
    Control,
}

impl ExecuteUnitType {
    /// Every type backed by an execution unit, in core construction order.
    pub const UNITS: [Self; 8] = [
        Self::Scalar,
        Self::Simd,
        Self::Transfer,
        Self::PimCompute,
        Self::PimLoad,
        Self::PimOutput,
        Self::PimSet,
        Self::PimTransfer,
    ];

    /// Name used in logs and reports.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Scalar => "ScalarUnit",
            Self::Simd => "SIMDUnit",
            Self::Transfer => "TransferUnit",
            Self::PimCompute => "PimComputeUnit",
            Self::PimLoad => "PimLoadUnit",
            Self::PimOutput => "PimOutputUnit",
            Self::PimSet => "PimSetUnit",
            Self::PimTransfer => "PimTransferUnit",
            Self::Control => "ControlUnit",
        }
    }
}

impl fmt::Display for ExecuteUnitType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Identity of one decoded instruction instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InstructionPayload {
    /// One-based position of the static instruction in the program.
    pub pc: usize,
    /// Unique, increasing id of this dynamic instance.
    pub ins_id: u64,
    /// Target unit.
    pub unit_type: ExecuteUnitType,
}

/// Operation performed by the scalar unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalarOperator {
    /// Arithmetic on `src1` and `src2`.
    Alu(AluOp),
    /// `dst = mem[src1 + offset]`.
    Load,
    /// `mem[src1 + offset] = src2`.
    Store,
    /// `dst = src1`.
    Assign,
}

impl ScalarOperator {
    /// Functor name used for power lookup.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Alu(op) => op.name(),
            Self::Load => "load",
            Self::Store => "store",
            Self::Assign => "assign",
        }
    }
}

/// Scalar unit instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScalarInsPayload {
    /// Instruction identity.
    pub ins: InstructionPayload,
    /// Operation.
    pub op: ScalarOperator,
    /// First operand value.
    pub src1_value: i32,
    /// Second operand value or immediate.
    pub src2_value: i32,
    /// Address offset of loads and stores.
    pub offset: i32,
    /// Destination register.
    pub dst_reg: usize,
    /// Whether `dst_reg` names a special register.
    pub write_special_register: bool,
}

/// SIMD unit instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimdInsPayload {
    /// Instruction identity.
    pub ins: InstructionPayload,
    /// Number of inputs.
    pub input_cnt: u32,
    /// Opcode, resolved against the configured instruction list.
    pub opcode: u32,
    /// Bit width of each input.
    pub inputs_bit_width: [u32; 4],
    /// Bit width of the output.
    pub output_bit_width: u32,
    /// Address of each input.
    pub inputs_address_byte: [i64; 4],
    /// Address of the output.
    pub output_address_byte: i64,
    /// Number of vector elements.
    pub len: usize,
}

/// Transfer unit instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferInsPayload {
    /// Instruction identity.
    pub ins: InstructionPayload,
    /// Source address.
    pub src_address_byte: i64,
    /// Destination address.
    pub dst_address_byte: i64,
    /// Bytes to move.
    pub size_byte: usize,
}

/// PIM compute instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PimComputeInsPayload {
    /// Instruction identity.
    pub ins: InstructionPayload,
    /// Address of the inputs of group 0.
    pub input_addr_byte: i64,
    /// Inputs per group.
    pub input_len: usize,
    /// Bit width of each input.
    pub input_bit_width: usize,
    /// Groups taking part.
    pub activation_group_num: usize,
    /// Element columns taking part in each group; zero selects the columns
    /// enabled by the last `pim-set`.
    pub activation_element_col_num: usize,
    /// Address step between the inputs of consecutive groups.
    pub group_input_step_byte: i64,
    /// Weight row.
    pub row: usize,
    /// Whether bit-sparse metadata is used.
    pub bit_sparse: bool,
    /// Address of the bit-sparse metadata.
    pub bit_sparse_meta_addr_byte: i64,
    /// Whether the value-sparse mask is used.
    pub value_sparse: bool,
    /// Address of the value-sparse mask.
    pub value_sparse_mask_addr_byte: i64,
    /// Where the results are written, when the instruction names an output
    /// register.
    pub output_addr_byte: Option<i64>,
    /// Bit width of each result.
    pub output_bit_width: usize,
}

/// PIM load instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PimLoadInsPayload {
    /// Instruction identity.
    pub ins: InstructionPayload,
    /// Address of the weights.
    pub src_address_byte: i64,
    /// Bytes to load.
    pub size_byte: usize,
}

/// How PIM results are read out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PimOutputType {
    /// Every result is written out.
    OnlyOutput,
    /// Masked results are summed before being written.
    OutputSum,
    /// Every result is summed and moved.
    OutputSumMove,
}

/// PIM output instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PimOutputInsPayload {
    /// Instruction identity.
    pub ins: InstructionPayload,
    /// Groups taking part.
    pub activation_group_num: usize,
    /// Readout mode.
    pub output_type: PimOutputType,
    /// Destination address.
    pub output_addr_byte: i64,
    /// Results per group.
    pub output_cnt_per_group: usize,
    /// Bit width of each result.
    pub output_bit_width: usize,
    /// Address of the sum mask.
    pub output_mask_addr_byte: i64,
}

/// PIM set instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PimSetInsPayload {
    /// Instruction identity.
    pub ins: InstructionPayload,
    /// Whether the mask applies to every group.
    pub group_broadcast: bool,
    /// Target group.
    pub group_id: usize,
    /// Address of the column mask.
    pub mask_addr_byte: i64,
}

/// PIM transfer instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PimTransferInsPayload {
    /// Instruction identity.
    pub ins: InstructionPayload,
    /// Candidate outputs.
    pub output_num: usize,
    /// Bit width of each output.
    pub output_bit_width: usize,
    /// Address of the valid-output mask.
    pub output_mask_addr_byte: i64,
    /// Source address.
    pub src_addr_byte: i64,
    /// Destination address.
    pub dst_addr_byte: i64,
    /// Address of the staging buffer.
    pub buffer_addr_byte: i64,
}

/// A payload addressed to one execution unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnitPayload {
    /// Scalar unit.
    Scalar(ScalarInsPayload),
    /// SIMD unit.
    Simd(SimdInsPayload),
    /// Transfer unit.
    Transfer(TransferInsPayload),
    /// PIM compute unit.
    PimCompute(PimComputeInsPayload),
    /// PIM load unit.
    PimLoad(PimLoadInsPayload),
    /// PIM output unit.
    PimOutput(PimOutputInsPayload),
    /// PIM set unit.
    PimSet(PimSetInsPayload),
    /// PIM transfer unit.
    PimTransfer(PimTransferInsPayload),
}

impl UnitPayload {
    /// Identity of the instruction.
    pub const fn ins(&self) -> &InstructionPayload {
        match self {
            Self::Scalar(p) => &p.ins,
            Self::Simd(p) => &p.ins,
            Self::Transfer(p) => &p.ins,
            Self::PimCompute(p) => &p.ins,
            Self::PimLoad(p) => &p.ins,
            Self::PimOutput(p) => &p.ins,
            Self::PimSet(p) => &p.ins,
            Self::PimTransfer(p) => &p.ins,
        }
    }

    /// Target unit.
    pub const fn unit_type(&self) -> ExecuteUnitType {
        self.ins().unit_type
    }
}
