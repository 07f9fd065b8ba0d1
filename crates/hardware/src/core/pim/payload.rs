//! Payloads flowing through the PIM compute hierarchy.

use std::rc::Rc;

use crate::core::payload::InstructionPayload;
use crate::core::socket::BatchInfo;

/// Identity of one sub-instruction of a PIM compute instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PimInsInfo {
    /// Instruction the sub-instruction belongs to.
    pub ins: InstructionPayload,
    /// Sub-instruction number, starting at 1.
    pub sub_ins_num: usize,
    /// Whether this is the last sub-instruction of `ins`.
    pub last_sub_ins: bool,
}

/// Write of an instruction's results back to local memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PimOutputWrite {
    /// Instruction producing the results.
    pub ins: InstructionPayload,
    /// Destination address.
    pub address_byte: i64,
    /// Bytes written.
    pub size_byte: usize,
}

/// Work handed to one macro.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MacroPayload {
    /// Sub-instruction identity.
    pub pim_ins_info: PimInsInfo,
    /// Weight row.
    pub row: usize,
    /// Bit width of every input.
    pub input_bit_width: usize,
    /// Element columns of this macro taking part.
    pub activation_element_col_num: usize,
    /// Whether bit-sparse post processing is applied.
    pub bit_sparse: bool,
    /// One input per compartment; extra inputs are ignored.
    pub inputs: Vec<u64>,
}

/// Static part of a macro sub-instruction, shared by all its batches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MacroSubInsInfo {
    /// Sub-instruction identity.
    pub pim_ins_info: PimInsInfo,
    /// Compartments holding a non-zero input.
    pub compartment_num: usize,
    /// Element columns taking part.
    pub element_col_num: usize,
    /// Whether bit-sparse post processing is applied.
    pub bit_sparse: bool,
}

/// One batch travelling through the macro stages.
#[derive(Debug, Clone)]
pub struct MacroSubmodulePayload {
    /// Static part.
    pub sub_ins_info: Rc<MacroSubInsInfo>,
    /// Bit plane.
    pub batch: BatchInfo,
}

/// Work handed to one macro group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MacroGroupPayload {
    /// Sub-instruction identity.
    pub pim_ins_info: PimInsInfo,
    /// Whether this is the last group of the sub-instruction.
    pub last_group: bool,
    /// Weight row.
    pub row: usize,
    /// Bit width of every input.
    pub input_bit_width: usize,
    /// Element columns of the group taking part; zero selects the columns
    /// enabled by the last `pim-set`.
    pub activation_element_col_num: usize,
    /// Whether bit-sparse post processing is applied.
    pub bit_sparse: bool,
    /// Inputs of each macro.
    pub macro_inputs: Vec<Vec<u64>>,
    /// Result write issued once the instruction's last addition is done.
    pub output: Option<PimOutputWrite>,
}

/// Work handed to a group controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MacroGroupControllerPayload {
    /// Sub-instruction identity.
    pub pim_ins_info: PimInsInfo,
    /// Whether this is the last group of the sub-instruction.
    pub last_group: bool,
    /// Bit width of every input; one batch per bit.
    pub input_bit_width: usize,
    /// Whether bit-sparse post processing is applied.
    pub bit_sparse: bool,
    /// Result write, set on the last group only.
    pub output: Option<PimOutputWrite>,
}

/// Static part of a group sub-instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MacroGroupSubInsInfo {
    /// Sub-instruction identity.
    pub pim_ins_info: PimInsInfo,
    /// Whether this is the last group of the sub-instruction.
    pub last_group: bool,
    /// Whether bit-sparse post processing is applied.
    pub bit_sparse: bool,
    /// Result write, set on the last group only.
    pub output: Option<PimOutputWrite>,
}

/// One batch travelling through the controller stages and into the result adder.
#[derive(Debug, Clone)]
pub struct MacroGroupSubmodulePayload {
    /// Static part.
    pub sub_ins_info: Rc<MacroGroupSubInsInfo>,
    /// Bit plane.
    pub batch: BatchInfo,
}
