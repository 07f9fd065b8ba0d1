//! Instruction Set Architecture (ISA) Definitions.
//!
//! Programs are lists of static [`Instruction`] records. This module contains:
//! 1. **Encodings:** Numeric values of the class, type and opcode fields.
//! 2. **Instructions:** The record itself and its typed classification.
//! 3. **Disassembly:** Mnemonic rendering for tracing.

/// Instruction disassembler for debug tracing and diagnostics.
pub mod disasm;

/// Static instruction record and operation classification.
pub mod instruction;

/// Numeric encodings of instruction fields and special registers.
pub mod opcodes;

pub use instruction::{
    AluOp, AssignOp, ControlOp, InstClass, Instruction, Operation, PimInstType, ScalarOp,
};
