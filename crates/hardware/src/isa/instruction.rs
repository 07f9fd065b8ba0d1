//! Static instruction records.
//!
//! An [`Instruction`] is the immutable, decode-time description loaded from a
//! program file. [`Instruction::operation`] classifies the raw `class`, `type`
//! and `opcode` fields into a typed [`Operation`].

use serde::{Deserialize, Serialize};

use super::opcodes::{
    ASSIGN_GENERAL_TO_SPECIAL, ASSIGN_LI_GENERAL, ASSIGN_LI_SPECIAL, ASSIGN_SPECIAL_TO_GENERAL,
    CLASS_CONTROL, CLASS_PIM, CLASS_SCALAR, CLASS_SIMD, CLASS_TRANSFER, CONTROL_BEQ, CONTROL_BGT,
    CONTROL_BLT, CONTROL_BNE, CONTROL_JMP, PIM_COMPUTE, PIM_OUTPUT, PIM_SET, PIM_TRANSFER,
    SCALAR_ASSIGN, SCALAR_RI, SCALAR_RR, SCALAR_SL, SL_LOAD_GLOBAL, SL_LOAD_LOCAL,
    SL_STORE_GLOBAL, SL_STORE_LOCAL,
};

/// One static instruction. Missing fields are zero or false.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Instruction {
    /// Instruction class.
    #[serde(alias = "class_code")]
    pub class: u32,
    /// Type within the class.
    #[serde(rename = "type")]
    pub inst_type: u32,
    /// Opcode within the type.
    pub opcode: u32,
    /// First source register.
    #[serde(alias = "rs")]
    pub rs1: usize,
    /// Second source register.
    pub rs2: usize,
    /// Third source register.
    pub rs3: usize,
    /// Fourth source register.
    pub rs4: usize,
    /// Destination register.
    pub rd: usize,
    /// Immediate operand.
    pub imm: i32,
    /// Address or branch offset.
    pub offset: i32,
    /// PIM compute uses the value-sparse mask.
    pub value_sparse: bool,
    /// PIM compute uses bit-sparse metadata.
    pub bit_sparse: bool,
    /// PIM compute operates on groups.
    pub group: bool,
    /// PIM compute group input mode.
    pub group_input_mode: u32,
    /// PIM set applies to every group.
    pub group_broadcast: bool,
    /// PIM output moves partial sums.
    pub outsum_move: bool,
    /// PIM output adds partial sums.
    pub outsum: bool,
    /// SIMD operand count.
    pub input_num: u32,
    /// Transfer offset selector: bit 1 offsets the source, bit 0 the destination.
    pub offset_mask: u32,
}

/// Instruction class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InstClass {
    /// PIM unit instruction.
    Pim,
    /// SIMD vector instruction.
    Simd,
    /// Scalar ALU instruction.
    Scalar,
    /// Memory-to-memory transfer.
    Transfer,
    /// Branch or jump.
    Control,
}

/// Kind of PIM instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PimInstType {
    /// Bit-serial matrix-vector compute.
    Compute,
    /// Set activated element columns.
    Set,
    /// Read results out of the macros.
    Output,
    /// Move valid outputs between memories.
    Transfer,
}

/// Scalar arithmetic operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AluOp {
    /// Wrapping addition.
    Add,
    /// Wrapping subtraction.
    Sub,
    /// Wrapping multiplication.
    Mul,
    /// Signed division.
    Div,
    /// Logical shift left.
    Sll,
    /// Logical shift right.
    Srl,
    /// Arithmetic shift right.
    Sra,
    /// Signed remainder.
    Mod,
    /// Signed minimum.
    Min,
    /// Load upper immediate.
    Lui,
}

impl AluOp {
    const RR: [Self; 9] = [
        Self::Add,
        Self::Sub,
        Self::Mul,
        Self::Div,
        Self::Sll,
        Self::Srl,
        Self::Sra,
        Self::Mod,
        Self::Min,
    ];

    /// Decodes a register-register opcode.
    pub fn from_rr(opcode: u32) -> Option<Self> {
        Self::RR.get(opcode as usize).copied()
    }

    /// Decodes a register-immediate opcode; opcode 9 is `lui`.
    pub fn from_ri(opcode: u32) -> Option<Self> {
        if opcode == 9 { Some(Self::Lui) } else { Self::from_rr(opcode) }
    }

    /// Lower-case mnemonic, also the functor name used for power lookup.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Add => "add",
            Self::Sub => "sub",
            Self::Mul => "mul",
            Self::Div => "div",
            Self::Sll => "sll",
            Self::Srl => "srl",
            Self::Sra => "sra",
            Self::Mod => "mod",
            Self::Min => "min",
            Self::Lui => "lui",
        }
    }
}

/// Register assignment form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AssignOp {
    /// `rd = imm`.
    LiGeneral,
    /// `special[rd] = imm`.
    LiSpecial,
    /// `special[rs2] = rs1`.
    GeneralToSpecial,
    /// `rs1 = special[rs2]`.
    SpecialToGeneral,
}

/// Scalar instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScalarOp {
    /// `rd = rs1 op rs2`.
    RegReg(AluOp),
    /// `rd = rs1 op imm`.
    RegImm(AluOp),
    /// `rs2 = mem[rs1 + offset]`.
    Load {
        /// Whether the address is in global memory.
        global: bool,
    },
    /// `mem[rs1 + offset] = rs2`.
    Store {
        /// Whether the address is in global memory.
        global: bool,
    },
    /// Register assignment.
    Assign(AssignOp),
}

/// Branch or jump.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControlOp {
    /// Branch if `rs1 == rs2`.
    Beq,
    /// Branch if `rs1 != rs2`.
    Bne,
    /// Branch if `rs1 > rs2`.
    Bgt,
    /// Branch if `rs1 < rs2`.
    Blt,
    /// Jump by `offset`.
    Jmp,
}

/// Fully classified operation of an instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// PIM unit operation.
    Pim(PimInstType),
    /// SIMD operation; the opcode is resolved against the SIMD config.
    Simd,
    /// Scalar operation.
    Scalar(ScalarOp),
    /// Memory transfer.
    Transfer,
    /// Control flow.
    Control(ControlOp),
}

impl Instruction {
    /// Decodes the class field.
    pub const fn inst_class(&self) -> Option<InstClass> {
        match self.class {
            CLASS_PIM => Some(InstClass::Pim),
            CLASS_SIMD => Some(InstClass::Simd),
            CLASS_SCALAR => Some(InstClass::Scalar),
            CLASS_TRANSFER => Some(InstClass::Transfer),
            CLASS_CONTROL => Some(InstClass::Control),
            _ => None,
        }
    }

    /// Classifies the instruction, or `None` for an unknown encoding.
    pub fn operation(&self) -> Option<Operation> {
        let op = match self.inst_class()? {
            InstClass::Pim => Operation::Pim(match self.inst_type {
                PIM_COMPUTE => PimInstType::Compute,
                PIM_SET => PimInstType::Set,
                PIM_OUTPUT => PimInstType::Output,
                PIM_TRANSFER => PimInstType::Transfer,
                _ => return None,
            }),
            InstClass::Simd => Operation::Simd,
            InstClass::Scalar => Operation::Scalar(match self.inst_type {
                SCALAR_RR => ScalarOp::RegReg(AluOp::from_rr(self.opcode)?),
                SCALAR_RI => ScalarOp::RegImm(AluOp::from_ri(self.opcode)?),
                SCALAR_SL => match self.opcode {
                    SL_LOAD_LOCAL => ScalarOp::Load { global: false },
                    SL_STORE_LOCAL => ScalarOp::Store { global: false },
                    SL_LOAD_GLOBAL => ScalarOp::Load { global: true },
                    SL_STORE_GLOBAL => ScalarOp::Store { global: true },
                    _ => return None,
                },
                SCALAR_ASSIGN => ScalarOp::Assign(match self.opcode {
                    ASSIGN_LI_GENERAL => AssignOp::LiGeneral,
                    ASSIGN_LI_SPECIAL => AssignOp::LiSpecial,
                    ASSIGN_GENERAL_TO_SPECIAL => AssignOp::GeneralToSpecial,
                    ASSIGN_SPECIAL_TO_GENERAL => AssignOp::SpecialToGeneral,
                    _ => return None,
                }),
                _ => return None,
            }),
            InstClass::Transfer => Operation::Transfer,
            InstClass::Control => Operation::Control(match self.inst_type {
                CONTROL_BEQ => ControlOp::Beq,
                CONTROL_BNE => ControlOp::Bne,
                CONTROL_BGT => ControlOp::Bgt,
                CONTROL_BLT => ControlOp::Blt,
                CONTROL_JMP => ControlOp::Jmp,
                _ => return None,
            }),
        };
        Some(op)
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    fn ins(class: u32, inst_type: u32, opcode: u32) -> Instruction {
        Instruction {
            class,
            inst_type,
            opcode,
            ..Instruction::default()
        }
    }

    #[rstest]
    #[case(ins(0b10, 0, 0), Some(Operation::Scalar(ScalarOp::RegReg(AluOp::Add))))]
    #[case(ins(0b10, 0, 8), Some(Operation::Scalar(ScalarOp::RegReg(AluOp::Min))))]
    #[case(ins(0b10, 0, 9), None)]
    #[case(ins(0b10, 1, 9), Some(Operation::Scalar(ScalarOp::RegImm(AluOp::Lui))))]
    #[case(ins(0b10, 2, 0), Some(Operation::Scalar(ScalarOp::Load { global: false })))]
    #[case(ins(0b10, 2, 3), Some(Operation::Scalar(ScalarOp::Store { global: true })))]
    #[case(ins(0b10, 3, 3), Some(Operation::Scalar(ScalarOp::Assign(AssignOp::SpecialToGeneral))))]
    #[case(ins(0b00, 0, 0), Some(Operation::Pim(PimInstType::Compute)))]
    #[case(ins(0b00, 2, 0), Some(Operation::Pim(PimInstType::Output)))]
    #[case(ins(0b01, 0, 5), Some(Operation::Simd))]
    #[case(ins(0b110, 0, 0), Some(Operation::Transfer))]
    #[case(ins(0b111, 4, 0), Some(Operation::Control(ControlOp::Jmp)))]
    #[case(ins(0b111, 5, 0), None)]
    #[case(ins(0b011, 0, 0), None)]
    fn test_operation_classification(#[case] instruction: Instruction, #[case] expected: Option<Operation>) {
        assert_eq!(instruction.operation(), expected);
    }

    #[test]
    fn test_json_aliases() {
        let instruction: Instruction =
            serde_json::from_str(r#"{"class": 6, "type": 0, "rs": 3, "rd": 4, "offset_mask": 2}"#).unwrap();
        assert_eq!(instruction.class, 0b110);
        assert_eq!(instruction.rs1, 3);
        assert_eq!(instruction.rd, 4);
        assert_eq!(instruction.offset_mask, 2);

        let instruction: Instruction = serde_json::from_str(r#"{"class_code": 7, "type": 4, "offset": -2}"#).unwrap();
        assert_eq!(instruction.operation(), Some(Operation::Control(ControlOp::Jmp)));
        assert_eq!(instruction.offset, -2);
    }
}
