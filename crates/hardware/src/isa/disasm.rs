//! Instruction disassembler.
//!
//! Renders a static [`Instruction`] as a short mnemonic string for debug
//! tracing, logging and test diagnostics. Unknown encodings render as
//! `unknown(class, type, opcode)`.

use super::instruction::{AssignOp, ControlOp, Instruction, Operation, PimInstType, ScalarOp};

/// Returns a human-readable rendering of `ins`.
pub fn disassemble(ins: &Instruction) -> String {
    let Some(op) = ins.operation() else {
        return format!("unknown({}, {}, {})", ins.class, ins.inst_type, ins.opcode);
    };
    match op {
        Operation::Scalar(ScalarOp::RegReg(alu)) => {
            format!("{} r{}, r{}, r{}", alu.name(), ins.rd, ins.rs1, ins.rs2)
        }
        Operation::Scalar(ScalarOp::RegImm(alu)) => {
            format!("{}i r{}, r{}, {}", alu.name(), ins.rd, ins.rs1, ins.imm)
        }
        Operation::Scalar(ScalarOp::Load { global }) => format!(
            "load{} r{}, {}(r{})",
            if global { "_global" } else { "" },
            ins.rs2,
            ins.offset,
            ins.rs1
        ),
        Operation::Scalar(ScalarOp::Store { global }) => format!(
            "store{} r{}, {}(r{})",
            if global { "_global" } else { "" },
            ins.rs2,
            ins.offset,
            ins.rs1
        ),
        Operation::Scalar(ScalarOp::Assign(assign)) => match assign {
            AssignOp::LiGeneral => format!("li r{}, {}", ins.rd, ins.imm),
            AssignOp::LiSpecial => format!("li s{}, {}", ins.rd, ins.imm),
            AssignOp::GeneralToSpecial => format!("mv s{}, r{}", ins.rs2, ins.rs1),
            AssignOp::SpecialToGeneral => format!("mv r{}, s{}", ins.rs1, ins.rs2),
        },
        Operation::Simd => format!(
            "simd.{:#04x}/{} r{}, r{}, r{}, len r{}",
            ins.opcode, ins.input_num, ins.rd, ins.rs1, ins.rs2, ins.rs3
        ),
        Operation::Transfer => format!(
            "trans r{}, r{}, size r{}, offset {} mask {:#b}",
            ins.rd, ins.rs1, ins.rs2, ins.offset, ins.offset_mask
        ),
        Operation::Pim(PimInstType::Compute) => format!(
            "pim.compute in r{}, len r{}, row r{}{}{}{}",
            ins.rs1,
            ins.rs2,
            ins.rs3,
            if ins.rd == 0 { String::new() } else { format!(", out r{}", ins.rd) },
            if ins.value_sparse { " vs" } else { "" },
            if ins.bit_sparse { " bs" } else { "" }
        ),
        Operation::Pim(PimInstType::Set) => format!(
            "pim.set group r{}, mask r{}{}",
            ins.rs1,
            ins.rs2,
            if ins.group_broadcast { " broadcast" } else { "" }
        ),
        Operation::Pim(PimInstType::Output) => format!(
            "pim.output{} r{}, cnt r{}, mask r{}",
            if ins.outsum_move {
                ".sum_move"
            } else if ins.outsum {
                ".sum"
            } else {
                ""
            },
            ins.rd,
            ins.rs1,
            ins.rs2
        ),
        Operation::Pim(PimInstType::Transfer) => format!(
            "pim.transfer r{}, r{}, num r{}, mask r{}, buffer r{}",
            ins.rd, ins.rs1, ins.rs2, ins.rs3, ins.rs4
        ),
        Operation::Control(ControlOp::Jmp) => format!("jmp {}", ins.offset),
        Operation::Control(cond) => {
            let name = match cond {
                ControlOp::Beq => "beq",
                ControlOp::Bne => "bne",
                ControlOp::Bgt => "bgt",
                _ => "blt",
            };
            format!("{name} r{}, r{}, {}", ins.rs1, ins.rs2, ins.offset)
        }
    }
}
