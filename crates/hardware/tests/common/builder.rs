use pimsim_core::isa::Instruction;
use pimsim_core::isa::opcodes::{
    ASSIGN_LI_GENERAL, ASSIGN_LI_SPECIAL, CLASS_CONTROL, CLASS_PIM, CLASS_SCALAR, CLASS_TRANSFER,
    CONTROL_BNE, CONTROL_JMP, PIM_COMPUTE, PIM_OUTPUT, SCALAR_ASSIGN, SCALAR_RI, SCALAR_RR, SCALAR_SL,
    SL_LOAD_GLOBAL, SL_LOAD_LOCAL, SL_STORE_GLOBAL, SL_STORE_LOCAL,
};

/// Fluent builder for one static instruction record.
#[derive(Debug, Clone, Copy, Default)]
pub struct InstructionBuilder {
    ins: Instruction,
}

impl InstructionBuilder {
    pub fn new(class: u32, inst_type: u32, opcode: u32) -> Self {
        Self {
            ins: Instruction {
                class,
                inst_type,
                opcode,
                ..Instruction::default()
            },
        }
    }

    pub fn rs1(mut self, rs1: usize) -> Self {
        self.ins.rs1 = rs1;
        self
    }

    pub fn rs2(mut self, rs2: usize) -> Self {
        self.ins.rs2 = rs2;
        self
    }

    pub fn rs3(mut self, rs3: usize) -> Self {
        self.ins.rs3 = rs3;
        self
    }

    pub fn rd(mut self, rd: usize) -> Self {
        self.ins.rd = rd;
        self
    }

    pub fn imm(mut self, imm: i32) -> Self {
        self.ins.imm = imm;
        self
    }

    pub fn offset(mut self, offset: i32) -> Self {
        self.ins.offset = offset;
        self
    }

    pub fn outsum(mut self, outsum: bool) -> Self {
        self.ins.outsum = outsum;
        self
    }

    pub fn build(self) -> Instruction {
        self.ins
    }
}

/// `rd = imm`
pub fn li(rd: usize, imm: i32) -> Instruction {
    InstructionBuilder::new(CLASS_SCALAR, SCALAR_ASSIGN, ASSIGN_LI_GENERAL)
        .rd(rd)
        .imm(imm)
        .build()
}

/// `special[rd] = imm`
pub fn li_special(rd: usize, imm: i32) -> Instruction {
    InstructionBuilder::new(CLASS_SCALAR, SCALAR_ASSIGN, ASSIGN_LI_SPECIAL)
        .rd(rd)
        .imm(imm)
        .build()
}

/// `rd = rs1 + imm`
pub fn addi(rd: usize, rs1: usize, imm: i32) -> Instruction {
    InstructionBuilder::new(CLASS_SCALAR, SCALAR_RI, 0)
        .rd(rd)
        .rs1(rs1)
        .imm(imm)
        .build()
}

/// `rd = rs1 + rs2`
pub fn add(rd: usize, rs1: usize, rs2: usize) -> Instruction {
    InstructionBuilder::new(CLASS_SCALAR, SCALAR_RR, 0)
        .rd(rd)
        .rs1(rs1)
        .rs2(rs2)
        .build()
}

/// `rd = local[rs1 + offset]`
pub fn load(rd: usize, rs1: usize, offset: i32) -> Instruction {
    InstructionBuilder::new(CLASS_SCALAR, SCALAR_SL, SL_LOAD_LOCAL)
        .rs1(rs1)
        .rs2(rd)
        .offset(offset)
        .build()
}

/// `local[rs1 + offset] = rs2`
pub fn store(rs1: usize, rs2: usize, offset: i32) -> Instruction {
    InstructionBuilder::new(CLASS_SCALAR, SCALAR_SL, SL_STORE_LOCAL)
        .rs1(rs1)
        .rs2(rs2)
        .offset(offset)
        .build()
}

/// `rd = global[rs1 + offset]`
pub fn load_global(rd: usize, rs1: usize, offset: i32) -> Instruction {
    InstructionBuilder::new(CLASS_SCALAR, SCALAR_SL, SL_LOAD_GLOBAL)
        .rs1(rs1)
        .rs2(rd)
        .offset(offset)
        .build()
}

/// `global[rs1 + offset] = rs2`
pub fn store_global(rs1: usize, rs2: usize, offset: i32) -> Instruction {
    InstructionBuilder::new(CLASS_SCALAR, SCALAR_SL, SL_STORE_GLOBAL)
        .rs1(rs1)
        .rs2(rs2)
        .offset(offset)
        .build()
}

/// Copies `size` bytes from the address in `src` to the address in `dst`.
pub fn transfer(dst: usize, src: usize, size: usize) -> Instruction {
    InstructionBuilder::new(CLASS_TRANSFER, 0, 0)
        .rd(dst)
        .rs1(src)
        .rs2(size)
        .build()
}

/// PIM compute on the inputs at the address in `input`, `len` inputs long,
/// against weight row `row`.
pub fn pim_compute(input: usize, len: usize, row: usize) -> Instruction {
    InstructionBuilder::new(CLASS_PIM, PIM_COMPUTE, 0)
        .rs1(input)
        .rs2(len)
        .rs3(row)
        .build()
}

/// [`pim_compute`] writing its results to the address in `out`.
pub fn pim_compute_to(input: usize, len: usize, row: usize, out: usize) -> Instruction {
    InstructionBuilder::new(CLASS_PIM, PIM_COMPUTE, 0)
        .rd(out)
        .rs1(input)
        .rs2(len)
        .rs3(row)
        .build()
}

/// PIM output of `cnt` results per group to the address in `dst`.
pub fn pim_output(dst: usize, cnt: usize) -> Instruction {
    InstructionBuilder::new(CLASS_PIM, PIM_OUTPUT, 0).rd(dst).rs1(cnt).build()
}

/// Branch by `offset` when `rs1 != rs2`.
pub fn bne(rs1: usize, rs2: usize, offset: i32) -> Instruction {
    InstructionBuilder::new(CLASS_CONTROL, CONTROL_BNE, 0)
        .rs1(rs1)
        .rs2(rs2)
        .offset(offset)
        .build()
}

/// Unconditional relative jump.
pub fn jmp(offset: i32) -> Instruction {
    InstructionBuilder::new(CLASS_CONTROL, CONTROL_JMP, 0).offset(offset).build()
}
