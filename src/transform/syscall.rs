//! Lower the four high-level syscall pseudo-ops to the `a7`/`a0`-pinned
//! `ECALL` sequence the RV32IM syscall ABI expects.

use crate::ir::instruction::{Instruction, Opcode, RegArg};
use crate::ir::reg::RegRef;
use crate::isa;

/// Lower every `CallExit0`/`CallReadInt`/`CallPrintInt`/`CallPrintChar` in
/// `instrs` to a materialized syscall-number load, an argument move (where
/// the op has one), `ECALL`, and a result move (where the op produces one).
/// Any label or comment on the pseudo-op moves to the first real
/// instruction of its expansion.
pub fn lower(instrs: Vec<Instruction>) -> Vec<Instruction> {
    let mut out = Vec::with_capacity(instrs.len());
    for instr in instrs {
        if !instr.opcode.is_syscall() {
            out.push(instr);
            continue;
        }
        let label = instr.label;
        let comment = instr.comment.clone();
        let mut expansion = expand(&instr);
        if let Some(first) = expansion.first_mut() {
            first.label = label;
            if first.comment.is_none() {
                first.comment = comment;
            }
        }
        out.extend(expansion);
    }
    out
}

fn expand(instr: &Instruction) -> Vec<Instruction> {
    let a7 = isa::syscall_number_reg();
    let a0 = isa::syscall_arg_reg();
    let number = isa::syscall_number(instr.opcode).expect("is_syscall implies a known number");

    let mut seq = vec![Instruction::new(Opcode::Li).with_dest(RegArg::new(RegRef::Arch(a7))).with_imm(number as i32)];

    if let Some(arg) = &instr.src1 {
        if arg.reg != RegRef::Arch(a0) {
            seq.push(
                Instruction::new(Opcode::Addi)
                    .with_dest(RegArg::new(RegRef::Arch(a0)))
                    .with_src1(RegArg::new(arg.reg))
                    .with_imm(0),
            );
        }
    }

    seq.push(Instruction::new(Opcode::Ecall));

    if let Some(dest) = &instr.dest {
        if dest.reg != RegRef::Arch(a0) {
            seq.push(
                Instruction::new(Opcode::Addi)
                    .with_dest(RegArg::new(dest.reg))
                    .with_src1(RegArg::new(RegRef::Arch(a0)))
                    .with_imm(0),
            );
        }
    }

    seq
}
