//! Immediate legalization: the last step of the target transform, run once
//! no further instructions will be introduced by an earlier pass. RV32IM's
//! I-format immediates are 12-bit signed; anything that does not fit
//! is materialized through the pseudo-lowering scratch register
//! (`isa::pseudo_scratch`, `t6`) and the instruction is rewritten to its
//! register-register form. `LI` always expands to a `LUI`+`ADDI` pair,
//! regardless of whether the constant would fit in 12 bits on its own, and
//! shift amounts are masked to the 5 bits the hardware actually reads.

use crate::ir::instruction::{Instruction, Opcode, RegArg};
use crate::ir::reg::RegRef;
use crate::isa;

const IMM12_MIN: i32 = -2048;
const IMM12_MAX: i32 = 2047;

fn fits_imm12(imm: i32) -> bool {
    (IMM12_MIN..=IMM12_MAX).contains(&imm)
}

/// Split `imm` into the `(upper20, lower12)` pair a `LUI`+`ADDI` materializes
/// it with: `lower12` is `imm`'s low 12 bits, sign-extended, and `upper20` is
/// whatever is left once `lower12` is subtracted back out, shifted down by
/// 12. This is the standard carry-correct split: because `imm - lower12` is
/// always an exact multiple of 4096, `upper20` always recovers exactly,
/// including when `lower12`'s sign bit would otherwise have borrowed from
/// the upper bits.
fn split_hi_lo(imm: i32) -> (i32, i32) {
    let low12 = imm & 0xfff;
    let lower12 = (low12 << 20) >> 20;
    let upper20 = imm.wrapping_sub(lower12) >> 12;
    (upper20, lower12)
}

/// The two-instruction sequence that materializes `imm` into `dest`.
fn li_sequence(dest: RegRef, imm: i32) -> Vec<Instruction> {
    let (upper20, lower12) = split_hi_lo(imm);
    vec![
        Instruction::new(Opcode::Lui).with_dest(RegArg::new(dest)).with_imm(upper20),
        Instruction::new(Opcode::Addi).with_dest(RegArg::new(dest)).with_src1(RegArg::new(dest)).with_imm(lower12),
    ]
}

/// Legalize every instruction in `instrs`. Must run after `transform::pseudo`
/// and `transform::syscall`: both can introduce new `Li`s or out-of-range
/// immediates, and this pass is the only one that checks immediate width.
pub fn legalize(instrs: Vec<Instruction>) -> Vec<Instruction> {
    let mut out = Vec::with_capacity(instrs.len());
    for instr in instrs {
        let label = instr.label;
        let comment = instr.comment.clone();
        let mut expansion = expand(instr);
        if let Some(first) = expansion.first_mut() {
            first.label = label;
            if first.comment.is_none() {
                first.comment = comment;
            }
        }
        out.extend(expansion.drain(..));
    }
    out
}

fn expand(instr: Instruction) -> Vec<Instruction> {
    use Opcode::*;

    if instr.opcode == Li {
        let dest = instr.dest.as_ref().unwrap().reg;
        return li_sequence(dest, instr.imm);
    }

    if instr.opcode.is_shift_immediate() {
        let mut instr = instr;
        instr.imm &= 0x1f;
        return vec![instr];
    }

    if !instr.opcode.has_legible_immediate() || fits_imm12(instr.imm) {
        return vec![instr];
    }

    let scratch = RegRef::Arch(isa::pseudo_scratch());
    let mut materialize = li_sequence(scratch, instr.imm);

    let dest = instr.dest.as_ref().map(|a| a.reg);
    let src1 = instr.src1.as_ref().map(|a| a.reg);
    let src2 = instr.src2.as_ref().map(|a| a.reg);

    let replacement = match instr.opcode {
        Addi => r(Add, dest.unwrap(), src1.unwrap(), scratch),
        Andi => r(And, dest.unwrap(), src1.unwrap(), scratch),
        Ori => r(Or, dest.unwrap(), src1.unwrap(), scratch),
        Xori => r(Xor, dest.unwrap(), src1.unwrap(), scratch),
        Slti => r(Slt, dest.unwrap(), src1.unwrap(), scratch),
        Sltiu => r(Sltu, dest.unwrap(), src1.unwrap(), scratch),
        Lw => {
            materialize.push(r(Add, scratch, scratch, src1.unwrap()));
            Instruction::new(Lw).with_dest(RegArg::new(dest.unwrap())).with_src1(RegArg::new(scratch)).with_imm(0)
        }
        Sw => {
            materialize.push(r(Add, scratch, scratch, src2.unwrap()));
            Instruction::new(Sw).with_src1(RegArg::new(src1.unwrap())).with_src2(RegArg::new(scratch)).with_imm(0)
        }
        other => unreachable!("{} has has_legible_immediate() but no legalization registered", other),
    };

    materialize.push(replacement);
    materialize
}

fn r(op: Opcode, d: RegRef, a: RegRef, b: RegRef) -> Instruction {
    Instruction::new(op).with_dest(RegArg::new(d)).with_src1(RegArg::new(a)).with_src2(RegArg::new(b))
}
