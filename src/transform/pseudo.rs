//! Lower every pseudo-op except the four high-level syscalls (handled
//! separately by `transform::syscall`, in the ordering decided in
//! `DESIGN.md`: pseudo-ops first, syscalls second, immediates legalized
//! last once no further instructions will be introduced).
//!
//! Runs after register allocation: every register operand is already a
//! concrete `ArchReg`. A single pseudo instruction may expand to more than
//! one real one; when it does, any label or comment it carried moves to the
//! first instruction of the expansion so branch targets keep pointing at
//! the right code.

use crate::ir::instruction::{Instruction, Opcode, RegArg};
use crate::ir::reg::RegRef;
use crate::isa;

/// Lower every pseudo-op (excluding syscalls) in `instrs` to real RV32IM
/// instructions.
pub fn lower(instrs: Vec<Instruction>) -> Vec<Instruction> {
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

fn reg(arg: &RegArg) -> RegRef {
    arg.reg
}

fn expand(instr: Instruction) -> Vec<Instruction> {
    use Opcode::*;
    if !instr.opcode.is_pseudo() || instr.opcode.is_syscall() {
        return vec![instr];
    }

    let dest = instr.dest.as_ref().map(reg);
    let src1 = instr.src1.as_ref().map(reg);
    let src2 = instr.src2.as_ref().map(reg);
    let address = instr.address;
    let scratch = isa::pseudo_scratch();

    let r = |op: Opcode, d: RegRef, a: RegRef, b: RegRef| {
        Instruction::new(op).with_dest(RegArg::new(d)).with_src1(RegArg::new(a)).with_src2(RegArg::new(b))
    };
    let i = |op: Opcode, d: RegRef, a: RegRef, imm: i32| {
        Instruction::new(op).with_dest(RegArg::new(d)).with_src1(RegArg::new(a)).with_imm(imm)
    };

    match instr.opcode {
        Subi => vec![i(Addi, dest.unwrap(), src1.unwrap(), -instr.imm)],

        Muli | Divi | Remi => {
            let real = match instr.opcode {
                Muli => Mul,
                Divi => Div,
                Remi => Rem,
                _ => unreachable!(),
            };
            vec![
                Instruction::new(Li).with_dest(RegArg::new(RegRef::Arch(scratch))).with_imm(instr.imm),
                r(real, dest.unwrap(), src1.unwrap(), RegRef::Arch(scratch)),
            ]
        }

        // Register-register compares.
        Seq => vec![
            r(Xor, dest.unwrap(), src1.unwrap(), src2.unwrap()),
            i(Sltiu, dest.unwrap(), dest.unwrap(), 1),
        ],
        Sne => vec![
            r(Xor, dest.unwrap(), src1.unwrap(), src2.unwrap()),
            r(Sltu, dest.unwrap(), RegRef::Arch(crate::ir::reg::ArchReg::ZERO), dest.unwrap()),
        ],
        Sge => vec![r(Slt, dest.unwrap(), src1.unwrap(), src2.unwrap()), i(Xori, dest.unwrap(), dest.unwrap(), 1)],
        Sgeu => vec![r(Sltu, dest.unwrap(), src1.unwrap(), src2.unwrap()), i(Xori, dest.unwrap(), dest.unwrap(), 1)],
        Sgt => vec![r(Slt, dest.unwrap(), src2.unwrap(), src1.unwrap())],
        Sgtu => vec![r(Sltu, dest.unwrap(), src2.unwrap(), src1.unwrap())],
        Sle => vec![
            r(Slt, dest.unwrap(), src2.unwrap(), src1.unwrap()),
            i(Xori, dest.unwrap(), dest.unwrap(), 1),
        ],
        Sleu => vec![
            r(Sltu, dest.unwrap(), src2.unwrap(), src1.unwrap()),
            i(Xori, dest.unwrap(), dest.unwrap(), 1),
        ],

        // Immediate compares.
        Seqi => vec![
            i(Xori, dest.unwrap(), src1.unwrap(), instr.imm),
            i(Sltiu, dest.unwrap(), dest.unwrap(), 1),
        ],
        Snei => vec![
            i(Xori, dest.unwrap(), src1.unwrap(), instr.imm),
            r(Sltu, dest.unwrap(), RegRef::Arch(crate::ir::reg::ArchReg::ZERO), dest.unwrap()),
        ],
        Sgei => vec![i(Slti, dest.unwrap(), src1.unwrap(), instr.imm), i(Xori, dest.unwrap(), dest.unwrap(), 1)],
        Sgeiu => vec![i(Sltiu, dest.unwrap(), src1.unwrap(), instr.imm), i(Xori, dest.unwrap(), dest.unwrap(), 1)],
        // `> imm` and `<= imm` both reduce to an SLTI/SLTIU against `imm+1`,
        // but that addition overflows exactly at the top of the operand's
        // range (`i32::MAX` signed, `u32::MAX`/`-1` unsigned). At that point
        // the comparison's answer is a compile-time constant — `src1` can
        // never exceed the maximum representable value, and is always at
        // most it — so these saturate to a plain `li` instead of wrapping
        // the immediate into a bogus comparison.
        Sgti if instr.imm == i32::MAX => vec![Instruction::new(Li).with_dest(RegArg::new(dest.unwrap())).with_imm(0)],
        Sgti => vec![
            i(Slti, dest.unwrap(), src1.unwrap(), instr.imm.wrapping_add(1)),
            i(Xori, dest.unwrap(), dest.unwrap(), 1),
        ],
        Sgtiu if instr.imm == -1 => {
            vec![Instruction::new(Li).with_dest(RegArg::new(dest.unwrap())).with_imm(0)]
        }
        Sgtiu => vec![
            i(Sltiu, dest.unwrap(), src1.unwrap(), instr.imm.wrapping_add(1)),
            i(Xori, dest.unwrap(), dest.unwrap(), 1),
        ],
        Slei if instr.imm == i32::MAX => vec![Instruction::new(Li).with_dest(RegArg::new(dest.unwrap())).with_imm(1)],
        Slei => vec![i(Slti, dest.unwrap(), src1.unwrap(), instr.imm.wrapping_add(1))],
        Sleiu if instr.imm == -1 => {
            vec![Instruction::new(Li).with_dest(RegArg::new(dest.unwrap())).with_imm(1)]
        }
        Sleiu => vec![i(Sltiu, dest.unwrap(), src1.unwrap(), instr.imm.wrapping_add(1))],

        // Pseudo branches: swap operands of the corresponding real branch.
        Bgt => vec![branch(Blt, src2.unwrap(), src1.unwrap(), address.unwrap())],
        Bgtu => vec![branch(Bltu, src2.unwrap(), src1.unwrap(), address.unwrap())],
        Ble => vec![branch(Bge, src2.unwrap(), src1.unwrap(), address.unwrap())],
        Bleu => vec![branch(Bgeu, src2.unwrap(), src1.unwrap(), address.unwrap())],

        // Global load/store: address the symbol through the destination
        // register itself (load) or the reserved scratch (store, since the
        // value register must not be clobbered).
        LwG => vec![
            Instruction::new(La).with_dest(RegArg::new(dest.unwrap())).with_address(address.unwrap()),
            i(Lw, dest.unwrap(), dest.unwrap(), 0),
        ],
        SwG => vec![
            Instruction::new(La).with_dest(RegArg::new(RegRef::Arch(scratch))).with_address(address.unwrap()),
            Instruction::new(Sw)
                .with_src1(RegArg::new(src1.unwrap()))
                .with_src2(RegArg::new(RegRef::Arch(scratch)))
                .with_imm(0),
        ],

        other => unreachable!("{} is pseudo but has no expansion registered", other),
    }
}

fn branch(op: Opcode, a: RegRef, b: RegRef, target: crate::ir::label::LabelId) -> Instruction {
    Instruction::new(op).with_src1(RegArg::new(a)).with_src2(RegArg::new(b)).with_address(target)
}
