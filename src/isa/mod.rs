//! The RV32IM target: register pools and the syscall ABI the pseudo-syscall
//! opcodes lower to.

use crate::ir::instruction::Opcode;
use crate::ir::reg::{ArchReg, RegSet};

/// Registers usable by the allocator for virtual-register assignment:
/// `s0..s8`, `t0..t5`, `a0..a7`, in the order the allocator tries them.
/// `s9..s11` are held back as the spill materializer's scratch pool; `t6` is
/// reserved for pseudo-op lowering; `zero`, `ra`, `sp`, `gp`, `tp` are never
/// allocated at all.
pub fn general_pool() -> RegSet {
    named(&[
        "s0", "s1", "s2", "s3", "s4", "s5", "s6", "s7", "s8", "t0", "t1", "t2", "t3", "t4", "t5",
        "a0", "a1", "a2", "a3", "a4", "a5", "a6", "a7",
    ])
}

/// Registers the RV32IM calling convention treats as caller-saved: a value
/// live across a call must not be allocated to one of these, because the
/// materialized `ECALL` sequence (`transform::syscall`) clobbers them.
pub fn caller_save() -> RegSet {
    named(&["t0", "t1", "t2", "t3", "t4", "t5", "a0", "a1", "a2", "a3", "a4", "a5", "a6", "a7"])
}

/// The callee-saved subset of the general pool (`s0..s8`): the registers a
/// value live across a call should be reordered to prefer.
pub fn callee_save() -> RegSet {
    named(&["s0", "s1", "s2", "s3", "s4", "s5", "s6", "s7", "s8"])
}

/// Default spill-scratch pool: three callee-saved registers held back from
/// general allocation and used by `regalloc::spill` to materialize loads and
/// stores around a spilled temporary's uses. Configurable (`config::Flags`),
/// but this is the default size and register choice.
pub fn default_spill_pool() -> RegSet {
    named(&["s9", "s10", "s11"])
}

/// Scratch register reserved for pseudo-op lowering (e.g. materializing a
/// `LUI`+`ADDI` pair or the inverted-branch trick `SGT`/`SGE` expand to).
pub fn pseudo_scratch() -> ArchReg {
    ArchReg::from_abi_name("t6").unwrap()
}

/// The register the syscall number is loaded into before `ECALL`.
pub fn syscall_number_reg() -> ArchReg {
    ArchReg::from_abi_name("a7").unwrap()
}

/// The register carrying the syscall's sole argument, and its result.
pub fn syscall_arg_reg() -> ArchReg {
    ArchReg::from_abi_name("a0").unwrap()
}

/// The syscall number a high-level syscall pseudo-op lowers to.
pub fn syscall_number(opcode: Opcode) -> Option<u32> {
    match opcode {
        Opcode::CallExit0 => Some(10),
        Opcode::CallReadInt => Some(5),
        Opcode::CallPrintInt => Some(1),
        Opcode::CallPrintChar => Some(11),
        _ => None,
    }
}

fn named(names: &[&str]) -> RegSet {
    names.iter().map(|n| ArchReg::from_abi_name(n).unwrap()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn general_pool_has_23_registers() {
        assert_eq!(general_pool().len(), 23);
    }

    #[test]
    fn callee_save_is_general_pool_minus_caller_save() {
        let callee = callee_save();
        let general = general_pool();
        let caller = caller_save();
        for r in callee.iter() {
            assert!(general.contains(r));
            assert!(!caller.contains(r));
        }
        assert_eq!(callee.len() + caller.len(), general.len());
    }

    #[test]
    fn spill_pool_disjoint_from_general_pool() {
        let spill = default_spill_pool();
        let general = general_pool();
        for r in spill.iter() {
            assert!(!general.contains(r));
        }
    }

    #[test]
    fn syscall_numbers_match_abi() {
        assert_eq!(syscall_number(Opcode::CallExit0), Some(10));
        assert_eq!(syscall_number(Opcode::CallReadInt), Some(5));
        assert_eq!(syscall_number(Opcode::CallPrintInt), Some(1));
        assert_eq!(syscall_number(Opcode::CallPrintChar), Some(11));
        assert_eq!(syscall_number(Opcode::Add), None);
    }
}
