//! The compilation pipeline: the single entry point that drives a `Program`
//! through CFG construction, register allocation, target lowering, and
//! assembly emission, in that order, with a `PassTimes` recorder around
//! every stage and (when `Flags::enable_verifier` asks for it) a consistency
//! check after the two stages that most need one.
//!
//! Named `Context`, the way `cranelift-codegen`'s own compilation driver is,
//! for the same reason: a caller (the CLI here) builds one per program and
//! calls a single method that walks it through every pass.

use crate::cfg::Cfg;
use crate::config::Flags;
use crate::diag::CodegenError;
use crate::emit::{AssemblyWriter, TextAssemblyWriter};
use crate::ir::program::Program;
use crate::ir::reg::RegRef;
use crate::regalloc;
use crate::timing::PassTimes;
use crate::transform;

/// Drives one program through the full pipeline.
pub struct Context {
    pub flags: Flags,
    pub timings: PassTimes,
}

impl Context {
    pub fn new(flags: Flags) -> Self {
        Context { flags, timings: PassTimes::new() }
    }

    /// Compile `program` end to end, returning the emitted assembly text.
    pub fn compile(&mut self, program: &mut Program) -> Result<String, CodegenError> {
        program.generate_epilog();

        let cfg = self.timings.record("cfg", || Cfg::build(program))?;

        let spill_pool = self.flags.spill_pool();
        let allocated = self.timings.record("regalloc", || regalloc::run(program, &cfg, &spill_pool))?;
        program.set_instructions(allocated);

        if self.flags.enable_verifier() {
            verify_allocated(program)?;
        }

        let lowered = self.timings.record("lower", || transform::run(program.instructions().to_vec()));
        program.set_instructions(lowered);

        if self.flags.enable_verifier() {
            verify_lowered(program)?;
        }

        self.timings.record("emit", || TextAssemblyWriter::new().write_program(program))
    }
}

/// Every register operand must have been resolved to a concrete
/// architectural register by the time allocation is done; a `Virtual` one
/// surviving here means linear-scan or spill materialization missed an
/// operand, not anything the input program could have caused.
fn verify_allocated(program: &Program) -> Result<(), CodegenError> {
    for instr in program.instructions() {
        for arg in instr.dest.iter().chain(instr.src1.iter()).chain(instr.src2.iter()) {
            if matches!(arg.reg, RegRef::Virtual(_)) {
                return Err(CodegenError::Internal(format!(
                    "{} still references an unallocated temporary after register allocation",
                    instr.opcode
                )));
            }
        }
    }
    Ok(())
}

/// No pseudo-op should survive target lowering, and every immediate the
/// emitter will encode as a 12-bit field must actually fit in one.
fn verify_lowered(program: &Program) -> Result<(), CodegenError> {
    for instr in program.instructions() {
        if instr.opcode.is_pseudo() {
            return Err(CodegenError::Internal(format!(
                "{} survived target lowering unexpanded",
                instr.opcode
            )));
        }
        if instr.opcode.has_legible_immediate() && !(-2048..=2047).contains(&instr.imm) {
            return Err(CodegenError::Internal(format!(
                "{} carries an illegal 12-bit immediate {} after legalization",
                instr.opcode, instr.imm
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::text::read_program;

    #[test]
    fn minimal_program_compiles_to_assembly() {
        let mut program = read_program(".text\n  call_exit_0\n").unwrap();
        let mut ctx = Context::new(Flags::default());
        let asm = ctx.compile(&mut program).unwrap();
        assert!(asm.contains("ecall"));
    }

    #[test]
    fn program_with_scalar_and_arithmetic_compiles() {
        let src = "\
.data
  x scalar

.text
  li %0, 5
  sw_g %0, x
  call_exit_0
";
        let mut program = read_program(src).unwrap();
        let mut ctx = Context::new(Flags::default());
        let asm = ctx.compile(&mut program).unwrap();
        assert!(asm.contains(".data"));
        assert!(asm.contains("x:"));
        assert!(asm.contains("lui"));
    }

    #[test]
    fn unresolvable_branch_target_is_reported() {
        let mut program = read_program(".text\n  j nowhere\n  call_exit_0\n").unwrap();
        let mut ctx = Context::new(Flags::default());
        assert!(ctx.compile(&mut program).is_err());
    }
}
