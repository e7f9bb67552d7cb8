//! Textual assembly emission: the pipeline's final stage, turning a fully
//! lowered instruction stream (no pseudo-ops, no syscalls, no illegal
//! immediates remain) into GNU-assembler-syntax RV32IM source.
//!
//! Two passes over the program, mirroring the reader in `ir::text`: symbols
//! first (`.data`), then code (`.text`). Labels are resolved to their
//! display name through the same `LabelTable` the rest of the pipeline
//! shares, so a label folded by alias unification during CFG construction
//! emits under whichever name `LabelTable::alias` decided should survive.

use crate::diag::CodegenError;
use crate::ir::instruction::{Instruction, Opcode};
use crate::ir::program::Program;
use crate::ir::reg::RegRef;
use crate::ir::symbol::SymbolType;
use std::fmt::Write as _;

/// Anything that can render a lowered `Program` to assembly text. Exists as
/// a trait (rather than a single free function) so an alternate backend —
/// an object-file writer, say — can share the pipeline's driver code.
pub trait AssemblyWriter {
    fn write_program(&mut self, program: &mut Program) -> Result<String, CodegenError>;
}

/// The GNU-`as`-syntax writer used by the CLI driver.
#[derive(Default)]
pub struct TextAssemblyWriter;

impl TextAssemblyWriter {
    pub fn new() -> Self {
        TextAssemblyWriter
    }
}

impl AssemblyWriter for TextAssemblyWriter {
    fn write_program(&mut self, program: &mut Program) -> Result<String, CodegenError> {
        let mut out = String::new();

        if program.symbols.iter().next().is_some() {
            let _ = writeln!(out, ".data");
            let decls: Vec<_> = program.symbols.iter().map(|s| (s.storage, s.ty)).collect();
            for (storage, ty) in decls {
                let name = program.labels.display_name(storage);
                let _ = writeln!(out, "{}:", name);
                match ty {
                    SymbolType::Scalar => {
                        let _ = writeln!(out, "    .word 0");
                    }
                    SymbolType::Array(n) => {
                        let _ = writeln!(out, "    .zero {}", n * 4);
                    }
                }
            }
            out.push('\n');
        }

        let _ = writeln!(out, ".text");
        let _ = writeln!(out, ".globl main");
        let _ = writeln!(out, "main:");

        let instrs: Vec<Instruction> = program.instructions().to_vec();
        for instr in &instrs {
            if let Some(label) = instr.label {
                let name = program.labels.display_name(label);
                let _ = writeln!(out, "{}:", name);
            }
            let line = render(program, instr)?;
            let _ = write!(out, "    {}", line);
            if let Some(comment) = &instr.comment {
                let _ = write!(out, "  # {}", comment);
            }
            out.push('\n');
        }

        Ok(out)
    }
}

fn reg(r: RegRef) -> String {
    match r {
        RegRef::Arch(a) => a.abi_name().to_string(),
        RegRef::Virtual(v) => unreachable!("unallocated virtual register {} reached emission", v),
    }
}

fn render(program: &mut Program, instr: &Instruction) -> Result<String, CodegenError> {
    use Opcode::*;
    let op = instr.opcode;
    let dest = || reg(instr.dest.as_ref().unwrap().reg);
    let src1 = || reg(instr.src1.as_ref().unwrap().reg);
    let src2 = || reg(instr.src2.as_ref().unwrap().reg);

    let line = match op {
        Add | Sub | And | Or | Xor | Mul | Div | Rem | Sll | Srl | Sra | Slt | Sltu => {
            format!("{} {}, {}, {}", op, dest(), src1(), src2())
        }
        Addi | Andi | Ori | Xori | Slli | Srli | Srai | Slti | Sltiu => {
            format!("{} {}, {}, {}", op, dest(), src1(), instr.imm)
        }
        J => format!("j {}", program.labels.display_name(target(instr)?)),
        Beq | Bne | Blt | Bltu | Bge | Bgeu => {
            format!("{} {}, {}, {}", op, src1(), src2(), program.labels.display_name(target(instr)?))
        }
        La => format!("la {}, {}", dest(), program.labels.display_name(target(instr)?)),
        Lw => format!("lw {}, {}({})", dest(), instr.imm, src1()),
        Sw => format!("sw {}, {}({})", src1(), instr.imm, src2()),
        Lui => format!("lui {}, {}", dest(), instr.imm),
        Nop => "nop".to_string(),
        Ecall => "ecall".to_string(),
        Ebreak => "ebreak".to_string(),
        other => {
            return Err(CodegenError::Internal(format!(
                "{} reached assembly emission unlowered",
                other
            )))
        }
    };
    Ok(line)
}

fn target(instr: &Instruction) -> Result<crate::ir::label::LabelId, CodegenError> {
    instr
        .address
        .ok_or_else(|| CodegenError::Internal(format!("{} has no branch target", instr.opcode)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::instruction::RegArg;
    use crate::ir::reg::ArchReg;
    use crate::ir::symbol::SymbolType;

    fn a(name: &str) -> RegRef {
        RegRef::Arch(ArchReg::from_abi_name(name).unwrap())
    }

    #[test]
    fn emits_data_then_text_sections() {
        let mut program = Program::new();
        program.declare_symbol("counter", SymbolType::Scalar).unwrap();
        program.append_instruction(
            Instruction::new(Opcode::Addi)
                .with_dest(RegArg::new(a("s0")))
                .with_src1(RegArg::new(a("zero")))
                .with_imm(5),
            None,
        );
        program.append_instruction(Instruction::new(Opcode::Ecall), None);

        let mut writer = TextAssemblyWriter::new();
        let text = writer.write_program(&mut program).unwrap();
        assert!(text.contains(".data"));
        assert!(text.contains("counter:"));
        assert!(text.contains(".word 0"));
        assert!(text.contains(".text"));
        assert!(text.contains("addi s0, zero, 5"));
        assert!(text.contains("ecall"));
    }

    #[test]
    fn array_symbol_reserves_word_count_times_four_bytes() {
        let mut program = Program::new();
        program.declare_symbol("buf", SymbolType::Array(10)).unwrap();
        let mut writer = TextAssemblyWriter::new();
        let text = writer.write_program(&mut program).unwrap();
        assert!(text.contains(".zero 40"));
    }

    #[test]
    fn unlowered_pseudo_op_is_an_internal_error() {
        let mut program = Program::new();
        program.append_instruction(
            Instruction::new(Opcode::Seq)
                .with_dest(RegArg::new(a("s0")))
                .with_src1(RegArg::new(a("a0")))
                .with_src2(RegArg::new(a("a1"))),
            None,
        );
        let mut writer = TextAssemblyWriter::new();
        assert!(matches!(writer.write_program(&mut program), Err(CodegenError::Internal(_))));
    }

    #[test]
    fn label_carried_by_instruction_is_emitted_before_it() {
        let mut program = Program::new();
        let l = program.create_label();
        program.labels.set_name(l, "loop");
        program.assign_label_to_next(l);
        program.append_instruction(Instruction::new(Opcode::Nop), None);
        let mut writer = TextAssemblyWriter::new();
        let text = writer.write_program(&mut program).unwrap();
        let loop_pos = text.find("loop:").unwrap();
        let nop_pos = text.find("nop").unwrap();
        assert!(loop_pos < nop_pos);
    }
}
