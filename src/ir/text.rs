//! Minimal textual IR (`.rir`) reader and writer.
//!
//! Stands in for the real front end this crate has no parser/semantic-
//! analysis phase for: a `.rir` file can be handed straight to the
//! command-line driver, or built inline in tests, to drive the pipeline
//! without having to construct a `Program` by hand through the builder API.
//! The grammar is deliberately small — one instruction per line, a `.data`
//! block of symbol declarations, a `.text` block of labeled instructions —
//! modeled on the line-oriented, human-editable function text
//! `cranelift-codegen`'s own textual IR favors over a binary encoding.

use crate::ir::instruction::{Instruction, Opcode};
use crate::ir::reg::{ArchReg, RegRef};
use crate::ir::symbol::SymbolType;
use crate::ir::program::Program;
use std::fmt;

/// A textual-IR parse error: line number plus a human-readable reason.
#[derive(Debug, Clone)]
pub struct TextError {
    pub line: usize,
    pub message: String,
}

impl fmt::Display for TextError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "line {}: {}", self.line, self.message)
    }
}

impl std::error::Error for TextError {}

fn err(line: usize, message: impl Into<String>) -> TextError {
    TextError { line, message: message.into() }
}

/// Parse a `.rir` source string into a `Program`.
pub fn read_program(src: &str) -> Result<Program, TextError> {
    let mut program = Program::new();
    let mut section = Section::None;

    for (idx, raw_line) in src.lines().enumerate() {
        let lineno = idx + 1;
        let line = strip_comment(raw_line).trim();
        if line.is_empty() {
            continue;
        }
        if line == ".data" {
            section = Section::Data;
            continue;
        }
        if line == ".text" {
            section = Section::Text;
            continue;
        }
        match section {
            Section::None => return Err(err(lineno, "expected .data or .text section header")),
            Section::Data => parse_data_line(&mut program, line, lineno)?,
            Section::Text => parse_text_line(&mut program, line, lineno)?,
        }
    }

    Ok(program)
}

enum Section {
    None,
    Data,
    Text,
}

fn strip_comment(line: &str) -> &str {
    match line.find('#') {
        Some(i) => &line[..i],
        None => line,
    }
}

fn parse_data_line(program: &mut Program, line: &str, lineno: usize) -> Result<(), TextError> {
    let mut parts = line.split_whitespace();
    let name = parts.next().ok_or_else(|| err(lineno, "missing symbol name"))?;
    let kind = parts.next().ok_or_else(|| err(lineno, "missing symbol kind"))?;
    let ty = match kind {
        "scalar" => SymbolType::Scalar,
        "array" => {
            let n: u32 = parts
                .next()
                .ok_or_else(|| err(lineno, "array declaration missing length"))?
                .parse()
                .map_err(|_| err(lineno, "array length must be a non-negative integer"))?;
            if n == 0 {
                return Err(err(lineno, "array length must be greater than zero"));
            }
            SymbolType::Array(n)
        }
        other => return Err(err(lineno, format!("unknown symbol kind `{}`", other))),
    };
    program
        .declare_symbol(name, ty)
        .map_err(|_| err(lineno, format!("duplicate symbol name `{}`", name)))?;
    Ok(())
}

fn parse_text_line(program: &mut Program, line: &str, lineno: usize) -> Result<(), TextError> {
    if let Some(label_name) = line.strip_suffix(':') {
        let label_name = label_name.trim();
        let label = resolve_or_create_label(program, label_name);
        program.assign_label_to_next(label);
        return Ok(());
    }

    let mut tokens = line.splitn(2, char::is_whitespace);
    let mnemonic = tokens.next().unwrap();
    let rest = tokens.next().unwrap_or("").trim();
    let args: Vec<&str> = if rest.is_empty() {
        Vec::new()
    } else {
        rest.split(',').map(|a| a.trim()).collect()
    };

    let opcode = opcode_from_mnemonic(mnemonic).ok_or_else(|| err(lineno, format!("unknown opcode `{}`", mnemonic)))?;
    let instr = build_instruction(program, opcode, &args, lineno)?;
    program.append_instruction(instr, None);
    Ok(())
}

fn resolve_or_create_label(program: &mut Program, name: &str) -> crate::ir::label::LabelId {
    // Forward references are allowed: a label named in a branch target before
    // its `name:` line is declared reuses the same identifier once seen
    // again, rather than minting a second label with a disambiguated name.
    if let Some(existing) = program.labels.lookup_name(name) {
        return existing;
    }
    let label = program.create_label();
    program.labels.set_name(label, name);
    label
}

fn opcode_from_mnemonic(m: &str) -> Option<Opcode> {
    use Opcode::*;
    Some(match m {
        "add" => Add, "sub" => Sub, "and" => And, "or" => Or, "xor" => Xor,
        "mul" => Mul, "div" => Div, "rem" => Rem, "sll" => Sll, "srl" => Srl, "sra" => Sra,
        "addi" => Addi, "subi" => Subi, "andi" => Andi, "ori" => Ori, "xori" => Xori,
        "muli" => Muli, "divi" => Divi, "remi" => Remi, "slli" => Slli, "srli" => Srli, "srai" => Srai,
        "seq" => Seq, "sne" => Sne, "slt" => Slt, "sltu" => Sltu,
        "sge" => Sge, "sgeu" => Sgeu, "sgt" => Sgt, "sgtu" => Sgtu, "sle" => Sle, "sleu" => Sleu,
        "seqi" => Seqi, "snei" => Snei, "slti" => Slti, "sltiu" => Sltiu,
        "sgei" => Sgei, "sgeiu" => Sgeiu, "sgti" => Sgti, "sgtiu" => Sgtiu, "slei" => Slei, "sleiu" => Sleiu,
        "j" => J, "beq" => Beq, "bne" => Bne, "blt" => Blt, "bltu" => Bltu,
        "bge" => Bge, "bgeu" => Bgeu, "bgt" => Bgt, "bgtu" => Bgtu, "ble" => Ble, "bleu" => Bleu,
        "li" => Li, "la" => La, "lw" => Lw, "sw" => Sw, "lw_g" => LwG, "sw_g" => SwG,
        "nop" => Nop, "ecall" => Ecall, "ebreak" => Ebreak, "lui" => Lui,
        "call_exit_0" => CallExit0, "call_read_int" => CallReadInt,
        "call_print_int" => CallPrintInt, "call_print_char" => CallPrintChar,
        _ => return None,
    })
}

fn parse_reg(program: &mut Program, token: &str, lineno: usize) -> Result<RegRef, TextError> {
    if let Some(digits) = token.strip_prefix('%') {
        let n: u32 = digits.parse().map_err(|_| err(lineno, format!("bad temporary `{}`", token)))?;
        let _ = program; // temporaries named in text are referenced, not freshly allocated
        let vreg: crate::ir::reg::VReg = cranelift_entity::EntityRef::new(n as usize);
        return Ok(RegRef::Virtual(vreg));
    }
    ArchReg::from_abi_name(token)
        .map(RegRef::Arch)
        .ok_or_else(|| err(lineno, format!("unknown register `{}`", token)))
}

fn parse_imm(token: &str, lineno: usize) -> Result<i32, TextError> {
    token.parse::<i32>().map_err(|_| err(lineno, format!("bad immediate `{}`", token)))
}

/// Parse `"imm(reg)"` addressing syntax used by `lw`/`sw`.
fn parse_offset_base(token: &str, lineno: usize) -> Result<(i32, &str), TextError> {
    let open = token.find('(').ok_or_else(|| err(lineno, format!("expected `imm(reg)`, got `{}`", token)))?;
    let close = token.strip_suffix(')').ok_or_else(|| err(lineno, "missing closing `)`"))?;
    let imm = parse_imm(&token[..open], lineno)?;
    let reg = &close[open + 1..];
    Ok((imm, reg))
}

fn build_instruction(
    program: &mut Program,
    opcode: Opcode,
    args: &[&str],
    lineno: usize,
) -> Result<Instruction, TextError> {
    use crate::ir::instruction::RegArg;
    use Opcode::*;

    let need = |n: usize| -> Result<(), TextError> {
        if args.len() != n {
            Err(err(lineno, format!("{} expects {} operand(s), got {}", opcode, n, args.len())))
        } else {
            Ok(())
        }
    };

    let mut instr = Instruction::new(opcode);
    match opcode {
        Add | Sub | And | Or | Xor | Mul | Div | Rem | Sll | Srl | Sra
        | Seq | Sne | Slt | Sltu | Sge | Sgeu | Sgt | Sgtu | Sle | Sleu => {
            need(3)?;
            instr = instr
                .with_dest(RegArg::new(parse_reg(program, args[0], lineno)?))
                .with_src1(RegArg::new(parse_reg(program, args[1], lineno)?))
                .with_src2(RegArg::new(parse_reg(program, args[2], lineno)?));
        }
        Addi | Subi | Andi | Ori | Xori | Muli | Divi | Remi | Slli | Srli | Srai
        | Seqi | Snei | Slti | Sltiu | Sgei | Sgeiu | Sgti | Sgtiu | Slei | Sleiu => {
            need(3)?;
            instr = instr
                .with_dest(RegArg::new(parse_reg(program, args[0], lineno)?))
                .with_src1(RegArg::new(parse_reg(program, args[1], lineno)?))
                .with_imm(parse_imm(args[2], lineno)?);
        }
        J => {
            need(1)?;
            let label = resolve_or_create_label(program, args[0]);
            instr = instr.with_address(label);
        }
        Beq | Bne | Blt | Bltu | Bge | Bgeu | Bgt | Bgtu | Ble | Bleu => {
            need(3)?;
            let label = resolve_or_create_label(program, args[2]);
            instr = instr
                .with_src1(RegArg::new(parse_reg(program, args[0], lineno)?))
                .with_src2(RegArg::new(parse_reg(program, args[1], lineno)?))
                .with_address(label);
        }
        Li => {
            need(2)?;
            instr = instr
                .with_dest(RegArg::new(parse_reg(program, args[0], lineno)?))
                .with_imm(parse_imm(args[1], lineno)?);
        }
        La | LwG => {
            need(2)?;
            let label = resolve_or_create_label(program, args[1]);
            instr = instr.with_dest(RegArg::new(parse_reg(program, args[0], lineno)?)).with_address(label);
        }
        SwG => {
            need(2)?;
            let label = resolve_or_create_label(program, args[1]);
            instr = instr.with_src1(RegArg::new(parse_reg(program, args[0], lineno)?)).with_address(label);
        }
        Lw => {
            need(2)?;
            let dest = parse_reg(program, args[0], lineno)?;
            let (imm, base_tok) = parse_offset_base(args[1], lineno)?;
            let base = parse_reg(program, base_tok, lineno)?;
            instr = instr.with_dest(RegArg::new(dest)).with_src1(RegArg::new(base)).with_imm(imm);
        }
        Sw => {
            need(2)?;
            let value = parse_reg(program, args[0], lineno)?;
            let (imm, base_tok) = parse_offset_base(args[1], lineno)?;
            let base = parse_reg(program, base_tok, lineno)?;
            instr = instr.with_src1(RegArg::new(value)).with_src2(RegArg::new(base)).with_imm(imm);
        }
        Nop | Ecall | Ebreak | CallExit0 => {
            need(0)?;
        }
        Lui => {
            need(2)?;
            instr = instr
                .with_dest(RegArg::new(parse_reg(program, args[0], lineno)?))
                .with_imm(parse_imm(args[1], lineno)?);
        }
        CallReadInt => {
            need(1)?;
            instr = instr.with_dest(RegArg::new(parse_reg(program, args[0], lineno)?));
        }
        CallPrintInt | CallPrintChar => {
            need(1)?;
            instr = instr.with_src1(RegArg::new(parse_reg(program, args[0], lineno)?));
        }
    }
    Ok(instr)
}

/// Render a `Program` back to `.rir` text. Used by `--dump-ir`-style
/// diagnostics and by tests checking the label-migration round trip; not
/// meant to be the compiler's real output (that's the assembly emitter).
pub fn write_program(program: &mut Program) -> String {
    let mut out = String::new();

    if program.symbols.iter().next().is_some() {
        out.push_str(".data\n");
        let decls: Vec<(String, SymbolType)> =
            program.symbols.iter().map(|s| (s.name.clone(), s.ty)).collect();
        for (name, ty) in decls {
            match ty {
                SymbolType::Scalar => out.push_str(&format!("  {} scalar\n", name)),
                SymbolType::Array(n) => out.push_str(&format!("  {} array {}\n", name, n)),
            }
        }
        out.push('\n');
    }

    out.push_str(".text\n");
    let instrs: Vec<_> = program.instructions().to_vec();
    for instr in &instrs {
        if let Some(label) = instr.label {
            out.push_str(&format!("{}:\n", program.labels.display_name(label)));
        }
        out.push_str("  ");
        out.push_str(&render_instruction(program, instr));
        out.push('\n');
    }
    out
}

fn render_reg(r: RegRef) -> String {
    match r {
        RegRef::Arch(a) => a.abi_name().to_string(),
        RegRef::Virtual(v) => format!("%{}", cranelift_entity::EntityRef::index(v)),
    }
}

fn render_instruction(program: &mut Program, instr: &Instruction) -> String {
    use Opcode::*;
    let op = instr.opcode;
    let reg = |a: &Option<crate::ir::instruction::RegArg>| render_reg(a.as_ref().unwrap().reg);
    match op {
        Add | Sub | And | Or | Xor | Mul | Div | Rem | Sll | Srl | Sra
        | Seq | Sne | Slt | Sltu | Sge | Sgeu | Sgt | Sgtu | Sle | Sleu => {
            format!("{} {}, {}, {}", op, reg(&instr.dest), reg(&instr.src1), reg(&instr.src2))
        }
        Addi | Subi | Andi | Ori | Xori | Muli | Divi | Remi | Slli | Srli | Srai
        | Seqi | Snei | Slti | Sltiu | Sgei | Sgeiu | Sgti | Sgtiu | Slei | Sleiu => {
            format!("{} {}, {}, {}", op, reg(&instr.dest), reg(&instr.src1), instr.imm)
        }
        J => format!("j {}", program.labels.display_name(instr.address.unwrap())),
        Beq | Bne | Blt | Bltu | Bge | Bgeu | Bgt | Bgtu | Ble | Bleu => format!(
            "{} {}, {}, {}",
            op,
            reg(&instr.src1),
            reg(&instr.src2),
            program.labels.display_name(instr.address.unwrap())
        ),
        Li => format!("li {}, {}", reg(&instr.dest), instr.imm),
        La | LwG => format!("{} {}, {}", op, reg(&instr.dest), program.labels.display_name(instr.address.unwrap())),
        SwG => format!("sw_g {}, {}", reg(&instr.src1), program.labels.display_name(instr.address.unwrap())),
        Lw => format!("lw {}, {}({})", reg(&instr.dest), instr.imm, reg(&instr.src1)),
        Sw => format!("sw {}, {}({})", reg(&instr.src1), instr.imm, reg(&instr.src2)),
        Nop | Ecall | Ebreak | CallExit0 => format!("{}", op),
        Lui => format!("lui {}, {}", reg(&instr.dest), instr.imm),
        CallReadInt => format!("call_read_int {}", reg(&instr.dest)),
        CallPrintInt => format!("call_print_int {}", reg(&instr.src1)),
        CallPrintChar => format!("call_print_char {}", reg(&instr.src1)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_program() {
        let src = ".text\ncall_exit_0\n";
        let program = read_program(src).unwrap();
        assert_eq!(program.len(), 1);
        assert_eq!(program.instructions()[0].opcode, Opcode::CallExit0);
    }

    #[test]
    fn parses_data_and_arithmetic() {
        let src = "\
.data
  x scalar

.text
  li %0, 5
  sw_g %0, x
  call_exit_0
";
        let program = read_program(src).unwrap();
        assert_eq!(program.len(), 3);
        assert!(program.symbols.lookup("x").is_some());
    }

    #[test]
    fn branch_resolves_forward_label() {
        let src = "\
.text
  j target
target:
  call_exit_0
";
        let program = read_program(src).unwrap();
        let j = &program.instructions()[0];
        assert_eq!(j.opcode, Opcode::J);
        let target_label = program.instructions()[1].label.unwrap();
        assert!(program.symbols.iter().next().is_none());
        let _ = target_label;
    }

    #[test]
    fn rejects_unknown_opcode() {
        let src = ".text\n  frobnicate a0\n";
        assert!(read_program(src).is_err());
    }

    #[test]
    fn write_then_read_preserves_instruction_count() {
        let src = ".text\n  li %0, 5\n  call_print_int %0\n  call_exit_0\n";
        let mut program = read_program(src).unwrap();
        let rendered = write_program(&mut program);
        let reparsed = read_program(&rendered).unwrap();
        assert_eq!(reparsed.len(), program.len());
    }
}
