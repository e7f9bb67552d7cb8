//! Opcodes and instructions.

use crate::ir::label::LabelId;
use crate::ir::reg::{RegRef, RegSet};
use core::fmt;

/// The opcodes the IR recognizes: the union of R/I-format arithmetic, the
/// hardware and pseudo branches, all ten set-on-compare variants, the
/// load/store family (including the global-load/store pseudos), `NOP`/
/// `ECALL`/`EBREAK`, and the four high-level syscall pseudo-ops.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum Opcode {
    // R-type arithmetic.
    Add,
    Sub,
    And,
    Or,
    Xor,
    Mul,
    Div,
    Rem,
    Sll,
    Srl,
    Sra,

    // I-type arithmetic. Subi/Muli/Divi/Remi are pseudo.
    Addi,
    Subi,
    Andi,
    Ori,
    Xori,
    Muli,
    Divi,
    Remi,
    Slli,
    Srli,
    Srai,

    // Register-register compare. Slt/Sltu are real; the rest are pseudo.
    Seq,
    Sne,
    Slt,
    Sltu,
    Sge,
    Sgeu,
    Sgt,
    Sgtu,
    Sle,
    Sleu,

    // Compare-immediate. Slti/Sltiu are real; the rest are pseudo.
    Seqi,
    Snei,
    Slti,
    Sltiu,
    Sgei,
    Sgeiu,
    Sgti,
    Sgtiu,
    Slei,
    Sleiu,

    // Jump / branch.
    J,
    Beq,
    Bne,
    Blt,
    Bltu,
    Bge,
    Bgeu,
    Bgt,
    Bgtu,
    Ble,
    Bleu,

    // Load / store (including the global pseudo forms).
    Li,
    La,
    Lw,
    Sw,
    LwG,
    SwG,

    // Miscellaneous real instructions.
    Nop,
    Ecall,
    Ebreak,
    /// Load the upper 20 bits of `imm` into `dest`, zeroing the low 12.
    /// Never produced by hand: only immediate legalization emits it.
    Lui,

    // High-level syscall pseudo-ops.
    CallExit0,
    CallReadInt,
    CallPrintInt,
    CallPrintChar,
}

impl Opcode {
    /// Is this opcode a pseudo-op that must be rewritten by the target
    /// transform before it reaches an assembler?
    pub fn is_pseudo(self) -> bool {
        use Opcode::*;
        matches!(
            self,
            Subi | Muli | Divi | Remi
                | Seq | Sne | Sge | Sgeu | Sgt | Sgtu | Sle | Sleu
                | Seqi | Snei | Sgei | Sgeiu | Sgti | Sgtiu | Slei | Sleiu
                | Bgt | Bgtu | Ble | Bleu
                | LwG | SwG
                | CallExit0 | CallReadInt | CallPrintInt | CallPrintChar
        )
    }

    /// Is this one of the six hardware branches or four pseudo-branches?
    pub fn is_branch(self) -> bool {
        use Opcode::*;
        matches!(self, Beq | Bne | Blt | Bltu | Bge | Bgeu | Bgt | Bgtu | Ble | Bleu)
    }

    /// Is this an unconditional jump? (Branches are conditional; `J` is not.)
    pub fn is_unconditional_jump(self) -> bool {
        matches!(self, Opcode::J)
    }

    /// Does this instruction end the program (the lowered or pre-lowered
    /// exit-0 syscall)?
    pub fn is_exit(self) -> bool {
        matches!(self, Opcode::CallExit0)
    }

    /// Is this one of the four high-level syscall pseudo-ops?
    pub fn is_syscall(self) -> bool {
        use Opcode::*;
        matches!(self, CallExit0 | CallReadInt | CallPrintInt | CallPrintChar)
    }

    /// Does this instruction terminate its basic block (CFG §4.2: a
    /// branch/jump, or an exit syscall)?
    pub fn is_terminator(self) -> bool {
        self.is_branch() || self.is_unconditional_jump() || self.is_exit()
    }

    /// Does this opcode carry a 12-bit-signed immediate subject to the
    /// legalization check? (`Li`'s immediate is handled separately: it
    /// always legalizes via `Lui`+`Addi`, never via operand substitution.)
    pub fn has_legible_immediate(self) -> bool {
        use Opcode::*;
        matches!(
            self,
            Addi | Andi | Ori | Xori | Slti | Sltiu | Lw | Sw
        )
    }

    /// Multiply/divide-immediate pseudo-ops have no real encoding at all and
    /// must always be materialized via a temporary, regardless of whether
    /// the constant fits in 12 bits.
    pub fn is_muldiv_immediate(self) -> bool {
        matches!(self, Opcode::Muli | Opcode::Divi | Opcode::Remi)
    }

    /// Is this a shift-immediate opcode (shift amount masked to 5 bits)?
    pub fn is_shift_immediate(self) -> bool {
        matches!(self, Opcode::Slli | Opcode::Srli | Opcode::Srai)
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        use Opcode::*;
        let s = match *self {
            Add => "add", Sub => "sub", And => "and", Or => "or", Xor => "xor",
            Mul => "mul", Div => "div", Rem => "rem", Sll => "sll", Srl => "srl", Sra => "sra",
            Addi => "addi", Subi => "subi", Andi => "andi", Ori => "ori", Xori => "xori",
            Muli => "muli", Divi => "divi", Remi => "remi", Slli => "slli", Srli => "srli", Srai => "srai",
            Seq => "seq", Sne => "sne", Slt => "slt", Sltu => "sltu",
            Sge => "sge", Sgeu => "sgeu", Sgt => "sgt", Sgtu => "sgtu", Sle => "sle", Sleu => "sleu",
            Seqi => "seqi", Snei => "snei", Slti => "slti", Sltiu => "sltiu",
            Sgei => "sgei", Sgeiu => "sgeiu", Sgti => "sgti", Sgtiu => "sgtiu", Slei => "slei", Sleiu => "sleiu",
            J => "j", Beq => "beq", Bne => "bne", Blt => "blt", Bltu => "bltu",
            Bge => "bge", Bgeu => "bgeu", Bgt => "bgt", Bgtu => "bgtu", Ble => "ble", Bleu => "bleu",
            Li => "li", La => "la", Lw => "lw", Sw => "sw", LwG => "lw_g", SwG => "sw_g",
            Nop => "nop", Ecall => "ecall", Ebreak => "ebreak", Lui => "lui",
            CallExit0 => "call_exit_0", CallReadInt => "call_read_int",
            CallPrintInt => "call_print_int", CallPrintChar => "call_print_char",
        };
        write!(f, "{}", s)
    }
}

/// One register operand: the register named, plus an optional whitelist of
/// physical registers it may be allocated to (`None` means unconstrained).
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct RegArg {
    pub reg: RegRef,
    pub whitelist: Option<RegSet>,
}

impl RegArg {
    pub fn new(reg: RegRef) -> Self {
        RegArg { reg, whitelist: None }
    }

    pub fn pinned(reg: RegRef, whitelist: RegSet) -> Self {
        RegArg { reg, whitelist: Some(whitelist) }
    }
}

impl fmt::Display for RegArg {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.reg)
    }
}

/// A single instruction.
#[derive(Clone, Debug)]
pub struct Instruction {
    pub opcode: Opcode,
    pub dest: Option<RegArg>,
    pub src1: Option<RegArg>,
    pub src2: Option<RegArg>,
    pub imm: i32,
    /// The label named by a jump/branch target, `LA`, or a global
    /// load/store's symbol.
    pub address: Option<LabelId>,
    /// The label attached to this instruction (to be emitted immediately
    /// before it).
    pub label: Option<LabelId>,
    pub comment: Option<String>,
}

impl Instruction {
    pub fn new(opcode: Opcode) -> Self {
        Instruction {
            opcode,
            dest: None,
            src1: None,
            src2: None,
            imm: 0,
            address: None,
            label: None,
            comment: None,
        }
    }

    pub fn with_dest(mut self, dest: RegArg) -> Self {
        self.dest = Some(dest);
        self
    }

    pub fn with_src1(mut self, src1: RegArg) -> Self {
        self.src1 = Some(src1);
        self
    }

    pub fn with_src2(mut self, src2: RegArg) -> Self {
        self.src2 = Some(src2);
        self
    }

    pub fn with_imm(mut self, imm: i32) -> Self {
        self.imm = imm;
        self
    }

    pub fn with_address(mut self, address: LabelId) -> Self {
        self.address = Some(address);
        self
    }

    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }

    /// Def/use extraction: the destination argument, if present, is the
    /// sole def.
    pub fn defs(&self) -> Option<RegRef> {
        self.dest.as_ref().map(|a| a.reg)
    }

    /// The source arguments, in order, as uses.
    pub fn uses(&self) -> impl Iterator<Item = RegRef> + '_ {
        self.src1.iter().chain(self.src2.iter()).map(|a| a.reg)
    }

    /// All register-argument slots carrying a `RegRef`, for rewriting after
    /// allocation. Destination first: an instruction that both defines and
    /// uses the same id in different positions must see the destination
    /// rewritten first so a spill materializer's read/write merge logic is
    /// well defined.
    pub fn reg_args_mut(&mut self) -> impl Iterator<Item = &mut RegArg> {
        self.dest.iter_mut().chain(self.src1.iter_mut()).chain(self.src2.iter_mut())
    }
}
