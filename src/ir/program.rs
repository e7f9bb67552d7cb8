//! The `Program`: the IR's top-level container.

use crate::ir::instruction::{Instruction, Opcode};
use crate::ir::label::{LabelId, LabelTable};
use crate::ir::reg::VReg;
use crate::ir::symbol::{Symbol, SymbolTable, SymbolType};
use cranelift_entity::EntityRef;

/// Ordered sequence of instructions, plus the label/symbol registries and
/// the temporary-id allocator. Owned end to end by the pipeline; every pass
/// mutates it in place.
pub struct Program {
    instructions: Vec<Instruction>,
    pub labels: LabelTable,
    pub symbols: SymbolTable,
    next_temp: u32,
    /// At most one label may be staged for attachment to the next appended
    /// instruction.
    pending_label: Option<LabelId>,
}

impl Program {
    pub fn new() -> Self {
        Program {
            instructions: Vec::new(),
            labels: LabelTable::new(),
            symbols: SymbolTable::new(),
            next_temp: 0,
            pending_label: None,
        }
    }

    /// *Allocate temporary id*: monotone, never reused.
    pub fn alloc_temp(&mut self) -> VReg {
        let id = VReg::new(self.next_temp as usize);
        self.next_temp += 1;
        id
    }

    /// *Create label*: a fresh, unattached identifier.
    pub fn create_label(&mut self) -> LabelId {
        self.labels.create()
    }

    /// *Declare a symbol*, allocating its backing storage label as a side
    /// effect. Returns `Err(())` on a duplicate name (a user error the
    /// front end should report via `Diagnostics`).
    pub fn declare_symbol(&mut self, name: &str, ty: SymbolType) -> Result<&Symbol, ()> {
        let storage = self.create_label();
        self.labels.set_name(storage, name);
        let idx = self.symbols.declare(name, ty, storage)?;
        Ok(self.symbols.iter().nth(idx).unwrap())
    }

    /// *Assign label to next instruction*: stage `label`, or if one is
    /// already pending, fold `label` into an alias of it.
    pub fn assign_label_to_next(&mut self, label: LabelId) {
        match self.pending_label {
            None => self.pending_label = Some(label),
            Some(pending) => {
                let canonical = self.labels.alias(pending, label);
                self.pending_label = Some(canonical);
            }
        }
    }

    /// *Append instruction*: attach the pending label (if any) and clear the
    /// pending slot. `comment`, when given, decorates the instruction (the
    /// front end is expected to have already formatted it from the current
    /// source location).
    pub fn append_instruction(&mut self, mut instr: Instruction, comment: Option<String>) -> usize {
        instr.label = self.pending_label.take();
        if instr.comment.is_none() {
            instr.comment = comment;
        }
        let pos = self.instructions.len();
        self.instructions.push(instr);
        pos
    }

    /// *Remove instruction at position*: migrate any attached label/comment
    /// to the following instruction, inserting a `NOP` to host the label if
    /// there is no following instruction or it is already labeled.
    pub fn remove_instruction(&mut self, pos: usize) {
        let removed = self.instructions.remove(pos);
        if removed.label.is_none() && removed.comment.is_none() {
            return;
        }

        let next_already_labeled =
            self.instructions.get(pos).map(|i| i.label.is_some()).unwrap_or(true);

        if removed.label.is_some() && next_already_labeled {
            let mut nop = Instruction::new(Opcode::Nop);
            nop.label = removed.label;
            nop.comment = removed.comment;
            self.instructions.insert(pos, nop);
        } else if let Some(next) = self.instructions.get_mut(pos) {
            if removed.label.is_some() {
                next.label = removed.label;
            }
            if removed.comment.is_some() && next.comment.is_none() {
                next.comment = removed.comment;
            }
        }
    }

    /// Insert `instr` at `pos`, used by callers re-inserting after a remove.
    pub fn insert_instruction(&mut self, pos: usize, instr: Instruction) {
        self.instructions.insert(pos, instr);
    }

    /// *Generate epilog*: ensure the final instruction is `CallExit0`,
    /// appending one (and flushing any pending label onto it) if the
    /// program doesn't already end that way.
    pub fn generate_epilog(&mut self) {
        if let Some(last) = self.instructions.last() {
            if last.opcode.is_exit() {
                return;
            }
        }
        self.append_instruction(Instruction::new(Opcode::CallExit0), None);
    }

    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    pub fn instructions_mut(&mut self) -> &mut Vec<Instruction> {
        &mut self.instructions
    }

    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    /// Replace the instruction list wholesale — used by the CFG
    /// linearization step after allocation/transform rewrite block
    /// contents.
    pub fn set_instructions(&mut self, instrs: Vec<Instruction>) {
        self.instructions = instrs;
    }
}

impl Default for Program {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::reg::{ArchReg, RegRef};
    use crate::ir::instruction::RegArg;

    #[test]
    fn temps_are_monotone() {
        let mut p = Program::new();
        let a = p.alloc_temp();
        let b = p.alloc_temp();
        assert!(a.index() < b.index());
    }

    #[test]
    fn pending_label_attaches_then_clears() {
        let mut p = Program::new();
        let l = p.create_label();
        p.assign_label_to_next(l);
        let pos = p.append_instruction(Instruction::new(Opcode::Nop), None);
        assert_eq!(p.instructions()[pos].label, Some(l));

        let pos2 = p.append_instruction(Instruction::new(Opcode::Nop), None);
        assert_eq!(p.instructions()[pos2].label, None);
    }

    #[test]
    fn second_pending_label_becomes_alias() {
        let mut p = Program::new();
        let l1 = p.create_label();
        let l2 = p.create_label();
        p.assign_label_to_next(l1);
        p.assign_label_to_next(l2);
        let pos = p.append_instruction(Instruction::new(Opcode::Nop), None);
        let attached = p.instructions()[pos].label.unwrap();
        assert_eq!(p.labels.resolve(l1), attached);
        assert_eq!(p.labels.resolve(l2), attached);
    }

    #[test]
    fn remove_instruction_migrates_label_to_next() {
        let mut p = Program::new();
        let l = p.create_label();
        p.assign_label_to_next(l);
        p.append_instruction(Instruction::new(Opcode::Nop), None);
        p.append_instruction(Instruction::new(Opcode::Nop), None);

        p.remove_instruction(0);
        assert_eq!(p.len(), 1);
        assert_eq!(p.instructions()[0].label, Some(l));
    }

    #[test]
    fn remove_instruction_inserts_nop_when_next_already_labeled() {
        let mut p = Program::new();
        let l1 = p.create_label();
        p.assign_label_to_next(l1);
        p.append_instruction(Instruction::new(Opcode::Nop), None);
        let l2 = p.create_label();
        p.assign_label_to_next(l2);
        p.append_instruction(Instruction::new(Opcode::Nop), None);

        p.remove_instruction(0);
        assert_eq!(p.len(), 2);
        assert_eq!(p.instructions()[0].opcode, Opcode::Nop);
        assert_eq!(p.instructions()[0].label, Some(l1));
        assert_eq!(p.instructions()[1].label, Some(l2));
    }

    #[test]
    fn remove_instruction_inserts_nop_when_last() {
        let mut p = Program::new();
        let l = p.create_label();
        p.assign_label_to_next(l);
        p.append_instruction(Instruction::new(Opcode::Nop), None);

        p.remove_instruction(0);
        assert_eq!(p.len(), 1);
        assert_eq!(p.instructions()[0].label, Some(l));
    }

    #[test]
    fn generate_epilog_appends_exit_once() {
        let mut p = Program::new();
        p.append_instruction(Instruction::new(Opcode::Nop), None);
        p.generate_epilog();
        assert_eq!(p.instructions().last().unwrap().opcode, Opcode::CallExit0);
        let len_after_first = p.len();
        p.generate_epilog();
        assert_eq!(p.len(), len_after_first);
    }

    #[test]
    fn reg_arg_display_uses_reg_display() {
        let arg = RegArg::new(RegRef::Arch(ArchReg::ZERO));
        assert_eq!(format!("{}", arg), "zero");
    }
}
