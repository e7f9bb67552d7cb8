//! Rewrite every virtual-register operand to its allocation: a concrete
//! architectural register directly, or — for spilled temporaries — a
//! scratch register drawn from a small reserved pool, with loads and stores
//! injected around the scratch's uses.
//!
//! The scratch pool is cached per basic block (the cache is reset at every
//! block boundary, so a spilled value is never assumed to still be in a
//! register after a branch): each slot remembers which temporary it last
//! held and whether it's been written since it was loaded. A write-back is
//! only emitted for slots that are actually dirty, and always before the
//! block's terminator executes, never after.

use crate::cfg::Cfg;
use crate::diag::CodegenError;
use crate::ir::instruction::{Instruction, Opcode, RegArg};
use crate::ir::label::LabelId;
use crate::ir::program::Program;
use crate::ir::reg::{Allocation, ArchReg, RegRef, RegSet, VReg};
use crate::ir::symbol::SymbolType;
use std::collections::HashMap;

#[derive(Clone, Copy)]
struct Slot {
    holding: VReg,
    dirty: bool,
}

/// Per-block scratch-register cache. Holds a reference to the spilled-temp
/// storage map for the lifetime of one block's worth of instructions.
struct ScratchCache<'a> {
    pool: Vec<ArchReg>,
    slots: Vec<Option<Slot>>,
    /// Least-recently-used ordering of slot indices; front is LRU.
    recency: Vec<usize>,
    storage: &'a HashMap<VReg, LabelId>,
}

impl<'a> ScratchCache<'a> {
    fn new(pool: &RegSet, storage: &'a HashMap<VReg, LabelId>) -> Self {
        let pool: Vec<ArchReg> = pool.iter().collect();
        let slots = vec![None; pool.len()];
        ScratchCache { pool, slots, recency: Vec::new(), storage }
    }

    fn touch(&mut self, slot: usize) {
        self.recency.retain(|&s| s != slot);
        self.recency.push(slot);
    }

    fn storage_of(&self, v: VReg) -> Result<LabelId, CodegenError> {
        self.storage
            .get(&v)
            .copied()
            .ok_or_else(|| CodegenError::Internal(format!("spilled temporary {} has no storage slot", v)))
    }

    /// Ensure `v` occupies a scratch register, emitting a load into `inject`
    /// when it wasn't already cached and `need_load` is set (a pure write
    /// with no prior read of the same temporary in this instruction doesn't
    /// need one). Returns the scratch register now holding it.
    fn ensure(&mut self, v: VReg, need_load: bool, inject: &mut Vec<Instruction>) -> Result<ArchReg, CodegenError> {
        if let Some(slot) = self.slots.iter().position(|s| matches!(s, Some(s) if s.holding == v)) {
            self.touch(slot);
            return Ok(self.pool[slot]);
        }

        let slot = match self.slots.iter().position(|s| s.is_none()) {
            Some(free) => free,
            None => {
                let victim = self.recency.remove(0);
                if let Some(Slot { holding, dirty: true }) = self.slots[victim] {
                    let label = self.storage_of(holding)?;
                    inject.push(store_to_storage(self.pool[victim], label));
                }
                victim
            }
        };

        if need_load {
            let label = self.storage_of(v)?;
            inject.push(load_from_storage(self.pool[slot], label));
        }
        self.slots[slot] = Some(Slot { holding: v, dirty: false });
        self.touch(slot);
        Ok(self.pool[slot])
    }

    fn mark_dirty(&mut self, reg: ArchReg) {
        if let Some(slot) = self.pool.iter().position(|&r| r == reg) {
            if let Some(s) = &mut self.slots[slot] {
                s.dirty = true;
            }
        }
    }

    /// Write back every dirty slot and clear the cache — called right
    /// before a block's terminator is emitted, since a block never assumes
    /// its successor will see the same scratch contents.
    fn flush(&mut self, inject: &mut Vec<Instruction>) -> Result<(), CodegenError> {
        for i in 0..self.slots.len() {
            if let Some(Slot { holding, dirty: true }) = self.slots[i] {
                let label = self.storage_of(holding)?;
                inject.push(store_to_storage(self.pool[i], label));
            }
        }
        self.slots.iter_mut().for_each(|s| *s = None);
        self.recency.clear();
        Ok(())
    }
}

fn load_from_storage(dest: ArchReg, storage: LabelId) -> Instruction {
    Instruction::new(Opcode::LwG).with_dest(RegArg::new(RegRef::Arch(dest))).with_address(storage)
}

fn store_to_storage(value: ArchReg, storage: LabelId) -> Instruction {
    Instruction::new(Opcode::SwG).with_src1(RegArg::new(RegRef::Arch(value))).with_address(storage)
}

/// Run the materialization pass over every block of `cfg`. Declares one
/// hidden scalar symbol per spilled temporary on `program`. Returns the
/// final flat instruction list, ready for target lowering.
pub fn materialize(
    program: &mut Program,
    cfg: &Cfg,
    allocation: &HashMap<VReg, Allocation>,
    spill_pool: &RegSet,
) -> Result<Vec<Instruction>, CodegenError> {
    let mut storage: HashMap<VReg, LabelId> = HashMap::new();
    for (&v, a) in allocation.iter() {
        if *a == Allocation::Spilled {
            let name = format!("__spill_{}", cranelift_entity::EntityRef::index(v));
            let sym = program
                .declare_symbol(&name, SymbolType::Scalar)
                .map_err(|_| CodegenError::Internal(format!("duplicate spill slot name `{}`", name)))?;
            storage.insert(v, sym.storage);
        }
    }

    let mut out = Vec::new();

    for block in cfg.blocks() {
        if block == cfg.terminal_block() {
            continue;
        }
        let nodes = &cfg.block(block).nodes;
        let mut cache = ScratchCache::new(spill_pool, &storage);

        for (i, &node) in nodes.iter().enumerate() {
            let mut instr = cfg.node(node).instruction.clone();
            let is_last = i + 1 == nodes.len();
            let mut inject = Vec::new();

            for arg in [&mut instr.src1, &mut instr.src2].into_iter().flatten() {
                rewrite_use(arg, allocation, &mut cache, &mut inject)?;
            }
            if let Some(dest) = &mut instr.dest {
                rewrite_def(dest, allocation, &mut cache)?;
            }

            if is_last {
                cache.flush(&mut inject)?;
            }

            if i == 0 {
                if let Some(label) = instr.label.take() {
                    if let Some(first) = inject.first_mut() {
                        first.label = Some(label);
                    } else {
                        instr.label = Some(label);
                    }
                }
            }

            out.extend(inject);
            out.push(instr);
        }
    }

    Ok(out)
}

fn rewrite_use(
    arg: &mut RegArg,
    allocation: &HashMap<VReg, Allocation>,
    cache: &mut ScratchCache,
    inject: &mut Vec<Instruction>,
) -> Result<(), CodegenError> {
    if let RegRef::Virtual(v) = arg.reg {
        match allocation.get(&v) {
            Some(Allocation::Reg(r)) => arg.reg = RegRef::Arch(*r),
            Some(Allocation::Spilled) => {
                let reg = cache.ensure(v, true, inject)?;
                arg.reg = RegRef::Arch(reg);
            }
            None => return Err(CodegenError::Internal(format!("temporary {} was never allocated", v))),
        }
    }
    Ok(())
}

fn rewrite_def(
    arg: &mut RegArg,
    allocation: &HashMap<VReg, Allocation>,
    cache: &mut ScratchCache,
) -> Result<(), CodegenError> {
    if let RegRef::Virtual(v) = arg.reg {
        match allocation.get(&v) {
            Some(Allocation::Reg(r)) => arg.reg = RegRef::Arch(*r),
            Some(Allocation::Spilled) => {
                let mut nothing = Vec::new();
                let reg = cache.ensure(v, false, &mut nothing)?;
                debug_assert!(nothing.is_empty(), "a pure def never needs a preload");
                cache.mark_dirty(reg);
                arg.reg = RegRef::Arch(reg);
            }
            None => return Err(CodegenError::Internal(format!("temporary {} was never allocated", v))),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::text::read_program;

    #[test]
    fn spilled_temporary_gets_hidden_storage_and_load_store() {
        let src = "\
.text
  li %0, 42
  call_print_int %0
  call_exit_0
";
        let mut program = read_program(src).unwrap();
        let cfg = Cfg::build(&mut program).unwrap();

        let v0: VReg = cranelift_entity::EntityRef::new(0);
        let mut allocation = HashMap::new();
        allocation.insert(v0, Allocation::Spilled);

        let pool = crate::isa::default_spill_pool();
        let out = materialize(&mut program, &cfg, &allocation, &pool).unwrap();

        assert!(out.iter().any(|i| i.opcode == Opcode::SwG));
        assert!(out.iter().any(|i| i.opcode == Opcode::LwG));
        assert!(program.symbols.lookup("__spill_0").is_some());
    }

    #[test]
    fn non_spilled_temporary_is_rewritten_to_its_register() {
        let src = ".text\n  li %0, 1\n  call_exit_0\n";
        let mut program = read_program(src).unwrap();
        let cfg = Cfg::build(&mut program).unwrap();
        let v0: VReg = cranelift_entity::EntityRef::new(0);
        let mut allocation = HashMap::new();
        allocation.insert(v0, Allocation::Reg(ArchReg::from_abi_name("s0").unwrap()));

        let pool = crate::isa::default_spill_pool();
        let out = materialize(&mut program, &cfg, &allocation, &pool).unwrap();
        let li = out.iter().find(|i| i.opcode == Opcode::Li).unwrap();
        assert_eq!(li.dest.as_ref().unwrap().reg, RegRef::Arch(ArchReg::from_abi_name("s0").unwrap()));
    }

    #[test]
    fn read_modify_write_spill_reuses_same_scratch_slot() {
        let src = ".text\n  addi %0, %0, -1\n  call_exit_0\n";
        let mut program = read_program(src).unwrap();
        let cfg = Cfg::build(&mut program).unwrap();
        let v0: VReg = cranelift_entity::EntityRef::new(0);
        let mut allocation = HashMap::new();
        allocation.insert(v0, Allocation::Spilled);

        let pool = crate::isa::default_spill_pool();
        let out = materialize(&mut program, &cfg, &allocation, &pool).unwrap();
        let addi = out.iter().find(|i| i.opcode == Opcode::Addi).unwrap();
        assert_eq!(addi.dest.as_ref().unwrap().reg, addi.src1.as_ref().unwrap().reg);
    }
}
