//! Control-flow graph construction.
//!
//! Partitions a `Program`'s flat instruction list into basic blocks, wires up
//! the successor edges a jump/branch/exit/fallthrough implies, and interns
//! every register mentioned into a dense index space liveness and register
//! allocation can use as bitset/map keys — the same "everything is an arena
//! index" shape the IR types use for labels and temporaries.

use crate::diag::CodegenError;
use crate::ir::instruction::Instruction;
use crate::ir::label::LabelId;
use crate::ir::program::Program;
use crate::ir::reg::{RegRef, RegSet, VReg};
use cranelift_entity::{entity_impl, PrimaryMap, SecondaryMap};
use smallvec::SmallVec;
use std::collections::HashMap;

/// A basic block.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub struct BlockId(u32);
entity_impl!(BlockId, "block");

/// One instruction, positioned inside a block.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub struct NodeId(u32);
entity_impl!(NodeId, "node");

/// A register, interned into a dense index shared by architectural and
/// virtual registers alike. The always-zero register is never interned: it
/// never needs tracking by liveness or allocation.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub struct RegId(u32);
entity_impl!(RegId, "r");

#[derive(Default)]
pub struct RegUniverse {
    regs: PrimaryMap<RegId, RegRef>,
    by_ref: HashMap<RegRef, RegId>,
}

impl RegUniverse {
    pub fn new() -> Self {
        Self::default()
    }

    /// Intern `r`, returning `None` for the always-zero register (it is
    /// excluded from liveness tracking entirely).
    pub fn intern(&mut self, r: RegRef) -> Option<RegId> {
        if r.is_zero() {
            return None;
        }
        if let Some(&id) = self.by_ref.get(&r) {
            return Some(id);
        }
        let id = self.regs.push(r);
        self.by_ref.insert(r, id);
        Some(id)
    }

    pub fn lookup(&self, r: RegRef) -> Option<RegId> {
        if r.is_zero() {
            return None;
        }
        self.by_ref.get(&r).copied()
    }

    pub fn reg_ref(&self, id: RegId) -> RegRef {
        self.regs[id]
    }

    pub fn vreg_ids(&self) -> impl Iterator<Item = (RegId, VReg)> + '_ {
        self.regs.iter().filter_map(|(id, r)| match r {
            RegRef::Virtual(v) => Some((id, *v)),
            RegRef::Arch(_) => None,
        })
    }
}

pub struct Node {
    pub instruction: Instruction,
    pub defs: SmallVec<[RegId; 1]>,
    pub uses: SmallVec<[RegId; 2]>,
}

#[derive(Default)]
pub struct Block {
    /// The block's own node sequence, in program order.
    pub nodes: Vec<NodeId>,
    /// The canonical label, if any, this block's entry is addressed by.
    pub label: Option<LabelId>,
}

/// The control-flow graph. Owns every node and block; the original `Program`
/// instruction list is reconstructed from this by `linearize`.
pub struct Cfg {
    nodes: PrimaryMap<NodeId, Node>,
    blocks: PrimaryMap<BlockId, Block>,
    successors: SecondaryMap<BlockId, SmallVec<[BlockId; 2]>>,
    entry: BlockId,
    /// Synthetic block with no instructions representing control falling off
    /// the end of the program; every exit syscall and final-block
    /// fallthrough points here.
    terminal: BlockId,
    pub regs: RegUniverse,
    /// Per-virtual-register whitelist, intersected across every appearance
    /// of that register in the program. `None` means unconstrained.
    pub constraints: HashMap<VReg, RegSet>,
}

impl Cfg {
    pub fn entry_block(&self) -> BlockId {
        self.entry
    }

    pub fn terminal_block(&self) -> BlockId {
        self.terminal
    }

    pub fn blocks(&self) -> impl Iterator<Item = BlockId> + '_ {
        self.blocks.keys()
    }

    pub fn block(&self, id: BlockId) -> &Block {
        &self.blocks[id]
    }

    pub fn successors(&self, id: BlockId) -> &[BlockId] {
        &self.successors[id]
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id]
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id]
    }

    pub fn nodes_in_order(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.blocks
            .keys()
            .filter(move |&b| b != self.terminal)
            .flat_map(move |b| self.blocks[b].nodes.iter().copied())
    }

    /// Reassemble a flat instruction list from the blocks, in block order,
    /// skipping the terminal block (it never holds instructions).
    pub fn linearize(&self) -> Vec<Instruction> {
        self.nodes_in_order().map(|n| self.nodes[n].instruction.clone()).collect()
    }

    /// Build a CFG from `program`'s current instruction list. Consumes the
    /// instructions (the program keeps its labels/symbols/temp counter);
    /// callers reinstall the rewritten list with `Program::set_instructions`
    /// once downstream passes are done.
    pub fn build(program: &mut Program) -> Result<Cfg, CodegenError> {
        let raw: Vec<Instruction> = program.instructions().to_vec();

        let mut blocks: PrimaryMap<BlockId, Block> = PrimaryMap::new();
        let mut nodes: PrimaryMap<NodeId, Node> = PrimaryMap::new();
        let mut regs = RegUniverse::new();
        let mut constraints: HashMap<VReg, RegSet> = HashMap::new();
        let mut label_block: HashMap<LabelId, BlockId> = HashMap::new();

        let mut cur = Block::default();

        macro_rules! start_block {
            ($label:expr) => {{
                if !cur.nodes.is_empty() || cur.label.is_some() {
                    blocks.push(std::mem::take(&mut cur));
                }
                cur.label = $label;
            }};
        }

        for instr in raw.into_iter() {
            if let Some(raw_label) = instr.label {
                let canonical = program.labels.resolve(raw_label);
                if !cur.nodes.is_empty() || cur.label.is_some() {
                    start_block!(Some(canonical));
                } else {
                    cur.label = Some(canonical);
                }
            }

            for arg in instr.dest.iter().chain(instr.src1.iter()).chain(instr.src2.iter()) {
                if let RegRef::Virtual(v) = arg.reg {
                    if let Some(whitelist) = &arg.whitelist {
                        record_constraint(&mut constraints, v, whitelist, &instr.opcode.to_string())?;
                    }
                }
            }

            let defs: SmallVec<[_; 1]> = instr.defs().and_then(|r| regs.intern(r)).into_iter().collect();
            let uses: SmallVec<[_; 2]> = instr.uses().filter_map(|r| regs.intern(r)).collect();

            let is_terminator = instr.opcode.is_terminator();
            let node_id = nodes.push(Node { instruction: instr, defs, uses });
            cur.nodes.push(node_id);

            if is_terminator {
                start_block!(None);
            }
        }
        if !cur.nodes.is_empty() || cur.label.is_some() || blocks.is_empty() {
            blocks.push(cur);
        }

        for (id, block) in blocks.iter() {
            if let Some(l) = block.label {
                label_block.entry(l).or_insert(id);
            }
        }

        let terminal = blocks.push(Block::default());
        let entry = blocks.keys().next().unwrap_or(terminal);

        let mut successors: SecondaryMap<BlockId, SmallVec<[BlockId; 2]>> = SecondaryMap::new();
        let block_ids: Vec<BlockId> = blocks.keys().collect();
        for (i, &id) in block_ids.iter().enumerate() {
            if id == terminal {
                continue;
            }
            let fallthrough = block_ids.get(i + 1).copied().unwrap_or(terminal);
            let last = blocks[id].nodes.last().map(|&n| &nodes[n].instruction);
            let mut succ: SmallVec<[BlockId; 2]> = SmallVec::new();
            match last {
                Some(instr) if instr.opcode.is_exit() => {
                    succ.push(terminal);
                }
                Some(instr) if instr.opcode.is_unconditional_jump() => {
                    let target = resolve_target(program, &label_block, instr)?;
                    succ.push(target);
                }
                Some(instr) if instr.opcode.is_branch() => {
                    let target = resolve_target(program, &label_block, instr)?;
                    succ.push(target);
                    succ.push(fallthrough);
                }
                _ => {
                    succ.push(fallthrough);
                }
            }
            successors[id] = succ;
        }

        Ok(Cfg { nodes, blocks, successors, entry, terminal, regs, constraints })
    }
}

fn resolve_target(
    program: &mut Program,
    label_block: &HashMap<LabelId, BlockId>,
    instr: &Instruction,
) -> Result<BlockId, CodegenError> {
    let raw = instr.address.ok_or_else(|| {
        CodegenError::Internal(format!("{} instruction missing a branch target", instr.opcode))
    })?;
    let canonical = program.labels.resolve(raw);
    label_block.get(&canonical).copied().ok_or_else(|| {
        CodegenError::TranslationFailure(format!(
            "branch target `{}` does not label any instruction",
            program.labels.display_name(canonical)
        ))
    })
}

/// Fold a register argument's pin into the running intersection of every
/// whitelist seen for that virtual register. An empty intersection after at
/// least one constraint has already been recorded means the program pins the
/// same temporary to disjoint register sets in different places — nothing
/// downstream could ever satisfy both, so this is reported immediately.
fn record_constraint(
    constraints: &mut HashMap<VReg, RegSet>,
    v: VReg,
    whitelist: &RegSet,
    opcode: &str,
) -> Result<(), CodegenError> {
    match constraints.get(&v) {
        None => {
            constraints.insert(v, whitelist.clone());
        }
        Some(existing) => {
            let narrowed = existing.intersect(whitelist);
            if narrowed.is_empty() {
                return Err(CodegenError::TranslationFailure(format!(
                    "temporary {} is pinned to incompatible register sets (conflict at `{}`)",
                    v, opcode
                )));
            }
            constraints.insert(v, narrowed);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::text::read_program;

    #[test]
    fn single_block_program_has_one_block_plus_terminal() {
        let mut program = read_program(".text\n  call_exit_0\n").unwrap();
        let cfg = Cfg::build(&mut program).unwrap();
        // entry block + terminal block.
        assert_eq!(cfg.blocks().count(), 2);
        assert_eq!(cfg.successors(cfg.entry_block()), &[cfg.terminal_block()][..]);
    }

    #[test]
    fn branch_has_two_successors() {
        let src = "\
.text
  beq a0, a1, target
  call_exit_0
target:
  call_exit_0
";
        let mut program = read_program(src).unwrap();
        let cfg = Cfg::build(&mut program).unwrap();
        let entry = cfg.entry_block();
        assert_eq!(cfg.successors(entry).len(), 2);
    }

    #[test]
    fn unconditional_jump_has_single_successor() {
        let src = "\
.text
  j target
target:
  call_exit_0
";
        let mut program = read_program(src).unwrap();
        let cfg = Cfg::build(&mut program).unwrap();
        let entry = cfg.entry_block();
        assert_eq!(cfg.successors(entry).len(), 1);
    }

    #[test]
    fn unknown_branch_target_is_translation_failure() {
        let src = "\
.text
  j nowhere
  call_exit_0
";
        let mut program = read_program(src).unwrap();
        assert!(Cfg::build(&mut program).is_err());
    }

    #[test]
    fn linearize_round_trips_instruction_count() {
        let src = "\
.text
  li %0, 1
  li %1, 2
  call_exit_0
";
        let mut program = read_program(src).unwrap();
        let cfg = Cfg::build(&mut program).unwrap();
        assert_eq!(cfg.linearize().len(), 3);
    }
}
