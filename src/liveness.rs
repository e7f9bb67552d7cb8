//! Liveness analysis: a backward dataflow fixed point over the CFG.

use crate::cfg::{BlockId, Cfg, NodeId, RegId};
use cranelift_entity::SecondaryMap;
use std::collections::HashSet;

#[derive(Clone, Default)]
pub struct RegSet(HashSet<RegId>);

impl RegSet {
    pub fn contains(&self, r: RegId) -> bool {
        self.0.contains(&r)
    }

    pub fn iter(&self) -> impl Iterator<Item = RegId> + '_ {
        self.0.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    fn union_with(&mut self, other: &RegSet) -> bool {
        let before = self.0.len();
        self.0.extend(other.0.iter().copied());
        self.0.len() != before
    }
}

/// Live-in/live-out sets for every node, computed to a fixed point.
pub struct Liveness {
    live_in: SecondaryMap<NodeId, RegSet>,
    live_out: SecondaryMap<NodeId, RegSet>,
}

impl Liveness {
    pub fn live_in(&self, n: NodeId) -> &RegSet {
        &self.live_in[n]
    }

    pub fn live_out(&self, n: NodeId) -> &RegSet {
        &self.live_out[n]
    }

    /// Live-in of a block is the live-in of its first node (empty blocks —
    /// the terminal block — have no nodes and are always empty).
    pub fn block_live_in(&self, cfg: &Cfg, b: BlockId) -> RegSet {
        match cfg.block(b).nodes.first() {
            Some(&n) => self.live_in[n].clone(),
            None => RegSet::default(),
        }
    }

    /// Live-out of a block is the live-out of its last node.
    pub fn block_live_out(&self, cfg: &Cfg, b: BlockId) -> RegSet {
        match cfg.block(b).nodes.last() {
            Some(&n) => self.live_out[n].clone(),
            None => RegSet::default(),
        }
    }

    /// Compute liveness for `cfg` by iterating to a fixed point: blocks are
    /// visited in reverse source order, and within a block nodes are visited
    /// last-to-first, since that ordering tends to converge fastest for
    /// structured control flow and is cheap to get right without a proper
    /// reverse-postorder pass.
    pub fn compute(cfg: &Cfg) -> Liveness {
        let mut live_in: SecondaryMap<NodeId, RegSet> = SecondaryMap::new();
        let mut live_out: SecondaryMap<NodeId, RegSet> = SecondaryMap::new();

        let blocks: Vec<BlockId> = cfg.blocks().filter(|&b| b != cfg.terminal_block()).collect();

        loop {
            let mut changed = false;

            for &block in blocks.iter().rev() {
                let succs = cfg.successors(block);
                let nodes = &cfg.block(block).nodes;

                for (i, &node) in nodes.iter().enumerate().rev() {
                    // out(n) = in(successor-node) if n isn't the block's
                    // last node, else the union of in(s) over every
                    // successor block s.
                    let mut out = RegSet::default();
                    if i + 1 < nodes.len() {
                        out.union_with(&live_in[nodes[i + 1]]);
                    } else {
                        for &s in succs {
                            if s == cfg.terminal_block() {
                                continue;
                            }
                            if let Some(&first) = cfg.block(s).nodes.first() {
                                out.union_with(&live_in[first]);
                            }
                        }
                    }

                    let node_data = cfg.node(node);
                    let mut new_in = out.clone();
                    for &d in &node_data.defs {
                        new_in.0.remove(&d);
                    }
                    for &u in &node_data.uses {
                        new_in.0.insert(u);
                    }

                    if out.0 != live_out[node].0 {
                        changed = true;
                        live_out[node] = out;
                    }
                    if new_in.0 != live_in[node].0 {
                        changed = true;
                        live_in[node] = new_in;
                    }
                }
            }

            if !changed {
                break;
            }
        }

        Liveness { live_in, live_out }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cfg::Cfg;
    use crate::ir::text::read_program;

    #[test]
    fn straight_line_def_before_use_is_live_between() {
        let src = "\
.text
  li %0, 5
  call_print_int %0
  call_exit_0
";
        let mut program = read_program(src).unwrap();
        let cfg = Cfg::build(&mut program).unwrap();
        let live = Liveness::compute(&cfg);

        let nodes: Vec<_> = cfg.nodes_in_order().collect();
        // %0 is defined at node 0 and used at node 1: live out of node 0,
        // live in of node 1, dead by node 2.
        let v0 = cfg.regs.lookup(crate::ir::reg::RegRef::Virtual(cranelift_entity::EntityRef::new(0))).unwrap();
        assert!(live.live_out(nodes[0]).contains(v0));
        assert!(live.live_in(nodes[1]).contains(v0));
        assert!(!live.live_out(nodes[1]).contains(v0));
    }

    #[test]
    fn loop_back_edge_keeps_counter_live_across_iterations() {
        let src = "\
.text
loop_top:
  addi %0, %0, -1
  bne %0, zero, loop_top
  call_exit_0
";
        let mut program = read_program(src).unwrap();
        let cfg = Cfg::build(&mut program).unwrap();
        let live = Liveness::compute(&cfg);
        let entry = cfg.entry_block();
        let live_in = live.block_live_in(&cfg, entry);
        let v0 = cfg.regs.lookup(crate::ir::reg::RegRef::Virtual(cranelift_entity::EntityRef::new(0))).unwrap();
        assert!(live_in.contains(v0));
    }

    #[test]
    fn zero_register_is_never_tracked() {
        let src = ".text\n  addi a0, zero, 5\n  call_exit_0\n";
        let mut program = read_program(src).unwrap();
        let cfg = Cfg::build(&mut program).unwrap();
        assert!(cfg.regs.lookup(crate::ir::reg::RegRef::Arch(crate::ir::reg::ArchReg::ZERO)).is_none());
        let _ = Liveness::compute(&cfg);
    }
}
