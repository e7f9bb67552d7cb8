//! Seed and refine per-temporary register constraint sets ahead of
//! allocation.

use crate::cfg::Cfg;
use crate::ir::instruction::Opcode;
use crate::ir::reg::{RegSet, VReg};
use crate::isa;
use crate::regalloc::interval::Interval;
use std::collections::HashMap;

/// Seed one constraint set per interval: an explicit pin (from
/// `Cfg::constraints`, already intersected across every appearance in the
/// program) if the front end gave one, otherwise the full general-purpose
/// pool. Then, for any temporary whose live range spans a syscall pseudo-op,
/// narrow the set to exclude caller-saved registers — a value live across
/// the `ECALL` sequence those pseudo-ops lower to would otherwise be
/// clobbered — and reorder the survivors to prefer callee-saved registers.
/// If an explicit pin leaves no callee-saved option, the pin is honored as
/// given rather than silently widened: the front end asked for a specific
/// register and gets it, at the cost of needing a caller-save spill/reload
/// around the call site (`transform::syscall` handles that).
pub fn seed(cfg: &Cfg, intervals: &[Interval]) -> HashMap<VReg, RegSet> {
    let general = isa::general_pool();
    let caller_save = isa::caller_save();
    let callee_save = isa::callee_save();

    let mut out = HashMap::new();
    for interval in intervals {
        let base = cfg.constraints.get(&interval.vreg).cloned().unwrap_or_else(|| general.clone());
        let refined = if spans_syscall(cfg, interval) {
            let narrowed = base.subtract(&caller_save);
            if narrowed.is_empty() {
                base
            } else {
                narrowed.reorder_front(&callee_save)
            }
        } else {
            base
        };
        out.insert(interval.vreg, refined);
    }
    out
}

fn spans_syscall(cfg: &Cfg, interval: &Interval) -> bool {
    cfg.nodes_in_order().enumerate().any(|(pos, node)| {
        pos >= interval.start
            && pos <= interval.end
            && matches!(
                cfg.node(node).instruction.opcode,
                Opcode::CallReadInt | Opcode::CallPrintInt | Opcode::CallPrintChar
            )
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cfg::Cfg;
    use crate::ir::text::read_program;
    use crate::liveness::Liveness;
    use crate::regalloc::interval::compute_intervals;

    #[test]
    fn temporary_spanning_a_call_avoids_caller_save() {
        let src = "\
.text
  li %0, 7
  call_print_int %0
  li %1, 9
  add %2, %0, %1
  call_exit_0
";
        let mut program = read_program(src).unwrap();
        let cfg = Cfg::build(&mut program).unwrap();
        let liveness = Liveness::compute(&cfg);
        let intervals = compute_intervals(&cfg, &liveness);
        let constraints = seed(&cfg, &intervals);

        let v0: crate::ir::reg::VReg = cranelift_entity::EntityRef::new(0);
        let set = &constraints[&v0];
        for r in isa::caller_save().iter() {
            assert!(!set.contains(r), "caller-save register unexpectedly allowed for a live-across-call temp");
        }
    }

    #[test]
    fn temporary_not_spanning_a_call_gets_full_pool() {
        let src = "\
.text
  li %0, 1
  li %1, 2
  add %2, %0, %1
  call_exit_0
";
        let mut program = read_program(src).unwrap();
        let cfg = Cfg::build(&mut program).unwrap();
        let liveness = Liveness::compute(&cfg);
        let intervals = compute_intervals(&cfg, &liveness);
        let constraints = seed(&cfg, &intervals);

        let v0: crate::ir::reg::VReg = cranelift_entity::EntityRef::new(0);
        assert_eq!(constraints[&v0].len(), isa::general_pool().len());
    }
}
