//! Live interval derivation from liveness sets.

use crate::cfg::Cfg;
use crate::ir::reg::VReg;
use crate::liveness::Liveness;
use std::collections::HashMap;

/// A temporary's live range, expressed as a `[start, end]` span of program
/// points in the CFG's linearized node order. Intervals are a conservative
/// envelope (earliest point the register is live to the latest), not an
/// exact set of live sub-ranges with holes — adequate for straight-line and
/// simple loop bodies, and far simpler than a live-range-splitting allocator.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Interval {
    pub vreg: VReg,
    pub start: usize,
    pub end: usize,
}

/// Derive one interval per virtual register mentioned in `cfg`, sorted by
/// increasing start (ties broken by increasing end), the order linear scan
/// processes them in.
pub fn compute_intervals(cfg: &Cfg, liveness: &Liveness) -> Vec<Interval> {
    let mut bounds: HashMap<VReg, (usize, usize)> = HashMap::new();

    for (pos, node) in cfg.nodes_in_order().enumerate() {
        let data = cfg.node(node);
        let mut touch = |reg_id: crate::cfg::RegId| {
            if let crate::ir::reg::RegRef::Virtual(v) = cfg.regs.reg_ref(reg_id) {
                let entry = bounds.entry(v).or_insert((pos, pos));
                entry.0 = entry.0.min(pos);
                entry.1 = entry.1.max(pos);
            }
        };
        for &d in &data.defs {
            touch(d);
        }
        for r in liveness.live_in(node).iter() {
            touch(r);
        }
        for r in liveness.live_out(node).iter() {
            touch(r);
        }
    }

    let mut intervals: Vec<Interval> =
        bounds.into_iter().map(|(vreg, (start, end))| Interval { vreg, start, end }).collect();
    intervals.sort_by_key(|i| (i.start, i.end));
    intervals
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::text::read_program;

    #[test]
    fn interval_spans_def_to_last_use() {
        let src = "\
.text
  li %0, 1
  li %1, 2
  add %2, %0, %1
  call_print_int %2
  call_exit_0
";
        let mut program = read_program(src).unwrap();
        let cfg = Cfg::build(&mut program).unwrap();
        let liveness = Liveness::compute(&cfg);
        let intervals = compute_intervals(&cfg, &liveness);
        assert_eq!(intervals.len(), 3);
        assert!(intervals.windows(2).all(|w| w[0].start <= w[1].start));

        let v0: crate::ir::reg::VReg = cranelift_entity::EntityRef::new(0);
        let i0 = intervals.iter().find(|i| i.vreg == v0).unwrap();
        assert_eq!(i0.start, 0);
        assert_eq!(i0.end, 2);
    }
}
