//! The linear-scan assignment pass proper.

use crate::ir::reg::{Allocation, ArchReg, RegSet, VReg};
use crate::regalloc::interval::Interval;
use std::collections::{HashMap, HashSet};

/// One interval currently holding a physical register.
struct ActiveEntry {
    interval: Interval,
    reg: ArchReg,
}

/// Run linear scan over `intervals` (expected sorted by increasing start;
/// `interval::compute_intervals` already produces that order) using the
/// per-temporary candidate sets in `constraints`. Returns the final
/// allocation decision for every temporary: a concrete register, or
/// `Allocation::Spilled`.
pub fn allocate(intervals: &[Interval], constraints: &HashMap<VReg, RegSet>) -> HashMap<VReg, Allocation> {
    let mut active: Vec<ActiveEntry> = Vec::new();
    let mut result = HashMap::new();

    for interval in intervals {
        expire_old(&mut active, interval.start);

        let constraint = constraints.get(&interval.vreg).cloned().unwrap_or_default();
        let in_use: HashSet<ArchReg> = active.iter().map(|e| e.reg).collect();

        if let Some(reg) = constraint.iter().find(|r| !in_use.contains(r)) {
            assign(&mut active, &mut result, *interval, reg);
            continue;
        }

        // No free register in the candidate set: find the active interval
        // holding a register we're allowed to use whose own live range ends
        // furthest in the future. Evicting it (spilling it) is the better
        // trade exactly when it outlives the interval we're placing now —
        // the classic Poletto & Sarkar "spill the farthest" heuristic,
        // generalized to per-temporary candidate sets.
        let evict_idx = active
            .iter()
            .enumerate()
            .filter(|(_, e)| constraint.contains(e.reg))
            .max_by_key(|(_, e)| e.interval.end)
            .map(|(i, _)| i);

        match evict_idx {
            Some(i) if active[i].interval.end > interval.end => {
                let evicted = active.remove(i);
                result.insert(evicted.interval.vreg, Allocation::Spilled);
                assign(&mut active, &mut result, *interval, evicted.reg);
            }
            _ => {
                result.insert(interval.vreg, Allocation::Spilled);
            }
        }
    }

    result
}

fn expire_old(active: &mut Vec<ActiveEntry>, start: usize) {
    active.retain(|e| e.interval.end >= start);
}

fn assign(
    active: &mut Vec<ActiveEntry>,
    result: &mut HashMap<VReg, Allocation>,
    interval: Interval,
    reg: ArchReg,
) {
    result.insert(interval.vreg, Allocation::Reg(reg));
    active.push(ActiveEntry { interval, reg });
    active.sort_by_key(|e| e.interval.end);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::reg::ArchReg;

    fn vreg(n: usize) -> VReg {
        cranelift_entity::EntityRef::new(n)
    }

    #[test]
    fn disjoint_intervals_can_share_a_register() {
        let intervals = vec![
            Interval { vreg: vreg(0), start: 0, end: 2 },
            Interval { vreg: vreg(1), start: 3, end: 5 },
        ];
        let mut constraints = HashMap::new();
        let pool: RegSet = [ArchReg::from_abi_name("s0").unwrap()].into_iter().collect();
        constraints.insert(vreg(0), pool.clone());
        constraints.insert(vreg(1), pool);

        let result = allocate(&intervals, &constraints);
        assert_eq!(result[&vreg(0)], Allocation::Reg(ArchReg::from_abi_name("s0").unwrap()));
        assert_eq!(result[&vreg(1)], Allocation::Reg(ArchReg::from_abi_name("s0").unwrap()));
    }

    #[test]
    fn overlapping_intervals_over_capacity_force_a_spill() {
        let intervals = vec![
            Interval { vreg: vreg(0), start: 0, end: 10 },
            Interval { vreg: vreg(1), start: 1, end: 2 },
        ];
        let mut constraints = HashMap::new();
        let pool: RegSet = [ArchReg::from_abi_name("s0").unwrap()].into_iter().collect();
        constraints.insert(vreg(0), pool.clone());
        constraints.insert(vreg(1), pool);

        let result = allocate(&intervals, &constraints);
        // vreg(1) ends before vreg(0), so it should win the register and
        // vreg(0) (the longer-lived one) gets evicted/spilled.
        assert_eq!(result[&vreg(1)], Allocation::Reg(ArchReg::from_abi_name("s0").unwrap()));
        assert_eq!(result[&vreg(0)], Allocation::Spilled);
    }

    #[test]
    fn later_shorter_interval_spills_itself_when_it_cannot_win_the_trade() {
        let intervals = vec![
            Interval { vreg: vreg(0), start: 0, end: 10 },
            Interval { vreg: vreg(1), start: 1, end: 20 },
        ];
        let mut constraints = HashMap::new();
        let pool: RegSet = [ArchReg::from_abi_name("s0").unwrap()].into_iter().collect();
        constraints.insert(vreg(0), pool.clone());
        constraints.insert(vreg(1), pool);

        let result = allocate(&intervals, &constraints);
        assert_eq!(result[&vreg(0)], Allocation::Reg(ArchReg::from_abi_name("s0").unwrap()));
        assert_eq!(result[&vreg(1)], Allocation::Spilled);
    }
}
