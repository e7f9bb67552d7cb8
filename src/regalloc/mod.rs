//! Register allocation: live interval derivation, constraint seeding,
//! linear-scan assignment, and spill materialization.

pub mod constraints;
pub mod interval;
pub mod linear_scan;
pub mod spill;

use crate::cfg::Cfg;
use crate::diag::CodegenError;
use crate::ir::instruction::Instruction;
use crate::ir::program::Program;
use crate::ir::reg::RegSet;
use crate::liveness::Liveness;

/// Run the full allocation pipeline over an already-built CFG: derive
/// intervals, seed constraints, assign registers, then materialize spills.
/// Returns the final flat instruction list (register operands fully
/// resolved to architectural registers), ready for target lowering.
pub fn run(program: &mut Program, cfg: &Cfg, spill_pool: &RegSet) -> Result<Vec<Instruction>, CodegenError> {
    let liveness = Liveness::compute(cfg);
    let intervals = interval::compute_intervals(cfg, &liveness);
    let seeded = constraints::seed(cfg, &intervals);
    let allocation = linear_scan::allocate(&intervals, &seeded);
    spill::materialize(program, cfg, &allocation, spill_pool)
}
