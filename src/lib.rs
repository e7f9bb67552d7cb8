//! Compiler back end for a small RV32IM teaching toolchain: a symbolic
//! three-address IR, CFG construction, liveness analysis, linear-scan
//! register allocation with physical-register constraints and spill
//! materialization, and a target-lowering pass down to real RV32IM assembly.
//!
//! [`pipeline::Context`] is the single entry point: build a [`ir::Program`]
//! (by hand through its builder methods, or parsed from the textual IR in
//! [`ir::text`]), then call [`pipeline::Context::compile`].

#![deny(trivial_numeric_casts, unused_extern_crates)]
#![warn(unused_import_braces)]

pub use cranelift_entity as entity;

pub mod cfg;
pub mod config;
pub mod diag;
pub mod emit;
pub mod ir;
pub mod isa;
pub mod liveness;
pub mod pipeline;
pub mod regalloc;
pub mod timing;
pub mod transform;

pub use crate::diag::CodegenError;
pub use crate::pipeline::Context;

/// Version number of this crate.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
