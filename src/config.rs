//! Compilation flags: the knobs the command-line driver exposes and the
//! pipeline consults.

use crate::ir::reg::RegSet;
use crate::isa;

/// Builder for a `Flags` set. Mirrors the small, explicit settings-builder
/// shape common in this crate's ambient tooling rather than a struct with
/// public fields callers mutate directly, so adding a flag later doesn't
/// break existing call sites.
pub struct FlagsBuilder {
    enable_verifier: bool,
    spill_pool_size: usize,
}

impl FlagsBuilder {
    pub fn new() -> Self {
        FlagsBuilder { enable_verifier: cfg!(feature = "verifier"), spill_pool_size: 3 }
    }

    pub fn enable_verifier(mut self, enable: bool) -> Self {
        self.enable_verifier = enable;
        self
    }

    pub fn spill_pool_size(mut self, size: usize) -> Self {
        self.spill_pool_size = size;
        self
    }

    pub fn finish(self) -> Flags {
        Flags { enable_verifier: self.enable_verifier, spill_pool_size: self.spill_pool_size }
    }
}

impl Default for FlagsBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Resolved compilation flags.
#[derive(Clone)]
pub struct Flags {
    enable_verifier: bool,
    spill_pool_size: usize,
}

impl Flags {
    pub fn builder() -> FlagsBuilder {
        FlagsBuilder::new()
    }

    pub fn enable_verifier(&self) -> bool {
        self.enable_verifier
    }

    /// The reserved spill-scratch pool, truncated to `spill_pool_size`
    /// registers (default 3, the ISA's full scratch reservation).
    pub fn spill_pool(&self) -> RegSet {
        let full = isa::default_spill_pool();
        full.iter().take(self.spill_pool_size.max(1)).collect()
    }
}

impl Default for Flags {
    fn default() -> Self {
        FlagsBuilder::new().finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_spill_pool_has_three_registers() {
        assert_eq!(Flags::default().spill_pool().len(), 3);
    }

    #[test]
    fn builder_overrides_defaults() {
        let flags = Flags::builder().enable_verifier(true).spill_pool_size(1).finish();
        assert!(flags.enable_verifier());
        assert_eq!(flags.spill_pool().len(), 1);
    }
}
