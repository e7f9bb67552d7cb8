//! Label identifiers and the alias-unification registry.
//!
//! A label carries its own identifier, an optional name, and a global flag.
//! Two label objects may end up sharing an identifier when multiple source
//! labels land on the same instruction; rather than mutating one label object
//! into a pointer to another, `LabelTable` interns every label id in a
//! registry: every `LabelId` ever handed out remains valid, but `resolve()`
//! follows a union-find-style redirect to the canonical id an alias was
//! folded into, with path compression on lookup. This is the same "arena +
//! index, no cross-owned pointers" shape `cranelift-codegen` uses for
//! `ir::Ebb`/`ir::Value` (`ir/entities.rs`), adapted here to a mutable union
//! instead of an immutable reference.

use cranelift_entity::{entity_impl, PrimaryMap};
use std::collections::HashMap;
use core::fmt;

/// An opaque reference to a label. May be an alias of another `LabelId`;
/// call `LabelTable::resolve` to find the canonical id.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub struct LabelId(u32);
entity_impl!(LabelId, "l");

struct LabelEntry {
    name: Option<String>,
    is_global: bool,
    /// `None` if this is the canonical entry for its identifier; otherwise
    /// the id it was folded into. Path-compressed as `resolve` is called.
    redirect: Option<LabelId>,
}

/// Registry of every label created during compilation, with alias
/// unification and name disambiguation.
pub struct LabelTable {
    entries: PrimaryMap<LabelId, LabelEntry>,
    by_name: HashMap<String, LabelId>,
}

impl LabelTable {
    pub fn new() -> Self {
        LabelTable { entries: PrimaryMap::new(), by_name: HashMap::new() }
    }

    /// Allocate a new, unattached, unnamed label.
    pub fn create(&mut self) -> LabelId {
        self.entries.push(LabelEntry { name: None, is_global: false, redirect: None })
    }

    /// Follow the alias chain to the canonical id, compressing the path.
    pub fn resolve(&mut self, id: LabelId) -> LabelId {
        let mut cur = id;
        while let Some(next) = self.entries[cur].redirect {
            cur = next;
        }
        // Path compression: point every node we walked through directly at `cur`.
        let mut walk = id;
        while walk != cur {
            let next = self.entries[walk].redirect.unwrap();
            self.entries[walk].redirect = Some(cur);
            walk = next;
        }
        cur
    }

    /// Is `id` an alias of some other, still-distinguishable identifier?
    pub fn is_alias(&self, id: LabelId) -> bool {
        self.entries[id].redirect.is_some()
    }

    pub fn is_global(&mut self, id: LabelId) -> bool {
        let c = self.resolve(id);
        self.entries[c].is_global
    }

    pub fn set_global(&mut self, id: LabelId, global: bool) {
        let c = self.resolve(id);
        self.entries[c].is_global |= global;
    }

    /// Look up a label by its current display name.
    pub fn lookup_name(&self, name: &str) -> Option<LabelId> {
        self.by_name.get(name).copied()
    }

    /// The label's display name, auto-generating `l_<id>` if none was set.
    pub fn display_name(&mut self, id: LabelId) -> String {
        let c = self.resolve(id);
        match &self.entries[c].name {
            Some(n) => n.clone(),
            None => format!("l_{}", c.index()),
        }
    }

    /// *Set label name*: sanitize the proposed name (retain
    /// `[A-Za-z0-9_]`), then disambiguate against the registry with a
    /// `_<serial>` suffix if another (distinct) label already holds the
    /// chosen name.
    pub fn set_name(&mut self, id: LabelId, proposed: &str) {
        let c = self.resolve(id);
        let sanitized: String = proposed.chars().filter(|ch| ch.is_ascii_alphanumeric() || *ch == '_').collect();
        let sanitized = if sanitized.is_empty() { format!("l_{}", c.index()) } else { sanitized };

        let mut candidate = sanitized.clone();
        let mut serial = 0u32;
        loop {
            match self.by_name.get(&candidate) {
                Some(&existing) if existing != c => {
                    serial += 1;
                    candidate = format!("{}_{}", sanitized, serial);
                }
                _ => break,
            }
        }

        if let Some(old) = self.entries[c].name.take() {
            self.by_name.remove(&old);
        }
        self.by_name.insert(candidate.clone(), c);
        self.entries[c].name = Some(candidate);
    }

    /// Alias-promotion rule for a label assigned to an instruction that
    /// already has one pending: fold `new` into an alias of `pending`.
    /// Identifiers are unified (future `resolve(new)` returns `pending`'s
    /// canonical id); if both labels have names, the name belonging to the
    /// *numerically lower raw identifier* wins (preserved verbatim, not
    /// "fixed", for bit-for-bit-compatible output); the global flag is the
    /// disjunction of both.
    pub fn alias(&mut self, pending: LabelId, new: LabelId) -> LabelId {
        let p = self.resolve(pending);
        let n = self.resolve(new);
        if p == n {
            return p;
        }

        let lower_wins_name = if new.index() < pending.index() {
            self.entries[n].name.clone().or_else(|| self.entries[p].name.clone())
        } else {
            self.entries[p].name.clone().or_else(|| self.entries[n].name.clone())
        };
        let global = self.entries[p].is_global || self.entries[n].is_global;

        if let Some(old) = self.entries[p].name.take() {
            self.by_name.remove(&old);
        }
        if let Some(old) = self.entries[n].name.take() {
            self.by_name.remove(&old);
        }
        self.entries[n].redirect = Some(p);
        self.entries[p].is_global = global;
        self.entries[p].name = lower_wins_name.clone();
        if let Some(name) = lower_wins_name {
            self.by_name.insert(name, p);
        }
        p
    }
}

impl Default for LabelTable {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for LabelId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "l{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unnamed_label_gets_auto_name() {
        let mut t = LabelTable::new();
        let l = t.create();
        assert_eq!(t.display_name(l), format!("l_{}", l.index()));
    }

    #[test]
    fn name_sanitization_and_disambiguation() {
        let mut t = LabelTable::new();
        let a = t.create();
        let b = t.create();
        t.set_name(a, "loop start!");
        t.set_name(b, "loop_start");
        assert_eq!(t.display_name(a), "loopstart");
        assert_eq!(t.display_name(b), "loop_start");

        let c = t.create();
        t.set_name(c, "loop_start");
        assert_eq!(t.display_name(c), "loop_start_1");
    }

    #[test]
    fn alias_unifies_identifiers() {
        let mut t = LabelTable::new();
        let pending = t.create();
        let new = t.create();
        let canonical = t.alias(pending, new);
        assert_eq!(t.resolve(pending), canonical);
        assert_eq!(t.resolve(new), canonical);
        assert!(t.is_alias(new) || new == canonical);
    }

    #[test]
    fn alias_global_is_disjunction() {
        let mut t = LabelTable::new();
        let pending = t.create();
        let new = t.create();
        t.set_global(new, true);
        let canonical = t.alias(pending, new);
        assert!(t.is_global(canonical));
    }

    #[test]
    fn alias_name_lower_identifier_wins() {
        let mut t = LabelTable::new();
        let pending = t.create(); // lower id
        let new = t.create(); // higher id
        t.set_name(pending, "pending_name");
        t.set_name(new, "new_name");
        let canonical = t.alias(pending, new);
        assert_eq!(t.display_name(canonical), "pending_name");
    }
}
