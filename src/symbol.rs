//! Symbol interning: name <-> id mapping, plus gensym support.
//!
//! Mirrors the two-way lookup `luars::gc::string_interner::StringInterner`
//! gives strings, but for symbols: interning is permanent (no GC), and ids
//! are handed out from both ends of the `u32` space so that named symbols
//! (low ids) and generated symbols (high ids) can never collide.

use ahash::RandomState;
use std::collections::HashMap;

pub type SymbolId = u32;

/// `#gensym:<n>` is the display form of an unnamed gensym; see spec.md §4.2.
const GENSYM_PREFIX: &str = "#gensym:";

pub struct SymbolTable {
    by_name: HashMap<String, SymbolId, RandomState>,
    by_id: Vec<String>,
    next_intern: u32,
    next_gensym: u32,
    gensym_names: HashMap<SymbolId, String, RandomState>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self {
            by_name: HashMap::with_hasher(RandomState::new()),
            by_id: Vec::new(),
            next_intern: 0,
            next_gensym: u32::MAX,
            gensym_names: HashMap::with_hasher(RandomState::new()),
        }
    }

    /// Intern `name`, returning its existing id if present or allocating the
    /// next free one starting from 0.
    pub fn intern(&mut self, name: &str) -> SymbolId {
        if let Some(&id) = self.by_name.get(name) {
            return id;
        }
        let id = self.next_intern;
        assert!(
            id < self.next_gensym,
            "symbol table exhausted: intern/gensym counters converged"
        );
        self.next_intern += 1;
        self.by_name.insert(name.to_string(), id);
        self.by_id.push(name.to_string());
        id
    }

    /// Allocate a fresh, unnamed symbol id from the top of the `u32` range.
    pub fn gensym(&mut self) -> SymbolId {
        assert!(
            self.next_gensym > self.next_intern,
            "symbol table exhausted: intern/gensym counters converged"
        );
        let id = self.next_gensym;
        self.next_gensym -= 1;
        let name = format!("{}{}", GENSYM_PREFIX, id);
        self.gensym_names.insert(id, name);
        id
    }

    /// Name of `id`, or the empty string if `id` is unknown (spec.md §4.2).
    pub fn symbol_name(&self, id: SymbolId) -> &str {
        if (id as usize) < self.by_id.len() {
            &self.by_id[id as usize]
        } else if let Some(name) = self.gensym_names.get(&id) {
            name
        } else {
            ""
        }
    }

    pub fn is_interned_name(&self, id: SymbolId) -> bool {
        (id as usize) < self.by_id.len()
    }
}

impl Default for SymbolTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn intern_round_trips() {
        let mut t = SymbolTable::new();
        let a = t.intern("foo");
        let b = t.intern("foo");
        assert_eq!(a, b);
        assert_eq!(t.symbol_name(a), "foo");
    }

    #[test]
    fn distinct_names_get_distinct_ids() {
        let mut t = SymbolTable::new();
        let a = t.intern("foo");
        let b = t.intern("bar");
        assert_ne!(a, b);
    }

    #[test]
    fn gensym_ids_never_collide_with_interned() {
        let mut t = SymbolTable::new();
        let named = t.intern("x");
        let gs = t.gensym();
        assert_ne!(named, gs);
        assert!(gs > named);
        assert!(t.symbol_name(gs).starts_with("#gensym:"));
    }

    #[test]
    fn unknown_id_has_empty_name() {
        let t = SymbolTable::new();
        assert_eq!(t.symbol_name(12345), "");
    }
}
