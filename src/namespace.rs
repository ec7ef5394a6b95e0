//! Global environment and namespaces. Mirrors the original's dotted-path
//! namespace tree (`a.b.c` is a sub-namespace of `a.b`), reimplemented over
//! the symbol table rather than raw C strings: a namespace id is the
//! `SymbolId` of its full dotted path, and every top-level binding lives in
//! one flat global slot array the VM indexes directly (`OP_GETGLOBAL`).

use crate::symbol::{SymbolId, SymbolTable};
use crate::value::Value;
use ahash::RandomState;
use std::collections::HashMap;

pub type GlobalSlot = u32;

pub struct Namespace {
    pub id: SymbolId,
    pub defs: HashMap<SymbolId, GlobalSlot, RandomState>,
}

impl Namespace {
    fn new(id: SymbolId) -> Self {
        Self {
            id,
            defs: HashMap::with_hasher(RandomState::new()),
        }
    }
}

/// Owns every namespace and the flat global value array they index into.
pub struct GlobalEnv {
    namespaces: HashMap<SymbolId, Namespace, RandomState>,
    pub globals: Vec<Value>,
    pub root_ns: SymbolId,
}

impl GlobalEnv {
    pub fn new(sst: &mut SymbolTable) -> Self {
        let root_ns = sst.intern("");
        let mut namespaces = HashMap::with_hasher(RandomState::new());
        namespaces.insert(root_ns, Namespace::new(root_ns));
        Self {
            namespaces,
            globals: Vec::new(),
            root_ns,
        }
    }

    /// `add_ns`: create a namespace if it doesn't already exist.
    pub fn add_ns(&mut self, ns_id: SymbolId) -> &mut Namespace {
        self.namespaces.entry(ns_id).or_insert_with(|| Namespace::new(ns_id))
    }

    pub fn get_ns(&self, ns_id: SymbolId) -> Option<&Namespace> {
        self.namespaces.get(&ns_id)
    }

    pub fn get_ns_mut(&mut self, ns_id: SymbolId) -> Option<&mut Namespace> {
        self.namespaces.get_mut(&ns_id)
    }

    /// `push_global`: bind `name` in `ns_id` to a freshly allocated slot
    /// holding `init`, returning the slot. A rebinding of an existing name
    /// reuses its slot (`def` is idempotent on the binding, not the value).
    pub fn push_global(&mut self, ns_id: SymbolId, name: SymbolId, init: Value) -> GlobalSlot {
        let ns = self.add_ns(ns_id);
        if let Some(&slot) = ns.defs.get(&name) {
            self.globals[slot as usize] = init;
            return slot;
        }
        let slot = self.globals.len() as GlobalSlot;
        self.globals.push(init);
        self.add_ns(ns_id).defs.insert(name, slot);
        slot
    }

    pub fn set_global(&mut self, slot: GlobalSlot, v: Value) {
        self.globals[slot as usize] = v;
    }

    /// `resolve_sym`: look up `name` starting in `ns_id`, then walking to
    /// its parent namespaces (split at `.`) up to the root.
    pub fn resolve_sym(&self, ns_id: SymbolId, name: SymbolId, sst: &SymbolTable) -> Option<GlobalSlot> {
        let mut cur = ns_id;
        loop {
            if let Some(ns) = self.namespaces.get(&cur) {
                if let Some(&slot) = ns.defs.get(&name) {
                    return Some(slot);
                }
            }
            if cur == self.root_ns {
                return None;
            }
            let path = sst.symbol_name(cur);
            match path.rfind('.') {
                Some(idx) => {
                    let parent_name = &path[..idx];
                    cur = match find_interned(sst, parent_name) {
                        Some(id) => id,
                        None => return None,
                    };
                }
                None => cur = self.root_ns,
            }
        }
    }

    /// `copy_defs`: copy every binding from `src` into `dst`, used by
    /// `import` to splice a module's public surface into the importer.
    pub fn copy_defs(&mut self, src: SymbolId, dst: SymbolId) {
        let src_defs: Vec<(SymbolId, GlobalSlot)> = match self.namespaces.get(&src) {
            Some(ns) => ns.defs.iter().map(|(&k, &v)| (k, v)).collect(),
            None => return,
        };
        let dst_ns = self.add_ns(dst);
        for (name, slot) in src_defs {
            dst_ns.defs.insert(name, slot);
        }
    }
}

fn find_interned(sst: &SymbolTable, name: &str) -> Option<SymbolId> {
    // Namespace ids are always names the reader already interned while
    // parsing a dotted symbol, so a miss here means "no such namespace".
    for id in 0..(sst_len(sst) as u32) {
        if sst.symbol_name(id) == name {
            return Some(id);
        }
    }
    None
}

fn sst_len(sst: &SymbolTable) -> usize {
    // There is no direct accessor for the interned-name count; walk until
    // `is_interned_name` first reports false.
    let mut n = 0u32;
    while sst.is_interned_name(n) {
        n += 1;
    }
    n as usize
}

/// `ns_id_destruct`: split a dotted namespace path into (parent, leaf).
/// `None` if `ns_id` names the root.
pub fn ns_id_destruct(ns_id: SymbolId, sst: &mut SymbolTable) -> Option<(SymbolId, String)> {
    let path = sst.symbol_name(ns_id).to_string();
    let idx = path.rfind('.')?;
    let parent = sst.intern(&path[..idx]);
    let leaf = path[idx + 1..].to_string();
    Some((parent, leaf))
}

/// `is_subns`: whether `child`'s dotted path has `parent`'s as a proper
/// prefix ending on a `.` boundary.
pub fn is_subns(parent: &str, child: &str) -> bool {
    if parent.is_empty() {
        return !child.is_empty();
    }
    child.len() > parent.len() && child.starts_with(parent) && child.as_bytes()[parent.len()] == b'.'
}

/// `subns_rel_path`: `child`'s path with `parent`'s prefix stripped.
pub fn subns_rel_path<'a>(parent: &str, child: &'a str) -> Option<&'a str> {
    if !is_subns(parent, child) {
        return None;
    }
    if parent.is_empty() {
        Some(child)
    } else {
        Some(&child[parent.len() + 1..])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_and_resolve_global() {
        let mut sst = SymbolTable::new();
        let mut env = GlobalEnv::new(&mut sst);
        let ns = sst.intern("user");
        let name = sst.intern("x");
        env.add_ns(ns);
        let slot = env.push_global(ns, name, Value::num(42.0));
        assert_eq!(env.resolve_sym(ns, name, &sst), Some(slot));
        assert_eq!(env.globals[slot as usize].as_num(), Some(42.0));
    }

    #[test]
    fn resolve_walks_up_to_parent_namespace() {
        let mut sst = SymbolTable::new();
        let mut env = GlobalEnv::new(&mut sst);
        let parent = sst.intern("app");
        let child = sst.intern("app.util");
        let name = sst.intern("helper");
        env.push_global(parent, name, Value::yes());
        assert_eq!(env.resolve_sym(child, name, &sst), Some(0));
    }

    #[test]
    fn is_subns_requires_dot_boundary() {
        assert!(is_subns("app", "app.util"));
        assert!(!is_subns("app", "application"));
        assert_eq!(subns_rel_path("app", "app.util.io"), Some("util.io"));
    }

    #[test]
    fn ns_id_destruct_splits_leaf() {
        let mut sst = SymbolTable::new();
        let full = sst.intern("app.util");
        let (parent, leaf) = ns_id_destruct(full, &mut sst).unwrap();
        assert_eq!(sst.symbol_name(parent), "app");
        assert_eq!(leaf, "util");
    }
}
