//! Per-function compile-time scope: local slot assignment and upvalue
//! resolution. Grounded on `compile.hpp`'s `func_state`, which chains one
//! of these per lexical `fn` nesting level so a variable reference can walk
//! outward until it finds where the name is actually bound.

use crate::symbol::SymbolId;

#[derive(Debug, Clone, Copy)]
pub enum Resolved {
    Local(u8),
    Upval(u8),
    Global,
}

/// One upvalue slot a compiled function captures, in the table order the
/// heap `function_stub.upvals`/`upvals_direct` arrays store them.
pub struct UpvalDesc {
    pub name: SymbolId,
    /// `true`: captures a local slot of the *immediately* enclosing
    /// function. `false`: captures one of that function's own upvalues.
    pub direct: bool,
    pub index: u8,
}

pub struct FuncScope {
    /// Stack of lexical blocks; each holds the names bound in it, in slot
    /// order. A `with` or `fn` param list pushes a new block.
    blocks: Vec<Vec<SymbolId>>,
    pub upvals: Vec<UpvalDesc>,
}

impl FuncScope {
    pub fn new() -> Self {
        Self {
            blocks: vec![Vec::new()],
            upvals: Vec::new(),
        }
    }

    pub fn push_block(&mut self) {
        self.blocks.push(Vec::new());
    }

    pub fn pop_block(&mut self) {
        self.blocks.pop();
    }

    /// Allocate the next local slot for `name`, returning its index.
    pub fn declare_local(&mut self, name: SymbolId) -> u8 {
        let slot = self.local_count();
        self.blocks.last_mut().unwrap().push(name);
        slot
    }

    pub fn local_count(&self) -> u8 {
        self.blocks.iter().map(|b| b.len()).sum::<usize>() as u8
    }

    /// Look up `name` in this function's own locals only, innermost block
    /// first (shadowing).
    pub fn find_local(&self, name: SymbolId) -> Option<u8> {
        let mut slot = self.local_count() as usize;
        for block in self.blocks.iter().rev() {
            for &bound in block.iter().rev() {
                slot -= 1;
                if bound == name {
                    return Some(slot as u8);
                }
            }
        }
        None
    }

    /// Record a capture of `name` via a direct (`local`) or indirect
    /// (`upvalue`) reference in the enclosing function, deduplicating by
    /// name so repeated references share one upvalue cell.
    pub fn add_upval(&mut self, name: SymbolId, direct: bool, index: u8) -> u8 {
        if let Some(pos) = self.upvals.iter().position(|u| u.name == name) {
            return pos as u8;
        }
        let slot = self.upvals.len() as u8;
        self.upvals.push(UpvalDesc { name, direct, index });
        slot
    }
}

impl Default for FuncScope {
    fn default() -> Self {
        Self::new()
    }
}

/// Resolve `name` against a chain of enclosing scopes, innermost (`self`)
/// first, threading upvalue captures outward as needed. `scopes[0]` is the
/// innermost (current) function; `scopes[1..]` are its lexical ancestors.
pub fn resolve(scopes: &mut [FuncScope], name: SymbolId) -> Resolved {
    if let Some(slot) = scopes[0].find_local(name) {
        return Resolved::Local(slot);
    }
    if scopes.len() == 1 {
        return Resolved::Global;
    }
    match resolve(&mut scopes[1..], name) {
        Resolved::Local(parent_slot) => {
            let slot = scopes[0].add_upval(name, true, parent_slot);
            Resolved::Upval(slot)
        }
        Resolved::Upval(parent_upval) => {
            let slot = scopes[0].add_upval(name, false, parent_upval);
            Resolved::Upval(slot)
        }
        Resolved::Global => Resolved::Global,
    }
}
