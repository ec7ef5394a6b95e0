//! The untyped AST graph the parser produces. Mirrors `ast::node` from
//! `parse.hpp`, but owns its children in a `Vec` rather than a raw
//! `new[]`-allocated array, since nothing here needs to cross an FFI
//! boundary.

use super::token::{SourceLoc, StrId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AstKind {
    Number,
    String,
    Symbol,
    List,
}

#[derive(Debug, Clone)]
pub enum Datum {
    Num(f64),
    StrId(StrId),
    List(Vec<Node>),
}

#[derive(Debug, Clone)]
pub struct Node {
    pub loc: SourceLoc,
    pub kind: AstKind,
    pub datum: Datum,
}

impl Node {
    pub fn number(loc: SourceLoc, num: f64) -> Self {
        Self {
            loc,
            kind: AstKind::Number,
            datum: Datum::Num(num),
        }
    }

    pub fn string(loc: SourceLoc, str_id: StrId) -> Self {
        Self {
            loc,
            kind: AstKind::String,
            datum: Datum::StrId(str_id),
        }
    }

    pub fn symbol(loc: SourceLoc, str_id: StrId) -> Self {
        Self {
            loc,
            kind: AstKind::Symbol,
            datum: Datum::StrId(str_id),
        }
    }

    pub fn list(loc: SourceLoc, children: Vec<Node>) -> Self {
        Self {
            loc,
            kind: AstKind::List,
            datum: Datum::List(children),
        }
    }

    pub fn list_length(&self) -> Option<usize> {
        match &self.datum {
            Datum::List(v) => Some(v.len()),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Node]> {
        match &self.datum {
            Datum::List(v) => Some(v),
            _ => None,
        }
    }

    /// True if this is a list whose head is the symbol named `name`.
    pub fn is_form_named(&self, name: &str, sst: &super::token::StrTable) -> bool {
        let Datum::List(children) = &self.datum else {
            return false;
        };
        match children.first() {
            Some(Node {
                kind: AstKind::Symbol,
                datum: Datum::StrId(id),
                ..
            }) => sst.name(*id) == name,
            _ => false,
        }
    }
}
