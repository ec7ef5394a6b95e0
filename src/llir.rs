//! Low-level intermediate representation the macro expander produces and
//! the compiler consumes. Tags mirror the original's LLIR node kinds
//! (`apply`, `call`, `const`, `def`, `defmacro`, `dot`, `if`, `fn`, `import`,
//! `set`, `var`, `with`); lexical/upvalue resolution is deliberately left to
//! the compiler (spec.md §4.9), so a `Var` here still just carries a symbol.

use crate::symbol::SymbolId;
use crate::value::Value;

#[derive(Debug, Clone)]
pub struct ParamSpec {
    pub required: Vec<SymbolId>,
    /// Optional parameters paired with their default-value expression.
    pub optional: Vec<(SymbolId, Llir)>,
    pub variadic: Option<SymbolId>,
}

#[derive(Debug, Clone)]
pub struct FnLlir {
    pub name: Option<SymbolId>,
    pub params: ParamSpec,
    pub body: Vec<Llir>,
}

#[derive(Debug, Clone)]
pub enum Llir {
    /// A value already fully known at expansion time (self-evaluating
    /// literal, or a quoted datum).
    Const(Value),
    Var(SymbolId),
    If(Box<Llir>, Box<Llir>, Box<Llir>),
    Def(SymbolId, Box<Llir>),
    Defmacro(SymbolId, Box<Llir>),
    Set(SymbolId, Box<Llir>),
    Fn(Box<FnLlir>),
    /// `(f a b c)`: evaluate `f` and each argument, call with a fixed arity.
    Call(Box<Llir>, Vec<Llir>),
    /// `(apply f a b rest)`: like `Call`, but the last argument is a list
    /// spread onto the end of the argument vector at call time.
    Apply(Box<Llir>, Vec<Llir>),
    /// `(. obj field)` / `(. obj (method args...))` table/member access.
    Dot(Box<Llir>, SymbolId),
    Import(String),
    /// `(with (a 1 b 2) body...)`: sequential local bindings, lowered
    /// by the compiler into stack-slot pushes rather than a closure.
    With(Vec<(SymbolId, Llir)>, Vec<Llir>),
    /// A `begin`-style sequence; only the last value escapes tail position.
    Seq(Vec<Llir>),
}
