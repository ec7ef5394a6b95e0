//! Macro expander: walks the reader's `Node` tree, rewrites macro calls by
//! re-entering the VM (through [`ExpandCtx`]), and lowers everything else
//! straight to [`crate::llir::Llir`]. Grounded on `expand.hpp`'s single
//! recursive `expand` pass plus its `quote`/`quasiquote` datum builder.
//!
//! The expander needs to both read/mutate VM state (symbol table, heap) and
//! re-enter the VM to call a macro function — the same object on both sides
//! of the call. Rather than split that object into aliasing `&mut`
//! borrows (unsound: a live borrow of e.g. the heap while a macro call
//! re-enters through a second handle to the same VM), every access goes
//! through one `&mut C` the whole pass borrows for its lifetime, the same
//! decoupling [`crate::gc::Tracer`] gives the collector.

use crate::error::{FnError, FnErrorKind, FnResult};
use crate::llir::{FnLlir, Llir, ParamSpec};
use crate::reader::{AstKind, Datum, Node, SourceLoc, StrId};
use crate::symbol::SymbolId;
use crate::value::{Tag, Value};

/// Everything the expander needs from the VM: symbol/string interning,
/// string/cons allocation, the live macro table, and the ability to call a
/// macro function by re-entering the VM.
pub trait ExpandCtx {
    fn intern(&mut self, name: &str) -> SymbolId;
    /// A fresh symbol with no source-level name, for hygienic temporaries
    /// (`and`/`or` must not re-evaluate their non-last operands).
    fn gensym(&mut self) -> SymbolId;
    fn symbol_name(&self, id: SymbolId) -> String;
    fn strtab_name(&self, id: StrId) -> String;
    fn strtab_intern(&mut self, name: &str) -> StrId;
    fn alloc_string(&mut self, bytes: &[u8]) -> Value;
    fn alloc_cons(&mut self, head: Value, tail: Value) -> Value;
    fn cons_parts(&self, v: Value) -> (Value, Value);
    fn lookup_macro(&self, sym: SymbolId) -> Option<Value>;
    fn call_macro(&mut self, macro_fn: Value, args: Vec<Value>) -> FnResult<Value>;
}

pub struct Expander<'a, C: ExpandCtx> {
    pub ctx: &'a mut C,
    pub file: String,
}

impl<'a, C: ExpandCtx> Expander<'a, C> {
    fn err(&self, loc: SourceLoc, kind: FnErrorKind, msg: impl Into<String>) -> FnError {
        FnError::new(kind, loc, self.file.clone(), msg)
    }

    fn sym_at(&mut self, node: &Node) -> FnResult<SymbolId> {
        match &node.datum {
            Datum::StrId(id) if node.kind == AstKind::Symbol => {
                let name = self.ctx.strtab_name(*id);
                Ok(self.ctx.intern(&name))
            }
            _ => Err(self.err(node.loc, FnErrorKind::Macroexpansion, "expected a symbol")),
        }
    }

    fn head_name(&self, node: &Node) -> Option<String> {
        let list = node.as_list()?;
        let head = list.first()?;
        match &head.datum {
            Datum::StrId(id) if head.kind == AstKind::Symbol => Some(self.ctx.strtab_name(*id)),
            _ => None,
        }
    }

    /// Expand a single top-level form into `Llir`.
    pub fn expand(&mut self, node: &Node) -> FnResult<Llir> {
        match node.kind {
            AstKind::Number => {
                let Datum::Num(n) = node.datum else { unreachable!() };
                Ok(Llir::Const(Value::num(n)))
            }
            AstKind::String => {
                let Datum::StrId(id) = node.datum else { unreachable!() };
                let bytes = self.ctx.strtab_name(id).into_bytes();
                Ok(Llir::Const(self.ctx.alloc_string(&bytes)))
            }
            AstKind::Symbol => {
                let sym = self.sym_at(node)?;
                Ok(Llir::Var(sym))
            }
            AstKind::List => self.expand_list(node),
        }
    }

    fn expand_list(&mut self, node: &Node) -> FnResult<Llir> {
        let list = node.as_list().unwrap();
        if list.is_empty() {
            return Ok(Llir::Const(Value::empty()));
        }
        if let Some(name) = self.head_name(node) {
            match name.as_str() {
                "quote" => return self.expand_quote(&list[1]),
                "quasiquote" => return self.expand_quasiquote(&list[1], 1),
                "if" => return self.expand_if(node.loc, &list[1..]),
                "def" => return self.expand_def(node.loc, &list[1..]),
                "defmacro" => return self.expand_defmacro(node.loc, &list[1..]),
                "set!" => return self.expand_set(node.loc, &list[1..]),
                "fn" => return self.expand_fn(node.loc, None, &list[1..]),
                "apply" => return self.expand_apply(node.loc, &list[1..]),
                "import" => return self.expand_import(node.loc, &list[1..]),
                "with" => return self.expand_with(node.loc, &list[1..]),
                "begin" | "do" => return self.expand_do(node.loc, &list[1..]),
                "." => return self.expand_dot(node.loc, &list[1..]),
                "defn" => return self.expand_defn(node.loc, &list[1..]),
                "letfn" => return self.expand_letfn(node.loc, &list[1..]),
                "and" => return self.expand_and(node.loc, &list[1..]),
                "or" => return self.expand_or(node.loc, &list[1..]),
                "cond" => return self.expand_cond(node.loc, &list[1..]),
                "dollar-fn" => {
                    if list.len() != 2 {
                        return Err(self.err(node.loc, FnErrorKind::Macroexpansion, "dollar-fn takes exactly one body form"));
                    }
                    return self.expand_dollar_fn(&list[1]);
                }
                "let" => {
                    return Err(self.err(
                        node.loc,
                        FnErrorKind::Macroexpansion,
                        "let is only legal as the first form in a do/begin body",
                    ))
                }
                _ => {
                    let head_sym = self.ctx.intern(&name);
                    if let Some(mac) = self.ctx.lookup_macro(head_sym) {
                        return self.expand_macro_call(node, mac, &list[1..]);
                    }
                }
            }
        }
        let callee = self.expand(&list[0])?;
        let args = list[1..].iter().map(|n| self.expand(n)).collect::<FnResult<Vec<_>>>()?;
        Ok(Llir::Call(Box::new(callee), args))
    }

    fn expand_macro_call(&mut self, node: &Node, mac: Value, arg_nodes: &[Node]) -> FnResult<Llir> {
        let args = arg_nodes.iter().map(|n| self.node_to_datum_value(n)).collect::<FnResult<Vec<_>>>()?;
        let expanded = self.ctx.call_macro(mac, args)?;
        let expanded_node = self.datum_value_to_node(expanded, node.loc)?;
        self.expand(&expanded_node)
    }

    fn expand_if(&mut self, loc: SourceLoc, rest: &[Node]) -> FnResult<Llir> {
        if rest.len() < 2 || rest.len() > 3 {
            return Err(self.err(loc, FnErrorKind::Macroexpansion, "if takes a test, then, and optional else"));
        }
        let test = self.expand(&rest[0])?;
        let then = self.expand(&rest[1])?;
        let els = if rest.len() == 3 { self.expand(&rest[2])? } else { Llir::Const(Value::nil()) };
        Ok(Llir::If(Box::new(test), Box::new(then), Box::new(els)))
    }

    fn expand_def(&mut self, loc: SourceLoc, rest: &[Node]) -> FnResult<Llir> {
        if rest.len() != 2 {
            return Err(self.err(loc, FnErrorKind::Macroexpansion, "def takes a name and a value"));
        }
        let name = self.sym_at(&rest[0])?;
        let value = self.expand(&rest[1])?;
        Ok(Llir::Def(name, Box::new(value)))
    }

    fn expand_defmacro(&mut self, loc: SourceLoc, rest: &[Node]) -> FnResult<Llir> {
        if rest.len() < 2 {
            return Err(self.err(loc, FnErrorKind::Macroexpansion, "defmacro takes a name and a fn form"));
        }
        let name = self.sym_at(&rest[0])?;
        let fn_llir = self.expand_fn(loc, Some(name), &rest[1..])?;
        Ok(Llir::Defmacro(name, Box::new(fn_llir)))
    }

    fn expand_set(&mut self, loc: SourceLoc, rest: &[Node]) -> FnResult<Llir> {
        if rest.len() != 2 {
            return Err(self.err(loc, FnErrorKind::Macroexpansion, "set! takes a name and a value"));
        }
        let name = self.sym_at(&rest[0])?;
        let value = self.expand(&rest[1])?;
        Ok(Llir::Set(name, Box::new(value)))
    }

    fn expand_fn(&mut self, loc: SourceLoc, name: Option<SymbolId>, rest: &[Node]) -> FnResult<Llir> {
        let [params_node, body @ ..] = rest else {
            return Err(self.err(loc, FnErrorKind::Macroexpansion, "fn takes a parameter list and a body"));
        };
        let params = self.parse_params(params_node)?;
        let body = self.expand_body(body)?;
        Ok(Llir::Fn(Box::new(FnLlir { name, params, body })))
    }

    /// A multi-form body (a `fn`/`defn` body or a `do`/`begin` body): a
    /// leading `(let x1 v1 …)` opens a scope extending over the rest of the
    /// body (spec.md §4.9); a bare `let` anywhere else is rejected by
    /// `expand_list`'s own dispatch before it ever reaches here.
    fn expand_body(&mut self, rest: &[Node]) -> FnResult<Vec<Llir>> {
        if rest.is_empty() {
            return Ok(Vec::new());
        }
        if self.head_name(&rest[0]).as_deref() == Some("let") {
            let let_list = rest[0].as_list().unwrap();
            let bindings = self.parse_flat_bindings(rest[0].loc, &let_list[1..])?;
            let body = self.expand_body(&rest[1..])?;
            return Ok(vec![Llir::With(bindings, body)]);
        }
        rest.iter().map(|n| self.expand(n)).collect()
    }

    /// `req1 req2 … (opt1 init1) … & rest` (spec.md §4.9/§6): zero or more
    /// positional symbols, then zero or more `(name init)` pairs — an
    /// optional parameter is recognized structurally, by being list-shaped,
    /// not by a preceding keyword — then an optional bare `&` followed by a
    /// rest parameter name. Grounded on `expander::expand_params` in
    /// `expand.cpp`, minus its `:&` rest-table half (no surface form in this
    /// grammar needs a keyword-argument table).
    fn parse_params(&mut self, node: &Node) -> FnResult<ParamSpec> {
        let items = node
            .as_list()
            .ok_or_else(|| self.err(node.loc, FnErrorKind::Macroexpansion, "expected a parameter list"))?;
        let mut required = Vec::new();
        let mut optional = Vec::new();
        let mut variadic = None;
        let mut i = 0;
        while i < items.len() && self.is_bare_symbol(&items[i]) && !self.head_name_is(&items[i], "&") {
            required.push(self.sym_at(&items[i])?);
            i += 1;
        }
        while i < items.len() {
            let Some(pair) = items[i].as_list() else { break };
            if pair.len() != 2 {
                return Err(self.err(items[i].loc, FnErrorKind::Macroexpansion, "malformed optional parameter"));
            }
            let pname = self.sym_at(&pair[0])?;
            let default = self.expand(&pair[1])?;
            optional.push((pname, default));
            i += 1;
        }
        if i < items.len() {
            if !self.head_name_is(&items[i], "&") {
                return Err(self.err(items[i].loc, FnErrorKind::Macroexpansion, "expected & before a rest parameter"));
            }
            i += 1;
            if i >= items.len() {
                return Err(self.err(node.loc, FnErrorKind::Macroexpansion, "& must be followed by a rest parameter name"));
            }
            variadic = Some(self.sym_at(&items[i])?);
            i += 1;
        }
        if i != items.len() {
            return Err(self.err(node.loc, FnErrorKind::Macroexpansion, "malformed parameter list"));
        }
        Ok(ParamSpec { required, optional, variadic })
    }

    fn is_bare_symbol(&self, node: &Node) -> bool {
        matches!(&node.datum, Datum::StrId(_) if node.kind == AstKind::Symbol)
    }

    fn head_name_is(&self, node: &Node, name: &str) -> bool {
        matches!(&node.datum, Datum::StrId(id) if node.kind == AstKind::Symbol && self.ctx.strtab_name(*id) == name)
    }

    fn expand_apply(&mut self, loc: SourceLoc, rest: &[Node]) -> FnResult<Llir> {
        if rest.is_empty() {
            return Err(self.err(loc, FnErrorKind::Macroexpansion, "apply takes a function and arguments"));
        }
        let f = self.expand(&rest[0])?;
        let args = rest[1..].iter().map(|n| self.expand(n)).collect::<FnResult<Vec<_>>>()?;
        Ok(Llir::Apply(Box::new(f), args))
    }

    fn expand_import(&mut self, loc: SourceLoc, rest: &[Node]) -> FnResult<Llir> {
        let [path_node] = rest else {
            return Err(self.err(loc, FnErrorKind::Macroexpansion, "import takes one namespace path"));
        };
        Ok(Llir::Import(self.import_path(path_node)?))
    }

    /// `(import sym)` takes the bare symbol's own name as the path; `(import
    /// (. a b c))` joins the dotted segments with `/`, matching the
    /// `a/b/c` namespace-path convention (spec.md §4.7, §6).
    fn import_path(&mut self, node: &Node) -> FnResult<String> {
        if self.head_name(node).as_deref() == Some(".") {
            let list = node.as_list().unwrap();
            let segs = list[1..]
                .iter()
                .map(|n| self.sym_at(n).map(|s| self.ctx.symbol_name(s)))
                .collect::<FnResult<Vec<_>>>()?;
            return Ok(segs.join("/"));
        }
        let sym = self.sym_at(node)?;
        Ok(self.ctx.symbol_name(sym))
    }

    /// `(with (x1 v1 x2 v2 …) body…)`: a flat name/value binding list, the
    /// same shape `let` uses (spec.md §6; `expand_with` in `expand.cpp`).
    fn expand_with(&mut self, loc: SourceLoc, rest: &[Node]) -> FnResult<Llir> {
        let [bindings_node, body @ ..] = rest else {
            return Err(self.err(loc, FnErrorKind::Macroexpansion, "with takes a binding list and a body"));
        };
        let items = bindings_node
            .as_list()
            .ok_or_else(|| self.err(bindings_node.loc, FnErrorKind::Macroexpansion, "expected a binding list"))?;
        let bindings = self.parse_flat_bindings(bindings_node.loc, items)?;
        let body = body.iter().map(|n| self.expand(n)).collect::<FnResult<Vec<_>>>()?;
        Ok(Llir::With(bindings, body))
    }

    /// `(defn name params body...)` => `(def name (fn params body...))`.
    fn expand_defn(&mut self, loc: SourceLoc, rest: &[Node]) -> FnResult<Llir> {
        let [name_node, params_node, body @ ..] = rest else {
            return Err(self.err(loc, FnErrorKind::Macroexpansion, "defn takes a name, a parameter list, and a body"));
        };
        let name = self.sym_at(name_node)?;
        let mut fn_rest = Vec::with_capacity(1 + body.len());
        fn_rest.push(params_node.clone());
        fn_rest.extend(body.iter().cloned());
        let fn_llir = self.expand_fn(loc, Some(name), &fn_rest)?;
        Ok(Llir::Def(name, Box::new(fn_llir)))
    }

    /// `do` sequences its body like `begin`, except a `(let x1 v1 …)` as the
    /// first form opens a lexical scope extending over the remainder of the
    /// body (spec.md §6); a bare `let` anywhere else is rejected in
    /// `expand_list`.
    fn expand_do(&mut self, _loc: SourceLoc, rest: &[Node]) -> FnResult<Llir> {
        Ok(Llir::Seq(self.expand_body(rest)?))
    }

    /// `(let x1 v1 x2 v2 …)`: a flat, sequentially-scoped binding list (the
    /// same scoping `with` gives its parenthesized pairs).
    fn parse_flat_bindings(&mut self, loc: SourceLoc, items: &[Node]) -> FnResult<Vec<(SymbolId, Llir)>> {
        if items.len() % 2 != 0 {
            return Err(self.err(loc, FnErrorKind::Macroexpansion, "let requires an even number of name/value forms"));
        }
        let mut out = Vec::with_capacity(items.len() / 2);
        for pair in items.chunks(2) {
            let name = self.sym_at(&pair[0])?;
            let value = self.expand(&pair[1])?;
            out.push((name, value));
        }
        Ok(out)
    }

    /// `(letfn name params body...)`: like a single `let` binding, but the
    /// name is bound to `nil` first and then `set!` to the function, so the
    /// function body can refer to its own name as a captured upvalue.
    fn expand_letfn(&mut self, loc: SourceLoc, rest: &[Node]) -> FnResult<Llir> {
        let [name_node, params_node, body @ ..] = rest else {
            return Err(self.err(loc, FnErrorKind::Macroexpansion, "letfn takes a name, a parameter list, and a body"));
        };
        let name = self.sym_at(name_node)?;
        let mut fn_rest = Vec::with_capacity(1 + body.len());
        fn_rest.push(params_node.clone());
        fn_rest.extend(body.iter().cloned());
        let fn_llir = self.expand_fn(loc, Some(name), &fn_rest)?;
        Ok(Llir::With(
            vec![(name, Llir::Const(Value::nil()))],
            vec![Llir::Set(name, Box::new(fn_llir)), Llir::Var(name)],
        ))
    }

    /// `(and a b c)` => `(with (t a) (if t (with (t b) (if t (and-tail c) t)) t))`,
    /// built directly as nested `Llir::With`/`If` so `a`/`b`/... are each
    /// evaluated exactly once.
    fn expand_and(&mut self, _loc: SourceLoc, rest: &[Node]) -> FnResult<Llir> {
        if rest.is_empty() {
            return Ok(Llir::Const(Value::yes()));
        }
        let mut items = rest.iter().map(|n| self.expand(n)).collect::<FnResult<Vec<_>>>()?;
        let mut acc = items.pop().unwrap();
        for item in items.into_iter().rev() {
            let tmp = self.ctx.gensym();
            acc = Llir::With(vec![(tmp, item)], vec![Llir::If(Box::new(Llir::Var(tmp)), Box::new(acc), Box::new(Llir::Var(tmp)))]);
        }
        Ok(acc)
    }

    /// `(or a b c)`: same shape as `and`, with the branches swapped.
    fn expand_or(&mut self, _loc: SourceLoc, rest: &[Node]) -> FnResult<Llir> {
        if rest.is_empty() {
            return Ok(Llir::Const(Value::no()));
        }
        let mut items = rest.iter().map(|n| self.expand(n)).collect::<FnResult<Vec<_>>>()?;
        let mut acc = items.pop().unwrap();
        for item in items.into_iter().rev() {
            let tmp = self.ctx.gensym();
            acc = Llir::With(vec![(tmp, item)], vec![Llir::If(Box::new(Llir::Var(tmp)), Box::new(Llir::Var(tmp)), Box::new(acc))]);
        }
        Ok(acc)
    }

    /// `(cond k1 v1 k2 v2 …)` => nested `if`; no matching clause yields `nil`.
    fn expand_cond(&mut self, loc: SourceLoc, rest: &[Node]) -> FnResult<Llir> {
        if rest.len() % 2 != 0 {
            return Err(self.err(loc, FnErrorKind::Macroexpansion, "cond requires an even number of test/value forms"));
        }
        let mut acc = Llir::Const(Value::nil());
        for pair in rest.chunks(2).rev() {
            let test = self.expand(&pair[0])?;
            let value = self.expand(&pair[1])?;
            acc = Llir::If(Box::new(test), Box::new(value), Box::new(acc));
        }
        Ok(acc)
    }

    /// `(dollar-fn body)`: an `fn` whose positional params are `$0 … $N` (N =
    /// the highest positional dollar-symbol referenced in `body`), with a
    /// bare `$` rewritten to `$0` before expansion.
    fn expand_dollar_fn(&mut self, body: &Node) -> FnResult<Llir> {
        let mut names = Vec::new();
        self.collect_dollar_names(body, &mut names);
        let mut max_idx: Option<usize> = None;
        let mut saw_bare = false;
        for n in &names {
            if n == "$" {
                saw_bare = true;
            } else if let Ok(idx) = n[1..].parse::<usize>() {
                max_idx = Some(max_idx.map_or(idx, |m: usize| m.max(idx)));
            }
        }
        if saw_bare {
            max_idx = Some(max_idx.map_or(0, |m| m.max(0)));
        }
        let required = match max_idx {
            Some(n) => (0..=n).map(|i| self.ctx.intern(&format!("${i}"))).collect(),
            None => Vec::new(),
        };
        let rewritten = self.rewrite_bare_dollar(body);
        let body_llir = self.expand(&rewritten)?;
        let params = ParamSpec { required, optional: Vec::new(), variadic: None };
        Ok(Llir::Fn(Box::new(FnLlir { name: None, params, body: vec![body_llir] })))
    }

    fn collect_dollar_names(&self, node: &Node, out: &mut Vec<String>) {
        match &node.datum {
            Datum::StrId(id) if node.kind == AstKind::Symbol => {
                let name = self.ctx.strtab_name(*id);
                if name.starts_with('$') {
                    out.push(name);
                }
            }
            Datum::List(children) => {
                for c in children {
                    self.collect_dollar_names(c, out);
                }
            }
            _ => {}
        }
    }

    fn rewrite_bare_dollar(&mut self, node: &Node) -> Node {
        match &node.datum {
            Datum::StrId(id) if node.kind == AstKind::Symbol => {
                let name = self.ctx.strtab_name(*id);
                if name == "$" {
                    let new_id = self.ctx.strtab_intern("$0");
                    return Node::symbol(node.loc, new_id);
                }
                node.clone()
            }
            Datum::List(children) => Node::list(node.loc, children.iter().map(|c| self.rewrite_bare_dollar(c)).collect()),
            _ => node.clone(),
        }
    }

    fn expand_dot(&mut self, loc: SourceLoc, rest: &[Node]) -> FnResult<Llir> {
        let [obj_node, field_node] = rest else {
            return Err(self.err(loc, FnErrorKind::Macroexpansion, "(. obj field) takes exactly two forms"));
        };
        let obj = self.expand(obj_node)?;
        let field = self.sym_at(field_node)?;
        Ok(Llir::Dot(Box::new(obj), field))
    }

    fn expand_quote(&mut self, node: &Node) -> FnResult<Llir> {
        Ok(Llir::Const(self.node_to_datum_value(node)?))
    }

    fn expand_quasiquote(&mut self, node: &Node, depth: u32) -> FnResult<Llir> {
        match node.kind {
            AstKind::List => {
                let items = node.as_list().unwrap();
                let head = self.head_name(node);
                if head.as_deref() == Some("unquote") {
                    if depth == 1 {
                        return self.expand(&items[1]);
                    }
                    let inner = self.expand_quasiquote(&items[1], depth - 1)?;
                    return self.wrap_quote_call("unquote", inner);
                }
                if head.as_deref() == Some("quasiquote") {
                    let inner = self.expand_quasiquote(&items[1], depth + 1)?;
                    return self.wrap_quote_call("quasiquote", inner);
                }
                let mut parts = Vec::new();
                for item in items {
                    if self.head_name(item).as_deref() == Some("unquote-splicing") && depth == 1 {
                        let spliced = self.expand(&item.as_list().unwrap()[1])?;
                        parts.push((true, spliced));
                    } else {
                        parts.push((false, self.expand_quasiquote(item, depth)?));
                    }
                }
                Ok(self.build_qq_list(parts))
            }
            _ => Ok(Llir::Const(self.node_to_datum_value(node)?)),
        }
    }

    fn wrap_quote_call(&mut self, name: &str, inner: Llir) -> FnResult<Llir> {
        let sym = self.ctx.intern(name);
        Ok(Llir::Call(Box::new(Llir::Var(sym)), vec![inner]))
    }

    /// Lower a quasiquote's non-spliced/spliced part list to a runtime
    /// `list`/`append` construction (the concrete calls the compiler emits
    /// for `Llir::Call` with these builtins' names).
    fn build_qq_list(&mut self, parts: Vec<(bool, Llir)>) -> Llir {
        let list_sym = self.ctx.intern("list");
        let append_sym = self.ctx.intern("append");
        let mut segments: Vec<Llir> = Vec::new();
        let mut plain: Vec<Llir> = Vec::new();
        for (spliced, part) in parts {
            if spliced {
                if !plain.is_empty() {
                    segments.push(Llir::Call(Box::new(Llir::Var(list_sym)), std::mem::take(&mut plain)));
                }
                segments.push(part);
            } else {
                plain.push(part);
            }
        }
        if !plain.is_empty() || segments.is_empty() {
            segments.push(Llir::Call(Box::new(Llir::Var(list_sym)), plain));
        }
        if segments.len() == 1 {
            segments.pop().unwrap()
        } else {
            Llir::Call(Box::new(Llir::Var(append_sym)), segments)
        }
    }

    /// Build a runtime `Value` datum for `quote`/macro-argument purposes:
    /// numbers and strings stay themselves, symbols become `Sym` values,
    /// lists become cons chains terminated by `Empty`.
    fn node_to_datum_value(&mut self, node: &Node) -> FnResult<Value> {
        match &node.datum {
            Datum::Num(n) => Ok(Value::num(*n)),
            Datum::StrId(id) if node.kind == AstKind::String => {
                let bytes = self.ctx.strtab_name(*id).into_bytes();
                Ok(self.ctx.alloc_string(&bytes))
            }
            Datum::StrId(id) => {
                let name = self.ctx.strtab_name(*id);
                let sym = self.ctx.intern(&name);
                Ok(Value::sym(sym))
            }
            Datum::List(children) => {
                let mut acc = Value::empty();
                for child in children.iter().rev() {
                    let v = self.node_to_datum_value(child)?;
                    acc = self.ctx.alloc_cons(v, acc);
                }
                Ok(acc)
            }
        }
    }

    /// Inverse of [`Self::node_to_datum_value`]: a macro's returned `Value`
    /// becomes a fresh `Node` tree the expander recurses into, so a
    /// macro-returned form goes through the same special-form dispatch any
    /// hand-written form would.
    fn datum_value_to_node(&mut self, v: Value, loc: SourceLoc) -> FnResult<Node> {
        match v.tag() {
            Tag::Num => Ok(Node::number(loc, v.as_num().unwrap())),
            Tag::Sym => {
                let name = self.ctx.symbol_name(v.as_sym().unwrap());
                let id = self.ctx.strtab_intern(&name);
                Ok(Node::symbol(loc, id))
            }
            Tag::String => {
                let bytes = crate::object::string_bytes(v).unwrap_or(&[]);
                let s = String::from_utf8_lossy(bytes).into_owned();
                let id = self.ctx.strtab_intern(&s);
                Ok(Node::string(loc, id))
            }
            Tag::Empty | Tag::Nil => Ok(Node::list(loc, Vec::new())),
            Tag::Cons => {
                let mut children = Vec::new();
                let mut cur = v;
                while cur.tag() == Tag::Cons {
                    let (head, tail) = self.ctx.cons_parts(cur);
                    children.push(self.datum_value_to_node(head, loc)?);
                    cur = tail;
                }
                Ok(Node::list(loc, children))
            }
            other => Err(self.err(loc, FnErrorKind::Macroexpansion, format!("macro returned an unquotable value: {other:?}"))),
        }
    }
}
