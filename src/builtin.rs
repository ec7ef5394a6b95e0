//! Native functions callable from `Fn` code. Grounded on `alloc_foreign_fun`
//! in `alloc.hpp`: a builtin is a `function_stub` whose `foreign` field
//! names a registry entry instead of carrying bytecode.

use crate::error::{FnErrorKind, FnResult};
use crate::gc::Tracer;
use crate::object::{self, BuiltinId};
use crate::value::{Tag, Value};
use crate::vm::{value_eq, Vm};

pub type BuiltinFn<T> = fn(&mut Vm<T>, &[Value]) -> FnResult<Value>;

pub struct BuiltinRegistry<T: Tracer> {
    funcs: Vec<BuiltinFn<T>>,
    names: Vec<&'static str>,
}

impl<T: Tracer> BuiltinRegistry<T> {
    pub fn get(&self, id: BuiltinId) -> BuiltinFn<T> {
        self.funcs[id as usize]
    }

    pub fn name(&self, id: BuiltinId) -> &'static str {
        self.names[id as usize]
    }
}

impl<T: Tracer> Default for BuiltinRegistry<T> {
    fn default() -> Self {
        Self {
            funcs: Vec::new(),
            names: Vec::new(),
        }
    }
}

/// Installs every builtin into `vm`'s root namespace, returning nothing —
/// each entry both registers in the builtin table and `def`s a global
/// bound to a zero-upvalue function wrapping it.
pub fn install(vm: &mut Vm<crate::object::FnTracer>) {
    // The reader never special-cases these names (unlike a true literal
    // syntax for booleans/nil); they work as plain symbols only because
    // they're pre-bound here, the same as any other global.
    for (name, v) in [
        ("nil", Value::nil()),
        ("yes", Value::yes()),
        ("no", Value::no()),
        // Aliases for the same two constants; spec.md's own prose mixes
        // `yes`/`no` and `true`/`false` across examples.
        ("true", Value::yes()),
        ("false", Value::no()),
    ] {
        let sym = vm.sst.intern(name);
        vm.globals.push_global(vm.root_ns, sym, v);
    }

    macro_rules! reg {
        ($name:literal, $f:expr) => {{
            let id = vm.builtins.funcs.len() as BuiltinId;
            vm.builtins.funcs.push($f);
            vm.builtins.names.push($name);
            let sym = vm.sst.intern($name);
            let stub = object::alloc_function_stub(
                0,
                0,
                true,
                0,
                vm.root_ns,
                Vec::new(),
                Vec::new(),
                Vec::new(),
                Vec::new(),
                Vec::new(),
                Some(id),
            );
            let f = object::alloc_function(&mut vm.heap, stub, Vec::new(), Vec::new(), &mut []);
            vm.globals.push_global(vm.root_ns, sym, f);
        }};
    }

    reg!("list", list);
    // `[a b c]` reader sugar expands to `(List a b c)` (parser.rs); same
    // builtin under the capitalized name the sugar targets.
    reg!("List", list);
    reg!("append", append);
    reg!("cons", cons);
    reg!("car", car);
    reg!("cdr", cdr);
    reg!("print", print);
    reg!("not", not_fn);
    reg!("gensym", gensym);
    reg!("table", make_table);
    // `{k v ...}` reader sugar expands to `(Table k v ...)` (parser.rs).
    reg!("Table", make_table);
    reg!("length", length);
    reg!("+", add);
    reg!("-", sub);
    reg!("*", mul);
    reg!("/", div);
    reg!("=", num_eq);
    reg!("<", lt);
    reg!("nth", nth);
    reg!("error", error_fn);
}

/// Pulls every arg's number out or reports which one wasn't, matching the
/// `vnum` coercion `istate.hpp`'s arithmetic opcodes use on their operands.
fn nums<T: Tracer>(vm: &Vm<T>, name: &str, args: &[Value]) -> FnResult<Vec<f64>> {
    args.iter()
        .map(|v| v.as_num().ok_or_else(|| vm.type_err(format!("{name}: expected a number"))))
        .collect()
}

fn add<T: Tracer>(vm: &mut Vm<T>, args: &[Value]) -> FnResult<Value> {
    Ok(Value::num(nums(vm, "+", args)?.into_iter().sum()))
}

fn sub<T: Tracer>(vm: &mut Vm<T>, args: &[Value]) -> FnResult<Value> {
    let ns = nums(vm, "-", args)?;
    match ns.split_first() {
        None => Err(vm.arity_err("-", 1, 0)),
        Some((&first, rest)) if rest.is_empty() => Ok(Value::num(-first)),
        Some((&first, rest)) => Ok(Value::num(rest.iter().fold(first, |a, b| a - b))),
    }
}

fn mul<T: Tracer>(vm: &mut Vm<T>, args: &[Value]) -> FnResult<Value> {
    Ok(Value::num(nums(vm, "*", args)?.into_iter().product()))
}

fn div<T: Tracer>(vm: &mut Vm<T>, args: &[Value]) -> FnResult<Value> {
    let ns = nums(vm, "/", args)?;
    match ns.split_first() {
        None => Err(vm.arity_err("/", 1, 0)),
        Some((&first, rest)) if rest.is_empty() => Ok(Value::num(1.0 / first)),
        Some((&first, rest)) => Ok(Value::num(rest.iter().fold(first, |a, b| a / b))),
    }
}

fn num_eq<T: Tracer>(_vm: &mut Vm<T>, args: &[Value]) -> FnResult<Value> {
    Ok(Value::bool_value(args.windows(2).all(|w| value_eq(w[0], w[1]))))
}

fn lt<T: Tracer>(vm: &mut Vm<T>, args: &[Value]) -> FnResult<Value> {
    let ns = nums(vm, "<", args)?;
    Ok(Value::bool_value(ns.windows(2).all(|w| w[0] < w[1])))
}

fn list<T: Tracer>(vm: &mut Vm<T>, args: &[Value]) -> FnResult<Value> {
    let mut all: Vec<Value> = args.to_vec();
    let mut acc = Value::empty();
    for _ in 0..all.len() {
        let mut v = all.pop().unwrap();
        let mut roots = vm.gc_roots();
        roots.extend(all.iter_mut().map(|a| a as *mut Value));
        roots.push(&mut v);
        roots.push(&mut acc);
        acc = object::alloc_cons(&mut vm.heap, v, acc, &mut roots);
    }
    Ok(acc)
}

fn append<T: Tracer>(vm: &mut Vm<T>, args: &[Value]) -> FnResult<Value> {
    let mut all = Vec::new();
    for a in args {
        all.extend(vm.list_to_vec(*a)?);
    }
    let mut acc = Value::empty();
    for _ in 0..all.len() {
        let mut v = all.pop().unwrap();
        let mut roots = vm.gc_roots();
        roots.extend(all.iter_mut().map(|a| a as *mut Value));
        roots.push(&mut v);
        roots.push(&mut acc);
        acc = object::alloc_cons(&mut vm.heap, v, acc, &mut roots);
    }
    Ok(acc)
}

fn cons<T: Tracer>(vm: &mut Vm<T>, args: &[Value]) -> FnResult<Value> {
    let [head, tail] = args else {
        return Err(vm.arity_err("cons", 2, args.len()));
    };
    let (mut head, mut tail) = (*head, *tail);
    let mut roots = vm.gc_roots();
    roots.push(&mut head);
    roots.push(&mut tail);
    Ok(object::alloc_cons(&mut vm.heap, head, tail, &mut roots))
}

fn car<T: Tracer>(vm: &mut Vm<T>, args: &[Value]) -> FnResult<Value> {
    let [v] = args else { return Err(vm.arity_err("car", 1, args.len())) };
    if v.tag() != Tag::Cons {
        return Err(vm.type_err("car expects a cons cell"));
    }
    let ptr = v.as_ptr().unwrap() as *mut object::ConsCell;
    Ok(unsafe { (*ptr).head })
}

fn cdr<T: Tracer>(vm: &mut Vm<T>, args: &[Value]) -> FnResult<Value> {
    let [v] = args else { return Err(vm.arity_err("cdr", 1, args.len())) };
    if v.tag() != Tag::Cons {
        return Err(vm.type_err("cdr expects a cons cell"));
    }
    let ptr = v.as_ptr().unwrap() as *mut object::ConsCell;
    Ok(unsafe { (*ptr).tail })
}

fn print<T: Tracer>(vm: &mut Vm<T>, args: &[Value]) -> FnResult<Value> {
    let rendered: Vec<String> = args.iter().map(|v| vm.display(*v)).collect();
    log::info!("{}", rendered.join(" "));
    println!("{}", rendered.join(" "));
    Ok(Value::nil())
}

fn not_fn<T: Tracer>(_vm: &mut Vm<T>, args: &[Value]) -> FnResult<Value> {
    let [v] = args else { return Ok(Value::no()) };
    Ok(Value::bool_value(!v.truth()))
}

fn gensym<T: Tracer>(vm: &mut Vm<T>, _args: &[Value]) -> FnResult<Value> {
    Ok(Value::sym(vm.sst.gensym()))
}

/// `(table)` makes an empty table; `(Table k1 v1 k2 v2 …)` (the `{...}`
/// reader sugar's target) also seeds it with the given key/value pairs.
fn make_table<T: Tracer>(vm: &mut Vm<T>, args: &[Value]) -> FnResult<Value> {
    if args.len() % 2 != 0 {
        return Err(vm.type_err("Table: expected an even number of key/value arguments"));
    }
    let mut roots = vm.gc_roots();
    let t = object::alloc_table(&mut vm.heap, (args.len() as u32 / 2).max(4), &mut roots);
    for pair in args.chunks_exact(2) {
        crate::vm::table::set(&mut vm.heap, t, pair[0], pair[1]);
    }
    Ok(t)
}

fn length<T: Tracer>(vm: &mut Vm<T>, args: &[Value]) -> FnResult<Value> {
    let [v] = args else { return Err(vm.arity_err("length", 1, args.len())) };
    let items = vm.list_to_vec(*v)?;
    Ok(Value::num(items.len() as f64))
}

fn error_fn<T: Tracer>(vm: &mut Vm<T>, args: &[Value]) -> FnResult<Value> {
    let msg = args.iter().map(|v| vm.display(*v)).collect::<Vec<_>>().join(" ");
    Err(vm.type_err(msg))
}

fn nth<T: Tracer>(vm: &mut Vm<T>, args: &[Value]) -> FnResult<Value> {
    let [i, v] = args else { return Err(vm.arity_err("nth", 2, args.len())) };
    let idx = i.as_num().ok_or_else(|| vm.type_err("nth: expected a number index"))? as usize;
    let items = vm.list_to_vec(*v)?;
    items.get(idx).copied().ok_or_else(|| vm.type_err("nth: index out of range"))
}

impl<T: Tracer> Vm<T> {
    pub(crate) fn arity_err(&self, name: &str, want: usize, got: usize) -> crate::error::FnError {
        self.err_here(FnErrorKind::Runtime, format!("{name}: expected {want} arguments, got {got}"))
    }

    pub(crate) fn type_err(&self, msg: impl Into<String>) -> crate::error::FnError {
        self.err_here(FnErrorKind::Runtime, msg)
    }
}
