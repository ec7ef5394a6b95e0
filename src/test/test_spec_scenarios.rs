//! The end-to-end scenarios from spec.md section 8, evaluated as close to
//! verbatim as this implementation's actual surface grammar allows. Where
//! the spec's illustrative prose is genuinely ambiguous against the grammar
//! (`with`'s single- vs. parenthesized-list-of-bindings shorthand) the
//! choice made is noted inline; everything else — `defn`, bare `&`, a
//! leading `let` inside a `do`/`fn` body, `true`/`false` — is real grammar
//! this crate now accepts.

use crate::value::Tag;
use crate::*;

fn eval(src: &str) -> FnResult<Value> {
    let mut vm = Vm::new(&VmOptions::default());
    vm.eval_source(src, "<test>")
}

/// Scenario 1: arithmetic.
#[test]
fn scenario_1_arithmetic() {
    let v = eval("(+ 1 2 3)").unwrap();
    assert_eq!(v.as_num(), Some(6.0));
}

/// Scenario 2: closures. The spec's two-line snippet reads as one `do` body
/// (a bare `let` is only legal at the head of a body); the outer `x` is
/// reachable only through the returned closure by the time `f` is called.
#[test]
fn scenario_2_closures() {
    let v = eval("(do (let f ((fn (x) (fn (y) (+ x y))) 10)) (f 5))").unwrap();
    assert_eq!(v.as_num(), Some(15.0));
}

/// Scenario 3: a bare `&` before the rest parameter, not `&rest`.
#[test]
fn scenario_3_variadic_and_optional() {
    let mut vm = Vm::new(&VmOptions::default());
    vm.eval_source("(defn f (a (b 2) & rest) [a b rest])", "<test>").unwrap();

    let v = vm.eval_source("(f 1)", "<test>").unwrap();
    let parts = vm.list_to_vec(v).unwrap();
    assert_eq!(parts[0].as_num(), Some(1.0));
    assert_eq!(parts[1].as_num(), Some(2.0));
    assert!(vm.list_to_vec(parts[2]).unwrap().is_empty());

    let v = vm.eval_source("(f 1 9)", "<test>").unwrap();
    let parts = vm.list_to_vec(v).unwrap();
    assert_eq!(parts[1].as_num(), Some(9.0));
    assert!(vm.list_to_vec(parts[2]).unwrap().is_empty());

    let v = vm.eval_source("(f 1 9 3 4)", "<test>").unwrap();
    let parts = vm.list_to_vec(v).unwrap();
    let rest = vm.list_to_vec(parts[2]).unwrap();
    assert_eq!(rest.iter().map(|v| v.as_num().unwrap()).collect::<Vec<_>>(), vec![3.0, 4.0]);
}

/// Scenario 4: `when` as a macro over `do`, and the `true`/`false` globals.
#[test]
fn scenario_4_macro() {
    let mut vm = Vm::new(&VmOptions::default());
    vm.eval_source("(defmacro when (c & body) `(if ,c (do ,@body) nil))", "<test>").unwrap();

    let v = vm.eval_source("(when true 1 2 3)", "<test>").unwrap();
    assert_eq!(v.as_num(), Some(3.0));

    let v = vm.eval_source(r#"(when false (error "x"))"#, "<test>").unwrap();
    assert!(v.is_nil());
}

/// Scenario 5: tail recursion to 100000, yielding the quoted symbol `done`.
#[test]
fn scenario_5_tail_recursion() {
    let mut vm = Vm::new(&VmOptions::default());
    vm.eval_source("(defn loop (n) (if (= n 0) 'done (loop (- n 1))))", "<test>").unwrap();
    let v = vm.eval_source("(loop 100000)", "<test>").unwrap();
    assert_eq!(v.tag(), Tag::Sym);
    assert_eq!(vm.display(v), "done");
}

/// Scenario 6: upvalue sharing. `make-pair`'s body opens its `let` scope
/// directly (no enclosing `do`), and returns a two-element list of
/// closures sharing one cell for `x`.
#[test]
fn scenario_6_upvalue_sharing() {
    let src = r#"
        (defn make-pair ()
          (let x 0
               inc (fn () (set! x (+ x 1)))
               get (fn () x))
          (List inc get))
        (with (p (make-pair))
          ((nth 0 p)) ((nth 0 p))
          ((nth 1 p)))
    "#;
    let v = eval(src).unwrap();
    assert_eq!(v.as_num(), Some(2.0));
}

/// Maintainer review comment c: `{...}` must actually evaluate to a
/// populated table, not merely parse without faulting on an undefined
/// global.
#[test]
fn brace_sugar_evaluates_to_a_populated_table() {
    let v = eval("{1 2}").unwrap();
    assert_eq!(v.tag(), Tag::Table);
    assert_eq!(crate::vm::table::get(v, Value::num(1.0)).and_then(|v| v.as_num()), Some(2.0));
}

/// `[...]` sugar rewrites to `(List ...)` the same way.
#[test]
fn bracket_sugar_evaluates_to_a_list() {
    let mut vm = Vm::new(&VmOptions::default());
    let v = vm.eval_source("[1 2 3]", "<test>").unwrap();
    let parts = vm.list_to_vec(v).unwrap();
    assert_eq!(parts.iter().map(|v| v.as_num().unwrap()).collect::<Vec<_>>(), vec![1.0, 2.0, 3.0]);
}

/// `` `$(...)` `` sugar: positional `$0`/`$1` params inferred from use.
#[test]
fn dollar_fn_builds_a_positional_closure() {
    let mut vm = Vm::new(&VmOptions::default());
    vm.eval_source("(def add2 $(+ $0 $1))", "<test>").unwrap();
    let v = vm.eval_source("(add2 3 4)", "<test>").unwrap();
    assert_eq!(v.as_num(), Some(7.0));
}

/// A bare `$` inside `$(...)` is an alias for `$0`.
#[test]
fn dollar_fn_bare_dollar_is_dollar_zero() {
    let mut vm = Vm::new(&VmOptions::default());
    vm.eval_source("(def double $(* $ 2))", "<test>").unwrap();
    let v = vm.eval_source("(double 21)", "<test>").unwrap();
    assert_eq!(v.as_num(), Some(42.0));
}

/// `(import (. a b c))`: the dotted path form joins segments with `/`.
#[test]
fn dotted_import_path_is_accepted() {
    let mut vm = Vm::new(&VmOptions::default());
    vm.module_loader = Some(Box::new(|path| {
        assert_eq!(path, "a/b/c");
        Some("(def loaded-from-dotted-import 1)".to_string())
    }));
    vm.eval_source("(import (. a b c))", "<test>").unwrap();
    let v = vm.eval_source("loaded-from-dotted-import", "<test>").unwrap();
    assert_eq!(v.as_num(), Some(1.0));
}

/// `and`/`or`/`cond` each evaluate their operands at most once and short
/// circuit; the side-effecting operand after the deciding one never runs.
#[test]
fn and_or_cond_short_circuit() {
    let mut vm = Vm::new(&VmOptions::default());
    let src = r#"
        (with (calls 0
               bump (fn () (set! calls (+ calls 1)) calls))
          (and false (bump))
          (or true (bump))
          (List calls (cond false 1 true 2)))
    "#;
    let parts = vm.list_to_vec(vm.eval_source(src, "<test>").unwrap()).unwrap();
    assert_eq!(parts[0].as_num(), Some(0.0));
    assert_eq!(parts[1].as_num(), Some(2.0));
}

/// `letfn` lets a function close over its own binding for recursion; the
/// `letfn` expression itself evaluates to the function value.
#[test]
fn letfn_supports_self_recursion() {
    let mut vm = Vm::new(&VmOptions::default());
    vm.eval_source(
        "(def count-to (letfn count-down (n) (if (= n 0) 'done (count-down (- n 1)))))",
        "<test>",
    )
    .unwrap();
    let v = vm.eval_source("(count-to 5)", "<test>").unwrap();
    assert_eq!(v.tag(), Tag::Sym);
    assert_eq!(vm.display(v), "done");
}
