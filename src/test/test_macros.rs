use crate::value::Tag;
use crate::*;

fn eval(src: &str) -> FnResult<Value> {
    let mut vm = Vm::new(&VmOptions::default());
    vm.eval_source(src, "<test>")
}

/// `when` expands to `if`, splicing its body with `,@` (spec.md, end-to-end
/// scenario 4). Written with `begin` rather than `do`, the sequencing form
/// this implementation actually compiles.
#[test]
fn when_macro_expands_and_evaluates() {
    let src = r#"
        (defmacro when (c & body) `(if ,c (begin ,@body) nil))
        (when (< 1 2) 1 2 3)
    "#;
    let v = eval(src).unwrap();
    assert_eq!(v.as_num(), Some(3.0));
}

#[test]
fn when_macro_false_branch_yields_nil() {
    let src = r#"
        (defmacro when (c & body) `(if ,c (begin ,@body) nil))
        (when (< 2 1) 1 2 3)
    "#;
    let v = eval(src).unwrap();
    assert!(v.is_nil());
}

#[test]
fn quote_suppresses_evaluation() {
    let v = eval("(quote (+ 1 2))").unwrap();
    // A quoted call form round-trips as a cons list of symbols/numbers,
    // never invoking `+`.
    assert_eq!(v.tag(), Tag::Cons);
}

#[test]
fn quasiquote_with_unquote_splices_a_value_in() {
    let mut vm = Vm::new(&VmOptions::default());
    let v = vm.eval_source("(with (x 5) `(a ,x b))", "<test>").unwrap();
    let parts = vm.list_to_vec(v).unwrap();
    assert_eq!(parts.len(), 3);
    assert_eq!(parts[1].as_num(), Some(5.0));
}
