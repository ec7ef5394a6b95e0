use crate::*;

fn eval(src: &str) -> FnResult<Value> {
    let mut vm = Vm::new(&VmOptions::default());
    vm.eval_source(src, "<test>")
}

#[test]
fn sum_of_three() {
    let v = eval("(+ 1 2 3)").unwrap();
    assert_eq!(v.as_num(), Some(6.0));
}

#[test]
fn subtraction_is_left_associative() {
    let v = eval("(- 10 3 2)").unwrap();
    assert_eq!(v.as_num(), Some(5.0));
}

#[test]
fn unary_minus_negates() {
    let v = eval("(- 5)").unwrap();
    assert_eq!(v.as_num(), Some(-5.0));
}

#[test]
fn product_of_args() {
    let v = eval("(* 2 3 4)").unwrap();
    assert_eq!(v.as_num(), Some(24.0));
}

#[test]
fn numeric_equality_and_ordering() {
    assert_eq!(eval("(= 1 1 1)").unwrap().truth(), true);
    assert_eq!(eval("(= 1 2)").unwrap().truth(), false);
    assert_eq!(eval("(< 1 2 3)").unwrap().truth(), true);
    assert_eq!(eval("(< 1 3 2)").unwrap().truth(), false);
}

#[test]
fn if_picks_branch_on_truthiness() {
    let v = eval("(if (< 1 2) 10 20)").unwrap();
    assert_eq!(v.as_num(), Some(10.0));
    let v = eval("(if (< 2 1) 10 20)").unwrap();
    assert_eq!(v.as_num(), Some(20.0));
}

#[test]
fn non_number_argument_is_a_runtime_error() {
    let err = eval(r#"(+ 1 "x")"#).unwrap_err();
    assert_eq!(err.kind, FnErrorKind::Runtime);
}
