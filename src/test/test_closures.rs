use crate::*;

fn eval(src: &str) -> FnResult<Value> {
    let mut vm = Vm::new(&VmOptions::default());
    vm.eval_source(src, "<test>")
}

#[test]
fn nested_fn_captures_outer_parameter() {
    let v = eval("(with (f ((fn (x) (fn (y) (+ x y))) 10)) (f 5))").unwrap();
    assert_eq!(v.as_num(), Some(15.0));
}

/// Two closures returned from the same call share one open upvalue cell;
/// mutating it through one must be visible through the other, matching the
/// `make-pair` scenario (spec.md, end-to-end scenario 6).
#[test]
fn two_closures_share_one_upvalue_cell() {
    let src = r#"
        (def make-pair
          (fn ()
            (with (x 0
                   inc (fn () (set! x (+ x 1)))
                   get (fn () x))
              (list inc get))))
        (with (p (make-pair))
          ((nth 0 p))
          ((nth 0 p))
          ((nth 1 p)))
    "#;
    let v = eval(src).unwrap();
    assert_eq!(v.as_num(), Some(2.0));
}

#[test]
fn set_bang_on_local_mutates_in_place() {
    let v = eval("(with (x 1) (set! x (+ x 41)) x)").unwrap();
    assert_eq!(v.as_num(), Some(42.0));
}
