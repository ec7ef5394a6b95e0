use crate::*;

/// `(name init)` defaults and a bare-`&` rest collection (spec.md, end-to-end
/// scenario 3).
#[test]
fn optional_default_and_rest_collection() {
    let mut vm = Vm::new(&VmOptions::default());
    vm.eval_source("(def f (fn (a (b 2) & rest) (List a b rest)))", "<test>").unwrap();

    let v = vm.eval_source("(f 1)", "<test>").unwrap();
    let parts = vm.list_to_vec(v).unwrap();
    assert_eq!(parts[0].as_num(), Some(1.0));
    assert_eq!(parts[1].as_num(), Some(2.0));
    assert!(vm.list_to_vec(parts[2]).unwrap().is_empty());

    let v = vm.eval_source("(f 1 9)", "<test>").unwrap();
    let parts = vm.list_to_vec(v).unwrap();
    assert_eq!(parts[1].as_num(), Some(9.0));

    let v = vm.eval_source("(f 1 9 3 4)", "<test>").unwrap();
    let parts = vm.list_to_vec(v).unwrap();
    let rest = vm.list_to_vec(parts[2]).unwrap();
    assert_eq!(rest.iter().map(|v| v.as_num().unwrap()).collect::<Vec<_>>(), vec![3.0, 4.0]);
}

#[test]
fn missing_required_argument_is_a_runtime_error() {
    let mut vm = Vm::new(&VmOptions::default());
    vm.eval_source("(def f (fn (a b) a))", "<test>").unwrap();
    let err = vm.eval_source("(f 1)", "<test>").unwrap_err();
    assert_eq!(err.kind, FnErrorKind::Runtime);
}

#[test]
fn too_many_positional_arguments_without_rest_is_an_error() {
    let mut vm = Vm::new(&VmOptions::default());
    vm.eval_source("(def f (fn (a) a))", "<test>").unwrap();
    let err = vm.eval_source("(f 1 2)", "<test>").unwrap_err();
    assert_eq!(err.kind, FnErrorKind::Runtime);
}
