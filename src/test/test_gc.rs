use crate::gc::CollectLevel;
use crate::*;

/// Before `Vm::gc_roots` threaded real roots through every allocation call
/// site, nothing outside the heap protected a live value across a
/// collection; this is the regression test for that fix.
#[test]
fn global_list_survives_a_forced_full_collection() {
    let mut vm = Vm::new(&VmOptions::default());
    vm.eval_source("(def xs (list 1 2 3))", "<test>").unwrap();

    let mut roots = vm.gc_roots();
    unsafe { vm.heap.collect(CollectLevel::Full, &mut roots) };

    let v = vm.eval_source("xs", "<test>").unwrap();
    let items = vm.list_to_vec(v).unwrap();
    assert_eq!(items.iter().map(|i| i.as_num().unwrap()).collect::<Vec<_>>(), vec![1.0, 2.0, 3.0]);
}

/// A closed-over upvalue cell lives outside the moving heap, so it must
/// stay correct across a collection purely by `FnTracer` visiting it
/// through the owning function object, not through the root set.
#[test]
fn closed_upvalue_survives_a_forced_full_collection() {
    let mut vm = Vm::new(&VmOptions::default());
    vm.eval_source(
        "(def counter ((fn () (with (n 0) (fn () (set! n (+ n 1)))))))",
        "<test>",
    )
    .unwrap();
    vm.eval_source("(counter)", "<test>").unwrap();

    let mut roots = vm.gc_roots();
    unsafe { vm.heap.collect(CollectLevel::Full, &mut roots) };

    let v = vm.eval_source("(counter)", "<test>").unwrap();
    assert_eq!(v.as_num(), Some(2.0));
}

#[test]
fn repeated_allocation_triggers_collection_without_corrupting_state() {
    let mut vm = Vm::new(&VmOptions::default());
    vm.eval_source("(def build (fn (n) (if (= n 0) (list) (cons n (build (- n 1))))))", "<test>").unwrap();
    let v = vm.eval_source("(build 500)", "<test>").unwrap();
    let items = vm.list_to_vec(v).unwrap();
    assert_eq!(items.len(), 500);
    assert_eq!(items[0].as_num(), Some(500.0));
    assert_eq!(items[499].as_num(), Some(1.0));
}
