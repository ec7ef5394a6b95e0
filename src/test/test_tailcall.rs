use crate::*;

/// A self-tail-call in the VM's bytecode loop reuses the current frame
/// (`Op::TailCall`, vm/exec.rs) rather than growing the Rust call stack, so
/// depth is bounded only by `n`, not by host stack size (spec.md,
/// end-to-end scenario 5).
#[test]
fn deep_tail_recursion_does_not_overflow() {
    let mut vm = Vm::new(&VmOptions::default());
    vm.eval_source("(def loop (fn (n) (if (= n 0) (quote done) (loop (- n 1)))))", "<test>").unwrap();
    let v = vm.eval_source("(loop 100000)", "<test>").unwrap();
    assert_eq!(v.tag(), crate::value::Tag::Sym);
    assert_eq!(vm.display(v), "done");
}
