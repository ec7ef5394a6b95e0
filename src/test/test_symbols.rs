use crate::symbol::SymbolTable;

/// `intern(s) == intern(s) ⇔ s == s`, and the name round-trips (spec.md §8
/// invariants).
#[test]
fn interning_is_consistent_and_name_round_trips() {
    let mut sst = SymbolTable::new();
    let a = sst.intern("foo");
    let b = sst.intern("foo");
    let c = sst.intern("bar");
    assert_eq!(a, b);
    assert_ne!(a, c);
    assert_eq!(sst.symbol_name(a), "foo");
    assert_eq!(sst.symbol_name(c), "bar");
}

#[test]
fn gensym_ids_never_collide_with_interned_ids() {
    let mut sst = SymbolTable::new();
    let named = sst.intern("x");
    let g1 = sst.gensym();
    let g2 = sst.gensym();
    assert_ne!(g1, g2);
    assert_ne!(g1, named);
    assert!(sst.symbol_name(g1).starts_with("#gensym:"));
}

#[test]
fn gensym_builtin_is_reachable_from_source() {
    let mut vm = crate::Vm::new(&crate::VmOptions::default());
    let v = vm.eval_source("(gensym)", "<test>").unwrap();
    assert_eq!(v.tag(), crate::value::Tag::Sym);
}
