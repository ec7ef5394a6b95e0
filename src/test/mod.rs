pub mod test_arithmetic;
pub mod test_closures;
pub mod test_gc;
pub mod test_macros;
pub mod test_reader;
pub mod test_spec_scenarios;
pub mod test_symbols;
pub mod test_tailcall;
pub mod test_variadic;
