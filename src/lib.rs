//! The Fn interpreter: a Lisp-family, dynamically-typed language compiled
//! to bytecode and run on a generational-GC stack VM. Drives the full
//! scan -> parse -> macroexpand -> compile -> execute pipeline end to end.

pub mod builtin;
pub mod compiler;
pub mod config;
pub mod error;
pub mod expander;
pub mod gc;
pub mod llir;
pub mod namespace;
pub mod object;
pub mod reader;
pub mod symbol;
#[cfg(test)]
mod test;
pub mod value;
pub mod vm;

pub use config::VmOptions;
pub use error::{FnError, FnErrorKind, FnResult};
pub use object::FnTracer;
pub use value::Value;
pub use vm::Vm;

/// Run `source` to completion in a fresh VM, returning the last top-level
/// form's value.
pub fn execute(source: &str) -> FnResult<Value> {
    let mut vm = Vm::new(&VmOptions::default());
    vm.eval_source(source, "<source>")
}

/// Run `source` against an existing VM, so globals, macros, and heap state
/// from a previous call are visible.
pub fn execute_with_vm(vm: &mut Vm<FnTracer>, source: &str) -> FnResult<Value> {
    vm.eval_source(source, "<source>")
}
