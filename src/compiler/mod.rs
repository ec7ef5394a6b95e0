//! The bytecode compiler: turns one expanded [`crate::llir::Llir`] form
//! into a callable `function_stub`, the same unit of compilation
//! `compile.hpp` produces per top-level form (so a REPL can compile and run
//! one expression at a time without recompiling everything before it).

pub mod func;
pub mod lower;

use crate::gc::Tracer;
use crate::object::{self, FunctionStub};
use crate::symbol::{SymbolId, SymbolTable};
use lower::{Compiler, FuncBuilder};

/// Compile one top-level expression into a zero-argument function stub a
/// VM can immediately call.
pub fn compile_toplevel<T: Tracer>(
    sst: &mut SymbolTable,
    heap: &mut crate::gc::Heap<T>,
    ns: SymbolId,
    expr: &crate::llir::Llir,
) -> *mut FunctionStub {
    let mut c = Compiler {
        sst,
        heap,
        ns,
        builders: vec![FuncBuilder::new(None)],
    };
    c.compile_expr(expr, true);
    {
        let b = c.builders.last_mut().unwrap();
        crate::vm::opcode::emit(&mut b.code, crate::vm::opcode::Op::Return, &[]);
    }
    let built = c.builders.pop().unwrap();
    object::alloc_function_stub(
        0,
        0,
        false,
        0,
        ns,
        built.code,
        built.consts,
        built.sub_funs,
        Vec::new(),
        Vec::new(),
        None,
    )
}
