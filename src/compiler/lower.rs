//! Llir -> bytecode lowering. Grounded on `compile.hpp`'s single recursive
//! `compile_expr`, which threads a `tail` flag through every call site so a
//! call in tail position becomes `OP_TCALL` instead of `OP_CALL`.

use super::func::{resolve, FuncScope, Resolved};
use crate::gc::Tracer;
use crate::llir::Llir;
use crate::object::{self, FunctionStub};
use crate::symbol::{SymbolId, SymbolTable};
use crate::value::Value;
use crate::vm::opcode::{emit, Op};

pub struct FuncBuilder {
    pub scope: FuncScope,
    pub code: Vec<u8>,
    pub consts: Vec<Value>,
    pub sub_funs: Vec<*mut FunctionStub>,
    pub num_params: u8,
    pub num_opt: u8,
    pub vari: bool,
    pub name: Option<SymbolId>,
}

impl FuncBuilder {
    pub fn new(name: Option<SymbolId>) -> Self {
        Self {
            scope: FuncScope::new(),
            code: Vec::new(),
            consts: Vec::new(),
            sub_funs: Vec::new(),
            num_params: 0,
            num_opt: 0,
            vari: false,
            name,
        }
    }

    fn push_const(&mut self, v: Value) -> u32 {
        self.consts.push(v);
        (self.consts.len() - 1) as u32
    }
}

pub struct Compiler<'a, T: Tracer> {
    pub sst: &'a mut SymbolTable,
    pub heap: &'a mut crate::gc::Heap<T>,
    pub ns: SymbolId,
    pub builders: Vec<FuncBuilder>,
}

impl<'a, T: Tracer> Compiler<'a, T> {
    fn resolve_name(&mut self, name: SymbolId) -> Resolved {
        let mut scopes: Vec<FuncScope> = self.builders.iter_mut().rev().map(|b| std::mem::take(&mut b.scope)).collect();
        let resolved = resolve(&mut scopes, name);
        for (b, s) in self.builders.iter_mut().rev().zip(scopes.into_iter()) {
            b.scope = s;
        }
        resolved
    }

    fn cur(&mut self) -> &mut FuncBuilder {
        self.builders.last_mut().unwrap()
    }

    fn emit_const(&mut self, v: Value) {
        let idx = self.cur().push_const(v);
        let b = self.cur();
        emit(&mut b.code, Op::LoadConst, &[idx]);
    }

    pub fn compile_expr(&mut self, e: &Llir, tail: bool) {
        match e {
            Llir::Const(v) => self.emit_const(*v),
            Llir::Var(name) => self.compile_var(*name),
            Llir::If(test, then, els) => self.compile_if(test, then, els, tail),
            Llir::Def(name, val) => {
                self.compile_expr(val, false);
                let b = self.cur();
                emit(&mut b.code, Op::DefGlobal, &[*name]);
            }
            Llir::Defmacro(name, val) => {
                self.compile_expr(val, false);
                let b = self.cur();
                emit(&mut b.code, Op::DefGlobal, &[*name]);
            }
            Llir::Set(name, val) => {
                self.compile_expr(val, false);
                self.compile_assign(*name);
            }
            Llir::Fn(fn_llir) => self.compile_closure(fn_llir),
            Llir::Call(f, args) => self.compile_call(f, args, tail),
            Llir::Apply(f, args) => self.compile_apply(f, args),
            Llir::Dot(obj, field) => {
                self.compile_expr(obj, false);
                let sym_val = Value::sym(*field);
                let idx = self.cur().push_const(sym_val);
                let b = self.cur();
                emit(&mut b.code, Op::GetField, &[idx]);
            }
            Llir::Import(path) => {
                let sym = self.sst.intern(path);
                let bytes = path.as_bytes().to_vec();
                let v = object::alloc_string(self.heap, &bytes, &mut []);
                let idx = self.cur().push_const(v);
                let b = self.cur();
                emit(&mut b.code, Op::Import, &[idx, sym]);
            }
            Llir::With(bindings, body) => self.compile_with(bindings, body, tail),
            Llir::Seq(body) => self.compile_seq(body, tail),
        }
    }

    fn compile_var(&mut self, name: SymbolId) {
        match self.resolve_name(name) {
            Resolved::Local(slot) => {
                let b = self.cur();
                emit(&mut b.code, Op::GetLocal, &[slot as u32]);
            }
            Resolved::Upval(slot) => {
                let b = self.cur();
                emit(&mut b.code, Op::GetUpval, &[slot as u32]);
            }
            Resolved::Global => {
                let b = self.cur();
                emit(&mut b.code, Op::GetGlobal, &[name]);
            }
        }
    }

    fn compile_assign(&mut self, name: SymbolId) {
        match self.resolve_name(name) {
            Resolved::Local(slot) => {
                let b = self.cur();
                emit(&mut b.code, Op::SetLocal, &[slot as u32]);
            }
            Resolved::Upval(slot) => {
                let b = self.cur();
                emit(&mut b.code, Op::SetUpval, &[slot as u32]);
            }
            Resolved::Global => {
                let b = self.cur();
                emit(&mut b.code, Op::SetGlobal, &[name]);
            }
        }
    }

    fn compile_if(&mut self, test: &Llir, then: &Llir, els: &Llir, tail: bool) {
        self.compile_expr(test, false);
        let b = self.cur();
        emit(&mut b.code, Op::JmpIfFalse, &[0]);
        let jf_operand_at = b.code.len() - 4;
        self.compile_expr(then, tail);
        let b = self.cur();
        emit(&mut b.code, Op::Jmp, &[0]);
        let j_operand_at = b.code.len() - 4;
        let else_pc = self.cur().code.len() as u32;
        patch_u32(&mut self.cur().code, jf_operand_at, else_pc);
        self.compile_expr(els, tail);
        let end_pc = self.cur().code.len() as u32;
        patch_u32(&mut self.cur().code, j_operand_at, end_pc);
    }

    fn compile_call(&mut self, f: &Llir, args: &[Llir], tail: bool) {
        self.compile_expr(f, false);
        for a in args {
            self.compile_expr(a, false);
        }
        let b = self.cur();
        let op = if tail { Op::TailCall } else { Op::Call };
        emit(&mut b.code, op, &[args.len() as u32]);
    }

    fn compile_apply(&mut self, f: &Llir, args: &[Llir]) {
        self.compile_expr(f, false);
        for a in args {
            self.compile_expr(a, false);
        }
        let b = self.cur();
        emit(&mut b.code, Op::Apply, &[args.len() as u32]);
    }

    fn compile_with(&mut self, bindings: &[(SymbolId, Llir)], body: &[Llir], tail: bool) {
        self.cur().scope.push_block();
        for (name, val) in bindings {
            self.compile_expr(val, false);
            self.cur().scope.declare_local(*name);
        }
        self.compile_seq(body, tail);
        self.cur().scope.pop_block();
    }

    fn compile_seq(&mut self, body: &[Llir], tail: bool) {
        if body.is_empty() {
            self.emit_const(Value::nil());
            return;
        }
        for (i, e) in body.iter().enumerate() {
            let is_last = i == body.len() - 1;
            self.compile_expr(e, tail && is_last);
            if !is_last {
                let b = self.cur();
                emit(&mut b.code, Op::Pop, &[]);
            }
        }
    }

    fn compile_closure(&mut self, fn_llir: &crate::llir::FnLlir) {
        self.builders.push(FuncBuilder::new(fn_llir.name));
        {
            let b = self.cur();
            b.num_params = fn_llir.params.required.len() as u8;
            b.num_opt = fn_llir.params.optional.len() as u8;
            b.vari = fn_llir.params.variadic.is_some();
        }
        for p in &fn_llir.params.required {
            self.cur().scope.declare_local(*p);
        }
        for (p, default) in &fn_llir.params.optional {
            self.compile_expr(default, false);
            self.cur().scope.declare_local(*p);
        }
        if let Some(rest) = fn_llir.params.variadic {
            self.cur().scope.declare_local(rest);
        }
        self.compile_seq(&fn_llir.body, true);
        {
            let b = self.cur();
            emit(&mut b.code, Op::Return, &[]);
        }
        let built = self.builders.pop().unwrap();
        let upvals: Vec<u8> = built.scope.upvals.iter().map(|u| u.index).collect();
        let upvals_direct: Vec<bool> = built.scope.upvals.iter().map(|u| u.direct).collect();
        let stub = object::alloc_function_stub(
            built.num_params,
            built.num_opt,
            built.vari,
            0,
            self.ns,
            built.code,
            built.consts,
            built.sub_funs,
            upvals,
            upvals_direct,
            None,
        );
        let idx = self.cur().sub_funs.len() as u32;
        self.cur().sub_funs.push(stub);
        let b = self.cur();
        emit(&mut b.code, Op::Closure, &[idx]);
    }
}

fn patch_u32(code: &mut [u8], at: usize, value: u32) {
    code[at..at + 4].copy_from_slice(&value.to_le_bytes());
}
