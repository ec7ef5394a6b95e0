//! The bytecode interpreter loop. Grounded on `exec.hpp`'s instruction
//! dispatch and calling convention: fixed/optional/variadic argument
//! binding, upvalue open/close on return, and tail calls that reuse the
//! current frame instead of growing the call chain.

use crate::error::{FnError, FnErrorKind, FnResult, TraceFrame};
use crate::gc::Tracer;
use crate::object::{self, FunctionObj, FunctionStub, UpvalueCell};
use crate::reader::SourceLoc;
use crate::value::{Tag, Value};
use crate::vm::istate::Frame;
use crate::vm::opcode::{decode_u32, Op};
use crate::vm::table;
use crate::vm::Vm;

/// What a frame handed back to its caller after one dispatch step.
pub enum Step {
    Continue,
    Returned(Value),
    /// `(import "path")` hit a module that hasn't been loaded yet; the
    /// driver loads it and re-enters. A real coroutine-style suspend (as
    /// `istate.hpp` does it) is out of scope here — see DESIGN.md.
    NeedImport(String),
}

impl<T: Tracer> Vm<T> {
    pub fn call_value(&mut self, f: Value, mut args: Vec<Value>) -> FnResult<Value> {
        if let Some(id) = self.as_builtin(f) {
            let func = self.builtins.get(id);
            return func(self, &args);
        }
        let Some(func_ptr) = self.as_function(f) else {
            return Err(self.rt_err("call target is not a function"));
        };
        let stub = unsafe { (*func_ptr).stub };
        self.bind_args(stub, &mut args)?;
        let base = self.istate.stack.len();
        for a in args {
            self.istate.push(a);
        }
        self.istate.frames.push(Frame {
            func: func_ptr,
            stub,
            pc: 0,
            base,
            open_upvals: Vec::new(),
        });
        self.run_until_return()
    }

    fn bind_args(&mut self, stub: *mut FunctionStub, args: &mut Vec<Value>) -> FnResult<()> {
        let (num_params, num_opt, vari) = unsafe { ((*stub).num_params as usize, (*stub).num_opt as usize, (*stub).vari) };
        if args.len() < num_params {
            return Err(self.rt_err(format!("expected at least {num_params} arguments, got {}", args.len())));
        }
        if !vari && args.len() > num_params + num_opt {
            return Err(self.rt_err(format!("expected at most {} arguments, got {}", num_params + num_opt, args.len())));
        }
        while args.len() < num_params + num_opt {
            // Missing optional arguments fall back to `nil`; their default
            // expressions were already compiled into the function body's
            // prologue load sequence, so nothing further happens here.
            args.push(Value::nil());
        }
        if vari {
            let rest = if args.len() > num_params + num_opt {
                args.split_off(num_params + num_opt)
            } else {
                Vec::new()
            };
            let mut list = Value::empty();
            for mut v in rest.into_iter().rev() {
                let mut roots = self.gc_roots();
                roots.extend(args.iter_mut().map(|a| a as *mut Value));
                roots.push(&mut v);
                roots.push(&mut list);
                list = object::alloc_cons(&mut self.heap, v, list, &mut roots);
            }
            args.push(list);
        }
        Ok(())
    }

    fn run_until_return(&mut self) -> FnResult<Value> {
        loop {
            match self.step()? {
                Step::Continue => {}
                Step::Returned(v) => return Ok(v),
                Step::NeedImport(path) => {
                    self.load_import(&path)?;
                    self.istate.push(Value::nil());
                }
            }
        }
    }

    fn step(&mut self) -> FnResult<Step> {
        let (stub, pc, base) = {
            let f = self.istate.top_frame();
            (f.stub, f.pc, f.base)
        };
        let code = unsafe { &(*stub).code };
        let op = Op::from_byte(code[pc]);
        let mut next_pc = pc + 1;
        macro_rules! operand {
            ($n:expr) => {{
                let at = next_pc + $n * 4;
                decode_u32(code, at)
            }};
        }
        let result = match op {
            Op::LoadConst => {
                let idx = operand!(0);
                next_pc += 4;
                let v = unsafe { (*stub).const_arr[idx as usize] };
                self.istate.push(v);
                Step::Continue
            }
            Op::LoadNil => {
                self.istate.push(Value::nil());
                Step::Continue
            }
            Op::LoadBool => {
                let b = operand!(0) != 0;
                next_pc += 4;
                self.istate.push(Value::bool_value(b));
                Step::Continue
            }
            Op::GetLocal => {
                let slot = operand!(0) as usize;
                next_pc += 4;
                self.istate.push(self.istate.stack[base + slot]);
                Step::Continue
            }
            Op::SetLocal => {
                let slot = operand!(0) as usize;
                next_pc += 4;
                let v = self.istate.pop();
                self.istate.stack[base + slot] = v;
                Step::Continue
            }
            Op::GetUpval => {
                let slot = operand!(0) as usize;
                next_pc += 4;
                let func = self.istate.top_frame().func;
                let cell = unsafe { *(*func).upvals.add(slot) };
                let v = unsafe {
                    if (*cell).closed {
                        (*cell).val
                    } else {
                        self.istate.stack[(*cell).pos as usize]
                    }
                };
                self.istate.push(v);
                Step::Continue
            }
            Op::SetUpval => {
                let slot = operand!(0) as usize;
                next_pc += 4;
                let func = self.istate.top_frame().func;
                let cell = unsafe { *(*func).upvals.add(slot) };
                let v = self.istate.pop();
                unsafe {
                    if (*cell).closed {
                        (*cell).val = v;
                    } else {
                        self.istate.stack[(*cell).pos as usize] = v;
                    }
                }
                Step::Continue
            }
            Op::GetGlobal => {
                let sym = operand!(0);
                next_pc += 4;
                let ns = unsafe { (*stub).ns_id };
                match self.globals.resolve_sym(ns, sym, &self.sst) {
                    Some(slot) => self.istate.push(self.globals.globals[slot as usize]),
                    None => return Err(self.undefined_var_err(sym)),
                }
                Step::Continue
            }
            Op::SetGlobal => {
                let sym = operand!(0);
                next_pc += 4;
                let ns = unsafe { (*stub).ns_id };
                let v = self.istate.pop();
                match self.globals.resolve_sym(ns, sym, &self.sst) {
                    Some(slot) => self.globals.set_global(slot, v),
                    None => return Err(self.undefined_var_err(sym)),
                }
                Step::Continue
            }
            Op::DefGlobal => {
                let sym = operand!(0);
                next_pc += 4;
                let ns = unsafe { (*stub).ns_id };
                let v = self.istate.pop();
                self.globals.push_global(ns, sym, v);
                self.istate.push(Value::nil());
                Step::Continue
            }
            Op::NewTable => {
                let cap = operand!(0);
                next_pc += 4;
                let mut roots = self.gc_roots();
                let v = object::alloc_table(&mut self.heap, cap.max(4), &mut roots);
                self.istate.push(v);
                Step::Continue
            }
            Op::GetField => {
                let idx = operand!(0);
                next_pc += 4;
                let key = unsafe { (*stub).const_arr[idx as usize] };
                let obj = self.istate.pop();
                let v = table::get(obj, key).unwrap_or(Value::nil());
                self.istate.push(v);
                Step::Continue
            }
            Op::SetField => {
                let idx = operand!(0);
                next_pc += 4;
                let key = unsafe { (*stub).const_arr[idx as usize] };
                let val = self.istate.pop();
                let obj = self.istate.pop();
                table::set(&mut self.heap, obj, key, val);
                self.istate.push(Value::nil());
                Step::Continue
            }
            Op::Cons => {
                let mut tail = self.istate.pop();
                let mut head = self.istate.pop();
                let mut roots = self.gc_roots();
                roots.push(&mut head);
                roots.push(&mut tail);
                let v = object::alloc_cons(&mut self.heap, head, tail, &mut roots);
                self.istate.push(v);
                Step::Continue
            }
            Op::Car => {
                let v = self.istate.pop();
                self.istate.push(self.cons_field(v, true)?);
                Step::Continue
            }
            Op::Cdr => {
                let v = self.istate.pop();
                self.istate.push(self.cons_field(v, false)?);
                Step::Continue
            }
            Op::Closure => {
                let idx = operand!(0);
                next_pc += 4;
                let child_stub = unsafe { (*stub).sub_funs[idx as usize] };
                let v = self.make_closure(child_stub)?;
                self.istate.push(v);
                Step::Continue
            }
            Op::Call | Op::TailCall => {
                let argc = operand!(0) as usize;
                next_pc += 4;
                let mut args = self.istate.stack.split_off(self.istate.stack.len() - argc);
                let callee = self.istate.pop();
                if op == Op::TailCall {
                    self.istate.top_frame().pc = next_pc;
                    return self.do_tail_call(callee, &mut args);
                }
                self.istate.top_frame().pc = next_pc;
                let v = self.call_value(callee, std::mem::take(&mut args))?;
                self.istate.push(v);
                Step::Continue
            }
            Op::Apply => {
                let argc = operand!(0) as usize;
                next_pc += 4;
                let mut args = self.istate.stack.split_off(self.istate.stack.len() - argc);
                let callee = self.istate.pop();
                if let Some(last) = args.pop() {
                    let mut spread = self.list_to_vec(last)?;
                    args.append(&mut spread);
                }
                self.istate.top_frame().pc = next_pc;
                let v = self.call_value(callee, args)?;
                self.istate.push(v);
                Step::Continue
            }
            Op::Return => {
                let v = self.istate.pop();
                let frame = self.istate.frames.pop().unwrap();
                for (_, cell) in &frame.open_upvals {
                    let val = self.istate.stack[unsafe { (*cell).pos as usize }];
                    object::close_upvalue(*cell, val);
                }
                self.istate.stack.truncate(frame.base);
                Step::Returned(v)
            }
            Op::Jmp => {
                let target = operand!(0);
                next_pc = target as usize;
                Step::Continue
            }
            Op::JmpIfFalse => {
                let target = operand!(0);
                let cond = self.istate.pop();
                next_pc = if cond.truth() { next_pc + 4 } else { target as usize };
                Step::Continue
            }
            Op::Pop => {
                self.istate.pop();
                Step::Continue
            }
            Op::Dup => {
                let v = *self.istate.stack.last().unwrap();
                self.istate.push(v);
                Step::Continue
            }
            Op::CloseUpvals => {
                let from = operand!(0) as usize;
                next_pc += 4;
                self.close_upvals_from(base + from);
                Step::Continue
            }
            Op::Import => {
                let idx = operand!(0);
                let _sym = operand!(1);
                next_pc += 8;
                let path_val = unsafe { (*stub).const_arr[idx as usize] };
                let path = String::from_utf8_lossy(object::string_bytes(path_val).unwrap_or(&[])).into_owned();
                self.istate.top_frame().pc = next_pc;
                if self.loaded_modules.contains(&path) {
                    self.istate.push(Value::nil());
                    Step::Continue
                } else {
                    return Ok(Step::NeedImport(path));
                }
            }
            Op::Add | Op::Sub | Op::Mul | Op::Div => self.arith(op)?,
            Op::Eq => {
                let b = self.istate.pop();
                let a = self.istate.pop();
                self.istate.push(Value::bool_value(crate::vm::value_eq(a, b)));
                Step::Continue
            }
            Op::Lt => {
                let b = self.istate.pop();
                let a = self.istate.pop();
                let (Some(x), Some(y)) = (a.as_num(), b.as_num()) else {
                    return Err(self.rt_err("< requires numbers"));
                };
                self.istate.push(Value::bool_value(x < y));
                Step::Continue
            }
            Op::Not => {
                let v = self.istate.pop();
                self.istate.push(Value::bool_value(!v.truth()));
                Step::Continue
            }
        };
        if !matches!(result, Step::Returned(_) | Step::NeedImport(_)) {
            self.istate.top_frame().pc = next_pc;
        }
        Ok(result)
    }

    fn arith(&mut self, op: Op) -> FnResult<Step> {
        let b = self.istate.pop();
        let a = self.istate.pop();
        let (Some(x), Some(y)) = (a.as_num(), b.as_num()) else {
            return Err(self.rt_err("arithmetic requires numbers"));
        };
        let r = match op {
            Op::Add => x + y,
            Op::Sub => x - y,
            Op::Mul => x * y,
            Op::Div => x / y,
            _ => unreachable!(),
        };
        self.istate.push(Value::num(r));
        Ok(Step::Continue)
    }

    fn do_tail_call(&mut self, callee: Value, args: &mut Vec<Value>) -> FnResult<Step> {
        if let Some(id) = self.as_builtin(callee) {
            let func = self.builtins.get(id);
            let v = func(self, args)?;
            let frame = self.istate.frames.pop().unwrap();
            self.istate.stack.truncate(frame.base);
            return Ok(Step::Returned(v));
        }
        let Some(func_ptr) = self.as_function(callee) else {
            return Err(self.rt_err("call target is not a function"));
        };
        let stub = unsafe { (*func_ptr).stub };
        self.bind_args(stub, args)?;
        let frame = self.istate.frames.last_mut().unwrap();
        let base = frame.base;
        self.istate.stack.truncate(base);
        for &a in args.iter() {
            self.istate.stack.push(a);
        }
        let frame = self.istate.frames.last_mut().unwrap();
        frame.func = func_ptr;
        frame.stub = stub;
        frame.pc = 0;
        frame.open_upvals.clear();
        Ok(Step::Continue)
    }

    fn make_closure(&mut self, stub: *mut FunctionStub) -> FnResult<Value> {
        let n = unsafe { (*stub).num_upvals as usize };
        let mut cells = Vec::with_capacity(n);
        for i in 0..n {
            let (idx, direct) = unsafe { ((*stub).upvals[i], (*stub).upvals_direct[i]) };
            let cell = if direct {
                self.open_upval_for(idx as u32)
            } else {
                let func = self.istate.top_frame().func;
                unsafe { *(*func).upvals.add(idx as usize) }
            };
            cells.push(cell);
        }
        let mut roots = self.gc_roots();
        Ok(object::alloc_function(&mut self.heap, stub, cells, Vec::new(), &mut roots))
    }

    fn open_upval_for(&mut self, local_slot: u32) -> *mut UpvalueCell {
        let base = self.istate.top_frame().base;
        if let Some((_, cell)) = self.istate.top_frame().open_upvals.iter().find(|(s, _)| *s == local_slot) {
            return *cell;
        }
        let cell = object::alloc_upvalue_open((base as u32) + local_slot);
        self.istate.top_frame().open_upvals.push((local_slot, cell));
        cell
    }

    fn close_upvals_from(&mut self, stack_pos: usize) {
        let frame = self.istate.top_frame();
        let (keep, close): (Vec<_>, Vec<_>) = frame
            .open_upvals
            .drain(..)
            .partition(|(slot, _)| (*slot as usize) < stack_pos);
        frame.open_upvals = keep;
        for (_, cell) in close {
            let val = self.istate.stack[unsafe { (*cell).pos as usize }];
            object::close_upvalue(cell, val);
        }
    }

    fn cons_field(&mut self, v: Value, want_head: bool) -> FnResult<Value> {
        if v.tag() != Tag::Cons {
            return Err(self.rt_err("expected a cons cell"));
        }
        let ptr = v.as_ptr().unwrap() as *mut object::ConsCell;
        Ok(unsafe { if want_head { (*ptr).head } else { (*ptr).tail } })
    }

    pub fn list_to_vec(&mut self, mut v: Value) -> FnResult<Vec<Value>> {
        let mut out = Vec::new();
        loop {
            match v.tag() {
                Tag::Empty | Tag::Nil => return Ok(out),
                Tag::Cons => {
                    let ptr = v.as_ptr().unwrap() as *mut object::ConsCell;
                    unsafe {
                        out.push((*ptr).head);
                        v = (*ptr).tail;
                    }
                }
                _ => return Err(self.rt_err("expected a proper list")),
            }
        }
    }

    fn as_function(&self, v: Value) -> Option<*mut FunctionObj> {
        if v.tag() == Tag::Func {
            Some(v.as_ptr().unwrap() as *mut FunctionObj)
        } else {
            None
        }
    }

    fn as_builtin(&self, v: Value) -> Option<object::BuiltinId> {
        let ptr = self.as_function(v)?;
        unsafe { (*(*ptr).stub).foreign }
    }

    fn rt_err(&self, msg: impl Into<String>) -> FnError {
        FnError::new(FnErrorKind::Runtime, SourceLoc::default(), "<runtime>".to_string(), msg).with_trace(self.backtrace())
    }

    fn undefined_var_err(&self, sym: crate::symbol::SymbolId) -> FnError {
        self.rt_err(format!("undefined variable: {}", self.sst.symbol_name(sym)))
    }

    fn backtrace(&self) -> Vec<TraceFrame> {
        self.istate
            .frames
            .iter()
            .map(|f| TraceFrame {
                callee_name: self.sst.symbol_name(unsafe { (*f.stub).ns_id }).to_string(),
                pc: f.pc as u32,
            })
            .collect()
    }
}
