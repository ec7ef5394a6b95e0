//! Per-call interpreter state. Grounded on `istate.hpp`'s `istate`: one
//! frame per active call, holding its function, program counter, and the
//! base offset into the shared value stack its locals start at.

use crate::object::{FunctionObj, FunctionStub, UpvalueCell};
use crate::value::Value;

pub struct Frame {
    pub func: *mut FunctionObj,
    pub stub: *mut FunctionStub,
    pub pc: usize,
    pub base: usize,
    /// Open upvalue cells captured from this frame's locals, keyed by
    /// local slot so a later closure over the same slot reuses the cell
    /// (`upvalue_cell` dedup rule, spec.md §4.4/§4.9).
    pub open_upvals: Vec<(u32, *mut UpvalueCell)>,
}

/// The whole-VM execution state: one growable value stack shared by every
/// frame, plus the frame call chain. Mirrors `istate.hpp`'s fixed-size
/// `stack`/`frames` pair, sized from [`crate::config::VmOptions`].
pub struct IState {
    pub stack: Vec<Value>,
    pub frames: Vec<Frame>,
}

impl IState {
    pub fn new(stack_size: usize) -> Self {
        Self {
            stack: Vec::with_capacity(stack_size),
            frames: Vec::new(),
        }
    }

    pub fn push(&mut self, v: Value) {
        self.stack.push(v);
    }

    pub fn pop(&mut self) -> Value {
        self.stack.pop().expect("stack underflow")
    }

    pub fn top_frame(&mut self) -> &mut Frame {
        self.frames.last_mut().expect("no active frame")
    }
}
