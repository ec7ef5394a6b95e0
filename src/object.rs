//! Heap object layouts and their constructors. Grounded on `obj.hpp`'s
//! `fn_string`/`fn_cons`/`fn_table`/`function_stub`/`fn_function`/
//! `upvalue_cell`, and on `alloc.hpp`'s allocation routines: fill
//! non-pointer fields first, pin intermediates in handles across any
//! allocation that could move them, and only then write pointer fields
//! (which must go through the write barrier).

use crate::gc::card::is_large;
use crate::gc::object::{align_size, GcHeader, GcObjectKind};
use crate::gc::{Heap, Tracer};
use crate::symbol::SymbolId;
use crate::value::Value;

/// Knows how to walk the `Value`-typed interior pointers of every object
/// kind this interpreter defines. Handed to [`Heap`] so the generic
/// collector can trace without knowing concrete layouts.
pub struct FnTracer;

impl Tracer for FnTracer {
    unsafe fn trace(&self, kind: GcObjectKind, header: *mut GcHeader, visit: &mut dyn FnMut(&mut Value)) {
        unsafe {
            match kind {
                GcObjectKind::Cons => {
                    let cons = header as *mut ConsCell;
                    visit(&mut (*cons).head);
                    visit(&mut (*cons).tail);
                }
                GcObjectKind::Table => {
                    let table = header as *mut TableObj;
                    let len = (*table).cap as usize * 2;
                    let slots = std::slice::from_raw_parts_mut((*table).data, len);
                    for v in slots {
                        visit(v);
                    }
                    visit(&mut (*table).metatable);
                }
                GcObjectKind::Function => {
                    let func = header as *mut FunctionObj;
                    let n = (*(*func).stub).num_upvals as usize;
                    let upvals = std::slice::from_raw_parts((*func).upvals, n);
                    for uv in upvals {
                        let cell = *uv;
                        if (*cell).closed {
                            visit(&mut (*cell).val);
                        }
                    }
                    let m = (*(*func).stub).num_opt as usize;
                    let inits = std::slice::from_raw_parts_mut((*func).init_vals, m);
                    for v in inits {
                        visit(v);
                    }
                }
                GcObjectKind::Vector => {
                    let vec = header as *mut VectorObj;
                    let slots = std::slice::from_raw_parts_mut((*vec).data, (*vec).len as usize);
                    for v in slots {
                        visit(v);
                    }
                }
                GcObjectKind::String | GcObjectKind::GcBytes | GcObjectKind::VectorNode => {
                    // No `Value` fields: raw bytes.
                }
                GcObjectKind::Forward => unreachable!("traced a forwarded object"),
            }
        }
    }
}

#[repr(C)]
pub struct StringObj {
    pub h: GcHeader,
    pub len: u32,
    pub data: *mut u8,
}

#[repr(C)]
pub struct ConsCell {
    pub h: GcHeader,
    pub head: Value,
    pub tail: Value,
}

#[repr(C)]
pub struct TableObj {
    pub h: GcHeader,
    pub size: u32,
    pub cap: u32,
    pub rehash: u32,
    pub data: *mut Value,
    pub metatable: Value,
}

#[repr(C)]
pub struct VectorObj {
    pub h: GcHeader,
    pub len: u32,
    pub data: *mut Value,
}

/// Like `FunctionStub`, an upvalue cell is reached only through raw pointers
/// (a `FunctionObj`'s upvalue array, a `Frame`'s open-upvalue list), never a
/// `Value`, so it lives on the system heap rather than the moving one. Its
/// `val` field still holds real GC pointers once closed over; those stay
/// correct across a collection because `FnTracer`'s `Function` arm visits
/// each closed cell's `val` in place when it traces the owning function.
#[repr(C)]
pub struct UpvalueCell {
    pub closed: bool,
    /// Stack position when open; meaningless once `closed`.
    pub pos: u32,
    pub val: Value,
}

/// Index into the VM's builtin registry ([`crate::builtin`]); stands in for
/// `function_stub`'s native-function pointer in a form that doesn't need
/// `unsafe extern "C"` plumbing for a closure-based registry.
pub type BuiltinId = u32;

/// Unlike every other heap layout in this module, `FunctionStub` is not
/// moved by the collector: it's reached only through the raw `stub` pointer
/// on a `FunctionObj`, never through a `Value`, so the copying collector's
/// `Value`-rooted trace would never find it to relocate or keep it alive.
/// Compiled code objects are therefore allocated on the system heap and
/// leaked for the life of the process, the way `obj.hpp`'s stub lives
/// outside the moving heap in spirit (there it's kept alive by its owning
/// namespace's def table instead).
#[repr(C)]
pub struct FunctionStub {
    pub foreign: Option<BuiltinId>,
    pub num_params: u8,
    pub num_opt: u8,
    pub vari: bool,
    pub space: u8,
    pub ns_id: SymbolId,
    pub name: *mut StringObj,
    pub code: Vec<u8>,
    pub const_arr: Vec<Value>,
    pub sub_funs: Vec<*mut FunctionStub>,
    pub num_upvals: u32,
    /// Direct upvalues hold a stack slot index; indirect ones hold the
    /// parent's upvalue index. See `upvals_direct`.
    pub upvals: Vec<u8>,
    pub upvals_direct: Vec<bool>,
}

#[repr(C)]
pub struct FunctionObj {
    pub h: GcHeader,
    pub stub: *mut FunctionStub,
    pub upvals: *mut *mut UpvalueCell,
    pub init_vals: *mut Value,
}

fn do_alloc<T: Tracer>(heap: &mut Heap<T>, kind: GcObjectKind, size: usize, roots: &mut [*mut Value]) -> *mut GcHeader {
    unsafe { heap.alloc(kind, align_size(size), roots) }
}

pub fn alloc_string<T: Tracer>(heap: &mut Heap<T>, bytes: &[u8], roots: &mut [*mut Value]) -> Value {
    let size = std::mem::size_of::<StringObj>() + bytes.len();
    let header = do_alloc(heap, GcObjectKind::String, size, roots);
    let obj = header as *mut StringObj;
    unsafe {
        let data_ptr = (obj as *mut u8).add(std::mem::size_of::<StringObj>());
        std::ptr::copy_nonoverlapping(bytes.as_ptr(), data_ptr, bytes.len());
        (*obj).len = bytes.len() as u32;
        (*obj).data = data_ptr;
    }
    Value::string_ptr(obj as u64)
}

pub fn alloc_cons<T: Tracer>(heap: &mut Heap<T>, head: Value, tail: Value, roots: &mut [*mut Value]) -> Value {
    let header = do_alloc(heap, GcObjectKind::Cons, std::mem::size_of::<ConsCell>(), roots);
    let obj = header as *mut ConsCell;
    unsafe {
        (*obj).head = head;
        (*obj).tail = tail;
    }
    heap.write_guard(header, head);
    heap.write_guard(header, tail);
    Value::cons_ptr(obj as u64)
}

pub fn alloc_table<T: Tracer>(heap: &mut Heap<T>, cap: u32, roots: &mut [*mut Value]) -> Value {
    let slots = cap as usize * 2;
    // The inline key/value array is reached only through `TableObj.data`, a
    // raw pointer rather than a `Value`, so the copying collector would
    // never relocate it or keep it alive across a cycle. It's leaked on the
    // system heap instead, alongside `FunctionStub` (see its doc comment);
    // only the `TableObj` header itself — reachable via a tagged `Value` —
    // lives in the moving heap and gets traced.
    let data_ptr = Box::leak(vec![Value::nil(); slots].into_boxed_slice()).as_mut_ptr();
    let header = do_alloc(heap, GcObjectKind::Table, std::mem::size_of::<TableObj>(), roots);
    let obj = header as *mut TableObj;
    unsafe {
        (*obj).size = 0;
        (*obj).cap = cap;
        (*obj).rehash = (cap * 3 / 4).max(1);
        (*obj).data = data_ptr;
        (*obj).metatable = Value::nil();
    }
    Value::table_ptr(obj as u64)
}

pub fn alloc_upvalue_open(stack_pos: u32) -> *mut UpvalueCell {
    Box::leak(Box::new(UpvalueCell {
        closed: false,
        pos: stack_pos,
        val: Value::nil(),
    }))
}

/// No write barrier here: `uv` is leaked system-heap memory, not a card the
/// collector owns, so there's no dirty bit to set. `value` stays correct
/// across a collection via `FnTracer`'s `Function` arm instead, which visits
/// every closed cell hanging off a live function's upvalue array.
pub fn close_upvalue(uv: *mut UpvalueCell, value: Value) {
    unsafe {
        (*uv).closed = true;
        (*uv).val = value;
    }
}

/// Reify a compiled function into a `function_stub`. Direct upvalues whose
/// stack position repeats are deduplicated by the compiler before this is
/// called, per spec.md §4.4. Lives on the system heap — see the struct's
/// doc comment for why.
#[allow(clippy::too_many_arguments)]
pub fn alloc_function_stub(
    num_params: u8,
    num_opt: u8,
    vari: bool,
    space: u8,
    ns_id: SymbolId,
    code: Vec<u8>,
    const_arr: Vec<Value>,
    sub_funs: Vec<*mut FunctionStub>,
    upvals: Vec<u8>,
    upvals_direct: Vec<bool>,
    foreign: Option<BuiltinId>,
) -> *mut FunctionStub {
    debug_assert_eq!(upvals.len(), upvals_direct.len());
    let num_upvals = upvals.len() as u32;
    Box::leak(Box::new(FunctionStub {
        foreign,
        num_params,
        num_opt,
        vari,
        space,
        ns_id,
        name: std::ptr::null_mut(),
        code,
        const_arr,
        sub_funs,
        num_upvals,
        upvals,
        upvals_direct,
    }))
}

pub fn alloc_function<T: Tracer>(
    heap: &mut Heap<T>,
    stub: *mut FunctionStub,
    upvals: Vec<*mut UpvalueCell>,
    init_vals: Vec<Value>,
    roots: &mut [*mut Value],
) -> Value {
    // Same reasoning as `alloc_table`'s data array: these satellite arrays
    // hang off `FunctionObj` through raw pointers the collector's `Value`
    // trace never sees, so they're leaked on the system heap rather than
    // the moving one. The upvalue cells they point at are leaked too (see
    // `UpvalueCell`'s doc comment); only the `Value`s those cells close
    // over need to stay correct across a collection, which `FnTracer`'s
    // `Function` arm handles directly.
    let upvals_header = if upvals.is_empty() {
        std::ptr::null_mut()
    } else {
        Box::leak(upvals.into_boxed_slice()).as_mut_ptr()
    };
    let init_header = if init_vals.is_empty() {
        std::ptr::null_mut()
    } else {
        Box::leak(init_vals.into_boxed_slice()).as_mut_ptr()
    };
    let header = do_alloc(heap, GcObjectKind::Function, std::mem::size_of::<FunctionObj>(), roots);
    let obj = header as *mut FunctionObj;
    unsafe {
        (*obj).stub = stub;
        (*obj).upvals = upvals_header;
        (*obj).init_vals = init_header;
    }
    Value::func_ptr(obj as u64)
}

pub fn string_bytes<'a>(v: Value) -> Option<&'a [u8]> {
    let ptr = v.as_ptr()? as *mut StringObj;
    unsafe { Some(std::slice::from_raw_parts((*ptr).data, (*ptr).len as usize)) }
}

pub fn is_large_size(size: usize) -> bool {
    is_large(align_size(size))
}
