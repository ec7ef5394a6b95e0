//! Table key/value access. Grounded on `obj.hpp`'s `fn_table`: a flat
//! inline array of `(key, value)` pairs scanned linearly, since the spec's
//! Non-goals exclude the original's open-addressing hash table in favor of
//! the simpler "unary" layout (see SPEC_FULL.md §11).

use crate::gc::Tracer;
use crate::object::TableObj;
use crate::value::{Tag, Value};

fn slots(table: *mut TableObj) -> &'static mut [Value] {
    unsafe { std::slice::from_raw_parts_mut((*table).data, (*table).cap as usize * 2) }
}

pub fn get(obj: Value, key: Value) -> Option<Value> {
    if obj.tag() != Tag::Table {
        return None;
    }
    let table = obj.as_ptr()? as *mut TableObj;
    let pairs = slots(table);
    for pair in pairs.chunks_exact(2) {
        if !pair[0].is_nil() && super::value_eq(pair[0], key) {
            return Some(pair[1]);
        }
    }
    None
}

pub fn set<T: Tracer>(heap: &mut crate::gc::Heap<T>, obj: Value, key: Value, val: Value) {
    let Tag::Table = obj.tag() else { return };
    let Some(addr) = obj.as_ptr() else { return };
    let table = addr as *mut TableObj;
    let pairs = slots(table);
    for pair in pairs.chunks_exact_mut(2) {
        if !pair[0].is_nil() && super::value_eq(pair[0], key) {
            pair[1] = val;
            heap.write_guard(table as *mut crate::gc::object::GcHeader, val);
            return;
        }
    }
    for pair in pairs.chunks_exact_mut(2) {
        if pair[0].is_nil() {
            pair[0] = key;
            pair[1] = val;
            heap.write_guard(table as *mut crate::gc::object::GcHeader, key);
            heap.write_guard(table as *mut crate::gc::object::GcHeader, val);
            unsafe {
                (*table).size += 1;
            }
            return;
        }
    }
    // Out of inline slots. Growing the table is a `grow_table`-style
    // reallocate-and-copy that this implementation doesn't yet perform;
    // callers should size tables generously until that lands.
}
