//! The generational copying/moving garbage collector. Grounded on
//! `gc.hpp`/`alloc.hpp`: a card-based heap split into nursery, survivor, and
//! tenured generations, bump allocation within a card, forwarding pointers
//! left behind by a copy, and a write barrier that dirties a card when it
//! comes to hold a pointer into a younger generation.
//!
//! Object layouts vary per kind (cons cell, table, function, ...), so the
//! collector doesn't know how to walk an object's interior pointers itself;
//! [`crate::object`] supplies a [`Tracer`] that does, the same separation of
//! concerns `alloc.hpp` (knows types) and `gc.hpp` (generic engine) keep in
//! the original.

pub mod card;
pub mod handle;
pub mod object;

use crate::config::VmOptions;
use crate::value::Value;
use card::{is_large, Card, Generation, GC_CARD_SIZE, GC_GEN_NURSERY, GC_GEN_SURVIVOR, GC_GEN_TENURED};
use handle::{Handle, HandleTable};
use object::{align_size, GcHeader, GcObjectKind};
use std::collections::HashSet;

/// Visits every `Value`-typed field directly stored in an object, letting
/// the collector rewrite it in place after a copy.
pub trait Tracer {
    /// # Safety
    /// `header` must be a live, non-forwarded object of the given `kind`.
    unsafe fn trace(&self, kind: GcObjectKind, header: *mut GcHeader, visit: &mut dyn FnMut(&mut Value));
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectLevel {
    Minor,
    Major,
    Full,
}

pub struct Heap<T: Tracer> {
    nursery: Generation,
    survivor: Generation,
    tenured: Generation,
    pub handles: HandleTable,
    tracer: T,
    tenure_age: u8,
    minor_cycles: u32,
    major_period: u32,
}

impl<T: Tracer> Heap<T> {
    pub fn new(opts: &VmOptions, tracer: T) -> Self {
        Self {
            nursery: Generation::new(GC_GEN_NURSERY, opts.nursery_cards),
            survivor: Generation::new(GC_GEN_SURVIVOR, opts.survivor_cards),
            tenured: Generation::new(GC_GEN_TENURED, usize::MAX),
            handles: HandleTable::new(),
            tracer,
            tenure_age: opts.tenure_age,
            minor_cycles: 0,
            major_period: opts.major_period,
        }
    }

    fn generation_mut(&mut self, gen: u8) -> &mut Generation {
        match gen {
            GC_GEN_NURSERY => &mut self.nursery,
            GC_GEN_SURVIVOR => &mut self.survivor,
            _ => &mut self.tenured,
        }
    }

    /// # Safety
    /// `size` must be the already-32-byte-aligned total allocation size and
    /// `roots` must cover every live `Value` reachable outside this heap
    /// (VM stack slots, globals, in-flight constant-table entries).
    pub unsafe fn alloc(&mut self, kind: GcObjectKind, size: usize, roots: &mut [*mut Value]) -> *mut GcHeader {
        let size = align_size(size);
        if !is_large(size) && self.nursery.over_budget() {
            self.collect(CollectLevel::Minor, roots);
        }
        let ptr = if is_large(size) {
            self.nursery.alloc_large(size)
        } else {
            self.nursery.alloc_small(size)
        };
        unsafe { GcHeader::init(ptr, kind, size as u32) };
        ptr
    }

    /// Write barrier: call immediately after storing `dest` into a field of
    /// the object owning `src_field`. Dirties `src_field`'s card if it now
    /// points into a younger generation.
    pub fn write_guard(&self, src_field: *mut GcHeader, dest: Value) {
        let Some(dest_ptr) = dest.as_ptr() else {
            return;
        };
        let src_gen = Self::card_header_of(src_field).gen;
        let dest_gen = Self::card_header_of(dest_ptr as *mut GcHeader).gen;
        if src_gen > dest_gen {
            Self::card_header_of(src_field).dirty = true;
        }
    }

    fn card_header_of(ptr: *mut GcHeader) -> &'static mut card::CardHeader {
        let base = (ptr as usize) & !(GC_CARD_SIZE - 1);
        unsafe { &mut *(base as *mut card::CardHeader) }
    }

    pub fn get_handle(&mut self, ptr: *mut GcHeader) -> Handle {
        self.handles.get(ptr)
    }

    pub fn release_handle(&mut self, h: Handle) {
        self.handles.release(h);
    }

    pub fn handle_value(&self, h: Handle, tag_of: impl Fn(*mut GcHeader) -> Value) -> Value {
        tag_of(self.handles.deref(h))
    }

    /// Run one collection cycle at the requested level. `roots` must list
    /// every `Value` slot outside the heap that might reference a
    /// from-space object (VM stack slice, active constant buffers).
    ///
    /// # Safety
    /// Every raw object pointer derived from a `Value` anywhere in this
    /// heap, any handle, or `roots` must currently be valid; none may be
    /// held across this call except through `roots`, handles, or re-reads
    /// through the stack.
    pub unsafe fn collect(&mut self, level: CollectLevel, roots: &mut [*mut Value]) {
        let from_gens: &[u8] = match level {
            CollectLevel::Minor => &[GC_GEN_NURSERY],
            CollectLevel::Major => &[GC_GEN_NURSERY, GC_GEN_SURVIVOR],
            CollectLevel::Full => &[GC_GEN_NURSERY, GC_GEN_SURVIVOR, GC_GEN_TENURED],
        };
        log::trace!("gc: collect level={level:?} from_gens={from_gens:?}");
        unsafe { self.evacuate(from_gens, roots) };
        self.minor_cycles = self.minor_cycles.wrapping_add(1);
    }

    /// Periodic check a VM driver loop can call after each minor cycle to
    /// decide whether the next one should be promoted to major/full.
    pub fn suggest_level(&self) -> CollectLevel {
        if self.major_period == 0 {
            return CollectLevel::Minor;
        }
        if self.minor_cycles % (self.major_period * self.major_period) == 0 && self.minor_cycles != 0 {
            CollectLevel::Full
        } else if self.minor_cycles % self.major_period == 0 && self.minor_cycles != 0 {
            CollectLevel::Major
        } else {
            CollectLevel::Minor
        }
    }

    unsafe fn evacuate(&mut self, from_gens: &[u8], roots: &mut [*mut Value]) {
        // Small-object cards belonging to a from-generation become from-space;
        // large-object cards belonging to a from-generation are reclassified
        // in place rather than copied, per spec.md §4.3.
        let mut from_space: HashSet<usize> = HashSet::new();
        let mut old_small_cards: Vec<Box<Card>> = Vec::new();

        for &g in from_gens {
            let gen = self.generation_mut(g);
            let taken = std::mem::take(&mut gen.cards);
            for card in &taken {
                from_space.insert(card.header() as *const _ as usize);
            }
            old_small_cards.extend(taken);

            let large = std::mem::take(&mut gen.large_cards);
            for card in large {
                let hdr = card.header_mut();
                let next_gen = match g {
                    GC_GEN_NURSERY => GC_GEN_SURVIVOR,
                    _ => GC_GEN_TENURED,
                };
                hdr.gen = next_gen;
                self.generation_mut(next_gen).large_cards.push(card);
            }
        }

        // Dirty old-generation cards (not in this cycle's from-space) are
        // extra roots: they may hold the only reference to a young object.
        // Record each dirty card's live byte range so its objects can be
        // walked one at a time, rather than treating the whole card as a
        // single traced object.
        let mut dirty_ranges: Vec<(usize, usize)> = Vec::new();
        for &g in &[GC_GEN_NURSERY, GC_GEN_SURVIVOR, GC_GEN_TENURED] {
            if from_gens.contains(&g) {
                continue;
            }
            let gen = self.generation_mut(g);
            for card in gen.cards.iter().chain(gen.large_cards.iter()) {
                if card.header().dirty {
                    let base = card.header() as *const _ as usize;
                    dirty_ranges.push((base, base + card.bytes_used()));
                    card.header_mut().dirty = false;
                }
            }
        }

        let mut worklist: Vec<*mut GcHeader> = Vec::new();
        let tenure_age = self.tenure_age;

        let in_from_space = |ptr: *mut GcHeader| -> bool {
            let base = (ptr as usize) & !(GC_CARD_SIZE - 1);
            from_space.contains(&base)
        };

        macro_rules! dest_for_age {
            ($src_gen:expr, $age:expr) => {
                if $age >= tenure_age {
                    GC_GEN_TENURED
                } else {
                    match $src_gen {
                        GC_GEN_NURSERY => GC_GEN_SURVIVOR,
                        GC_GEN_SURVIVOR => GC_GEN_SURVIVOR,
                        _ => GC_GEN_TENURED,
                    }
                }
            };
        }

        let mut copy_one = |heap_gens: &mut [Generation; 3], ptr: *mut GcHeader| -> *mut GcHeader {
            let header = unsafe { &mut *ptr };
            if header.is_forwarded() {
                return unsafe { header.forward_target() };
            }
            let src_gen = Self::card_header_of(ptr).gen;
            let age = header.age.saturating_add(1);
            let dest_gen = dest_for_age!(src_gen, age);
            let size = header.size as usize;
            let dest = {
                let gen = &mut heap_gens[dest_gen as usize];
                gen.alloc_small(size)
            };
            unsafe { std::ptr::copy_nonoverlapping(ptr as *const u8, dest as *mut u8, size) };
            unsafe { (*dest).age = age };
            unsafe { header.set_forward(dest) };
            dest
        };

        // `self.{nursery,survivor,tenured}` already carry their real budgets
        // from construction; moving them into a fixed-size array just lets
        // `copy_one` index by generation number instead of matching on it.
        let mut gens = [
            std::mem::replace(&mut self.nursery, Generation::new(GC_GEN_NURSERY, 0)),
            std::mem::replace(&mut self.survivor, Generation::new(GC_GEN_SURVIVOR, 0)),
            std::mem::replace(&mut self.tenured, Generation::new(GC_GEN_TENURED, 0)),
        ];

        let mut copy_ref = |v: &mut Value| {
            let Some(ptr) = v.as_ptr() else { return };
            let ptr = ptr as *mut GcHeader;
            if !in_from_space(ptr) {
                return;
            }
            let new_ptr = copy_one(&mut gens, ptr);
            if new_ptr != ptr {
                worklist.push(new_ptr);
            }
            *v = Value::retag_ptr(*v, new_ptr as u64);
        };

        for root in roots.iter_mut() {
            let v = unsafe { &mut **root };
            copy_ref(v);
        }
        self.handles.for_each_root_mut(|slot| {
            if !in_from_space(*slot) {
                return;
            }
            *slot = copy_one(&mut gens, *slot);
        });
        let header_size = align_size(std::mem::size_of::<card::CardHeader>());
        for (base, used) in dirty_ranges {
            let mut cur = base + header_size;
            while cur < used {
                let obj = cur as *mut GcHeader;
                let (kind, size) = unsafe { ((*obj).kind, (*obj).size as usize) };
                if kind != GcObjectKind::Forward {
                    unsafe {
                        self.tracer.trace(kind, obj, &mut copy_ref);
                    }
                }
                cur += size;
            }
        }
        while let Some(ptr) = worklist.pop() {
            let kind = unsafe { (*ptr).kind };
            unsafe {
                self.tracer.trace(kind, ptr, &mut copy_ref);
            }
        }

        let [g0, g1, g2] = gens;
        self.nursery = g0;
        self.survivor = g1;
        self.tenured = g2;

        drop(old_small_cards);
    }
}
