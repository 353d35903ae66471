//! A relocating managed heap with a handle table.
//!
//! Objects live in a `gc-arena` arena and are only reachable from native code through handle
//! slots. Slots are either global (owned by the managed side until deleted) or local (owned by
//! the innermost reference frame). Relocation copies an object to a fresh allocation and
//! repoints every slot, which is exactly what a compacting collector does at a safepoint.
use crate::{
    context::ResolveError,
    handle::{ObjectHandle, RawAddress},
};
use gc_arena::{Arena, Collect, Gc, Rootable};
use thiserror::Error;
use tracing::trace;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeError {
    #[error("no local reference frame is active")]
    NoActiveFrame,
    #[error("invalid handle {0:?}")]
    InvalidHandle(ObjectHandle),
    #[error("handle {0:?} is not a global reference")]
    NotGlobal(ObjectHandle),
}

#[derive(Clone, Debug, PartialEq, Eq, Collect)]
#[collect(require_static)]
pub struct ManagedObject {
    pub class: String,
    pub fields: Vec<i64>,
}

impl ManagedObject {
    pub fn new(class: impl Into<String>) -> Self {
        Self {
            class: class.into(),
            fields: vec![],
        }
    }

    pub fn with_fields(class: impl Into<String>, fields: Vec<i64>) -> Self {
        Self {
            class: class.into(),
            fields,
        }
    }
}

#[derive(Collect)]
#[collect(no_drop)]
struct HeapRoot<'gc> {
    slots: Vec<Option<Gc<'gc, ManagedObject>>>,
}

type HeapArena = Arena<Rootable![HeapRoot<'_>]>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum SlotKind {
    Local,
    Global,
}

/// Handle tokens pack `index + 1` in the low half and the slot generation in the high half, so
/// a handle to a released slot stays invalid after the slot is reused.
const INDEX_BITS: u32 = usize::BITS / 2;
const INDEX_MASK: usize = (1 << INDEX_BITS) - 1;
const GENERATION_MASK: usize = usize::MAX >> INDEX_BITS;

#[derive(Clone, Copy, Debug, Default)]
struct SlotState {
    kind: Option<SlotKind>,
    generation: usize,
}

pub struct ManagedHeap {
    arena: HeapArena,
    // parallel to `HeapRoot::slots`
    states: Vec<SlotState>,
    free: Vec<usize>,
    frames: Vec<Vec<usize>>,
}

impl Default for ManagedHeap {
    fn default() -> Self {
        Self::new()
    }
}

impl ManagedHeap {
    pub fn new() -> Self {
        Self {
            arena: HeapArena::new(|_mc| HeapRoot { slots: vec![] }),
            states: vec![],
            free: vec![],
            frames: vec![],
        }
    }

    fn handle_for(&self, index: usize) -> ObjectHandle {
        let generation = self.states[index].generation;
        ObjectHandle::from_token((generation << INDEX_BITS) | (index + 1))
    }

    fn index_of(&self, handle: ObjectHandle) -> Option<(usize, SlotKind)> {
        let token = handle.token();
        let index = (token & INDEX_MASK).checked_sub(1)?;
        let state = self.states.get(index)?;
        if state.generation != token >> INDEX_BITS {
            return None;
        }
        Some((index, state.kind?))
    }

    fn slot(&self, handle: ObjectHandle) -> Result<usize, RuntimeError> {
        self.index_of(handle)
            .map(|(index, _)| index)
            .ok_or(RuntimeError::InvalidHandle(handle))
    }

    fn claim(&mut self, kind: SlotKind) -> usize {
        if let Some(index) = self.free.pop() {
            self.states[index].kind = Some(kind);
            return index;
        }
        self.states.push(SlotState {
            kind: Some(kind),
            generation: 0,
        });
        self.arena.mutate_root(|_, root| root.slots.push(None));
        self.states.len() - 1
    }

    fn release(&mut self, index: usize) {
        let state = &mut self.states[index];
        state.kind = None;
        state.generation = state.generation.wrapping_add(1) & GENERATION_MASK;
        self.arena.mutate_root(|_, root| root.slots[index] = None);
        self.free.push(index);
    }

    fn duplicate(&mut self, source: usize, kind: SlotKind) -> usize {
        let index = self.claim(kind);
        self.arena
            .mutate_root(|_, root| root.slots[index] = root.slots[source]);
        index
    }

    /// Allocates a new object and returns a global handle to it.
    pub fn allocate(&mut self, object: ManagedObject) -> ObjectHandle {
        let index = self.claim(SlotKind::Global);
        self.arena
            .mutate_root(|mc, root| root.slots[index] = Some(Gc::new(mc, object)));
        self.handle_for(index)
    }

    pub fn push_frame(&mut self) {
        self.frames.push(vec![]);
    }

    /// Drops the innermost frame, invalidating every local handle created in it.
    pub fn pop_frame(&mut self) -> Result<(), RuntimeError> {
        let frame = self.frames.pop().ok_or(RuntimeError::NoActiveFrame)?;
        for index in frame {
            self.release(index);
        }
        Ok(())
    }

    pub fn frame_depth(&self) -> usize {
        self.frames.len()
    }

    /// Creates a local handle in the innermost frame referring to the same object as `handle`.
    pub fn new_local(&mut self, handle: ObjectHandle) -> Result<ObjectHandle, RuntimeError> {
        if self.frames.is_empty() {
            return Err(RuntimeError::NoActiveFrame);
        }
        let source = self.slot(handle)?;
        let index = self.duplicate(source, SlotKind::Local);
        if let Some(frame) = self.frames.last_mut() {
            frame.push(index);
        }
        Ok(self.handle_for(index))
    }

    /// Promotes any handle to a durable global handle.
    pub fn new_global(&mut self, handle: ObjectHandle) -> Result<ObjectHandle, RuntimeError> {
        let source = self.slot(handle)?;
        let index = self.duplicate(source, SlotKind::Global);
        Ok(self.handle_for(index))
    }

    pub fn delete_global(&mut self, handle: ObjectHandle) -> Result<(), RuntimeError> {
        match self.index_of(handle) {
            Some((index, SlotKind::Global)) => {
                self.release(index);
                Ok(())
            }
            Some((_, SlotKind::Local)) => Err(RuntimeError::NotGlobal(handle)),
            None => Err(RuntimeError::InvalidHandle(handle)),
        }
    }

    pub fn is_live(&self, handle: ObjectHandle) -> bool {
        self.index_of(handle).is_some()
    }

    pub fn live_handles(&self) -> usize {
        self.states.iter().filter(|s| s.kind.is_some()).count()
    }

    pub fn same_object(&self, a: ObjectHandle, b: ObjectHandle) -> Result<bool, RuntimeError> {
        let (a, b) = (self.slot(a)?, self.slot(b)?);
        Ok(self.arena.mutate(|_, root| match (root.slots[a], root.slots[b]) {
            (Some(a), Some(b)) => Gc::ptr_eq(a, b),
            _ => false,
        }))
    }

    pub fn object(&self, handle: ObjectHandle) -> Result<ManagedObject, RuntimeError> {
        let index = self.slot(handle)?;
        self.arena
            .mutate(|_, root| root.slots[index].map(|o| (*o).clone()))
            .ok_or(RuntimeError::InvalidHandle(handle))
    }

    /// The address currently backing `handle`'s object.
    pub fn resolve(&self, handle: ObjectHandle) -> Result<RawAddress, ResolveError> {
        if handle.is_null() {
            return Err(ResolveError::NullHandle);
        }
        let (index, _) = self
            .index_of(handle)
            .ok_or(ResolveError::StaleHandle(handle))?;
        self.arena
            .mutate(|_, root| {
                root.slots
                    .get(index)
                    .copied()
                    .flatten()
                    .map(|o| RawAddress::from_ptr(Gc::as_ptr(o)))
            })
            .ok_or(ResolveError::StaleHandle(handle))
    }

    /// Moves `handle`'s object to a new allocation and repoints every slot that referred to it.
    ///
    /// The old copy stays allocated until the next [`collect`](Self::collect), so the new
    /// address always differs from the old one.
    pub fn relocate(&mut self, handle: ObjectHandle) -> Result<(), RuntimeError> {
        let index = self.slot(handle)?;
        let moved = self.arena.mutate_root(|mc, root| {
            let old = root.slots[index]?;
            let new = Gc::new(mc, (*old).clone());
            let mut moved = 0;
            for slot in root.slots.iter_mut() {
                if slot.is_some_and(|o| Gc::ptr_eq(o, old)) {
                    *slot = Some(new);
                    moved += 1;
                }
            }
            Some(moved)
        });
        trace!(?handle, slots = ?moved, "relocated object");
        moved.map(|_| ()).ok_or(RuntimeError::InvalidHandle(handle))
    }

    /// Runs a full collection, freeing unreachable objects and stale copies.
    pub fn collect(&mut self) {
        self.arena.collect_all();
    }
}
