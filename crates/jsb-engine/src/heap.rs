//! Script Heap
//!
//! Arena of garbage-collected cells. Slots are reused through a free list;
//! every reuse bumps the slot generation so stale `GcRef`s are rejected.

use crate::class::ClassId;
use crate::engine::NativeFn;
use crate::error::EngineError;
use crate::value::{GcRef, Value};

/// Named property of an object
pub(crate) struct Property {
    pub(crate) name: String,
    pub(crate) value: Value,
    pub(crate) enumerable: bool,
}

/// Native function stored in a function object
pub(crate) struct NativeFunction<H> {
    pub(crate) name: String,
    pub(crate) native: NativeFn<H>,
}

/// What an object is, beyond its properties
pub(crate) enum ObjectKind<H> {
    Ordinary,
    Array(Vec<Value>),
    Function(NativeFunction<H>),
}

/// A script object
pub(crate) struct JsObject<H> {
    pub(crate) class: ClassId,
    pub(crate) proto: Option<GcRef>,
    pub(crate) props: Vec<Property>,
    pub(crate) kind: ObjectKind<H>,
    pub(crate) private: Option<u64>,
}

impl<H> JsObject<H> {
    pub(crate) fn new(class: ClassId, proto: Option<GcRef>, kind: ObjectKind<H>) -> Self {
        Self {
            class,
            proto,
            props: Vec::new(),
            kind,
            private: None,
        }
    }

    pub(crate) fn own(&self, name: &str) -> Option<&Property> {
        self.props.iter().find(|p| p.name == name)
    }

    /// Insert or overwrite an own property.
    pub(crate) fn put(&mut self, name: &str, value: Value, enumerable: bool) {
        match self.props.iter_mut().find(|p| p.name == name) {
            Some(prop) => {
                prop.value = value;
                prop.enumerable = enumerable;
            }
            None => self.props.push(Property {
                name: name.to_string(),
                value,
                enumerable,
            }),
        }
    }
}

pub(crate) enum Cell<H> {
    String(String),
    Object(JsObject<H>),
}

struct Slot<H> {
    generation: u32,
    marked: bool,
    cell: Option<Cell<H>>,
}

/// A swept object that still needs its class finalizer run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Finalizable {
    pub(crate) class: ClassId,
    pub(crate) private: u64,
}

/// Result of a sweep
#[derive(Debug, Default)]
pub(crate) struct SweepResult {
    pub(crate) freed: usize,
    pub(crate) finalizable: Vec<Finalizable>,
}

/// Heap statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HeapStats {
    /// Cells currently alive
    pub live_cells: usize,
    /// Slots in the arena (live + free)
    pub capacity: usize,
    /// Total cells ever allocated
    pub total_allocated: u64,
}

pub(crate) struct Heap<H> {
    slots: Vec<Slot<H>>,
    free: Vec<u32>,
    live: usize,
    total_allocated: u64,
    allocs_since_gc: usize,
}

impl<H> Heap<H> {
    pub(crate) fn new(initial_cells: usize) -> Self {
        Self {
            slots: Vec::with_capacity(initial_cells),
            free: Vec::new(),
            live: 0,
            total_allocated: 0,
            allocs_since_gc: 0,
        }
    }

    pub(crate) fn alloc(&mut self, cell: Cell<H>) -> GcRef {
        self.live += 1;
        self.total_allocated += 1;
        self.allocs_since_gc += 1;

        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.cell = Some(cell);
            slot.marked = false;
            GcRef::new(index, slot.generation)
        } else {
            let index = self.slots.len() as u32;
            self.slots.push(Slot {
                generation: 0,
                marked: false,
                cell: Some(cell),
            });
            GcRef::new(index, 0)
        }
    }

    pub(crate) fn allocs_since_gc(&self) -> usize {
        self.allocs_since_gc
    }

    fn slot(&self, r: GcRef) -> Option<&Slot<H>> {
        self.slots
            .get(r.index as usize)
            .filter(|s| s.generation == r.generation && s.cell.is_some())
    }

    pub(crate) fn is_live(&self, r: GcRef) -> bool {
        self.slot(r).is_some()
    }

    pub(crate) fn get(&self, r: GcRef) -> Result<&Cell<H>, EngineError> {
        self.slot(r)
            .and_then(|s| s.cell.as_ref())
            .ok_or(EngineError::StaleReference(r))
    }

    pub(crate) fn get_mut(&mut self, r: GcRef) -> Result<&mut Cell<H>, EngineError> {
        self.slots
            .get_mut(r.index as usize)
            .filter(|s| s.generation == r.generation)
            .and_then(|s| s.cell.as_mut())
            .ok_or(EngineError::StaleReference(r))
    }

    pub(crate) fn object(&self, r: GcRef) -> Result<&JsObject<H>, EngineError> {
        match self.get(r)? {
            Cell::Object(obj) => Ok(obj),
            Cell::String(_) => Err(EngineError::NotAnObject),
        }
    }

    pub(crate) fn object_mut(&mut self, r: GcRef) -> Result<&mut JsObject<H>, EngineError> {
        match self.get_mut(r)? {
            Cell::Object(obj) => Ok(obj),
            Cell::String(_) => Err(EngineError::NotAnObject),
        }
    }

    pub(crate) fn string(&self, r: GcRef) -> Result<&str, EngineError> {
        match self.get(r)? {
            Cell::String(s) => Ok(s),
            Cell::Object(_) => Err(EngineError::NotAString),
        }
    }

    pub(crate) fn clear_marks(&mut self) {
        for slot in &mut self.slots {
            slot.marked = false;
        }
    }

    /// Mark a live cell. Returns true if it was not marked before.
    pub(crate) fn mark(&mut self, r: GcRef) -> bool {
        match self.slots.get_mut(r.index as usize) {
            Some(slot) if slot.generation == r.generation && slot.cell.is_some() => {
                !std::mem::replace(&mut slot.marked, true)
            }
            _ => false,
        }
    }

    /// Push every heap reference held by `r` onto `out`.
    pub(crate) fn children(&self, r: GcRef, out: &mut Vec<GcRef>) {
        let Ok(Cell::Object(obj)) = self.get(r) else {
            return;
        };
        out.extend(obj.proto);
        out.extend(obj.props.iter().filter_map(|p| p.value.gc_ref()));
        if let ObjectKind::Array(elements) = &obj.kind {
            out.extend(elements.iter().filter_map(|v| v.gc_ref()));
        }
    }

    /// Free every unmarked cell.
    pub(crate) fn sweep(&mut self) -> SweepResult {
        self.allocs_since_gc = 0;
        self.release(|slot| !slot.marked)
    }

    /// Free every cell (engine teardown).
    pub(crate) fn free_all(&mut self) -> SweepResult {
        self.release(|_| true)
    }

    fn release(&mut self, mut doomed: impl FnMut(&Slot<H>) -> bool) -> SweepResult {
        let mut result = SweepResult::default();

        for (index, slot) in self.slots.iter_mut().enumerate() {
            if slot.cell.is_none() || !doomed(slot) {
                continue;
            }
            if let Some(Cell::Object(obj)) = slot.cell.take() {
                if let Some(private) = obj.private {
                    result.finalizable.push(Finalizable {
                        class: obj.class,
                        private,
                    });
                }
            }
            slot.generation = slot.generation.wrapping_add(1);
            slot.marked = false;
            self.free.push(index as u32);
            result.freed += 1;
        }

        self.live -= result.freed;
        result
    }

    pub(crate) fn stats(&self) -> HeapStats {
        HeapStats {
            live_cells: self.live,
            capacity: self.slots.len(),
            total_allocated: self.total_allocated,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plain() -> Cell<()> {
        Cell::Object(JsObject::new(ClassId::OBJECT, None, ObjectKind::Ordinary))
    }

    #[test]
    fn test_alloc_and_get() {
        let mut heap: Heap<()> = Heap::new(4);
        let s = heap.alloc(Cell::String("hello".into()));
        assert_eq!(heap.string(s).ok(), Some("hello"));
        assert!(heap.object(s).is_err());
        assert_eq!(heap.stats().live_cells, 1);
    }

    #[test]
    fn test_sweep_unmarked() {
        let mut heap: Heap<()> = Heap::new(4);
        let keep = heap.alloc(plain());
        let drop = heap.alloc(plain());

        heap.clear_marks();
        assert!(heap.mark(keep));
        assert!(!heap.mark(keep));
        let result = heap.sweep();

        assert_eq!(result.freed, 1);
        assert!(heap.is_live(keep));
        assert!(!heap.is_live(drop));
        assert_eq!(heap.get(drop).err(), Some(EngineError::StaleReference(drop)));
    }

    #[test]
    fn test_reused_slot_rejects_stale_ref() {
        let mut heap: Heap<()> = Heap::new(4);
        let old = heap.alloc(plain());
        heap.clear_marks();
        heap.sweep();

        let new = heap.alloc(plain());
        assert_eq!(old.index(), new.index());
        assert!(!heap.is_live(old));
        assert!(heap.is_live(new));
    }

    #[test]
    fn test_sweep_reports_private_slots() {
        let mut heap: Heap<()> = Heap::new(4);
        let r = heap.alloc(plain());
        heap.object_mut(r).unwrap().private = Some(42);

        heap.clear_marks();
        let result = heap.sweep();
        assert_eq!(
            result.finalizable,
            vec![Finalizable { class: ClassId::OBJECT, private: 42 }]
        );
    }

    #[test]
    fn test_children() {
        let mut heap: Heap<()> = Heap::new(4);
        let child = heap.alloc(plain());
        let elem = heap.alloc(Cell::String("x".into()));
        let parent = heap.alloc(Cell::Object(JsObject::new(
            ClassId::ARRAY,
            Some(child),
            ObjectKind::Array(vec![Value::String(elem), Value::Number(1.0)]),
        )));

        let mut out = Vec::new();
        heap.children(parent, &mut out);
        assert_eq!(out, vec![child, elem]);
    }
}
