//! Garbage Collection
//!
//! Non-moving mark/sweep over the script heap. Roots come from the engine
//! itself (global object, engine roots, the native call stack) and from
//! embedder-registered extra-roots tracers.
//!
//! ```text
//! collect()
//!     │
//!     ▼
//! ┌─────────────────┐
//! │ Clear Marks     │
//! └────────┬────────┘
//!          ▼
//! ┌─────────────────┐
//! │ Trace Roots     │ ← engine roots + extra-roots tracers
//! └────────┬────────┘
//!          ▼
//! ┌─────────────────┐
//! │ Mark Reachable  │ ← worklist drain
//! └────────┬────────┘
//!          ▼
//! ┌─────────────────┐
//! │ Sweep           │ ← bump generations, collect private slots
//! └────────┬────────┘
//!          ▼
//! ┌─────────────────┐
//! │ Run Finalizers  │ ← once per swept object with a finalize op
//! └─────────────────┘
//! ```

use crate::heap::Heap;
use crate::value::{GcRef, Value};
use std::time::Duration;

/// Handed to extra-roots tracers during the root phase of a collection.
#[derive(Debug, Default)]
pub struct Tracer {
    worklist: Vec<GcRef>,
    roots: usize,
}

impl Tracer {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Keep `value` alive through the current collection.
    pub fn trace_value(&mut self, value: &Value) {
        if let Some(r) = value.gc_ref() {
            self.trace_ref(r);
        }
    }

    pub fn trace_ref(&mut self, r: GcRef) {
        self.roots += 1;
        self.worklist.push(r);
    }

    /// Number of roots reported so far in this pass
    pub fn roots_traced(&self) -> usize {
        self.roots
    }
}

/// Drain the tracer's worklist, marking everything reachable.
pub(crate) fn mark<H>(heap: &mut Heap<H>, tracer: &mut Tracer) -> usize {
    let mut marked = 0;
    let mut children = Vec::new();

    while let Some(r) = tracer.worklist.pop() {
        if !heap.mark(r) {
            continue;
        }
        marked += 1;
        heap.children(r, &mut children);
        tracer.worklist.append(&mut children);
    }

    marked
}

/// Why a collection ran
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GcReason {
    /// Explicit request (from code)
    Explicit,
    /// Allocation threshold crossed
    Allocation,
}

/// Collection statistics
#[derive(Debug, Clone, Default)]
pub struct GcStats {
    /// Total collections
    pub cycles: u64,
    /// Collections requested by allocation pressure
    pub allocation_triggered: u64,
    /// Total cells freed
    pub cells_freed: u64,
    /// Total finalize ops run
    pub finalizers_run: u64,
    /// Cells freed by the most recent collection
    pub last_freed: usize,
    /// Longest pause
    pub max_pause_time: Duration,
}

impl GcStats {
    pub(crate) fn record(&mut self, reason: GcReason, freed: usize, finalized: usize, pause: Duration) {
        self.cycles += 1;
        if reason == GcReason::Allocation {
            self.allocation_triggered += 1;
        }
        self.cells_freed += freed as u64;
        self.finalizers_run += finalized as u64;
        self.last_freed = freed;
        if pause > self.max_pause_time {
            self.max_pause_time = pause;
        }
    }

    /// Format as human-readable string
    pub fn format(&self) -> String {
        format!(
            "GC: {} cycles ({} by allocation), {} cells freed, {} finalized, {:.2}ms max pause",
            self.cycles,
            self.allocation_triggered,
            self.cells_freed,
            self.finalizers_run,
            self.max_pause_time.as_secs_f64() * 1000.0
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::class::ClassId;
    use crate::heap::{Cell, JsObject, ObjectKind};

    fn object(heap: &mut Heap<()>, proto: Option<GcRef>) -> GcRef {
        heap.alloc(Cell::Object(JsObject::new(ClassId::OBJECT, proto, ObjectKind::Ordinary)))
    }

    #[test]
    fn test_mark_follows_references() {
        let mut heap: Heap<()> = Heap::new(8);
        let leaf = object(&mut heap, None);
        let root = object(&mut heap, Some(leaf));
        let orphan = object(&mut heap, None);

        heap.clear_marks();
        let mut tracer = Tracer::new();
        tracer.trace_value(&Value::Object(root));
        tracer.trace_value(&Value::Number(3.0));
        assert_eq!(tracer.roots_traced(), 1);

        assert_eq!(mark(&mut heap, &mut tracer), 2);
        heap.sweep();
        assert!(heap.is_live(root));
        assert!(heap.is_live(leaf));
        assert!(!heap.is_live(orphan));
    }

    #[test]
    fn test_mark_handles_cycles() {
        let mut heap: Heap<()> = Heap::new(8);
        let a = object(&mut heap, None);
        let b = object(&mut heap, Some(a));
        heap.object_mut(a).unwrap().proto = Some(b);

        heap.clear_marks();
        let mut tracer = Tracer::new();
        tracer.trace_ref(a);
        assert_eq!(mark(&mut heap, &mut tracer), 2);
    }

    #[test]
    fn test_stats_format() {
        let mut stats = GcStats::default();
        stats.record(GcReason::Allocation, 10, 2, Duration::from_millis(1));
        stats.record(GcReason::Explicit, 5, 0, Duration::from_micros(10));

        assert_eq!(stats.cycles, 2);
        assert_eq!(stats.allocation_triggered, 1);
        assert_eq!(stats.cells_freed, 15);
        assert_eq!(stats.last_freed, 5);
        assert!(stats.format().starts_with("GC: 2 cycles"));
    }
}
