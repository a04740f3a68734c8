//! Handle Table
//!
//! Maps host-visible ids to script values. Rooting flags live on the
//! entries; the ids of every entry with either flag set are mirrored in an
//! explicit root set, which is all the GC root tracer walks.

use crate::handle::{Handle, HandleId};
use jsb_engine::{Tracer, Value};
use std::collections::{BTreeSet, HashMap};
use tracing::{debug, trace};

pub struct HandleTable {
    entries: HashMap<HandleId, Handle>,
    roots: BTreeSet<HandleId>,
    next_id: u64,
}

impl Default for HandleTable {
    fn default() -> Self {
        Self::with_capacity(0)
    }
}

impl HandleTable {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: HashMap::with_capacity(capacity),
            roots: BTreeSet::new(),
            next_id: 1,
        }
    }

    /// Store `value` under a fresh id.
    pub fn add(&mut self, value: Value) -> HandleId {
        let id = HandleId(self.next_id);
        self.next_id += 1;
        self.entries.insert(id, Handle::new(value));
        trace!(%id, ?value, "Handle added");
        id
    }

    /// Same as `add`; the caller has already checked that `value` is callable.
    pub fn add_function(&mut self, value: Value) -> HandleId {
        let id = self.add(value);
        trace!(%id, "Handle holds a function");
        id
    }

    pub fn get_val(&self, id: HandleId) -> Option<Value> {
        self.entries.get(&id).map(|h| h.value)
    }

    pub fn contains(&self, id: HandleId) -> bool {
        self.entries.contains_key(&id)
    }

    /// Delete a handle. Returns whether an entry was removed.
    ///
    /// Outside shutdown, removing an absent id is an invariant violation.
    pub fn remove_by_id(&mut self, id: HandleId, during_shutdown: bool) -> bool {
        let removed = self.entries.remove(&id).is_some();
        if removed {
            self.roots.remove(&id);
            trace!(%id, "Handle removed");
        }
        invariant!(
            removed || during_shutdown,
            "remove_by_id: {} is not in the handle table",
            id
        );
        removed
    }

    pub fn set_trace(&mut self, id: HandleId, on: bool) -> bool {
        self.update(id, |h| h.rooted = on)
    }

    pub fn set_temp_trace(&mut self, id: HandleId, on: bool) -> bool {
        self.update(id, |h| h.temp_rooted = on)
    }

    /// Record that a companion finalizer object is attached.
    pub fn set_has_finalize_op(&mut self, id: HandleId, on: bool) -> bool {
        self.update(id, |h| h.has_finalizer = on)
    }

    pub fn is_rooted(&self, id: HandleId) -> bool {
        self.entries.get(&id).map(|h| h.rooted).unwrap_or(false)
    }

    pub fn is_temp_rooted(&self, id: HandleId) -> bool {
        self.entries.get(&id).map(|h| h.temp_rooted).unwrap_or(false)
    }

    pub fn has_finalizer(&self, id: HandleId) -> bool {
        self.entries.get(&id).map(|h| h.has_finalizer).unwrap_or(false)
    }

    fn update(&mut self, id: HandleId, f: impl FnOnce(&mut Handle)) -> bool {
        let Some(handle) = self.entries.get_mut(&id) else {
            return false;
        };
        f(handle);
        if handle.is_root() {
            self.roots.insert(id);
        } else {
            self.roots.remove(&id);
        }
        true
    }

    /// Report every rooted or temporarily rooted value to the collector.
    pub fn trace(&self, tracer: &mut Tracer) {
        for id in &self.roots {
            if let Some(handle) = self.entries.get(id) {
                tracer.trace_value(&handle.value);
            }
        }
    }

    /// Drop every handle (engine shutdown).
    pub fn clear(&mut self) {
        debug!(count = self.entries.len(), "Clearing handle table");
        self.entries.clear();
        self.roots.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of ids currently in the root set
    pub fn root_count(&self) -> usize {
        self.roots.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_get_round_trip() {
        let mut table = HandleTable::default();
        let id = table.add(Value::Number(4.0));
        assert_eq!(table.get_val(id), Some(Value::Number(4.0)));

        let f = table.add_function(Value::Bool(true));
        assert_eq!(table.get_val(f), Some(Value::Bool(true)));
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_ids_are_monotonic() {
        let mut table = HandleTable::default();
        let a = table.add(Value::Null);
        assert_eq!(a.raw(), 1);
        table.remove_by_id(a, false);
        let b = table.add(Value::Null);
        assert!(b > a);
    }

    #[test]
    fn test_unknown_id_not_found() {
        let mut table = HandleTable::default();
        table.add(Value::Null);
        assert!(table.get_val(HandleId::new(99)).is_none());
        assert!(!table.set_trace(HandleId::new(99), true));
        assert!(!table.set_temp_trace(HandleId::new(99), true));
        assert!(!table.set_has_finalize_op(HandleId::new(99), true));
    }

    #[test]
    fn test_remove_then_lookup() {
        let mut table = HandleTable::default();
        let id = table.add(Value::Null);
        assert!(table.remove_by_id(id, false));
        assert!(table.get_val(id).is_none());
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "not in the handle table")]
    fn test_double_remove_is_violation() {
        let mut table = HandleTable::default();
        let id = table.add(Value::Null);
        table.remove_by_id(id, false);
        table.remove_by_id(id, false);
    }

    #[test]
    fn test_remove_absent_during_shutdown() {
        let mut table = HandleTable::default();
        assert!(!table.remove_by_id(HandleId::new(5), true));
    }

    #[test]
    fn test_root_set_follows_flags() {
        let mut table = HandleTable::default();
        let id = table.add(Value::Null);
        assert_eq!(table.root_count(), 0);

        table.set_trace(id, true);
        table.set_temp_trace(id, true);
        assert_eq!(table.root_count(), 1);

        table.set_trace(id, false);
        assert_eq!(table.root_count(), 1);
        assert!(table.is_temp_rooted(id));
        assert!(!table.is_rooted(id));

        table.set_temp_trace(id, false);
        assert_eq!(table.root_count(), 0);

        table.set_trace(id, true);
        table.remove_by_id(id, false);
        assert_eq!(table.root_count(), 0);
    }

    #[test]
    fn test_finalizer_flag_is_bookkeeping() {
        let mut table = HandleTable::default();
        let id = table.add(Value::Null);
        assert!(table.set_has_finalize_op(id, true));
        assert!(table.has_finalizer(id));
        assert_eq!(table.root_count(), 0);
    }

    #[test]
    fn test_clear() {
        let mut table = HandleTable::default();
        let id = table.add(Value::Null);
        table.set_trace(id, true);
        table.clear();
        assert!(table.is_empty());
        assert_eq!(table.root_count(), 0);
    }
}
