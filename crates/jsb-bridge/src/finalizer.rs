//! Finalizer bridge.
//!
//! The collector can only report its own objects. To learn when a script
//! object dies, a companion object of a finalizable class is hung off it as
//! a hidden property, with the handle id in the companion's private slot.
//! Nothing else references the companion, so both become garbage in the
//! same cycle and the companion's finalizer tells us which id went away.

use crate::handle::HandleId;
use crate::state::{BridgeEngine, BridgeState};
use jsb_engine::{ClassSpec, Value};
use tracing::debug;

/// Hidden property holding the companion object
pub const FINALIZE_PROPERTY: &str = "__just_for_finalize";

/// Class of objects created by the bridge without a constructor
pub const PLAIN_CLASS_NAME: &str = "jsb_plain";

/// Class of companion objects
pub const FINALIZER_CLASS_NAME: &str = "jsb_finalizer";

pub(crate) fn register_classes(engine: &mut BridgeEngine) {
    let plain = engine.register_class(ClassSpec::plain(PLAIN_CLASS_NAME));
    let finalizer = engine.register_class(ClassSpec::with_finalizer(
        FINALIZER_CLASS_NAME,
        finalize_companion,
    ));
    let state = engine.host_mut();
    state.plain_class = plain;
    state.finalizer_class = finalizer;
}

/// Finalize op of the companion class.
fn finalize_companion(state: &mut BridgeState, private: u64) {
    let id = HandleId(private);
    let shutting_down = state.is_shutting_down();
    let removed = state.handles.remove_by_id(id, shutting_down);
    debug!(%id, removed, "Finalizer companion collected");
    (state.on_collected)(id);
}

/// Attach a companion to the object behind `id`.
///
/// False if `id` is absent, does not hold a live object, or the object
/// already has a companion through another handle. Attaching twice through
/// the same handle is a no-op.
pub(crate) fn attach(engine: &mut BridgeEngine, id: HandleId) -> bool {
    let handles = &engine.host().handles;
    let Some(value) = handles.get_val(id) else {
        debug!(%id, "Cannot attach finalizer: no such handle");
        return false;
    };
    let Some(obj) = value.as_object() else {
        debug!(%id, "Cannot attach finalizer: not an object");
        return false;
    };
    if handles.has_finalizer(id) {
        return true;
    }
    // A companion for a dead object would report the id while it is still
    // in use.
    if !engine.is_live(value) {
        debug!(%id, "Cannot attach finalizer: object was collected");
        return false;
    }
    // One companion per object. A second one would orphan the first and
    // report its id while the object is still alive.
    if engine.has_own(obj, FINALIZE_PROPERTY).unwrap_or(false) {
        debug!(%id, "Cannot attach finalizer: object already has a companion");
        return false;
    }

    let class = engine.host().finalizer_class;
    let companion = engine.new_object(class, None);
    let attached = engine
        .set_private(companion, id.raw())
        .and_then(|_| engine.define_hidden(obj, FINALIZE_PROPERTY, Value::Object(companion)));
    if let Err(e) = attached {
        invariant!(false, "attach_finalizer_object: {} failed: {}", id, e);
        return false;
    }

    engine.host_mut().handles.set_has_finalize_op(id, true);
    debug!(%id, "Finalizer attached");
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BridgeConfig;
    use crate::tracer::trace_handle_roots;
    use jsb_engine::{Engine, EngineConfig};
    use std::cell::RefCell;
    use std::rc::Rc;

    fn engine(collected: &Rc<RefCell<Vec<HandleId>>>) -> BridgeEngine {
        let sink = collected.clone();
        let state = BridgeState::new(
            &BridgeConfig::standard(),
            Box::new(move |id| sink.borrow_mut().push(id)),
        );
        let mut e = Engine::new(EngineConfig::standard(), state).unwrap();
        register_classes(&mut e);
        e.add_extra_roots_tracer(trace_handle_roots);
        e
    }

    fn add_object(e: &mut BridgeEngine) -> HandleId {
        let obj = Value::Object(e.new_plain_object());
        e.host_mut().handles.add(obj)
    }

    #[test]
    fn test_attach_requires_object_handle() {
        let collected = Rc::new(RefCell::new(Vec::new()));
        let mut e = engine(&collected);
        assert!(!attach(&mut e, HandleId::new(42)));

        let n = e.host_mut().handles.add(Value::Number(1.0));
        assert!(!attach(&mut e, n));
        assert!(!e.host().handles.has_finalizer(n));
    }

    #[test]
    fn test_companion_is_hidden_and_single() {
        let collected = Rc::new(RefCell::new(Vec::new()));
        let mut e = engine(&collected);
        let id = add_object(&mut e);
        let obj = e.host().handles.get_val(id).and_then(|v| v.as_object()).unwrap();

        assert!(attach(&mut e, id));
        let companion = e.property(obj, FINALIZE_PROPERTY).unwrap();
        assert!(attach(&mut e, id));
        assert_eq!(e.property(obj, FINALIZE_PROPERTY).unwrap(), companion);

        assert!(e.enumerable_keys(obj).unwrap().is_empty());
        let companion = companion.as_object().unwrap();
        assert_eq!(e.private(companion).unwrap(), Some(id.raw()));
        assert_eq!(e.class_of(companion).unwrap(), e.host().finalizer_class);
    }

    #[test]
    fn test_second_handle_to_same_object_gets_no_companion() {
        let collected = Rc::new(RefCell::new(Vec::new()));
        let mut e = engine(&collected);
        let a = add_object(&mut e);
        let value = e.host().handles.get_val(a).unwrap();
        let global = e.global();
        e.set_prop(global, "keep", value).unwrap();
        let b = e.host_mut().handles.add(value);

        assert!(attach(&mut e, a));
        assert!(!attach(&mut e, b));
        assert!(!e.host().handles.has_finalizer(b));

        e.collect();
        assert!(collected.borrow().is_empty());
        assert!(e.host().handles.contains(a));
        assert!(e.is_live(value));

        e.set_prop(global, "keep", Value::Null).unwrap();
        e.collect();
        assert_eq!(*collected.borrow(), vec![a]);
    }

    #[test]
    fn test_collection_notifies_once() {
        let collected = Rc::new(RefCell::new(Vec::new()));
        let mut e = engine(&collected);
        let id = add_object(&mut e);
        assert!(attach(&mut e, id));

        e.collect();
        e.collect();
        assert_eq!(*collected.borrow(), vec![id]);
        assert!(e.host().handles.get_val(id).is_none());
    }

    #[test]
    fn test_reachable_object_not_finalized() {
        let collected = Rc::new(RefCell::new(Vec::new()));
        let mut e = engine(&collected);
        let id = add_object(&mut e);
        assert!(attach(&mut e, id));
        let value = e.host().handles.get_val(id).unwrap();
        let global = e.global();
        e.set_prop(global, "keep", value).unwrap();

        e.collect();
        assert!(collected.borrow().is_empty());

        e.set_prop(global, "keep", Value::Null).unwrap();
        e.collect();
        assert_eq!(*collected.borrow(), vec![id]);
    }

    #[test]
    fn test_rooted_handle_delays_notification() {
        let collected = Rc::new(RefCell::new(Vec::new()));
        let mut e = engine(&collected);
        let id = add_object(&mut e);
        e.host_mut().handles.set_trace(id, true);
        assert!(attach(&mut e, id));

        e.collect();
        assert!(collected.borrow().is_empty());
        assert!(e.host().handles.get_val(id).is_some());

        e.host_mut().handles.set_trace(id, false);
        e.collect();
        assert_eq!(*collected.borrow(), vec![id]);
    }

    #[test]
    fn test_dead_object_gets_no_companion() {
        let collected = Rc::new(RefCell::new(Vec::new()));
        let mut e = engine(&collected);
        let id = add_object(&mut e);
        e.collect();

        assert!(!attach(&mut e, id));
        e.collect();
        assert!(collected.borrow().is_empty());
        assert!(e.host().handles.contains(id));
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "not in the handle table")]
    fn test_removed_before_collection_is_violation() {
        let collected = Rc::new(RefCell::new(Vec::new()));
        let mut e = engine(&collected);
        let id = add_object(&mut e);
        assert!(attach(&mut e, id));
        e.host_mut().handles.remove_by_id(id, false);
        e.collect();
    }

    #[test]
    fn test_shutdown_tolerates_missing_entry() {
        let collected = Rc::new(RefCell::new(Vec::new()));
        {
            let mut e = engine(&collected);
            let id = add_object(&mut e);
            e.host_mut().handles.set_trace(id, true);
            assert!(attach(&mut e, id));
            e.host_mut().shutting_down = true;
            e.host_mut().handles.clear();
        }
        assert_eq!(collected.borrow().len(), 1);
    }
}
