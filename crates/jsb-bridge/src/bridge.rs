//! Host Surface
//!
//! Initialization, shutdown and the id-based operations a host drives the
//! engine with. The operations are a trait on the engine itself, so host
//! native callbacks, which receive `&mut BridgeEngine`, reach the same
//! surface as the host's top-level code.

use crate::config::BridgeConfig;
use crate::error::BridgeError;
use crate::finalizer;
use crate::handle::HandleId;
use crate::state::{BridgeEngine, BridgeState, HostCallbacks, HostFn};
use crate::tracer::trace_handle_roots;
use jsb_engine::{Engine, EngineError, GcRef, Value};
use tracing::{debug, info, warn};

/// Global object through which scripts reach the host
pub const CS_OBJECT: &str = "CS";

/// Optional script-side wrapper for host-initiated calls, looked up on `CS`
pub const ERROR_ENTRY: &str = "jsFunctionEntry";

/// Create an engine wired to the host.
pub fn init(config: BridgeConfig, callbacks: HostCallbacks) -> Result<BridgeEngine, BridgeError> {
    config.validate()?;

    let HostCallbacks {
        error_reporter,
        entry,
        require,
        on_collected,
    } = callbacks;

    let state = BridgeState::new(&config, on_collected);
    let mut engine = Engine::new(config.engine, state)?;
    engine.set_error_reporter(error_reporter);

    finalizer::register_classes(&mut engine);
    let tracer = engine.add_extra_roots_tracer(trace_handle_roots);
    register_cs(&mut engine, entry, require)?;

    let state = engine.host_mut();
    state.tracer = Some(tracer);
    state.shutting_down = false;

    info!(
        "Host bridge initialized (handles: {}, max call args: {})",
        config.initial_handle_capacity, config.max_call_args
    );
    Ok(engine)
}

/// Define the engine-rooted `CS` object with `Call` and `require`.
fn register_cs(engine: &mut BridgeEngine, entry: HostFn, require: HostFn) -> Result<(), EngineError> {
    let class = engine.host().plain_class;
    let cs = engine.new_object(class, None);
    let global = engine.global();
    engine.define_hidden(global, CS_OBJECT, Value::Object(cs))?;
    engine.define_function(cs, "Call", entry)?;
    engine.define_function(cs, "require", require)?;

    let root = engine.add_root(Value::Object(cs));
    let state = engine.host_mut();
    state.cs_object = Some(cs);
    state.cs_root = Some(root);
    Ok(())
}

/// Tear the engine down.
///
/// Companion finalizers still run and notify the host; their handle
/// removals tolerate the already-cleared table.
pub fn shutdown(mut engine: BridgeEngine) {
    info!("Shutting down host bridge");

    let state = engine.host_mut();
    state.shutting_down = true;
    let tracer = state.tracer.take();
    let cs_root = state.cs_root.take();

    if let Some(tracer) = tracer {
        engine.remove_extra_roots_tracer(tracer);
    }
    if let Some(root) = cs_root {
        engine.remove_root(root);
    }

    let state = engine.host_mut();
    state.fun_ret = None;
    state.save = None;
    state.error_entry = None;
    state.cs_object = None;
    state.handles.clear();
    state.args.clear();
    state.call_args.clear();

    drop(engine);
}

/// Id-based operations available to the host.
pub trait HostBridge {
    /// Store a value under a fresh id.
    fn add(&mut self, value: Value) -> HandleId;

    /// `add` for values the caller already knows are callable.
    fn add_function(&mut self, value: Value) -> HandleId;

    /// Value behind `id`; not found once the value has been collected.
    fn get_val(&self, id: HandleId) -> Option<Value>;

    /// Release a handle. The id must be present.
    fn remove_by_id(&mut self, id: HandleId) -> bool;

    fn set_trace(&mut self, id: HandleId, on: bool) -> bool;

    fn set_temp_trace(&mut self, id: HandleId, on: bool) -> bool;

    fn has_finalizer(&self, id: HandleId) -> bool;

    /// Report the collection of the object behind `id` to the host.
    fn attach_finalizer_object(&mut self, id: HandleId) -> bool;

    /// Resolve a dotted path such as `UnityEngine.GameObject` from the global.
    fn get_js_table_by_name(&self, name: &str) -> Option<GcRef>;

    /// `table.ctor.prototype`
    fn get_obj_ctor_prototype(&self, table: GcRef) -> Option<GcRef>;

    /// Plain object with the class's prototype and a finalizer attached.
    /// The class constructor does not run.
    fn create_class_object(&mut self, name: &str) -> Option<HandleId>;

    /// Object built by the class constructor. No finalizer is attached here.
    fn new_class_object(&mut self, name: &str) -> Option<HandleId>;

    /// Id of the function `name` on the object behind `id`.
    fn get_obj_function(&mut self, id: HandleId, name: &str) -> Option<HandleId>;

    fn set_property(&mut self, id: HandleId, name: &str, value_id: HandleId) -> bool;

    /// Read a property into the save slot.
    fn get_property(&mut self, id: HandleId, name: &str) -> bool;

    /// Read an array element into the save slot.
    fn get_element(&mut self, id: HandleId, index: u32) -> bool;

    fn get_array_length(&self, id: HandleId) -> usize;

    /// Last value stored by `get_property` or `get_element`
    fn save_id(&self) -> Option<HandleId>;

    /// Stage the save slot as argument `index`. False past `max_call_args`.
    fn move_save_id_to_arr(&mut self, index: usize) -> bool;

    /// Stage `id` as argument `index`. False past `max_call_args`.
    fn move_id_to_arr(&mut self, id: HandleId, index: usize) -> bool;

    /// Call the function behind `fun_id` with the first `argc` staged ids.
    ///
    /// The result (undefined on failure) replaces the last-result handle.
    fn call_function_by_id(&mut self, this_id: Option<HandleId>, fun_id: HandleId, argc: usize) -> bool;

    /// Handle holding the result of the last call
    fn fun_ret_id(&self) -> Option<HandleId>;

    /// Route later calls through `CS.jsFunctionEntry` if the script defines it.
    fn init_error_handler(&mut self) -> bool;

    /// The string behind `id` as NUL-terminated little-endian UTF-16.
    ///
    /// Valid until the next conversion.
    fn string_utf16(&mut self, id: HandleId) -> Option<&[u8]>;

    fn gc(&mut self);

    fn handle_count(&self) -> usize;
}

/// Staged argument `index`; unresolvable ids become `undefined`.
fn staged_value(engine: &BridgeEngine, index: usize) -> Value {
    let id = engine.host().args.slot(index).copied().flatten();
    match id.and_then(|id| engine.get_val(id)) {
        Some(value) => value,
        None => {
            warn!(index, ?id, "Staged argument does not resolve, passing undefined");
            Value::Undefined
        }
    }
}

/// Reject staging slots no call can read.
fn check_arg_index(engine: &BridgeEngine, index: usize) -> bool {
    let max = engine.host().max_call_args;
    if index >= max {
        warn!(index, max, "Staging index out of range");
        return false;
    }
    true
}

/// Live object behind `id`.
fn object_of(engine: &BridgeEngine, id: HandleId) -> Option<GcRef> {
    let value = engine.host().handles.get_val(id)?;
    let obj = value.as_object()?;
    if !engine.is_live(value) {
        debug!(%id, "Handle refers to a collected object");
        return None;
    }
    Some(obj)
}

impl HostBridge for Engine<BridgeState> {
    fn add(&mut self, value: Value) -> HandleId {
        self.host_mut().handles.add(value)
    }

    fn add_function(&mut self, value: Value) -> HandleId {
        self.host_mut().handles.add_function(value)
    }

    fn get_val(&self, id: HandleId) -> Option<Value> {
        self.host()
            .handles
            .get_val(id)
            .filter(|value| self.is_live(*value))
    }

    fn remove_by_id(&mut self, id: HandleId) -> bool {
        self.host_mut().handles.remove_by_id(id, false)
    }

    fn set_trace(&mut self, id: HandleId, on: bool) -> bool {
        self.host_mut().handles.set_trace(id, on)
    }

    fn set_temp_trace(&mut self, id: HandleId, on: bool) -> bool {
        self.host_mut().handles.set_temp_trace(id, on)
    }

    fn has_finalizer(&self, id: HandleId) -> bool {
        self.host().handles.has_finalizer(id)
    }

    fn attach_finalizer_object(&mut self, id: HandleId) -> bool {
        finalizer::attach(self, id)
    }

    fn get_js_table_by_name(&self, name: &str) -> Option<GcRef> {
        if name.is_empty() {
            return None;
        }

        let mut obj = self.global();
        for segment in name.split('.') {
            match self.property(obj, segment).ok().and_then(|v| v.as_object()) {
                Some(next) => obj = next,
                None => {
                    invariant!(false, "get_js_table_by_name: `{}` in `{}` is not an object", segment, name);
                    return None;
                }
            }
        }
        Some(obj)
    }

    fn get_obj_ctor_prototype(&self, table: GcRef) -> Option<GcRef> {
        let proto = self
            .property(table, "ctor")
            .ok()
            .and_then(|ctor| ctor.as_object())
            .and_then(|ctor| self.property(ctor, "prototype").ok())
            .and_then(|proto| proto.as_object());
        invariant!(proto.is_some(), "get_obj_ctor_prototype: {} has no ctor.prototype", table);
        proto
    }

    fn create_class_object(&mut self, name: &str) -> Option<HandleId> {
        let table = self.get_js_table_by_name(name)?;
        let proto = self.get_obj_ctor_prototype(table)?;

        let class = self.host().plain_class;
        let obj = self.new_object(class, Some(proto));
        let id = self.add(Value::Object(obj));
        self.attach_finalizer_object(id);
        debug!(%id, class = name, "Created class object");
        Some(id)
    }

    fn new_class_object(&mut self, name: &str) -> Option<HandleId> {
        let table = self.get_js_table_by_name(name)?;
        let ctor = self.property(table, "ctor").ok().and_then(|v| v.as_object());
        let Some(ctor) = ctor else {
            invariant!(false, "new_class_object: `{}` has no ctor", name);
            return None;
        };

        // Construction errors have already gone to the error reporter.
        let value = self.construct(ctor, &[]).ok()?;
        let id = self.add(value);
        debug!(%id, class = name, "Constructed class object");
        Some(id)
    }

    fn get_obj_function(&mut self, id: HandleId, name: &str) -> Option<HandleId> {
        let obj = object_of(self, id)?;
        let value = self.property(obj, name).ok()?;
        if !self.is_function(value) {
            return None;
        }
        Some(self.add_function(value))
    }

    fn set_property(&mut self, id: HandleId, name: &str, value_id: HandleId) -> bool {
        let Some(obj) = object_of(self, id) else {
            return false;
        };
        let Some(value) = self.get_val(value_id) else {
            return false;
        };
        self.set_prop(obj, name, value).is_ok()
    }

    fn get_property(&mut self, id: HandleId, name: &str) -> bool {
        let Some(obj) = object_of(self, id) else {
            return false;
        };
        match self.property(obj, name) {
            Ok(value) if !value.is_undefined() => {
                let saved = self.add(value);
                self.host_mut().save = Some(saved);
                true
            }
            _ => false,
        }
    }

    fn get_element(&mut self, id: HandleId, index: u32) -> bool {
        let Some(obj) = object_of(self, id) else {
            return false;
        };
        if index >= self.get_array_length(id) as u32 {
            return false;
        }
        match self.element(obj, index) {
            Ok(value) => {
                let saved = self.add(value);
                self.host_mut().save = Some(saved);
                true
            }
            Err(e) => {
                invariant!(false, "get_element: {}[{}] failed: {}", id, index, e);
                false
            }
        }
    }

    fn get_array_length(&self, id: HandleId) -> usize {
        object_of(self, id)
            .and_then(|obj| self.array_length(obj).ok())
            .unwrap_or(0) as usize
    }

    fn save_id(&self) -> Option<HandleId> {
        self.host().save
    }

    fn move_save_id_to_arr(&mut self, index: usize) -> bool {
        if !check_arg_index(self, index) {
            return false;
        }
        let state = self.host_mut();
        state.args.add(index, state.save);
        true
    }

    fn move_id_to_arr(&mut self, id: HandleId, index: usize) -> bool {
        if !check_arg_index(self, index) {
            return false;
        }
        self.host_mut().args.add(index, Some(id));
        true
    }

    fn call_function_by_id(&mut self, this_id: Option<HandleId>, fun_id: HandleId, argc: usize) -> bool {
        let state = self.host();
        let Some(fval) = state.handles.get_val(fun_id) else {
            invariant!(false, "call_function_by_id: function {} is not in the handle table", fun_id);
            return false;
        };
        if argc > state.max_call_args {
            warn!(argc, max = state.max_call_args, "Too many staged arguments");
            return false;
        }
        let this = this_id.and_then(|id| self.get_val(id)).and_then(|v| v.as_object());
        let entry = state.error_entry.and_then(|id| state.handles.get_val(id));
        let cs = state.cs_object;

        // Taken for the duration of the call; a nested call gets its own.
        let mut call_args = std::mem::take(&mut self.host_mut().call_args);
        let result = match entry {
            Some(entry) => {
                let args = call_args.get(argc + 2);
                args[0] = Value::object_or_null(this);
                args[1] = fval;
                for (i, slot) in args[2..].iter_mut().enumerate() {
                    *slot = staged_value(self, i);
                }
                self.call_function_value(cs, entry, args)
            }
            None => {
                let args = call_args.get(argc);
                for (i, slot) in args.iter_mut().enumerate() {
                    *slot = staged_value(self, i);
                }
                self.call_function_value(this, fval, args)
            }
        };
        self.host_mut().call_args = call_args;

        let ok = result.is_ok();
        let value = result.unwrap_or_default();

        let state = self.host_mut();
        if let Some(previous) = state.fun_ret.take() {
            state.handles.remove_by_id(previous, false);
        }
        let id = state.handles.add(value);
        state.handles.set_temp_trace(id, true);
        state.fun_ret = Some(id);
        ok
    }

    fn fun_ret_id(&self) -> Option<HandleId> {
        self.host().fun_ret
    }

    fn init_error_handler(&mut self) -> bool {
        let Some(cs) = self.host().cs_object else {
            return false;
        };
        let value = match self.property(cs, ERROR_ENTRY) {
            Ok(value) if self.is_function(value) => value,
            _ => return false,
        };

        if let Some(previous) = self.host_mut().error_entry.take() {
            self.remove_by_id(previous);
        }
        let id = self.add_function(value);
        self.set_trace(id, true);
        self.host_mut().error_entry = Some(id);
        info!(%id, "Routing host calls through {}.{}", CS_OBJECT, ERROR_ENTRY);
        true
    }

    fn string_utf16(&mut self, id: HandleId) -> Option<&[u8]> {
        let value = self.get_val(id)?;
        let len = self
            .with_string_and_host(value, |s, state| state.scratch.encode_utf16(s))
            .ok()?;
        Some(self.host().scratch.bytes(len))
    }

    fn gc(&mut self) {
        self.collect();
    }

    fn handle_count(&self) -> usize {
        self.host().handles.len()
    }
}
