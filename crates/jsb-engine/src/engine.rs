//! Script Engine
//!
//! Owns the heap, the global object and the class registry, runs native
//! functions, and drives collections. `H` is embedder data: extra-roots
//! tracers read it, class finalizers mutate it.

use crate::class::{ClassId, ClassRegistry, ClassSpec};
use crate::config::EngineConfig;
use crate::error::{EngineError, ErrorReport, ErrorReporter};
use crate::gc::{self, GcReason, GcStats, Tracer};
use crate::heap::{Cell, Finalizable, Heap, HeapStats, JsObject, NativeFunction, ObjectKind};
use crate::value::{GcRef, Value};
use std::rc::Rc;
use std::time::Instant;
use tracing::{debug, info, trace, warn};

/// Native function: `(engine, this, args) -> result`
pub type NativeFn<H> = Rc<dyn Fn(&mut Engine<H>, Value, &[Value]) -> Result<Value, EngineError>>;

/// Extra-roots tracer, called during the root phase of every collection
pub type TraceOp<H> = fn(&H, &mut Tracer);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RootId(u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TracerId(u32);

pub struct Engine<H> {
    config: EngineConfig,
    heap: Heap<H>,
    classes: ClassRegistry<H>,
    global: GcRef,
    object_proto: GcRef,
    roots: Vec<(RootId, Value)>,
    next_root: u32,
    tracers: Vec<(TracerId, TraceOp<H>)>,
    next_tracer: u32,
    /// Values of in-flight native calls; always a root
    stack: Vec<Value>,
    depth: usize,
    gc_requested: bool,
    collecting: bool,
    reporter: Option<ErrorReporter>,
    stats: GcStats,
    host: H,
}

impl<H> Engine<H> {
    /// Create an engine with a fresh global object.
    pub fn new(config: EngineConfig, host: H) -> Result<Self, EngineError> {
        config.validate()?;

        let mut heap = Heap::new(config.initial_heap_cells);
        let object_proto = heap.alloc(Cell::Object(JsObject::new(
            ClassId::OBJECT,
            None,
            ObjectKind::Ordinary,
        )));
        let global = heap.alloc(Cell::Object(JsObject::new(
            ClassId::GLOBAL,
            Some(object_proto),
            ObjectKind::Ordinary,
        )));

        info!(
            "Creating script engine (gc threshold: {}, call depth: {})",
            config.gc_alloc_threshold, config.max_call_depth
        );

        Ok(Self {
            config,
            heap,
            classes: ClassRegistry::with_builtins(),
            global,
            object_proto,
            roots: Vec::new(),
            next_root: 0,
            tracers: Vec::new(),
            next_tracer: 0,
            stack: Vec::with_capacity(64),
            depth: 0,
            gc_requested: false,
            collecting: false,
            reporter: None,
            stats: GcStats::default(),
            host,
        })
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn global(&self) -> GcRef {
        self.global
    }

    pub fn set_error_reporter(&mut self, reporter: ErrorReporter) {
        self.reporter = Some(reporter);
    }

    /// Forward an error to the reporter.
    pub fn report_error(&self, message: &str) {
        self.report(ErrorReport::new(message));
    }

    fn report(&self, report: ErrorReport) {
        match &self.reporter {
            Some(reporter) => reporter(&report),
            None => warn!("Unreported script error: {}", report.message),
        }
    }

    pub fn register_class(&mut self, spec: ClassSpec<H>) -> ClassId {
        debug!(class = spec.name, "Registering class");
        self.classes.register(spec)
    }

    // ---------------------------------------------------------------
    // Allocation
    // ---------------------------------------------------------------

    fn alloc(&mut self, cell: Cell<H>) -> GcRef {
        let r = self.heap.alloc(cell);
        if self.heap.allocs_since_gc() >= self.config.gc_alloc_threshold {
            self.gc_requested = true;
        }
        r
    }

    /// New object of `class`; `None` selects `Object.prototype`.
    pub fn new_object(&mut self, class: ClassId, proto: Option<GcRef>) -> GcRef {
        let proto = proto.unwrap_or(self.object_proto);
        self.alloc(Cell::Object(JsObject::new(class, Some(proto), ObjectKind::Ordinary)))
    }

    pub fn new_plain_object(&mut self) -> GcRef {
        self.new_object(ClassId::OBJECT, None)
    }

    pub fn new_array(&mut self, elements: &[Value]) -> GcRef {
        let proto = Some(self.object_proto);
        self.alloc(Cell::Object(JsObject::new(
            ClassId::ARRAY,
            proto,
            ObjectKind::Array(elements.to_vec()),
        )))
    }

    pub fn new_string(&mut self, s: &str) -> Value {
        Value::String(self.alloc(Cell::String(s.to_string())))
    }

    /// Function object with its own `prototype` object.
    pub fn new_function(&mut self, name: &str, native: NativeFn<H>) -> GcRef {
        let proto = Some(self.object_proto);
        let func = self.alloc(Cell::Object(JsObject::new(
            ClassId::FUNCTION,
            proto,
            ObjectKind::Function(NativeFunction {
                name: name.to_string(),
                native,
            }),
        )));
        let prototype = self.new_plain_object();

        // Both cells are fresh; neither lookup can fail.
        if let Ok(obj) = self.heap.object_mut(prototype) {
            obj.put("constructor", Value::Object(func), false);
        }
        if let Ok(obj) = self.heap.object_mut(func) {
            obj.put("prototype", Value::Object(prototype), false);
        }
        func
    }

    // ---------------------------------------------------------------
    // Properties
    // ---------------------------------------------------------------

    /// Property lookup along the prototype chain. Missing is `Undefined`.
    pub fn property(&self, obj: GcRef, name: &str) -> Result<Value, EngineError> {
        let mut current = Some(obj);
        while let Some(r) = current {
            let o = self.heap.object(r)?;
            if let Some(prop) = o.own(name) {
                return Ok(prop.value);
            }
            if let (ObjectKind::Array(elements), "length") = (&o.kind, name) {
                return Ok(Value::Number(elements.len() as f64));
            }
            current = o.proto;
        }
        Ok(Value::Undefined)
    }

    pub fn set_prop(&mut self, obj: GcRef, name: &str, value: Value) -> Result<(), EngineError> {
        let o = self.heap.object_mut(obj)?;
        let enumerable = o.own(name).map(|p| p.enumerable).unwrap_or(true);
        o.put(name, value, enumerable);
        Ok(())
    }

    /// Define a non-enumerable own property.
    pub fn define_hidden(&mut self, obj: GcRef, name: &str, value: Value) -> Result<(), EngineError> {
        self.heap.object_mut(obj)?.put(name, value, false);
        Ok(())
    }

    pub fn define_function(
        &mut self,
        obj: GcRef,
        name: &str,
        native: NativeFn<H>,
    ) -> Result<GcRef, EngineError> {
        // Fail before allocating.
        self.heap.object(obj)?;
        let func = self.new_function(name, native);
        self.set_prop(obj, name, Value::Object(func))?;
        Ok(func)
    }

    /// Names of enumerable own properties, in definition order.
    pub fn enumerable_keys(&self, obj: GcRef) -> Result<Vec<String>, EngineError> {
        Ok(self
            .heap
            .object(obj)?
            .props
            .iter()
            .filter(|p| p.enumerable)
            .map(|p| p.name.clone())
            .collect())
    }

    pub fn has_own(&self, obj: GcRef, name: &str) -> Result<bool, EngineError> {
        Ok(self.heap.object(obj)?.own(name).is_some())
    }

    pub fn element(&self, obj: GcRef, index: u32) -> Result<Value, EngineError> {
        match &self.heap.object(obj)?.kind {
            ObjectKind::Array(elements) => {
                Ok(elements.get(index as usize).copied().unwrap_or_default())
            }
            _ => self.property(obj, &index.to_string()),
        }
    }

    pub fn set_element(&mut self, obj: GcRef, index: u32, value: Value) -> Result<(), EngineError> {
        let o = self.heap.object_mut(obj)?;
        match &mut o.kind {
            ObjectKind::Array(elements) => {
                let i = index as usize;
                if i >= elements.len() {
                    elements.resize(i + 1, Value::Undefined);
                }
                elements[i] = value;
                Ok(())
            }
            _ => {
                o.put(&index.to_string(), value, true);
                Ok(())
            }
        }
    }

    /// Array length, or the numeric `length` property of array-likes.
    pub fn array_length(&self, obj: GcRef) -> Result<u32, EngineError> {
        if let ObjectKind::Array(elements) = &self.heap.object(obj)?.kind {
            return Ok(elements.len() as u32);
        }
        Ok(self
            .property(obj, "length")?
            .as_number()
            .filter(|n| *n >= 0.0)
            .map(|n| n as u32)
            .unwrap_or(0))
    }

    pub fn string(&self, value: Value) -> Result<&str, EngineError> {
        match value {
            Value::String(r) => self.heap.string(r),
            _ => Err(EngineError::NotAString),
        }
    }

    /// Borrow a string's contents alongside the embedder data.
    pub fn with_string_and_host<R>(
        &mut self,
        value: Value,
        f: impl FnOnce(&str, &mut H) -> R,
    ) -> Result<R, EngineError> {
        let Value::String(r) = value else {
            return Err(EngineError::NotAString);
        };
        let s = self.heap.string(r)?;
        Ok(f(s, &mut self.host))
    }

    pub fn is_function(&self, value: Value) -> bool {
        value
            .as_object()
            .and_then(|r| self.heap.object(r).ok())
            .map(|o| matches!(o.kind, ObjectKind::Function(_)))
            .unwrap_or(false)
    }

    pub fn is_live(&self, value: Value) -> bool {
        value.gc_ref().map(|r| self.heap.is_live(r)).unwrap_or(true)
    }

    pub fn private(&self, obj: GcRef) -> Result<Option<u64>, EngineError> {
        Ok(self.heap.object(obj)?.private)
    }

    pub fn set_private(&mut self, obj: GcRef, private: u64) -> Result<(), EngineError> {
        let o = self.heap.object_mut(obj)?;
        let has_private = self.classes.get(o.class).map(|c| c.has_private).unwrap_or(false);
        if !has_private {
            return Err(EngineError::NoPrivateSlot);
        }
        o.private = Some(private);
        Ok(())
    }

    pub fn class_of(&self, obj: GcRef) -> Result<ClassId, EngineError> {
        Ok(self.heap.object(obj)?.class)
    }

    pub fn prototype_of(&self, obj: GcRef) -> Result<Option<GcRef>, EngineError> {
        Ok(self.heap.object(obj)?.proto)
    }

    // ---------------------------------------------------------------
    // Calls
    // ---------------------------------------------------------------

    /// Call `fval` with `this` and `args`.
    ///
    /// Errors are reported once, when they leave the outermost call. A
    /// pending allocation-triggered collection runs at that point with the
    /// result still on the stack.
    pub fn call_function_value(
        &mut self,
        this: Option<GcRef>,
        fval: Value,
        args: &[Value],
    ) -> Result<Value, EngineError> {
        let base = self.stack.len();
        let result = self.invoke(this, fval, args);

        if self.depth == 0 {
            match &result {
                Ok(value) => self.stack.push(*value),
                Err(e) => self.report(ErrorReport::new(e.to_string())),
            }
            if self.gc_requested {
                self.run_collection(GcReason::Allocation);
            }
        }
        self.stack.truncate(base);

        result
    }

    /// Push the frame and run the native. The frame stays on the stack;
    /// `call_function_value` pops it.
    fn invoke(&mut self, this: Option<GcRef>, fval: Value, args: &[Value]) -> Result<Value, EngineError> {
        let func = fval.as_object().ok_or(EngineError::NotCallable)?;
        let native = match &self.heap.object(func)?.kind {
            ObjectKind::Function(f) => {
                trace!(function = %f.name, depth = self.depth, "Calling native");
                f.native.clone()
            }
            _ => return Err(EngineError::NotCallable),
        };
        if self.depth >= self.config.max_call_depth {
            return Err(EngineError::StackOverflow(self.depth));
        }

        let this = Value::object_or_null(this);
        self.stack.push(fval);
        self.stack.push(this);
        self.stack.extend_from_slice(args);

        self.depth += 1;
        let result = native(self, this, args);
        self.depth -= 1;
        result
    }

    pub fn call_function_name(
        &mut self,
        obj: GcRef,
        name: &str,
        args: &[Value],
    ) -> Result<Value, EngineError> {
        let fval = self.property(obj, name)?;
        self.call_function_value(Some(obj), fval, args)
    }

    /// `new ctor(...args)`
    pub fn construct(&mut self, ctor: GcRef, args: &[Value]) -> Result<Value, EngineError> {
        if !self.is_function(Value::Object(ctor)) {
            return Err(EngineError::NotCallable);
        }
        let proto = self.property(ctor, "prototype")?.as_object();
        let this = self.new_object(ClassId::OBJECT, proto);

        let result = self.call_function_value(Some(this), Value::Object(ctor), args)?;
        Ok(if result.is_object() { result } else { Value::Object(this) })
    }

    // ---------------------------------------------------------------
    // Roots and collection
    // ---------------------------------------------------------------

    /// Keep `value` alive until `remove_root`.
    pub fn add_root(&mut self, value: Value) -> RootId {
        let id = RootId(self.next_root);
        self.next_root += 1;
        self.roots.push((id, value));
        id
    }

    pub fn remove_root(&mut self, id: RootId) -> bool {
        let before = self.roots.len();
        self.roots.retain(|(r, _)| *r != id);
        self.roots.len() != before
    }

    pub fn add_extra_roots_tracer(&mut self, op: TraceOp<H>) -> TracerId {
        let id = TracerId(self.next_tracer);
        self.next_tracer += 1;
        self.tracers.push((id, op));
        id
    }

    pub fn remove_extra_roots_tracer(&mut self, id: TracerId) -> bool {
        let before = self.tracers.len();
        self.tracers.retain(|(t, _)| *t != id);
        self.tracers.len() != before
    }

    /// Run a full collection now.
    pub fn collect(&mut self) {
        self.run_collection(GcReason::Explicit);
    }

    fn run_collection(&mut self, reason: GcReason) {
        if self.collecting {
            return;
        }
        self.collecting = true;
        let started = Instant::now();

        self.heap.clear_marks();
        let mut tracer = Tracer::new();
        tracer.trace_ref(self.global);
        tracer.trace_ref(self.object_proto);
        for (_, value) in &self.roots {
            tracer.trace_value(value);
        }
        for value in &self.stack {
            tracer.trace_value(value);
        }
        for (_, op) in &self.tracers {
            op(&self.host, &mut tracer);
        }

        let marked = gc::mark(&mut self.heap, &mut tracer);
        let swept = self.heap.sweep();
        let finalized = self.run_finalizers(&swept.finalizable);

        self.gc_requested = false;
        self.collecting = false;

        let pause = started.elapsed();
        self.stats.record(reason, swept.freed, finalized, pause);
        debug!(
            ?reason,
            marked,
            freed = swept.freed,
            finalized,
            "GC complete in {:.3}ms",
            pause.as_secs_f64() * 1000.0
        );
    }

    fn run_finalizers(&mut self, swept: &[Finalizable]) -> usize {
        let mut finalized = 0;
        for f in swept {
            if let Some(op) = self.classes.finalizer(f.class) {
                op(&mut self.host, f.private);
                finalized += 1;
            }
        }
        finalized
    }

    pub fn stats(&self) -> &GcStats {
        &self.stats
    }

    pub fn heap_stats(&self) -> HeapStats {
        self.heap.stats()
    }
}

impl<H> Drop for Engine<H> {
    fn drop(&mut self) {
        // Tearing down the runtime finalizes everything that is left.
        self.collecting = true;
        self.stack.clear();
        self.roots.clear();
        self.tracers.clear();
        let swept = self.heap.free_all();
        let finalized = self.run_finalizers(&swept.finalizable);
        info!(freed = swept.freed, finalized, "Script engine destroyed");
    }
}
