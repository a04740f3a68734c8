//! Per-engine bridge state.
//!
//! Everything the host interface needs between calls lives here, owned by
//! the engine as its embedder data. Nothing is global.

use crate::config::BridgeConfig;
use crate::handle::HandleId;
use crate::handle_table::HandleTable;
use crate::scratch::ScratchBuffer;
use crate::staging::{ArgStaging, StagingBuffer};
use jsb_engine::{ClassId, Engine, ErrorReporter, GcRef, NativeFn, RootId, TracerId, Value};

/// Engine whose embedder data is the bridge state
pub type BridgeEngine = Engine<BridgeState>;

/// Native callback exposed to scripts by the host
pub type HostFn = NativeFn<BridgeState>;

/// Called with the id of every finalizer-bridged value the collector frees
pub type OnObjCollected = Box<dyn FnMut(HandleId)>;

/// Callbacks supplied by the host at initialization
pub struct HostCallbacks {
    /// Receives script errors
    pub error_reporter: ErrorReporter,
    /// Installed as `CS.Call`
    pub entry: HostFn,
    /// Installed as `CS.require`
    pub require: HostFn,
    /// Collection notification
    pub on_collected: OnObjCollected,
}

pub struct BridgeState {
    pub(crate) handles: HandleTable,
    /// Ids staged by the host for the next call
    pub(crate) args: ArgStaging,
    /// Resolved values of the staged ids
    pub(crate) call_args: StagingBuffer<Value>,
    pub(crate) scratch: ScratchBuffer,
    pub(crate) max_call_args: usize,
    /// Result of the last call
    pub(crate) fun_ret: Option<HandleId>,
    /// Last retrieved element or property
    pub(crate) save: Option<HandleId>,
    /// `CS.jsFunctionEntry`, when call routing is enabled
    pub(crate) error_entry: Option<HandleId>,
    pub(crate) shutting_down: bool,
    pub(crate) on_collected: OnObjCollected,
    pub(crate) plain_class: ClassId,
    pub(crate) finalizer_class: ClassId,
    pub(crate) cs_object: Option<GcRef>,
    pub(crate) cs_root: Option<RootId>,
    pub(crate) tracer: Option<TracerId>,
}

impl BridgeState {
    pub(crate) fn new(config: &BridgeConfig, on_collected: OnObjCollected) -> Self {
        Self {
            handles: HandleTable::with_capacity(config.initial_handle_capacity),
            args: ArgStaging::with_capacity(config.initial_arg_capacity),
            call_args: StagingBuffer::with_capacity(config.initial_arg_capacity),
            scratch: ScratchBuffer::with_capacity(config.initial_scratch_bytes),
            max_call_args: config.max_call_args,
            fun_ret: None,
            save: None,
            error_entry: None,
            shutting_down: false,
            on_collected,
            plain_class: ClassId::OBJECT,
            finalizer_class: ClassId::OBJECT,
            cs_object: None,
            cs_root: None,
            tracer: None,
        }
    }

    pub fn handles(&self) -> &HandleTable {
        &self.handles
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down
    }
}
