//! GC root tracer.
//!
//! Registered with the engine at initialization; runs in the root phase of
//! every collection and reports the handle table's root set. Handles with
//! neither flag are left to ordinary reachability, which is what lets
//! finalizer-bridged values become collectible.

use crate::state::BridgeState;
use jsb_engine::Tracer;
use tracing::trace;

pub(crate) fn trace_handle_roots(state: &BridgeState, tracer: &mut Tracer) {
    let before = tracer.roots_traced();
    state.handles.trace(tracer);
    trace!(roots = tracer.roots_traced() - before, "Traced handle roots");
}
