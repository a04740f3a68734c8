//! Garbage-collected script heap
//!
//! A small script engine used as the collector-side half of the host
//! bridge: objects, arrays, strings and native functions living in a
//! mark/sweep heap.
//!
//! # Embedding hooks
//!
//! 1. **Extra-roots tracers**: `fn(&H, &mut Tracer)` callbacks run during
//!    the root phase of every collection, where `H` is the embedder data
//!    stored in the engine.
//!
//! 2. **Class finalizers**: `fn(&mut H, u64)` callbacks run exactly once per
//!    swept object of a finalizable class, receiving its private slot.
//!
//! 3. **Error reporter**: receives every error that leaves the outermost
//!    native call.
//!
//! # Collection points
//!
//! | Trigger | When it runs |
//! |---------|--------------|
//! | `collect()` | Immediately |
//! | Allocation threshold | At the return of the outermost call |
//! | Engine drop | Every remaining object is finalized |

mod class;
mod config;
mod engine;
mod error;
mod gc;
mod heap;
mod value;

pub use class::{ClassId, ClassSpec, FinalizeOp};
pub use config::{ConfigError, EngineConfig};
pub use engine::{Engine, NativeFn, RootId, TraceOp, TracerId};
pub use error::{EngineError, ErrorReport, ErrorReporter};
pub use gc::{GcReason, GcStats, Tracer};
pub use heap::HeapStats;
pub use value::{GcRef, Value};
