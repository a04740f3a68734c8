//! Host bridge for the garbage-collected script heap
//!
//! Lets a reference-counting host hold stable integer ids for script
//! values, keep chosen values alive across collections, and learn exactly
//! once when a script object it cares about has been collected.
//!
//! # Pieces
//!
//! 1. **Handle table**: id to value map with `rooted`, `temp_rooted` and
//!    `has_finalizer` flags, plus an explicit root set.
//!
//! 2. **GC root tracer**: registered with the engine, reports the root set
//!    during every collection.
//!
//! 3. **Finalizer bridge**: a hidden companion object carrying the id in its
//!    private slot; its finalizer removes the handle and notifies the host.
//!
//! 4. **Staging and scratch buffers**: reusable argument and conversion
//!    storage for the narrow host call boundary.
//!
//! # Handle lifetimes
//!
//! | Flags | Survives collection | Removed by |
//! |-------|---------------------|------------|
//! | `rooted` | Always | Host |
//! | `temp_rooted` | Always | Host, or the next call result |
//! | `has_finalizer` | While reachable from script | Finalizer bridge |
//! | none | While reachable from script | Host |

/// Programmer error: log it and halt debug builds. Release builds continue
/// with whatever soft result the caller returns.
macro_rules! invariant {
    ($cond:expr, $($arg:tt)+) => {
        if !$cond {
            tracing::error!($($arg)+);
            debug_assert!(false, $($arg)+);
        }
    };
}

mod bridge;
mod config;
mod error;
mod finalizer;
mod handle;
mod handle_table;
mod scratch;
mod staging;
mod state;
mod tracer;

pub use bridge::{init, shutdown, HostBridge, CS_OBJECT, ERROR_ENTRY};
pub use config::{BridgeConfig, ConfigError};
pub use error::BridgeError;
pub use finalizer::{FINALIZER_CLASS_NAME, FINALIZE_PROPERTY, PLAIN_CLASS_NAME};
pub use handle::HandleId;
pub use handle_table::HandleTable;
pub use scratch::ScratchBuffer;
pub use staging::{ArgStaging, StagingBuffer};
pub use state::{BridgeEngine, BridgeState, HostCallbacks, HostFn, OnObjCollected};
