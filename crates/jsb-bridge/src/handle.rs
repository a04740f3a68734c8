//! Handle identifiers.

use jsb_engine::Value;
use std::fmt;

/// Host-visible identifier of a script value.
///
/// Ids are handed out in increasing order starting at 1 and are never
/// reused, so a staged id can never alias a newer value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct HandleId(pub(crate) u64);

impl HandleId {
    /// Rebuild an id received from the host.
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for HandleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Handle({})", self.0)
    }
}

/// Table entry for one handle
#[derive(Debug, Clone, Copy)]
pub(crate) struct Handle {
    pub(crate) value: Value,
    /// Strong external root
    pub(crate) rooted: bool,
    /// Keep-alive for in-flight multi-step operations
    pub(crate) temp_rooted: bool,
    /// A companion finalizer object is attached to the value
    pub(crate) has_finalizer: bool,
}

impl Handle {
    pub(crate) fn new(value: Value) -> Self {
        Self {
            value,
            rooted: false,
            temp_rooted: false,
            has_finalizer: false,
        }
    }

    pub(crate) fn is_root(&self) -> bool {
        self.rooted || self.temp_rooted
    }
}
