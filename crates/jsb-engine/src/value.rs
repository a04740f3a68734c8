//! Script values and heap references.

use std::fmt;

/// Reference to a cell in the script heap.
///
/// The generation is bumped whenever a cell is swept, so a reference that
/// outlived its target is detected instead of aliasing a newer cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GcRef {
    pub(crate) index: u32,
    pub(crate) generation: u32,
}

impl GcRef {
    pub(crate) fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }

    /// Arena slot of the referenced cell.
    pub fn index(&self) -> u32 {
        self.index
    }
}

impl fmt::Display for GcRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}@{}", self.index, self.generation)
    }
}

/// A script value.
///
/// Only `String` and `Object` point into the heap; the rest are immediates
/// and never need tracing.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum Value {
    #[default]
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    String(GcRef),
    Object(GcRef),
}

impl Value {
    pub fn is_undefined(&self) -> bool {
        matches!(self, Value::Undefined)
    }

    pub fn is_object(&self) -> bool {
        matches!(self, Value::Object(_))
    }

    /// Heap reference held by this value, if any.
    pub fn gc_ref(&self) -> Option<GcRef> {
        match self {
            Value::String(r) | Value::Object(r) => Some(*r),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<GcRef> {
        match self {
            Value::Object(r) => Some(*r),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Object value, or null when `obj` is `None`.
    pub fn object_or_null(obj: Option<GcRef>) -> Self {
        obj.map(Value::Object).unwrap_or(Value::Null)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Number(n as f64)
    }
}
