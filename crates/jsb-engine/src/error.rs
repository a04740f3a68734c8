//! Engine errors and error reports.

use crate::value::GcRef;

/// Errors raised by engine operations
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EngineError {
    #[error("Reference {0} points at a collected cell")]
    StaleReference(GcRef),

    #[error("Value is not an object")]
    NotAnObject,

    #[error("Value is not a string")]
    NotAString,

    #[error("Value is not callable")]
    NotCallable,

    #[error("Object class has no private slot")]
    NoPrivateSlot,

    #[error("Call stack quota exceeded (depth {0})")]
    StackOverflow(usize),

    #[error("Invalid engine configuration: {0}")]
    Config(#[from] crate::config::ConfigError),

    #[error("{0}")]
    Script(String),
}

impl EngineError {
    /// Error thrown from native code.
    pub fn script(msg: impl Into<String>) -> Self {
        EngineError::Script(msg.into())
    }
}

/// Report handed to the embedder's error reporter.
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorReport {
    pub message: String,
    pub filename: Option<String>,
    pub lineno: u32,
}

impl ErrorReport {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            filename: None,
            lineno: 0,
        }
    }

    pub fn lineno(&self) -> u32 {
        self.lineno
    }

    /// Source file of the error, `"no_file_name"` when unknown.
    pub fn file_name(&self) -> &str {
        self.filename.as_deref().unwrap_or("no_file_name")
    }
}

/// Callback receiving every reported error.
pub type ErrorReporter = Box<dyn Fn(&ErrorReport)>;
