//! Bridge errors.

use jsb_engine::EngineError;

/// Errors from bridge initialization
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BridgeError {
    #[error("Invalid bridge configuration: {0}")]
    Config(#[from] crate::config::ConfigError),

    #[error("Script engine failed to initialize: {0}")]
    Engine(#[from] EngineError),
}
