//! Bridge Configuration
//!
//! Engine sizing plus the initial sizes of the bridge's own buffers.
//! Loadable from TOML.

use jsb_engine::EngineConfig;
use serde::{Deserialize, Serialize};

/// Complete bridge configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Script engine settings
    pub engine: EngineConfig,

    /// Entries reserved in the handle table
    pub initial_handle_capacity: usize,

    /// Slots reserved in the argument staging buffers
    pub initial_arg_capacity: usize,

    /// Largest argument count accepted by a single call
    pub max_call_args: usize,

    /// Bytes reserved in the scratch buffer
    pub initial_scratch_bytes: usize,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self::standard()
    }
}

impl BridgeConfig {
    pub fn standard() -> Self {
        Self {
            engine: EngineConfig::standard(),
            initial_handle_capacity: 1024,
            initial_arg_capacity: 16,
            max_call_args: 256,
            initial_scratch_bytes: 1024,
        }
    }

    /// Small buffers and frequent collections
    pub fn low_memory() -> Self {
        Self {
            engine: EngineConfig::low_memory(),
            initial_handle_capacity: 64,
            initial_arg_capacity: 4,
            max_call_args: 64,
            initial_scratch_bytes: 0,
        }
    }

    /// Parse and validate a TOML document
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(s).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.engine.validate()?;
        if self.max_call_args == 0 {
            return Err(ConfigError::NoCallArgs);
        }
        if self.initial_arg_capacity > self.max_call_args {
            return Err(ConfigError::ArgCapacityTooLarge);
        }
        Ok(())
    }
}

/// Configuration errors
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error(transparent)]
    Engine(#[from] jsb_engine::ConfigError),

    #[error("max_call_args must be non-zero")]
    NoCallArgs,

    #[error("Initial argument capacity cannot exceed max_call_args")]
    ArgCapacityTooLarge,

    #[error("Invalid config file: {0}")]
    Parse(String),
}
