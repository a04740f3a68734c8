//! Script Engine Configuration
//!
//! Sizing and collection knobs for a script heap.

use serde::{Deserialize, Serialize};

/// Engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Allocations between two allocation-triggered collections
    pub gc_alloc_threshold: usize,

    /// Maximum nesting of native calls (stack quota)
    pub max_call_depth: usize,

    /// Cells reserved in the heap arena up front
    pub initial_heap_cells: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::standard()
    }
}

impl EngineConfig {
    /// Configuration used by most embedders
    pub fn standard() -> Self {
        Self {
            gc_alloc_threshold: 8 * 1024,
            max_call_depth: 512,
            initial_heap_cells: 1024,
        }
    }

    /// Small heap, frequent collections
    pub fn low_memory() -> Self {
        Self {
            gc_alloc_threshold: 256,
            max_call_depth: 128,
            initial_heap_cells: 64,
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.gc_alloc_threshold == 0 {
            return Err(ConfigError::ZeroGcThreshold);
        }
        if self.max_call_depth == 0 {
            return Err(ConfigError::ZeroCallDepth);
        }
        Ok(())
    }
}

/// Configuration errors
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("GC allocation threshold must be non-zero")]
    ZeroGcThreshold,

    #[error("Call depth quota must be non-zero")]
    ZeroCallDepth,
}
