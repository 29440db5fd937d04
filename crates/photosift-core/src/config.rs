//! Engine configuration.

use derive_builder::Builder;
use serde::{Deserialize, Serialize};

/// Configuration for the scan engine.
#[derive(Debug, Clone, Builder, Serialize, Deserialize)]
#[builder(setter(into), build_fn(validate = "Self::validate"))]
pub struct EngineConfig {
    /// Items between durable checkpoints.
    #[builder(default = "50")]
    #[serde(default = "default_batch_size")]
    pub batch_size: u64,

    /// Capacity of the snapshot broadcast channel.
    #[builder(default = "100")]
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
}

fn default_batch_size() -> u64 {
    50
}

fn default_event_capacity() -> usize {
    100
}

impl EngineConfigBuilder {
    fn validate(&self) -> Result<(), String> {
        if let Some(batch_size) = self.batch_size {
            if batch_size == 0 {
                return Err("Batch size must be at least 1".to_string());
            }
        }
        if let Some(event_capacity) = self.event_capacity {
            if event_capacity == 0 {
                return Err("Event capacity must be at least 1".to_string());
            }
        }
        Ok(())
    }
}

impl EngineConfig {
    /// Create a new config builder.
    pub fn builder() -> EngineConfigBuilder {
        EngineConfigBuilder::default()
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            event_capacity: default_event_capacity(),
        }
    }
}
