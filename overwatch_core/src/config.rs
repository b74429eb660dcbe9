//! Engine configuration.
//!
//! Every section derives `Default` and `#[serde(default)]`, so a partial
//! JSON document (or none at all) yields a usable configuration.

use crate::box_select::BoxSelectConfig;
use crate::focus::FocusSettings;
use crate::overwatch_cluster::ClusterConfig;
use crate::overwatch_store::StoreConfig;
use crate::pipeline::PipelineConfig;
use serde::{Deserialize, Serialize};

/// Configuration for the MonitorEngine
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub store: StoreConfig,
    pub cluster: ClusterConfig,
    pub pipeline: PipelineConfig,
    pub focus: FocusSettings,
    pub box_select: BoxSelectConfig,
}

impl EngineConfig {
    /// Parses and validates a JSON configuration document.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: EngineConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks every section for values the engine cannot work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.cluster.validate()?;

        if self.pipeline.max_passes == 0 {
            return Err(ConfigError::MaxPasses);
        }
        if !(self.focus.distance.is_finite() && self.focus.distance >= 0.0) {
            return Err(ConfigError::FocusDistance(self.focus.distance));
        }
        if !(self.focus.duration.is_finite() && self.focus.duration >= 0.0) {
            return Err(ConfigError::FocusDuration(self.focus.duration));
        }
        let adhere = self.box_select.closest_distance_to_adhere;
        if !(adhere.is_finite() && adhere >= 0.0) {
            return Err(ConfigError::AdhereDistance(adhere));
        }
        Ok(())
    }
}

/// Invalid configuration values.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Malformed configuration: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Density factor must be positive and finite, got {0}")]
    DensityFactor(f64),

    #[error("Nearest distance must be non-negative, got {0}")]
    NearestDistance(f64),

    #[error("At least one pass per run is required")]
    MaxPasses,

    #[error("Focus distance must be non-negative, got {0}")]
    FocusDistance(f64),

    #[error("Focus duration must be non-negative, got {0}")]
    FocusDuration(f64),

    #[error("Adhere distance must be non-negative, got {0}")]
    AdhereDistance(f64),
}
