//! OpusOthello - Pool configuration
//!
//! Settings recognised when the worker pool is built. Every field has a
//! default, so an empty JSON object is a valid configuration.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::strategy::{StrategyKey, BUILTIN_MODULE, PVS_EXPORT};
use crate::types::DISC_SCORE;

/// Largest pool the default sizing will pick
pub const MAX_DEFAULT_POOL: usize = 8;

/// Upper bound accepted for an explicit pool size
pub const MAX_POOL_SIZE: usize = 64;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PoolConfig {
    /// Number of worker threads
    pub pool_size: usize,
    /// Time limit in ms for requests that do not carry one
    pub worker_timeout: u64,
    /// Any worker result at or beyond this magnitude ends the job at once
    pub early_stop_threshold: i32,
    pub engine_module_ref: String,
    pub engine_export_name: String,
    /// Score window within which a non-X-square answer beats an X-square one
    pub x_square_tolerance: i32,
    /// Extra ms granted after the time limit before the job is hard cancelled
    pub cancel_grace_ms: u64,
}

impl PoolConfig {
    /// Half the hardware threads, between 1 and 8
    pub fn default_pool_size() -> usize {
        (num_cpus::get() / 2).clamp(1, MAX_DEFAULT_POOL)
    }

    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let config: PoolConfig = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path)?;
        PoolConfig::from_json(&text)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.pool_size == 0 || self.pool_size > MAX_POOL_SIZE {
            return Err(ConfigError::Invalid(format!(
                "poolSize must be between 1 and {}, got {}",
                MAX_POOL_SIZE, self.pool_size
            )));
        }
        if self.worker_timeout == 0 {
            return Err(ConfigError::Invalid("workerTimeout must be positive".into()));
        }
        if self.early_stop_threshold <= 0 {
            return Err(ConfigError::Invalid("earlyStopThreshold must be positive".into()));
        }
        if self.x_square_tolerance < 0 {
            return Err(ConfigError::Invalid("xSquareTolerance must not be negative".into()));
        }
        Ok(())
    }

    /// Strategy used when a request names none
    pub fn strategy_key(&self) -> StrategyKey {
        StrategyKey::new(self.engine_module_ref.clone(), self.engine_export_name.clone())
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        PoolConfig {
            pool_size: PoolConfig::default_pool_size(),
            worker_timeout: 5000,
            early_stop_threshold: DISC_SCORE,
            engine_module_ref: BUILTIN_MODULE.to_string(),
            engine_export_name: PVS_EXPORT.to_string(),
            x_square_tolerance: 20,
            cancel_grace_ms: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_object_is_default() {
        let config = PoolConfig::from_json("{}").unwrap();
        assert_eq!(config, PoolConfig::default());
        assert!((1..=MAX_DEFAULT_POOL).contains(&config.pool_size));
    }

    #[test]
    fn test_camel_case_keys() {
        let config = PoolConfig::from_json(
            r#"{"poolSize": 3, "workerTimeout": 250, "earlyStopThreshold": 5000,
                "engineModuleRef": "custom", "engineExportName": "search"}"#,
        )
        .unwrap();
        assert_eq!(config.pool_size, 3);
        assert_eq!(config.worker_timeout, 250);
        assert_eq!(config.early_stop_threshold, 5000);
        assert_eq!(config.strategy_key(), StrategyKey::new("custom", "search"));
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(matches!(
            PoolConfig::from_json(r#"{"poolSize": 0}"#),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            PoolConfig::from_json(r#"{"workerTimeout": 0}"#),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(PoolConfig::from_json("[1,"), Err(ConfigError::Parse(_))));
    }
}
