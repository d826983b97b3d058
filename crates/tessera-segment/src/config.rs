//! Segment engine configuration.
//!
//! Provides configuration file support via `tessera.toml`, environment
//! variables, and programmatic overrides. Segments receive the resolved
//! [`SegmentConfig`] at construction and never read ambient globals.
//!
//! # Priority (highest to lowest)
//!
//! 1. Environment variables (`TESSERA_*`)
//! 2. Configuration file (`tessera.toml`)
//! 3. Default values

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

use crate::metric::MetricType;

/// Configuration errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to parse configuration.
    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    /// Invalid configuration value.
    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidValue {
        /// Configuration key that failed validation.
        key: String,
        /// Validation error message.
        message: String,
    },
}

/// Column store configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ColumnConfig {
    /// Rows per chunk in growing column stores.
    ///
    /// Full chunks are immutable and shared with readers without locking,
    /// so larger chunks mean fewer directory updates but coarser sharing.
    pub chunk_rows: usize,
}

impl Default for ColumnConfig {
    fn default() -> Self {
        Self { chunk_rows: 32_768 }
    }
}

/// Sealed segment configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SealedConfig {
    /// Rows per slice in the sealed timestamp index. Each slice keeps a
    /// min/max pair; queries scan slice metadata instead of every row.
    pub timestamp_slice_rows: usize,
}

impl Default for SealedConfig {
    fn default() -> Self {
        Self {
            timestamp_slice_rows: 8_192,
        }
    }
}

/// Growing auto-indexing configuration section.
///
/// When enabled, vector chunks that fall entirely below the visibility
/// watermark get a small per-chunk index built through the registered
/// kernel; searches use it instead of scanning the chunk.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GrowingIndexConfig {
    /// Build per-chunk indexes on growing segments.
    pub enabled: bool,
    /// Index kind to build, resolved through the kernel registry.
    pub kind: String,
    /// Metric the per-chunk indexes are built under. Searches with another
    /// metric fall back to scanning the raw chunk.
    pub metric: MetricType,
}

impl Default for GrowingIndexConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            kind: "brute_force".to_string(),
            metric: MetricType::L2,
        }
    }
}

/// Query limits configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Maximum top-K per query.
    pub max_topk: usize,
    /// Maximum number of query vectors per request.
    pub max_queries: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_topk: 16_384,
            max_queries: 16_384,
        }
    }
}

/// Main segment engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct SegmentConfig {
    /// Column store configuration.
    pub column: ColumnConfig,
    /// Sealed segment configuration.
    pub sealed: SealedConfig,
    /// Growing auto-indexing configuration.
    pub growing_index: GrowingIndexConfig,
    /// Query limits configuration.
    pub limits: LimitsConfig,
}

impl SegmentConfig {
    /// Loads configuration from default sources.
    ///
    /// Priority: defaults < file < environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration parsing fails.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_path("tessera.toml")
    }

    /// Loads configuration from a specific file path.
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the configuration file.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration parsing fails.
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let figment = Figment::new()
            .merge(Serialized::defaults(Self::default()))
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed("TESSERA_").split("_").lowercase(false));

        figment
            .extract()
            .map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Creates a configuration from a TOML string.
    ///
    /// # Arguments
    ///
    /// * `toml_str` - TOML configuration string.
    ///
    /// # Errors
    ///
    /// Returns an error if parsing fails.
    pub fn from_toml(toml_str: &str) -> Result<Self, ConfigError> {
        let figment = Figment::new()
            .merge(Serialized::defaults(Self::default()))
            .merge(Toml::string(toml_str));

        figment
            .extract()
            .map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration value is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(64..=1_048_576).contains(&self.column.chunk_rows) {
            return Err(ConfigError::InvalidValue {
                key: "column.chunk_rows".to_string(),
                message: format!(
                    "value {} is out of range [64, 1048576]",
                    self.column.chunk_rows
                ),
            });
        }

        if !(64..=1_048_576).contains(&self.sealed.timestamp_slice_rows) {
            return Err(ConfigError::InvalidValue {
                key: "sealed.timestamp_slice_rows".to_string(),
                message: format!(
                    "value {} is out of range [64, 1048576]",
                    self.sealed.timestamp_slice_rows
                ),
            });
        }

        if self.limits.max_topk == 0 || self.limits.max_topk > 16_384 {
            return Err(ConfigError::InvalidValue {
                key: "limits.max_topk".to_string(),
                message: format!("value {} is out of range [1, 16384]", self.limits.max_topk),
            });
        }

        if self.limits.max_queries == 0 || self.limits.max_queries > 16_384 {
            return Err(ConfigError::InvalidValue {
                key: "limits.max_queries".to_string(),
                message: format!(
                    "value {} is out of range [1, 16384]",
                    self.limits.max_queries
                ),
            });
        }

        if self.growing_index.kind.is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "growing_index.kind".to_string(),
                message: "index kind must not be empty".to_string(),
            });
        }

        Ok(())
    }

    /// Serializes the configuration to TOML.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::ParseError(e.to_string()))
    }
}
