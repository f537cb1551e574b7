//! Chunker configuration.
//!
//! Configuration is stored in TOML (primary) or JSON and always validated
//! before use: [`ChunkerConfig::load`] and friends return an error instead
//! of silently applying an invalid value.
//!
//! ## Example Configuration File
//!
//! ```toml
//! max_chunk_size = 4000
//! enabled_types = ["heading", "paragraph", "code", "table", "list"]
//! error_handling = "permissive"
//! performance_mode = "balanced"
//! filter_empty_chunks = true
//! memory_limit = 0
//! enable_object_pooling = true
//! max_concurrency = 4
//!
//! [chunking_strategy]
//! name = "hierarchical"
//! max_depth = 3
//! ```
//!
//! ## Loading
//!
//! ```rust
//! use mdchunk_core::{ChunkerConfig, ErrorMode};
//!
//! let config = ChunkerConfig::from_toml_str("error_handling = \"strict\"")?;
//! assert_eq!(config.error_handling, ErrorMode::Strict);
//! assert_eq!(config.chunking_strategy.name, "element");
//! # Ok::<(), mdchunk_core::ChunkerError>(())
//! ```

use crate::error::{ChunkerError, Result};
use crate::handler::ErrorMode;
use crate::types::ChunkType;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

/// Hard upper bound on heading depth.
pub const MAX_HEADING_DEPTH: u8 = 6;

/// Throughput/footprint hint. It only tunes pool retention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PerformanceMode {
    /// Middle ground.
    #[default]
    Balanced,
    /// Keep more idle objects around.
    Speed,
    /// Keep few idle objects around.
    Memory,
}

impl PerformanceMode {
    /// Idle objects each pool may retain.
    pub const fn pool_retention(self) -> usize {
        match self {
            Self::Memory => 2,
            Self::Balanced => 8,
            Self::Speed => 32,
        }
    }
}

/// Configuration of one chunking strategy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StrategyConfig {
    /// Registered strategy name.
    pub name: String,
    /// Only these types are emitted (empty: all).
    pub include_types: Vec<ChunkType>,
    /// These types are never emitted.
    pub exclude_types: Vec<ChunkType>,
    /// Chunks with fewer content bytes are dropped.
    pub min_chunk_size: usize,
    /// Strategy-level size target in bytes, 0 for unbounded.
    pub max_chunk_size: usize,
    /// Shallowest heading level acting as a boundary.
    pub min_depth: u8,
    /// Deepest heading level acting as a boundary.
    pub max_depth: u8,
    /// Fold blank chunks into their predecessor instead of dropping them.
    pub merge_empty: bool,
    /// Strategy-specific options.
    pub parameters: BTreeMap<String, serde_json::Value>,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self::named("element")
    }
}

impl StrategyConfig {
    /// Default settings for the strategy `name`.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            include_types: Vec::new(),
            exclude_types: Vec::new(),
            min_chunk_size: 0,
            max_chunk_size: 0,
            min_depth: 1,
            max_depth: MAX_HEADING_DEPTH,
            merge_empty: false,
            parameters: BTreeMap::new(),
        }
    }

    /// Checks shared by every strategy.
    pub fn validate_common(&self) -> Result<()> {
        let invalid = |field: &str, message: String| {
            Err(ChunkerError::strategy_config_invalid(message)
                .with_context("strategy", &self.name)
                .with_context("field", field))
        };

        if self.name.trim().is_empty() {
            return invalid("name", "strategy name is empty".to_string());
        }
        if self.min_depth > self.max_depth {
            return invalid(
                "min_depth",
                format!(
                    "min_depth {} is greater than max_depth {}",
                    self.min_depth, self.max_depth
                ),
            );
        }
        if self.max_chunk_size > 0 && self.min_chunk_size > self.max_chunk_size {
            return invalid(
                "min_chunk_size",
                format!(
                    "min_chunk_size {} is greater than max_chunk_size {}",
                    self.min_chunk_size, self.max_chunk_size
                ),
            );
        }
        if let Some(unknown) = self
            .include_types
            .iter()
            .chain(&self.exclude_types)
            .find(|t| !t.is_known())
        {
            return invalid("include_types", format!("unknown chunk type '{unknown}'"));
        }
        Ok(())
    }

    /// Whether a chunk of `chunk_type` passes the include/exclude filters.
    pub fn admits(&self, chunk_type: &ChunkType) -> bool {
        (self.include_types.is_empty() || self.include_types.contains(chunk_type))
            && !self.exclude_types.contains(chunk_type)
    }

    /// Typed lookup of a strategy parameter.
    pub fn parameter<T: serde::de::DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.parameters
            .get(key)
            .and_then(|value| serde_json::from_value(value.clone()).ok())
    }
}

/// Configuration of a [`Chunker`](crate::Chunker).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkerConfig {
    /// Maximum content bytes per chunk, 0 for unbounded.
    pub max_chunk_size: usize,
    /// Chunk types that are emitted; empty means all.
    pub enabled_types: Vec<ChunkType>,
    /// Failure propagation policy.
    pub error_handling: ErrorMode,
    /// Performance hint.
    pub performance_mode: PerformanceMode,
    /// Drop chunks with blank text and content.
    pub filter_empty_chunks: bool,
    /// Per-document memory budget in bytes, 0 for unbounded.
    pub memory_limit: u64,
    /// Reuse scratch buffers and chunkers through object pools.
    pub enable_object_pooling: bool,
    /// Default batch concurrency.
    pub max_concurrency: usize,
    /// Active strategy and its settings.
    pub chunking_strategy: StrategyConfig,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            max_chunk_size: 0,
            enabled_types: ChunkType::KNOWN.to_vec(),
            error_handling: ErrorMode::Permissive,
            performance_mode: PerformanceMode::Balanced,
            filter_empty_chunks: true,
            memory_limit: 0,
            enable_object_pooling: true,
            max_concurrency: 4,
            chunking_strategy: StrategyConfig::default(),
        }
    }
}

impl ChunkerConfig {
    /// Reject invalid settings.
    ///
    /// Strategy-specific limits are checked when the strategy is configured.
    pub fn validate(&self) -> Result<()> {
        if self.max_concurrency == 0 {
            return Err(
                ChunkerError::config_invalid("max_concurrency must be at least 1")
                    .with_context("field", "max_concurrency"),
            );
        }
        if let Some(unknown) = self.enabled_types.iter().find(|t| !t.is_known()) {
            return Err(ChunkerError::config_invalid(format!(
                "unknown chunk type '{unknown}' in enabled_types"
            ))
            .with_context("field", "enabled_types"));
        }
        self.chunking_strategy.validate_common().map_err(|err| {
            ChunkerError::config_invalid(format!("invalid chunking_strategy: {}", err.message()))
                .with_context("field", "chunking_strategy")
                .with_cause(err)
        })
    }

    /// Whether chunks of `chunk_type` are emitted.
    pub fn type_enabled(&self, chunk_type: &ChunkType) -> bool {
        self.enabled_types.is_empty() || self.enabled_types.contains(chunk_type)
    }

    /// Parse and validate TOML.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse and validate JSON.
    pub fn from_json_str(content: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a file; `.json` files are JSON, anything else TOML.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            ChunkerError::config_invalid(format!("Failed to read config: {e}"))
                .with_context("path", path.display())
                .with_cause(e)
        })?;
        let is_json = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        if is_json {
            Self::from_json_str(&content)
        } else {
            Self::from_toml_str(&content)
        }
    }

    /// Serialize to pretty TOML.
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| ChunkerError::config_invalid(format!("Failed to serialize config: {e}")))
    }

    /// Write as TOML, creating parent directories.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| {
                ChunkerError::config_invalid(format!("Failed to create config directory: {e}"))
            })?;
        }
        let content = self.to_toml_string()?;
        fs::write(path, content)
            .map_err(|e| ChunkerError::config_invalid(format!("Failed to write config: {e}")))
    }
}
