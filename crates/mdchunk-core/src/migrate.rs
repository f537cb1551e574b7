//! Configuration migration.
//!
//! Accepts current TOML, current JSON or the legacy flat JSON layout
//! (PascalCase keys such as `MaxChunkSize` or `StrictMode`) and produces the
//! equivalent [`ChunkerConfig`], together with a note for every key that
//! was translated and a warning for everything that had to be changed or
//! ignored. The result is validated before it is returned.

use crate::config::ChunkerConfig;
use crate::error::{ChunkerError, Result};
use crate::handler::ErrorMode;
use serde_json::{Map, Value};
use tracing::debug;

const CURRENT_KEYS: [&str; 9] = [
    "max_chunk_size",
    "enabled_types",
    "error_handling",
    "performance_mode",
    "filter_empty_chunks",
    "memory_limit",
    "enable_object_pooling",
    "max_concurrency",
    "chunking_strategy",
];

const SIZE_KEYS: [&str; 3] = ["max_chunk_size", "memory_limit", "max_concurrency"];

/// Detected input layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    /// Current layout in TOML.
    Toml,
    /// Current layout in JSON.
    Json,
    /// Flat JSON with legacy keys.
    LegacyJson,
}

/// Outcome of a migration.
#[derive(Debug, Clone)]
pub struct Migration {
    /// Equivalent current configuration.
    pub config: ChunkerConfig,
    /// Detected input layout.
    pub source_format: SourceFormat,
    /// One line per translated key.
    pub notes: Vec<String>,
    /// Clamped values, dropped entries and unknown keys.
    pub warnings: Vec<String>,
}

/// Migrate a configuration document to the current layout.
pub fn migrate(input: &str) -> Result<Migration> {
    let trimmed = input.trim();
    let (document, is_json) = if trimmed.starts_with('{') {
        (serde_json::from_str::<Value>(trimmed)?, true)
    } else {
        let table: toml::Table = toml::from_str(trimmed)?;
        (serde_json::to_value(table)?, false)
    };
    let Value::Object(entries) = document else {
        return Err(ChunkerError::config_invalid(
            "configuration must be a table of settings",
        ));
    };

    let mut state = MigrationState::default();
    for (key, value) in entries {
        state.apply(&key, value);
    }
    state.finish(is_json)
}

#[derive(Default)]
struct MigrationState {
    current: Map<String, Value>,
    notes: Vec<String>,
    warnings: Vec<String>,
    legacy_keys: usize,
    strict_mode: Option<bool>,
}

impl MigrationState {
    fn apply(&mut self, key: &str, value: Value) {
        if CURRENT_KEYS.contains(&key) {
            let value = if SIZE_KEYS.contains(&key) {
                self.non_negative(key, value)
            } else {
                value
            };
            self.current.insert(key.to_string(), value);
            return;
        }

        let target = match key {
            "MaxChunkSize" => "max_chunk_size",
            "EnabledTypes" | "ChunkTypes" => "enabled_types",
            "ErrorHandling" => "error_handling",
            "PerformanceMode" => "performance_mode",
            "FilterEmpty" | "FilterEmptyChunks" => "filter_empty_chunks",
            "MemoryLimitMB" => "memory_limit",
            "MemoryLimit" => "memory_limit",
            "EnableObjectPooling" => "enable_object_pooling",
            "MaxConcurrency" => "max_concurrency",
            "Strategy" | "ChunkingStrategy" => "chunking_strategy",
            "StrictMode" => {
                self.legacy_keys += 1;
                match value.as_bool() {
                    Some(strict) => {
                        self.strict_mode = Some(strict);
                        self.notes
                            .push("mapped legacy key `StrictMode` to `error_handling`".to_string());
                    },
                    None => self
                        .warnings
                        .push("ignored `StrictMode`: expected true or false".to_string()),
                }
                return;
            },
            _ => {
                self.warnings.push(format!("ignored unknown key `{key}`"));
                return;
            },
        };

        self.legacy_keys += 1;
        let value = match key {
            "MemoryLimitMB" => {
                let megabytes = self.non_negative(target, value);
                megabytes
                    .as_u64()
                    .map_or(megabytes, |mb| Value::from(mb.saturating_mul(1024 * 1024)))
            },
            "EnabledTypes" | "ChunkTypes" => self.legacy_types(value),
            "ErrorHandling" | "PerformanceMode" => match value {
                Value::String(s) => Value::String(s.to_ascii_lowercase()),
                other => other,
            },
            "Strategy" | "ChunkingStrategy" => legacy_strategy(value),
            _ if SIZE_KEYS.contains(&target) => self.non_negative(target, value),
            _ => value,
        };
        self.notes
            .push(format!("mapped legacy key `{key}` to `{target}`"));
        self.current.insert(target.to_string(), value);
    }

    fn non_negative(&mut self, key: &str, value: Value) -> Value {
        match value.as_i64() {
            Some(n) if n < 0 => {
                self.warnings
                    .push(format!("`{key}` was {n}, clamped to 0"));
                Value::from(0)
            },
            _ => value,
        }
    }

    fn legacy_types(&mut self, value: Value) -> Value {
        let Value::Array(items) = value else {
            self.warnings
                .push("ignored legacy chunk types: expected a list".to_string());
            return Value::Array(Vec::new());
        };
        let mut types = Vec::new();
        for item in items {
            let Some(tag) = item.as_str() else {
                continue;
            };
            let canonical = match tag.to_ascii_lowercase().as_str() {
                "code_block" | "codeblock" | "fenced_code" => "code".to_string(),
                "quote" | "block_quote" => "blockquote".to_string(),
                "hr" | "thematicbreak" | "horizontal_rule" => "thematic_break".to_string(),
                other => other.to_string(),
            };
            if crate::types::ChunkType::from_tag(&canonical).is_known() {
                types.push(Value::String(canonical));
            } else {
                self.warnings
                    .push(format!("dropped unknown chunk type `{tag}`"));
            }
        }
        Value::Array(types)
    }

    fn finish(mut self, is_json: bool) -> Result<Migration> {
        if let Some(strict) = self.strict_mode {
            if self.current.contains_key("error_handling") {
                self.warnings.push(
                    "`StrictMode` ignored because `error_handling` is also set".to_string(),
                );
            } else {
                let mode = if strict {
                    ErrorMode::Strict
                } else {
                    ErrorMode::Permissive
                };
                self.current
                    .insert("error_handling".to_string(), Value::from(mode.as_str()));
            }
        }

        let source_format = match (is_json, self.legacy_keys > 0) {
            (true, true) => SourceFormat::LegacyJson,
            (true, false) => SourceFormat::Json,
            (false, _) => SourceFormat::Toml,
        };
        let config: ChunkerConfig = serde_json::from_value(Value::Object(self.current))?;
        config.validate()?;
        debug!(
            notes = self.notes.len(),
            warnings = self.warnings.len(),
            "Configuration migrated"
        );
        Ok(Migration {
            config,
            source_format,
            notes: self.notes,
            warnings: self.warnings,
        })
    }
}

/// Legacy strategy: a bare name or an object with PascalCase keys.
fn legacy_strategy(value: Value) -> Value {
    match value {
        Value::String(name) => {
            let mut strategy = Map::new();
            strategy.insert("name".to_string(), Value::String(name.to_ascii_lowercase()));
            Value::Object(strategy)
        },
        Value::Object(fields) => Value::Object(
            fields
                .into_iter()
                .map(|(key, value)| (snake_case(&key), value))
                .collect(),
        ),
        other => other,
    }
}

fn snake_case(key: &str) -> String {
    let mut out = String::with_capacity(key.len() + 4);
    for (i, ch) in key.chars().enumerate() {
        if ch.is_ascii_uppercase() {
            if i > 0 {
                out.push('_');
            }
            out.push(ch.to_ascii_lowercase());
        } else {
            out.push(ch);
        }
    }
    out
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::types::ChunkType;

    #[test]
    fn test_legacy_json_is_mapped() {
        let migration = migrate(
            r#"{
                "MaxChunkSize": 2048,
                "ChunkTypes": ["Heading", "CodeBlock", "hr"],
                "StrictMode": true,
                "MemoryLimitMB": 2,
                "FilterEmpty": false,
                "Strategy": "Hierarchical"
            }"#,
        )
        .unwrap();

        assert_eq!(migration.source_format, SourceFormat::LegacyJson);
        let config = migration.config;
        assert_eq!(config.max_chunk_size, 2048);
        assert_eq!(
            config.enabled_types,
            vec![ChunkType::Heading, ChunkType::Code, ChunkType::ThematicBreak]
        );
        assert_eq!(config.error_handling, ErrorMode::Strict);
        assert_eq!(config.memory_limit, 2 * 1024 * 1024);
        assert!(!config.filter_empty_chunks);
        assert_eq!(config.chunking_strategy.name, "hierarchical");
        assert_eq!(migration.notes.len(), 6);
        assert!(migration.warnings.is_empty());
    }

    #[test]
    fn test_negative_sizes_clamp_with_warning() {
        let migration = migrate(r#"{"MaxChunkSize": -5, "memory_limit": -1}"#).unwrap();
        assert_eq!(migration.config.max_chunk_size, 0);
        assert_eq!(migration.config.memory_limit, 0);
        assert_eq!(migration.warnings.len(), 2);
    }

    #[test]
    fn test_unknown_keys_warn() {
        let migration = migrate(r#"{"Colour": "blue", "max_concurrency": 2}"#).unwrap();
        assert_eq!(migration.source_format, SourceFormat::Json);
        assert_eq!(migration.config.max_concurrency, 2);
        assert_eq!(migration.warnings, vec!["ignored unknown key `Colour`".to_string()]);
    }

    #[test]
    fn test_current_toml_passes_through() {
        let migration = migrate(
            "error_handling = \"silent\"\n[chunking_strategy]\nname = \"document\"\n",
        )
        .unwrap();
        assert_eq!(migration.source_format, SourceFormat::Toml);
        assert_eq!(migration.config.error_handling, ErrorMode::Silent);
        assert!(migration.notes.is_empty());
    }

    #[test]
    fn test_explicit_error_handling_beats_strict_mode() {
        let migration = migrate(r#"{"StrictMode": true, "ErrorHandling": "Silent"}"#).unwrap();
        assert_eq!(migration.config.error_handling, ErrorMode::Silent);
        assert_eq!(migration.warnings.len(), 1);
    }

    #[test]
    fn test_legacy_strategy_object() {
        let migration =
            migrate(r#"{"Strategy": {"Name": "hierarchical", "MaxDepth": 2}}"#).unwrap();
        assert_eq!(migration.config.chunking_strategy.max_depth, 2);
    }

    #[test]
    fn test_invalid_result_is_rejected() {
        let err = migrate(r#"{"MaxConcurrency": 0}"#).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConfigInvalid);
        assert_eq!(migrate("[1, 2]").unwrap_err().kind(), ErrorKind::ConfigInvalid);
    }

    #[test]
    fn test_snake_case() {
        assert_eq!(snake_case("MaxDepth"), "max_depth");
        assert_eq!(snake_case("name"), "name");
    }
}
