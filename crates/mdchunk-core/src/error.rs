//! Error types and handling for mdchunk-core operations.
//!
//! Every failure in the chunking pipeline is expressed as a [`ChunkerError`]
//! tagged with one [`ErrorKind`] from a closed taxonomy. Errors carry an open
//! string context map, an optional wrapped cause and the time they were
//! raised, so an [`ErrorHandler`](crate::ErrorHandler) can accumulate them and
//! callers can query them after a permissive run.
//!
//! ## Error Kinds
//!
//! - **Input**: `InvalidInput`, `ParsingFailed`
//! - **Resources**: `MemoryExhausted`, `Timeout`
//! - **Configuration**: `ConfigInvalid`, `StrategyNotFound`, `StrategyConfigInvalid`
//! - **Output**: `ChunkTooLarge`
//! - **Execution**: `StrategyExecutionFailed`
//!
//! ## Severity
//!
//! Severity is a pure function of the kind:
//!
//! ```rust
//! use mdchunk_core::{ErrorKind, Severity};
//!
//! assert_eq!(ErrorKind::MemoryExhausted.severity(), Severity::Critical);
//! assert_eq!(ErrorKind::ChunkTooLarge.severity(), Severity::Warning);
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Closed taxonomy of pipeline failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ErrorKind {
    /// The document could not be accepted (absent or not valid UTF-8).
    InvalidInput,
    /// The markdown parser could not produce a tree.
    ParsingFailed,
    /// The document or the produced chunks exceed the memory budget.
    MemoryExhausted,
    /// An operation ran past its deadline.
    Timeout,
    /// A configuration value is out of range or inconsistent.
    ConfigInvalid,
    /// A chunk's content exceeds the configured maximum size.
    ChunkTooLarge,
    /// No strategy is registered under the requested name.
    StrategyNotFound,
    /// A strategy rejected its configuration.
    StrategyConfigInvalid,
    /// A strategy failed or panicked while chunking.
    StrategyExecutionFailed,
}

/// How serious an error is for monitoring and alerting purposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Degraded output, processing continues sensibly.
    Warning,
    /// The current document or operation failed.
    Error,
    /// Resource exhaustion; the caller should back off.
    Critical,
}

impl ErrorKind {
    /// All kinds, in declaration order.
    pub const ALL: [Self; 9] = [
        Self::InvalidInput,
        Self::ParsingFailed,
        Self::MemoryExhausted,
        Self::Timeout,
        Self::ConfigInvalid,
        Self::ChunkTooLarge,
        Self::StrategyNotFound,
        Self::StrategyConfigInvalid,
        Self::StrategyExecutionFailed,
    ];

    /// Severity classification for this kind.
    #[must_use]
    pub const fn severity(self) -> Severity {
        match self {
            Self::MemoryExhausted | Self::Timeout => Severity::Critical,
            Self::ParsingFailed | Self::StrategyExecutionFailed => Severity::Error,
            Self::InvalidInput
            | Self::ConfigInvalid
            | Self::ChunkTooLarge
            | Self::StrategyNotFound
            | Self::StrategyConfigInvalid => Severity::Warning,
        }
    }

    /// Stable identifier suitable for log fields and metric labels.
    ///
    /// - `"input"` - Rejected or unparseable documents
    /// - `"resource"` - Memory and time budgets
    /// - `"config"` - Configuration and strategy selection
    /// - `"output"` - Chunk size limits
    /// - `"strategy"` - Strategy execution
    #[must_use]
    pub const fn category(self) -> &'static str {
        match self {
            Self::InvalidInput | Self::ParsingFailed => "input",
            Self::MemoryExhausted | Self::Timeout => "resource",
            Self::ConfigInvalid | Self::StrategyNotFound | Self::StrategyConfigInvalid => {
                "config"
            },
            Self::ChunkTooLarge => "output",
            Self::StrategyExecutionFailed => "strategy",
        }
    }

    /// Whether retrying the same document later might succeed.
    ///
    /// Only resource-pressure failures qualify: the same input with the same
    /// configuration will fail the same way for every other kind.
    #[must_use]
    pub const fn is_recoverable(self) -> bool {
        matches!(self, Self::MemoryExhausted | Self::Timeout)
    }

    /// The canonical name of the kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::InvalidInput => "InvalidInput",
            Self::ParsingFailed => "ParsingFailed",
            Self::MemoryExhausted => "MemoryExhausted",
            Self::Timeout => "Timeout",
            Self::ConfigInvalid => "ConfigInvalid",
            Self::ChunkTooLarge => "ChunkTooLarge",
            Self::StrategyNotFound => "StrategyNotFound",
            Self::StrategyConfigInvalid => "StrategyConfigInvalid",
            Self::StrategyExecutionFailed => "StrategyExecutionFailed",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Warning => f.write_str("warning"),
            Self::Error => f.write_str("error"),
            Self::Critical => f.write_str("critical"),
        }
    }
}

/// Shared, type-erased cause attached to a [`ChunkerError`].
pub type Cause = Arc<dyn std::error::Error + Send + Sync + 'static>;

/// The error type for every fallible mdchunk-core operation.
///
/// Cloning is cheap: the wrapped cause is reference counted, so the same
/// error can sit in a handler's log and be returned to the caller.
#[derive(Error, Debug, Clone)]
#[error("{kind}: {message}")]
pub struct ChunkerError {
    kind: ErrorKind,
    message: String,
    context: BTreeMap<String, String>,
    #[source]
    cause: Option<Cause>,
    timestamp: DateTime<Utc>,
}

impl ChunkerError {
    /// Create an error of the given kind.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            context: BTreeMap::new(),
            cause: None,
            timestamp: Utc::now(),
        }
    }

    /// Shorthand for [`ErrorKind::InvalidInput`].
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidInput, message)
    }

    /// Shorthand for [`ErrorKind::ParsingFailed`].
    pub fn parsing_failed(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ParsingFailed, message)
    }

    /// Shorthand for [`ErrorKind::MemoryExhausted`].
    pub fn memory_exhausted(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::MemoryExhausted, message)
    }

    /// Shorthand for [`ErrorKind::ConfigInvalid`].
    pub fn config_invalid(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ConfigInvalid, message)
    }

    /// Shorthand for [`ErrorKind::ChunkTooLarge`].
    pub fn chunk_too_large(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ChunkTooLarge, message)
    }

    /// Shorthand for [`ErrorKind::StrategyNotFound`].
    pub fn strategy_not_found(name: &str) -> Self {
        Self::new(
            ErrorKind::StrategyNotFound,
            format!("no strategy registered as '{name}'"),
        )
        .with_context("strategy", name)
    }

    /// Shorthand for [`ErrorKind::StrategyConfigInvalid`].
    pub fn strategy_config_invalid(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::StrategyConfigInvalid, message)
    }

    /// Shorthand for [`ErrorKind::StrategyExecutionFailed`].
    pub fn strategy_failed(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::StrategyExecutionFailed, message)
    }

    /// Attach a context entry, replacing any previous value for `key`.
    #[must_use]
    pub fn with_context(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.context.insert(key.into(), value.to_string());
        self
    }

    /// Wrap an underlying cause.
    #[must_use]
    pub fn with_cause<E>(mut self, cause: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        self.cause = Some(Arc::new(cause));
        self
    }

    /// The error kind.
    pub const fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Human-readable message.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Context entries attached at the raise site.
    pub const fn context(&self) -> &BTreeMap<String, String> {
        &self.context
    }

    /// The wrapped cause, if any.
    pub fn cause(&self) -> Option<&Cause> {
        self.cause.as_ref()
    }

    /// When the error was raised.
    pub const fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Severity of the error's kind.
    pub const fn severity(&self) -> Severity {
        self.kind.severity()
    }

    /// Category of the error's kind.
    pub const fn category(&self) -> &'static str {
        self.kind.category()
    }

    /// Whether the error's kind is recoverable.
    pub const fn is_recoverable(&self) -> bool {
        self.kind.is_recoverable()
    }
}

impl From<toml::de::Error> for ChunkerError {
    fn from(err: toml::de::Error) -> Self {
        Self::config_invalid(format!("invalid TOML configuration: {err}")).with_cause(err)
    }
}

impl From<serde_json::Error> for ChunkerError {
    fn from(err: serde_json::Error) -> Self {
        Self::config_invalid(format!("invalid JSON configuration: {err}")).with_cause(err)
    }
}

/// Convenience alias used throughout mdchunk-core.
pub type Result<T> = std::result::Result<T, ChunkerError>;

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::error::Error as _;
    use std::io;

    #[test]
    fn test_display_includes_kind_and_message() {
        let err = ChunkerError::chunk_too_large("chunk 3 is 120 bytes");
        assert_eq!(err.to_string(), "ChunkTooLarge: chunk 3 is 120 bytes");
    }

    #[test]
    fn test_severity_classification() {
        assert_eq!(ErrorKind::MemoryExhausted.severity(), Severity::Critical);
        assert_eq!(ErrorKind::Timeout.severity(), Severity::Critical);
        assert_eq!(ErrorKind::InvalidInput.severity(), Severity::Warning);
        assert_eq!(ErrorKind::ConfigInvalid.severity(), Severity::Warning);
        assert_eq!(ErrorKind::ChunkTooLarge.severity(), Severity::Warning);
        assert_eq!(ErrorKind::ParsingFailed.severity(), Severity::Error);
        assert_eq!(ErrorKind::StrategyExecutionFailed.severity(), Severity::Error);
    }

    #[test]
    fn test_categories_cover_all_kinds() {
        for kind in ErrorKind::ALL {
            assert!(!kind.category().is_empty());
            assert_eq!(kind.to_string(), kind.as_str());
        }
    }

    #[test]
    fn test_context_and_cause_chain() {
        let io_err = io::Error::new(io::ErrorKind::InvalidData, "bad bytes");
        let err = ChunkerError::invalid_input("document rejected")
            .with_context("document", 7)
            .with_cause(io_err);

        assert_eq!(err.context().get("document").map(String::as_str), Some("7"));
        let source = err.source().unwrap();
        assert_eq!(source.to_string(), "bad bytes");
    }

    #[test]
    fn test_clone_shares_cause() {
        let err = ChunkerError::parsing_failed("tree missing")
            .with_cause(io::Error::other("grammar"));
        let cloned = err.clone();
        assert!(Arc::ptr_eq(err.cause().unwrap(), cloned.cause().unwrap()));
        assert_eq!(err.timestamp(), cloned.timestamp());
    }

    #[test]
    fn test_recoverability() {
        assert!(ChunkerError::memory_exhausted("over budget").is_recoverable());
        assert!(!ChunkerError::config_invalid("bad").is_recoverable());
    }

    #[test]
    fn test_from_toml_error() {
        let parse: std::result::Result<toml::Value, _> = toml::from_str("= broken");
        let err: ChunkerError = parse.unwrap_err().into();
        assert_eq!(err.kind(), ErrorKind::ConfigInvalid);
        assert!(err.source().is_some());
    }

    proptest! {
        #[test]
        fn test_arbitrary_messages_round_trip_display(msg in r".{0,200}") {
            let err = ChunkerError::strategy_failed(msg.clone());
            let rendered = err.to_string();
            prop_assert!(rendered.starts_with("StrategyExecutionFailed: "));
            prop_assert!(rendered.ends_with(&msg));
            prop_assert_eq!(err.category(), "strategy");
        }
    }
}
