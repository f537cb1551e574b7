//! Mode-driven error sink.
//!
//! Every error raised while chunking goes through [`ErrorHandler::handle_error`]
//! exactly once. The handler appends it to its log first, reports it to the
//! event sink, and only then applies the configured [`ErrorMode`]: `strict`
//! hands the error back to the caller, `permissive` and `silent` swallow it.

use crate::error::{ChunkerError, ErrorKind, Result};
use crate::events::{ChunkerEvent, SharedSink, TracingSink};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Failure propagation policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorMode {
    /// The first error aborts the document.
    Strict,
    /// Errors are recorded and processing continues.
    #[default]
    Permissive,
    /// As permissive, and fallback notifications are suppressed.
    Silent,
}

impl ErrorMode {
    /// Name used in configuration files.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Strict => "strict",
            Self::Permissive => "permissive",
            Self::Silent => "silent",
        }
    }
}

impl fmt::Display for ErrorMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ErrorMode {
    type Err = ChunkerError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "strict" => Ok(Self::Strict),
            "permissive" => Ok(Self::Permissive),
            "silent" => Ok(Self::Silent),
            other => Err(ChunkerError::config_invalid(format!(
                "unknown error handling mode '{other}'"
            ))
            .with_context("field", "error_handling")),
        }
    }
}

/// Accumulating error handler.
pub struct ErrorHandler {
    mode: ErrorMode,
    errors: RwLock<Vec<ChunkerError>>,
    sink: SharedSink,
}

impl fmt::Debug for ErrorHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ErrorHandler")
            .field("mode", &self.mode)
            .field("errors", &self.errors.read().len())
            .finish_non_exhaustive()
    }
}

impl ErrorHandler {
    /// Create a handler reporting to `sink`.
    pub fn new(mode: ErrorMode, sink: SharedSink) -> Self {
        Self {
            mode,
            errors: RwLock::new(Vec::new()),
            sink,
        }
    }

    /// Create a handler reporting to `tracing`.
    pub fn with_tracing(mode: ErrorMode) -> Self {
        Self::new(mode, TracingSink::shared())
    }

    /// Configured mode.
    pub const fn mode(&self) -> ErrorMode {
        self.mode
    }

    /// Record `error` and apply the mode policy.
    ///
    /// Returns the error back in strict mode and `Ok(())` otherwise.
    pub fn handle_error(&self, error: ChunkerError) -> Result<()> {
        self.errors.write().push(error.clone());
        self.sink.emit(&ChunkerEvent::ErrorRecorded {
            kind: error.kind(),
            severity: error.severity(),
            message: error.message().to_string(),
        });
        match self.mode {
            ErrorMode::Strict => Err(error),
            ErrorMode::Permissive | ErrorMode::Silent => Ok(()),
        }
    }

    /// Whether `StrategyFallback` notifications should be withheld.
    pub const fn suppresses_fallback_events(&self) -> bool {
        matches!(self.mode, ErrorMode::Silent)
    }

    /// Copy of the error log in recording order.
    pub fn errors(&self) -> Vec<ChunkerError> {
        self.errors.read().clone()
    }

    /// Errors recorded after the first `start` entries.
    pub fn errors_since(&self, start: usize) -> Vec<ChunkerError> {
        self.errors.read().get(start..).map_or_else(Vec::new, <[_]>::to_vec)
    }

    /// Errors of one kind, in recording order.
    pub fn errors_by_kind(&self, kind: ErrorKind) -> Vec<ChunkerError> {
        self.errors
            .read()
            .iter()
            .filter(|e| e.kind() == kind)
            .cloned()
            .collect()
    }

    /// Number of errors per kind.
    pub fn error_counts(&self) -> BTreeMap<ErrorKind, usize> {
        let mut counts = BTreeMap::new();
        for error in self.errors.read().iter() {
            *counts.entry(error.kind()).or_insert(0) += 1;
        }
        counts
    }

    /// Drop the error log.
    pub fn clear_errors(&self) {
        self.errors.write().clear();
    }

    /// Whether any error was recorded.
    pub fn has_errors(&self) -> bool {
        !self.errors.read().is_empty()
    }

    /// Number of recorded errors.
    pub fn error_count(&self) -> usize {
        self.errors.read().len()
    }

    /// Append errors recorded elsewhere, without applying the mode again.
    pub fn absorb(&self, errors: impl IntoIterator<Item = ChunkerError>) {
        self.errors.write().extend(errors);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::events::MemorySink;
    use std::sync::Arc;

    #[test]
    fn test_strict_returns_error_after_recording() {
        let handler = ErrorHandler::new(ErrorMode::Strict, Arc::new(MemorySink::new()));
        let result = handler.handle_error(ChunkerError::chunk_too_large("too big"));
        assert_eq!(result.unwrap_err().kind(), ErrorKind::ChunkTooLarge);
        assert_eq!(handler.error_count(), 1);
    }

    #[test]
    fn test_permissive_and_silent_swallow() {
        for mode in [ErrorMode::Permissive, ErrorMode::Silent] {
            let sink = Arc::new(MemorySink::new());
            let handler = ErrorHandler::new(mode, sink.clone());
            handler
                .handle_error(ChunkerError::invalid_input("bad bytes"))
                .unwrap();
            handler
                .handle_error(ChunkerError::chunk_too_large("too big"))
                .unwrap();

            assert!(handler.has_errors());
            assert_eq!(handler.errors_by_kind(ErrorKind::ChunkTooLarge).len(), 1);
            assert_eq!(sink.count("error_recorded"), 2);
            assert_eq!(handler.suppresses_fallback_events(), mode == ErrorMode::Silent);
        }
    }

    #[test]
    fn test_clear_and_absorb() {
        let batch = ErrorHandler::new(ErrorMode::Strict, Arc::new(MemorySink::new()));
        batch.absorb(vec![
            ChunkerError::parsing_failed("a"),
            ChunkerError::parsing_failed("b"),
        ]);
        assert_eq!(batch.error_count(), 2);
        assert_eq!(batch.error_counts()[&ErrorKind::ParsingFailed], 2);

        batch.clear_errors();
        assert!(!batch.has_errors());
    }

    #[test]
    fn test_mode_parsing() {
        assert_eq!("STRICT".parse::<ErrorMode>().unwrap(), ErrorMode::Strict);
        assert_eq!(" silent ".parse::<ErrorMode>().unwrap(), ErrorMode::Silent);
        assert_eq!(
            "loose".parse::<ErrorMode>().unwrap_err().kind(),
            ErrorKind::ConfigInvalid
        );
    }

    #[test]
    fn test_concurrent_recording_loses_nothing() {
        let handler = Arc::new(ErrorHandler::new(ErrorMode::Permissive, Arc::new(MemorySink::new())));
        let threads: Vec<_> = (0..8)
            .map(|_| {
                let handler = Arc::clone(&handler);
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        handler
                            .handle_error(ChunkerError::chunk_too_large("x"))
                            .unwrap();
                    }
                })
            })
            .collect();
        for thread in threads {
            thread.join().unwrap();
        }
        assert_eq!(handler.error_count(), 800);
    }
}
