//! Structured pipeline events and the sinks that receive them.
//!
//! Components never log through an ambient logger. Each one is handed an
//! [`EventSink`] when it is built and reports facts to it; the sink decides
//! what to do with them. [`TracingSink`] forwards to `tracing`, which is the
//! default everywhere.

use crate::error::{ErrorKind, Severity};
use crate::types::ChunkType;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, trace, warn};

/// A fact emitted by the pipeline.
#[derive(Debug, Clone, PartialEq)]
pub enum ChunkerEvent {
    /// A document entered the pipeline.
    PipelineStarted {
        /// Input size in bytes.
        document_bytes: usize,
        /// Configured strategy.
        strategy: String,
    },
    /// A document left the pipeline, successfully or not.
    PipelineFinished {
        /// Chunks returned to the caller.
        chunks: usize,
        /// Errors recorded during this document.
        errors: usize,
        /// Wall time spent on the document.
        duration: Duration,
    },
    /// A chunk passed post-processing.
    ChunkEmitted {
        /// Chunk id before sanitization.
        id: i64,
        /// Chunk type.
        chunk_type: ChunkType,
        /// Content size in bytes.
        bytes: usize,
    },
    /// An error went through the error handler.
    ErrorRecorded {
        /// Error kind.
        kind: ErrorKind,
        /// Severity of the kind.
        severity: Severity,
        /// Error message.
        message: String,
    },
    /// A document's memory estimate reached the warning threshold.
    MemoryThresholdCrossed {
        /// Estimated bytes in use.
        used: u64,
        /// Configured limit.
        limit: u64,
    },
    /// The configured strategy failed and another one ran instead.
    StrategyFallback {
        /// Strategy that failed.
        from: String,
        /// Strategy used for this call.
        to: String,
        /// Failure message.
        reason: String,
    },
}

impl ChunkerEvent {
    /// Stable event name.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::PipelineStarted { .. } => "pipeline_started",
            Self::PipelineFinished { .. } => "pipeline_finished",
            Self::ChunkEmitted { .. } => "chunk_emitted",
            Self::ErrorRecorded { .. } => "error_recorded",
            Self::MemoryThresholdCrossed { .. } => "memory_threshold_crossed",
            Self::StrategyFallback { .. } => "strategy_fallback",
        }
    }
}

/// Receiver of pipeline events.
pub trait EventSink: Send + Sync {
    /// Handle one event.
    fn emit(&self, event: &ChunkerEvent);
}

/// Shared sink handle passed to components.
pub type SharedSink = Arc<dyn EventSink>;

/// Sink forwarding events to `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl TracingSink {
    /// Shared handle to a tracing sink.
    pub fn shared() -> SharedSink {
        Arc::new(Self)
    }
}

impl EventSink for TracingSink {
    fn emit(&self, event: &ChunkerEvent) {
        match event {
            ChunkerEvent::PipelineStarted {
                document_bytes,
                strategy,
            } => debug!(document_bytes, strategy = %strategy, "Pipeline started"),
            ChunkerEvent::PipelineFinished {
                chunks,
                errors,
                duration,
            } => info!(
                chunks,
                errors,
                duration_ms = duration.as_secs_f64() * 1000.0,
                "Pipeline finished"
            ),
            ChunkerEvent::ChunkEmitted {
                id,
                chunk_type,
                bytes,
            } => trace!(id, chunk_type = %chunk_type, bytes, "Chunk emitted"),
            ChunkerEvent::ErrorRecorded {
                kind,
                severity,
                message,
            } => warn!(kind = %kind, severity = %severity, "{message}"),
            ChunkerEvent::MemoryThresholdCrossed { used, limit } => {
                warn!(used, limit, "Memory usage above 80% of limit");
            },
            ChunkerEvent::StrategyFallback { from, to, reason } => {
                warn!(from = %from, to = %to, "Strategy fallback: {reason}");
            },
        }
    }
}

/// Sink that drops every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSink;

impl EventSink for NoopSink {
    fn emit(&self, _event: &ChunkerEvent) {}
}

/// Sink recording events in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    events: Mutex<Vec<ChunkerEvent>>,
}

impl MemorySink {
    /// Create an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of the recorded events.
    pub fn events(&self) -> Vec<ChunkerEvent> {
        self.events.lock().clone()
    }

    /// Number of recorded events named `name`.
    pub fn count(&self, name: &str) -> usize {
        self.events.lock().iter().filter(|e| e.name() == name).count()
    }

    /// Drop all recorded events.
    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

impl EventSink for MemorySink {
    fn emit(&self, event: &ChunkerEvent) {
        self.events.lock().push(event.clone());
    }
}
