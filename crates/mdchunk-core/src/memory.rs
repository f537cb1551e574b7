//! Per-document memory budget.
//!
//! The guard keeps a running estimate of the bytes a document occupies (its
//! source plus everything produced from it). Strategies call
//! [`MemoryGuard::tick`] once per visited node; every [`CHECK_INTERVAL`]
//! ticks the estimate is compared against the limit. Crossing 80 % of the
//! limit is reported once, exceeding it fails with `MemoryExhausted`.

use crate::error::{ChunkerError, Result};
use crate::events::{ChunkerEvent, NoopSink, SharedSink};
use std::fmt;
use std::sync::Arc;

/// Number of ticks between two limit checks.
pub const CHECK_INTERVAL: u64 = 100;

/// Memory estimate with a soft warning and a hard limit.
pub struct MemoryGuard {
    limit: u64,
    used: u64,
    ticks: u64,
    warned: bool,
    sink: SharedSink,
}

impl fmt::Debug for MemoryGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryGuard")
            .field("limit", &self.limit)
            .field("used", &self.used)
            .field("ticks", &self.ticks)
            .field("warned", &self.warned)
            .finish_non_exhaustive()
    }
}

impl MemoryGuard {
    /// Guard with `limit` bytes; 0 disables the limit.
    pub fn new(limit: u64, sink: SharedSink) -> Self {
        Self {
            limit,
            used: 0,
            ticks: 0,
            warned: false,
            sink,
        }
    }

    /// Guard without a limit.
    pub fn unbounded() -> Self {
        Self::new(0, Arc::new(NoopSink))
    }

    /// Configured limit in bytes, 0 when unbounded.
    pub const fn limit(&self) -> u64 {
        self.limit
    }

    /// Current estimate in bytes.
    pub const fn used(&self) -> u64 {
        self.used
    }

    /// Add `bytes` to the estimate.
    pub fn reserve(&mut self, bytes: usize) {
        self.used = self
            .used
            .saturating_add(u64::try_from(bytes).unwrap_or(u64::MAX));
    }

    /// Count one unit of work; checks the limit every [`CHECK_INTERVAL`] ticks.
    pub fn tick(&mut self) -> Result<()> {
        self.ticks += 1;
        if self.ticks % CHECK_INTERVAL == 0 {
            self.check()
        } else {
            Ok(())
        }
    }

    /// Compare the estimate against the limit now.
    pub fn check(&mut self) -> Result<()> {
        if self.limit == 0 {
            return Ok(());
        }
        if self.used > self.limit {
            return Err(ChunkerError::memory_exhausted(format!(
                "document needs an estimated {} bytes, limit is {}",
                self.used, self.limit
            ))
            .with_context("used", self.used)
            .with_context("limit", self.limit));
        }
        if !self.warned && self.used.saturating_mul(5) >= self.limit.saturating_mul(4) {
            self.warned = true;
            self.sink.emit(&ChunkerEvent::MemoryThresholdCrossed {
                used: self.used,
                limit: self.limit,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::events::MemorySink;

    #[test]
    fn test_unbounded_never_fails() {
        let mut guard = MemoryGuard::unbounded();
        guard.reserve(usize::MAX);
        for _ in 0..1_000 {
            guard.tick().unwrap();
        }
        assert_eq!(guard.limit(), 0);
    }

    #[test]
    fn test_check_runs_every_interval() {
        let mut guard = MemoryGuard::new(10, Arc::new(NoopSink));
        guard.reserve(11);
        for _ in 1..CHECK_INTERVAL {
            guard.tick().unwrap();
        }
        let err = guard.tick().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MemoryExhausted);
        assert_eq!(err.context()["limit"], "10");
    }

    #[test]
    fn test_threshold_event_emitted_once() {
        let sink = Arc::new(MemorySink::new());
        let mut guard = MemoryGuard::new(100, sink.clone());
        guard.reserve(79);
        guard.check().unwrap();
        assert_eq!(sink.count("memory_threshold_crossed"), 0);

        guard.reserve(1);
        guard.check().unwrap();
        guard.check().unwrap();
        assert_eq!(sink.count("memory_threshold_crossed"), 1);
        assert_eq!(guard.used(), 80);
    }
}
