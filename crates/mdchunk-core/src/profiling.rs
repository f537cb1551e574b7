//! Throughput, timing and memory accounting.

#![allow(clippy::cast_precision_loss)] // Performance metrics inherently lose precision when converting to f64
#![allow(clippy::cast_possible_wrap)] // Wrapping is acceptable for memory delta calculations

use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, System};
use tracing::{Level, debug, span};

/// Shared pipeline counters.
///
/// Clones share the same counters, so one accounting value can be handed
/// to every worker of a batch.
#[derive(Debug, Clone, Default)]
pub struct PerformanceAccounting {
    documents_processed: Arc<AtomicU64>,
    documents_failed: Arc<AtomicU64>,
    total_chunks: Arc<AtomicU64>,
    total_bytes: Arc<AtomicU64>,
    chunk_bytes: Arc<AtomicU64>,
    processing_micros: Arc<AtomicU64>,
    memory_used: Arc<AtomicU64>,
    peak_memory: Arc<AtomicU64>,
    errors: Arc<AtomicU64>,
}

fn saturating_u64(value: usize) -> u64 {
    u64::try_from(value).unwrap_or(u64::MAX)
}

#[allow(clippy::cast_possible_truncation)] // Saturating at u64::MAX is acceptable for timing metrics
fn micros(duration: Duration) -> u64 {
    duration.as_micros().min(u128::from(u64::MAX)) as u64
}

impl PerformanceAccounting {
    /// Fresh counters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a successfully processed document.
    pub fn record_document(
        &self,
        duration: Duration,
        input_bytes: usize,
        chunks: usize,
        chunk_bytes: usize,
    ) {
        self.documents_processed.fetch_add(1, Ordering::Relaxed);
        self.processing_micros
            .fetch_add(micros(duration), Ordering::Relaxed);
        self.total_bytes
            .fetch_add(saturating_u64(input_bytes), Ordering::Relaxed);
        self.total_chunks
            .fetch_add(saturating_u64(chunks), Ordering::Relaxed);
        self.chunk_bytes
            .fetch_add(saturating_u64(chunk_bytes), Ordering::Relaxed);
    }

    /// Record a document that ended with an error.
    pub fn record_failure(&self, duration: Duration) {
        self.documents_failed.fetch_add(1, Ordering::Relaxed);
        self.processing_micros
            .fetch_add(micros(duration), Ordering::Relaxed);
    }

    /// Record one handled error.
    pub fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Set the current memory figure and raise the peak if needed.
    pub fn update_memory(&self, current: u64) {
        self.memory_used.store(current, Ordering::Relaxed);
        let mut peak = self.peak_memory.load(Ordering::Relaxed);
        while current > peak {
            match self.peak_memory.compare_exchange_weak(
                peak,
                current,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(x) => peak = x,
            }
        }
    }

    /// Reset every counter to zero.
    pub fn reset(&self) {
        for counter in [
            &self.documents_processed,
            &self.documents_failed,
            &self.total_chunks,
            &self.total_bytes,
            &self.chunk_bytes,
            &self.processing_micros,
            &self.memory_used,
            &self.peak_memory,
            &self.errors,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }

    /// Derived statistics at this instant.
    pub fn snapshot(&self) -> PerformanceStats {
        let processing_micros = self.processing_micros.load(Ordering::Relaxed);
        let total_chunks = self.total_chunks.load(Ordering::Relaxed);
        let total_bytes = self.total_bytes.load(Ordering::Relaxed);
        let seconds = processing_micros as f64 / 1_000_000.0;
        let rate = |count: u64| {
            if seconds == 0.0 {
                0.0
            } else {
                count as f64 / seconds
            }
        };
        PerformanceStats {
            processing_time: Duration::from_micros(processing_micros),
            memory_used: self.memory_used.load(Ordering::Relaxed),
            peak_memory: self.peak_memory.load(Ordering::Relaxed),
            chunks_per_second: rate(total_chunks),
            bytes_per_second: rate(total_bytes),
            total_chunks,
            total_bytes,
            chunk_bytes: self.chunk_bytes.load(Ordering::Relaxed),
            documents_processed: self.documents_processed.load(Ordering::Relaxed),
            documents_failed: self.documents_failed.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time view of [`PerformanceAccounting`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PerformanceStats {
    /// Summed document processing time.
    pub processing_time: Duration,
    /// Most recent memory figure in bytes.
    pub memory_used: u64,
    /// Highest memory figure seen in bytes.
    pub peak_memory: u64,
    /// Chunks per second of processing time.
    pub chunks_per_second: f64,
    /// Input bytes per second of processing time.
    pub bytes_per_second: f64,
    /// Chunks produced.
    pub total_chunks: u64,
    /// Input bytes processed.
    pub total_bytes: u64,
    /// Content bytes of the produced chunks.
    pub chunk_bytes: u64,
    /// Documents that finished without error.
    pub documents_processed: u64,
    /// Documents that returned an error.
    pub documents_failed: u64,
    /// Errors handled.
    pub errors: u64,
}

/// Timer for measuring operation duration with optional accounting.
pub struct OperationTimer {
    start: Instant,
    operation: &'static str,
    accounting: Option<PerformanceAccounting>,
}

impl OperationTimer {
    /// Start timing `operation`.
    pub fn new(operation: &'static str) -> Self {
        debug!("Starting operation: {}", operation);
        Self {
            start: Instant::now(),
            operation,
            accounting: None,
        }
    }

    /// Start timing `operation`, recording the result into `accounting`.
    pub fn with_accounting(operation: &'static str, accounting: PerformanceAccounting) -> Self {
        debug!("Starting operation with accounting: {}", operation);
        Self {
            start: Instant::now(),
            operation,
            accounting: Some(accounting),
        }
    }

    /// Time elapsed so far.
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Stop the timer.
    pub fn finish(self) -> Duration {
        let duration = self.start.elapsed();
        debug!("Completed {}: {}ms", self.operation, duration.as_millis());
        duration
    }

    /// Stop the timer and record a processed document.
    pub fn finish_document(self, input_bytes: usize, chunks: usize, chunk_bytes: usize) -> Duration {
        let duration = self.start.elapsed();
        debug!(
            "Completed {}: {}ms ({} bytes, {} chunks)",
            self.operation,
            duration.as_millis(),
            input_bytes,
            chunks
        );
        if let Some(accounting) = &self.accounting {
            accounting.record_document(duration, input_bytes, chunks, chunk_bytes);
        }
        duration
    }

    /// Stop the timer and record a failed document.
    pub fn finish_failed(self) -> Duration {
        let duration = self.start.elapsed();
        debug!("Failed {}: {}ms", self.operation, duration.as_millis());
        if let Some(accounting) = &self.accounting {
            accounting.record_failure(duration);
        }
        duration
    }
}

/// Per-stage timing breakdown.
#[derive(Debug, Clone, Default)]
pub struct ComponentTimings {
    timings: HashMap<&'static str, Duration>,
}

impl ComponentTimings {
    /// Empty breakdown.
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `operation`, adding its duration to `component`.
    pub fn time<T, F>(&mut self, component: &'static str, operation: F) -> T
    where
        F: FnOnce() -> T,
    {
        let _span = span!(Level::DEBUG, "component_timing", component = component).entered();
        let start = Instant::now();
        let result = operation();
        let duration = start.elapsed();

        *self.timings.entry(component).or_default() += duration;

        debug!("Component {}: {}us", component, duration.as_micros());
        result
    }

    /// Accumulated time of `component`.
    pub fn get_timing(&self, component: &str) -> Option<Duration> {
        self.timings.get(component).copied()
    }

    /// Sum over all components.
    pub fn total_time(&self) -> Duration {
        self.timings.values().sum()
    }

    /// Components sorted by descending time, with their share of the total.
    pub fn breakdown(&self) -> Vec<(&'static str, Duration, f64)> {
        let total = self.total_time().as_micros();
        let mut sorted: Vec<_> = self
            .timings
            .iter()
            .map(|(component, duration)| {
                let share = if total > 0 {
                    (duration.as_micros() as f64 / total as f64) * 100.0
                } else {
                    0.0
                };
                (*component, *duration, share)
            })
            .collect();
        sorted.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(b.0)));
        sorted
    }

    /// Forget all timings.
    pub fn clear(&mut self) {
        self.timings.clear();
    }
}

/// Process memory monitor.
pub struct ResourceMonitor {
    system: System,
    pid: Pid,
    initial_memory: u64,
}

impl Default for ResourceMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl ResourceMonitor {
    /// Start monitoring the current process.
    pub fn new() -> Self {
        let mut monitor = Self {
            system: System::new(),
            pid: Pid::from(std::process::id() as usize),
            initial_memory: 0,
        };
        monitor.initial_memory = monitor.current_memory_bytes();
        monitor
    }

    fn refresh(&mut self) {
        self.system.refresh_processes_specifics(
            ProcessesToUpdate::Some(&[self.pid]),
            false,
            ProcessRefreshKind::new().with_memory(),
        );
    }

    /// Resident memory of the process in bytes.
    pub fn current_memory_bytes(&mut self) -> u64 {
        self.refresh();
        self.system
            .process(self.pid)
            .map_or(0, sysinfo::Process::memory)
    }

    /// Change in resident memory since the monitor was created.
    pub fn memory_delta_bytes(&mut self) -> i64 {
        let current = self.current_memory_bytes();
        current as i64 - self.initial_memory as i64
    }
}

/// Format bytes in human-readable format.
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    let mut unit_index = 0;

    while size >= 1024.0 && unit_index < UNITS.len() - 1 {
        size /= 1024.0;
        unit_index += 1;
    }

    if unit_index == 0 {
        format!("{} {}", bytes, UNITS[unit_index])
    } else {
        format!("{:.1} {}", size, UNITS[unit_index])
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_snapshot_rates() {
        let accounting = PerformanceAccounting::new();
        accounting.record_document(Duration::from_millis(500), 1_000, 10, 800);
        accounting.record_document(Duration::from_millis(500), 1_000, 10, 800);
        accounting.record_failure(Duration::ZERO);

        let stats = accounting.snapshot();
        assert_eq!(stats.documents_processed, 2);
        assert_eq!(stats.documents_failed, 1);
        assert_eq!(stats.total_chunks, 20);
        assert_eq!(stats.chunk_bytes, 1_600);
        assert!((stats.chunks_per_second - 20.0).abs() < 1e-9);
        assert!((stats.bytes_per_second - 2_000.0).abs() < 1e-9);
    }

    #[test]
    fn test_empty_snapshot_has_zero_rates() {
        let stats = PerformanceAccounting::new().snapshot();
        assert!(stats.chunks_per_second.abs() < f64::EPSILON);
        assert_eq!(stats.processing_time, Duration::ZERO);
    }

    #[test]
    fn test_peak_memory_only_rises() {
        let accounting = PerformanceAccounting::new();
        accounting.update_memory(300);
        accounting.update_memory(100);
        let stats = accounting.snapshot();
        assert_eq!(stats.memory_used, 100);
        assert_eq!(stats.peak_memory, 300);
    }

    #[test]
    fn test_concurrent_increments_are_exact() {
        let accounting = PerformanceAccounting::new();
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let accounting = accounting.clone();
                thread::spawn(move || {
                    for j in 0..1_000_u64 {
                        accounting.record_document(Duration::from_micros(1), 3, 2, 1);
                        accounting.record_error();
                        accounting.update_memory(i * 1_000 + j);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        let stats = accounting.snapshot();
        assert_eq!(stats.documents_processed, 8_000);
        assert_eq!(stats.total_chunks, 16_000);
        assert_eq!(stats.total_bytes, 24_000);
        assert_eq!(stats.errors, 8_000);
        assert_eq!(stats.processing_time, Duration::from_micros(8_000));
        assert_eq!(stats.peak_memory, 7_999);
    }

    #[test]
    fn test_operation_timer_records() {
        let accounting = PerformanceAccounting::new();
        let timer = OperationTimer::with_accounting("chunk_document", accounting.clone());
        thread::sleep(Duration::from_millis(1));
        let duration = timer.finish_document(42, 3, 30);
        assert!(duration >= Duration::from_millis(1));
        assert_eq!(accounting.snapshot().total_bytes, 42);
        assert!(OperationTimer::new("noop").finish() < Duration::from_secs(5));
    }

    #[test]
    fn test_component_timings() {
        let mut timings = ComponentTimings::new();
        let parsed = timings.time("parse", || {
            thread::sleep(Duration::from_millis(2));
            "parsed"
        });
        timings.time("strategy", || thread::sleep(Duration::from_millis(1)));
        timings.time("parse", || ());

        assert_eq!(parsed, "parsed");
        assert!(timings.get_timing("parse").unwrap() >= Duration::from_millis(2));
        assert!(timings.total_time() >= Duration::from_millis(3));
        assert_eq!(timings.breakdown()[0].0, "parse");
        assert!(timings.get_timing("sanitize").is_none());
    }

    #[test]
    fn test_resource_monitor() {
        let mut monitor = ResourceMonitor::new();
        assert!(monitor.current_memory_bytes() > 0, "Should report some memory usage");
        let _delta = monitor.memory_delta_bytes();
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(500), "500 B");
        assert_eq!(format_bytes(1536), "1.5 KB");
        assert_eq!(format_bytes(1_048_576), "1.0 MB");
    }
}
