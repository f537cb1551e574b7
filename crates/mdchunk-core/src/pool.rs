//! Object pools with scoped acquire/release.
//!
//! An [`ObjectPool`] keeps an explicit free list behind a mutex. `acquire`
//! pops a free object or builds a new one (a miss allocates, it never
//! waits), and the returned [`Pooled`] guard hands the object back on drop
//! after calling [`Poolable::reset`]. Nothing keeps a reference to an object
//! while it is checked out, and nothing touches it after it is returned.

use crate::error::Result;
use crate::types::Chunk;
use parking_lot::Mutex;
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::debug;

/// Objects that can be recycled through an [`ObjectPool`].
pub trait Poolable: Send + 'static {
    /// Clear per-use state before the object goes back to the free list.
    fn reset(&mut self);
}

impl Poolable for Vec<Chunk> {
    fn reset(&mut self) {
        self.clear();
    }
}

impl Poolable for String {
    fn reset(&mut self) {
        self.clear();
    }
}

type Factory<T> = Box<dyn Fn() -> Result<T> + Send + Sync>;

#[derive(Default)]
struct Counters {
    hits: AtomicUsize,
    misses: AtomicUsize,
    returns: AtomicUsize,
    discards: AtomicUsize,
}

struct Shared<T> {
    free: Mutex<Vec<T>>,
    factory: Factory<T>,
    max_retained: usize,
    counters: Counters,
}

impl<T: Poolable> Shared<T> {
    fn release(&self, mut value: T) {
        value.reset();
        let mut free = self.free.lock();
        if free.len() < self.max_retained {
            free.push(value);
            self.counters.returns.fetch_add(1, Ordering::Relaxed);
        } else {
            self.counters.discards.fetch_add(1, Ordering::Relaxed);
        }
    }
}

/// Pool of reusable `T` values.
pub struct ObjectPool<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for ObjectPool<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T> fmt::Debug for ObjectPool<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectPool")
            .field("available", &self.shared.free.lock().len())
            .field("max_retained", &self.shared.max_retained)
            .finish_non_exhaustive()
    }
}

impl<T: Poolable> ObjectPool<T> {
    /// Pool retaining at most `max_retained` idle objects built by `factory`.
    pub fn new<F>(max_retained: usize, factory: F) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        Self::fallible(max_retained, move || Ok(factory()))
    }

    /// Pool whose factory can fail.
    pub fn fallible<F>(max_retained: usize, factory: F) -> Self
    where
        F: Fn() -> Result<T> + Send + Sync + 'static,
    {
        Self {
            shared: Arc::new(Shared {
                free: Mutex::new(Vec::with_capacity(max_retained)),
                factory: Box::new(factory),
                max_retained,
                counters: Counters::default(),
            }),
        }
    }

    /// Check out an object, building one when the free list is empty.
    pub fn acquire(&self) -> Result<Pooled<T>> {
        let recycled = self.shared.free.lock().pop();
        let value = if let Some(value) = recycled {
            self.shared.counters.hits.fetch_add(1, Ordering::Relaxed);
            value
        } else {
            self.shared.counters.misses.fetch_add(1, Ordering::Relaxed);
            (self.shared.factory)()?
        };
        Ok(Pooled {
            value: Some(value),
            pool: Arc::clone(&self.shared),
        })
    }

    /// Drop idle objects down to half the retention limit.
    pub fn trim(&self) {
        let target = self.shared.max_retained / 2;
        let mut free = self.shared.free.lock();
        free.truncate(target);
        debug!(retained = free.len(), "Object pool trimmed");
    }

    /// Counter snapshot.
    pub fn stats(&self) -> PoolStats {
        let counters = &self.shared.counters;
        PoolStats {
            hits: counters.hits.load(Ordering::Relaxed),
            misses: counters.misses.load(Ordering::Relaxed),
            returns: counters.returns.load(Ordering::Relaxed),
            discards: counters.discards.load(Ordering::Relaxed),
            available: self.shared.free.lock().len(),
        }
    }
}

/// Exclusive handle to a pooled object; returns it to the pool on drop.
pub struct Pooled<T: Poolable> {
    value: Option<T>,
    pool: Arc<Shared<T>>,
}

impl<T: Poolable> Pooled<T> {
    /// Detach the object from the pool.
    pub fn into_inner(mut self) -> Option<T> {
        self.value.take()
    }
}

impl<T: Poolable> Deref for Pooled<T> {
    type Target = T;

    #[allow(clippy::expect_used)] // value is only taken by into_inner, which consumes self
    fn deref(&self) -> &T {
        self.value.as_ref().expect("pooled value present until drop")
    }
}

impl<T: Poolable> DerefMut for Pooled<T> {
    #[allow(clippy::expect_used)] // value is only taken by into_inner, which consumes self
    fn deref_mut(&mut self) -> &mut T {
        self.value.as_mut().expect("pooled value present until drop")
    }
}

impl<T: Poolable> Drop for Pooled<T> {
    fn drop(&mut self) {
        if let Some(value) = self.value.take() {
            self.pool.release(value);
        }
    }
}

impl<T: Poolable + fmt::Debug> fmt::Debug for Pooled<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Pooled").field(&self.value).finish()
    }
}

/// Pool counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PoolStats {
    /// Acquisitions served from the free list.
    pub hits: usize,
    /// Acquisitions that built a new object.
    pub misses: usize,
    /// Objects put back on the free list.
    pub returns: usize,
    /// Objects dropped because the free list was full.
    pub discards: usize,
    /// Idle objects currently retained.
    pub available: usize,
}

impl PoolStats {
    /// Share of acquisitions served from the free list.
    #[allow(clippy::cast_precision_loss)] // Precision loss is acceptable for pool metrics
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Pools shared by the strategies and the orchestrator of one chunker.
#[derive(Debug, Clone)]
pub struct PoolSet {
    chunk_buffers: ObjectPool<Vec<Chunk>>,
    string_buffers: ObjectPool<String>,
}

impl PoolSet {
    /// Pools retaining up to `max_retained` idle objects each.
    pub fn new(max_retained: usize) -> Self {
        Self {
            chunk_buffers: ObjectPool::new(max_retained, || Vec::with_capacity(32)),
            string_buffers: ObjectPool::new(max_retained, || String::with_capacity(256)),
        }
    }

    /// Scratch list of chunks.
    pub fn chunk_buffer(&self) -> Result<Pooled<Vec<Chunk>>> {
        self.chunk_buffers.acquire()
    }

    /// Scratch string builder.
    pub fn string_buffer(&self) -> Result<Pooled<String>> {
        self.string_buffers.acquire()
    }

    /// Halve the idle objects of both pools.
    pub fn trim(&self) {
        self.chunk_buffers.trim();
        self.string_buffers.trim();
    }

    /// Counters of the chunk list pool.
    pub fn chunk_stats(&self) -> PoolStats {
        self.chunk_buffers.stats()
    }

    /// Counters of the string builder pool.
    pub fn string_stats(&self) -> PoolStats {
        self.string_buffers.stats()
    }
}
