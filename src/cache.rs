//! Bounded idempotency cache
//!
//! Maps a command's `req_id` to the serialized result that was already
//! published for it, so that a controller retry is answered with the exact
//! same bytes instead of being re-executed. Entries are evicted in insertion
//! order (FIFO) once the capacity is reached, and the whole cache is cleared
//! at the `end` of a job run.

use bytes::Bytes;
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Default number of retained results, matching the controller's retry window
pub const DEFAULT_CAPACITY: usize = 100;

#[derive(Default)]
struct CacheInner {
    entries: HashMap<String, Bytes>,
    /// Keys in insertion order; front is the eviction candidate
    order: VecDeque<String>,
}

/// Concurrent `req_id` -> published-result store with FIFO eviction.
///
/// All operations take the internal lock for the duration of the map update
/// only; callers never hold it across a publish.
pub struct IdempotencyCache {
    capacity: usize,
    inner: Mutex<CacheInner>,
}

impl IdempotencyCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            inner: Mutex::new(CacheInner::default()),
        }
    }

    fn locked(&self) -> MutexGuard<'_, CacheInner> {
        // A panic while holding the lock leaves the map structurally intact
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Look up the previously published result for `key`
    pub fn lookup(&self, key: &str) -> Option<Bytes> {
        self.locked().entries.get(key).cloned()
    }

    /// Store a published result, evicting the oldest entry at capacity.
    ///
    /// Re-inserting an existing key replaces the value without changing its
    /// position in the eviction order.
    pub fn insert(&self, key: String, result: Bytes) {
        let mut inner = self.locked();

        if inner.entries.insert(key.clone(), result).is_none() {
            inner.order.push_back(key);
            while inner.order.len() > self.capacity {
                if let Some(oldest) = inner.order.pop_front() {
                    inner.entries.remove(&oldest);
                }
            }
        }
    }

    /// Drop every entry (job boundary)
    pub fn clear(&self) {
        let mut inner = self.locked();
        inner.entries.clear();
        inner.order.clear();
    }

    pub fn len(&self) -> usize {
        self.locked().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for IdempotencyCache {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}
