//! TTL-stamped values shared between the merge worker and probing callers.

use parking_lot::RwLock;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// An immutable value paired with the instant it was produced.
#[derive(Debug)]
pub struct Stamped<T> {
    pub value: T,
    pub taken_at: Instant,
}

impl<T> Stamped<T> {
    pub fn new(value: T) -> Self {
        Self {
            value,
            taken_at: Instant::now(),
        }
    }

    pub fn is_fresh(&self, ttl: Duration, now: Instant) -> bool {
        now.saturating_duration_since(self.taken_at) < ttl
    }
}

/// Single-slot cache. Readers get an `Arc` snapshot; a refresh swaps the whole
/// slot, so a snapshot never changes under a reader.
pub struct TtlCache<T> {
    slot: RwLock<Option<Arc<Stamped<T>>>>,
    ttl: Duration,
}

impl<T> TtlCache<T> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            slot: RwLock::new(None),
            ttl,
        }
    }

    /// Last stored value regardless of age.
    pub fn peek(&self) -> Option<Arc<Stamped<T>>> {
        self.slot.read().clone()
    }

    pub fn get_fresh(&self) -> Option<Arc<Stamped<T>>> {
        let now = Instant::now();
        self.peek().filter(|s| s.is_fresh(self.ttl, now))
    }

    /// Returns the cached value while fresh unless `force` is set; otherwise
    /// runs `refresh` without holding the lock and stores its result.
    pub fn get_or_refresh(&self, force: bool, refresh: impl FnOnce() -> T) -> Arc<Stamped<T>> {
        if !force {
            if let Some(hit) = self.get_fresh() {
                return hit;
            }
        }
        let fresh = Arc::new(Stamped::new(refresh()));
        *self.slot.write() = Some(Arc::clone(&fresh));
        fresh
    }
}
