//! Bounded in-process cache of first-visit instants, used as the L1 in front
//! of Redis. Entries expire after a short TTL so a reset issued on another
//! node is picked up here once the TTL has passed.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use redirect_core::VisitKey;
use std::time::{Duration, Instant};

struct CachedVisit {
    at: DateTime<Utc>,
    inserted_at: Instant,
}

pub struct VisitCache {
    store: DashMap<VisitKey, CachedVisit>,
    ttl: Duration,
    max_entries: usize,
}

impl VisitCache {
    pub fn new(ttl: Duration, max_entries: usize) -> Self {
        Self {
            store: DashMap::new(),
            ttl,
            max_entries,
        }
    }

    /// Cached first visit, or `None` if missing or expired.
    pub fn get(&self, key: &VisitKey) -> Option<DateTime<Utc>> {
        let entry = self.store.get(key)?;
        if entry.inserted_at.elapsed() > self.ttl {
            drop(entry);
            self.store.remove(key);
            return None;
        }
        Some(entry.at)
    }

    /// Cache a first visit. When full, new keys are skipped until the next
    /// eviction pass makes room.
    pub fn put(&self, key: &VisitKey, at: DateTime<Utc>) {
        if self.store.len() >= self.max_entries && !self.store.contains_key(key) {
            metrics::counter!("visits.l1.full").increment(1);
            return;
        }
        self.store.insert(
            key.clone(),
            CachedVisit {
                at,
                inserted_at: Instant::now(),
            },
        );
    }

    /// Remove expired entries. Called periodically from a background task.
    pub fn evict_expired(&self) -> usize {
        let before = self.store.len();
        self.store
            .retain(|_, entry| entry.inserted_at.elapsed() <= self.ttl);
        before.saturating_sub(self.store.len())
    }

    pub fn clear(&self) {
        self.store.clear();
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }
}
