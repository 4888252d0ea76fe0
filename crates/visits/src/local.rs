//! In-process visit store backed by DashMap.
//! Used in single-node deployments, where it is the only copy of each record.

use crate::tracker::{FirstVisit, VisitTracker};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use redirect_core::{RedirectResult, VisitKey};

/// Lock-free local store of first visits.
pub struct LocalVisitStore {
    store: DashMap<VisitKey, DateTime<Utc>>,
}

impl LocalVisitStore {
    pub fn new() -> Self {
        Self {
            store: DashMap::new(),
        }
    }

    /// First-write-wins insert. The shard lock held by `entry` serializes
    /// concurrent callers for the same key.
    pub fn insert_if_absent(&self, key: &VisitKey, now: DateTime<Utc>) -> FirstVisit {
        match self.store.entry(key.clone()) {
            Entry::Occupied(existing) => FirstVisit {
                at: *existing.get(),
                newly_recorded: false,
            },
            Entry::Vacant(slot) => {
                slot.insert(now);
                FirstVisit {
                    at: now,
                    newly_recorded: true,
                }
            }
        }
    }

    pub fn get(&self, key: &VisitKey) -> Option<DateTime<Utc>> {
        self.store.get(key).map(|r| *r.value())
    }

    pub fn clear(&self) -> usize {
        let before = self.store.len();
        self.store.clear();
        before
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }
}

impl Default for LocalVisitStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl VisitTracker for LocalVisitStore {
    async fn record_first_visit_if_absent(
        &self,
        key: &VisitKey,
        now: DateTime<Utc>,
    ) -> RedirectResult<FirstVisit> {
        Ok(self.insert_if_absent(key, now))
    }

    async fn lookup(&self, key: &VisitKey) -> RedirectResult<Option<DateTime<Utc>>> {
        Ok(self.get(key))
    }

    async fn reset(&self) -> RedirectResult<usize> {
        let removed = self.clear();
        tracing::info!(removed, "local visit records cleared");
        Ok(removed)
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}
