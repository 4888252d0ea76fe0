//! First-visit bookkeeping contract.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redirect_core::{RedirectResult, VisitKey};

/// Canonical first visit for a key, and whether this call wrote it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FirstVisit {
    pub at: DateTime<Utc>,
    pub newly_recorded: bool,
}

/// Store of first-visit instants keyed by (visitor, page).
///
/// A record, once written, is never overwritten: concurrent first writes for
/// the same key must all observe the same instant.
#[async_trait]
pub trait VisitTracker: Send + Sync {
    /// Write `now` as the first visit unless a record exists, atomically.
    /// Returns the instant that is canonical after the call.
    async fn record_first_visit_if_absent(
        &self,
        key: &VisitKey,
        now: DateTime<Utc>,
    ) -> RedirectResult<FirstVisit>;

    async fn lookup(&self, key: &VisitKey) -> RedirectResult<Option<DateTime<Utc>>>;

    /// Drop every record. Returns how many were removed.
    async fn reset(&self) -> RedirectResult<usize>;

    fn backend(&self) -> &'static str;
}
