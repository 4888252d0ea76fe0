//! Redis-backed visit store for multi-node deployments.
//! Two-tier: VisitCache (L1) -> Redis (L2).
//!
//! First-visit records are immutable once written, so the only way an L1 hit
//! goes stale is a reset. `reset` clears this node's L1 directly; other nodes
//! sharing the same Redis drop their entries once the L1 TTL has passed.

use crate::cache::VisitCache;
use crate::tracker::{FirstVisit, VisitTracker};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redirect_core::config::RedisConfig;
use redirect_core::{RedirectError, RedirectResult, VisitKey};
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tracing::{debug, info};

/// Redis-backed first-visit store with a bounded local L1 layer.
pub struct RedisVisitStore {
    conn: ConnectionManager,
    local: Arc<VisitCache>,
    key_prefix: String,
}

impl RedisVisitStore {
    /// Connect to Redis, verify connectivity and start L1 eviction.
    pub async fn new(config: &RedisConfig) -> anyhow::Result<Self> {
        info!(url = %config.url, "Connecting to Redis");

        let client = redis::Client::open(config.url.as_str())?;
        let connect = ConnectionManager::new(client);
        let mut conn = tokio::time::timeout(Duration::from_millis(config.connect_timeout_ms), connect)
            .await
            .map_err(|_| anyhow::anyhow!("timed out connecting to Redis at {}", config.url))??;

        let pong: String = redis::cmd("PING").query_async(&mut conn).await?;
        info!(response = %pong, "Redis connection established");

        let local = Arc::new(VisitCache::new(
            Duration::from_secs(config.l1_ttl_secs),
            config.l1_max_entries,
        ));
        spawn_eviction(Arc::downgrade(&local));

        Ok(Self {
            conn,
            local,
            key_prefix: config.key_prefix.clone(),
        })
    }
}

/// Periodically purge expired L1 entries until the store is dropped.
fn spawn_eviction(cache: Weak<VisitCache>) {
    tokio::spawn(async move {
        let period = match cache.upgrade() {
            Some(cache) => cache.ttl().max(Duration::from_secs(1)),
            None => return,
        };
        let mut ticker = tokio::time::interval(period);
        loop {
            ticker.tick().await;
            let Some(cache) = cache.upgrade() else {
                break;
            };
            let evicted = cache.evict_expired();
            if evicted > 0 {
                debug!(evicted, remaining = cache.len(), "Evicted expired L1 visit entries");
            }
        }
    });
}

/// Redis key of a first-visit record.
fn redis_key(prefix: &str, key: &VisitKey) -> String {
    format!("{prefix}:{key}")
}

fn decode_millis(millis: i64) -> RedirectResult<DateTime<Utc>> {
    DateTime::from_timestamp_millis(millis)
        .ok_or_else(|| RedirectError::storage(format!("stored visit timestamp {millis} out of range")))
}

/// Canonical first visit after a `SETNX`. The writer owns `now`; a loser must
/// read back the winner's instant.
fn canonical_instant(
    redis_key: &str,
    written: bool,
    now: DateTime<Utc>,
    stored: Option<i64>,
) -> RedirectResult<DateTime<Utc>> {
    if written {
        return Ok(now);
    }
    match stored {
        Some(millis) => decode_millis(millis),
        None => Err(RedirectError::storage(format!(
            "visit record {redis_key} vanished between write and read"
        ))),
    }
}

#[async_trait]
impl VisitTracker for RedisVisitStore {
    async fn record_first_visit_if_absent(
        &self,
        key: &VisitKey,
        now: DateTime<Utc>,
    ) -> RedirectResult<FirstVisit> {
        // L1 check
        if let Some(at) = self.local.get(key) {
            metrics::counter!("visits.l1.hit").increment(1);
            return Ok(FirstVisit {
                at,
                newly_recorded: false,
            });
        }
        metrics::counter!("visits.l1.miss").increment(1);

        // L2 conditional write: SETNX is the atomic check-then-set.
        let mut conn = self.conn.clone();
        let redis_key = redis_key(&self.key_prefix, key);
        let written: bool = conn
            .set_nx(&redis_key, now.timestamp_millis())
            .await
            .map_err(RedirectError::storage)?;

        let stored: Option<i64> = if written {
            None
        } else {
            conn.get(&redis_key).await.map_err(RedirectError::storage)?
        };
        let canonical = canonical_instant(&redis_key, written, now, stored)?;

        self.local.put(key, canonical);
        debug!(key = %key, written, "Visit record resolved from Redis");
        Ok(FirstVisit {
            at: canonical,
            newly_recorded: written,
        })
    }

    async fn lookup(&self, key: &VisitKey) -> RedirectResult<Option<DateTime<Utc>>> {
        if let Some(at) = self.local.get(key) {
            return Ok(Some(at));
        }
        let mut conn = self.conn.clone();
        let stored: Option<i64> = conn
            .get(redis_key(&self.key_prefix, key))
            .await
            .map_err(RedirectError::storage)?;
        match stored {
            Some(millis) => {
                let at = decode_millis(millis)?;
                self.local.put(key, at);
                Ok(Some(at))
            }
            None => Ok(None),
        }
    }

    async fn reset(&self) -> RedirectResult<usize> {
        let mut conn = self.conn.clone();
        let pattern = format!("{}:*", self.key_prefix);

        let mut keys: Vec<String> = Vec::new();
        {
            let mut iter = conn
                .scan_match::<_, String>(&pattern)
                .await
                .map_err(RedirectError::storage)?;
            while let Some(key) = iter.next_item().await {
                keys.push(key);
            }
        }

        let mut removed = 0usize;
        for chunk in keys.chunks(500) {
            let deleted: usize = conn.del(chunk.to_vec()).await.map_err(RedirectError::storage)?;
            removed += deleted;
        }
        self.local.clear();

        info!(removed, "Redis visit records cleared");
        Ok(removed)
    }

    fn backend(&self) -> &'static str {
        "redis"
    }
}
