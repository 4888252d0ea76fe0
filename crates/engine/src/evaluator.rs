//! Redirect evaluation: decides, per page view, whether the visitor is sent
//! to an alternate page.
//!
//! Global rules are checked first, in list order, against their absolute
//! expiry. Only if none fires are per-visitor rules checked, against a window
//! anchored at the visitor's first recorded visit. Any storage failure or
//! timeout yields `NoRedirect`.

use chrono::{DateTime, Utc};
use redirect_core::config::EvaluatorConfig;
use redirect_core::{Decision, PageId, PageResolver, VisitKey, VisitorIdentity};
use redirect_rules::RuleStore;
use redirect_visits::VisitTracker;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

pub struct RedirectEvaluator {
    rules: Arc<RuleStore>,
    visits: Arc<dyn VisitTracker>,
    pages: Arc<dyn PageResolver>,
    store_timeout: Duration,
}

impl RedirectEvaluator {
    pub fn new(
        rules: Arc<RuleStore>,
        visits: Arc<dyn VisitTracker>,
        pages: Arc<dyn PageResolver>,
        config: &EvaluatorConfig,
    ) -> Self {
        Self {
            rules,
            visits,
            pages,
            store_timeout: Duration::from_millis(config.store_timeout_ms),
        }
    }

    /// Decide for a page view by a known visitor.
    pub async fn evaluate(
        &self,
        now: DateTime<Utc>,
        requested: PageId,
        visitor: &VisitorIdentity,
    ) -> Decision {
        self.evaluate_with(now, requested, || visitor.clone()).await
    }

    /// Like [`evaluate`](Self::evaluate), but the visitor is only resolved
    /// once a per-visitor rule for `requested` actually needs it, so callers
    /// can defer minting an anonymous token.
    ///
    /// A visit-store error or timeout ends evaluation with `NoRedirect`;
    /// later per-visitor rules for the same page are not tried.
    pub async fn evaluate_with<F>(&self, now: DateTime<Utc>, requested: PageId, resolve_visitor: F) -> Decision
    where
        F: FnOnce() -> VisitorIdentity + Send,
    {
        let rules = self.rules.snapshot();

        // Global pass
        for (index, rule) in rules.global.iter().enumerate() {
            if rule.promoted_page != requested {
                continue;
            }
            debug!(
                index,
                page = %requested,
                start = %rule.start,
                expires_at = ?rule.expires_at(),
                now = %now,
                "Checking global rule"
            );
            if rule.is_expired(now) && self.target_is_live(rule.target_page) {
                info!(page = %requested, target = %rule.target_page, index, "Global redirect triggered");
                metrics::counter!("redirect.decisions", "outcome" => "global").increment(1);
                return Decision::RedirectTo(rule.target_page);
            }
        }

        // User pass
        if rules.user.is_empty() {
            metrics::counter!("redirect.decisions", "outcome" => "none").increment(1);
            return Decision::NoRedirect;
        }

        let mut resolve_visitor = Some(resolve_visitor);
        let mut visitor: Option<VisitorIdentity> = None;

        for (index, rule) in rules.user.iter().enumerate() {
            if rule.promoted_page != requested {
                continue;
            }
            if visitor.is_none() {
                visitor = resolve_visitor.take().map(|resolve| resolve());
            }
            let Some(visitor) = visitor.as_ref() else {
                break;
            };

            let key = VisitKey::new(visitor, rule.promoted_page);
            let first = match tokio::time::timeout(
                self.store_timeout,
                self.visits.record_first_visit_if_absent(&key, now),
            )
            .await
            {
                Ok(Ok(first)) => first,
                Ok(Err(e)) => return fail_open(&key, &e.to_string()),
                Err(_) => return fail_open(&key, "visit store timed out"),
            };

            if first.newly_recorded {
                info!(key = %key, at = %first.at, "First visit recorded");
                metrics::counter!("redirect.first_visits").increment(1);
                continue;
            }

            let expires_at = rule.expires_at(first.at);
            debug!(
                index,
                key = %key,
                first_visit = %first.at,
                validity_minutes = rule.validity_minutes,
                expires_at = ?expires_at,
                now = %now,
                "Checking user rule"
            );

            let expired = expires_at.is_some_and(|expiry| now >= expiry);
            if expired && self.target_is_live(rule.target_page) {
                info!(key = %key, target = %rule.target_page, index, "User redirect triggered");
                metrics::counter!("redirect.decisions", "outcome" => "user").increment(1);
                return Decision::RedirectTo(rule.target_page);
            }
        }

        metrics::counter!("redirect.decisions", "outcome" => "none").increment(1);
        Decision::NoRedirect
    }

    fn target_is_live(&self, target: PageId) -> bool {
        let live = self.pages.page_exists(target);
        if !live {
            debug!(target = %target, "Redirect target missing or unpublished, skipping rule");
        }
        live
    }
}

fn fail_open(key: &VisitKey, reason: &str) -> Decision {
    warn!(key = %key, reason, "Visit store unavailable, not redirecting");
    metrics::counter!("redirect.fail_open").increment(1);
    Decision::NoRedirect
}
