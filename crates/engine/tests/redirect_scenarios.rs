//! End-to-end evaluation scenarios against the in-memory stores.

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use redirect_core::config::EvaluatorConfig;
use redirect_core::{
    Decision, GlobalRule, Page, PageDirectory, PageId, PageStatus, RedirectError, RedirectResult,
    UserRule, VisitKey, VisitorIdentity,
};
use redirect_engine::RedirectEvaluator;
use redirect_rules::RuleStore;
use redirect_visits::{FirstVisit, LocalVisitStore, VisitTracker};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use url::Url;

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 11, 28, 0, 0, 0).unwrap()
}

fn directory(ids: &[u64]) -> Arc<PageDirectory> {
    let dir = PageDirectory::new();
    for &id in ids {
        dir.upsert(Page {
            id: PageId(id),
            title: format!("Page {id}"),
            permalink: Url::parse(&format!("https://shop.example.com/p/{id}")).unwrap(),
            status: PageStatus::Published,
        });
    }
    Arc::new(dir)
}

fn global_rule(promoted: u64, minutes: u32, target: u64) -> GlobalRule {
    GlobalRule {
        promoted_page: PageId(promoted),
        start: t0(),
        duration_minutes: minutes,
        target_page: PageId(target),
    }
}

fn user_rule(promoted: u64, minutes: u32, target: u64) -> UserRule {
    UserRule {
        promoted_page: PageId(promoted),
        validity_minutes: minutes,
        target_page: PageId(target),
    }
}

struct Harness {
    evaluator: Arc<RedirectEvaluator>,
    visits: Arc<LocalVisitStore>,
    pages: Arc<PageDirectory>,
}

fn harness(global: Vec<GlobalRule>, user: Vec<UserRule>) -> Harness {
    let pages = directory(&[5, 9, 12]);
    let rules = Arc::new(RuleStore::in_memory(pages.clone()));
    rules.replace_all(global, user).unwrap();
    let visits = Arc::new(LocalVisitStore::new());
    let evaluator = Arc::new(RedirectEvaluator::new(
        rules,
        visits.clone(),
        pages.clone(),
        &EvaluatorConfig::default(),
    ));
    Harness {
        evaluator,
        visits,
        pages,
    }
}

fn anon(token: &str) -> VisitorIdentity {
    VisitorIdentity::Anonymous(token.to_string())
}

#[tokio::test]
async fn global_rule_redirects_exactly_at_expiry() {
    let h = harness(vec![global_rule(5, 10, 9)], vec![]);
    let visitor = anon("anon_any");

    let before = t0() + Duration::minutes(9) + Duration::seconds(59);
    assert_eq!(h.evaluator.evaluate(before, PageId(5), &visitor).await, Decision::NoRedirect);

    let at = t0() + Duration::minutes(10);
    assert_eq!(
        h.evaluator.evaluate(at, PageId(5), &visitor).await,
        Decision::RedirectTo(PageId(9))
    );

    let later = t0() + Duration::days(3);
    assert_eq!(
        h.evaluator.evaluate(later, PageId(5), &VisitorIdentity::Authenticated(7)).await,
        Decision::RedirectTo(PageId(9))
    );
}

#[tokio::test]
async fn global_rule_before_start_never_redirects() {
    let h = harness(vec![global_rule(5, 1, 9)], vec![]);
    let visitor = anon("anon_early");
    for minutes_before in [1, 60, 60 * 24] {
        let now = t0() - Duration::minutes(minutes_before);
        assert_eq!(h.evaluator.evaluate(now, PageId(5), &visitor).await, Decision::NoRedirect);
    }
}

#[tokio::test]
async fn unrelated_page_is_not_redirected() {
    let h = harness(vec![global_rule(5, 10, 9)], vec![user_rule(5, 1, 9)]);
    let now = t0() + Duration::days(1);
    assert_eq!(
        h.evaluator.evaluate(now, PageId(12), &anon("anon_v")).await,
        Decision::NoRedirect
    );
    assert!(h.visits.is_empty());
}

#[tokio::test]
async fn user_rule_window_starts_at_first_visit() {
    let h = harness(vec![], vec![user_rule(5, 30, 9)]);
    let v1 = anon("anon_v1");
    let v2 = anon("anon_v2");
    let t = t0() + Duration::hours(2);

    assert_eq!(h.evaluator.evaluate(t, PageId(5), &v1).await, Decision::NoRedirect);
    assert_eq!(
        h.visits.get(&VisitKey::new(&v1, PageId(5))),
        Some(t),
        "first visit should be recorded"
    );

    assert_eq!(
        h.evaluator.evaluate(t + Duration::minutes(29), PageId(5), &v1).await,
        Decision::NoRedirect
    );
    assert_eq!(
        h.evaluator.evaluate(t + Duration::minutes(30), PageId(5), &v1).await,
        Decision::RedirectTo(PageId(9))
    );

    // v2 has its own window, opened by this visit.
    assert_eq!(
        h.evaluator.evaluate(t + Duration::minutes(30), PageId(5), &v2).await,
        Decision::NoRedirect
    );
}

#[tokio::test]
async fn revisits_never_move_the_first_visit() {
    let h = harness(vec![], vec![user_rule(5, 60, 9)]);
    let visitor = anon("anon_repeat");
    let key = VisitKey::new(&visitor, PageId(5));

    for minute in 0..45 {
        let now = t0() + Duration::minutes(minute);
        assert_eq!(h.evaluator.evaluate(now, PageId(5), &visitor).await, Decision::NoRedirect);
        assert_eq!(h.visits.get(&key), Some(t0()));
    }
    assert_eq!(
        h.evaluator.evaluate(t0() + Duration::minutes(60), PageId(5), &visitor).await,
        Decision::RedirectTo(PageId(9))
    );
}

#[tokio::test]
async fn anonymous_lookalike_cannot_open_an_account_window() {
    let h = harness(vec![], vec![user_rule(5, 30, 9)]);
    let lookalike = anon("user_42");
    let account = VisitorIdentity::Authenticated(42);

    assert_eq!(h.evaluator.evaluate(t0(), PageId(5), &lookalike).await, Decision::NoRedirect);

    // The account's own first visit opens its own window.
    let later = t0() + Duration::minutes(30);
    assert_eq!(h.evaluator.evaluate(later, PageId(5), &account).await, Decision::NoRedirect);
    assert_eq!(h.visits.get(&VisitKey::new(&account, PageId(5))), Some(later));
    assert_eq!(h.visits.len(), 2);
}

#[tokio::test]
async fn global_rule_takes_precedence_over_user_rule() {
    let h = harness(vec![global_rule(5, 10, 12)], vec![user_rule(5, 1, 9)]);
    let visitor = anon("anon_both");

    // Seed an expired per-visitor window.
    h.evaluator.evaluate(t0(), PageId(5), &visitor).await;
    assert_eq!(
        h.evaluator.evaluate(t0() + Duration::minutes(5), PageId(5), &visitor).await,
        Decision::RedirectTo(PageId(9))
    );

    // Once the global rule expires it wins.
    assert_eq!(
        h.evaluator.evaluate(t0() + Duration::minutes(10), PageId(5), &visitor).await,
        Decision::RedirectTo(PageId(12))
    );
}

#[tokio::test]
async fn unpublished_global_target_falls_through() {
    let h = harness(vec![global_rule(5, 10, 9), global_rule(5, 10, 12)], vec![]);
    let now = t0() + Duration::minutes(10);

    let mut target = h.pages.get(PageId(9)).unwrap();
    target.status = PageStatus::Draft;
    h.pages.upsert(target);

    // First rule skipped, second rule still applies.
    assert_eq!(
        h.evaluator.evaluate(now, PageId(5), &anon("anon_c")).await,
        Decision::RedirectTo(PageId(12))
    );

    let mut target = h.pages.get(PageId(12)).unwrap();
    target.status = PageStatus::Trashed;
    h.pages.upsert(target);
    assert_eq!(
        h.evaluator.evaluate(now, PageId(5), &anon("anon_c")).await,
        Decision::NoRedirect
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_first_visits_record_one_instant() {
    let h = harness(vec![], vec![user_rule(5, 30, 9)]);
    let visitor = anon("anon_prefetch");

    let handles: Vec<_> = (0..32)
        .map(|i| {
            let evaluator = h.evaluator.clone();
            let visitor = visitor.clone();
            tokio::spawn(async move {
                let now = t0() + Duration::milliseconds(i);
                evaluator.evaluate(now, PageId(5), &visitor).await
            })
        })
        .collect();

    for handle in handles {
        assert_eq!(handle.await.unwrap(), Decision::NoRedirect);
    }

    assert_eq!(h.visits.len(), 1);
    let first = h.visits.get(&VisitKey::new(&visitor, PageId(5))).unwrap();
    assert!(first >= t0() && first < t0() + Duration::milliseconds(32));
}

struct BrokenTracker;

#[async_trait]
impl VisitTracker for BrokenTracker {
    async fn record_first_visit_if_absent(
        &self,
        _key: &VisitKey,
        _now: DateTime<Utc>,
    ) -> RedirectResult<FirstVisit> {
        Err(RedirectError::StorageUnavailable("connection refused".to_string()))
    }

    async fn lookup(&self, _key: &VisitKey) -> RedirectResult<Option<DateTime<Utc>>> {
        Err(RedirectError::StorageUnavailable("connection refused".to_string()))
    }

    async fn reset(&self) -> RedirectResult<usize> {
        Ok(0)
    }

    fn backend(&self) -> &'static str {
        "broken"
    }
}

/// Reports a long-expired first visit, but only after a long delay.
struct StalledTracker;

#[async_trait]
impl VisitTracker for StalledTracker {
    async fn record_first_visit_if_absent(
        &self,
        _key: &VisitKey,
        _now: DateTime<Utc>,
    ) -> RedirectResult<FirstVisit> {
        tokio::time::sleep(std::time::Duration::from_secs(5)).await;
        Ok(FirstVisit {
            at: t0() - Duration::days(30),
            newly_recorded: false,
        })
    }

    async fn lookup(&self, _key: &VisitKey) -> RedirectResult<Option<DateTime<Utc>>> {
        Ok(None)
    }

    async fn reset(&self) -> RedirectResult<usize> {
        Ok(0)
    }

    fn backend(&self) -> &'static str {
        "stalled"
    }
}

fn evaluator_with(tracker: Arc<dyn VisitTracker>, global: Vec<GlobalRule>) -> RedirectEvaluator {
    let pages = directory(&[5, 9, 12]);
    let rules = Arc::new(RuleStore::in_memory(pages.clone()));
    rules.replace_all(global, vec![user_rule(5, 1, 9)]).unwrap();
    let config = EvaluatorConfig {
        store_timeout_ms: 20,
        ..EvaluatorConfig::default()
    };
    RedirectEvaluator::new(rules, tracker, pages, &config)
}

#[tokio::test]
async fn storage_failure_fails_open() {
    let evaluator = evaluator_with(Arc::new(BrokenTracker), vec![]);
    let decision = evaluator
        .evaluate(t0() + Duration::days(1), PageId(5), &anon("anon_x"))
        .await;
    assert_eq!(decision, Decision::NoRedirect);
}

#[tokio::test]
async fn storage_timeout_fails_open() {
    let evaluator = evaluator_with(Arc::new(StalledTracker), vec![]);
    let started = std::time::Instant::now();
    let decision = evaluator.evaluate(t0(), PageId(5), &anon("anon_x")).await;
    assert_eq!(decision, Decision::NoRedirect);
    assert!(started.elapsed() < std::time::Duration::from_secs(5));
}

/// Fails every write and counts how often it was asked.
#[derive(Default)]
struct CountingBrokenTracker {
    calls: AtomicUsize,
}

#[async_trait]
impl VisitTracker for CountingBrokenTracker {
    async fn record_first_visit_if_absent(
        &self,
        _key: &VisitKey,
        _now: DateTime<Utc>,
    ) -> RedirectResult<FirstVisit> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(RedirectError::StorageUnavailable("connection reset".to_string()))
    }

    async fn lookup(&self, _key: &VisitKey) -> RedirectResult<Option<DateTime<Utc>>> {
        Ok(None)
    }

    async fn reset(&self) -> RedirectResult<usize> {
        Ok(0)
    }

    fn backend(&self) -> &'static str {
        "counting"
    }
}

#[tokio::test]
async fn storage_failure_stops_at_first_user_rule() {
    let pages = directory(&[5, 9, 12]);
    let rules = Arc::new(RuleStore::in_memory(pages.clone()));
    rules
        .replace_all(vec![], vec![user_rule(5, 1, 9), user_rule(5, 1, 12)])
        .unwrap();
    let tracker = Arc::new(CountingBrokenTracker::default());
    let evaluator = RedirectEvaluator::new(rules, tracker.clone(), pages, &EvaluatorConfig::default());

    let decision = evaluator
        .evaluate(t0() + Duration::days(1), PageId(5), &anon("anon_x"))
        .await;
    assert_eq!(decision, Decision::NoRedirect);
    assert_eq!(tracker.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn global_rules_do_not_touch_the_visit_store() {
    let evaluator = evaluator_with(Arc::new(BrokenTracker), vec![global_rule(5, 10, 12)]);
    let decision = evaluator
        .evaluate(t0() + Duration::minutes(10), PageId(5), &anon("anon_x"))
        .await;
    assert_eq!(decision, Decision::RedirectTo(PageId(12)));
}
