//! Rule store: both ordered rule lists behind a read-mostly snapshot.
//!
//! Readers take an `Arc<RuleSet>` and never block on writers for longer than
//! the pointer swap. `replace_all` validates every rule, persists the new lists
//! (when file-backed) and only then publishes them, so committed rules are
//! never partially invalid.

use parking_lot::{Mutex, RwLock};
use redirect_core::{
    GlobalRule, PageId, PageResolver, RedirectError, RedirectResult, RuleKind, RuleSet,
    RuleViolation, UserRule,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

pub struct RuleStore {
    current: RwLock<Arc<RuleSet>>,
    pages: Arc<dyn PageResolver>,
    path: Option<PathBuf>,
    /// Serializes persist-then-swap so two saves cannot interleave.
    write_lock: Mutex<()>,
}

impl RuleStore {
    /// Store with no backing file. Starts with both lists empty.
    pub fn in_memory(pages: Arc<dyn PageResolver>) -> Self {
        Self {
            current: RwLock::new(Arc::new(RuleSet::default())),
            pages,
            path: None,
            write_lock: Mutex::new(()),
        }
    }

    /// File-backed store. A missing file means no rules yet. Rules in the file
    /// that would be refused by [`validate`](Self::validate) are dropped with a
    /// warning, so the loaded lists hold only valid rules.
    pub fn open(path: impl AsRef<Path>, pages: Arc<dyn PageResolver>) -> RedirectResult<Self> {
        let path = path.as_ref().to_path_buf();
        let rules = match std::fs::read(&path) {
            Ok(bytes) => serde_json::from_slice::<RuleSet>(&bytes)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %path.display(), "No rule file yet, starting empty");
                RuleSet::default()
            }
            Err(e) => return Err(RedirectError::storage(format!("reading {}: {e}", path.display()))),
        };
        let rules = retain_valid(rules, pages.as_ref());

        info!(
            path = %path.display(),
            global = rules.global.len(),
            user = rules.user.len(),
            "Rule store loaded"
        );

        Ok(Self {
            current: RwLock::new(Arc::new(rules)),
            pages,
            path: Some(path),
            write_lock: Mutex::new(()),
        })
    }

    /// Current rule lists.
    pub fn snapshot(&self) -> Arc<RuleSet> {
        self.current.read().clone()
    }

    pub fn list_global_rules(&self) -> Vec<GlobalRule> {
        self.snapshot().global.clone()
    }

    pub fn list_user_rules(&self) -> Vec<UserRule> {
        self.snapshot().user.clone()
    }

    /// Validate and atomically replace both lists.
    pub fn replace_all(&self, global: Vec<GlobalRule>, user: Vec<UserRule>) -> RedirectResult<()> {
        let rules = RuleSet { global, user };
        if let Err(e) = self.validate(&rules) {
            warn!(error = %e, "Rejected rule save");
            metrics::counter!("rules.rejected").increment(1);
            return Err(e);
        }

        let _guard = self.write_lock.lock();
        if let Some(path) = &self.path {
            persist(path, &rules)?;
        }

        let (global_count, user_count) = (rules.global.len(), rules.user.len());
        *self.current.write() = Arc::new(rules);

        metrics::counter!("rules.replaced").increment(1);
        info!(global = global_count, user = user_count, "Redirect rules saved");
        Ok(())
    }

    /// Check every rule in list order; the first violation is reported.
    pub fn validate(&self, rules: &RuleSet) -> RedirectResult<()> {
        let pages = self.pages.as_ref();
        for (index, rule) in rules.global.iter().enumerate() {
            check_rule(pages, rule.duration_minutes, rule.promoted_page, rule.target_page)
                .map_err(|violation| RedirectError::InvalidRule {
                    kind: RuleKind::Global,
                    index,
                    violation,
                })?;
        }
        for (index, rule) in rules.user.iter().enumerate() {
            check_rule(pages, rule.validity_minutes, rule.promoted_page, rule.target_page)
                .map_err(|violation| RedirectError::InvalidRule {
                    kind: RuleKind::User,
                    index,
                    violation,
                })?;
        }
        Ok(())
    }
}

fn check_rule(
    pages: &dyn PageResolver,
    minutes: u32,
    promoted: PageId,
    target: PageId,
) -> Result<(), RuleViolation> {
    if minutes == 0 {
        return Err(RuleViolation::NonPositiveDuration);
    }
    for page in [promoted, target] {
        if page.is_unset() || !pages.page_exists(page) {
            return Err(RuleViolation::UnknownPage(page));
        }
    }
    if promoted == target {
        return Err(RuleViolation::SelfRedirect(promoted));
    }
    Ok(())
}

/// Drop persisted rules that no longer pass validation, keeping list order.
fn retain_valid(rules: RuleSet, pages: &dyn PageResolver) -> RuleSet {
    let mut dropped = 0usize;
    let mut keep = |kind: RuleKind, index: usize, result: Result<(), RuleViolation>| match result {
        Ok(()) => true,
        Err(violation) => {
            warn!(%kind, index, %violation, "Dropping invalid rule from rule file");
            dropped += 1;
            false
        }
    };

    let global: Vec<GlobalRule> = rules
        .global
        .into_iter()
        .enumerate()
        .filter(|(index, r)| {
            keep(
                RuleKind::Global,
                *index,
                check_rule(pages, r.duration_minutes, r.promoted_page, r.target_page),
            )
        })
        .map(|(_, r)| r)
        .collect();
    let user: Vec<UserRule> = rules
        .user
        .into_iter()
        .enumerate()
        .filter(|(index, r)| {
            keep(
                RuleKind::User,
                *index,
                check_rule(pages, r.validity_minutes, r.promoted_page, r.target_page),
            )
        })
        .map(|(_, r)| r)
        .collect();

    if dropped > 0 {
        metrics::counter!("rules.dropped_on_load").increment(dropped as u64);
    }
    RuleSet { global, user }
}

/// Write to a sibling temp file, then rename over the target.
fn persist(path: &Path, rules: &RuleSet) -> RedirectResult<()> {
    let json = serde_json::to_vec_pretty(rules)?;
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, json)
        .and_then(|_| std::fs::rename(&tmp, path))
        .map_err(|e| RedirectError::storage(format!("writing {}: {e}", path.display())))
}
