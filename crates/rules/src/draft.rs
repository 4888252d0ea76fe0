//! Rule drafts as submitted by the admin form.
//!
//! Start times arrive as browser-local wall-clock strings together with the
//! browser's `getTimezoneOffset()` (minutes, positive west of UTC). They are
//! normalized to UTC here so the store only ever holds absolute instants.

use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use redirect_core::{
    GlobalRule, PageId, RedirectError, RedirectResult, RuleKind, RuleSet, RuleViolation, UserRule,
};
use serde::Deserialize;

const LOCAL_FORMATS: [&str; 4] = [
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%d %H:%M:%S",
];

#[derive(Debug, Clone, Deserialize)]
pub struct GlobalRuleDraft {
    pub promoted_page: PageId,
    /// `YYYY-MM-DDTHH:MM` in the author's local time.
    pub start_local: String,
    pub duration_minutes: u32,
    pub target_page: PageId,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RuleDrafts {
    #[serde(default)]
    pub timezone_offset_minutes: i32,
    #[serde(default)]
    pub global: Vec<GlobalRuleDraft>,
    #[serde(default)]
    pub user: Vec<UserRule>,
}

impl RuleDrafts {
    /// Convert to absolute rules. Structural checks (durations, pages) are
    /// left to `RuleStore::replace_all`.
    pub fn into_rule_set(self) -> RedirectResult<RuleSet> {
        let offset = self.timezone_offset_minutes;
        let global = self
            .global
            .into_iter()
            .enumerate()
            .map(|(index, draft)| {
                let start = local_to_utc(&draft.start_local, offset).ok_or_else(|| {
                    RedirectError::InvalidRule {
                        kind: RuleKind::Global,
                        index,
                        violation: RuleViolation::MalformedStart(draft.start_local.clone()),
                    }
                })?;
                tracing::debug!(
                    index,
                    local = %draft.start_local,
                    utc = %start,
                    "Normalized global rule start"
                );
                Ok(GlobalRule {
                    promoted_page: draft.promoted_page,
                    start,
                    duration_minutes: draft.duration_minutes,
                    target_page: draft.target_page,
                })
            })
            .collect::<RedirectResult<Vec<_>>>()?;

        Ok(RuleSet {
            global,
            user: self.user,
        })
    }
}

/// Local wall-clock time plus browser offset to a UTC instant.
pub fn local_to_utc(raw: &str, timezone_offset_minutes: i32) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    let naive = LOCAL_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())?;
    naive
        .checked_add_signed(Duration::minutes(i64::from(timezone_offset_minutes)))
        .map(|utc| utc.and_utc())
}
