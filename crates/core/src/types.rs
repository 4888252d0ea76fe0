use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque identifier of a content page. Zero never names a page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PageId(pub u64);

impl PageId {
    pub fn is_unset(&self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for PageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for PageId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

/// Campaign-wide rule: every visitor of `promoted_page` is sent to
/// `target_page` once `start + duration_minutes` has passed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlobalRule {
    pub promoted_page: PageId,
    /// Absolute start, persisted as epoch seconds.
    #[serde(with = "chrono::serde::ts_seconds")]
    pub start: DateTime<Utc>,
    pub duration_minutes: u32,
    pub target_page: PageId,
}

impl GlobalRule {
    /// Instant from which the rule redirects. `None` if it lies beyond the
    /// representable range, i.e. the rule never fires.
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.start
            .checked_add_signed(Duration::minutes(i64::from(self.duration_minutes)))
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at().is_some_and(|expiry| now >= expiry)
    }
}

/// Per-visitor rule: the window opens at each visitor's own first visit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRule {
    pub promoted_page: PageId,
    pub validity_minutes: u32,
    pub target_page: PageId,
}

impl UserRule {
    pub fn expires_at(&self, first_visit: DateTime<Utc>) -> Option<DateTime<Utc>> {
        first_visit.checked_add_signed(Duration::minutes(i64::from(self.validity_minutes)))
    }
}

/// Both ordered rule lists. Evaluated in list order, first match wins.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleSet {
    #[serde(default)]
    pub global: Vec<GlobalRule>,
    #[serde(default)]
    pub user: Vec<UserRule>,
}

impl RuleSet {
    pub fn is_empty(&self) -> bool {
        self.global.is_empty() && self.user.is_empty()
    }
}

/// Which of the two rule lists a rule belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleKind {
    Global,
    User,
}

impl fmt::Display for RuleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuleKind::Global => f.write_str("global"),
            RuleKind::User => f.write_str("user"),
        }
    }
}

/// Stable identity of a visitor across requests.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum VisitorIdentity {
    /// Logged-in account, stable for the account's lifetime.
    Authenticated(u64),
    /// Durable client-held token.
    Anonymous(String),
}

impl fmt::Display for VisitorIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VisitorIdentity::Authenticated(id) => write!(f, "user_{id}"),
            VisitorIdentity::Anonymous(token) => f.write_str(token),
        }
    }
}

/// Key of a first-visit record: one per (visitor, promoted page).
///
/// Keeps the identity variant, so an anonymous token that happens to read
/// like an account key never shares a record with that account.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VisitKey {
    pub visitor: VisitorIdentity,
    pub page: PageId,
}

impl VisitKey {
    pub fn new(visitor: &VisitorIdentity, page: PageId) -> Self {
        Self {
            visitor: visitor.clone(),
            page,
        }
    }
}

/// Storage form `auth:<account>:<page>` or `anon:<token>:<page>`.
impl fmt::Display for VisitKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.visitor {
            VisitorIdentity::Authenticated(id) => write!(f, "auth:{id}:{}", self.page),
            VisitorIdentity::Anonymous(token) => write!(f, "anon:{token}:{}", self.page),
        }
    }
}

/// Outcome of evaluating a page view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", content = "target_page", rename_all = "snake_case")]
pub enum Decision {
    NoRedirect,
    RedirectTo(PageId),
}
