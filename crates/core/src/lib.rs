pub mod config;
pub mod error;
pub mod pages;
pub mod types;

pub use config::AppConfig;
pub use error::{RedirectError, RedirectResult, RuleViolation};
pub use pages::{Page, PageDirectory, PageResolver, PageStatus};
pub use types::{Decision, GlobalRule, PageId, RuleKind, RuleSet, UserRule, VisitKey, VisitorIdentity};
