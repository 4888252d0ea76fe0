//! Redirect rule storage: validated, atomically replaced rule lists and
//! conversion of admin form drafts into absolute rules.

pub mod draft;
pub mod store;

pub use draft::{GlobalRuleDraft, RuleDrafts};
pub use store::RuleStore;
