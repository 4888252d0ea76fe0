use crate::types::{PageId, RuleKind};
use thiserror::Error;

pub type RedirectResult<T> = Result<T, RedirectError>;

/// Why a rule was refused at save time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleViolation {
    NonPositiveDuration,
    UnknownPage(PageId),
    SelfRedirect(PageId),
    MalformedStart(String),
}

impl std::fmt::Display for RuleViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RuleViolation::NonPositiveDuration => f.write_str("duration must be at least one minute"),
            RuleViolation::UnknownPage(page) => write!(f, "page {page} does not exist or is not published"),
            RuleViolation::SelfRedirect(page) => write!(f, "page {page} redirects to itself"),
            RuleViolation::MalformedStart(raw) => write!(f, "start time '{raw}' is not YYYY-MM-DDTHH:MM"),
        }
    }
}

#[derive(Error, Debug)]
pub enum RedirectError {
    #[error("Invalid {kind} rule #{index}: {violation}")]
    InvalidRule {
        kind: RuleKind,
        index: usize,
        violation: RuleViolation,
    },

    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl RedirectError {
    pub fn storage(err: impl std::fmt::Display) -> Self {
        RedirectError::StorageUnavailable(err.to_string())
    }

    pub fn is_invalid_rule(&self) -> bool {
        matches!(self, RedirectError::InvalidRule { .. })
    }
}
