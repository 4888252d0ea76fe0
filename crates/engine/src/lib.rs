//! Redirect decision engine: rule evaluation and visitor identity.

pub mod evaluator;
pub mod identity;

pub use evaluator::RedirectEvaluator;
pub use identity::{IssuedToken, ResolvedIdentity, VisitorContext, VisitorIdentityProvider};
