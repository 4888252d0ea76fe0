//! Visitor identity provisioning.
//!
//! Logged-in visitors are keyed by account id. Anonymous visitors carry a
//! durable token; when none (or a malformed one) is presented a new token is
//! minted and handed back to the transport layer to persist client-side.

use rand::distributions::Alphanumeric;
use rand::Rng;
use redirect_core::config::IdentityConfig;
use redirect_core::VisitorIdentity;

const MAX_TOKEN_LEN: usize = 128;

/// Identity signals extracted from an inbound request.
#[derive(Debug, Clone, Default)]
pub struct VisitorContext {
    pub account_id: Option<u64>,
    pub anonymous_token: Option<String>,
}

/// Result of resolving a request to a visitor.
#[derive(Debug, Clone)]
pub struct ResolvedIdentity {
    pub identity: VisitorIdentity,
    /// Set when a new anonymous token was minted and must be stored by the client.
    pub issued: Option<IssuedToken>,
}

/// A freshly minted anonymous token and how long the client should keep it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedToken {
    pub name: String,
    pub value: String,
    pub max_age_secs: u64,
}

pub struct VisitorIdentityProvider {
    config: IdentityConfig,
}

impl VisitorIdentityProvider {
    pub fn new(config: IdentityConfig) -> Self {
        Self { config }
    }

    pub fn resolve(&self, ctx: &VisitorContext) -> ResolvedIdentity {
        if let Some(account_id) = ctx.account_id {
            return ResolvedIdentity {
                identity: VisitorIdentity::Authenticated(account_id),
                issued: None,
            };
        }

        if let Some(token) = ctx.anonymous_token.as_deref() {
            if self.is_well_formed(token) {
                return ResolvedIdentity {
                    identity: VisitorIdentity::Anonymous(token.to_string()),
                    issued: None,
                };
            }
            tracing::debug!(len = token.len(), "Discarding malformed anonymous token");
        }

        let token = self.mint_token();
        tracing::debug!("Issued new anonymous visitor token");
        ResolvedIdentity {
            identity: VisitorIdentity::Anonymous(token.clone()),
            issued: Some(IssuedToken {
                name: self.config.cookie_name.clone(),
                value: token,
                max_age_secs: u64::from(self.config.token_ttl_days) * 24 * 60 * 60,
            }),
        }
    }

    fn mint_token(&self) -> String {
        let suffix: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(self.config.token_length)
            .map(char::from)
            .collect();
        format!("{}{}", self.config.token_prefix, suffix)
    }

    /// Only tokens this provider could have minted are reused: the configured
    /// prefix followed by a short, cookie-safe body.
    fn is_well_formed(&self, token: &str) -> bool {
        let Some(body) = token.strip_prefix(self.config.token_prefix.as_str()) else {
            return false;
        };
        !body.is_empty()
            && token.len() <= MAX_TOKEN_LEN
            && body
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
    }
}
