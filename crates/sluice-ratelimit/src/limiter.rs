//! Fixed-window limiter and credential classification
//!
//! Requests are throttled per classified credential: cookie-authenticated
//! (interactive) callers bypass the limiter, bearer and basic credentials
//! are keyed by a salt-free SHA-256 of their value, and anonymous callers
//! fall back to their client IP. Counters live in a [`CounterStore`] so
//! the window is shared across gateway processes.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use sha2::{Digest, Sha256};
use tracing::warn;

use sluice_core::auth::AuthTokens;
use sluice_core::errors::{GatewayError, GatewayResult};

use crate::store::CounterStore;

/// How the caller authenticated, for throttling purposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialClass {
    Cookie,
    Bearer,
    Basic,
    None,
}

/// Classifies raw tokens and returns the credential value, when one
/// exists. Cookies win over bearer over basic.
pub fn classify(tokens: &AuthTokens) -> (CredentialClass, Option<String>) {
    if tokens.cookie.is_some() {
        return (CredentialClass::Cookie, tokens.cookie.clone());
    }
    if let Some(bearer) = &tokens.bearer {
        return (CredentialClass::Bearer, Some(bearer.clone()));
    }
    if let Some(basic) = &tokens.basic {
        return (CredentialClass::Basic, Some(basic.clone()));
    }
    (CredentialClass::None, None)
}

/// Counter key for a classified credential. Cookie callers have no key:
/// they bypass the limiter. Credential values are hashed so the store
/// never sees a secret.
pub fn derive_key(
    class: CredentialClass,
    value: Option<&str>,
    client_ip: Option<&str>,
) -> Option<String> {
    match class {
        CredentialClass::Cookie => None,
        CredentialClass::Bearer => {
            value.map(|v| format!("bearer:{}", hex::encode(Sha256::digest(v))))
        }
        CredentialClass::Basic => {
            value.map(|v| format!("basic:{}", hex::encode(Sha256::digest(v))))
        }
        CredentialClass::None => Some(format!("none:{}", client_ip.unwrap_or("unknown"))),
    }
}

/// The limiter's verdict, with everything the 429 headers need.
#[derive(Debug, Clone, Copy)]
pub struct LimitDecision {
    pub allowed: bool,
    pub limit: u64,
    pub remaining: u64,
    /// Window end as epoch seconds, for X-RateLimit-Reset.
    pub reset_at: i64,
    /// Seconds until the window ends, for Retry-After.
    pub retry_after: u64,
}

/// Fixed-window counter over a shared store.
pub struct FixedWindowLimiter {
    store: Option<Arc<dyn CounterStore>>,
    limit: u64,
    window: Duration,
}

impl FixedWindowLimiter {
    pub fn new(store: Arc<dyn CounterStore>, limit: u64, window: Duration) -> Self {
        Self { store: Some(store), limit, window }
    }

    /// A limiter that admits everything; used when limiting is disabled.
    pub fn disabled() -> Self {
        Self { store: None, limit: 0, window: Duration::from_secs(0) }
    }

    pub fn is_enabled(&self) -> bool {
        self.store.is_some()
    }

    /// Checks one request. `Ok(None)` means no limiting applied (disabled
    /// or cookie caller); a present decision says whether to admit.
    ///
    /// An unreachable store fails the request with `ServiceUnavailable`
    /// rather than silently admitting it.
    pub async fn check(&self, tokens: &AuthTokens) -> GatewayResult<Option<LimitDecision>> {
        let Some(store) = &self.store else {
            return Ok(None);
        };
        let (class, value) = classify(tokens);
        let Some(key) = derive_key(class, value.as_deref(), tokens.client_ip.as_deref()) else {
            return Ok(None);
        };

        let window = store.increment(&key, self.window).await.map_err(|err| {
            warn!(error = %err, "rate-limit store unreachable");
            GatewayError::ServiceUnavailable("rate limiter store unreachable".to_string())
        })?;

        let retry_after = (window.expires_at - Utc::now()).num_seconds().max(1) as u64;
        Ok(Some(LimitDecision {
            allowed: window.count <= self.limit,
            limit: self.limit,
            remaining: self.limit.saturating_sub(window.count),
            reset_at: window.expires_at.timestamp(),
            retry_after,
        }))
    }
}
