//! Static auth handler
//!
//! Grants are computed from an in-process table instead of an external
//! service. This is the dev-mode and test-suite handler; production
//! deployments use [`crate::remote::RemoteAuth`].

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;

use sluice_core::auth::{
    Action, AuthGrant, AuthHandler, AuthTokens, CallerIdentity, Credentials, Settings,
};
use sluice_core::errors::{GatewayError, GatewayResult};

/// Table-driven auth handler.
///
/// In `allow_all` mode every caller is admitted (identity derived from the
/// bearer token when present). Otherwise only registered bearer tokens
/// pass. Callers carrying a `view_only` capability are restricted to
/// reads either way.
pub struct StaticAuth {
    allow_all: bool,
    tokens: HashMap<String, CallerIdentity>,
    provider_settings: HashMap<String, Value>,
}

impl StaticAuth {
    /// Admits nobody until tokens are registered.
    pub fn new() -> Self {
        Self {
            allow_all: false,
            tokens: HashMap::new(),
            provider_settings: HashMap::new(),
        }
    }

    /// Admits every caller; dev-mode default.
    pub fn allow_all() -> Self {
        Self { allow_all: true, ..Self::new() }
    }

    /// Registers a bearer token with its caller identity.
    pub fn with_token(mut self, token: impl Into<String>, identity: CallerIdentity) -> Self {
        self.tokens.insert(token.into(), identity);
        self
    }

    /// Fixes the settings bundle handed out for one provider kind.
    pub fn with_provider_settings(mut self, provider: impl Into<String>, settings: Value) -> Self {
        self.provider_settings.insert(provider.into(), settings);
        self
    }
}

impl Default for StaticAuth {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AuthHandler for StaticAuth {
    async fn fetch(
        &self,
        _resource: &str,
        provider: &str,
        action: Action,
        tokens: &AuthTokens,
    ) -> GatewayResult<AuthGrant> {
        let identity = match (&tokens.bearer, self.allow_all) {
            (Some(bearer), _) => match self.tokens.get(bearer) {
                Some(identity) => identity.clone(),
                None if self.allow_all => CallerIdentity {
                    id: format!("token:{bearer}"),
                    name: None,
                    email: None,
                },
                None => {
                    return Err(GatewayError::Unauthorized(
                        "unknown bearer token".to_string(),
                    ))
                }
            },
            (None, true) => CallerIdentity::anonymous(),
            (None, false) => {
                return Err(GatewayError::Unauthorized(
                    "credentials required".to_string(),
                ))
            }
        };

        if tokens.view_only.is_some() && action != Action::Read {
            return Err(GatewayError::Forbidden(
                "view-only callers may not mutate".to_string(),
            ));
        }

        let settings = self
            .provider_settings
            .get(provider)
            .cloned()
            .map(Settings::new)
            .unwrap_or_else(Settings::empty);

        Ok(AuthGrant {
            credentials: Credentials::empty(),
            settings,
            identity,
        })
    }
}
