//! Auth handler port and credential types
//!
//! The pipeline never decides permissions itself: for every request it asks
//! an [`AuthHandler`] to exchange the caller's raw tokens for a per-provider
//! credentials+settings bundle. Bundles live for one request and are never
//! logged or persisted by the core; their `Debug` impls redact.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::GatewayResult;

/// Opaque per-provider secret material returned by the auth handler.
///
/// The core passes it to the provider factory and otherwise treats it as a
/// black box.
#[derive(Clone, PartialEq)]
pub struct Credentials(Value);

impl Credentials {
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    pub fn empty() -> Self {
        Self(Value::Object(serde_json::Map::new()))
    }

    /// Looks up a string field, e.g. an access token or secret key.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credentials(<redacted>)")
    }
}

/// Non-secret provider settings (root folder, bucket name, ...).
#[derive(Debug, Clone, PartialEq)]
pub struct Settings(Value);

impl Settings {
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    pub fn empty() -> Self {
        Self(Value::Object(serde_json::Map::new()))
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.0.get(key).and_then(Value::as_bool)
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }
}

/// Who the auth provider says is calling; attached to notifications.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallerIdentity {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

impl CallerIdentity {
    pub fn anonymous() -> Self {
        Self { id: "anonymous".to_string(), name: None, email: None }
    }
}

/// Action category the pipeline infers from method + parameters and hands
/// to the auth handler for a permission decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Read,
    Write,
    Delete,
    /// Source side of a move/copy
    CopyFrom,
    /// Destination side of a move/copy
    CopyTo,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Read => "read",
            Action::Write => "write",
            Action::Delete => "delete",
            Action::CopyFrom => "copyfrom",
            Action::CopyTo => "copyto",
        }
    }
}

/// Raw caller credentials, forwarded opaquely to the auth handler.
///
/// `client_ip` exists only for rate-limit classification of anonymous
/// callers.
#[derive(Clone, Default, PartialEq)]
pub struct AuthTokens {
    /// Bearer token from the Authorization header
    pub bearer: Option<String>,
    /// Base64 payload of an HTTP Basic Authorization header
    pub basic: Option<String>,
    /// Session cookie (header or relayed `cookie` query parameter)
    pub cookie: Option<String>,
    /// Relayed `view_only` query parameter
    pub view_only: Option<String>,
    pub client_ip: Option<String>,
}

impl fmt::Debug for AuthTokens {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthTokens")
            .field("bearer", &self.bearer.as_ref().map(|_| "<redacted>"))
            .field("basic", &self.basic.as_ref().map(|_| "<redacted>"))
            .field("cookie", &self.cookie.as_ref().map(|_| "<redacted>"))
            .field("view_only", &self.view_only)
            .field("client_ip", &self.client_ip)
            .finish()
    }
}

/// What the auth provider grants for one (resource, provider, action).
#[derive(Debug, Clone)]
pub struct AuthGrant {
    pub credentials: Credentials,
    pub settings: Settings,
    pub identity: CallerIdentity,
}

/// Port trait for the external auth provider.
///
/// Implementations fail with `Unauthorized` for invalid tokens, `Forbidden`
/// for valid tokens lacking permission, and `NotFound` when the resource
/// does not exist.
#[async_trait]
pub trait AuthHandler: Send + Sync {
    async fn fetch(
        &self,
        resource: &str,
        provider: &str,
        action: Action,
        tokens: &AuthTokens,
    ) -> GatewayResult<AuthGrant>;
}
