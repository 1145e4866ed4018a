//! Remote auth provider client
//!
//! Exchanges the caller's raw tokens for a credentials+settings bundle by
//! POSTing to the configured auth provider. Auth decisions stay entirely
//! on that side; this client only translates transport and status codes
//! into the gateway taxonomy.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use sluice_core::auth::{
    Action, AuthGrant, AuthHandler, AuthTokens, CallerIdentity, Credentials, Settings,
};
use sluice_core::errors::{GatewayError, GatewayResult};

/// Path the grant endpoint lives under on the auth provider.
const GRANTS_PATH: &str = "/v1/grants";

/// HTTP client for the external auth provider.
pub struct RemoteAuth {
    client: Client,
    base_url: String,
}

#[derive(Serialize)]
struct GrantRequest<'a> {
    resource: &'a str,
    provider: &'a str,
    action: &'a str,
    auth: GrantAuth<'a>,
}

#[derive(Serialize)]
struct GrantAuth<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    bearer: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    basic: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    cookie: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    view_only: Option<&'a str>,
}

#[derive(Deserialize)]
struct GrantResponse {
    credentials: Value,
    #[serde(default)]
    settings: Value,
    identity: CallerIdentity,
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
}

impl RemoteAuth {
    /// Creates a client for the auth provider at `base_url` with a
    /// per-call timeout.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> GatewayResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| GatewayError::Unexpected(err.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl AuthHandler for RemoteAuth {
    async fn fetch(
        &self,
        resource: &str,
        provider: &str,
        action: Action,
        tokens: &AuthTokens,
    ) -> GatewayResult<AuthGrant> {
        let request = GrantRequest {
            resource,
            provider,
            action: action.as_str(),
            auth: GrantAuth {
                bearer: tokens.bearer.as_deref(),
                basic: tokens.basic.as_deref(),
                cookie: tokens.cookie.as_deref(),
                view_only: tokens.view_only.as_deref(),
            },
        };

        debug!(resource, provider, action = action.as_str(), "requesting auth grant");
        let response = self
            .client
            .post(format!("{}{GRANTS_PATH}", self.base_url))
            .json(&request)
            .send()
            .await
            .map_err(|err| {
                warn!(error = %err, "auth provider unreachable");
                GatewayError::ServiceUnavailable("auth provider unreachable".to_string())
            })?;

        let status = response.status();
        if status.is_success() {
            let grant: GrantResponse = response.json().await.map_err(|err| {
                GatewayError::ServiceUnavailable(format!(
                    "auth provider returned an unreadable grant: {err}"
                ))
            })?;
            return Ok(AuthGrant {
                credentials: Credentials::new(grant.credentials),
                settings: Settings::new(grant.settings),
                identity: grant.identity,
            });
        }

        let message = response
            .json::<ErrorBody>()
            .await
            .map(|body| body.message)
            .unwrap_or_default();
        Err(match status {
            StatusCode::UNAUTHORIZED => GatewayError::Unauthorized(or_default(
                message,
                "auth provider rejected the credentials",
            )),
            StatusCode::FORBIDDEN => GatewayError::Forbidden(or_default(
                message,
                "auth provider denied the action",
            )),
            StatusCode::NOT_FOUND => GatewayError::NotFound(or_default(
                message,
                "resource unknown to the auth provider",
            )),
            StatusCode::GONE => {
                GatewayError::Gone(or_default(message, "resource is gone"))
            }
            _ => {
                warn!(status = %status, "auth provider returned an unexpected status");
                GatewayError::ServiceUnavailable(format!(
                    "auth provider answered with status {status}"
                ))
            }
        })
    }
}

fn or_default(message: String, fallback: &str) -> String {
    if message.is_empty() {
        fallback.to_string()
    } else {
        message
    }
}
