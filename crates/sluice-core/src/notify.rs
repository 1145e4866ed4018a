//! Mutation notification port
//!
//! After any successful mutating action the pipeline fires a
//! [`ChangeNotifier`] with a record of what happened. Delivery is
//! fire-and-forget: a failing notifier never affects the response.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

use crate::auth::CallerIdentity;

/// The mutating actions a notification can describe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MutationKind {
    Upload,
    Update,
    Delete,
    CreateFolder,
    Rename,
    Move,
    Copy,
}

/// One successful mutation, as delivered to notifier implementations.
#[derive(Debug, Clone, Serialize)]
pub struct ChangeEvent {
    pub action: MutationKind,
    pub resource: String,
    pub provider: String,
    /// Serialised path of the affected entity (destination for move/copy)
    pub path: String,
    /// Resulting metadata attributes, when the action produced any
    pub metadata: Option<Value>,
    pub actor: CallerIdentity,
    pub occurred_at: DateTime<Utc>,
}

/// Port trait for the post-mutation hook (queue, webhook, no-op).
#[async_trait]
pub trait ChangeNotifier: Send + Sync {
    async fn notify(&self, event: &ChangeEvent) -> anyhow::Result<()>;
}

/// Discards every event; the default when no hook is configured.
pub struct NoopNotifier;

#[async_trait]
impl ChangeNotifier for NoopNotifier {
    async fn notify(&self, _event: &ChangeEvent) -> anyhow::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_noop_notifier_accepts_everything() {
        let event = ChangeEvent {
            action: MutationKind::Upload,
            resource: "r1".to_string(),
            provider: "memstore".to_string(),
            path: "/a.txt".to_string(),
            metadata: None,
            actor: CallerIdentity::anonymous(),
            occurred_at: Utc::now(),
        };
        assert!(NoopNotifier.notify(&event).await.is_ok());
    }

    #[test]
    fn test_event_serialises_with_snake_case_action() {
        let event = ChangeEvent {
            action: MutationKind::CreateFolder,
            resource: "r1".to_string(),
            provider: "memstore".to_string(),
            path: "/docs/".to_string(),
            metadata: None,
            actor: CallerIdentity::anonymous(),
            occurred_at: Utc::now(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["action"], "create_folder");
        assert_eq!(json["path"], "/docs/");
    }
}
