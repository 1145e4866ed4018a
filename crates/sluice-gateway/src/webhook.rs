//! Webhook mutation notifier
//!
//! POSTs every [`ChangeEvent`] as JSON to a configured URL. The pipeline
//! fires notifiers from a detached task, so a slow or failing endpoint
//! never holds up a response; delivery errors are logged and dropped.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;

use sluice_core::notify::{ChangeEvent, ChangeNotifier};

pub struct WebhookNotifier {
    client: Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>, timeout: Duration) -> anyhow::Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client, url: url.into() })
    }
}

#[async_trait]
impl ChangeNotifier for WebhookNotifier {
    async fn notify(&self, event: &ChangeEvent) -> anyhow::Result<()> {
        let response = self.client.post(&self.url).json(event).send().await?;
        response.error_for_status()?;
        Ok(())
    }
}
