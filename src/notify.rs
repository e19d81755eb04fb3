//! Out-of-band delivery handoff for CRITICAL alerts
//!
//! The monitor only decides that an alert must leave the process; how it
//! reaches a human (mail, SMS, chat) is up to whatever sits behind the
//! notifier.

use std::time::Duration;

use anyhow::{Context, bail};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use tracing::{info, instrument};

use crate::config::NotifierConfig;
use crate::model::Alert;

#[async_trait]
pub trait AlertNotifier: Send + Sync {
    async fn notify(&self, alert: &Alert) -> anyhow::Result<()>;
}

/// POSTs every alert as JSON to a fixed URL
#[derive(Debug, Clone)]
pub struct WebhookNotifier {
    client: Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>, timeout: Duration) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build HTTP client")?;

        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl AlertNotifier for WebhookNotifier {
    #[instrument(skip_all, fields(alert = %alert.id, url = %self.url))]
    async fn notify(&self, alert: &Alert) -> anyhow::Result<()> {
        let payload = json!({
            "message": alert.message,
            "monitor": alert.collector_id,
            "alert": alert,
        });

        let response = self
            .client
            .post(&self.url)
            .json(&payload)
            .send()
            .await
            .context("failed to send webhook alert")?;

        if !response.status().is_success() {
            bail!("webhook alert failed with status: {}", response.status());
        }

        info!("successfully sent webhook alert");
        Ok(())
    }
}

pub fn build_notifier(
    config: Option<&NotifierConfig>,
    timeout: Duration,
) -> anyhow::Result<Option<Box<dyn AlertNotifier>>> {
    let Some(config) = config else {
        return Ok(None);
    };

    match config {
        NotifierConfig::Webhook(webhook) => {
            let notifier = WebhookNotifier::new(&webhook.url, timeout)?;
            Ok(Some(Box::new(notifier)))
        }
    }
}
