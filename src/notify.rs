//! Outbound notifiers: HTTP webhook and fan-out.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use common::{Error, Notification, Result};
use reqwest::Client;
use serde_json::json;
use streak_engine::Notifier;
use tracing::debug;

use crate::render::{render, Labels};

/// POSTs `{destination, text}` to a webhook.
pub struct WebhookNotifier {
    client: Client,
    url: String,
    labels: Labels,
    timeout: Duration,
}

impl WebhookNotifier {
    pub fn new(url: &str, timeout: Duration, labels: Labels) -> anyhow::Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: url.trim().to_string(),
            labels,
            timeout,
        })
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn deliver(&self, notification: &Notification) -> Result<()> {
        let destination = notification.destination.clone();
        let payload = json!({
            "destination": destination,
            "text": render(notification, &self.labels.label(notification)),
        });

        let response = self
            .client
            .post(&self.url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    Error::DispatchTimeout {
                        destination: destination.clone(),
                        timeout_ms: self.timeout.as_millis() as u64,
                    }
                } else {
                    Error::Dispatch {
                        destination: destination.clone(),
                        message: e.to_string(),
                    }
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Dispatch {
                destination,
                message: format!("HTTP {}: {}", status, body.trim()),
            });
        }
        debug!("webhook accepted {} for {}", notification.id, destination);
        Ok(())
    }
}

/// Delivers to every inner notifier; fails if any of them fails.
pub struct FanoutNotifier {
    targets: Vec<Arc<dyn Notifier>>,
}

impl FanoutNotifier {
    pub fn new(targets: Vec<Arc<dyn Notifier>>) -> Self {
        Self { targets }
    }
}

#[async_trait]
impl Notifier for FanoutNotifier {
    async fn deliver(&self, notification: &Notification) -> Result<()> {
        let mut failures = Vec::new();
        for target in &self.targets {
            if let Err(e) = target.deliver(notification).await {
                failures.push(e.to_string());
            }
        }
        if failures.is_empty() {
            return Ok(());
        }
        Err(Error::Dispatch {
            destination: notification.destination.clone(),
            message: failures.join("; "),
        })
    }
}
