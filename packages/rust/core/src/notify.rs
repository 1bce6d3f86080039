//! Completion notifications.

use async_trait::async_trait;
use reqwest::Client;
use repoindex_shared::{AppConfig, RepoIndexError, Result};
use tracing::{error, info};

/// Delivers the end-of-run report.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, subject: &str, body: &str) -> Result<()>;
}

/// Writes the report to the log.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, subject: &str, body: &str) -> Result<()> {
        if subject.ends_with("ERROR") {
            error!(subject, body, "import report");
        } else {
            info!(subject, body, "import report");
        }
        Ok(())
    }
}

/// POSTs the report as JSON (`{"subject": .., "body": ..}`).
pub struct WebhookNotifier {
    client: Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(client: Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn send(&self, subject: &str, body: &str) -> Result<()> {
        let payload = serde_json::json!({ "subject": subject, "body": body });
        let response = self
            .client
            .post(&self.url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| RepoIndexError::Network(format!("{}: {e}", self.url)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(RepoIndexError::Network(format!(
                "{}: HTTP {status}",
                self.url
            )));
        }
        info!(url = %self.url, subject, "sent import report");
        Ok(())
    }
}

/// Webhook when configured, log otherwise.
pub fn notifier_from_config(config: &AppConfig, client: Client) -> Box<dyn Notifier> {
    match &config.notify.webhook_url {
        Some(url) => Box::new(WebhookNotifier::new(client, url.clone())),
        None => Box::new(LogNotifier),
    }
}
