//! Delivery of summaries to a chat webhook.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Serialize;
use thiserror::Error;
use tracing::debug;
use url::Url;

#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("webhook request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("webhook rejected message with status {status}: {body}")]
    Status { status: StatusCode, body: String },
}

/// Sink for finished summary messages.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn deliver(&self, text: &str) -> Result<(), DeliveryError>;
}

#[derive(Debug, Serialize)]
struct WebhookPayload<'a> {
    username: &'a str,
    content: &'a str,
}

/// Posts messages to a Discord-compatible webhook under a fixed sender name.
pub struct WebhookNotifier {
    client: Client,
    url: Url,
    username: String,
}

impl WebhookNotifier {
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(url: Url, username: impl Into<String>) -> Result<Self, DeliveryError> {
        let client = Client::builder().timeout(Duration::from_secs(30)).build()?;
        Ok(Self {
            client,
            url,
            username: username.into(),
        })
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn deliver(&self, text: &str) -> Result<(), DeliveryError> {
        let payload = WebhookPayload {
            username: &self.username,
            content: text,
        };

        let response = self
            .client
            .post(self.url.clone())
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DeliveryError::Status { status, body });
        }

        debug!(status = %status, chars = text.chars().count(), "Webhook accepted message");
        Ok(())
    }
}
