use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::Value;

/// What the webhook said back. Body is kept even for failures since it is
/// the only diagnostic Slack gives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub status: u16,
    pub body: String,
}

impl Delivery {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Outbound side of the relay. One call, one POST.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Post `{"text": text}` to `webhook_url`. Errors mean no response was
    /// obtained; a non-2xx answer is still `Ok`.
    async fn post(&self, webhook_url: &str, text: &Value) -> Result<Delivery>;
}

#[derive(Debug, Clone)]
pub struct SlackWebhook {
    client: reqwest::Client,
}

impl SlackWebhook {
    pub fn new(timeout: Option<Duration>) -> Result<Self> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder.build().context("Building HTTP client")?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Notifier for SlackWebhook {
    async fn post(&self, webhook_url: &str, text: &Value) -> Result<Delivery> {
        let payload = serde_json::json!({ "text": text });
        let response = self
            .client
            .post(webhook_url)
            .json(&payload)
            .send()
            .await?;
        let status = response.status().as_u16();
        let body = response.text().await?;
        tracing::debug!(status, "Slack webhook answered");
        Ok(Delivery { status, body })
    }
}
