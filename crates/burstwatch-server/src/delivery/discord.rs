use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use burstwatch_core::sink::{NotificationSink, SinkError};

/// Posts JSON payloads to a Discord-compatible incoming webhook.
pub struct DiscordWebhookSink {
    client: reqwest::Client,
    url: String,
}

impl DiscordWebhookSink {
    pub fn new(url: &str) -> Result<Self, SinkError> {
        let parsed = url::Url::parse(url.trim())
            .map_err(|_| SinkError::InvalidTarget("invalid webhook url".to_string()))?;
        if parsed.scheme() != "http" && parsed.scheme() != "https" {
            return Err(SinkError::InvalidTarget(
                "webhook url must use http or https".to_string(),
            ));
        }
        if parsed.host_str().is_none() {
            return Err(SinkError::InvalidTarget(
                "webhook url missing host".to_string(),
            ));
        }
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(3))
            .timeout(Duration::from_secs(5))
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| SinkError::Transport(format!("webhook client build failed: {e}")))?;
        Ok(Self {
            client,
            url: parsed.to_string(),
        })
    }
}

#[async_trait]
impl NotificationSink for DiscordWebhookSink {
    async fn send(&self, payload: &Value) -> Result<(), SinkError> {
        let response = self
            .client
            .post(&self.url)
            .json(payload)
            .send()
            .await
            .map_err(|e| SinkError::Transport(format!("webhook send failed: {e}")))?;
        let status = response.status();
        if !status.is_success() {
            return Err(SinkError::Rejected {
                status: status.as_u16(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_non_http_targets() {
        assert!(matches!(
            DiscordWebhookSink::new("ftp://example.com/hook"),
            Err(SinkError::InvalidTarget(_))
        ));
        assert!(matches!(
            DiscordWebhookSink::new("not a url"),
            Err(SinkError::InvalidTarget(_))
        ));
    }

    #[test]
    fn accepts_https_webhook() {
        assert!(DiscordWebhookSink::new("https://discord.com/api/webhooks/1/abc").is_ok());
    }
}
