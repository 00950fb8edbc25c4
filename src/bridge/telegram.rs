use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use super::DeliveryChannel;

const API_BASE: &str = "https://api.telegram.org";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Deserialize)]
struct ApiResponse {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
}

/// Sends slide images to a single Telegram chat via `sendPhoto`.
pub struct TelegramChannel {
    client: Client,
    endpoint: String,
    chat_id: i64,
}

impl TelegramChannel {
    pub fn new(token: &str, chat_id: i64) -> Result<Self> {
        Self::with_base_url(API_BASE, token, chat_id)
    }

    pub fn with_base_url(base_url: &str, token: &str, chat_id: i64) -> Result<Self> {
        if token.trim().is_empty() {
            bail!("telegram bot token is empty");
        }
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            client,
            endpoint: format!("{}/bot{}/sendPhoto", base_url.trim_end_matches('/'), token),
            chat_id,
        })
    }
}

#[async_trait]
impl DeliveryChannel for TelegramChannel {
    async fn deliver(&self, artifact: &Path, caption: &str) -> Result<()> {
        let bytes = tokio::fs::read(artifact)
            .await
            .with_context(|| format!("failed to read {}", artifact.display()))?;
        let file_name = artifact
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "slide.jpg".to_string());

        let photo = Part::bytes(bytes)
            .file_name(file_name)
            .mime_str("image/jpeg")
            .context("invalid photo mime type")?;
        let form = Form::new()
            .text("chat_id", self.chat_id.to_string())
            .text("caption", caption.to_string())
            .part("photo", photo);

        let response = self
            .client
            .post(&self.endpoint)
            .multipart(form)
            .send()
            .await
            .context("telegram sendPhoto request failed")?;

        let status = response.status();
        let body: ApiResponse = response
            .json()
            .await
            .with_context(|| format!("unreadable telegram response (HTTP {status})"))?;

        if !status.is_success() || !body.ok {
            bail!(
                "telegram sendPhoto failed (HTTP {}): {}",
                status,
                body.description.unwrap_or_else(|| "no description".into())
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_token_is_rejected() {
        assert!(TelegramChannel::new("  ", 42).is_err());
    }

    #[test]
    fn endpoint_embeds_token() {
        let channel = TelegramChannel::with_base_url("http://localhost:1/", "123:abc", 42).unwrap();
        assert_eq!(channel.endpoint, "http://localhost:1/bot123:abc/sendPhoto");
    }

    #[test]
    fn error_response_parses_description() {
        let body: ApiResponse =
            serde_json::from_str(r#"{"ok":false,"error_code":400,"description":"chat not found"}"#)
                .unwrap();
        assert!(!body.ok);
        assert_eq!(body.description.as_deref(), Some("chat not found"));
    }
}
