//! Webhook client
//!
//! Serializes a message plus trailing chat history (and an optional
//! screenshot) to JSON, POSTs it to the configured webhook endpoint, and
//! resolves the reply. The webhook may answer with a JSON object carrying
//! a `message` or `answer` field, some other JSON value, or plain text;
//! all four shapes resolve to a reply string.

use crate::config::WebhookConfig;
use crate::error::{ChathookError, Result};
use crate::storage::Message;
use chrono::Utc;
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;
use url::Url;

/// Assistant reply resolved from a webhook response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    /// Reply text to display and store
    pub reply: String,
}

/// Outbound request body
#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    message: &'a str,

    #[serde(rename = "chatId")]
    chat_id: &'a str,

    #[serde(rename = "chatHistory")]
    chat_history: &'a [Message],

    /// Omitted entirely when capture produced nothing
    #[serde(skip_serializing_if = "Option::is_none")]
    screenshot: Option<ScreenshotPayload>,
}

/// Screenshot attachment in the outbound request
#[derive(Debug, Serialize)]
struct ScreenshotPayload {
    #[serde(rename = "type")]
    content_type: &'static str,
    data: String,
    filename: String,
}

impl ScreenshotPayload {
    fn new(data: String) -> Self {
        Self {
            content_type: "image/png",
            data,
            filename: format!("screenshot-{}.png", Utc::now().timestamp_millis()),
        }
    }
}

/// HTTP client for the external webhook endpoint
pub struct WebhookClient {
    client: Client,
    url: Url,
    retry_attempts: u32,
}

impl WebhookClient {
    /// Build a client from webhook configuration
    ///
    /// The request timeout is enforced by the underlying HTTP client.
    pub fn new(config: &WebhookConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .user_agent(concat!("chathook/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ChathookError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            url: config.url.clone(),
            retry_attempts: config.retry_attempts.max(1),
        })
    }

    /// Send a message using the configured retry policy
    ///
    /// With `retry_attempts` of 1 this is a single send; higher values
    /// retry with exponential backoff. Callers that must never fail wrap
    /// the returned error into an inline reply themselves.
    pub async fn send_message(
        &self,
        message: &str,
        chat_id: &str,
        history: &[Message],
        screenshot: Option<String>,
    ) -> Result<Reply> {
        if self.retry_attempts > 1 {
            self.send_with_retry(message, chat_id, history, screenshot, self.retry_attempts)
                .await
        } else {
            self.send(message, chat_id, history, screenshot).await
        }
    }

    /// Perform one POST and resolve the reply
    ///
    /// # Errors
    ///
    /// Non-success HTTP statuses raise [`ChathookError::WebhookStatus`]
    /// carrying the status code; transport failures raise
    /// [`ChathookError::Http`].
    pub async fn send(
        &self,
        message: &str,
        chat_id: &str,
        history: &[Message],
        screenshot: Option<String>,
    ) -> Result<Reply> {
        let body = ChatRequest {
            message,
            chat_id,
            chat_history: history,
            screenshot: screenshot.map(ScreenshotPayload::new),
        };

        tracing::debug!(
            "POST {} ({} history messages, screenshot: {})",
            self.url,
            history.len(),
            body.screenshot.is_some()
        );

        let response = self
            .client
            .post(self.url.clone())
            .json(&body)
            .send()
            .await
            .map_err(ChathookError::Http)?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ChathookError::WebhookStatus {
                status: status.as_u16(),
                message,
            }
            .into());
        }

        let text = response.text().await.map_err(ChathookError::Http)?;
        Ok(Reply {
            reply: resolve_reply(&text),
        })
    }

    /// Send with bounded retry and exponential backoff
    ///
    /// Waits `2^attempt` seconds between attempts. The final error names
    /// the attempt count and carries the root cause.
    pub async fn send_with_retry(
        &self,
        message: &str,
        chat_id: &str,
        history: &[Message],
        screenshot: Option<String>,
        attempts: u32,
    ) -> Result<Reply> {
        let attempts = attempts.max(1);
        for attempt in 1..=attempts {
            match self.send(message, chat_id, history, screenshot.clone()).await {
                Ok(reply) => return Ok(reply),
                Err(e) if attempt == attempts => {
                    let source = match e.downcast::<ChathookError>() {
                        Ok(err) => err,
                        Err(other) => ChathookError::Config(other.to_string()),
                    };
                    return Err(ChathookError::WebhookRetriesExhausted {
                        attempts,
                        source: Box::new(source),
                    }
                    .into());
                }
                Err(e) => {
                    tracing::warn!("Attempt {}/{} failed: {}", attempt, attempts, e);
                    tokio::time::sleep(backoff_delay(attempt)).await;
                }
            }
        }
        unreachable!("retry loop always returns on the final attempt")
    }
}

/// Backoff delay before the next attempt: 2^attempt seconds
fn backoff_delay(attempt: u32) -> Duration {
    Duration::from_secs(2u64.saturating_pow(attempt))
}

/// Resolve a reply string from a raw webhook response body
///
/// JSON objects prefer `message`, then `answer`, taking the field's value
/// whatever its type; non-string values are rendered back to compact JSON.
/// Null and empty-string fields fall through to the next candidate. Bodies
/// that are not JSON are the reply verbatim.
fn resolve_reply(body: &str) -> String {
    let parsed: serde_json::Value = match serde_json::from_str(body) {
        Ok(value) => value,
        Err(_) => return body.to_string(),
    };

    for field in ["message", "answer"] {
        match parsed.get(field) {
            Some(serde_json::Value::Null) => continue,
            Some(serde_json::Value::String(s)) if s.is_empty() => continue,
            Some(serde_json::Value::String(s)) => return s.clone(),
            Some(other) => return other.to_string(),
            None => continue,
        }
    }

    match parsed {
        serde_json::Value::String(s) => s,
        other => other.to_string(),
    }
}
