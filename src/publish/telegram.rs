// src/publish/telegram.rs
//! Telegram Bot API publisher (`sendMessage` to a channel).

use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::{format_message, Publisher};
use crate::logging::fingerprint;
use crate::model::EnrichedItem;

const API_BASE: &str = "https://api.telegram.org";
/// Back-off doubles per attempt up to 500ms << 10 (about 8.5 minutes).
const MAX_BACKOFF_SHIFT: u8 = 10;

fn retry_delay(attempt: u8) -> Duration {
    let shift = attempt.saturating_sub(1).min(MAX_BACKOFF_SHIFT);
    Duration::from_millis(500u64 << shift)
}

#[derive(Clone)]
pub struct TelegramPublisher {
    token: String,
    channel_id: String,
    api_base: String,
    client: Client,
    timeout: Duration,
    max_retries: u8,
}

#[derive(Serialize)]
struct SendMessage<'a> {
    chat_id: &'a str,
    text: &'a str,
    disable_web_page_preview: bool,
}

#[derive(Deserialize)]
struct ApiResponse {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    result: Option<SentMessage>,
}

#[derive(Deserialize)]
struct SentMessage {
    message_id: i64,
}

impl TelegramPublisher {
    pub fn new(token: String, channel_id: String) -> Self {
        Self {
            token,
            channel_id,
            api_base: API_BASE.to_string(),
            client: Client::new(),
            timeout: Duration::from_secs(10),
            max_retries: 3,
        }
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout = Duration::from_secs(secs);
        self
    }

    pub fn with_retries(mut self, retries: u8) -> Self {
        self.max_retries = retries.max(1);
        self
    }

    /// Point at a different API host (self-hosted Bot API server).
    pub fn with_api_base(mut self, base: impl Into<String>) -> Self {
        self.api_base = base.into().trim_end_matches('/').to_string();
        self
    }

    async fn send_once(&self, text: &str) -> Result<String> {
        let url = format!("{}/bot{}/sendMessage", self.api_base, self.token);
        let rsp = self
            .client
            .post(&url)
            .timeout(self.timeout)
            .json(&SendMessage {
                chat_id: &self.channel_id,
                text,
                disable_web_page_preview: false,
            })
            .send()
            .await?;
        let status = rsp.status();
        let body: ApiResponse = rsp.json().await?;
        match (body.ok, body.result) {
            (true, Some(m)) => Ok(m.message_id.to_string()),
            (true, None) => Err(anyhow!("telegram returned ok without a message")),
            (false, _) => Err(anyhow!(
                "telegram HTTP {status}: {}",
                body.description.unwrap_or_default()
            )),
        }
    }
}

#[async_trait]
impl Publisher for TelegramPublisher {
    async fn publish_to_channel(&self, item: &EnrichedItem) -> Result<String> {
        let text = if item.formatted.trim().is_empty() {
            format_message(item)
        } else {
            item.formatted.clone()
        };

        let mut attempt: u8 = 0;
        loop {
            attempt += 1;
            match self.send_once(&text).await {
                Ok(id) => return Ok(id),
                Err(e) if attempt < self.max_retries => {
                    warn!(
                        target: "publish",
                        id = %fingerprint(item.url()),
                        attempt,
                        error = %e,
                        "telegram send failed; retrying"
                    );
                    tokio::time::sleep(retry_delay(attempt)).await;
                }
                Err(e) => return Err(e.context("telegram sendMessage")),
            }
        }
    }

    fn name(&self) -> &'static str {
        "telegram"
    }
}
