//! Telegram channel adapter.
//!
//! Long-polls the Bot API for updates and sends replies and chat actions
//! back through it.

use crate::message::{ChannelMessage, ChannelType, ChatAction};
use crate::traits::{Channel, ChannelError, ChannelResult, Transport};
use async_trait::async_trait;
use std::time::Duration;
use tokio::sync::mpsc;

/// Telegram rejects messages longer than this.
const MAX_MESSAGE_LEN: usize = 4096;

const DEFAULT_API_BASE: &str = "https://api.telegram.org";

/// Telegram channel - long-polls the Bot API for updates.
pub struct TelegramChannel {
    bot_token: String,
    api_base: String,
    poll_timeout_secs: u64,
    client: reqwest::Client,
}

impl TelegramChannel {
    /// Create a new Telegram channel.
    pub fn new(bot_token: impl Into<String>) -> Self {
        Self {
            bot_token: bot_token.into(),
            api_base: DEFAULT_API_BASE.to_string(),
            poll_timeout_secs: 30,
            client: reqwest::Client::new(),
        }
    }

    /// Point the adapter at a different Bot API server.
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_poll_timeout(mut self, secs: u64) -> Self {
        self.poll_timeout_secs = secs;
        self
    }

    fn api_url(&self, method: &str) -> String {
        format!("{}/bot{}/{method}", self.api_base, self.bot_token)
    }

    async fn post(&self, method: &str, body: &serde_json::Value) -> ChannelResult<serde_json::Value> {
        let resp = self
            .client
            .post(self.api_url(method))
            .json(body)
            .send()
            .await
            .map_err(|e| ChannelError::Connection(e.to_string()))?;

        let status = resp.status();
        if status.is_success() {
            return resp
                .json()
                .await
                .map_err(|e| ChannelError::Internal(format!("Bad {method} response: {e}")));
        }

        let error_body: serde_json::Value = resp.json().await.unwrap_or_default();
        if status.as_u16() == 429 {
            let retry_after_secs = error_body
                .get("parameters")
                .and_then(|p| p.get("retry_after"))
                .and_then(serde_json::Value::as_u64)
                .unwrap_or(1);
            return Err(ChannelError::RateLimited { retry_after_secs });
        }

        let description = error_body
            .get("description")
            .and_then(|d| d.as_str())
            .unwrap_or_else(|| status.canonical_reason().unwrap_or("unknown error"));
        Err(ChannelError::SendFailed(format!(
            "Telegram {method} failed: {description}"
        )))
    }
}

/// Split a message into chunks that fit within Telegram's limit.
///
/// Prefers paragraph, line, sentence and word boundaries, in that order.
fn split_message(message: &str, max_len: usize) -> Vec<String> {
    if message.len() <= max_len {
        return vec![message.to_string()];
    }

    let mut chunks = Vec::new();
    let mut remaining = message;

    while !remaining.is_empty() {
        if remaining.len() <= max_len {
            chunks.push(remaining.to_string());
            break;
        }

        let mut limit = max_len;
        while !remaining.is_char_boundary(limit) {
            limit -= 1;
        }

        let chunk = &remaining[..limit];
        let split_pos = chunk
            .rfind("\n\n")
            .or_else(|| chunk.rfind('\n'))
            .or_else(|| chunk.rfind(". ").map(|p| p + 1))
            .or_else(|| chunk.rfind(' '))
            .unwrap_or(limit);

        let actual_split = if split_pos == 0 { limit } else { split_pos };

        chunks.push(remaining[..actual_split].to_string());
        remaining = remaining[actual_split..].trim_start();
    }

    chunks
}

/// Turn one `getUpdates` entry into a message.
///
/// Updates without a sender or chat (channel posts, service events) are
/// skipped. Non-text messages become empty text.
fn parse_update(update: &serde_json::Value) -> Option<ChannelMessage> {
    let message = update.get("message")?;

    let chat_id = message.get("chat")?.get("id")?.as_i64()?.to_string();
    let user_id = message.get("from")?.get("id")?.as_i64()?.to_string();
    let text = message
        .get("text")
        .and_then(|t| t.as_str())
        .unwrap_or_default();

    Some(ChannelMessage::new(ChannelType::Telegram, chat_id, user_id, text))
}

#[async_trait]
impl Transport for TelegramChannel {
    async fn deliver(&self, chat_id: &str, text: &str) -> ChannelResult<()> {
        for chunk in split_message(text, MAX_MESSAGE_LEN) {
            let body = serde_json::json!({
                "chat_id": chat_id,
                "text": chunk,
            });
            self.post("sendMessage", &body).await?;
        }
        Ok(())
    }

    async fn signal_activity(&self, chat_id: &str, action: ChatAction) -> ChannelResult<()> {
        let body = serde_json::json!({
            "chat_id": chat_id,
            "action": action.as_str(),
        });
        self.post("sendChatAction", &body).await?;
        Ok(())
    }
}

#[async_trait]
impl Channel for TelegramChannel {
    fn name(&self) -> &'static str {
        "telegram"
    }

    async fn init(&self) -> ChannelResult<()> {
        let resp = self
            .client
            .get(self.api_url("getMe"))
            .send()
            .await
            .map_err(|e| ChannelError::Connection(e.to_string()))?;

        if !resp.status().is_success() {
            let err = resp.text().await.unwrap_or_default();
            return Err(ChannelError::Auth(format!("Invalid bot token: {err}")));
        }

        tracing::info!("Telegram channel initialized");
        Ok(())
    }

    async fn listen(&self, tx: mpsc::Sender<ChannelMessage>) -> ChannelResult<()> {
        let mut offset: i64 = 0;

        tracing::info!("Telegram channel listening for messages...");

        loop {
            let body = serde_json::json!({
                "offset": offset,
                "timeout": self.poll_timeout_secs,
                "allowed_updates": ["message"]
            });

            let data = match self.post("getUpdates", &body).await {
                Ok(d) => d,
                Err(e) => {
                    tracing::warn!("Telegram poll error: {e}");
                    tokio::time::sleep(Duration::from_secs(5)).await;
                    continue;
                }
            };

            let Some(results) = data.get("result").and_then(serde_json::Value::as_array) else {
                continue;
            };

            for update in results {
                if let Some(uid) = update.get("update_id").and_then(serde_json::Value::as_i64) {
                    offset = uid + 1;
                }

                let Some(msg) = parse_update(update) else {
                    continue;
                };

                tracing::info!(
                    channel = "telegram",
                    user_id = %msg.user_id,
                    chat_id = %msg.chat_id,
                    "IM message received"
                );

                if tx.send(msg).await.is_err() {
                    tracing::info!("Message receiver closed, stopping Telegram listener");
                    return Ok(());
                }
            }
        }
    }

    async fn shutdown(&self) -> ChannelResult<()> {
        tracing::info!("Telegram channel shutting down");
        Ok(())
    }
}
