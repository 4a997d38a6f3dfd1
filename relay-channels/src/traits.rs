//! Channel traits for implementing transport adapters.

use crate::message::{ChannelMessage, ChatAction};
use async_trait::async_trait;
use tokio::sync::mpsc;

/// Result type for channel operations.
pub type ChannelResult<T> = Result<T, ChannelError>;

/// Channel error type.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Rate limited: retry after {retry_after_secs} seconds")]
    RateLimited { retry_after_secs: u64 },

    #[error("Message send failed: {0}")]
    SendFailed(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Outbound half of a transport: what the session engine needs.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send a text message to a chat.
    async fn deliver(&self, chat_id: &str, text: &str) -> ChannelResult<()>;

    /// Show a transient indicator (e.g. "typing") in a chat.
    async fn signal_activity(&self, chat_id: &str, action: ChatAction) -> ChannelResult<()>;
}

/// Full channel adapter.
///
/// Implement this trait to add support for a new messaging platform.
#[async_trait]
pub trait Channel: Transport {
    /// Get the channel name.
    fn name(&self) -> &'static str;

    /// Verify credentials / connectivity before listening.
    async fn init(&self) -> ChannelResult<()>;

    /// Receive messages until the source closes, pushing each into `tx`.
    async fn listen(&self, tx: mpsc::Sender<ChannelMessage>) -> ChannelResult<()>;

    /// Shutdown the channel gracefully.
    async fn shutdown(&self) -> ChannelResult<()> {
        Ok(())
    }
}
