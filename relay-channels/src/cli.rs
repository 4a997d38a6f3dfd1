//! CLI channel adapter for interactive terminal sessions.
//!
//! One local user talks to the backend over stdin/stdout. Useful for
//! trying a backend configuration without a bot token.

use crate::message::{ChannelMessage, ChannelType, ChatAction};
use crate::traits::{Channel, ChannelResult, Transport};
use async_trait::async_trait;
use tokio::io::{self, AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

/// Chat and user id of the terminal user.
pub const CLI_USER: &str = "cli";

/// CLI channel - stdin/stdout, always available.
pub struct CliChannel;

impl CliChannel {
    /// Create a new CLI channel.
    pub const fn new() -> Self {
        Self
    }

    /// Read lines from `reader` until EOF or `/quit`.
    pub async fn listen_from<R>(&self, reader: R, tx: mpsc::Sender<ChannelMessage>) -> ChannelResult<()>
    where
        R: AsyncBufRead + Unpin + Send,
    {
        let mut lines = reader.lines();

        while let Ok(Some(line)) = lines.next_line().await {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            if line == "/quit" || line == "/exit" {
                break;
            }

            let msg = ChannelMessage::new(ChannelType::Cli, CLI_USER, CLI_USER, line);
            if tx.send(msg).await.is_err() {
                break;
            }
        }
        Ok(())
    }
}

impl Default for CliChannel {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for CliChannel {
    async fn deliver(&self, _chat_id: &str, text: &str) -> ChannelResult<()> {
        println!("{text}");
        Ok(())
    }

    async fn signal_activity(&self, chat_id: &str, action: ChatAction) -> ChannelResult<()> {
        tracing::debug!(chat_id = %chat_id, action = action.as_str(), "CLI activity");
        Ok(())
    }
}

#[async_trait]
impl Channel for CliChannel {
    fn name(&self) -> &'static str {
        "cli"
    }

    async fn init(&self) -> ChannelResult<()> {
        Ok(())
    }

    async fn listen(&self, tx: mpsc::Sender<ChannelMessage>) -> ChannelResult<()> {
        self.listen_from(BufReader::new(io::stdin()), tx).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_channel_name() {
        assert_eq!(CliChannel::new().name(), "cli");
    }

    #[tokio::test]
    async fn cli_channel_lifecycle() {
        let ch = CliChannel::default();
        tokio_test::assert_ok!(ch.init().await);
        tokio_test::assert_ok!(ch.shutdown().await);
        tokio_test::assert_ok!(ch.signal_activity(CLI_USER, ChatAction::Typing).await);
    }

    #[tokio::test]
    async fn listen_from_skips_blank_lines_and_stops_at_quit() {
        let input: &[u8] = b"hello\n\n  \n/reset\n/quit\nignored\n";
        let (tx, mut rx) = mpsc::channel(8);

        CliChannel::new().listen_from(input, tx).await.unwrap();

        let first = rx.recv().await.unwrap();
        assert_eq!(first.text, "hello");
        assert_eq!(first.user_id, CLI_USER);
        assert_eq!(first.channel_type, ChannelType::Cli);
        assert_eq!(rx.recv().await.unwrap().text, "/reset");
        assert!(rx.recv().await.is_none());
    }
}
