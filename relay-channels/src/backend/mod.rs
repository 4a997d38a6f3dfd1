//! Language-model backend abstraction.
//!
//! The session engine only needs one operation: send a prompt, optionally
//! continuing an earlier exchange, and get the reply plus the ids that let
//! the next turn continue from it.

mod chatgpt;

pub use chatgpt::ChatGptBackend;

use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;

/// Called with the accumulated partial reply while a response streams in.
pub type ProgressCallback = Arc<dyn Fn(&str) + Send + Sync>;

/// Continuation context and hooks for one backend call.
#[derive(Clone, Default)]
pub struct ConverseOptions {
    /// Conversation to continue; a new one is started when absent
    pub conversation_id: Option<String>,
    /// Reply this prompt follows up on
    pub parent_message_id: Option<String>,
    pub on_progress: Option<ProgressCallback>,
}

impl fmt::Debug for ConverseOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConverseOptions")
            .field("conversation_id", &self.conversation_id)
            .field("parent_message_id", &self.parent_message_id)
            .field("on_progress", &self.on_progress.is_some())
            .finish()
    }
}

/// Successful backend reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendReply {
    pub text: String,
    pub conversation_id: String,
    /// Id of this reply; the parent for the next turn
    pub id: String,
}

/// Failed backend call.
///
/// `status_code` is absent when the request never produced an HTTP response
/// (connection refused, broken stream, ...).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{}", self.describe())]
pub struct BackendError {
    pub status_code: Option<u16>,
    pub status_text: String,
}

impl BackendError {
    pub fn http(status_code: u16, status_text: impl Into<String>) -> Self {
        Self {
            status_code: Some(status_code),
            status_text: status_text.into(),
        }
    }

    pub fn transport(reason: impl Into<String>) -> Self {
        Self {
            status_code: None,
            status_text: reason.into(),
        }
    }

    fn describe(&self) -> String {
        match self.status_code {
            Some(code) => format!("{} {}", code, self.status_text),
            None => self.status_text.clone(),
        }
    }
}

/// A conversational language-model backend.
#[async_trait]
pub trait Backend: Send + Sync {
    async fn converse(
        &self,
        prompt: &str,
        options: ConverseOptions,
    ) -> Result<BackendReply, BackendError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_error_display_has_code_and_text() {
        let err = BackendError::http(429, "Too Many Requests");
        assert_eq!(err.to_string(), "429 Too Many Requests");
    }

    #[test]
    fn transport_error_display_is_reason_only() {
        let err = BackendError::transport("connection refused");
        assert_eq!(err.status_code, None);
        assert_eq!(err.to_string(), "connection refused");
    }

    #[test]
    fn options_debug_hides_callback() {
        let options = ConverseOptions {
            conversation_id: Some("c1".into()),
            parent_message_id: None,
            on_progress: Some(Arc::new(|_: &str| {})),
        };
        let debug = format!("{options:?}");
        assert!(debug.contains("c1"));
        assert!(debug.contains("on_progress: true"));
    }
}
