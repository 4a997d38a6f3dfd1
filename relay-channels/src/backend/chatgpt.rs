//! ChatGPT backend over an OpenAI-compatible chat-completions API.
//!
//! The API itself is stateless, so threading lives here: every prompt and
//! reply is kept in an in-memory message store with a pointer to its parent.
//! A follow-up names its parent reply and the history is rebuilt by walking
//! parents back toward the start of the conversation.

use super::{Backend, BackendError, BackendReply, ConverseOptions};
use async_trait::async_trait;
use dashmap::DashMap;
use futures_util::StreamExt;
use relay_common::config::BackendConfig;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

// ============================================================================
// Wire Types
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize)]
struct WireMessage {
    role: Role,
    content: String,
}

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage>,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct CompletionChunk {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    choices: Vec<ChunkChoice>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: ChunkDelta,
}

#[derive(Debug, Default, Deserialize)]
struct ChunkDelta {
    #[serde(default)]
    content: Option<String>,
}

// ============================================================================
// Message Store
// ============================================================================

#[derive(Debug, Clone)]
struct StoredMessage {
    role: Role,
    text: String,
    parent_id: Option<String>,
}

// ============================================================================
// Backend
// ============================================================================

/// Streaming chat-completions client with per-conversation history.
pub struct ChatGptBackend {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    system_message: Option<String>,
    max_history: usize,
    messages: DashMap<String, StoredMessage>,
    /// Message ids oldest first; the store is trimmed to `message_capacity`
    insertion_order: Mutex<VecDeque<String>>,
    message_capacity: usize,
}

impl ChatGptBackend {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            model: model.into(),
            system_message: None,
            max_history: 20,
            messages: DashMap::new(),
            insertion_order: Mutex::new(VecDeque::new()),
            message_capacity: 1000,
        }
    }

    pub fn from_config(config: &BackendConfig) -> Self {
        let mut backend = Self::new(
            config.base_url.clone(),
            config.api_key.clone().unwrap_or_default(),
            config.model.clone(),
        )
        .with_max_history(config.max_history)
        .with_message_capacity(config.max_stored_messages);
        backend.system_message = config.system_message.clone();
        backend
    }

    pub fn with_system_message(mut self, message: impl Into<String>) -> Self {
        self.system_message = Some(message.into());
        self
    }

    pub fn with_max_history(mut self, max_history: usize) -> Self {
        self.max_history = max_history;
        self
    }

    /// Cap on remembered prompts and replies across all conversations.
    pub fn with_message_capacity(mut self, capacity: usize) -> Self {
        self.message_capacity = capacity.max(2);
        self
    }

    /// Number of prompts and replies currently remembered.
    pub fn stored_messages(&self) -> usize {
        self.messages.len()
    }

    /// Store a message, evicting the oldest ones past the capacity.
    fn remember(&self, id: String, message: StoredMessage) {
        let mut order = self
            .insertion_order
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        if self.messages.insert(id.clone(), message).is_none() {
            order.push_back(id);
        }
        while order.len() > self.message_capacity {
            if let Some(oldest) = order.pop_front() {
                self.messages.remove(&oldest);
            }
        }
    }

    /// Prior turns ending at `parent_id`, oldest first.
    fn history(&self, parent_id: Option<&str>) -> Vec<WireMessage> {
        let mut history = Vec::new();
        let mut cursor = parent_id.map(String::from);

        while let Some(id) = cursor {
            if history.len() >= self.max_history {
                break;
            }
            let Some(stored) = self.messages.get(&id).map(|m| m.value().clone()) else {
                tracing::debug!(message_id = %id, "Parent message not in store, truncating history");
                break;
            };
            history.push(WireMessage {
                role: stored.role,
                content: stored.text,
            });
            cursor = stored.parent_id;
        }

        history.reverse();
        history
    }

    fn build_messages(&self, prompt: &str, parent_id: Option<&str>) -> Vec<WireMessage> {
        let mut messages = Vec::new();
        if let Some(ref system) = self.system_message {
            messages.push(WireMessage {
                role: Role::System,
                content: system.clone(),
            });
        }
        messages.extend(self.history(parent_id));
        messages.push(WireMessage {
            role: Role::User,
            content: prompt.to_string(),
        });
        messages
    }

    /// Read the SSE body, reporting the accumulated text after each delta.
    async fn read_stream(
        &self,
        response: reqwest::Response,
        options: &ConverseOptions,
    ) -> Result<(String, Option<String>), BackendError> {
        let mut stream = response.bytes_stream();
        let mut buffer = SseBuffer::default();
        let mut text = String::new();
        let mut completion_id = None;

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| BackendError::transport(e.to_string()))?;
            buffer.push(&chunk);

            while let Some(event) = buffer.next_event() {
                match parse_sse_event(&event) {
                    SseEvent::Done => return Ok((text, completion_id)),
                    SseEvent::Chunk(chunk) => {
                        if completion_id.is_none() {
                            completion_id = chunk.id;
                        }
                        let delta: String = chunk
                            .choices
                            .into_iter()
                            .filter_map(|c| c.delta.content)
                            .collect();
                        if delta.is_empty() {
                            continue;
                        }
                        text.push_str(&delta);
                        if let Some(ref on_progress) = options.on_progress {
                            on_progress(&text);
                        }
                    }
                    SseEvent::Ignored => {}
                }
            }
        }

        Ok((text, completion_id))
    }
}

/// Raw SSE bytes waiting for a blank-line terminator.
///
/// Network chunks can end in the middle of a UTF-8 sequence, so bytes are
/// only decoded once a whole event has arrived.
#[derive(Debug, Default)]
struct SseBuffer {
    bytes: Vec<u8>,
}

impl SseBuffer {
    fn push(&mut self, chunk: &[u8]) {
        self.bytes.extend_from_slice(chunk);
    }

    fn next_event(&mut self) -> Option<String> {
        let pos = self.bytes.windows(2).position(|w| w == b"\n\n")?;
        let event: Vec<u8> = self.bytes.drain(..pos + 2).take(pos).collect();
        Some(String::from_utf8_lossy(&event).into_owned())
    }
}

enum SseEvent {
    Chunk(CompletionChunk),
    Done,
    Ignored,
}

fn parse_sse_event(event: &str) -> SseEvent {
    let data: Vec<&str> = event
        .lines()
        .filter_map(|line| line.strip_prefix("data:"))
        .map(str::trim)
        .collect();
    if data.is_empty() {
        return SseEvent::Ignored;
    }

    let payload = data.join("\n");
    if payload == "[DONE]" {
        return SseEvent::Done;
    }

    match serde_json::from_str::<CompletionChunk>(&payload) {
        Ok(chunk) => SseEvent::Chunk(chunk),
        Err(e) => {
            tracing::warn!(error = %e, "Skipping unparseable completion chunk");
            SseEvent::Ignored
        }
    }
}

#[async_trait]
impl Backend for ChatGptBackend {
    async fn converse(
        &self,
        prompt: &str,
        options: ConverseOptions,
    ) -> Result<BackendReply, BackendError> {
        let conversation_id = options
            .conversation_id
            .clone()
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let parent_id = options.parent_message_id.as_deref();

        let request = CompletionRequest {
            model: &self.model,
            messages: self.build_messages(prompt, parent_id),
            stream: true,
        };

        let url = format!("{}/chat/completions", self.base_url);
        tracing::debug!(
            endpoint = %url,
            conversation_id = %conversation_id,
            history = request.messages.len() - 1,
            "Calling chat completions API"
        );

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| BackendError::transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(status = %status, body = %body, "Chat completions API error");
            return Err(BackendError::http(
                status.as_u16(),
                status.canonical_reason().unwrap_or_default(),
            ));
        }

        let (text, completion_id) = self.read_stream(response, &options).await?;

        let user_message_id = uuid::Uuid::new_v4().to_string();
        self.remember(
            user_message_id.clone(),
            StoredMessage {
                role: Role::User,
                text: prompt.to_string(),
                parent_id: options.parent_message_id.clone(),
            },
        );

        let reply_id = completion_id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let text = text.trim().to_string();
        self.remember(
            reply_id.clone(),
            StoredMessage {
                role: Role::Assistant,
                text: text.clone(),
                parent_id: Some(user_message_id),
            },
        );

        Ok(BackendReply {
            text,
            conversation_id,
            id: reply_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sse_buffer_waits_for_split_multibyte_char() {
        let event = "data: {\"choices\":[{\"delta\":{\"content\":\"héllo\"}}]}\n\n".as_bytes();
        let split = event.iter().position(|b| *b == 0xC3).unwrap() + 1;

        let mut buffer = SseBuffer::default();
        buffer.push(&event[..split]);
        assert!(buffer.next_event().is_none());
        buffer.push(&event[split..]);

        let decoded = buffer.next_event().unwrap();
        assert!(decoded.contains("héllo"));
        assert!(!decoded.contains('\u{FFFD}'));
        assert!(buffer.next_event().is_none());
    }

    #[test]
    fn sse_buffer_yields_events_in_order() {
        let mut buffer = SseBuffer::default();
        buffer.push(b"data: a\n\ndata: b\n\ndata: c");
        assert_eq!(buffer.next_event().as_deref(), Some("data: a"));
        assert_eq!(buffer.next_event().as_deref(), Some("data: b"));
        assert!(buffer.next_event().is_none());
    }

    #[test]
    fn message_store_is_capped() {
        let backend = ChatGptBackend::new("http://localhost", "k", "m").with_message_capacity(4);
        for i in 0..6 {
            backend.remember(
                format!("m{i}"),
                StoredMessage { role: Role::User, text: format!("t{i}"), parent_id: None },
            );
        }

        assert_eq!(backend.stored_messages(), 4);
        assert!(backend.messages.get("m0").is_none());
        assert!(backend.messages.get("m1").is_none());
        assert!(backend.messages.get("m5").is_some());
    }

    #[test]
    fn parse_done_event() {
        assert!(matches!(parse_sse_event("data: [DONE]"), SseEvent::Done));
    }

    #[test]
    fn parse_content_chunk() {
        let event = r#"data: {"id":"chatcmpl-1","choices":[{"delta":{"content":"Hi"}}]}"#;
        match parse_sse_event(event) {
            SseEvent::Chunk(chunk) => {
                assert_eq!(chunk.id.as_deref(), Some("chatcmpl-1"));
                assert_eq!(chunk.choices[0].delta.content.as_deref(), Some("Hi"));
            }
            _ => panic!("expected chunk"),
        }
    }

    #[test]
    fn parse_role_only_chunk() {
        let event = r#"data: {"id":"x","choices":[{"delta":{"role":"assistant"}}]}"#;
        match parse_sse_event(event) {
            SseEvent::Chunk(chunk) => assert!(chunk.choices[0].delta.content.is_none()),
            _ => panic!("expected chunk"),
        }
    }

    #[test]
    fn parse_comment_is_ignored() {
        assert!(matches!(parse_sse_event(": keep-alive"), SseEvent::Ignored));
        assert!(matches!(parse_sse_event("data: {oops"), SseEvent::Ignored));
    }

    #[test]
    fn history_walks_parents_in_order() {
        let backend = ChatGptBackend::new("http://localhost", "k", "m");
        backend.messages.insert(
            "u1".into(),
            StoredMessage { role: Role::User, text: "hello".into(), parent_id: None },
        );
        backend.messages.insert(
            "a1".into(),
            StoredMessage { role: Role::Assistant, text: "hi".into(), parent_id: Some("u1".into()) },
        );

        let messages = backend
            .with_system_message("be brief")
            .build_messages("again", Some("a1"));
        let contents: Vec<_> = messages.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["be brief", "hello", "hi", "again"]);
        assert_eq!(messages[0].role, Role::System);
        assert_eq!(messages[3].role, Role::User);
    }

    #[test]
    fn history_is_bounded() {
        let backend = ChatGptBackend::new("http://localhost", "k", "m").with_max_history(1);
        backend.messages.insert(
            "u1".into(),
            StoredMessage { role: Role::User, text: "hello".into(), parent_id: None },
        );
        backend.messages.insert(
            "a1".into(),
            StoredMessage { role: Role::Assistant, text: "hi".into(), parent_id: Some("u1".into()) },
        );

        let messages = backend.build_messages("again", Some("a1"));
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].content, "hi");
    }

    #[test]
    fn unknown_parent_starts_fresh() {
        let backend = ChatGptBackend::new("http://localhost/", "k", "m");
        assert_eq!(backend.base_url, "http://localhost");
        let messages = backend.build_messages("hello", Some("missing"));
        assert_eq!(messages.len(), 1);
    }
}
