//! Session orchestrator: one unit of work per inbound message.
//!
//! Steps, each of which may end the unit of work with a reply:
//! 1. Authorize the sender
//! 2. Handle `/reset`
//! 3. Claim the user's single in-flight slot
//! 4. Call the backend with the stored continuation, typing indicators running
//! 5. Stop the indicators, record the new continuation and reply, or report the failure
//!
//! Nothing escapes a unit of work: backend errors, timeouts and panics all
//! end in a user-visible message, and the in-flight slot is always released.

use super::access::AccessPolicy;
use super::progress::{ProgressHandle, ProgressNotifier, DEFAULT_PROGRESS_INTERVAL};
use super::serializer::RequestSerializer;
use super::store::{Continuation, ConversationStore};
use crate::backend::{Backend, BackendError, BackendReply, ConverseOptions};
use crate::message::ChannelMessage;
use crate::traits::Transport;
use futures_util::FutureExt;
use relay_common::config::Config;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::Instrument;

pub const RESET_COMMAND: &str = "/reset";

pub const UNAUTHORIZED_NOTICE: &str = "Sorry, you are not authorised to use this bot.";
pub const RESET_NOTICE: &str = "Conversation reset. You may now begin a new conversation with me.";
pub const BUSY_NOTICE: &str = "ChatGPT is still processing your last message. Please wait for a response before sending another message.";
pub const GENERIC_FAILURE_NOTICE: &str =
    "Something went wrong while processing your message. Please try again.";

/// How a unit of work ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Unauthorized,
    Reset,
    Busy,
    Replied,
    BackendFailed(BackendError),
    TimedOut,
    /// Dispatch panicked
    Faulted,
}

#[derive(Debug)]
enum DispatchError {
    Backend(BackendError),
    TimedOut(Duration),
}

impl DispatchError {
    fn notice(&self) -> String {
        match self {
            Self::Backend(err) => format!("ChatGPT API Error: {err}"),
            Self::TimedOut(limit) => {
                format!("ChatGPT API Error: timed out after {}s", limit.as_secs())
            }
        }
    }
}

/// Owns all per-user state and runs inbound messages through it.
pub struct SessionOrchestrator {
    transport: Arc<dyn Transport>,
    backend: Arc<dyn Backend>,
    access: AccessPolicy,
    store: ConversationStore,
    serializer: RequestSerializer,
    progress_interval: Duration,
    timeout: Option<Duration>,
}

impl SessionOrchestrator {
    /// Create an orchestrator with the default throttle and no watchdog.
    pub fn new(
        transport: Arc<dyn Transport>,
        backend: Arc<dyn Backend>,
        access: AccessPolicy,
    ) -> Self {
        Self {
            transport,
            backend,
            access,
            store: ConversationStore::new(),
            serializer: RequestSerializer::new(),
            progress_interval: DEFAULT_PROGRESS_INTERVAL,
            timeout: None,
        }
    }

    pub fn from_config(
        transport: Arc<dyn Transport>,
        backend: Arc<dyn Backend>,
        config: &Config,
    ) -> Self {
        let timeout = match config.backend.timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        };

        Self::new(transport, backend, AccessPolicy::from_config(&config.access))
            .with_progress_interval(Duration::from_millis(config.progress.interval_ms))
            .with_timeout(timeout)
    }

    pub fn with_progress_interval(mut self, interval: Duration) -> Self {
        self.progress_interval = interval;
        self
    }

    /// Force-release a user whose backend call exceeds `timeout`.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn store(&self) -> &ConversationStore {
        &self.store
    }

    pub fn serializer(&self) -> &RequestSerializer {
        &self.serializer
    }

    /// Run one inbound message to completion.
    pub async fn handle(&self, message: &ChannelMessage) -> Outcome {
        let user_id = message.user_id.as_str();

        if !self.access.permits(user_id) {
            tracing::warn!(user_id = %user_id, "Rejecting message from unauthorized user");
            self.reply(message, UNAUTHORIZED_NOTICE).await;
            return Outcome::Unauthorized;
        }

        if message.text == RESET_COMMAND {
            let existed = self.store.clear(user_id);
            tracing::info!(user_id = %user_id, existed, "Conversation reset");
            self.reply(message, RESET_NOTICE).await;
            return Outcome::Reset;
        }

        let Some(guard) = self.serializer.try_admit(user_id) else {
            tracing::info!(user_id = %user_id, "Backend call already in flight, rejecting");
            self.reply(message, BUSY_NOTICE).await;
            return Outcome::Busy;
        };

        let (continuation, epoch) = self.store.snapshot(user_id);
        let notifier = ProgressNotifier::start(
            self.transport.clone(),
            message.chat_id.clone(),
            self.progress_interval,
        );

        let call = self.dispatch(message, continuation.as_ref(), notifier.handle());
        let result = AssertUnwindSafe(call).catch_unwind().await;

        // Indicators must be drained on every path, or one can land after the reply.
        notifier.finish().await;

        if let Ok(Ok(reply)) = &result {
            self.record(user_id, continuation, epoch, reply);
        }
        drop(guard);

        let (outcome, text) = match result {
            Ok(Ok(reply)) => (Outcome::Replied, reply.text),
            Ok(Err(err)) => {
                tracing::warn!(user_id = %user_id, error = ?err, "Backend call failed");
                let outcome = match err {
                    DispatchError::Backend(ref e) => Outcome::BackendFailed(e.clone()),
                    DispatchError::TimedOut(_) => Outcome::TimedOut,
                };
                (outcome, err.notice())
            }
            Err(panic) => {
                let reason = panic
                    .downcast_ref::<&str>()
                    .map(|s| (*s).to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                tracing::error!(user_id = %user_id, reason = %reason, "Message dispatch panicked");
                (Outcome::Faulted, GENERIC_FAILURE_NOTICE.to_string())
            }
        };

        self.reply(message, &text).await;
        outcome
    }

    async fn dispatch(
        &self,
        message: &ChannelMessage,
        continuation: Option<&Continuation>,
        progress: ProgressHandle,
    ) -> Result<BackendReply, DispatchError> {
        let options = ConverseOptions {
            conversation_id: continuation.map(|c| c.conversation_id.clone()),
            parent_message_id: continuation.map(|c| c.last_turn_id.clone()),
            on_progress: Some(Arc::new(move |_partial: &str| {
                progress.tick();
            })),
        };

        tracing::info!(
            user_id = %message.user_id,
            conversation_id = ?options.conversation_id,
            "Dispatching to backend"
        );

        let call = self.backend.converse(&message.text, options);
        let reply = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, call).await {
                Ok(result) => result.map_err(DispatchError::Backend)?,
                Err(_) => return Err(DispatchError::TimedOut(limit)),
            },
            None => call.await.map_err(DispatchError::Backend)?,
        };

        tracing::info!(user_id = %message.user_id, reply_id = %reply.id, "Backend replied");
        Ok(reply)
    }

    /// Store the continuation for the next turn.
    ///
    /// A `/reset` that arrived while the call was in flight wins: a first turn
    /// is only stored if the reset epoch is unchanged, and a follow-up only
    /// advances the conversation it started from.
    fn record(&self, user_id: &str, continuation: Option<Continuation>, epoch: u64, reply: &BackendReply) {
        let stored = match continuation {
            None => self
                .store
                .set_if_current(user_id, epoch, &reply.conversation_id, &reply.id),
            Some(previous) => {
                if previous.conversation_id != reply.conversation_id {
                    tracing::debug!(
                        user_id = %user_id,
                        stored = %previous.conversation_id,
                        returned = %reply.conversation_id,
                        "Backend returned a different conversation id, keeping stored one"
                    );
                }
                self.store
                    .advance(user_id, &previous.conversation_id, &reply.id)
            }
        };

        if !stored {
            tracing::info!(user_id = %user_id, "Conversation reset during backend call, not storing reply");
        }
    }

    async fn reply(&self, message: &ChannelMessage, text: &str) {
        if let Err(e) = self.transport.deliver(&message.chat_id, text).await {
            tracing::error!(
                chat_id = %message.chat_id,
                error = %e,
                "Failed to deliver reply"
            );
        }
    }

    /// Handle every message from `rx` in its own task.
    ///
    /// The returned task ends once `rx` is closed and every message already
    /// received has been handled.
    pub fn spawn_processor(
        self: Arc<Self>,
        mut rx: mpsc::Receiver<ChannelMessage>,
    ) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            tracing::info!("Session processor started");
            let mut tasks = JoinSet::new();

            while let Some(message) = rx.recv().await {
                while tasks.try_join_next().is_some() {}

                let orchestrator = self.clone();
                let span = message_span(&message);

                tasks.spawn(
                    async move {
                        let outcome = orchestrator.handle(&message).await;
                        tracing::debug!(outcome = ?outcome, "Message handled");
                    }
                    .instrument(span),
                );
            }

            while tasks.join_next().await.is_some() {}
            tracing::info!("Session processor stopped");
        })
    }
}

/// Span for one unit of work, tagged with a fresh trace id and the relay message id.
fn message_span(message: &ChannelMessage) -> tracing::Span {
    let trace_id = relay_common::logging::generate_trace_id();
    relay_common::channel_span!(
        message.channel_type_str(),
        trace_id,
        message.user_id,
        chat_id = %message.chat_id,
        message_id = %message.id
    )
}
