//! Throttled "still working" indicators for an in-flight backend call.
//!
//! The backend client reports progress on every streamed token, which can be
//! many times per second. The notifier collapses that stream to at most one
//! chat indicator per throttle interval, and goes silent the moment the call
//! is marked complete.
//!
//! Indicators are handed to a per-call pump task so a slow or failing
//! transport never stalls the backend stream. [`ProgressNotifier::finish`]
//! waits for the pump to drain, which keeps every indicator ahead of the
//! final reply.

use crate::message::ChatAction;
use crate::traits::Transport;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// Default spacing between forwarded indicators.
pub const DEFAULT_PROGRESS_INTERVAL: Duration = Duration::from_secs(4);

/// Per-call flag flipped once the final result is known.
#[derive(Debug, Clone, Default)]
pub struct CompletionToken(Arc<AtomicBool>);

impl CompletionToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_completed(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    fn mark(&self) {
        self.0.store(true, Ordering::Release);
    }
}

#[derive(Debug)]
struct ThrottleState {
    /// When the last indicator was forwarded
    last_forwarded: Instant,
    /// `None` once completed
    tx: Option<mpsc::UnboundedSender<ChatAction>>,
}

#[derive(Debug)]
struct Shared {
    state: Mutex<ThrottleState>,
    token: CompletionToken,
    interval: Duration,
    chat_id: String,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, ThrottleState> {
        // The state stays consistent even if a holder panicked.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn complete(&self) {
        let mut state = self.lock();
        self.token.mark();
        state.tx = None;
    }
}

/// Cheap, cloneable handle the backend's progress callback ticks through.
#[derive(Debug, Clone)]
pub struct ProgressHandle {
    shared: Arc<Shared>,
}

impl ProgressHandle {
    /// Record one progress tick. Returns whether an indicator was forwarded.
    pub fn tick(&self) -> bool {
        let shared = &self.shared;
        let mut state = shared.lock();

        // Checked under the lock so a tick racing `complete` cannot slip through.
        if shared.token.is_completed() {
            return false;
        }

        if state.last_forwarded.elapsed() < shared.interval {
            tracing::trace!(chat_id = %shared.chat_id, "Throttling progress indicator");
            return false;
        }

        let Some(tx) = state.tx.as_ref() else {
            return false;
        };
        if tx.send(ChatAction::Typing).is_err() {
            return false;
        }
        state.last_forwarded = Instant::now();
        true
    }

    pub fn is_completed(&self) -> bool {
        self.shared.token.is_completed()
    }
}

/// Owns the indicator pump for one backend call.
pub struct ProgressNotifier {
    shared: Arc<Shared>,
    pump: Option<JoinHandle<()>>,
}

impl ProgressNotifier {
    /// Start notifying `chat_id`. One indicator is sent right away and the
    /// throttle window starts from now.
    pub fn start(
        transport: Arc<dyn Transport>,
        chat_id: impl Into<String>,
        interval: Duration,
    ) -> Self {
        let chat_id = chat_id.into();
        let (tx, rx) = mpsc::unbounded_channel();

        // Cannot fail: the receiver is alive until the pump below exits.
        let _ = tx.send(ChatAction::Typing);

        let shared = Arc::new(Shared {
            state: Mutex::new(ThrottleState {
                last_forwarded: Instant::now(),
                tx: Some(tx),
            }),
            token: CompletionToken::new(),
            interval,
            chat_id: chat_id.clone(),
        });

        let pump = tokio::spawn(pump_indicators(transport, chat_id, rx));

        Self {
            shared,
            pump: Some(pump),
        }
    }

    pub fn handle(&self) -> ProgressHandle {
        ProgressHandle {
            shared: self.shared.clone(),
        }
    }

    pub fn token(&self) -> CompletionToken {
        self.shared.token.clone()
    }

    /// Mark the call complete and wait until queued indicators are sent.
    pub async fn finish(mut self) {
        self.shared.complete();

        if let Some(pump) = self.pump.take() {
            if let Err(e) = pump.await {
                tracing::warn!(error = %e, "Progress indicator pump failed");
            }
        }
    }
}

impl Drop for ProgressNotifier {
    fn drop(&mut self) {
        // A notifier dropped without `finish` must still go quiet.
        self.shared.complete();
    }
}

async fn pump_indicators(
    transport: Arc<dyn Transport>,
    chat_id: String,
    mut rx: mpsc::UnboundedReceiver<ChatAction>,
) {
    while let Some(action) = rx.recv().await {
        if let Err(e) = transport.signal_activity(&chat_id, action).await {
            tracing::warn!(
                chat_id = %chat_id,
                action = action.as_str(),
                error = %e,
                "Failed to send chat action"
            );
        }
    }
}
