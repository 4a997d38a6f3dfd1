//! Per-user session engine.
//!
//! ```text
//! inbound ─▶ SessionOrchestrator ─▶ AccessPolicy
//!                 │                 ConversationStore   (continuations)
//!                 │                 RequestSerializer   (single flight)
//!                 └─▶ Backend  ◀── ProgressNotifier     (typing, throttled)
//! ```

pub mod access;
pub mod orchestrator;
pub mod progress;
pub mod serializer;
pub mod store;

pub use access::AccessPolicy;
pub use orchestrator::{
    Outcome, SessionOrchestrator, BUSY_NOTICE, GENERIC_FAILURE_NOTICE, RESET_COMMAND,
    RESET_NOTICE, UNAUTHORIZED_NOTICE,
};
pub use progress::{CompletionToken, ProgressHandle, ProgressNotifier, DEFAULT_PROGRESS_INTERVAL};
pub use serializer::{AdmissionGuard, RequestSerializer};
pub use store::{Continuation, ConversationStore};
