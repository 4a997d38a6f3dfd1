//! Per-user conversation continuations.

use dashmap::DashMap;

/// What the backend needs to continue a multi-turn exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Continuation {
    pub conversation_id: String,
    /// Id of the last backend reply; sent as the parent of the next turn
    pub last_turn_id: String,
}

#[derive(Debug, Default)]
struct Slot {
    /// Bumped by every reset; lets a first turn detect a reset that raced it
    epoch: u64,
    continuation: Option<Continuation>,
}

/// Maps a user id to its continuation.
///
/// Entries are replaced whole, so a reader sees either the previous pair or
/// the new one. Different users land on different shards and do not contend.
#[derive(Debug, Default)]
pub struct ConversationStore {
    sessions: DashMap<String, Slot>,
}

impl ConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, user_id: &str) -> Option<Continuation> {
        self.sessions
            .get(user_id)
            .and_then(|slot| slot.continuation.clone())
    }

    /// Continuation plus the reset epoch it was read under.
    pub fn snapshot(&self, user_id: &str) -> (Option<Continuation>, u64) {
        self.sessions
            .get(user_id)
            .map_or((None, 0), |slot| (slot.continuation.clone(), slot.epoch))
    }

    /// Upsert the continuation for `user_id`.
    pub fn set(
        &self,
        user_id: &str,
        conversation_id: impl Into<String>,
        last_turn_id: impl Into<String>,
    ) {
        self.sessions.entry(user_id.to_string()).or_default().continuation = Some(Continuation {
            conversation_id: conversation_id.into(),
            last_turn_id: last_turn_id.into(),
        });
    }

    /// Store a new conversation unless the user reset since `epoch` was read.
    ///
    /// Returns whether the continuation was written.
    pub fn set_if_current(
        &self,
        user_id: &str,
        epoch: u64,
        conversation_id: impl Into<String>,
        last_turn_id: impl Into<String>,
    ) -> bool {
        let mut slot = self.sessions.entry(user_id.to_string()).or_default();
        if slot.epoch != epoch {
            return false;
        }
        slot.continuation = Some(Continuation {
            conversation_id: conversation_id.into(),
            last_turn_id: last_turn_id.into(),
        });
        true
    }

    /// Move the user's last turn forward within `conversation_id`.
    ///
    /// Only applies while the stored entry still belongs to that
    /// conversation, so a reset issued mid-call is not undone. Returns
    /// whether the entry was updated.
    pub fn advance(&self, user_id: &str, conversation_id: &str, last_turn_id: impl Into<String>) -> bool {
        let Some(mut slot) = self.sessions.get_mut(user_id) else {
            return false;
        };
        match slot.continuation.as_mut() {
            Some(continuation) if continuation.conversation_id == conversation_id => {
                continuation.last_turn_id = last_turn_id.into();
                true
            }
            _ => false,
        }
    }

    /// Forget the user's conversation. Returns whether one existed.
    pub fn clear(&self, user_id: &str) -> bool {
        let mut slot = self.sessions.entry(user_id.to_string()).or_default();
        slot.epoch = slot.epoch.wrapping_add(1);
        slot.continuation.take().is_some()
    }

    /// Number of users with an active conversation.
    pub fn len(&self) -> usize {
        self.sessions
            .iter()
            .filter(|slot| slot.continuation.is_some())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_unknown_user_is_none() {
        let store = ConversationStore::new();
        assert!(store.get("alice").is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn set_then_get() {
        let store = ConversationStore::new();
        store.set("alice", "c1", "m1");
        assert_eq!(
            store.get("alice"),
            Some(Continuation {
                conversation_id: "c1".into(),
                last_turn_id: "m1".into(),
            })
        );
    }

    #[test]
    fn set_overwrites_previous() {
        let store = ConversationStore::new();
        store.set("alice", "c1", "m1");
        store.set("alice", "c1", "m2");
        assert_eq!(store.get("alice").unwrap().last_turn_id, "m2");
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn clear_is_idempotent() {
        let store = ConversationStore::new();
        store.set("alice", "c1", "m1");
        assert!(store.clear("alice"));
        assert!(!store.clear("alice"));
        assert!(!store.clear("bob"));
        assert!(store.get("alice").is_none());
    }

    #[test]
    fn advance_keeps_conversation_id() {
        let store = ConversationStore::new();
        store.set("alice", "c1", "m1");
        assert!(store.advance("alice", "c1", "m2"));
        let continuation = store.get("alice").unwrap();
        assert_eq!(continuation.conversation_id, "c1");
        assert_eq!(continuation.last_turn_id, "m2");
    }

    #[test]
    fn advance_after_reset_does_not_resurrect() {
        let store = ConversationStore::new();
        store.set("alice", "c1", "m1");
        store.clear("alice");
        assert!(!store.advance("alice", "c1", "m2"));
        assert!(store.get("alice").is_none());
    }

    #[test]
    fn advance_ignores_other_conversation() {
        let store = ConversationStore::new();
        store.set("alice", "c2", "m9");
        assert!(!store.advance("alice", "c1", "m2"));
        assert_eq!(store.get("alice").unwrap().last_turn_id, "m9");
    }

    #[test]
    fn users_are_independent() {
        let store = ConversationStore::new();
        store.set("alice", "c1", "m1");
        store.set("bob", "c2", "m2");
        store.clear("alice");
        assert_eq!(store.get("bob").unwrap().conversation_id, "c2");
    }

    #[test]
    fn set_if_current_refuses_after_reset() {
        let store = ConversationStore::new();
        let (continuation, epoch) = store.snapshot("alice");
        assert!(continuation.is_none());

        store.clear("alice");

        assert!(!store.set_if_current("alice", epoch, "c1", "m1"));
        assert!(store.get("alice").is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn set_if_current_writes_when_unchanged() {
        let store = ConversationStore::new();
        store.clear("alice");
        let (_, epoch) = store.snapshot("alice");

        assert!(store.set_if_current("alice", epoch, "c1", "m1"));
        assert_eq!(store.get("alice").unwrap().conversation_id, "c1");
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn reset_of_unknown_user_is_not_a_session() {
        let store = ConversationStore::new();
        assert!(!store.clear("bob"));
        assert_eq!(store.len(), 0);
        assert_eq!(store.snapshot("bob").1, 1);
    }
}
