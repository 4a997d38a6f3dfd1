//! Single-flight admission per user.
//!
//! A user may have at most one backend call outstanding. A second message
//! arriving while the first is in flight is rejected, never queued.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Instant;

/// Tracks which users currently have a backend call in flight.
#[derive(Debug, Clone, Default)]
pub struct RequestSerializer {
    in_flight: Arc<DashMap<String, Instant>>,
}

impl RequestSerializer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Atomically claim the in-flight slot for `user_id`.
    ///
    /// Returns `None` when a call for this user is already outstanding; in
    /// that case nothing is modified. The returned guard releases the slot
    /// when dropped.
    pub fn try_admit(&self, user_id: &str) -> Option<AdmissionGuard> {
        match self.in_flight.entry(user_id.to_string()) {
            Entry::Occupied(_) => None,
            Entry::Vacant(slot) => {
                slot.insert(Instant::now());
                Some(AdmissionGuard {
                    serializer: self.clone(),
                    user_id: user_id.to_string(),
                })
            }
        }
    }

    pub fn is_in_flight(&self, user_id: &str) -> bool {
        self.in_flight.contains_key(user_id)
    }

    pub fn in_flight_count(&self) -> usize {
        self.in_flight.len()
    }

    fn release(&self, user_id: &str) {
        if let Some((_, admitted_at)) = self.in_flight.remove(user_id) {
            tracing::debug!(
                user_id = %user_id,
                held_ms = admitted_at.elapsed().as_millis() as u64,
                "Released in-flight marker"
            );
        }
    }
}

/// Proof of admission; dropping it releases the user's in-flight marker.
///
/// Release happens on every exit path of the admitted work, including
/// early returns, timeouts and unwinding panics.
#[must_use = "dropping the guard immediately releases the admission"]
#[derive(Debug)]
pub struct AdmissionGuard {
    serializer: RequestSerializer,
    user_id: String,
}

impl AdmissionGuard {
    pub fn user_id(&self) -> &str {
        &self.user_id
    }
}

impl Drop for AdmissionGuard {
    fn drop(&mut self) {
        self.serializer.release(&self.user_id);
    }
}
