//! Sender allow-list.

use relay_common::config::AccessConfig;
use std::collections::HashSet;

/// Decides whether a sender may use the relay.
#[derive(Debug, Clone, Default)]
pub struct AccessPolicy {
    restricted: bool,
    allowed_users: HashSet<String>,
}

impl AccessPolicy {
    /// Everyone is allowed.
    pub fn open() -> Self {
        Self::default()
    }

    /// Only the listed user ids are allowed.
    pub fn allow_list<I, S>(users: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            restricted: true,
            allowed_users: users.into_iter().map(Into::into).collect(),
        }
    }

    pub fn from_config(config: &AccessConfig) -> Self {
        if config.restricted {
            Self::allow_list(config.allowed_users.iter().cloned())
        } else {
            Self::open()
        }
    }

    pub fn permits(&self, user_id: &str) -> bool {
        !self.restricted || self.allowed_users.contains(user_id)
    }

    pub fn is_restricted(&self) -> bool {
        self.restricted
    }
}
