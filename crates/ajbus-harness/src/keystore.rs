//! An in-memory [`ajbus_core::external::KeyStore`], standing in for the
//! session-establishment collaborator the spec places out of scope (§1):
//! keys are inserted directly by the test rather than negotiated over a
//! router handshake.

use std::collections::HashMap;

use ajbus_core::external::KeyStore;
use ajbus_core::BusError;
use ajbus_crypto::{Key, Role};

/// A [`KeyStore`] backed by plain maps, populated by tests rather than a
/// real key-exchange collaborator.
#[derive(Debug, Default, Clone)]
pub struct InMemoryKeyStore {
    sessions: HashMap<String, (Key, Role)>,
    groups: HashMap<Option<String>, Key>,
}

impl InMemoryKeyStore {
    /// Builds an empty key store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a session key and local role for `peer`, builder-style.
    #[must_use]
    pub fn with_session(mut self, peer: impl Into<String>, key: Key, role: Role) -> Self {
        self.sessions.insert(peer.into(), (key, role));
        self
    }

    /// Registers a group key, optionally scoped to one sender, builder-style.
    /// A `None` sender is the catch-all key used to verify any sender's
    /// sessionless signal.
    #[must_use]
    pub fn with_group(mut self, peer: Option<&str>, key: Key) -> Self {
        self.groups.insert(peer.map(str::to_owned), key);
        self
    }
}

impl KeyStore for InMemoryKeyStore {
    fn session_key(&self, peer: &str) -> Result<(Key, Role), BusError> {
        self.sessions.get(peer).copied().ok_or(BusError::Null)
    }

    fn group_key(&self, peer: Option<&str>) -> Result<Key, BusError> {
        let scoped = peer.map(str::to_owned);
        self.groups
            .get(&scoped)
            .or_else(|| self.groups.get(&None))
            .copied()
            .ok_or(BusError::Null)
    }
}
