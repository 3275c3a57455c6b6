//! Peer directory: the trust map from usernames to verified public keys.
//!
//! Shared between the receive loop (writes on JOIN/LEAVE, reads for
//! signature verification) and anything displaying the roster. DashMap
//! gives lock-free reads, so lookups never observe a partially-written
//! entry and never block the other loops.
//!
//! Entries are added only through a successfully decrypted JOIN and
//! removed only by a LEAVE naming that username. A CHAT from an unknown
//! sender never creates an entry. The directory starts empty every run;
//! trust does not persist across restarts.

use dashmap::DashMap;
use murmur_crypto::signatures::VerifyingKey;

/// Concurrency-safe username → public key map
#[derive(Debug, Default)]
pub struct PeerDirectory {
    peers: DashMap<String, VerifyingKey>,
}

impl PeerDirectory {
    /// Create an empty directory
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a peer unless the username is already present.
    ///
    /// Returns `true` if the peer was inserted. An existing entry is left
    /// untouched even when `public_key` differs: the first announced key
    /// wins for the lifetime of the entry.
    pub fn add(&self, username: &str, public_key: VerifyingKey) -> bool {
        match self.peers.entry(username.to_owned()) {
            dashmap::Entry::Occupied(_) => false,
            dashmap::Entry::Vacant(entry) => {
                entry.insert(public_key);
                true
            }
        }
    }

    /// Remove a peer; returns `true` if it was present
    pub fn remove(&self, username: &str) -> bool {
        self.peers.remove(username).is_some()
    }

    /// Look up a peer's public key
    #[must_use]
    pub fn lookup(&self, username: &str) -> Option<VerifyingKey> {
        self.peers.get(username).map(|entry| *entry.value())
    }

    /// Number of known peers
    #[must_use]
    pub fn len(&self) -> usize {
        self.peers.len()
    }

    /// Whether any peers are known
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    /// Snapshot of known usernames, sorted for stable display
    #[must_use]
    pub fn usernames(&self) -> Vec<String> {
        let mut names: Vec<String> = self.peers.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }
}
