//! Persisted hash snapshots and stale detection.
//!
//! A snapshot maps unit identity to the last-known content hash for one
//! environment. Two instances exist per run: the previous snapshot, loaded
//! once and read-only, and the new snapshot, populated with exactly one
//! entry per discovered unit and published atomically after the fan-out
//! barrier.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{Result, StageError};

/// A mapping from unit identity to content hash, serialized as a flat JSON
/// object on the wire.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HashSnapshot {
    hashes: BTreeMap<String, String>,
}

impl HashSnapshot {
    /// Creates an empty snapshot, the valid first-run state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a snapshot from its JSON wire form.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|source| StageError::SerializationError {
            message: "snapshot payload is not a JSON object of identity to hash".to_string(),
            source,
        })
    }

    /// Serializes the snapshot to its JSON wire form.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|source| StageError::SerializationError {
            message: "failed to encode snapshot".to_string(),
            source,
        })
    }

    /// Returns true if `new_hash` differs from the recorded hash for
    /// `identity`, or if the identity has never been recorded.
    ///
    /// This is the only question the snapshot answers during a run; matching
    /// key and value is the single "false" case.
    pub fn is_stale(&self, identity: &str, new_hash: &str) -> bool {
        match self.hashes.get(identity) {
            Some(previous) => previous != new_hash,
            None => true,
        }
    }

    /// Records the hash computed this run for `identity`.
    pub fn record(&mut self, identity: String, hash: String) {
        self.hashes.insert(identity, hash);
    }

    /// Number of recorded units.
    pub fn len(&self) -> usize {
        self.hashes.len()
    }

    /// True if nothing is recorded yet.
    pub fn is_empty(&self) -> bool {
        self.hashes.is_empty()
    }

    /// Look up the recorded hash for a unit.
    pub fn get(&self, identity: &str) -> Option<&str> {
        self.hashes.get(identity).map(String::as_str)
    }
}

impl FromIterator<(String, String)> for HashSnapshot {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self {
            hashes: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot_of(k: &str, v: &str) -> HashSnapshot {
        [(k.to_string(), v.to_string())].into_iter().collect()
    }

    #[test]
    fn test_stale_when_snapshot_empty() {
        let snapshot = HashSnapshot::new();
        assert!(snapshot.is_stale("register", "P5o5JJ0-P"));
    }

    #[test]
    fn test_stale_when_identity_absent() {
        let snapshot = snapshot_of("login", "P5o5JJ0-P");
        assert!(snapshot.is_stale("register", "P5o5JJ0-P"));
    }

    #[test]
    fn test_stale_when_hash_differs() {
        let snapshot = snapshot_of("register", "JGwSCYhNf");
        assert!(snapshot.is_stale("register", "P5o5JJ0-P"));
    }

    #[test]
    fn test_clean_when_hash_matches() {
        let snapshot = snapshot_of("register", "P5o5JJ0-P");
        assert!(!snapshot.is_stale("register", "P5o5JJ0-P"));
    }

    #[test]
    fn test_wire_format_is_flat_object() {
        let mut snapshot = HashSnapshot::new();
        snapshot.record("login".to_string(), "abc".to_string());
        snapshot.record("register".to_string(), "def".to_string());

        let json = snapshot.to_json().unwrap();
        assert_eq!(json, r#"{"login":"abc","register":"def"}"#);

        let parsed = HashSnapshot::from_json(&json).unwrap();
        assert_eq!(parsed, snapshot);
    }

    #[test]
    fn test_malformed_payload_is_an_error() {
        let result = HashSnapshot::from_json("[1, 2, 3]");
        assert!(matches!(
            result,
            Err(StageError::SerializationError { .. })
        ));
    }
}
