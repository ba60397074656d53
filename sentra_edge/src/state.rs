//! Sentra Edge - Durable Sync State
//!
//! The single authority for "what has already been applied". Persisted in
//! the embedding store database and only ever written inside a commit
//! transaction.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Durable sync state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SyncState {
    /// Remote profile timestamp of the last fully committed batch
    pub last_updated_at: Option<DateTime<Utc>>,
    /// Committed asset id -> ciphertext content hash
    pub committed: BTreeMap<String, String>,
}

impl SyncState {
    /// True if the remote snapshot is newer than the last committed batch.
    pub fn is_stale_against(&self, remote_updated_at: DateTime<Utc>) -> bool {
        match self.last_updated_at {
            Some(local) => remote_updated_at > local,
            None => true,
        }
    }

    /// True if this asset id is committed with exactly this content hash.
    pub fn has_content(&self, asset_id: &str, content_hash: &str) -> bool {
        self.committed.get(asset_id).map(String::as_str) == Some(content_hash)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_staleness() {
        let mut state = SyncState::default();
        let t1: DateTime<Utc> = "2026-01-10T12:00:00Z".parse().unwrap();
        let t2: DateTime<Utc> = "2026-01-10T12:00:01Z".parse().unwrap();

        // Nothing committed yet: everything is stale
        assert!(state.is_stale_against(t1));

        state.last_updated_at = Some(t1);
        assert!(!state.is_stale_against(t1));
        assert!(state.is_stale_against(t2));

        state.last_updated_at = Some(t2);
        assert!(!state.is_stale_against(t1));
    }

    #[test]
    fn test_content_identity() {
        let mut state = SyncState::default();
        state.committed.insert("a.bin".into(), "hash1".into());

        assert!(state.has_content("a.bin", "hash1"));
        assert!(!state.has_content("a.bin", "hash2"));
        assert!(!state.has_content("b.bin", "hash1"));
    }
}
