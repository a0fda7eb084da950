//! Change detection.
//!
//! A sync is needed unless both the local corpus content and the remote
//! version's last-modified marker match what was recorded after the last
//! successful sync.

use anyhow::Result;
use sha2::{Digest, Sha256};

use crate::models::{Intent, RemoteVersion, SyncFingerprint};

/// Key under which the fingerprint for an app version is stored.
pub fn fingerprint_key(app_id: &str, version_id: &str) -> String {
    format!("fingerprint:{}:{}", app_id, version_id)
}

/// SHA-256 over a deterministic JSON serialization of the corpus.
///
/// Intents are ordered by name; utterance and declaration order is kept.
pub fn content_hash(intents: &[Intent]) -> Result<String> {
    let mut ordered: Vec<&Intent> = intents.iter().collect();
    ordered.sort_by(|a, b| a.name.cmp(&b.name));

    let bytes = serde_json::to_vec(&ordered)?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    Ok(format!("{:x}", hasher.finalize()))
}

pub fn needs_sync(
    stored: Option<&SyncFingerprint>,
    content_hash: &str,
    remote: Option<&RemoteVersion>,
) -> bool {
    let (Some(stored), Some(remote)) = (stored, remote) else {
        return true;
    };
    let Some(remote_timestamp) = remote.last_modified.as_deref() else {
        return true;
    };
    stored.content_hash != content_hash || stored.remote_timestamp != remote_timestamp
}
