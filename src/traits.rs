//! Collaborator traits consumed by the sync engine.
//!
//! The engine never talks to storage, the filesystem, or the network
//! directly. Each of those concerns sits behind one of the traits below so
//! alternative backends (and test spies) can be plugged in.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐   ┌──────────────┐   ┌────────────────┐
//! │ CorpusSource │──▶│  SyncEngine  │◀─▶│FingerprintStore│
//! └──────────────┘   └──────┬───────┘   └────────────────┘
//!                           │
//!          ┌────────────────┼────────────────┐
//!          ▼                ▼                ▼
//!   ┌──────────────┐ ┌──────────────┐ ┌──────────────┐
//!   │LabelExtractor│ │EntityRegistry│ │RemoteGateway │
//!   └──────────────┘ └──────────────┘ └──────────────┘
//! ```
//!
//! | Trait | Built-in implementation |
//! |-------|-------------------------|
//! | [`FingerprintStore`] | [`SqliteFingerprintStore`](crate::store::SqliteFingerprintStore), [`InMemoryFingerprintStore`](crate::store::InMemoryFingerprintStore) |
//! | [`CorpusSource`] | [`FsCorpusSource`](crate::corpus_fs::FsCorpusSource) |
//! | [`LabelExtractor`] | [`BracketLabelExtractor`](crate::labels::BracketLabelExtractor) |
//! | [`EntityRegistry`] | [`BuiltinEntityRegistry`](crate::entities::BuiltinEntityRegistry) |
//! | [`RemoteGateway`] | [`LuisGateway`](crate::gateway::LuisGateway) |

use anyhow::Result;
use async_trait::async_trait;

use crate::labels::LabelError;
use crate::models::{
    AppInfo, EntityDeclaration, Intent, LabeledText, ModelPayload, RemoteVersion,
    SubmodelStatus, SyncFingerprint, TrainingState,
};

// ═══════════════════════════════════════════════════════════════════════
// Fingerprint Store
// ═══════════════════════════════════════════════════════════════════════

/// Durable key → [`SyncFingerprint`] mapping.
///
/// The engine reads the fingerprint once per sync and writes it at most
/// once, strictly after training and publish have succeeded.
#[async_trait]
pub trait FingerprintStore: Send + Sync {
    /// Returns the fingerprint stored under `key`, if any.
    async fn get(&self, key: &str) -> Result<Option<SyncFingerprint>>;

    /// Stores `fingerprint` under `key`, replacing any previous value.
    async fn set(&self, key: &str, fingerprint: &SyncFingerprint) -> Result<()>;
}

// ═══════════════════════════════════════════════════════════════════════
// Corpus Source
// ═══════════════════════════════════════════════════════════════════════

/// Supplies the local intent corpus. Read-only to the engine.
#[async_trait]
pub trait CorpusSource: Send + Sync {
    async fn get_intents(&self) -> Result<Vec<Intent>>;
}

// ═══════════════════════════════════════════════════════════════════════
// Label Extraction
// ═══════════════════════════════════════════════════════════════════════

/// Turns a canonical (annotated) utterance into plain text plus labels.
pub trait LabelExtractor: Send + Sync {
    /// Extract text and labels.
    ///
    /// `declarations` are the entity declarations of the intent the
    /// utterance belongs to; returned labels carry internal type ids.
    fn extract(
        &self,
        utterance: &str,
        declarations: &[EntityDeclaration],
    ) -> std::result::Result<LabeledText, LabelError>;
}

// ═══════════════════════════════════════════════════════════════════════
// Entity Registry
// ═══════════════════════════════════════════════════════════════════════

/// Provider capabilities of an internal entity type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityCapability {
    /// Whether the target provider natively recognizes this type.
    pub provider_supported: bool,
    /// Provider-native entity name (e.g. `"datetimeV2"`).
    pub provider_name: String,
}

/// Maps internal entity type ids to provider capabilities.
pub trait EntityRegistry: Send + Sync {
    /// Returns `None` when the type id is unknown.
    fn lookup(&self, type_id: &str) -> Option<EntityCapability>;
}

// ═══════════════════════════════════════════════════════════════════════
// Remote Gateway
// ═══════════════════════════════════════════════════════════════════════

/// Request/response boundary to the hosted NLU provider.
///
/// Implementations own transport concerns (base URL, credentials,
/// timeouts, retries). The engine decides which failures are fatal.
#[async_trait]
pub trait RemoteGateway: Send + Sync {
    /// Lists every version of the app.
    async fn list_versions(&self, app_id: &str) -> Result<Vec<RemoteVersion>>;

    /// Deletes a version.
    async fn delete_version(&self, app_id: &str, version_id: &str) -> Result<()>;

    /// Fetches provider-level app metadata.
    async fn get_app_info(&self, app_id: &str) -> Result<AppInfo>;

    /// Imports `payload` as `version_id`.
    async fn import_version(
        &self,
        app_id: &str,
        version_id: &str,
        payload: &ModelPayload,
    ) -> Result<()>;

    /// Starts training and returns the acknowledged status.
    async fn start_training(&self, app_id: &str, version_id: &str) -> Result<TrainingState>;

    /// Fetches per-submodel training status.
    async fn poll_training(&self, app_id: &str, version_id: &str) -> Result<Vec<SubmodelStatus>>;

    /// Publishes a trained version to the staging or production slot.
    async fn publish(&self, app_id: &str, version_id: &str, staging: bool) -> Result<()>;
}
