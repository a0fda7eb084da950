//! Core data models used throughout intent-sync.
//!
//! These types represent the local corpus, the payload sent to the hosted
//! NLU provider, and the remote state the sync engine reasons about.

use serde::{Deserialize, Serialize};

/// A locally authored intent with its example utterances.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Intent {
    pub name: String,
    #[serde(default)]
    pub utterances: Vec<CanonicalUtterance>,
    #[serde(default)]
    pub entities: Vec<EntityDeclaration>,
}

/// Human-authored utterance with inline entity markup.
///
/// Only a [`LabelExtractor`](crate::traits::LabelExtractor) knows how to
/// read the markup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CanonicalUtterance(pub String);

impl CanonicalUtterance {
    pub fn new<S: Into<String>>(value: S) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Binds an annotation slot name to an internal entity type id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityDeclaration {
    pub name: String,
    #[serde(rename = "type")]
    pub entity_type: String,
}

/// A label produced by the extractor, still keyed by internal type id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypedSpan {
    pub entity_type: String,
    pub start_offset: usize,
    pub end_offset: usize,
}

/// Plain text plus typed labels for a single canonical utterance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabeledText {
    pub text: String,
    pub labels: Vec<TypedSpan>,
}

/// A resolved entity span over plain text, using the provider's entity name.
///
/// Offsets are character positions; `end_offset` is exclusive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntitySpan {
    #[serde(rename = "entity")]
    pub provider_entity_name: String,
    #[serde(rename = "startPos")]
    pub start_offset: usize,
    #[serde(rename = "endPos")]
    pub end_offset: usize,
}

/// Training example in the provider-native payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedUtterance {
    pub text: String,
    #[serde(rename = "intent")]
    pub intent_name: String,
    #[serde(rename = "entities")]
    pub labels: Vec<EntitySpan>,
}

/// The remote model version tracked by the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteVersion {
    pub version_id: String,
    /// `None` when the provider reports no last-modified time; such a
    /// version never matches a stored fingerprint.
    pub last_modified: Option<String>,
}

/// Provider-level application metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppInfo {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub culture: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntentRef {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrebuiltEntityRef {
    pub name: String,
    pub roles: Vec<String>,
}

/// The full model document submitted on import.
///
/// Built fresh on every sync attempt and never cached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelPayload {
    pub luis_schema_version: String,
    #[serde(rename = "versionId")]
    pub version_id: String,
    pub name: String,
    #[serde(rename = "desc")]
    pub description: String,
    pub culture: String,
    pub intents: Vec<IntentRef>,
    pub entities: Vec<serde_json::Value>,
    #[serde(rename = "closedLists")]
    pub closed_lists: Vec<serde_json::Value>,
    pub composites: Vec<serde_json::Value>,
    pub patterns: Vec<serde_json::Value>,
    #[serde(rename = "prebuiltEntities")]
    pub prebuilt_entities: Vec<PrebuiltEntityRef>,
    pub utterances: Vec<ExtractedUtterance>,
}

/// Remembered state of the last successful sync.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncFingerprint {
    pub content_hash: String,
    pub remote_timestamp: String,
}

/// Training state of a single submodel as reported by the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrainingState {
    Success,
    Fail,
    UpToDate,
    InProgress,
    Queued,
}

impl TrainingState {
    /// Map a provider status id to a state.
    pub fn from_status_id(id: i64) -> Option<Self> {
        match id {
            0 => Some(Self::Success),
            1 => Some(Self::Fail),
            2 => Some(Self::UpToDate),
            3 => Some(Self::InProgress),
            9 => Some(Self::Queued),
            _ => None,
        }
    }

    /// Map a provider status name to a state.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "Success" => Some(Self::Success),
            "Fail" => Some(Self::Fail),
            "UpToDate" => Some(Self::UpToDate),
            "InProgress" => Some(Self::InProgress),
            "Queued" => Some(Self::Queued),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "Success",
            Self::Fail => "Fail",
            Self::UpToDate => "UpToDate",
            Self::InProgress => "InProgress",
            Self::Queued => "Queued",
        }
    }

    /// Whether the submodel is still waiting for or undergoing training.
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::InProgress | Self::Queued)
    }
}

/// One entry of a training poll response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmodelStatus {
    pub model_id: String,
    pub state: TrainingState,
    pub failure_reason: Option<String>,
}

/// Job-level view of a training run, derived from submodel statuses.
#[derive(Debug, Clone, PartialEq)]
pub enum TrainingJobStatus {
    NotStarted,
    Queued,
    InProgress { fraction_complete: f64 },
    Succeeded,
    Failed { reason: String, model_id: String },
}
