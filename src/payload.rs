//! Payload construction.
//!
//! Turns the local corpus into the provider-native [`ModelPayload`]. Every
//! canonical utterance goes through the [`LabelExtractor`]; every label's
//! type goes through the [`EntityRegistry`]. Only types the provider
//! recognizes natively are accepted: one unknown or unsupported type aborts
//! the whole build rather than producing a model with silently dropped
//! entities.

use std::collections::HashSet;

use thiserror::Error;

use crate::labels::LabelError;
use crate::models::{
    AppInfo, EntitySpan, ExtractedUtterance, Intent, IntentRef, ModelPayload, PrebuiltEntityRef,
};
use crate::traits::{EntityRegistry, LabelExtractor};

#[derive(Debug, Error)]
pub enum PayloadError {
    #[error("intent '{intent}': {source}")]
    Extraction {
        intent: String,
        #[source]
        source: LabelError,
    },

    #[error("intent '{intent}': unknown entity type '{entity_type}' in '{utterance}'")]
    UnknownEntityType {
        intent: String,
        utterance: String,
        entity_type: String,
    },

    #[error("intent '{intent}': entity type '{entity_type}' is not supported by the provider (in '{utterance}')")]
    UnsupportedEntityType {
        intent: String,
        utterance: String,
        entity_type: String,
    },

    #[error("intent '{intent}': span {start}..{end} out of bounds for '{text}'")]
    InvalidSpan {
        intent: String,
        text: String,
        start: usize,
        end: usize,
    },
}

impl PayloadError {
    /// The offending entity type, when the error is about one.
    pub fn entity_type(&self) -> Option<&str> {
        match self {
            Self::UnknownEntityType { entity_type, .. }
            | Self::UnsupportedEntityType { entity_type, .. } => Some(entity_type.as_str()),
            _ => None,
        }
    }
}

/// Fixed identifiers stamped on every payload.
#[derive(Debug, Clone)]
pub struct PayloadTags {
    pub schema_version: String,
    pub version_id: String,
}

pub struct PayloadBuilder<'a> {
    extractor: &'a dyn LabelExtractor,
    registry: &'a dyn EntityRegistry,
}

impl<'a> PayloadBuilder<'a> {
    pub fn new(extractor: &'a dyn LabelExtractor, registry: &'a dyn EntityRegistry) -> Self {
        Self {
            extractor,
            registry,
        }
    }

    pub fn build(
        &self,
        intents: &[Intent],
        app: &AppInfo,
        tags: &PayloadTags,
    ) -> Result<ModelPayload, PayloadError> {
        let mut prebuilt: Vec<PrebuiltEntityRef> = Vec::new();
        let mut seen_prebuilt: HashSet<String> = HashSet::new();
        let mut utterances = Vec::new();

        for intent in intents {
            for utterance in &intent.utterances {
                let labeled = self
                    .extractor
                    .extract(utterance.as_str(), &intent.entities)
                    .map_err(|source| PayloadError::Extraction {
                        intent: intent.name.clone(),
                        source,
                    })?;

                let text_len = labeled.text.chars().count();
                let mut spans = Vec::with_capacity(labeled.labels.len());

                for label in &labeled.labels {
                    let capability = self.registry.lookup(&label.entity_type).ok_or_else(|| {
                        PayloadError::UnknownEntityType {
                            intent: intent.name.clone(),
                            utterance: utterance.as_str().to_string(),
                            entity_type: label.entity_type.clone(),
                        }
                    })?;
                    if !capability.provider_supported {
                        return Err(PayloadError::UnsupportedEntityType {
                            intent: intent.name.clone(),
                            utterance: utterance.as_str().to_string(),
                            entity_type: label.entity_type.clone(),
                        });
                    }

                    if label.start_offset >= label.end_offset || label.end_offset > text_len {
                        return Err(PayloadError::InvalidSpan {
                            intent: intent.name.clone(),
                            text: labeled.text.clone(),
                            start: label.start_offset,
                            end: label.end_offset,
                        });
                    }

                    if seen_prebuilt.insert(capability.provider_name.clone()) {
                        prebuilt.push(PrebuiltEntityRef {
                            name: capability.provider_name.clone(),
                            roles: vec![],
                        });
                    }

                    spans.push(EntitySpan {
                        provider_entity_name: capability.provider_name,
                        start_offset: label.start_offset,
                        end_offset: label.end_offset,
                    });
                }

                utterances.push(ExtractedUtterance {
                    text: labeled.text,
                    intent_name: intent.name.clone(),
                    labels: spans,
                });
            }
        }

        Ok(ModelPayload {
            luis_schema_version: tags.schema_version.clone(),
            version_id: tags.version_id.clone(),
            name: app.name.clone(),
            description: app.description.clone(),
            culture: app.culture.clone(),
            intents: intents
                .iter()
                .map(|i| IntentRef {
                    name: i.name.clone(),
                })
                .collect(),
            entities: vec![],
            closed_lists: vec![],
            composites: vec![],
            patterns: vec![],
            prebuilt_entities: prebuilt,
            utterances,
        })
    }
}
