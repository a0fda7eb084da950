//! Canonical label extraction.
//!
//! Utterances are authored with inline markup: `[surface text](slot)`.
//! The slot name is resolved against the intent's entity declarations to
//! obtain the internal entity type id. A backslash escapes any of
//! `[ ] ( ) \`. Parentheses outside a label are plain text.
//!
//! ```text
//! "fly to [Paris](destination) on [friday](when)"
//!   → text   "fly to Paris on friday"
//!   → labels [(geography, 7, 12), (datetime, 16, 22)]
//! ```
//!
//! Offsets are character positions into the extracted text, end exclusive.

use thiserror::Error;

use crate::models::{EntityDeclaration, LabeledText, TypedSpan};
use crate::traits::LabelExtractor;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LabelError {
    #[error("unbalanced label markup at character {position} in '{utterance}'")]
    Unbalanced { utterance: String, position: usize },

    #[error("label '{slot}' has no surface text in '{utterance}'")]
    EmptyLabel { utterance: String, slot: String },

    #[error("missing slot name at character {position} in '{utterance}'")]
    EmptySlot { utterance: String, position: usize },

    #[error("slot '{slot}' is not declared by the intent (in '{utterance}')")]
    UndeclaredEntity { utterance: String, slot: String },
}

/// Extractor for `[surface](slot)` markup.
#[derive(Debug, Default, Clone)]
pub struct BracketLabelExtractor;

impl BracketLabelExtractor {
    pub fn new() -> Self {
        Self
    }
}

impl LabelExtractor for BracketLabelExtractor {
    fn extract(
        &self,
        utterance: &str,
        declarations: &[EntityDeclaration],
    ) -> Result<LabeledText, LabelError> {
        let unbalanced = |position: usize| LabelError::Unbalanced {
            utterance: utterance.to_string(),
            position,
        };

        let mut text = String::with_capacity(utterance.len());
        let mut labels = Vec::new();
        // Character count of `text`, used for offsets.
        let mut len = 0usize;
        let mut label_start: Option<usize> = None;

        let mut chars = utterance.chars().enumerate().peekable();
        while let Some((i, c)) = chars.next() {
            match c {
                '\\' => {
                    let escaped = chars
                        .peek()
                        .map(|&(_, next)| next)
                        .filter(|next| matches!(next, '[' | ']' | '(' | ')' | '\\'));
                    let literal = match escaped {
                        Some(next) => {
                            chars.next();
                            next
                        }
                        None => '\\',
                    };
                    text.push(literal);
                    len += 1;
                }
                '[' => {
                    if label_start.is_some() {
                        return Err(unbalanced(i));
                    }
                    label_start = Some(len);
                }
                ']' => {
                    let start = label_start.take().ok_or_else(|| unbalanced(i))?;
                    match chars.next() {
                        Some((_, '(')) => {}
                        Some((j, _)) => return Err(unbalanced(j)),
                        None => return Err(unbalanced(i)),
                    }

                    let mut slot = String::new();
                    let mut closed = false;
                    for (_, sc) in chars.by_ref() {
                        if sc == ')' {
                            closed = true;
                            break;
                        }
                        slot.push(sc);
                    }
                    if !closed {
                        return Err(unbalanced(i));
                    }

                    let slot = slot.trim().to_string();
                    if slot.is_empty() {
                        return Err(LabelError::EmptySlot {
                            utterance: utterance.to_string(),
                            position: i,
                        });
                    }
                    if start == len {
                        return Err(LabelError::EmptyLabel {
                            utterance: utterance.to_string(),
                            slot,
                        });
                    }

                    let declaration = declarations
                        .iter()
                        .find(|d| d.name == slot)
                        .ok_or_else(|| LabelError::UndeclaredEntity {
                            utterance: utterance.to_string(),
                            slot: slot.clone(),
                        })?;

                    labels.push(TypedSpan {
                        entity_type: declaration.entity_type.clone(),
                        start_offset: start,
                        end_offset: len,
                    });
                }
                _ => {
                    text.push(c);
                    len += 1;
                }
            }
        }

        if label_start.is_some() {
            return Err(unbalanced(utterance.chars().count()));
        }

        Ok(LabeledText { text, labels })
    }
}
