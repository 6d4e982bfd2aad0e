//! Error types for foodform-engine
//!
//! Extraction and crop failures never surface here: they end as "no
//! candidate offered". These errors are caller mistakes (unknown ids, wrong
//! value variant) or a closed session.

use crate::types::{Attribute, FieldId, ImageId};
use crate::value::FieldValueKind;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Field not found: {0}")]
    FieldNotFound(FieldId),

    #[error("No field for attribute: {0}")]
    AttributeNotFound(Attribute),

    #[error("Image not found: {0}")]
    ImageNotFound(ImageId),

    #[error("Value kind mismatch for {attribute}: expected {expected:?}, got {actual:?}")]
    ValueKindMismatch {
        attribute: Attribute,
        expected: FieldValueKind,
        actual: FieldValueKind,
    },

    #[error("Image {0} has no two-column label scan")]
    NoColumnSelectionPending(ImageId),

    #[error("Form session closed")]
    SessionClosed,

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Common error: {0}")]
    Common(#[from] foodform_common::Error),
}

pub type EngineResult<T> = Result<T, EngineError>;
