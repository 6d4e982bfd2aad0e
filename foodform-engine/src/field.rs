//! Form field: one attribute's value, its provenance and derived crop state
//!
//! `image` and `is_cropping` are derived from the fill. They exist so the UI
//! can show the text region a value was read from; the fill alone decides
//! what crop the field should show.

use crate::collaborators::CroppedImage;
use crate::error::{EngineError, EngineResult};
use crate::fill::{CropKey, Fill};
use crate::types::{Attribute, FieldId, ImageId};
use crate::value::FieldValue;
use tracing::debug;

/// Crop render the session must schedule for a field
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CropRequest {
    pub field_id: FieldId,
    pub key: CropKey,
}

/// Result of delivering a crop to a field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CropOutcome {
    Applied,
    /// Field's crop identity changed since the crop started
    Stale,
    /// Renderer produced nothing; field stops showing a spinner
    Failed,
}

#[derive(Debug, Clone)]
pub struct Field {
    id: FieldId,
    attribute: Attribute,
    value: FieldValue,
    fill: Fill,
    image: Option<CroppedImage>,
    is_cropping: bool,
}

impl Field {
    /// Empty, unfilled field
    pub fn new(attribute: Attribute) -> Self {
        Self {
            id: FieldId::new(),
            attribute,
            value: FieldValue::empty_for(attribute),
            fill: Fill::Unfilled,
            image: None,
            is_cropping: false,
        }
    }

    pub fn id(&self) -> FieldId {
        self.id
    }

    pub fn attribute(&self) -> Attribute {
        self.attribute
    }

    pub fn value(&self) -> &FieldValue {
        &self.value
    }

    pub fn provenance(&self) -> &Fill {
        &self.fill
    }

    pub fn image(&self) -> Option<&CroppedImage> {
        self.image.as_ref()
    }

    pub fn is_cropping(&self) -> bool {
        self.is_cropping
    }

    pub fn is_empty(&self) -> bool {
        self.value.is_empty()
    }

    fn check_kind(&self, value: &FieldValue) -> EngineResult<()> {
        let expected = self.attribute.value_kind();
        if value.kind() != expected {
            return Err(EngineError::ValueKindMismatch {
                attribute: self.attribute,
                expected,
                actual: value.kind(),
            });
        }
        Ok(())
    }

    fn clear_image(&mut self) {
        self.image = None;
        self.is_cropping = false;
    }

    /// Replace value and provenance unconditionally
    ///
    /// The crop cache is always invalidated; a crop request is returned when
    /// the new fill uses an image.
    pub fn fill(&mut self, value: FieldValue, fill: Fill) -> EngineResult<Option<CropRequest>> {
        self.check_kind(&value)?;
        self.value = value;
        self.fill = fill;
        self.clear_image();

        Ok(self.fill.crop_key().map(|key| {
            self.is_cropping = true;
            CropRequest {
                field_id: self.id,
                key,
            }
        }))
    }

    /// Replace the value only (typing); provenance is set separately
    pub fn set_value(&mut self, value: FieldValue) -> EngineResult<()> {
        self.check_kind(&value)?;
        self.value = value;
        Ok(())
    }

    /// Back to the empty, unfilled state
    pub fn reset(&mut self) {
        self.value = FieldValue::empty_for(self.attribute);
        self.fill = Fill::Unfilled;
        self.clear_image();
    }

    pub fn register_user_input(&mut self) {
        self.fill = Fill::UserInput;
        self.clear_image();
    }

    pub fn register_discarded_scan(&mut self) {
        self.fill = Fill::Discardable;
        self.clear_image();
    }

    /// React to `image_id` being deleted elsewhere
    ///
    /// Scan and barcode fills become discardable. A selection becomes user
    /// input: the user vetted the value, only its traceability is lost.
    /// Returns whether the field changed.
    pub fn discard_if_using_image(&mut self, image_id: ImageId) -> bool {
        if !self.fill.uses_image(image_id) {
            return false;
        }

        if self.fill.is_selection() {
            self.register_user_input();
        } else {
            self.register_discarded_scan();
        }
        true
    }

    /// Accept a machine-derived fill, keeping the crop if its identity holds
    pub fn assign_scanned_fill(&mut self, fill: Fill) -> Option<CropRequest> {
        let previous = self.fill.crop_key();
        self.fill = fill;

        match self.fill.crop_key() {
            None => {
                self.clear_image();
                None
            }
            Some(key) if previous.as_ref() != Some(&key) => {
                self.image = None;
                self.is_cropping = true;
                Some(CropRequest {
                    field_id: self.id,
                    key,
                })
            }
            Some(_) => None,
        }
    }

    /// Deliver a finished crop, dropping it if the fill has moved on
    pub fn complete_crop(&mut self, key: &CropKey, image: Option<CroppedImage>) -> CropOutcome {
        if self.fill.crop_key().as_ref() != Some(key) {
            debug!(
                field_id = %self.id,
                attribute = %self.attribute,
                image_id = %key.image_id,
                "Dropping stale crop result"
            );
            return CropOutcome::Stale;
        }

        self.is_cropping = false;
        match image {
            Some(image) => {
                self.image = Some(image);
                CropOutcome::Applied
            }
            None => {
                self.image = None;
                CropOutcome::Failed
            }
        }
    }

    /// Variant-specific validity of the current value
    pub fn is_valid(&self) -> bool {
        self.value.is_valid()
    }

    /// May the value be dropped without losing a user decision
    pub fn is_discardable(&self) -> bool {
        match &self.fill {
            Fill::Unfilled
            | Fill::Scanned(_)
            | Fill::BarcodeScanned { .. }
            | Fill::Prefill { .. }
            | Fill::Discardable => true,
            Fill::UserInput => self.value.is_empty(),
            Fill::Selection { .. } => false,
        }
    }

    /// May a newly arrived candidate fill this field without asking
    pub fn accepts_automatic_fill(&self) -> bool {
        match &self.fill {
            Fill::Unfilled | Fill::Discardable => true,
            Fill::UserInput => self.value.is_empty(),
            _ => false,
        }
    }
}

/// Re-render check: id, value, image and cropping flag
impl PartialEq for Field {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
            && self.value == other.value
            && self.image == other.image
            && self.is_cropping == other.is_cropping
    }
}
