//! Fill provenance model
//!
//! A `Fill` records why a field holds its current value. Exhaustive matching
//! on it drives discardability, option ordering and image reachability.
//!
//! Reference invariant: every fill other than `Unfilled`, `UserInput` and
//! `Discardable` names an image or an external record.

use crate::types::{ImageId, PrefillRecordId, TextRegionId};
use serde::{Deserialize, Serialize};

/// Which of a label's two value columns an image's values come from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnChoice {
    Column1,
    Column2,
}

impl ColumnChoice {
    /// 1-based column number
    pub fn number(self) -> u8 {
        match self {
            ColumnChoice::Column1 => 1,
            ColumnChoice::Column2 => 2,
        }
    }

    pub fn index(self) -> usize {
        match self {
            ColumnChoice::Column1 => 0,
            ColumnChoice::Column2 => 1,
        }
    }
}

/// Recognized text region(s) a scanned value came from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanRef {
    pub image_id: ImageId,
    /// One region, or two when the attribute label and its value were
    /// recognized separately
    pub regions: Vec<TextRegionId>,
    /// Committed column for two-column labels
    pub column: Option<ColumnChoice>,
}

/// Identity of a field's crop: the image plus the region(s) shown
///
/// An empty region list means the whole image.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CropKey {
    pub image_id: ImageId,
    pub regions: Vec<TextRegionId>,
}

/// Provenance kind, used for option ordering and source icons
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FillSource {
    Unfilled,
    UserInput,
    Scan,
    Barcode,
    Prefill,
    Discardable,
}

impl FillSource {
    /// Icon identifier handed to the UI layer
    pub fn icon_name(self) -> &'static str {
        match self {
            FillSource::Unfilled => "circle.dashed",
            FillSource::UserInput => "keyboard",
            FillSource::Scan => "text.viewfinder",
            FillSource::Barcode => "barcode.viewfinder",
            FillSource::Prefill => "link",
            FillSource::Discardable => "trash",
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            FillSource::Unfilled => "unfilled",
            FillSource::UserInput => "user_input",
            FillSource::Scan => "scan",
            FillSource::Barcode => "barcode",
            FillSource::Prefill => "prefill",
            FillSource::Discardable => "discardable",
        }
    }
}

/// Why a field holds its current value
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Fill {
    #[default]
    Unfilled,
    UserInput,
    Scanned(ScanRef),
    BarcodeScanned {
        image_id: ImageId,
        payload: String,
    },
    Prefill {
        record_id: PrefillRecordId,
        field_names: Vec<String>,
    },
    /// Value kept but safe to replace or drop
    Discardable,
    /// Chosen by the user among offered candidates
    Selection {
        original: Box<Fill>,
    },
}

impl Fill {
    /// Wrap a candidate's provenance as a user selection
    ///
    /// Only machine-derived fills are wrapped; a selection is never nested.
    pub fn selection(original: Fill) -> Fill {
        if original.is_machine_derived() {
            Fill::Selection {
                original: Box::new(original),
            }
        } else {
            original
        }
    }

    /// Provenance with any selection wrapper removed
    pub fn origin(&self) -> &Fill {
        match self {
            Fill::Selection { original } => original.origin(),
            other => other,
        }
    }

    pub fn is_unfilled(&self) -> bool {
        matches!(self, Fill::Unfilled)
    }

    pub fn is_selection(&self) -> bool {
        matches!(self, Fill::Selection { .. })
    }

    /// Came from a scan, a barcode or an external record
    pub fn is_machine_derived(&self) -> bool {
        matches!(
            self,
            Fill::Scanned(_) | Fill::BarcodeScanned { .. } | Fill::Prefill { .. }
        )
    }

    pub fn image_id(&self) -> Option<ImageId> {
        match self.origin() {
            Fill::Scanned(scan) => Some(scan.image_id),
            Fill::BarcodeScanned { image_id, .. } => Some(*image_id),
            _ => None,
        }
    }

    pub fn uses_image(&self, image_id: ImageId) -> bool {
        self.image_id() == Some(image_id)
    }

    pub fn prefill_record(&self) -> Option<&PrefillRecordId> {
        match self.origin() {
            Fill::Prefill { record_id, .. } => Some(record_id),
            _ => None,
        }
    }

    pub fn barcode_payload(&self) -> Option<&str> {
        match self.origin() {
            Fill::BarcodeScanned { payload, .. } => Some(payload.as_str()),
            _ => None,
        }
    }

    /// Crop identity, present exactly when the fill uses an image
    pub fn crop_key(&self) -> Option<CropKey> {
        match self.origin() {
            Fill::Scanned(scan) => Some(CropKey {
                image_id: scan.image_id,
                regions: scan.regions.clone(),
            }),
            Fill::BarcodeScanned { image_id, .. } => Some(CropKey {
                image_id: *image_id,
                regions: Vec::new(),
            }),
            _ => None,
        }
    }

    pub fn source(&self) -> FillSource {
        match self.origin() {
            Fill::Unfilled => FillSource::Unfilled,
            Fill::UserInput => FillSource::UserInput,
            Fill::Scanned(_) => FillSource::Scan,
            Fill::BarcodeScanned { .. } => FillSource::Barcode,
            Fill::Prefill { .. } => FillSource::Prefill,
            Fill::Discardable => FillSource::Discardable,
            Fill::Selection { original } => original.source(),
        }
    }

    /// Holds the image or record reference required of machine-derived fills
    pub fn has_external_reference(&self) -> bool {
        self.image_id().is_some() || self.prefill_record().is_some()
    }
}
