//! Recognition output consumed from the scanning collaborators
//!
//! The label scanner classifies every recognized text region with the
//! attribute it belongs to and, for two-column labels, reports both column
//! strings. Nothing here performs recognition.

use crate::types::{Attribute, TextRegionId};
use crate::value::Symbology;
use serde::{Deserialize, Serialize};

/// Normalized region bounds within the source image (0.0..=1.0)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

/// One recognized, classified text region
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextRegion {
    #[serde(default = "TextRegionId::new")]
    pub id: TextRegionId,
    pub attribute: Attribute,
    /// Full recognized string ("Energy 250 kcal")
    pub raw: String,
    /// Parallel value strings, one per label column (0, 1 or 2 entries)
    #[serde(default)]
    pub columns: Vec<String>,
    /// Separately recognized value region belonging to this label region
    #[serde(default)]
    pub linked_region: Option<TextRegionId>,
    #[serde(default)]
    pub bounds: Option<BoundingBox>,
}

impl TextRegion {
    pub fn has_two_columns(&self) -> bool {
        self.columns.len() >= 2
    }

    /// Region ids making up this value (label region first)
    pub fn region_ids(&self) -> Vec<TextRegionId> {
        let mut ids = vec![self.id];
        ids.extend(self.linked_region);
        ids
    }
}

/// Column headings printed above a two-column label ("Per serving", "Per 100g")
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnHeaders {
    pub column1: String,
    pub column2: String,
}

/// Label scan of one image
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScanResult {
    pub regions: Vec<TextRegion>,
    #[serde(default)]
    pub headers: Option<ColumnHeaders>,
}

impl ScanResult {
    /// Any region reports two value columns
    pub fn has_two_columns(&self) -> bool {
        self.regions.iter().any(TextRegion::has_two_columns)
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }
}

/// One decoded barcode
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecodedBarcode {
    pub payload: String,
    pub symbology: Symbology,
}

/// Everything the scanning collaborators report for one image
///
/// `scan` is `None` when no nutrition label was found on the image.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScanOutput {
    #[serde(default)]
    pub scan: Option<ScanResult>,
    #[serde(default)]
    pub barcodes: Vec<DecodedBarcode>,
}
