//! Image Lifecycle Manager
//!
//! Source images live in an ordered arena owned by the session. Fields point
//! at images by id only, so reachability is computed by scanning every
//! field's fill.
//!
//! An image is kept while at least one of these holds:
//! - a field's fill (selections included) references it
//! - it holds a barcode some barcode field still uses
//! - its scan is in flight (pending, processing, or waiting on a column choice)

use crate::aggregator::ColumnSelectionRequest;
use crate::collaborators::ImageData;
use crate::field::Field;
use crate::scan::{BoundingBox, DecodedBarcode, ScanResult};
use crate::types::{Attribute, ImageId, TextRegionId};
use foodform_common::config::EmptyScanPolicy;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::{debug, error, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanStatus {
    Pending,
    Processing,
    Processed,
    Failed,
}

#[derive(Debug, Clone)]
pub struct SourceImage {
    pub id: ImageId,
    pub data: ImageData,
    pub status: ScanStatus,
    pub scan: Option<ScanResult>,
    pub barcodes: Vec<DecodedBarcode>,
    /// Two-column label waiting for the user's column choice
    pub pending_column_selection: Option<ColumnSelectionRequest>,
}

impl SourceImage {
    pub fn new(data: ImageData) -> Self {
        Self {
            id: ImageId::new(),
            data,
            status: ScanStatus::Pending,
            scan: None,
            barcodes: Vec::new(),
            pending_column_selection: None,
        }
    }

    /// Work on this image has not settled yet
    pub fn is_in_flight(&self) -> bool {
        matches!(self.status, ScanStatus::Pending | ScanStatus::Processing)
            || self.pending_column_selection.is_some()
    }

    /// Holds a label scan result, as judged by `policy` for empty scans
    pub fn has_scan_result(&self, policy: EmptyScanPolicy) -> bool {
        match &self.scan {
            None => false,
            Some(scan) => !scan.is_empty() || policy == EmptyScanPolicy::Keep,
        }
    }

    pub fn has_barcode(&self, payload: &str) -> bool {
        self.barcodes.iter().any(|b| b.payload == payload)
    }

    /// Bounds of the given regions, skipping regions without bounds
    pub fn region_bounds(&self, regions: &[TextRegionId]) -> Vec<BoundingBox> {
        let Some(scan) = &self.scan else {
            return Vec::new();
        };
        regions
            .iter()
            .filter_map(|id| scan.regions.iter().find(|r| r.id == *id))
            .filter_map(|r| r.bounds)
            .collect()
    }
}

/// Ordered arena of the session's source images
#[derive(Debug, Default)]
pub struct ImageStore {
    images: Vec<SourceImage>,
    policy: EmptyScanPolicy,
}

impl ImageStore {
    pub fn new(policy: EmptyScanPolicy) -> Self {
        Self {
            images: Vec::new(),
            policy,
        }
    }

    pub fn add(&mut self, image: SourceImage) -> ImageId {
        let id = image.id;
        self.images.push(image);
        id
    }

    pub fn get(&self, id: ImageId) -> Option<&SourceImage> {
        self.images.iter().find(|i| i.id == id)
    }

    pub fn get_mut(&mut self, id: ImageId) -> Option<&mut SourceImage> {
        self.images.iter_mut().find(|i| i.id == id)
    }

    pub fn contains(&self, id: ImageId) -> bool {
        self.get(id).is_some()
    }

    pub fn remove(&mut self, id: ImageId) -> Option<SourceImage> {
        let index = self.images.iter().position(|i| i.id == id)?;
        Some(self.images.remove(index))
    }

    /// Image ids in addition order
    pub fn ids(&self) -> Vec<ImageId> {
        self.images.iter().map(|i| i.id).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &SourceImage> {
        self.images.iter()
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    /// Remove every image no field can reach; returns the removed ids
    pub fn prune_unreachable(&mut self, fields: &[Field]) -> Vec<ImageId> {
        let referenced: HashSet<ImageId> = fields
            .iter()
            .filter_map(|f| f.provenance().image_id())
            .collect();
        let used_barcodes = used_barcodes(fields);

        let mut removed = Vec::new();
        self.images.retain(|image| {
            let keep = referenced.contains(&image.id)
                || image.is_in_flight()
                || image
                    .barcodes
                    .iter()
                    .any(|b| used_barcodes.contains(b.payload.as_str()));
            if !keep {
                removed.push(image.id);
            }
            keep
        });

        for id in &removed {
            info!(image_id = %id, "Pruned unreachable image");
        }
        removed
    }

    /// Strip `payload` from every image, then drop images left with neither
    /// a scan result nor barcodes
    ///
    /// In-flight images are never dropped. Returns the removed ids.
    pub fn remove_barcode(&mut self, payload: &str) -> Vec<ImageId> {
        for image in &mut self.images {
            image.barcodes.retain(|b| b.payload != payload);
        }

        let policy = self.policy;
        let mut removed = Vec::new();
        self.images.retain(|image| {
            let keep = image.is_in_flight()
                || image.has_scan_result(policy)
                || !image.barcodes.is_empty();
            if !keep {
                removed.push(image.id);
            }
            keep
        });

        debug!(payload, removed = removed.len(), "Barcode stripped from images");
        removed
    }

    /// Every image a field's fill names must be in the store, and every
    /// machine-derived fill must name an image or prefill record
    ///
    /// A violation is a lifecycle bug: it trips a debug assertion and is
    /// logged at error level in release builds.
    pub fn check_reference_integrity(&self, fields: &[Field]) -> bool {
        let mut intact = true;
        for field in fields {
            let fill = field.provenance();
            if fill.origin().is_machine_derived() && !fill.has_external_reference() {
                error!(
                    field_id = %field.id(),
                    attribute = %field.attribute(),
                    "Machine-derived fill carries no source reference"
                );
                intact = false;
            }
            if let Some(image_id) = fill.image_id() {
                if !self.contains(image_id) {
                    error!(
                        field_id = %field.id(),
                        attribute = %field.attribute(),
                        image_id = %image_id,
                        "Fill references an image missing from the session"
                    );
                    intact = false;
                }
            }
        }
        debug_assert!(intact, "fill references a removed image");
        intact
    }
}

/// Non-empty payloads held by barcode fields
pub fn used_barcodes(fields: &[Field]) -> HashSet<&str> {
    fields
        .iter()
        .filter(|f| f.attribute() == Attribute::Barcode)
        .filter_map(|f| f.value().barcode_payload())
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fill::{Fill, ScanRef};
    use crate::value::{BarcodeValue, FieldValue, Symbology};
    use std::sync::Arc;

    fn image(status: ScanStatus) -> SourceImage {
        let mut image = SourceImage::new(Arc::from(vec![0u8; 4]));
        image.status = status;
        image
    }

    fn barcode(payload: &str) -> DecodedBarcode {
        DecodedBarcode {
            payload: payload.to_string(),
            symbology: Symbology::UpcA,
        }
    }

    fn barcode_field(payload: &str, image_id: ImageId) -> Field {
        let mut field = Field::new(Attribute::Barcode);
        field
            .fill(
                FieldValue::Barcode(BarcodeValue {
                    payload: payload.to_string(),
                    symbology: Symbology::UpcA,
                }),
                Fill::BarcodeScanned {
                    image_id,
                    payload: payload.to_string(),
                },
            )
            .unwrap();
        field
    }

    #[test]
    fn test_prune_keeps_referenced_and_in_flight() {
        let mut store = ImageStore::new(EmptyScanPolicy::Keep);
        let referenced = store.add(image(ScanStatus::Processed));
        let processing = store.add(image(ScanStatus::Processing));
        let orphan = store.add(image(ScanStatus::Processed));

        let mut field = Field::new(Attribute::Name);
        field
            .fill(
                FieldValue::Text("Oats".to_string()),
                Fill::Scanned(ScanRef {
                    image_id: referenced,
                    regions: vec![TextRegionId::new()],
                    column: None,
                }),
            )
            .unwrap();

        let removed = store.prune_unreachable(&[field]);
        assert_eq!(removed, vec![orphan]);
        assert_eq!(store.ids(), vec![referenced, processing]);
    }

    #[test]
    fn test_prune_keeps_images_with_used_barcodes() {
        let mut store = ImageStore::new(EmptyScanPolicy::Keep);
        let mut with_barcode = image(ScanStatus::Processed);
        with_barcode.barcodes.push(barcode("111"));
        let barcode_image = store.add(with_barcode);

        // Field points at another image but uses the same payload
        let mut other = image(ScanStatus::Processed);
        other.barcodes.push(barcode("111"));
        let other_id = store.add(other);
        let field = barcode_field("111", other_id);

        assert!(store.prune_unreachable(&[field]).is_empty());
        assert!(store.contains(barcode_image));
    }

    #[test]
    fn test_remove_barcode_drops_bare_images() {
        let mut store = ImageStore::new(EmptyScanPolicy::Keep);
        let mut bare = image(ScanStatus::Processed);
        bare.barcodes.push(barcode("012345678912"));
        let bare_id = store.add(bare);

        let mut labelled = image(ScanStatus::Processed);
        labelled.barcodes.push(barcode("012345678912"));
        labelled.scan = Some(ScanResult::default());
        let labelled_id = store.add(labelled);

        let mut two = image(ScanStatus::Processed);
        two.barcodes.push(barcode("012345678912"));
        two.barcodes.push(barcode("999"));
        let two_id = store.add(two);

        let removed = store.remove_barcode("012345678912");
        assert_eq!(removed, vec![bare_id]);
        assert!(store.contains(labelled_id));
        assert!(store.get(two_id).is_some_and(|i| i.has_barcode("999")));
    }

    #[test]
    fn test_empty_scan_policy_prune() {
        let mut store = ImageStore::new(EmptyScanPolicy::Prune);
        let mut empty_scan = image(ScanStatus::Processed);
        empty_scan.barcodes.push(barcode("555"));
        empty_scan.scan = Some(ScanResult::default());
        let id = store.add(empty_scan);

        assert_eq!(store.remove_barcode("555"), vec![id]);
    }

    #[test]
    fn test_reference_integrity_holds() {
        let mut store = ImageStore::new(EmptyScanPolicy::Keep);
        let id = store.add(image(ScanStatus::Processed));
        let field = barcode_field("1", id);
        assert!(store.check_reference_integrity(&[field]));
    }

    fn field_scanned_from(image_id: ImageId) -> Field {
        let mut field = Field::new(Attribute::Name);
        field
            .fill(
                FieldValue::Text("Oats".to_string()),
                Fill::Scanned(ScanRef {
                    image_id,
                    regions: vec![TextRegionId::new()],
                    column: None,
                }),
            )
            .unwrap();
        field
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "fill references a removed image")]
    fn test_reference_to_missing_image_panics_in_debug() {
        let store = ImageStore::new(EmptyScanPolicy::Keep);
        let field = field_scanned_from(ImageId::new());
        store.check_reference_integrity(&[field]);
    }

    #[test]
    #[cfg(not(debug_assertions))]
    fn test_reference_to_missing_image_reported_in_release() {
        let store = ImageStore::new(EmptyScanPolicy::Keep);
        let field = field_scanned_from(ImageId::new());
        assert!(!store.check_reference_integrity(&[field]));
    }
}
