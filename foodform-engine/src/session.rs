//! Form session
//!
//! Owns every field, source image and candidate set of one form, and applies
//! every mutation. There is no process-wide "current form": callers hold a
//! `FormSession` (directly, or through the actor in `actor.rs`).
//!
//! After each user mutation the session prunes unreachable images and checks
//! that no fill references a removed image.

use crate::aggregator::{Candidate, ColumnContext, ColumnSelectionRequest, ExtractionAggregator, ExtractionOutcome};
use crate::collaborators::{CroppedImage, ImageData, ScanError};
use crate::error::{EngineError, EngineResult};
use crate::field::{CropOutcome, CropRequest, Field};
use crate::fill::{ColumnChoice, CropKey, Fill};
use crate::images::{ImageStore, ScanStatus, SourceImage};
use crate::options::{self, FillOption, FillOptionResolver};
use crate::prefill::PrefillRecord;
use crate::scan::{BoundingBox, ScanOutput};
use crate::snapshot::{FieldSnapshot, FormSnapshot};
use crate::types::{Attribute, FieldId, ImageId};
use crate::validation::{self, ValidationReport};
use crate::value::FieldValue;
use chrono::Utc;
use foodform_common::config::EngineSettings;
use foodform_common::events::{EventBus, SessionEvent};
use tracing::{debug, info, warn};
use uuid::Uuid;

pub struct FormSession {
    id: Uuid,
    settings: EngineSettings,
    fields: Vec<Field>,
    images: ImageStore,
    aggregator: ExtractionAggregator,
    prefill: Option<PrefillRecord>,
    event_bus: EventBus,
    pending_crops: Vec<CropRequest>,
}

impl FormSession {
    /// New form with one empty field per single-valued attribute
    pub fn new(settings: EngineSettings) -> Self {
        let event_bus = EventBus::new(settings.event_capacity);
        Self::with_event_bus(settings, event_bus)
    }

    pub fn with_event_bus(settings: EngineSettings, event_bus: EventBus) -> Self {
        let fields = Attribute::single_valued().into_iter().map(Field::new).collect();
        let session = Self {
            id: Uuid::new_v4(),
            images: ImageStore::new(settings.empty_scan_policy),
            settings,
            fields,
            aggregator: ExtractionAggregator::new(),
            prefill: None,
            event_bus,
            pending_crops: Vec::new(),
        };
        info!(session_id = %session.id, "Form session opened");
        session
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn field(&self, field_id: FieldId) -> Option<&Field> {
        self.fields.iter().find(|f| f.id() == field_id)
    }

    /// First field of `attribute`
    pub fn field_for(&self, attribute: Attribute) -> Option<&Field> {
        self.fields.iter().find(|f| f.attribute() == attribute)
    }

    /// Every field of `attribute` (several for sizes and barcodes)
    pub fn fields_for(&self, attribute: Attribute) -> Vec<&Field> {
        self.fields.iter().filter(|f| f.attribute() == attribute).collect()
    }

    pub fn images(&self) -> &ImageStore {
        &self.images
    }

    pub fn aggregator(&self) -> &ExtractionAggregator {
        &self.aggregator
    }

    pub fn prefill(&self) -> Option<&PrefillRecord> {
        self.prefill.as_ref()
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.event_bus
    }

    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<SessionEvent> {
        self.event_bus.subscribe()
    }

    // ========================================================================
    // Images and scans
    // ========================================================================

    pub fn add_image(&mut self, data: ImageData) -> ImageId {
        let image_id = self.images.add(SourceImage::new(data));
        self.aggregator.register_image(image_id);

        info!(session_id = %self.id, image_id = %image_id, "Image added");
        self.event_bus.emit_lossy(SessionEvent::ImageAdded {
            session_id: self.id,
            image_id: image_id.as_uuid(),
            timestamp: Utc::now(),
        });
        image_id
    }

    pub fn mark_scan_started(&mut self, image_id: ImageId) -> EngineResult<()> {
        let image = self
            .images
            .get_mut(image_id)
            .ok_or(EngineError::ImageNotFound(image_id))?;
        image.status = ScanStatus::Processing;
        debug!(image_id = %image_id, "Scan started");
        Ok(())
    }

    /// Apply the scanner's result for one image
    ///
    /// Returns the column-selection request when the label has two value
    /// columns. A result for an image removed in the meantime is dropped.
    pub fn apply_scan_result(
        &mut self,
        image_id: ImageId,
        result: Result<ScanOutput, ScanError>,
    ) -> EngineResult<Option<ColumnSelectionRequest>> {
        let Some(image) = self.images.get_mut(image_id) else {
            warn!(image_id = %image_id, "Dropping scan result for removed image");
            return Ok(None);
        };

        match result {
            Ok(output) => {
                image.scan = output.scan;
                image.barcodes = output.barcodes;
                image.status = ScanStatus::Processed;
                self.run_extraction(image_id, None)
            }
            Err(e) => {
                image.status = ScanStatus::Failed;
                warn!(image_id = %image_id, error = %e, "Scan failed, no candidates offered");
                self.event_bus.emit_lossy(SessionEvent::ScanFailed {
                    session_id: self.id,
                    image_id: image_id.as_uuid(),
                    error: e.to_string(),
                    timestamp: Utc::now(),
                });
                Ok(None)
            }
        }
    }

    /// Commit the column choice for a two-column label image
    pub fn select_column(&mut self, image_id: ImageId, column: ColumnChoice) -> EngineResult<()> {
        let image = self
            .images
            .get(image_id)
            .ok_or(EngineError::ImageNotFound(image_id))?;
        let two_columns = image.pending_column_selection.is_some()
            || image.scan.as_ref().is_some_and(|s| s.has_two_columns());
        if !two_columns {
            return Err(EngineError::NoColumnSelectionPending(image_id));
        }

        info!(image_id = %image_id, column = column.number(), "Column selected");
        self.run_extraction(image_id, Some(column))?;
        Ok(())
    }

    fn column_context(&self) -> ColumnContext {
        let filled = |attribute| {
            self.field_for(attribute)
                .and_then(|f| f.value().as_food_value().copied())
                .filter(|v| v.amount.is_some())
        };
        ColumnContext {
            amount: filled(Attribute::Amount),
            serving: filled(Attribute::Serving),
        }
    }

    fn run_extraction(
        &mut self,
        image_id: ImageId,
        column: Option<ColumnChoice>,
    ) -> EngineResult<Option<ColumnSelectionRequest>> {
        let context = self.column_context();
        let image = self
            .images
            .get(image_id)
            .ok_or(EngineError::ImageNotFound(image_id))?;
        let outcome =
            self.aggregator
                .extract(image_id, image.scan.as_ref(), &image.barcodes, column, &context);

        match outcome {
            ExtractionOutcome::NeedsColumnSelection(request) => {
                if let Some(image) = self.images.get_mut(image_id) {
                    image.pending_column_selection = Some(request.clone());
                }
                self.event_bus.emit_lossy(SessionEvent::ColumnSelectionNeeded {
                    session_id: self.id,
                    image_id: image_id.as_uuid(),
                    best_column: request.best_guess.number(),
                    timestamp: Utc::now(),
                });
                Ok(Some(request))
            }
            ExtractionOutcome::Extracted { candidates } => {
                if let Some(image) = self.images.get_mut(image_id) {
                    image.pending_column_selection = None;
                }
                self.apply_image_candidates(image_id)?;
                self.event_bus.emit_lossy(SessionEvent::ScanCompleted {
                    session_id: self.id,
                    image_id: image_id.as_uuid(),
                    candidates,
                    timestamp: Utc::now(),
                });
                Ok(None)
            }
        }
    }

    /// Push a fresh extraction pass of one image into the fields
    fn apply_image_candidates(&mut self, image_id: ImageId) -> EngineResult<()> {
        let candidates: Vec<Candidate> = self
            .aggregator
            .image_candidates(image_id)
            .into_iter()
            .cloned()
            .collect();

        self.rederive_scanned_fields(image_id, &candidates)?;

        let mut filled = 0;
        for candidate in &candidates {
            if self.offer_candidate(candidate)? {
                filled += 1;
            }
        }
        debug!(image_id = %image_id, filled, "Candidates applied");
        Ok(())
    }

    /// Fields holding a plain scan of `image_id` follow the latest pass
    fn rederive_scanned_fields(&mut self, image_id: ImageId, candidates: &[Candidate]) -> EngineResult<()> {
        for index in 0..self.fields.len() {
            let field = &self.fields[index];
            let Fill::Scanned(scan) = field.provenance() else {
                continue;
            };
            if scan.image_id != image_id {
                continue;
            }

            let attribute = field.attribute();
            match candidates.iter().find(|c| c.attribute == attribute) {
                Some(candidate) => {
                    if field.value() == &candidate.value && field.provenance() == &candidate.fill {
                        continue;
                    }
                    let field = &mut self.fields[index];
                    field.set_value(candidate.value.clone())?;
                    let request = field.assign_scanned_fill(candidate.fill.clone());
                    self.queue_crop(request);
                    self.emit_field_filled(index);
                }
                None => {
                    debug!(
                        field_id = %field.id(),
                        attribute = %attribute,
                        "Scan no longer yields a value, clearing field"
                    );
                    self.fields[index].reset();
                }
            }
        }
        Ok(())
    }

    /// Auto-fill a field with `candidate` if that field takes automatic fills
    fn offer_candidate(&mut self, candidate: &Candidate) -> EngineResult<bool> {
        let attribute = candidate.attribute;

        let index = if attribute.is_repeatable() {
            let present = self
                .fields
                .iter()
                .any(|f| f.attribute() == attribute && f.value().matches(&candidate.value));
            if present {
                return Ok(false);
            }
            let free = self
                .fields
                .iter()
                .position(|f| f.attribute() == attribute && f.is_empty() && f.accepts_automatic_fill());
            match free {
                Some(index) => index,
                None => {
                    self.fields.push(Field::new(attribute));
                    self.fields.len() - 1
                }
            }
        } else {
            let Some(index) = self.fields.iter().position(|f| f.attribute() == attribute) else {
                return Ok(false);
            };
            let field = &self.fields[index];
            if !field.accepts_automatic_fill() {
                return Ok(false);
            }
            // A discarded value is not pushed back by the same candidate
            if matches!(field.provenance(), Fill::Discardable) && field.value().matches(&candidate.value) {
                return Ok(false);
            }
            index
        };

        let request = self.fields[index].fill(candidate.value.clone(), candidate.fill.clone())?;
        self.queue_crop(request);
        self.emit_field_filled(index);
        Ok(true)
    }

    /// Remove an image and everything derived from it
    pub fn remove_image(&mut self, image_id: ImageId) -> EngineResult<()> {
        self.images
            .remove(image_id)
            .ok_or(EngineError::ImageNotFound(image_id))?;
        self.forget_image(image_id);
        info!(session_id = %self.id, image_id = %image_id, "Image removed");
        self.settle();
        Ok(())
    }

    fn forget_image(&mut self, image_id: ImageId) {
        self.aggregator.remove_image(image_id);
        for index in 0..self.fields.len() {
            if self.fields[index].discard_if_using_image(image_id) {
                self.emit_field_discarded(index);
            }
        }
        self.event_bus.emit_lossy(SessionEvent::ImageRemoved {
            session_id: self.id,
            image_id: image_id.as_uuid(),
            timestamp: Utc::now(),
        });
    }

    // ========================================================================
    // Prefill
    // ========================================================================

    /// Offer a looked-up record's values, replacing any earlier record
    pub fn apply_prefill(&mut self, record: PrefillRecord) -> EngineResult<()> {
        if let Some(previous) = self.prefill.take() {
            for field in &mut self.fields {
                let from_previous = matches!(
                    field.provenance(),
                    Fill::Prefill { record_id, .. } if *record_id == previous.id
                );
                if from_previous {
                    field.reset();
                }
            }
        }

        let candidates = record.all_candidates();
        info!(
            session_id = %self.id,
            record_id = %record.id,
            candidates = candidates.len(),
            "Prefill record applied"
        );
        self.prefill = Some(record);

        for candidate in &candidates {
            self.offer_candidate(candidate)?;
        }
        Ok(())
    }

    // ========================================================================
    // User operations
    // ========================================================================

    fn field_index(&self, field_id: FieldId) -> EngineResult<usize> {
        self.fields
            .iter()
            .position(|f| f.id() == field_id)
            .ok_or(EngineError::FieldNotFound(field_id))
    }

    /// Payloads of barcode fields other than `field_id`
    fn other_barcodes(&self, field_id: FieldId) -> Vec<&str> {
        self.fields
            .iter()
            .filter(|f| f.id() != field_id && f.attribute() == Attribute::Barcode)
            .filter_map(|f| f.value().barcode_payload())
            .filter(|p| !p.trim().is_empty())
            .collect()
    }

    pub fn options_for(&self, field_id: FieldId) -> EngineResult<Vec<FillOption>> {
        let field = &self.fields[self.field_index(field_id)?];
        let used = self.other_barcodes(field_id);
        Ok(FillOptionResolver::new(&self.aggregator, self.prefill.as_ref()).options_for(field, &used))
    }

    pub fn accept_option(&mut self, field_id: FieldId, option: &FillOption) -> EngineResult<()> {
        let index = self.field_index(field_id)?;
        if let Some(image_id) = option.fill.image_id() {
            if !self.images.contains(image_id) {
                return Err(EngineError::ImageNotFound(image_id));
            }
        }

        let request = options::accept_option(&mut self.fields[index], option)?;
        self.queue_crop(request);
        info!(
            field_id = %field_id,
            attribute = %self.fields[index].attribute(),
            source = option.source.name(),
            "Option accepted"
        );
        self.emit_field_filled(index);
        self.settle();
        Ok(())
    }

    /// User typed `value` into the field
    pub fn register_user_input(&mut self, field_id: FieldId, value: FieldValue) -> EngineResult<()> {
        let index = self.field_index(field_id)?;
        let field = &mut self.fields[index];
        field.set_value(value)?;
        field.register_user_input();

        debug!(field_id = %field_id, attribute = %field.attribute(), "User input registered");
        self.emit_field_filled(index);
        self.settle();
        Ok(())
    }

    /// Drop the machine-derived provenance of one field
    ///
    /// The value stays but becomes safely replaceable. Returns false when the
    /// field held nothing machine-derived.
    pub fn discard_scan(&mut self, field_id: FieldId) -> EngineResult<bool> {
        let index = self.field_index(field_id)?;
        let field = &mut self.fields[index];
        if !field.provenance().origin().is_machine_derived() {
            return Ok(false);
        }

        field.register_discarded_scan();
        info!(field_id = %field_id, attribute = %field.attribute(), "Scan discarded");
        self.emit_field_discarded(index);
        self.settle();
        Ok(true)
    }

    /// Discard every discardable machine-derived value; returns the count
    pub fn discard_all_scanned(&mut self) -> usize {
        let mut discarded = 0;
        for index in 0..self.fields.len() {
            let field = &mut self.fields[index];
            if field.is_discardable() && field.provenance().is_machine_derived() {
                field.register_discarded_scan();
                self.emit_field_discarded(index);
                discarded += 1;
            }
        }
        info!(session_id = %self.id, discarded, "Discarded scanned values");
        self.settle();
        discarded
    }

    /// Remove a barcode everywhere; returns the ids of removed images
    pub fn remove_barcode(&mut self, payload: &str) -> Vec<ImageId> {
        let payload = payload.trim();
        self.fields.retain(|f| {
            f.attribute() != Attribute::Barcode || f.value().barcode_payload().map(str::trim) != Some(payload)
        });
        self.aggregator.remove_barcode(payload);

        let mut removed = self.images.remove_barcode(payload);
        for image_id in &removed {
            self.forget_image(*image_id);
        }
        removed.extend(self.settle());

        info!(
            session_id = %self.id,
            payload,
            images_removed = removed.len(),
            "Barcode removed"
        );
        self.event_bus.emit_lossy(SessionEvent::BarcodeRemoved {
            session_id: self.id,
            payload: payload.to_string(),
            images_removed: removed.len(),
            timestamp: Utc::now(),
        });
        removed
    }

    pub fn add_size(&mut self) -> FieldId {
        self.add_field(Attribute::Size)
    }

    pub fn add_barcode_field(&mut self) -> FieldId {
        self.add_field(Attribute::Barcode)
    }

    fn add_field(&mut self, attribute: Attribute) -> FieldId {
        let field = Field::new(attribute);
        let field_id = field.id();
        self.fields.push(field);
        debug!(field_id = %field_id, attribute = %attribute, "Field added");
        field_id
    }

    /// Remove a size or barcode field
    pub fn remove_field(&mut self, field_id: FieldId) -> EngineResult<()> {
        let index = self.field_index(field_id)?;
        let attribute = self.fields[index].attribute();
        if !attribute.is_repeatable() {
            return Err(EngineError::Common(foodform_common::Error::InvalidInput(format!(
                "{} field cannot be removed",
                attribute
            ))));
        }
        self.fields.remove(index);
        self.settle();
        Ok(())
    }

    // ========================================================================
    // Crops
    // ========================================================================

    fn queue_crop(&mut self, request: Option<CropRequest>) {
        self.pending_crops.extend(request);
    }

    /// Crop renders requested since the last call
    pub fn take_crop_requests(&mut self) -> Vec<CropRequest> {
        std::mem::take(&mut self.pending_crops)
    }

    /// Image bytes and region bounds a crop request renders
    pub fn crop_input(&self, request: &CropRequest) -> Option<(ImageData, Vec<BoundingBox>)> {
        let image = self.images.get(request.key.image_id)?;
        Some((image.data.clone(), image.region_bounds(&request.key.regions)))
    }

    /// Deliver a rendered crop (or `None` on render failure)
    pub fn complete_crop(
        &mut self,
        field_id: FieldId,
        key: &CropKey,
        image: Option<CroppedImage>,
    ) -> CropOutcome {
        let Ok(index) = self.field_index(field_id) else {
            debug!(field_id = %field_id, "Dropping crop for removed field");
            return CropOutcome::Stale;
        };

        let outcome = self.fields[index].complete_crop(key, image);
        if outcome == CropOutcome::Applied {
            self.event_bus.emit_lossy(SessionEvent::CropApplied {
                session_id: self.id,
                field_id: field_id.as_uuid(),
                timestamp: Utc::now(),
            });
        }
        outcome
    }

    // ========================================================================
    // Output
    // ========================================================================

    pub fn validate(&self) -> ValidationReport {
        validation::validate_fields(&self.fields)
    }

    pub fn snapshot(&self) -> FormSnapshot {
        FormSnapshot {
            session_id: self.id,
            taken_at: Utc::now(),
            fields: self.fields.iter().map(FieldSnapshot::from).collect(),
            image_ids: self.images.ids(),
            prefill_source_url: self.prefill.as_ref().and_then(|p| p.source_url.clone()),
        }
    }

    // ========================================================================
    // Internal
    // ========================================================================

    /// Prune unreachable images and verify fill references
    fn settle(&mut self) -> Vec<ImageId> {
        let removed = self.images.prune_unreachable(&self.fields);
        for image_id in &removed {
            self.forget_image(*image_id);
        }
        self.images.check_reference_integrity(&self.fields);
        removed
    }

    fn emit_field_filled(&self, index: usize) {
        let field = &self.fields[index];
        self.event_bus.emit_lossy(SessionEvent::FieldFilled {
            session_id: self.id,
            field_id: field.id().as_uuid(),
            attribute: field.attribute().to_string(),
            source: field.provenance().source().name().to_string(),
            timestamp: Utc::now(),
        });
    }

    fn emit_field_discarded(&self, index: usize) {
        let field = &self.fields[index];
        self.event_bus.emit_lossy(SessionEvent::FieldDiscarded {
            session_id: self.id,
            field_id: field.id().as_uuid(),
            attribute: field.attribute().to_string(),
            timestamp: Utc::now(),
        });
    }
}
