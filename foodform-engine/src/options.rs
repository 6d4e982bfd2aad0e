//! Fill-Option Resolver
//!
//! Computes the ordered, value-distinct list of candidates a field can offer:
//! - the field's own value first (selected), unless unfilled
//! - label scans of the same attribute, in image-addition order
//! - barcode candidates (barcode fields only)
//! - prefill candidates
//!
//! Reading options never mutates anything; accepting one wraps the chosen
//! provenance in `Fill::Selection`.

use crate::aggregator::{Candidate, ExtractionAggregator};
use crate::error::EngineResult;
use crate::field::{CropRequest, Field};
use crate::fill::{Fill, FillSource};
use crate::prefill::PrefillRecord;
use crate::types::{Attribute, ImageId};
use crate::value::FieldValue;
use tracing::debug;

/// One offerable (value, provenance) pair for a field
#[derive(Debug, Clone, PartialEq)]
pub struct FillOption {
    pub value: FieldValue,
    pub fill: Fill,
    pub label: String,
    pub source: FillSource,
    pub image_id: Option<ImageId>,
    pub is_selected: bool,
}

impl FillOption {
    fn new(value: FieldValue, fill: Fill, is_selected: bool) -> Self {
        Self {
            label: value.display_label(),
            source: fill.source(),
            image_id: fill.image_id(),
            value,
            fill,
            is_selected,
        }
    }

    fn from_candidate(candidate: &Candidate) -> Self {
        Self::new(candidate.value.clone(), candidate.fill.clone(), false)
    }

    /// Icon name for the option's source
    pub fn icon(&self) -> &'static str {
        self.source.icon_name()
    }
}

/// Read-only view over the candidate sources of one session
pub struct FillOptionResolver<'a> {
    aggregator: &'a ExtractionAggregator,
    prefill: Option<&'a PrefillRecord>,
}

impl<'a> FillOptionResolver<'a> {
    pub fn new(aggregator: &'a ExtractionAggregator, prefill: Option<&'a PrefillRecord>) -> Self {
        Self { aggregator, prefill }
    }

    /// Options for `field`
    ///
    /// `used_barcodes` holds the payloads of the session's *other* barcode
    /// fields; those barcodes are not offered again.
    pub fn options_for(&self, field: &Field, used_barcodes: &[&str]) -> Vec<FillOption> {
        let mut options: Vec<FillOption> = Vec::new();
        let mut push = |option: FillOption| {
            if option.value.is_empty() {
                return;
            }
            if options.iter().any(|o| o.value.matches(&option.value)) {
                return;
            }
            options.push(option);
        };

        if !field.provenance().is_unfilled() {
            push(FillOption::new(
                field.value().clone(),
                field.provenance().clone(),
                true,
            ));
        }

        let attribute = field.attribute();
        for candidate in self.aggregator.candidates_for(attribute) {
            push(FillOption::from_candidate(candidate));
        }

        if attribute == Attribute::Barcode {
            for candidate in self.aggregator.barcode_candidates() {
                let used = candidate
                    .value
                    .barcode_payload()
                    .is_some_and(|p| used_barcodes.contains(&p));
                if !used {
                    push(FillOption::from_candidate(candidate));
                }
            }
        }

        if let Some(record) = self.prefill {
            for candidate in record.candidates_for(attribute) {
                let used = candidate
                    .value
                    .barcode_payload()
                    .is_some_and(|p| used_barcodes.contains(&p));
                if !used {
                    push(FillOption::from_candidate(&candidate));
                }
            }
        }

        options
    }
}

/// Apply a chosen option to `field`
///
/// Accepting the option the field already holds changes nothing, so
/// accepting the same option twice is the same as accepting it once.
pub fn accept_option(field: &mut Field, option: &FillOption) -> EngineResult<Option<CropRequest>> {
    let fill = Fill::selection(option.fill.clone());
    let current = field.provenance();
    if field.value() == &option.value && (current == &fill || current == &option.fill) {
        debug!(
            field_id = %field.id(),
            attribute = %field.attribute(),
            "Option already selected"
        );
        return Ok(None);
    }

    field.set_value(option.value.clone())?;
    Ok(field.assign_scanned_fill(fill))
}
