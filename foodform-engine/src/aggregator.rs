//! Extraction Aggregator
//!
//! Turns raw per-image recognition output into per-attribute candidates.
//!
//! Rules:
//! 1. No winner is picked across images: every image's candidates are kept
//!    and offered through the option resolver.
//! 2. Two-column labels are never resolved here. Without a committed column
//!    the aggregator returns `NeedsColumnSelection` with both columns and a
//!    best guess; the committed choice then applies to the whole image.
//! 3. An image's candidate set is rebuilt completely and swapped in with a
//!    single assignment, so readers never see a mix of two passes.
//! 4. Duplicates (same attribute, same image, value-equal after unit
//!    normalization) collapse to the first occurrence.

use crate::fill::{ColumnChoice, Fill, ScanRef};
use crate::scan::{ColumnHeaders, DecodedBarcode, ScanResult, TextRegion};
use crate::types::{Attribute, ImageId};
use crate::value::{approx_eq, BarcodeValue, Dimension, FieldValue, FieldValueKind, FoodValue, MicroValue, Unit};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;
use tracing::{debug, info};

// A number must start a token: digits glued to a word or hyphen ("D3",
// "Omega-3") belong to the nutrient name.
static QUANTITY_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)(?:^|[^\w.,\-])(?P<amount>\d+(?:[.,]\d+)*)(?:\s*(?P<unit>%|(?:fl\.?\s*oz|kcal|calories|cal|kj|mcg|µg|μg|ug|mg|kg|grams?|gr|g|ml|lbs?|l|oz|iu|cups?|tbsp|tsp|servings?)\b))?",
    )
    .expect("quantity regex is valid")
});

/// First quantity in `text` with the unit printed right after it, if any
///
/// A bare number directly followed by a quantity with a unit ("Omega 3 1.2 g")
/// is part of the name, so the second one is taken.
pub fn parse_quantity(text: &str) -> Option<(f64, Option<Unit>)> {
    let mut matches = QUANTITY_RE.captures_iter(text);
    let first = matches.next()?;
    let chosen = match (first.name("unit"), matches.next()) {
        (None, Some(next)) => {
            let first_end = first.name("amount")?.end();
            let next_start = next.name("amount")?.start();
            if next.name("unit").is_some() && text[first_end..next_start].trim().is_empty() {
                next
            } else {
                first
            }
        }
        _ => first,
    };

    let amount = parse_number(chosen.name("amount")?.as_str())?;
    let unit = chosen.name("unit").and_then(|m| Unit::parse(m.as_str()));
    Some((amount, unit))
}

/// Label number with `,` or `.` as decimal or thousands separator
///
/// The last separator is the decimal point unless it is a comma followed by
/// exactly three digits ("1,046" is 1046, "1,5" is 1.5, "1.046,5" is 1046.5).
fn parse_number(raw: &str) -> Option<f64> {
    let Some(last) = raw.rfind(|c: char| c == ',' || c == '.') else {
        return raw.parse().ok();
    };
    let fraction = &raw[last + 1..];
    let is_thousands = raw[last..].starts_with(',') && fraction.len() == 3 && !raw[..last].contains('.');

    let normalized = if is_thousands {
        raw.replace(',', "")
    } else {
        let whole: String = raw[..last].chars().filter(char::is_ascii_digit).collect();
        format!("{}.{}", whole, fraction)
    };
    normalized.parse().ok()
}

/// One possible (value, provenance) pair for an attribute
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub attribute: Attribute,
    pub value: FieldValue,
    pub fill: Fill,
}

impl Candidate {
    pub fn image_id(&self) -> Option<ImageId> {
        self.fill.image_id()
    }
}

/// Values one label column would produce
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnPreview {
    pub column: ColumnChoice,
    pub header: Option<String>,
    pub values: Vec<(Attribute, FieldValue)>,
}

/// Request for the user's one-time column choice for an image
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnSelectionRequest {
    pub image_id: ImageId,
    pub columns: [ColumnPreview; 2],
    pub best_guess: ColumnChoice,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExtractionOutcome {
    Extracted { candidates: usize },
    NeedsColumnSelection(ColumnSelectionRequest),
}

/// Current form values used to guess which label column applies
#[derive(Debug, Clone, Default)]
pub struct ColumnContext {
    pub amount: Option<FoodValue>,
    pub serving: Option<FoodValue>,
}

#[derive(Debug, Clone, Default)]
struct ImageCandidates {
    attributes: Vec<Candidate>,
    barcodes: Vec<Candidate>,
}

impl ImageCandidates {
    fn len(&self) -> usize {
        self.attributes.len() + self.barcodes.len()
    }
}

fn push_distinct(candidates: &mut Vec<Candidate>, candidate: Candidate) -> bool {
    let duplicate = candidates
        .iter()
        .any(|c| c.attribute == candidate.attribute && c.value.matches(&candidate.value));
    if duplicate {
        debug!(
            attribute = %candidate.attribute,
            value = %candidate.value.display_label(),
            "Collapsing duplicate candidate"
        );
        return false;
    }
    candidates.push(candidate);
    true
}

/// Value string of `region` for the committed column
fn column_text(region: &TextRegion, column: Option<ColumnChoice>) -> &str {
    match region.columns.len() {
        0 => &region.raw,
        1 => &region.columns[0],
        _ => &region.columns[column.unwrap_or(ColumnChoice::Column1).index()],
    }
}

/// Typed value of a region, `None` when nothing usable was recognized
fn region_value(region: &TextRegion, column: Option<ColumnChoice>) -> Option<FieldValue> {
    let attribute = region.attribute;
    match attribute.value_kind() {
        FieldValueKind::Text => {
            let text = region.raw.split_whitespace().collect::<Vec<_>>().join(" ");
            (!text.is_empty()).then_some(FieldValue::Text(text))
        }
        FieldValueKind::Amount | FieldValueKind::Micro => {
            let (amount, unit) = parse_quantity(column_text(region, column))?;
            let unit = unit.unwrap_or_else(|| attribute.default_unit());
            if !attribute.accepts_unit(unit) {
                debug!(attribute = %attribute, unit = %unit, "Unit not valid for attribute");
                return None;
            }
            match attribute {
                Attribute::Micro(nutrient) => Some(FieldValue::Micro(MicroValue {
                    nutrient,
                    amount: Some(amount),
                    unit,
                })),
                _ => Some(FieldValue::Amount(FoodValue::new(amount, unit))),
            }
        }
        // not read off label text
        FieldValueKind::Density | FieldValueKind::Size | FieldValueKind::Barcode => None,
    }
}

fn header_score(header: &str, context: &ColumnContext) -> u32 {
    let header = header.to_lowercase();
    let per_hundred = header.contains("100");
    let per_serving = ["serving", "portion", "serve", "pack"]
        .iter()
        .any(|k| header.contains(k));

    let amount_is_hundred = context.amount.is_some_and(|a| {
        a.amount.is_some_and(|x| approx_eq(x, 100.0))
            && matches!(a.unit.dimension(), Dimension::Mass | Dimension::Volume)
    });
    let amount_is_serving = context
        .amount
        .is_some_and(|a| a.unit == Unit::Serving && a.amount.is_some())
        || context.serving.is_some_and(|s| s.amount.is_some());

    let mut score = 0;
    if amount_is_hundred && per_hundred {
        score += 2;
    }
    if amount_is_serving && per_serving {
        score += 2;
    }
    score
}

/// Column whose header best matches the form's amount/serving; column 1 on ties
pub fn best_column(headers: Option<&ColumnHeaders>, context: &ColumnContext) -> ColumnChoice {
    let Some(headers) = headers else {
        return ColumnChoice::Column1;
    };
    if header_score(&headers.column2, context) > header_score(&headers.column1, context) {
        ColumnChoice::Column2
    } else {
        ColumnChoice::Column1
    }
}

/// Per-image candidate sets for one form session
#[derive(Debug, Default)]
pub struct ExtractionAggregator {
    /// Image-addition order
    order: Vec<ImageId>,
    sets: HashMap<ImageId, ImageCandidates>,
    columns: HashMap<ImageId, ColumnChoice>,
}

impl ExtractionAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an image in addition order (idempotent)
    pub fn register_image(&mut self, image_id: ImageId) {
        if !self.order.contains(&image_id) {
            self.order.push(image_id);
        }
    }

    pub fn image_order(&self) -> &[ImageId] {
        &self.order
    }

    pub fn committed_column(&self, image_id: ImageId) -> Option<ColumnChoice> {
        self.columns.get(&image_id).copied()
    }

    /// Rebuild the candidate set of one image
    ///
    /// # Arguments
    /// * `scan` - Label scan, `None` when no label was recognized
    /// * `barcodes` - Decoded barcodes of the same image
    /// * `column` - Column to commit; falls back to the image's committed one
    /// * `context` - Current form amount/serving for the best-column guess
    pub fn extract(
        &mut self,
        image_id: ImageId,
        scan: Option<&ScanResult>,
        barcodes: &[DecodedBarcode],
        column: Option<ColumnChoice>,
        context: &ColumnContext,
    ) -> ExtractionOutcome {
        self.register_image(image_id);
        let column = column.or_else(|| self.committed_column(image_id));

        if let Some(scan) = scan {
            if scan.has_two_columns() && column.is_none() {
                let request = column_selection_request(image_id, scan, context);
                info!(
                    image_id = %image_id,
                    best_column = request.best_guess.number(),
                    "Label has two value columns, selection needed"
                );
                return ExtractionOutcome::NeedsColumnSelection(request);
            }
        }

        let mut set = ImageCandidates::default();

        for region in scan.iter().flat_map(|s| s.regions.iter()) {
            let Some(value) = region_value(region, column) else {
                debug!(
                    image_id = %image_id,
                    attribute = %region.attribute,
                    raw = %region.raw,
                    "No usable value in text region"
                );
                continue;
            };

            let fill = Fill::Scanned(ScanRef {
                image_id,
                regions: region.region_ids(),
                column: if region.has_two_columns() { column } else { None },
            });
            push_distinct(
                &mut set.attributes,
                Candidate {
                    attribute: region.attribute,
                    value,
                    fill,
                },
            );
        }

        for barcode in barcodes {
            let payload = barcode.payload.trim();
            if payload.is_empty() {
                continue;
            }
            push_distinct(
                &mut set.barcodes,
                Candidate {
                    attribute: Attribute::Barcode,
                    value: FieldValue::Barcode(BarcodeValue {
                        payload: payload.to_string(),
                        symbology: barcode.symbology,
                    }),
                    fill: Fill::BarcodeScanned {
                        image_id,
                        payload: payload.to_string(),
                    },
                },
            );
        }

        if let Some(column) = column {
            self.columns.insert(image_id, column);
        }

        let candidates = set.len();
        self.sets.insert(image_id, set);

        info!(
            image_id = %image_id,
            candidates,
            column = column.map(|c| c.number()),
            "Extraction complete"
        );
        ExtractionOutcome::Extracted { candidates }
    }

    /// Candidates for `attribute` across images, in image-addition order
    pub fn candidates_for(&self, attribute: Attribute) -> Vec<&Candidate> {
        self.order
            .iter()
            .filter_map(|id| self.sets.get(id))
            .flat_map(|set| set.attributes.iter().filter(move |c| c.attribute == attribute))
            .collect()
    }

    /// Barcode candidates across images, in image-addition order
    pub fn barcode_candidates(&self) -> Vec<&Candidate> {
        self.order
            .iter()
            .filter_map(|id| self.sets.get(id))
            .flat_map(|set| set.barcodes.iter())
            .collect()
    }

    /// All candidates of one image (attributes first, then barcodes)
    pub fn image_candidates(&self, image_id: ImageId) -> Vec<&Candidate> {
        self.sets
            .get(&image_id)
            .map(|set| set.attributes.iter().chain(set.barcodes.iter()).collect())
            .unwrap_or_default()
    }

    /// Forget an image's candidates and column choice
    pub fn remove_image(&mut self, image_id: ImageId) {
        self.order.retain(|id| *id != image_id);
        self.sets.remove(&image_id);
        self.columns.remove(&image_id);
    }

    /// Drop barcode candidates carrying `payload` from every image
    pub fn remove_barcode(&mut self, payload: &str) -> usize {
        let mut removed = 0;
        for set in self.sets.values_mut() {
            let before = set.barcodes.len();
            set.barcodes
                .retain(|c| c.value.barcode_payload() != Some(payload));
            removed += before - set.barcodes.len();
        }
        removed
    }
}

fn column_selection_request(
    image_id: ImageId,
    scan: &ScanResult,
    context: &ColumnContext,
) -> ColumnSelectionRequest {
    let preview = |column: ColumnChoice| ColumnPreview {
        column,
        header: scan.headers.as_ref().map(|h| match column {
            ColumnChoice::Column1 => h.column1.clone(),
            ColumnChoice::Column2 => h.column2.clone(),
        }),
        values: scan
            .regions
            .iter()
            .filter(|r| r.has_two_columns())
            .filter_map(|r| region_value(r, Some(column)).map(|v| (r.attribute, v)))
            .collect(),
    };

    ColumnSelectionRequest {
        image_id,
        columns: [preview(ColumnChoice::Column1), preview(ColumnChoice::Column2)],
        best_guess: best_column(scan.headers.as_ref(), context),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Macro, NutrientType, TextRegionId};
    use crate::value::Symbology;

    fn region(attribute: Attribute, raw: &str, columns: &[&str]) -> TextRegion {
        TextRegion {
            id: TextRegionId::new(),
            attribute,
            raw: raw.to_string(),
            columns: columns.iter().map(|c| c.to_string()).collect(),
            linked_region: None,
            bounds: None,
        }
    }

    fn energy_label() -> ScanResult {
        ScanResult {
            regions: vec![
                region(Attribute::Energy, "Energy 250 kcal 1046 kJ", &["250 kcal", "1046 kJ"]),
                region(Attribute::Macro(Macro::Fat), "Fat 10g 4g", &["10 g", "4 g"]),
            ],
            headers: Some(ColumnHeaders {
                column1: "Per serving".to_string(),
                column2: "Per 100g".to_string(),
            }),
        }
    }

    #[test]
    fn test_parse_quantity() {
        assert_eq!(parse_quantity("250 kcal"), Some((250.0, Some(Unit::Kilocalorie))));
        assert_eq!(parse_quantity("Fat 1,5g"), Some((1.5, Some(Unit::Gram))));
        assert_eq!(parse_quantity("Sodium 120mg"), Some((120.0, Some(Unit::Milligram))));
        assert_eq!(parse_quantity("Calories 250"), Some((250.0, None)));
        assert_eq!(parse_quantity("12 grams"), Some((12.0, Some(Unit::Gram))));
        assert_eq!(parse_quantity("2 fl oz"), Some((2.0, Some(Unit::FluidOunce))));
        assert_eq!(parse_quantity("no digits"), None);
    }

    #[test]
    fn test_parse_quantity_separators() {
        assert_eq!(parse_quantity("Energy 1,046 kJ"), Some((1046.0, Some(Unit::Kilojoule))));
        assert_eq!(parse_quantity("Sodium 1,200mg"), Some((1200.0, Some(Unit::Milligram))));
        assert_eq!(parse_quantity("Fat 1,5 g"), Some((1.5, Some(Unit::Gram))));
        assert_eq!(parse_quantity("Energy 1.046,5 kJ"), Some((1046.5, Some(Unit::Kilojoule))));
        assert_eq!(parse_quantity("Energy 12,345,678 kJ"), Some((12345678.0, Some(Unit::Kilojoule))));
        assert_eq!(parse_quantity("Salt 0.25g"), Some((0.25, Some(Unit::Gram))));
    }

    #[test]
    fn test_parse_quantity_skips_digits_in_names() {
        assert_eq!(parse_quantity("Vitamin D3 10mcg"), Some((10.0, Some(Unit::Microgram))));
        assert_eq!(parse_quantity("Omega-3 1.2 g"), Some((1.2, Some(Unit::Gram))));
        assert_eq!(parse_quantity("Vitamin B12 2.4 µg"), Some((2.4, Some(Unit::Microgram))));
        assert_eq!(parse_quantity("Omega 3 1.2 g"), Some((1.2, Some(Unit::Gram))));
        assert_eq!(parse_quantity("Calories 250 per 2 servings"), Some((250.0, None)));
    }

    #[test]
    fn test_thousands_group_fills_full_value() {
        let mut aggregator = ExtractionAggregator::new();
        let image_id = ImageId::new();
        let scan = ScanResult {
            regions: vec![region(Attribute::Energy, "Energy 1,046 kJ", &[])],
            headers: None,
        };

        aggregator.extract(image_id, Some(&scan), &[], None, &ColumnContext::default());

        let candidates = aggregator.candidates_for(Attribute::Energy);
        assert_eq!(candidates.len(), 1);
        assert_eq!(
            candidates[0].value,
            FieldValue::Amount(FoodValue::new(1046.0, Unit::Kilojoule))
        );
    }

    #[test]
    fn test_two_columns_need_selection() {
        let mut aggregator = ExtractionAggregator::new();
        let image_id = ImageId::new();
        let scan = energy_label();

        let outcome = aggregator.extract(image_id, Some(&scan), &[], None, &ColumnContext::default());

        match outcome {
            ExtractionOutcome::NeedsColumnSelection(request) => {
                assert_eq!(request.image_id, image_id);
                assert_eq!(request.best_guess, ColumnChoice::Column1);
                assert_eq!(request.columns[0].values.len(), 2);
                assert_eq!(
                    request.columns[1].values[0].1,
                    FieldValue::Amount(FoodValue::new(1046.0, Unit::Kilojoule))
                );
                assert_eq!(request.columns[1].header.as_deref(), Some("Per 100g"));
            }
            other => panic!("expected column selection, got {:?}", other),
        }
        assert!(aggregator.candidates_for(Attribute::Energy).is_empty());
    }

    #[test]
    fn test_committed_column_applies_to_whole_image() {
        let mut aggregator = ExtractionAggregator::new();
        let image_id = ImageId::new();
        let scan = energy_label();

        aggregator.extract(
            image_id,
            Some(&scan),
            &[],
            Some(ColumnChoice::Column2),
            &ColumnContext::default(),
        );

        let energy = aggregator.candidates_for(Attribute::Energy);
        assert_eq!(energy.len(), 1);
        assert_eq!(
            energy[0].value,
            FieldValue::Amount(FoodValue::new(1046.0, Unit::Kilojoule))
        );
        let fat = aggregator.candidates_for(Attribute::Macro(Macro::Fat));
        assert_eq!(fat[0].value, FieldValue::Amount(FoodValue::new(4.0, Unit::Gram)));

        // Re-extraction without an explicit column reuses the committed one
        let outcome = aggregator.extract(image_id, Some(&scan), &[], None, &ColumnContext::default());
        assert_eq!(outcome, ExtractionOutcome::Extracted { candidates: 2 });
        assert_eq!(aggregator.committed_column(image_id), Some(ColumnChoice::Column2));
    }

    #[test]
    fn test_best_column_follows_amount() {
        let headers = ColumnHeaders {
            column1: "Per serving (30g)".to_string(),
            column2: "Per 100 g".to_string(),
        };
        let per_hundred = ColumnContext {
            amount: Some(FoodValue::new(100.0, Unit::Gram)),
            serving: None,
        };
        assert_eq!(best_column(Some(&headers), &per_hundred), ColumnChoice::Column2);

        let per_serving = ColumnContext {
            amount: Some(FoodValue::new(1.0, Unit::Serving)),
            serving: Some(FoodValue::new(30.0, Unit::Gram)),
        };
        assert_eq!(best_column(Some(&headers), &per_serving), ColumnChoice::Column1);
        assert_eq!(best_column(None, &per_hundred), ColumnChoice::Column1);
    }

    #[test]
    fn test_duplicates_within_image_collapse() {
        let mut aggregator = ExtractionAggregator::new();
        let image_id = ImageId::new();
        let scan = ScanResult {
            regions: vec![
                region(Attribute::Micro(NutrientType::Sodium), "Sodium 0.5 g", &[]),
                region(Attribute::Micro(NutrientType::Sodium), "Sodium 500 mg", &[]),
                region(Attribute::Name, "  Almond   Butter ", &[]),
            ],
            headers: None,
        };

        let outcome = aggregator.extract(image_id, Some(&scan), &[], None, &ColumnContext::default());
        assert_eq!(outcome, ExtractionOutcome::Extracted { candidates: 2 });

        let name = aggregator.candidates_for(Attribute::Name);
        assert_eq!(name[0].value, FieldValue::Text("Almond Butter".to_string()));
    }

    #[test]
    fn test_same_value_on_two_images_is_kept_per_image() {
        let mut aggregator = ExtractionAggregator::new();
        let first = ImageId::new();
        let second = ImageId::new();
        let scan = ScanResult {
            regions: vec![region(Attribute::Energy, "Energy 250 kcal", &[])],
            headers: None,
        };

        aggregator.extract(first, Some(&scan), &[], None, &ColumnContext::default());
        aggregator.extract(second, Some(&scan), &[], None, &ColumnContext::default());

        let energy = aggregator.candidates_for(Attribute::Energy);
        assert_eq!(energy.len(), 2);
        assert_eq!(energy[0].image_id(), Some(first));
        assert_eq!(energy[1].image_id(), Some(second));
    }

    #[test]
    fn test_incompatible_unit_is_skipped() {
        let mut aggregator = ExtractionAggregator::new();
        let scan = ScanResult {
            regions: vec![region(Attribute::Energy, "Energy 12 g", &[])],
            headers: None,
        };
        let outcome =
            aggregator.extract(ImageId::new(), Some(&scan), &[], None, &ColumnContext::default());
        assert_eq!(outcome, ExtractionOutcome::Extracted { candidates: 0 });
    }

    #[test]
    fn test_barcodes_and_removal() {
        let mut aggregator = ExtractionAggregator::new();
        let image_id = ImageId::new();
        let barcodes = vec![
            DecodedBarcode {
                payload: "012345678912".to_string(),
                symbology: Symbology::UpcA,
            },
            DecodedBarcode {
                payload: "012345678912".to_string(),
                symbology: Symbology::UpcA,
            },
        ];

        aggregator.extract(image_id, None, &barcodes, None, &ColumnContext::default());
        assert_eq!(aggregator.barcode_candidates().len(), 1);

        assert_eq!(aggregator.remove_barcode("012345678912"), 1);
        assert!(aggregator.barcode_candidates().is_empty());

        aggregator.remove_image(image_id);
        assert!(aggregator.image_order().is_empty());
    }
}
