//! Prefill record from the external food database
//!
//! A looked-up record arrives as plain named fields. Each populated field
//! becomes a candidate whose provenance names the record and the record
//! field(s) it was taken from.

use crate::aggregator::Candidate;
use crate::fill::Fill;
use crate::types::{Attribute, Macro, PrefillRecordId};
use crate::value::{BarcodeValue, DensityValue, FieldValue, FoodValue, MicroValue, SizeValue};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrefillRecord {
    pub id: PrefillRecordId,
    #[serde(default)]
    pub source_url: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub detail: Option<String>,
    #[serde(default)]
    pub brand: Option<String>,
    #[serde(default)]
    pub amount: Option<FoodValue>,
    #[serde(default)]
    pub serving: Option<FoodValue>,
    #[serde(default)]
    pub density: Option<DensityValue>,
    #[serde(default)]
    pub energy: Option<FoodValue>,
    #[serde(default)]
    pub carb: Option<FoodValue>,
    #[serde(default)]
    pub fat: Option<FoodValue>,
    #[serde(default)]
    pub protein: Option<FoodValue>,
    #[serde(default)]
    pub micros: Vec<MicroValue>,
    #[serde(default)]
    pub sizes: Vec<SizeValue>,
    #[serde(default)]
    pub barcodes: Vec<BarcodeValue>,
}

impl PrefillRecord {
    /// Empty record with only an id
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: PrefillRecordId(id.into()),
            source_url: None,
            name: None,
            detail: None,
            brand: None,
            amount: None,
            serving: None,
            density: None,
            energy: None,
            carb: None,
            fat: None,
            protein: None,
            micros: Vec::new(),
            sizes: Vec::new(),
            barcodes: Vec::new(),
        }
    }

    fn candidate(&self, attribute: Attribute, value: FieldValue, field_name: &str) -> Candidate {
        Candidate {
            attribute,
            value,
            fill: Fill::Prefill {
                record_id: self.id.clone(),
                field_names: vec![field_name.to_string()],
            },
        }
    }

    fn text(&self, attribute: Attribute, text: &Option<String>, field_name: &str) -> Vec<Candidate> {
        text.as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(|t| self.candidate(attribute, FieldValue::Text(t.to_string()), field_name))
            .into_iter()
            .collect()
    }

    fn amount(&self, attribute: Attribute, value: &Option<FoodValue>, field_name: &str) -> Vec<Candidate> {
        value
            .filter(|v| v.amount.is_some() && attribute.accepts_unit(v.unit))
            .map(|v| self.candidate(attribute, FieldValue::Amount(v), field_name))
            .into_iter()
            .collect()
    }

    /// Candidates this record offers for `attribute`
    pub fn candidates_for(&self, attribute: Attribute) -> Vec<Candidate> {
        match attribute {
            Attribute::Name => self.text(attribute, &self.name, "name"),
            Attribute::Detail => self.text(attribute, &self.detail, "detail"),
            Attribute::Brand => self.text(attribute, &self.brand, "brand"),
            Attribute::Amount => self.amount(attribute, &self.amount, "amount"),
            Attribute::Serving => self.amount(attribute, &self.serving, "serving"),
            Attribute::Energy => self.amount(attribute, &self.energy, "energy"),
            Attribute::Macro(Macro::Carb) => self.amount(attribute, &self.carb, "carb"),
            Attribute::Macro(Macro::Fat) => self.amount(attribute, &self.fat, "fat"),
            Attribute::Macro(Macro::Protein) => self.amount(attribute, &self.protein, "protein"),
            Attribute::Density => self
                .density
                .filter(|d| d.ratio().is_some())
                .map(|d| Candidate {
                    attribute,
                    value: FieldValue::Density(d),
                    fill: Fill::Prefill {
                        record_id: self.id.clone(),
                        field_names: vec!["density_weight".to_string(), "density_volume".to_string()],
                    },
                })
                .into_iter()
                .collect(),
            Attribute::Micro(nutrient) => self
                .micros
                .iter()
                .filter(|m| m.nutrient == nutrient && m.amount.is_some())
                .map(|m| self.candidate(attribute, FieldValue::Micro(*m), nutrient.name()))
                .collect(),
            Attribute::Size => self
                .sizes
                .iter()
                .map(|s| self.candidate(attribute, FieldValue::Size(s.clone()), "sizes"))
                .collect(),
            Attribute::Barcode => self
                .barcodes
                .iter()
                .filter(|b| !b.payload.trim().is_empty())
                .map(|b| self.candidate(attribute, FieldValue::Barcode(b.clone()), "barcodes"))
                .collect(),
        }
    }

    /// Every candidate of the record, one attribute after another
    pub fn all_candidates(&self) -> Vec<Candidate> {
        let mut attributes = Attribute::single_valued();
        attributes.push(Attribute::Size);
        attributes.push(Attribute::Barcode);
        attributes
            .into_iter()
            .flat_map(|a| self.candidates_for(a))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::NutrientType;
    use crate::value::Unit;

    fn record() -> PrefillRecord {
        let json = r#"{
            "id": "usda-1234",
            "source_url": "https://example.org/food/1234",
            "name": "Almond Butter",
            "brand": "  ",
            "energy": { "amount": 614.0, "unit": "kilocalorie" },
            "fat": { "amount": 56.0, "unit": "gram" },
            "micros": [ { "nutrient": "sodium", "amount": 2.0, "unit": "milligram" } ]
        }"#;
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_record_deserializes_with_defaults() {
        let record = record();
        assert_eq!(record.id, PrefillRecordId("usda-1234".to_string()));
        assert!(record.sizes.is_empty());
        assert!(record.amount.is_none());
    }

    #[test]
    fn test_candidates_carry_record_and_field_name() {
        let record = record();
        let energy = record.candidates_for(Attribute::Energy);
        assert_eq!(energy.len(), 1);
        assert_eq!(
            energy[0].value,
            FieldValue::Amount(FoodValue::new(614.0, Unit::Kilocalorie))
        );
        assert_eq!(
            energy[0].fill,
            Fill::Prefill {
                record_id: PrefillRecordId("usda-1234".to_string()),
                field_names: vec!["energy".to_string()],
            }
        );

        let sodium = record.candidates_for(Attribute::Micro(NutrientType::Sodium));
        assert_eq!(sodium.len(), 1);
    }

    #[test]
    fn test_blank_and_missing_fields_offer_nothing() {
        let record = record();
        assert!(record.candidates_for(Attribute::Brand).is_empty());
        assert!(record.candidates_for(Attribute::Amount).is_empty());
        assert_eq!(record.all_candidates().len(), 4);
    }
}
