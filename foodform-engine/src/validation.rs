//! Submission-time validation
//!
//! Invalid values are not session errors; they are collected into a report
//! the UI shows as required-field messages.

use crate::field::Field;
use crate::types::{Attribute, FieldId};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldIssue {
    /// Required attribute has no value
    Missing,
    /// Value present but fails its validity rule
    Invalid,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationIssue {
    pub field_id: FieldId,
    pub attribute: Attribute,
    pub issue: FieldIssue,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub issues: Vec<ValidationIssue>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.issues.is_empty()
    }

    pub fn issue_for(&self, attribute: Attribute) -> Option<FieldIssue> {
        self.issues
            .iter()
            .find(|i| i.attribute == attribute)
            .map(|i| i.issue)
    }
}

/// Check one field: required ones must be valid, optional ones only when filled
pub fn check_field(field: &Field) -> Option<FieldIssue> {
    if field.is_valid() {
        return None;
    }
    if field.is_empty() {
        field.attribute().is_required().then_some(FieldIssue::Missing)
    } else {
        Some(FieldIssue::Invalid)
    }
}

pub fn validate_fields(fields: &[Field]) -> ValidationReport {
    let issues = fields
        .iter()
        .filter_map(|field| {
            check_field(field).map(|issue| ValidationIssue {
                field_id: field.id(),
                attribute: field.attribute(),
                issue,
            })
        })
        .collect();
    ValidationReport { issues }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::{FieldValue, FoodValue, SizeValue, Unit};

    #[test]
    fn test_required_empty_is_missing() {
        let field = Field::new(Attribute::Energy);
        assert_eq!(check_field(&field), Some(FieldIssue::Missing));
    }

    #[test]
    fn test_optional_empty_is_fine() {
        let field = Field::new(Attribute::Brand);
        assert_eq!(check_field(&field), None);
    }

    #[test]
    fn test_partial_size_is_invalid() {
        let mut field = Field::new(Attribute::Size);
        field
            .set_value(FieldValue::Size(SizeValue {
                name: "slice".to_string(),
                quantity: Some(1.0),
                value: FoodValue::empty(Unit::Gram),
            }))
            .unwrap();
        assert_eq!(check_field(&field), Some(FieldIssue::Invalid));
    }

    #[test]
    fn test_report_lists_each_failing_field() {
        let mut energy = Field::new(Attribute::Energy);
        energy
            .set_value(FieldValue::Amount(FoodValue::new(250.0, Unit::Kilocalorie)))
            .unwrap();
        let name = Field::new(Attribute::Name);

        let report = validate_fields(&[energy, name]);
        assert!(!report.is_valid());
        assert_eq!(report.issues.len(), 1);
        assert_eq!(report.issue_for(Attribute::Name), Some(FieldIssue::Missing));
    }
}
