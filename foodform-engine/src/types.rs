//! Identifiers and form attributes
//!
//! Fields, images and recognized text regions reference each other by id
//! only. The session keeps the owning tables; everything else holds keys.

use crate::value::{FieldValueKind, Unit};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

// ============================================================================
// Arena keys
// ============================================================================

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            pub fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            pub fn as_uuid(&self) -> Uuid {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }
    };
}

uuid_id!(
    /// Form field key
    FieldId
);
uuid_id!(
    /// Source image key
    ImageId
);
uuid_id!(
    /// Recognized text region key (unique across all scans)
    TextRegionId
);

/// Id of a record in the external food database
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PrefillRecordId(pub String);

impl fmt::Display for PrefillRecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ============================================================================
// Nutrients
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Macro {
    Carb,
    Fat,
    Protein,
}

impl Macro {
    pub const ALL: [Macro; 3] = [Macro::Carb, Macro::Fat, Macro::Protein];

    pub fn name(self) -> &'static str {
        match self {
            Macro::Carb => "carb",
            Macro::Fat => "fat",
            Macro::Protein => "protein",
        }
    }
}

/// Micronutrients (and macro breakdowns) found on nutrition labels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NutrientType {
    SaturatedFat,
    MonounsaturatedFat,
    PolyunsaturatedFat,
    TransFat,
    Cholesterol,
    Sodium,
    Potassium,
    DietaryFiber,
    Sugars,
    AddedSugars,
    VitaminA,
    VitaminC,
    VitaminD,
    Calcium,
    Iron,
    Magnesium,
    Zinc,
}

impl NutrientType {
    pub const ALL: [NutrientType; 17] = [
        NutrientType::SaturatedFat,
        NutrientType::MonounsaturatedFat,
        NutrientType::PolyunsaturatedFat,
        NutrientType::TransFat,
        NutrientType::Cholesterol,
        NutrientType::Sodium,
        NutrientType::Potassium,
        NutrientType::DietaryFiber,
        NutrientType::Sugars,
        NutrientType::AddedSugars,
        NutrientType::VitaminA,
        NutrientType::VitaminC,
        NutrientType::VitaminD,
        NutrientType::Calcium,
        NutrientType::Iron,
        NutrientType::Magnesium,
        NutrientType::Zinc,
    ];

    pub fn name(self) -> &'static str {
        match self {
            NutrientType::SaturatedFat => "saturated_fat",
            NutrientType::MonounsaturatedFat => "monounsaturated_fat",
            NutrientType::PolyunsaturatedFat => "polyunsaturated_fat",
            NutrientType::TransFat => "trans_fat",
            NutrientType::Cholesterol => "cholesterol",
            NutrientType::Sodium => "sodium",
            NutrientType::Potassium => "potassium",
            NutrientType::DietaryFiber => "dietary_fiber",
            NutrientType::Sugars => "sugars",
            NutrientType::AddedSugars => "added_sugars",
            NutrientType::VitaminA => "vitamin_a",
            NutrientType::VitaminC => "vitamin_c",
            NutrientType::VitaminD => "vitamin_d",
            NutrientType::Calcium => "calcium",
            NutrientType::Iron => "iron",
            NutrientType::Magnesium => "magnesium",
            NutrientType::Zinc => "zinc",
        }
    }

    /// Unit assumed when a label omits one
    pub fn default_unit(self) -> Unit {
        match self {
            NutrientType::SaturatedFat
            | NutrientType::MonounsaturatedFat
            | NutrientType::PolyunsaturatedFat
            | NutrientType::TransFat
            | NutrientType::DietaryFiber
            | NutrientType::Sugars
            | NutrientType::AddedSugars => Unit::Gram,
            NutrientType::VitaminA | NutrientType::VitaminD => Unit::Microgram,
            _ => Unit::Milligram,
        }
    }

    pub fn supports_unit(self, unit: Unit) -> bool {
        use crate::value::Dimension;
        match unit.dimension() {
            Dimension::Mass | Dimension::Percent => true,
            Dimension::InternationalUnit => {
                matches!(self, NutrientType::VitaminA | NutrientType::VitaminD)
            }
            _ => false,
        }
    }
}

// ============================================================================
// Attributes
// ============================================================================

/// One editable attribute of a food record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Attribute {
    Name,
    Detail,
    Brand,
    Amount,
    Serving,
    Density,
    Energy,
    Macro(Macro),
    Micro(NutrientType),
    Size,
    Barcode,
}

impl Attribute {
    /// Attributes with exactly one field per form, in display order
    pub fn single_valued() -> Vec<Attribute> {
        let mut attributes = vec![
            Attribute::Name,
            Attribute::Detail,
            Attribute::Brand,
            Attribute::Amount,
            Attribute::Serving,
            Attribute::Density,
            Attribute::Energy,
        ];
        attributes.extend(Macro::ALL.iter().map(|m| Attribute::Macro(*m)));
        attributes.extend(NutrientType::ALL.iter().map(|n| Attribute::Micro(*n)));
        attributes
    }

    /// Sizes and barcodes may appear any number of times
    pub fn is_repeatable(self) -> bool {
        matches!(self, Attribute::Size | Attribute::Barcode)
    }

    /// Must hold a valid value before the record can be submitted
    pub fn is_required(self) -> bool {
        matches!(
            self,
            Attribute::Name | Attribute::Amount | Attribute::Energy | Attribute::Macro(_)
        )
    }

    /// FieldValue variant used by fields of this attribute
    pub fn value_kind(self) -> FieldValueKind {
        match self {
            Attribute::Name | Attribute::Detail | Attribute::Brand => FieldValueKind::Text,
            Attribute::Amount | Attribute::Serving | Attribute::Energy | Attribute::Macro(_) => {
                FieldValueKind::Amount
            }
            Attribute::Micro(_) => FieldValueKind::Micro,
            Attribute::Density => FieldValueKind::Density,
            Attribute::Size => FieldValueKind::Size,
            Attribute::Barcode => FieldValueKind::Barcode,
        }
    }

    /// Unit assumed when recognized text carries none
    pub fn default_unit(self) -> Unit {
        match self {
            Attribute::Energy => Unit::Kilocalorie,
            Attribute::Micro(nutrient) => nutrient.default_unit(),
            _ => Unit::Gram,
        }
    }

    pub fn accepts_unit(self, unit: Unit) -> bool {
        use crate::value::Dimension;
        match self {
            Attribute::Energy => unit.dimension() == Dimension::Energy,
            Attribute::Macro(_) => unit.dimension() == Dimension::Mass,
            Attribute::Amount | Attribute::Serving | Attribute::Size => matches!(
                unit.dimension(),
                Dimension::Mass | Dimension::Volume | Dimension::Serving
            ),
            Attribute::Micro(nutrient) => nutrient.supports_unit(unit),
            _ => false,
        }
    }
}

impl fmt::Display for Attribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Attribute::Name => f.write_str("name"),
            Attribute::Detail => f.write_str("detail"),
            Attribute::Brand => f.write_str("brand"),
            Attribute::Amount => f.write_str("amount"),
            Attribute::Serving => f.write_str("serving"),
            Attribute::Density => f.write_str("density"),
            Attribute::Energy => f.write_str("energy"),
            Attribute::Macro(m) => f.write_str(m.name()),
            Attribute::Micro(n) => f.write_str(n.name()),
            Attribute::Size => f.write_str("size"),
            Attribute::Barcode => f.write_str("barcode"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_valued_excludes_repeatable() {
        let attributes = Attribute::single_valued();
        assert!(!attributes.contains(&Attribute::Size));
        assert!(!attributes.contains(&Attribute::Barcode));
        assert!(attributes.contains(&Attribute::Micro(NutrientType::Sodium)));
        assert_eq!(attributes.len(), 7 + 3 + NutrientType::ALL.len());
    }

    #[test]
    fn test_required_attributes() {
        assert!(Attribute::Name.is_required());
        assert!(Attribute::Energy.is_required());
        assert!(Attribute::Macro(Macro::Fat).is_required());
        assert!(!Attribute::Brand.is_required());
        assert!(!Attribute::Detail.is_required());
        assert!(!Attribute::Micro(NutrientType::Iron).is_required());
    }

    #[test]
    fn test_unit_acceptance() {
        assert!(Attribute::Energy.accepts_unit(Unit::Kilojoule));
        assert!(!Attribute::Energy.accepts_unit(Unit::Gram));
        assert!(Attribute::Macro(Macro::Carb).accepts_unit(Unit::Milligram));
        assert!(Attribute::Micro(NutrientType::VitaminD).accepts_unit(Unit::InternationalUnit));
        assert!(!Attribute::Micro(NutrientType::Sodium).accepts_unit(Unit::InternationalUnit));
    }

    #[test]
    fn test_attribute_serde_shape() {
        let json = serde_json::to_value(Attribute::Macro(Macro::Carb)).unwrap();
        assert_eq!(json, serde_json::json!({"macro": "carb"}));
        let parsed: Attribute = serde_json::from_str("\"energy\"").unwrap();
        assert_eq!(parsed, Attribute::Energy);
    }
}
