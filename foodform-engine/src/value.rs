//! Typed field payloads and unit normalization
//!
//! A field's FieldValue variant is fixed by its attribute when the field is
//! created; only the contained scalars change afterwards.

use crate::types::{Attribute, NutrientType};
use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// Units
// ============================================================================

/// Physical dimension a unit measures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dimension {
    Mass,
    Volume,
    Energy,
    InternationalUnit,
    Percent,
    Serving,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Unit {
    Gram,
    Milligram,
    Microgram,
    Kilogram,
    Ounce,
    Pound,
    Milliliter,
    Liter,
    Cup,
    Tablespoon,
    Teaspoon,
    FluidOunce,
    Kilocalorie,
    Kilojoule,
    InternationalUnit,
    Percent,
    Serving,
}

impl Unit {
    pub fn dimension(self) -> Dimension {
        match self {
            Unit::Gram | Unit::Milligram | Unit::Microgram | Unit::Kilogram | Unit::Ounce
            | Unit::Pound => Dimension::Mass,
            Unit::Milliliter | Unit::Liter | Unit::Cup | Unit::Tablespoon | Unit::Teaspoon
            | Unit::FluidOunce => Dimension::Volume,
            Unit::Kilocalorie | Unit::Kilojoule => Dimension::Energy,
            Unit::InternationalUnit => Dimension::InternationalUnit,
            Unit::Percent => Dimension::Percent,
            Unit::Serving => Dimension::Serving,
        }
    }

    /// Multiplier to the dimension's base unit (g, ml, kcal)
    pub fn base_factor(self) -> f64 {
        match self {
            Unit::Gram => 1.0,
            Unit::Milligram => 0.001,
            Unit::Microgram => 0.000_001,
            Unit::Kilogram => 1000.0,
            Unit::Ounce => 28.349_523_125,
            Unit::Pound => 453.592_37,
            Unit::Milliliter => 1.0,
            Unit::Liter => 1000.0,
            Unit::Cup => 236.588_236_5,
            Unit::Tablespoon => 14.786_764_781_25,
            Unit::Teaspoon => 4.928_921_593_75,
            Unit::FluidOunce => 29.573_529_562_5,
            Unit::Kilocalorie => 1.0,
            Unit::Kilojoule => 1.0 / 4.184,
            Unit::InternationalUnit | Unit::Percent | Unit::Serving => 1.0,
        }
    }

    pub fn to_base(self, amount: f64) -> f64 {
        amount * self.base_factor()
    }

    pub fn symbol(self) -> &'static str {
        match self {
            Unit::Gram => "g",
            Unit::Milligram => "mg",
            Unit::Microgram => "mcg",
            Unit::Kilogram => "kg",
            Unit::Ounce => "oz",
            Unit::Pound => "lb",
            Unit::Milliliter => "ml",
            Unit::Liter => "l",
            Unit::Cup => "cup",
            Unit::Tablespoon => "tbsp",
            Unit::Teaspoon => "tsp",
            Unit::FluidOunce => "fl oz",
            Unit::Kilocalorie => "kcal",
            Unit::Kilojoule => "kJ",
            Unit::InternationalUnit => "IU",
            Unit::Percent => "%",
            Unit::Serving => "serving",
        }
    }

    /// Parse a unit token as printed on labels ("kcal", "µg", "fl oz", ...)
    pub fn parse(token: &str) -> Option<Unit> {
        let normalized: String = token
            .trim()
            .to_lowercase()
            .chars()
            .filter(|c| !c.is_whitespace() && *c != '.')
            .collect();

        let unit = match normalized.as_str() {
            "g" | "gr" | "gram" | "grams" => Unit::Gram,
            "mg" => Unit::Milligram,
            "mcg" | "µg" | "μg" | "ug" => Unit::Microgram,
            "kg" => Unit::Kilogram,
            "oz" => Unit::Ounce,
            "lb" | "lbs" => Unit::Pound,
            "ml" => Unit::Milliliter,
            "l" => Unit::Liter,
            "cup" | "cups" => Unit::Cup,
            "tbsp" => Unit::Tablespoon,
            "tsp" => Unit::Teaspoon,
            "floz" => Unit::FluidOunce,
            "kcal" | "cal" | "calories" => Unit::Kilocalorie,
            "kj" => Unit::Kilojoule,
            "iu" => Unit::InternationalUnit,
            "%" => Unit::Percent,
            "serving" | "servings" => Unit::Serving,
            _ => return None,
        };
        Some(unit)
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// Numeric equality used for de-duplication (relative tolerance)
pub fn approx_eq(a: f64, b: f64) -> bool {
    let scale = a.abs().max(b.abs()).max(1.0);
    (a - b).abs() <= 1e-6 * scale
}

fn format_amount(amount: f64) -> String {
    if approx_eq(amount, amount.round()) {
        format!("{}", amount.round() as i64)
    } else {
        let text = format!("{:.2}", amount);
        text.trim_end_matches('0').trim_end_matches('.').to_string()
    }
}

fn normalize_text(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

fn amounts_match(a: Option<f64>, a_unit: Unit, b: Option<f64>, b_unit: Unit) -> bool {
    if a_unit.dimension() != b_unit.dimension() {
        return false;
    }
    match (a, b) {
        (Some(a), Some(b)) => approx_eq(a_unit.to_base(a), b_unit.to_base(b)),
        (None, None) => true,
        _ => false,
    }
}

// ============================================================================
// Value payloads
// ============================================================================

/// Amount with unit (energy, macros, serving, package amount)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FoodValue {
    pub amount: Option<f64>,
    pub unit: Unit,
}

impl FoodValue {
    pub fn new(amount: f64, unit: Unit) -> Self {
        Self {
            amount: Some(amount),
            unit,
        }
    }

    pub fn empty(unit: Unit) -> Self {
        Self { amount: None, unit }
    }

    /// Amount in the dimension's base unit
    pub fn base_amount(&self) -> Option<f64> {
        self.amount.map(|a| self.unit.to_base(a))
    }

    pub fn matches(&self, other: &FoodValue) -> bool {
        amounts_match(self.amount, self.unit, other.amount, other.unit)
    }

    fn label(&self) -> String {
        match self.amount {
            Some(a) => format!("{} {}", format_amount(a), self.unit),
            None => String::new(),
        }
    }
}

/// Weight-to-volume conversion (e.g. 100 g = 120 ml)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DensityValue {
    pub weight: FoodValue,
    pub volume: FoodValue,
}

impl DensityValue {
    /// Grams per millilitre, `None` unless both sides are positive
    pub fn ratio(&self) -> Option<f64> {
        if self.weight.unit.dimension() != Dimension::Mass
            || self.volume.unit.dimension() != Dimension::Volume
        {
            return None;
        }
        let weight = self.weight.base_amount().filter(|w| *w > 0.0)?;
        let volume = self.volume.base_amount().filter(|v| *v > 0.0)?;
        Some(weight / volume)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Symbology {
    Ean13,
    Ean8,
    UpcA,
    UpcE,
    Code128,
    Code39,
    Qr,
    DataMatrix,
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BarcodeValue {
    pub payload: String,
    pub symbology: Symbology,
}

/// Named portion size ("1 slice = 30 g")
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SizeValue {
    pub name: String,
    pub quantity: Option<f64>,
    pub value: FoodValue,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MicroValue {
    pub nutrient: NutrientType,
    pub amount: Option<f64>,
    pub unit: Unit,
}

/// FieldValue variant tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldValueKind {
    Text,
    Amount,
    Density,
    Barcode,
    Size,
    Micro,
}

/// Typed payload of one form attribute
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldValue {
    Text(String),
    Amount(FoodValue),
    Density(DensityValue),
    Barcode(BarcodeValue),
    Size(SizeValue),
    Micro(MicroValue),
}

impl FieldValue {
    /// Empty value of the variant used by `attribute`
    pub fn empty_for(attribute: Attribute) -> Self {
        match attribute.value_kind() {
            FieldValueKind::Text => FieldValue::Text(String::new()),
            FieldValueKind::Amount => FieldValue::Amount(FoodValue::empty(attribute.default_unit())),
            FieldValueKind::Density => FieldValue::Density(DensityValue {
                weight: FoodValue::empty(Unit::Gram),
                volume: FoodValue::empty(Unit::Milliliter),
            }),
            FieldValueKind::Barcode => FieldValue::Barcode(BarcodeValue {
                payload: String::new(),
                symbology: Symbology::Other,
            }),
            FieldValueKind::Size => FieldValue::Size(SizeValue {
                name: String::new(),
                quantity: None,
                value: FoodValue::empty(Unit::Gram),
            }),
            FieldValueKind::Micro => {
                let nutrient = match attribute {
                    Attribute::Micro(n) => n,
                    _ => NutrientType::Sodium,
                };
                FieldValue::Micro(MicroValue {
                    nutrient,
                    amount: None,
                    unit: nutrient.default_unit(),
                })
            }
        }
    }

    pub fn kind(&self) -> FieldValueKind {
        match self {
            FieldValue::Text(_) => FieldValueKind::Text,
            FieldValue::Amount(_) => FieldValueKind::Amount,
            FieldValue::Density(_) => FieldValueKind::Density,
            FieldValue::Barcode(_) => FieldValueKind::Barcode,
            FieldValue::Size(_) => FieldValueKind::Size,
            FieldValue::Micro(_) => FieldValueKind::Micro,
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            FieldValue::Text(text) => text.trim().is_empty(),
            FieldValue::Amount(value) => value.amount.is_none(),
            FieldValue::Density(density) => {
                density.weight.amount.is_none() && density.volume.amount.is_none()
            }
            FieldValue::Barcode(barcode) => barcode.payload.trim().is_empty(),
            FieldValue::Size(size) => {
                size.name.trim().is_empty() && size.quantity.is_none() && size.value.amount.is_none()
            }
            FieldValue::Micro(micro) => micro.amount.is_none(),
        }
    }

    /// Value-level validity, independent of whether the attribute is required
    pub fn is_valid(&self) -> bool {
        match self {
            FieldValue::Text(text) => !text.trim().is_empty(),
            FieldValue::Amount(value) => value.amount.is_some_and(|a| a >= 0.0),
            FieldValue::Density(density) => density.ratio().is_some(),
            FieldValue::Barcode(barcode) => !barcode.payload.trim().is_empty(),
            FieldValue::Size(size) => {
                size.quantity.is_some_and(|q| q > 0.0)
                    && size.value.amount.is_some_and(|a| a > 0.0)
            }
            FieldValue::Micro(micro) => micro.amount.is_some_and(|a| a >= 0.0),
        }
    }

    /// Value equality after normalization (whitespace/case, units)
    pub fn matches(&self, other: &FieldValue) -> bool {
        match (self, other) {
            (FieldValue::Text(a), FieldValue::Text(b)) => normalize_text(a) == normalize_text(b),
            (FieldValue::Amount(a), FieldValue::Amount(b)) => a.matches(b),
            (FieldValue::Density(a), FieldValue::Density(b)) => {
                a.weight.matches(&b.weight) && a.volume.matches(&b.volume)
            }
            (FieldValue::Barcode(a), FieldValue::Barcode(b)) => a.payload.trim() == b.payload.trim(),
            (FieldValue::Size(a), FieldValue::Size(b)) => {
                normalize_text(&a.name) == normalize_text(&b.name)
                    && match (a.quantity, b.quantity) {
                        (Some(x), Some(y)) => approx_eq(x, y),
                        (None, None) => true,
                        _ => false,
                    }
                    && a.value.matches(&b.value)
            }
            (FieldValue::Micro(a), FieldValue::Micro(b)) => {
                a.nutrient == b.nutrient && amounts_match(a.amount, a.unit, b.amount, b.unit)
            }
            _ => false,
        }
    }

    /// Short human-readable rendering for option lists
    pub fn display_label(&self) -> String {
        match self {
            FieldValue::Text(text) => text.trim().to_string(),
            FieldValue::Amount(value) => value.label(),
            FieldValue::Density(density) => {
                format!("{} = {}", density.weight.label(), density.volume.label())
            }
            FieldValue::Barcode(barcode) => barcode.payload.clone(),
            FieldValue::Size(size) => {
                let quantity = size.quantity.map(format_amount).unwrap_or_default();
                format!("{} {} = {}", quantity, size.name, size.value.label())
                    .trim()
                    .to_string()
            }
            FieldValue::Micro(micro) => match micro.amount {
                Some(a) => format!("{} {}", format_amount(a), micro.unit),
                None => String::new(),
            },
        }
    }

    pub fn as_food_value(&self) -> Option<&FoodValue> {
        match self {
            FieldValue::Amount(value) => Some(value),
            _ => None,
        }
    }

    pub fn barcode_payload(&self) -> Option<&str> {
        match self {
            FieldValue::Barcode(barcode) => Some(barcode.payload.as_str()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Macro;

    #[test]
    fn test_unit_parse() {
        assert_eq!(Unit::parse("kcal"), Some(Unit::Kilocalorie));
        assert_eq!(Unit::parse("kJ"), Some(Unit::Kilojoule));
        assert_eq!(Unit::parse("µg"), Some(Unit::Microgram));
        assert_eq!(Unit::parse("fl. oz"), Some(Unit::FluidOunce));
        assert_eq!(Unit::parse("%"), Some(Unit::Percent));
        assert_eq!(Unit::parse("parsecs"), None);
    }

    #[test]
    fn test_amount_matching_normalizes_units() {
        let grams = FieldValue::Amount(FoodValue::new(1.5, Unit::Gram));
        let milligrams = FieldValue::Amount(FoodValue::new(1500.0, Unit::Milligram));
        assert!(grams.matches(&milligrams));

        // 250 kcal is exactly 1046 kJ
        let kcal = FieldValue::Amount(FoodValue::new(250.0, Unit::Kilocalorie));
        let kj = FieldValue::Amount(FoodValue::new(1046.0, Unit::Kilojoule));
        assert!(kcal.matches(&kj));

        let other_kj = FieldValue::Amount(FoodValue::new(1000.0, Unit::Kilojoule));
        assert!(!kcal.matches(&other_kj));
    }

    #[test]
    fn test_different_dimensions_never_match() {
        let mass = FieldValue::Amount(FoodValue::new(100.0, Unit::Gram));
        let volume = FieldValue::Amount(FoodValue::new(100.0, Unit::Milliliter));
        assert!(!mass.matches(&volume));
    }

    #[test]
    fn test_text_matching_ignores_case_and_spacing() {
        let a = FieldValue::Text("Almond  Butter".to_string());
        let b = FieldValue::Text(" almond butter ".to_string());
        assert!(a.matches(&b));
        assert!(!a.matches(&FieldValue::Text("Almonds".to_string())));
    }

    #[test]
    fn test_density_validity_requires_positive_ratio() {
        let mut density = DensityValue {
            weight: FoodValue::new(100.0, Unit::Gram),
            volume: FoodValue::new(120.0, Unit::Milliliter),
        };
        assert!(FieldValue::Density(density).is_valid());

        density.volume.amount = Some(0.0);
        assert!(!FieldValue::Density(density).is_valid());
    }

    #[test]
    fn test_size_validity_requires_quantity_and_value() {
        let mut size = SizeValue {
            name: "slice".to_string(),
            quantity: Some(1.0),
            value: FoodValue::new(30.0, Unit::Gram),
        };
        assert!(FieldValue::Size(size.clone()).is_valid());

        size.quantity = None;
        assert!(!FieldValue::Size(size).is_valid());
    }

    #[test]
    fn test_empty_for_uses_attribute_variant() {
        let energy = FieldValue::empty_for(Attribute::Energy);
        assert_eq!(energy.kind(), FieldValueKind::Amount);
        assert_eq!(energy.as_food_value().unwrap().unit, Unit::Kilocalorie);
        assert!(energy.is_empty());

        let carb = FieldValue::empty_for(Attribute::Macro(Macro::Carb));
        assert_eq!(carb.as_food_value().unwrap().unit, Unit::Gram);

        let sodium = FieldValue::empty_for(Attribute::Micro(NutrientType::Sodium));
        match sodium {
            FieldValue::Micro(micro) => assert_eq!(micro.unit, Unit::Milligram),
            other => panic!("unexpected variant {:?}", other),
        }
    }

    #[test]
    fn test_display_label() {
        let value = FieldValue::Amount(FoodValue::new(250.0, Unit::Kilocalorie));
        assert_eq!(value.display_label(), "250 kcal");

        let value = FieldValue::Amount(FoodValue::new(2.5, Unit::Gram));
        assert_eq!(value.display_label(), "2.5 g");
    }
}
