//! Serializable form snapshot handed to the persistence layer
//!
//! Only the authoritative `(value, fill)` pair of each field is recorded;
//! crop state is derived and left out.

use crate::error::EngineResult;
use crate::field::Field;
use crate::fill::Fill;
use crate::types::{Attribute, FieldId, ImageId};
use crate::value::FieldValue;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSnapshot {
    pub field_id: FieldId,
    pub attribute: Attribute,
    pub value: FieldValue,
    pub fill: Fill,
}

impl From<&Field> for FieldSnapshot {
    fn from(field: &Field) -> Self {
        Self {
            field_id: field.id(),
            attribute: field.attribute(),
            value: field.value().clone(),
            fill: field.provenance().clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormSnapshot {
    pub session_id: Uuid,
    pub taken_at: DateTime<Utc>,
    pub fields: Vec<FieldSnapshot>,
    /// Images still held by the session, in addition order
    pub image_ids: Vec<ImageId>,
    #[serde(default)]
    pub prefill_source_url: Option<String>,
}

impl FormSnapshot {
    pub fn field(&self, attribute: Attribute) -> Option<&FieldSnapshot> {
        self.fields.iter().find(|f| f.attribute == attribute)
    }

    pub fn to_json(&self) -> EngineResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn to_json_pretty(&self) -> EngineResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fill::ScanRef;
    use crate::types::TextRegionId;

    #[test]
    fn test_snapshot_json_shape() {
        let image_id = ImageId::new();
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

        let snapshot = FormSnapshot {
            session_id: Uuid::new_v4(),
            taken_at: Utc::now(),
            fields: vec![FieldSnapshot::from(&field)],
            image_ids: vec![image_id],
            prefill_source_url: None,
        };

        let json: serde_json::Value = serde_json::from_str(&snapshot.to_json().unwrap()).unwrap();
        assert_eq!(json["fields"][0]["attribute"], "name");
        assert_eq!(json["fields"][0]["value"]["text"], "Oats");
        assert_eq!(json["fields"][0]["fill"]["type"], "scanned");
        assert_eq!(json["fields"][0]["fill"]["image_id"], image_id.to_string());
    }
}
