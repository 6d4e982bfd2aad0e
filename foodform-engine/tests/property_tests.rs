// Reconciliation law tests
//
// Each law is checked over a table of fills and values rather than a single
// example.

use foodform_common::config::{EmptyScanPolicy, EngineSettings};
use foodform_engine::fill::ScanRef;
use foodform_engine::scan::{DecodedBarcode, ScanOutput, ScanResult, TextRegion};
use foodform_engine::types::{PrefillRecordId, TextRegionId};
use foodform_engine::value::{DensityValue, FoodValue, SizeValue, Symbology, Unit};
use foodform_engine::{Attribute, Field, FieldValue, Fill, FormSession, ImageId};
use std::collections::HashSet;
use std::sync::Arc;

fn all_fills(image_id: ImageId) -> Vec<Fill> {
    let scanned = Fill::Scanned(ScanRef {
        image_id,
        regions: vec![TextRegionId::new()],
        column: None,
    });
    let barcode = Fill::BarcodeScanned {
        image_id,
        payload: "123".to_string(),
    };
    let prefill = Fill::Prefill {
        record_id: PrefillRecordId("rec".to_string()),
        field_names: vec!["energy".to_string()],
    };
    vec![
        Fill::Unfilled,
        Fill::UserInput,
        Fill::Discardable,
        Fill::selection(scanned.clone()),
        Fill::selection(prefill.clone()),
        scanned,
        barcode,
        prefill,
    ]
}

fn sample_values() -> Vec<(Attribute, FieldValue)> {
    vec![
        (Attribute::Name, FieldValue::Text("Oats".to_string())),
        (Attribute::Name, FieldValue::Text("   ".to_string())),
        (
            Attribute::Energy,
            FieldValue::Amount(FoodValue::new(250.0, Unit::Kilocalorie)),
        ),
        (Attribute::Energy, FieldValue::Amount(FoodValue::empty(Unit::Kilocalorie))),
        (
            Attribute::Density,
            FieldValue::Density(DensityValue {
                weight: FoodValue::new(100.0, Unit::Gram),
                volume: FoodValue::new(0.0, Unit::Milliliter),
            }),
        ),
        (
            Attribute::Size,
            FieldValue::Size(SizeValue {
                name: "slice".to_string(),
                quantity: Some(1.0),
                value: FoodValue::new(30.0, Unit::Gram),
            }),
        ),
    ]
}

fn scan_of(regions: &[(Attribute, &str)]) -> ScanOutput {
    ScanOutput {
        scan: Some(ScanResult {
            regions: regions
                .iter()
                .map(|(attribute, raw)| TextRegion {
                    id: TextRegionId::new(),
                    attribute: *attribute,
                    raw: raw.to_string(),
                    columns: Vec::new(),
                    linked_region: None,
                    bounds: None,
                })
                .collect(),
            headers: None,
        }),
        barcodes: Vec::new(),
    }
}

/// Every image is referenced, holds a used barcode, or is still in flight
fn assert_reachable(session: &FormSession) {
    let referenced: HashSet<ImageId> = session
        .fields()
        .iter()
        .filter_map(|f| f.provenance().image_id())
        .collect();
    let used: HashSet<&str> = session
        .fields()
        .iter()
        .filter(|f| f.attribute() == Attribute::Barcode)
        .filter_map(|f| f.value().barcode_payload())
        .collect();

    for image in session.images().iter() {
        let reachable = referenced.contains(&image.id)
            || image.barcodes.iter().any(|b| used.contains(b.payload.as_str()))
            || image.is_in_flight();
        assert!(reachable, "image {} is unreachable", image.id);
    }
}

// ================================================================================================
// Validity is a pure function of (value, fill)
// ================================================================================================

#[test]
fn validity_depends_only_on_value_and_fill() {
    let image_id = ImageId::new();
    for (attribute, value) in sample_values() {
        let verdicts: HashSet<bool> = all_fills(image_id)
            .into_iter()
            .map(|fill| {
                let mut field = Field::new(attribute);
                field.fill(value.clone(), fill).unwrap();
                let first = field.is_valid();
                assert_eq!(first, field.is_valid());
                first
            })
            .collect();

        // Provenance never changes the verdict for the same value
        assert_eq!(verdicts.len(), 1, "{} {:?}", attribute, value);
    }
}

// ================================================================================================
// Accepting an option twice equals accepting it once
// ================================================================================================

#[test]
fn accepting_an_option_is_idempotent() {
    // Accepting one option orphans the others' images, so each option gets a
    // fresh session
    for index in 0..3 {
        let mut session = FormSession::new(EngineSettings::default());
        for raw in ["Energy 250 kcal", "Energy 300 kcal", "Energy 1200 kJ"] {
            let image_id = session.add_image(Arc::from(vec![1u8]));
            session
                .apply_scan_result(image_id, Ok(scan_of(&[(Attribute::Energy, raw)])))
                .unwrap();
        }

        let energy = session.field_for(Attribute::Energy).map(Field::id).unwrap();
        let options = session.options_for(energy).unwrap();
        assert_eq!(options.len(), 3);
        let option = &options[index];

        session.accept_option(energy, option).unwrap();
        let field = session.field(energy).unwrap();
        let after_first = (field.value().clone(), field.provenance().clone());
        assert_eq!(after_first.0, option.value);

        session.accept_option(energy, option).unwrap();
        let field = session.field(energy).unwrap();
        assert_eq!((field.value().clone(), field.provenance().clone()), after_first);
    }
}

// ================================================================================================
// Equal normalized values from several images are offered once
// ================================================================================================

#[test]
fn equal_values_across_images_are_offered_once() {
    let cases: [(Attribute, [&str; 3]); 3] = [
        (Attribute::Energy, ["250 kcal", "1046 kJ", "250kcal"]),
        (Attribute::Name, ["Almond Butter", "almond  butter", "ALMOND BUTTER"]),
        (
            Attribute::Macro(foodform_engine::types::Macro::Fat),
            ["1,5 g", "1.5g", "1500 mg"],
        ),
    ];

    for (attribute, raws) in cases {
        let mut session = FormSession::new(EngineSettings::default());
        for raw in raws {
            let image_id = session.add_image(Arc::from(vec![1u8]));
            session
                .apply_scan_result(image_id, Ok(scan_of(&[(attribute, raw)])))
                .unwrap();
        }

        assert_eq!(session.aggregator().candidates_for(attribute).len(), 3);
        let field_id = session.field_for(attribute).map(Field::id).unwrap();
        let options = session.options_for(field_id).unwrap();
        assert_eq!(options.len(), 1, "{}: {:?}", attribute, options);
    }
}

// ================================================================================================
// Discard followed by user input always ends in user input
// ================================================================================================

#[test]
fn discard_then_user_input_is_user_input() {
    let image_id = ImageId::new();
    for fill in all_fills(image_id) {
        let mut field = Field::new(Attribute::Name);
        field.fill(FieldValue::Text("Oats".to_string()), fill).unwrap();

        field.register_discarded_scan();
        field.register_user_input();

        assert_eq!(field.provenance(), &Fill::UserInput);
        assert!(field.image().is_none());
        assert!(!field.is_cropping());
    }
}

// ================================================================================================
// Image reachability after user mutations
// ================================================================================================

#[test]
fn images_stay_reachable_after_user_operations() {
    for policy in [EmptyScanPolicy::Keep, EmptyScanPolicy::Prune] {
        let settings = EngineSettings {
            empty_scan_policy: policy,
            ..EngineSettings::default()
        };
        let mut session = FormSession::new(settings);

        let label = session.add_image(Arc::from(vec![1u8]));
        session
            .apply_scan_result(
                label,
                Ok(scan_of(&[
                    (Attribute::Name, "Oats"),
                    (Attribute::Energy, "Energy 380 kcal"),
                    (Attribute::Macro(foodform_engine::types::Macro::Carb), "Carbohydrate 60 g"),
                ])),
            )
            .unwrap();

        let barcode_only = session.add_image(Arc::from(vec![2u8]));
        session
            .apply_scan_result(
                barcode_only,
                Ok(ScanOutput {
                    scan: None,
                    barcodes: vec![
                        DecodedBarcode {
                            payload: "111".to_string(),
                            symbology: Symbology::Ean8,
                        },
                        DecodedBarcode {
                            payload: "222".to_string(),
                            symbology: Symbology::Ean8,
                        },
                    ],
                }),
            )
            .unwrap();

        let empty_scan = session.add_image(Arc::from(vec![3u8]));
        session
            .apply_scan_result(
                empty_scan,
                Ok(ScanOutput {
                    scan: Some(ScanResult::default()),
                    barcodes: vec![DecodedBarcode {
                        payload: "333".to_string(),
                        symbology: Symbology::Ean8,
                    }],
                }),
            )
            .unwrap();

        // Still processing: must survive every prune
        let processing = session.add_image(Arc::from(vec![4u8]));
        session.mark_scan_started(processing).unwrap();

        let name = session.field_for(Attribute::Name).map(Field::id).unwrap();
        let energy = session.field_for(Attribute::Energy).map(Field::id).unwrap();

        session.remove_barcode("111");
        assert_reachable(&session);
        assert!(session.images().contains(barcode_only));

        session
            .register_user_input(name, FieldValue::Text("Rolled oats".to_string()))
            .unwrap();
        assert_reachable(&session);

        session.discard_scan(energy).unwrap();
        assert_reachable(&session);

        session.remove_barcode("333");
        assert_reachable(&session);
        assert!(!session.images().contains(empty_scan));

        session.remove_barcode("222");
        assert_reachable(&session);
        assert!(!session.images().contains(barcode_only));

        session.discard_all_scanned();
        assert_reachable(&session);
        assert!(!session.images().contains(label));
        assert!(session.images().contains(processing));
    }
}
