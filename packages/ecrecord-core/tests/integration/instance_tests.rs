//! Instance memory through the public API.

use ntest::timeout;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;
use std::thread;

use ecrecord_core::config::EngineConfig;
use ecrecord_core::error::InstanceError;
use ecrecord_core::instance::{InstanceStorage, MemoryInstanceSupport, SetOutcome};
use ecrecord_core::types::{EcValue, Point2d};
use ecrecord_core::StandaloneInstance;

use super::helpers::{new_instance, order_schema_layout, sample_order};

fn offset_of(instance: &StandaloneInstance, access_string: &str) -> u32 {
    let prop = instance.class_layout().get_property_layout(access_string).unwrap();
    instance.get_offset_of_property_value(prop, None).unwrap()
}

#[timeout(1000)]
#[test]
fn test_new_order_reads_null_everywhere() {
    let schema_layout = order_schema_layout();
    let order = new_instance(&schema_layout, "Order");
    for access_string in ["Number", "Customer", "Discount", "Address.Street", "Address.Location", "Signature"] {
        assert!(order.is_null(access_string).unwrap(), "{access_string}");
        assert_eq!(order.get_value(access_string).unwrap(), EcValue::Null);
    }
    assert_eq!(order.array_count("Quantities").unwrap(), 3);
    assert_eq!(order.array_count("Notes").unwrap(), 0);
    assert_eq!(order.bytes_used(), order.class_layout().size_of_fixed_section());
}

#[timeout(1000)]
#[test]
fn test_sample_order_round_trip() {
    let schema_layout = order_schema_layout();
    let handle = sample_order(&schema_layout);
    let order = handle.read();
    assert_eq!(order.get_value("Number").unwrap(), EcValue::Long(1001));
    assert_eq!(order.get_value("Customer").unwrap(), EcValue::from("Acme"));
    assert_eq!(order.get_value("Shipped").unwrap(), EcValue::Boolean(false));
    assert_eq!(order.get_value("Placed").unwrap(), EcValue::DateTime(637_000_000_000_000_000));
    assert_eq!(
        order.get_value("Address.Location").unwrap(),
        EcValue::Point2d(Point2d { x: 4.0, y: 5.0 })
    );
    assert_eq!(order.get_value_at("Quantities", 2).unwrap(), EcValue::Integer(30));
    assert_eq!(order.get_value_at("Notes", 1).unwrap(), EcValue::from("gift"));

    let EcValue::Struct(Some(line)) = order.get_value_at("Lines", 1).unwrap() else {
        panic!("expected a struct element");
    };
    assert_eq!(line.read().get_value("Sku").unwrap(), EcValue::from("B-2"));

    let dump = order.to_string();
    assert!(dump.contains("Customer"));
    assert!(dump.contains("\"Acme\""));
}

#[timeout(1000)]
#[test]
fn test_growing_string_shifts_later_binary() {
    let schema_layout = order_schema_layout();
    let mut order = new_instance(&schema_layout, "Order");
    let signature = EcValue::Binary(vec![0xde, 0xad, 0xbe, 0xef, 0x01]);
    order.set_value("Customer", &EcValue::from("Acme")).unwrap();
    order.set_value("Signature", &signature).unwrap();

    let before = offset_of(&order, "Signature");
    let used_before = order.bytes_used();
    let long_name = "x".repeat(400);
    assert_eq!(
        order.set_value("Customer", &EcValue::from(long_name.as_str())).unwrap(),
        SetOutcome::Changed
    );

    assert_eq!(offset_of(&order, "Signature"), before + 792);
    assert_eq!(order.bytes_used(), used_before + 792);
    assert_eq!(order.get_value("Signature").unwrap(), signature);
    assert_eq!(order.get_value("Customer").unwrap(), EcValue::from(long_name.as_str()));
    assert_eq!(
        order.set_value("Customer", &EcValue::from(long_name.as_str())).unwrap(),
        SetOutcome::Unchanged
    );
}

#[timeout(1000)]
#[test]
fn test_failed_growth_leaves_instance_untouched() {
    let schema_layout = order_schema_layout();
    let layout = schema_layout.find_class_layout("Order").unwrap();
    let config = EngineConfig {
        initial_instance_capacity: 0,
        max_instance_bytes: layout.size_of_fixed_section() as usize + 64,
        grow_by_doubling: false,
        ..EngineConfig::default()
    };
    let mut order = StandaloneInstance::with_config(layout, config).unwrap();
    order.set_value("Customer", &EcValue::from("Acme")).unwrap();
    order.set_value("Signature", &EcValue::Binary(vec![1, 2, 3])).unwrap();
    let snapshot = order.used_data().to_vec();

    let error = order
        .set_value("Customer", &EcValue::from("y".repeat(200).as_str()))
        .unwrap_err();
    assert!(matches!(error, InstanceError::MemoryLimitExceeded { .. }));
    assert_eq!(order.used_data(), snapshot.as_slice());
    assert_eq!(order.get_value("Customer").unwrap(), EcValue::from("Acme"));
    assert_eq!(order.get_value("Signature").unwrap(), EcValue::Binary(vec![1, 2, 3]));

    let error = order.add_array_elements("Notes", 100).unwrap_err();
    assert!(matches!(error, InstanceError::MemoryLimitExceeded { .. }));
    assert_eq!(order.array_count("Notes").unwrap(), 0);
}

#[timeout(1000)]
#[test]
fn test_read_only_and_precondition_errors() {
    let schema_layout = order_schema_layout();
    let handle = sample_order(&schema_layout);
    let mut order = handle.write();
    assert_eq!(
        order.set_value("Number", &EcValue::Long(1)).unwrap_err(),
        InstanceError::ReadOnly {
            access_string: "Number".into()
        }
    );
    assert!(matches!(
        order.set_value("Discount", &EcValue::from("ten")),
        Err(InstanceError::DataTypeMismatch { .. })
    ));
    assert!(matches!(
        order.insert_array_elements("Quantities", 0, 1),
        Err(InstanceError::PreconditionViolated(_))
    ));
    assert!(matches!(
        order.get_value("Nope"),
        Err(InstanceError::PropertyNotFound { .. })
    ));
    assert!(matches!(
        order.get_value_at("Notes", 2),
        Err(InstanceError::IndexOutOfRange { index: 2, count: 2, .. })
    ));
}

#[timeout(5000)]
#[test]
fn test_random_note_edits_match_model() {
    let schema_layout = order_schema_layout();
    let mut order = new_instance(&schema_layout, "Order");
    order.set_value("Signature", &EcValue::Binary(vec![9; 16])).unwrap();
    let mut model: Vec<Option<String>> = Vec::new();
    let mut rng = StdRng::seed_from_u64(7);

    for step in 0..200 {
        match rng.gen_range(0..4) {
            0 => {
                let index = rng.gen_range(0..=model.len());
                let count = rng.gen_range(1..4);
                order.insert_array_elements("Notes", index as u32, count as u32).unwrap();
                for _ in 0..count {
                    model.insert(index, None);
                }
            }
            1 if !model.is_empty() => {
                let index = rng.gen_range(0..model.len());
                let count = rng.gen_range(1..=(model.len() - index).min(3));
                order.remove_array_elements("Notes", index as u32, count as u32).unwrap();
                model.drain(index..index + count);
            }
            _ if !model.is_empty() => {
                let index = rng.gen_range(0..model.len());
                let text = "n".repeat(rng.gen_range(0..40));
                order
                    .set_value_at("Notes", index as u32, &EcValue::from(text.as_str()))
                    .unwrap();
                model[index] = Some(text);
            }
            _ => {}
        }

        assert_eq!(order.array_count("Notes").unwrap() as usize, model.len(), "step {step}");
        for (index, expected) in model.iter().enumerate() {
            let expected = expected.as_deref().map_or(EcValue::Null, EcValue::from);
            assert_eq!(order.get_value_at("Notes", index as u32).unwrap(), expected, "step {step}");
        }
        assert_eq!(order.get_value("Signature").unwrap(), EcValue::Binary(vec![9; 16]));
        assert!(order.bytes_used() as usize <= order.bytes_allocated());
    }
}

#[timeout(1000)]
#[test]
fn test_removing_elements_shrinks_used_bytes() {
    let schema_layout = order_schema_layout();
    let handle = sample_order(&schema_layout);
    let mut order = handle.write();
    let before = order.bytes_used();
    order.remove_array_elements("Notes", 0, 1).unwrap();
    assert_eq!(order.array_count("Notes").unwrap(), 1);
    assert_eq!(order.get_value_at("Notes", 0).unwrap(), EcValue::from("gift"));
    assert!(order.bytes_used() < before);

    order.remove_array_elements("Lines", 0, 2).unwrap();
    assert_eq!(order.array_count("Lines").unwrap(), 0);
}

#[timeout(5000)]
#[test]
fn test_handle_shared_between_threads() {
    let schema_layout = order_schema_layout();
    let handle = sample_order(&schema_layout);

    let writers: Vec<_> = (0..4)
        .map(|i| {
            let handle = Arc::clone(&handle);
            thread::spawn(move || {
                for _ in 0..25 {
                    let mut order = handle.write();
                    let count = order.array_count("Notes").unwrap();
                    order.add_array_elements("Notes", 1).unwrap();
                    order
                        .set_value_at("Notes", count, &EcValue::from(format!("t{i}")))
                        .unwrap();
                }
            })
        })
        .collect();
    for writer in writers {
        writer.join().unwrap();
    }

    let order = handle.read();
    assert_eq!(order.array_count("Notes").unwrap(), 102);
    assert_eq!(order.get_value("Customer").unwrap(), EcValue::from("Acme"));
}
