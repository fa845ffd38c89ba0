//! Schema loading and layout registration.

use ntest::timeout;
use std::sync::Arc;
use std::thread;

use ecrecord_core::error::LayoutError;
use ecrecord_core::layout::{build_from_class, ClassDefinition, PropertyDefinition, SchemaLayout};
use ecrecord_core::types::{PrimitiveType, TypeDescriptor};

use super::helpers::{order_schema, order_schema_layout};

#[timeout(1000)]
#[test]
fn test_build_all_registers_classes_in_order() {
    let schema_layout = order_schema_layout();
    assert_eq!(schema_layout.max_class_index(), Some(2));
    assert_eq!(schema_layout.get_class_layout(0).unwrap().name(), "Order");
    assert_eq!(schema_layout.get_class_layout(1).unwrap().name(), "Address");
    assert_eq!(schema_layout.find_class_layout("Line").unwrap().class_index(), 2);
    assert_eq!(schema_layout.find_available_class_index().unwrap(), 3);

    // a second pass skips classes already present
    schema_layout.build_all(&order_schema()).unwrap();
    assert_eq!(schema_layout.max_class_index(), Some(2));
}

#[timeout(1000)]
#[test]
fn test_order_layout_shape() {
    let schema_layout = order_schema_layout();
    let order = schema_layout.find_class_layout("Order").unwrap();

    let street = order.get_property_layout("Address.Street").unwrap();
    assert_eq!(street.primitive_type(), Some(PrimitiveType::String));
    assert!(order.get_property_layout("Address").unwrap().is_struct());
    assert!(order.get_property_layout("Quantities").unwrap().is_fixed_sized());
    assert_eq!(
        order.get_property_layout("Lines").unwrap().type_descriptor(),
        &TypeDescriptor::StructArray
    );

    let number = order.get_property_index("Number").unwrap();
    assert!(order.is_property_read_only(number));

    // fixed-size properties precede every variable-size one
    let last_fixed = order
        .property_layouts()
        .filter(|p| !p.is_struct() && p.is_fixed_sized())
        .map(|p| p.offset())
        .max()
        .unwrap();
    assert!(order.variable_property_layouts().all(|p| p.offset() > last_fixed));
    assert!(order.size_of_fixed_section() > last_fixed);

    let dump = order.to_string();
    assert!(dump.starts_with("ClassLayout for class index 0 (Order)"));
    assert!(dump.contains("Address.Location"));
    assert!(dump.contains("Logical Structure:"));
}

#[timeout(1000)]
#[test]
fn test_rebuilt_layouts_are_identical_and_compatible() {
    let schema = order_schema();
    let first = build_from_class(&schema, "Order", 0, 0).unwrap();
    let second = build_from_class(&schema, "Order", 0, 0).unwrap();
    assert_eq!(first.size_of_fixed_section(), second.size_of_fixed_section());
    let offsets = |layout: &ecrecord_core::layout::ClassLayout| -> Vec<(String, u32)> {
        layout
            .property_layouts()
            .map(|p| (p.access_string().to_string(), p.offset()))
            .collect()
    };
    assert_eq!(offsets(&first), offsets(&second));
    assert!(first.is_compatible(&second));

    let line = build_from_class(&schema, "Line", 0, 0).unwrap();
    assert!(!first.is_compatible(&line));
}

#[timeout(1000)]
#[test]
fn test_schema_errors() {
    let mut schema = order_schema();
    schema.classes[0]
        .properties
        .push(PropertyDefinition::structure("Billing", "Missing"));

    let error = build_from_class(&schema, "Order", 0, 0).unwrap_err();
    assert_eq!(
        error,
        LayoutError::ClassNotFound {
            schema: "Shop".into(),
            class: "Missing".into()
        }
    );
    build_from_class(&schema, "Line", 0, 0).unwrap();

    schema.classes.push(ClassDefinition::new(
        "Node",
        vec![PropertyDefinition::structure("Inner", "Node")],
    ));
    assert_eq!(
        build_from_class(&schema, "Node", 0, 0).unwrap_err(),
        LayoutError::RecursiveStruct { class: "Node".into() }
    );
}

#[timeout(1000)]
#[test]
fn test_class_index_collision() {
    let schema_layout = SchemaLayout::new(7);
    let schema = order_schema();
    let order = Arc::new(build_from_class(&schema, "Order", 4, 7).unwrap());
    let line = Arc::new(build_from_class(&schema, "Line", 4, 7).unwrap());
    schema_layout.add_class_layout(order).unwrap();
    assert_eq!(
        schema_layout.add_class_layout(line).unwrap_err(),
        LayoutError::ClassIndexInUse {
            class_index: 4,
            existing: "Order".into()
        }
    );
    assert_eq!(schema_layout.find_available_class_index().unwrap(), 0);
}

#[timeout(5000)]
#[test]
fn test_layout_shared_across_threads() {
    let schema_layout = Arc::new(order_schema_layout());
    let handles: Vec<_> = (0..4)
        .map(|_| {
            let schema_layout = Arc::clone(&schema_layout);
            thread::spawn(move || {
                let order = schema_layout.find_class_layout("Order").unwrap();
                (order.size_of_fixed_section(), order.property_count())
            })
        })
        .collect();
    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    assert!(results.windows(2).all(|w| w[0] == w[1]));
}
