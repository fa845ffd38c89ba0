//! Shared fixtures for the integration suite.

use ecrecord_core::layout::{SchemaDefinition, SchemaLayout};
use ecrecord_core::types::EcValue;
use ecrecord_core::{InstanceHandle, StandaloneInstance};

/// Order schema in the JSON form accepted by `ecrecord-tool`.
pub const ORDER_SCHEMA: &str = r#"{
    "name": "Shop",
    "classes": [
        {
            "name": "Order",
            "properties": [
                { "name": "Number", "kind": "primitive", "type": "long", "read_only": true },
                { "name": "Customer", "kind": "primitive", "type": "string" },
                { "name": "Discount", "kind": "primitive", "type": "double" },
                { "name": "Shipped", "kind": "primitive", "type": "boolean" },
                { "name": "Placed", "kind": "primitive", "type": "datetime" },
                { "name": "Quantities", "kind": "primitive_array", "element": "integer", "min_occurs": 3, "max_occurs": 3 },
                { "name": "Address", "kind": "struct", "class": "Address" },
                { "name": "Notes", "kind": "primitive_array", "element": "string" },
                { "name": "Lines", "kind": "struct_array", "class": "Line" },
                { "name": "Signature", "kind": "primitive", "type": "binary" }
            ]
        },
        {
            "name": "Address",
            "properties": [
                { "name": "Street", "kind": "primitive", "type": "string" },
                { "name": "Location", "kind": "primitive", "type": "point2d" }
            ]
        },
        {
            "name": "Line",
            "properties": [
                { "name": "Sku", "kind": "primitive", "type": "string" },
                { "name": "Price", "kind": "primitive", "type": "double" },
                { "name": "Count", "kind": "primitive", "type": "integer" }
            ]
        }
    ]
}"#;

pub fn order_schema() -> SchemaDefinition {
    serde_json::from_str(ORDER_SCHEMA).unwrap()
}

pub fn order_schema_layout() -> SchemaLayout {
    let schema_layout = SchemaLayout::new(0);
    schema_layout.build_all(&order_schema()).unwrap();
    schema_layout
}

pub fn new_instance(schema_layout: &SchemaLayout, class: &str) -> StandaloneInstance {
    let layout = schema_layout.find_class_layout(class).unwrap();
    StandaloneInstance::new(layout).unwrap()
}

pub fn line(schema_layout: &SchemaLayout, sku: &str, price: f64, count: i32) -> InstanceHandle {
    let mut instance = new_instance(schema_layout, "Line");
    instance
        .set_values_from_json(&serde_json::json!({ "Sku": sku, "Price": price, "Count": count }))
        .unwrap();
    instance.into_handle()
}

/// Order with three quantities, an address, two notes and two lines.
pub fn sample_order(schema_layout: &SchemaLayout) -> InstanceHandle {
    let mut order = new_instance(schema_layout, "Order");
    order
        .set_values_from_json(&serde_json::json!({
            "Customer": "Acme",
            "Discount": 0.1,
            "Shipped": false,
            "Placed": 637_000_000_000_000_000i64,
            "Quantities": [10, 20, 30],
            "Address": { "Street": "1 Main St", "Location": [4.0, 5.0] },
            "Notes": ["fragile", "gift"],
        }))
        .unwrap();
    order
        .set_internal_value("Number", None, &EcValue::Long(1001))
        .unwrap();
    let lines = [line(schema_layout, "A-1", 2.5, 4), line(schema_layout, "B-2", 10.0, 1)];
    order.add_array_elements("Lines", lines.len() as u32).unwrap();
    for (index, handle) in lines.into_iter().enumerate() {
        order
            .set_value_at("Lines", index as u32, &EcValue::Struct(Some(handle)))
            .unwrap();
    }
    order.into_handle()
}

