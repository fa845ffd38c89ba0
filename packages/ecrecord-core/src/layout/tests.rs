use super::*;
use crate::error::LayoutError;
use crate::instance::memory::read_u32;
use crate::types::{PrimitiveType, TypeDescriptor};
use ntest::timeout;
use std::sync::Arc;

fn person_schema() -> SchemaDefinition {
    SchemaDefinition {
        name: "Test".to_string(),
        classes: vec![
            ClassDefinition::new(
                "Person",
                vec![
                    PropertyDefinition::primitive("Age", PrimitiveType::Integer),
                    PropertyDefinition::primitive("Name", PrimitiveType::String),
                    PropertyDefinition::structure("Address", "Address"),
                    PropertyDefinition::primitive("Height", PrimitiveType::Double),
                    PropertyDefinition::primitive_array("Scores", PrimitiveType::Integer, 3, 3),
                    PropertyDefinition::primitive_array("Tags", PrimitiveType::String, 0, u32::MAX),
                ],
            ),
            ClassDefinition::new(
                "Address",
                vec![
                    PropertyDefinition::primitive("City", PrimitiveType::String),
                    PropertyDefinition::primitive("Zip", PrimitiveType::Integer),
                ],
            ),
        ],
    }
}

fn simple_layout() -> ClassLayout {
    let mut factory = ClassLayoutFactory::new("Simple", 1, 0).unwrap();
    factory
        .add_fixed_size_property("A", PrimitiveType::Integer, false)
        .unwrap();
    factory
        .add_fixed_size_property("B", PrimitiveType::Double, false)
        .unwrap();
    factory
        .add_variable_size_property("C", TypeDescriptor::Primitive(PrimitiveType::String), false)
        .unwrap();
    factory
        .add_variable_size_property("D", TypeDescriptor::Primitive(PrimitiveType::Binary), false)
        .unwrap();
    factory.finish()
}

#[timeout(1000)]
#[test]
fn test_factory_assigns_offsets() {
    let layout = simple_layout();

    assert_eq!(layout.property_count(), 5);
    assert_eq!(layout.property_count_excluding_embedded_structs(), 4);
    assert_eq!(layout.get_property_layout("A").unwrap().offset(), 12);
    assert_eq!(layout.get_property_layout("B").unwrap().offset(), 16);
    assert_eq!(layout.get_property_layout("C").unwrap().offset(), 24);
    assert_eq!(layout.get_property_layout("D").unwrap().offset(), 28);
    // two secondary offsets plus the sentinel
    assert_eq!(layout.size_of_fixed_section(), 36);

    let d = layout.get_property_layout("D").unwrap();
    assert_eq!(d.null_flags_offset(), INSTANCE_HEADER_SIZE);
    assert_eq!(d.null_flags_bitmask(), 1 << 3);
    assert!(!d.is_fixed_sized());
}

#[timeout(1000)]
#[test]
fn test_fixed_only_layout_has_no_sentinel() {
    let mut factory = ClassLayoutFactory::new("Point", 2, 0).unwrap();
    factory
        .add_fixed_size_property("X", PrimitiveType::Double, false)
        .unwrap();
    factory
        .add_fixed_size_property("Y", PrimitiveType::Double, false)
        .unwrap();
    let layout = factory.finish();

    assert_eq!(layout.size_of_fixed_section(), 28);
    assert_eq!(layout.variable_property_layouts().count(), 0);

    let mut data = vec![0u8; 28];
    layout.initialize_memory_for_instance(&mut data).unwrap();
    assert_eq!(layout.calculate_bytes_used(&data), 28);
}

#[timeout(1000)]
#[test]
fn test_thirty_third_property_adds_null_flag_word() {
    let mut factory = ClassLayoutFactory::new("Wide", 1, 0).unwrap();
    for i in 0..33 {
        factory
            .add_fixed_size_property(&format!("P{i}"), PrimitiveType::Integer, false)
            .unwrap();
    }
    let layout = factory.finish();

    let first = layout.get_property_layout("P0").unwrap();
    assert_eq!(first.offset(), 16);
    assert_eq!(first.null_flags_offset(), 8);

    let last = layout.get_property_layout("P32").unwrap();
    assert_eq!(last.offset(), 16 + 32 * 4);
    assert_eq!(last.null_flags_offset(), 12);
    assert_eq!(last.null_flags_bitmask(), 1);
    assert_eq!(layout.size_of_fixed_section(), 16 + 33 * 4);
}

#[timeout(1000)]
#[test]
fn test_fixed_after_variable_is_rejected() {
    let mut factory = ClassLayoutFactory::new("Bad", 1, 0).unwrap();
    factory
        .add_variable_size_property("S", TypeDescriptor::Primitive(PrimitiveType::String), false)
        .unwrap();
    let result = factory.add_fixed_size_property("I", PrimitiveType::Integer, false);
    assert!(matches!(
        result,
        Err(LayoutError::NotAcceptingFixedSizeProperties { .. })
    ));
}

#[timeout(1000)]
#[test]
fn test_factory_rejects_bad_properties() {
    let mut factory = ClassLayoutFactory::new("Bad", 1, 0).unwrap();
    factory
        .add_fixed_size_property("I", PrimitiveType::Integer, false)
        .unwrap();
    assert!(matches!(
        factory.add_fixed_size_property("I", PrimitiveType::Long, false),
        Err(LayoutError::DuplicateAccessString { .. })
    ));
    assert!(matches!(
        factory.add_fixed_size_property("S", PrimitiveType::String, false),
        Err(LayoutError::InvalidPropertyType { .. })
    ));
    assert!(matches!(
        factory.add_fixed_size_property("Missing.X", PrimitiveType::Integer, false),
        Err(LayoutError::UnknownParentStruct { .. })
    ));
    assert!(matches!(
        factory.add_variable_size_property("T", TypeDescriptor::Struct, false),
        Err(LayoutError::InvalidPropertyType { .. })
    ));
}

#[timeout(1000)]
#[test]
fn test_fixed_array_size_and_lookup() {
    let mut factory = ClassLayoutFactory::new("Arr", 1, 0).unwrap();
    factory
        .add_fixed_size_array_property("Values", PrimitiveType::Long, 3, false)
        .unwrap();
    let layout = factory.finish();

    let values = layout.get_property_layout("Values").unwrap();
    assert_eq!(values.access_string(), "Values[]");
    assert_eq!(values.name(), "Values");
    assert!(values.is_fixed_sized());
    assert!(values.is_fixed_count());
    assert_eq!(values.size_in_fixed_section(), 4 + 3 * 8);
    assert_eq!(layout.get_property_index("Values[]"), layout.get_property_index("Values"));
    assert_eq!(layout.size_of_fixed_section(), 12 + 4 + 24);
}

#[timeout(1000)]
#[test]
fn test_build_from_class_flattens_structs() {
    let schema = person_schema();
    let layout = build_from_class(&schema, "Person", 3, 0).unwrap();

    assert_eq!(layout.name(), "Person");
    assert_eq!(layout.class_index(), 3);

    let address_index = layout.get_property_index("Address").unwrap();
    let address = layout.get_property_layout_by_index(address_index).unwrap();
    assert!(address.is_struct());

    let zip = layout.get_property_layout("Address.Zip").unwrap();
    assert_eq!(zip.parent_struct_index(), address_index);
    assert_eq!(zip.name(), "Zip");
    assert!(zip.is_fixed_sized());

    let city = layout.get_property_layout("Address.City").unwrap();
    assert!(!city.is_fixed_sized());

    let children: Vec<&str> = layout
        .get_logical_children(address_index)
        .iter()
        .filter_map(|&i| layout.get_access_string_by_index(i))
        .collect();
    assert_eq!(children, vec!["Address.Zip", "Address.City"]);

    // fixed pass first: every fixed property precedes every variable one
    let max_fixed = layout
        .property_layouts()
        .filter(|p| !p.is_struct() && p.is_fixed_sized())
        .map(PropertyLayout::offset)
        .max()
        .unwrap();
    let min_variable = layout
        .variable_property_layouts()
        .map(PropertyLayout::offset)
        .min()
        .unwrap();
    assert!(max_fixed < min_variable);
}

#[timeout(1000)]
#[test]
fn test_build_is_deterministic() {
    let schema = person_schema();
    let first = build_from_class(&schema, "Person", 1, 0).unwrap();
    let second = build_from_class(&schema, "Person", 1, 0).unwrap();

    assert_eq!(first.size_of_fixed_section(), second.size_of_fixed_section());
    let a: Vec<_> = first.property_layouts().cloned().collect();
    let b: Vec<_> = second.property_layouts().cloned().collect();
    assert_eq!(a, b);
    assert!(first.is_compatible(&second));
}

#[timeout(1000)]
#[test]
fn test_recursive_struct_is_rejected() {
    let schema = SchemaDefinition {
        name: "Loop".to_string(),
        classes: vec![
            ClassDefinition::new("Node", vec![PropertyDefinition::structure("Next", "Node")]),
        ],
    };
    assert!(matches!(
        build_from_class(&schema, "Node", 1, 0),
        Err(LayoutError::RecursiveStruct { .. })
    ));
    assert!(matches!(
        build_from_class(&schema, "Missing", 1, 0),
        Err(LayoutError::ClassNotFound { .. })
    ));
}

#[timeout(1000)]
#[test]
fn test_invalid_occurs_is_rejected() {
    let schema = SchemaDefinition {
        name: "Occurs".to_string(),
        classes: vec![ClassDefinition::new(
            "Bad",
            vec![PropertyDefinition::primitive_array("Items", PrimitiveType::Integer, 5, 2)],
        )],
    };
    assert!(matches!(
        build_from_class(&schema, "Bad", 1, 0),
        Err(LayoutError::InvalidOccurs { min_occurs: 5, max_occurs: 2, .. })
    ));
}

#[timeout(1000)]
#[test]
fn test_initialize_memory_for_instance() {
    let layout = simple_layout();
    let mut data = vec![0u8; layout.size_of_fixed_section() as usize];
    layout.initialize_memory_for_instance(&mut data).unwrap();

    let header = InstanceHeader::read(&data).unwrap();
    assert_eq!(header.class_index, 1);
    assert_eq!(header.schema_index, 0);
    assert_eq!(read_u32(&data, 8).unwrap(), u32::MAX);

    let c = layout.get_property_layout("C").unwrap();
    let d = layout.get_property_layout("D").unwrap();
    assert_eq!(read_u32(&data, c.offset()).unwrap(), 36);
    assert_eq!(read_u32(&data, d.offset()).unwrap(), 0);
    assert_eq!(layout.calculate_bytes_used(&data), 36);

    let mut short = vec![0u8; 10];
    assert!(layout.initialize_memory_for_instance(&mut short).is_err());
}

#[timeout(1000)]
#[test]
fn test_read_only_flags() {
    let schema = SchemaDefinition {
        name: "RO".to_string(),
        classes: vec![ClassDefinition::new(
            "Item",
            vec![
                PropertyDefinition::primitive("Id", PrimitiveType::Long).read_only(),
                PropertyDefinition::primitive("Label", PrimitiveType::String),
            ],
        )],
    };
    let mut layout = build_from_class(&schema, "Item", 1, 0).unwrap();
    let id = layout.get_property_index("Id").unwrap();
    assert!(layout.is_property_read_only(id));

    assert!(layout.set_property_read_only("Label", true));
    assert!(layout.get_property_layout("Label").unwrap().is_read_only());
    assert!(!layout.set_property_read_only("Nope", true));
}

#[timeout(1000)]
#[test]
fn test_relationship_class_gets_pointers() {
    let mut class = ClassDefinition::new(
        "Owns",
        vec![PropertyDefinition::primitive("Weight", PrimitiveType::Double)],
    );
    class.is_relationship = true;
    let schema = SchemaDefinition {
        name: "Rel".to_string(),
        classes: vec![class],
    };
    let layout = build_from_class(&schema, "Owns", 4, 0).unwrap();

    assert!(layout.is_relationship_class());
    let source = layout.source_ecpointer_index().unwrap();
    let target = layout.target_ecpointer_index().unwrap();
    assert_eq!(layout.get_access_string_by_index(source), Some(SOURCE_ECPOINTER));
    assert_eq!(layout.get_access_string_by_index(target), Some(TARGET_ECPOINTER));
    assert!(target > source);
}

#[timeout(1000)]
#[test]
fn test_schema_layout_registry() {
    let schema = person_schema();
    let schema_layout = SchemaLayout::new(2);
    schema_layout.build_all(&schema).unwrap();

    assert_eq!(schema_layout.max_class_index(), Some(1));
    let person = schema_layout.find_class_layout("Person").unwrap();
    assert_eq!(person.schema_index(), 2);
    assert_eq!(schema_layout.get_class_layout(1).unwrap().name(), "Address");
    assert_eq!(schema_layout.find_available_class_index().unwrap(), 2);

    let duplicate = build_from_class(&schema, "Address", 0, 2).unwrap();
    assert!(matches!(
        schema_layout.add_class_layout(Arc::new(duplicate)),
        Err(LayoutError::ClassIndexInUse { class_index: 0, .. })
    ));
}

#[timeout(1000)]
#[test]
fn test_schema_definition_from_json() {
    let json = r#"{
        "name": "Json",
        "classes": [{
            "name": "Widget",
            "properties": [
                {"name": "Size", "kind": "primitive", "type": "integer"},
                {"name": "Label", "kind": "primitive", "type": "string", "read_only": true},
                {"name": "Points", "kind": "primitive_array", "element": "point2d"}
            ]
        }]
    }"#;
    let schema: SchemaDefinition = serde_json::from_str(json).unwrap();
    let layout = build_from_class(&schema, "Widget", 1, 0).unwrap();

    assert!(layout.get_property_layout("Label").unwrap().is_read_only());
    let points = layout.get_property_layout("Points").unwrap();
    assert_eq!(
        points.type_descriptor(),
        &TypeDescriptor::PrimitiveArray(PrimitiveType::Point2d)
    );
    assert!(!points.is_fixed_count());
}

#[timeout(1000)]
#[test]
fn test_layout_display() {
    let layout = build_from_class(&person_schema(), "Person", 1, 0).unwrap();
    let text = layout.to_string();
    assert!(text.starts_with("ClassLayout for class index 1 (Person)"));
    assert!(text.contains("Logical Structure:"));
    assert!(text.contains("|--"));
}
