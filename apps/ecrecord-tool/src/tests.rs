use super::*;
use ntest::timeout;
use std::path::PathBuf;
use tempfile::TempDir;

const SCHEMA: &str = r#"{
    "name": "Fleet",
    "classes": [
        {
            "name": "Vehicle",
            "properties": [
                { "name": "Plate", "kind": "primitive", "type": "string" },
                { "name": "Seats", "kind": "primitive", "type": "integer" },
                { "name": "Mileage", "kind": "primitive", "type": "double" },
                { "name": "Home", "kind": "struct", "class": "Depot" },
                { "name": "Trips", "kind": "struct_array", "class": "Trip" }
            ]
        },
        {
            "name": "Depot",
            "properties": [
                { "name": "City", "kind": "primitive", "type": "string" },
                { "name": "Spot", "kind": "primitive", "type": "point2d" }
            ]
        },
        {
            "name": "Trip",
            "properties": [
                { "name": "Km", "kind": "primitive", "type": "integer" }
            ]
        }
    ]
}"#;

const VALUES: &str = r#"{
    "Plate": "KA-1234",
    "Seats": 5,
    "Mileage": 10500.5,
    "Home": { "City": "Oslo" },
    "Trips": [ { "Km": 120 }, null, { "Km": 30 } ]
}"#;

fn fixture() -> (TempDir, PathBuf, PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let schema = dir.path().join("fleet.json");
    let values = dir.path().join("vehicle.json");
    fs::write(&schema, SCHEMA).unwrap();
    fs::write(&values, VALUES).unwrap();
    (dir, schema, values)
}

fn eval_command(schema: &Path, values: &Path, expression: &str, assign: bool) -> Result<String> {
    run(&Commands::Eval {
        schema: schema.to_path_buf(),
        class: "Vehicle".to_string(),
        values: Some(values.to_path_buf()),
        assign,
        expression: expression.to_string(),
    })
}

#[timeout(1000)]
#[test]
fn test_layout_text_and_json() {
    let (_dir, schema, _) = fixture();

    let text = run(&Commands::Layout {
        schema: schema.clone(),
        class: "Vehicle".to_string(),
        json: false,
    })
    .unwrap();
    assert!(text.contains("(Vehicle)"));
    assert!(text.contains("Home.City"));

    let json = run(&Commands::Layout {
        schema,
        class: "Vehicle".to_string(),
        json: true,
    })
    .unwrap();
    let table: Value = serde_json::from_str(&json).unwrap();
    assert_eq!(table["class"], "Vehicle");
    assert_eq!(table["class_index"], 0);
    let names: Vec<&str> = table["properties"]
        .as_array()
        .unwrap()
        .iter()
        .map(|row| row["access_string"].as_str().unwrap())
        .collect();
    assert!(names.contains(&"Seats"));
    assert!(names.contains(&"Home.Spot"));
    assert!(names.contains(&"Trips[]"));
}

#[timeout(1000)]
#[test]
fn test_unknown_class_is_reported() {
    let (_dir, schema, _) = fixture();
    let err = run(&Commands::Layout {
        schema,
        class: "Boat".to_string(),
        json: false,
    })
    .unwrap_err();
    assert_eq!(err.to_string(), "Class 'Boat' not found in schema 'Fleet'");
}

#[timeout(1000)]
#[test]
fn test_missing_schema_file() {
    let dir = tempfile::tempdir().unwrap();
    let err = load_schema(&dir.path().join("absent.json")).unwrap_err();
    assert!(err.to_string().starts_with("Failed to read"));
}

#[timeout(1000)]
#[test]
fn test_build_instance_with_struct_array() {
    let (_dir, schema_path, _) = fixture();
    let schema = load_schema(&schema_path).unwrap();
    let layouts = build_layouts(&schema).unwrap();
    let values: Value = serde_json::from_str(VALUES).unwrap();

    let instance = build_instance(&schema, &layouts, "Vehicle", &values).unwrap();
    assert_eq!(instance.get_value("Plate").unwrap(), EcValue::from("KA-1234"));
    assert_eq!(instance.get_value("Home.City").unwrap(), EcValue::from("Oslo"));
    assert!(instance.is_null("Home.Spot").unwrap());
    assert_eq!(instance.array_count("Trips").unwrap(), 3);
    assert_eq!(instance.get_value_at("Trips", 1).unwrap(), EcValue::Null);

    let EcValue::Struct(Some(trip)) = instance.get_value_at("Trips", 2).unwrap() else {
        panic!("expected a trip element");
    };
    assert_eq!(trip.read().get_value("Km").unwrap(), EcValue::Integer(30));
}

#[timeout(1000)]
#[test]
fn test_dump_lists_values() {
    let (_dir, schema, values) = fixture();
    let dump = run(&Commands::Dump {
        schema,
        class: "Vehicle".to_string(),
        values,
    })
    .unwrap();
    assert!(dump.contains("KA-1234"));
    assert!(dump.contains("Oslo"));
}

#[timeout(1000)]
#[test]
fn test_eval_reads_instance() {
    let (_dir, schema, values) = fixture();
    assert_eq!(eval_command(&schema, &values, "this.Seats * 2", false).unwrap(), "10");
    assert_eq!(eval_command(&schema, &values, "Home.City & \"!\"", false).unwrap(), "\"Oslo!\"");
    assert_eq!(eval_command(&schema, &values, "Trips[0].Km + Trips[2].Km", false).unwrap(), "150");
    assert_eq!(eval_command(&schema, &values, "System.Math.Max(Seats, 7)", false).unwrap(), "7");
}

#[timeout(1000)]
#[test]
fn test_eval_assignment_prints_dump() {
    let (_dir, schema, values) = fixture();
    let output = eval_command(&schema, &values, "this.Plate = \"OS-0001\"", true).unwrap();
    let mut lines = output.lines();
    assert_eq!(lines.next(), Some("\"OS-0001\""));
    assert!(output.contains("OS-0001"));
    assert!(!output.contains("KA-1234"));
}

#[timeout(1000)]
#[test]
fn test_eval_error_carries_expression() {
    let (_dir, schema, values) = fixture();
    let err = eval_command(&schema, &values, "this.Wheels + 1", false).unwrap_err();
    assert_eq!(err.to_string(), "Failed to evaluate 'this.Wheels + 1'");
}

#[timeout(1000)]
#[test]
fn test_parse_round_trip_and_failure() {
    let text = parse("1 + 2 * 3", false).unwrap();
    assert_eq!(parse(&text, false).unwrap(), text);

    assert!(parse("this.Seats = 4", true).is_ok());
    let err = parse("(1 + ", false).unwrap_err();
    assert!(err.to_string().starts_with("Failed to parse '(1 + '"));
}
