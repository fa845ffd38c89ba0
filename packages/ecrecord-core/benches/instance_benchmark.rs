//! Instance memory and expression throughput benchmarks.
//!
//! - Fixed-size property writes
//! - Variable-size string growth shifting later values
//! - Array element insertion at the front, middle and end
//! - Parsing and evaluating a small expression

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use ecrecord_core::expr::{evaluate, parse_value_expression_and_create_tree, SymbolExpressionContext};
use ecrecord_core::layout::{build_from_class, ClassDefinition, ClassLayout, PropertyDefinition, SchemaDefinition};
use ecrecord_core::types::{EcValue, PrimitiveType};
use ecrecord_core::StandaloneInstance;
use std::hint::black_box;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Record with fixed fields, two strings and a trailing binary and array.
fn bench_layout() -> Arc<ClassLayout> {
    let schema = SchemaDefinition {
        name: "Bench".to_string(),
        classes: vec![ClassDefinition::new(
            "Record",
            vec![
                PropertyDefinition::primitive("Id", PrimitiveType::Long),
                PropertyDefinition::primitive("Score", PrimitiveType::Double),
                PropertyDefinition::primitive("Name", PrimitiveType::String),
                PropertyDefinition::primitive("Comment", PrimitiveType::String),
                PropertyDefinition::primitive("Payload", PrimitiveType::Binary),
                PropertyDefinition::primitive_array("Samples", PrimitiveType::Integer, 0, u32::MAX),
            ],
        )],
    };
    Arc::new(build_from_class(&schema, "Record", 0, 0).unwrap())
}

fn populated_instance(layout: &Arc<ClassLayout>) -> StandaloneInstance {
    let mut instance = StandaloneInstance::new(Arc::clone(layout)).unwrap();
    instance.set_value("Name", &EcValue::from("record")).unwrap();
    instance.set_value("Comment", &EcValue::from("short")).unwrap();
    instance.set_value("Payload", &EcValue::Binary(vec![7; 256])).unwrap();
    instance
}

fn benchmark_fixed_writes(c: &mut Criterion) {
    let layout = bench_layout();
    let mut instance = populated_instance(&layout);

    let mut group = c.benchmark_group("fixed_writes");
    group.sample_size(50);
    group.measurement_time(Duration::from_secs(3));

    group.bench_function("set_long", |b| {
        let mut i = 0i64;
        b.iter(|| {
            i += 1;
            black_box(instance.set_value("Id", &EcValue::Long(i)).unwrap());
        })
    });

    group.bench_function("get_long", |b| {
        b.iter(|| black_box(instance.get_value("Id").unwrap()))
    });

    group.finish();
}

fn benchmark_string_growth(c: &mut Criterion) {
    let layout = bench_layout();

    let mut group = c.benchmark_group("string_growth");
    group.sample_size(30);
    group.measurement_time(Duration::from_secs(3));

    for target_len in [16usize, 256, 4096] {
        let long = EcValue::from("g".repeat(target_len));
        let short = EcValue::from("s");
        group.bench_with_input(BenchmarkId::new("grow_then_shrink", target_len), &long, |b, long| {
            let mut instance = populated_instance(&layout);
            b.iter_custom(|iters| {
                let start = Instant::now();
                for _ in 0..iters {
                    black_box(instance.set_value("Name", long).unwrap());
                    black_box(instance.set_value("Name", &short).unwrap());
                }
                start.elapsed()
            })
        });
    }

    group.finish();
}

fn benchmark_array_insert(c: &mut Criterion) {
    let layout = bench_layout();

    let mut group = c.benchmark_group("array_insert");
    group.sample_size(30);
    group.measurement_time(Duration::from_secs(3));

    for (name, position) in [("front", 0.0), ("middle", 0.5), ("end", 1.0)] {
        group.bench_function(name, |b| {
            b.iter_custom(|iters| {
                let mut instance = populated_instance(&layout);
                instance.add_array_elements("Samples", 64).unwrap();
                let start = Instant::now();
                for _ in 0..iters {
                    let count = instance.array_count("Samples").unwrap();
                    let index = (f64::from(count) * position) as u32;
                    instance.insert_array_elements("Samples", index, 1).unwrap();
                    instance
                        .set_value_at("Samples", index, &EcValue::Integer(count as i32))
                        .unwrap();
                    if count > 4096 {
                        instance.remove_array_elements("Samples", 0, count - 64).unwrap();
                    }
                }
                start.elapsed()
            })
        });
    }

    group.finish();
}

fn benchmark_expressions(c: &mut Criterion) {
    let layout = bench_layout();
    let mut instance = populated_instance(&layout);
    instance.set_value("Id", &EcValue::Long(42)).unwrap();
    instance.set_value("Score", &EcValue::Double(0.75)).unwrap();
    let context = SymbolExpressionContext::for_instances(vec![instance.into_handle()]);
    let text = "IIf(this.Id > 10 AndAlso Score < 1.0, Name & \"!\", \"none\")";

    let mut group = c.benchmark_group("expressions");
    group.sample_size(50);

    group.bench_function("parse", |b| {
        b.iter(|| black_box(parse_value_expression_and_create_tree(black_box(text))))
    });

    let tree = parse_value_expression_and_create_tree(text);
    group.bench_function("evaluate", |b| {
        b.iter(|| black_box(evaluate(&tree, &context).unwrap()))
    });

    group.finish();
}

criterion_group!(
    benches,
    benchmark_fixed_writes,
    benchmark_string_growth,
    benchmark_array_insert,
    benchmark_expressions
);
criterion_main!(benches);
