//! Expressions against instances built from JSON.

use ntest::timeout;
use std::sync::Arc;
use std::thread;

use ecrecord_core::error::ExpressionError;
use ecrecord_core::expr::{
    evaluate, evaluate_assignment_expression, evaluate_expression, parse_value_expression_and_create_tree,
    EvaluationResult, ExpressionContext, ExpressionParser, Symbol, SymbolExpressionContext, SymbolProviderRegistry,
};
use ecrecord_core::types::EcValue;
use ecrecord_core::InstanceHandle;

use super::helpers::{order_schema_layout, sample_order};

fn order_context(order: &InstanceHandle) -> SymbolExpressionContext {
    let registry = SymbolProviderRegistry::with_builtins();
    let mut globals = SymbolExpressionContext::new();
    registry.publish_symbols(&mut globals, &[]);
    let mut context = SymbolExpressionContext::for_instances(vec![Arc::clone(order)]);
    context.set_outer(Arc::new(globals));
    context
}

fn value(context: &dyn ExpressionContext, text: &str) -> EcValue {
    evaluate_expression(text, context)
        .and_then(EvaluationResult::into_value)
        .unwrap_or_else(|e| panic!("{text}: {e}"))
}

#[timeout(1000)]
#[test]
fn test_documented_scenarios() {
    let schema_layout = order_schema_layout();
    let order = sample_order(&schema_layout);
    let context = order_context(&order);

    assert_eq!(value(&context, "1+2*3"), EcValue::Integer(7));
    assert_eq!(value(&context, "this.Customer"), EcValue::from("Acme"));
    assert_eq!(value(&context, "Quantities[0]"), EcValue::Integer(10));
    assert_eq!(
        evaluate_expression("Quantities[5]", &context).unwrap_err(),
        ExpressionError::IndexOutOfRange { index: 5, count: 3 }
    );
    assert_eq!(value(&context, "IIf(1>0, \"yes\", \"no\")"), EcValue::from("yes"));

    let mut parser = ExpressionParser::new("1 +");
    assert!(parser.parse_value().is_error());
    assert!(!parser.check_complete());
}

#[timeout(1000)]
#[test]
fn test_order_totals() {
    let schema_layout = order_schema_layout();
    let order = sample_order(&schema_layout);
    let context = order_context(&order);

    assert_eq!(
        value(&context, "Lines[0].Price * Lines[0].Count + Lines[1].Price * Lines[1].Count"),
        EcValue::Double(20.0)
    );
    assert_eq!(
        value(&context, "Quantities[0] + Quantities[1] + Quantities[2]"),
        EcValue::Integer(60)
    );
    assert_eq!(
        value(&context, "System.Math.Round(Lines[1].Price * (1 - Discount))"),
        EcValue::Double(9.0)
    );
    assert_eq!(value(&context, "Lines.Any(l => l.Sku Like \"B-#\")"), EcValue::Boolean(true));
    assert_eq!(value(&context, "Notes.All(n => n <> \"\")"), EcValue::Boolean(true));
    assert_eq!(value(&context, "Address.Location.Y - Address.Location.X"), EcValue::Double(1.0));
    assert_eq!(value(&context, "Number & \"/\" & Customer"), EcValue::from("1001/Acme"));
    assert_eq!(value(&context, "Shipped OrElse Notes.Count > 1"), EcValue::Boolean(true));
    assert_eq!(value(&context, "Placed > @0"), EcValue::Boolean(true));
}

#[timeout(1000)]
#[test]
fn test_assignments_write_through() {
    let schema_layout = order_schema_layout();
    let order = sample_order(&schema_layout);
    let context = order_context(&order);

    evaluate_assignment_expression("this.Shipped = True", &context).unwrap();
    evaluate_assignment_expression("Quantities[2] -= 5", &context).unwrap();
    evaluate_assignment_expression("Lines[1].Count = Lines[1].Count * 3", &context).unwrap();
    evaluate_assignment_expression("Customer &= \" Ltd\"", &context).unwrap();
    evaluate_assignment_expression("Discount = 1", &context).unwrap();

    let instance = order.read();
    assert_eq!(instance.get_value("Shipped").unwrap(), EcValue::Boolean(true));
    assert_eq!(instance.get_value_at("Quantities", 2).unwrap(), EcValue::Integer(25));
    assert_eq!(instance.get_value("Customer").unwrap(), EcValue::from("Acme Ltd"));
    assert_eq!(instance.get_value("Discount").unwrap(), EcValue::Double(1.0));
    drop(instance);
    assert_eq!(value(&context, "Lines.Last.Count"), EcValue::Integer(3));

    assert!(matches!(
        evaluate_assignment_expression("Number = 5", &context),
        Err(ExpressionError::Instance(_))
    ));
    assert_eq!(
        evaluate_assignment_expression("Address.Location.X = 5", &context).unwrap_err(),
        ExpressionError::NeedsLValue
    );
}

#[timeout(1000)]
#[test]
fn test_parsed_tree_is_reusable() {
    let schema_layout = order_schema_layout();
    let tree = parse_value_expression_and_create_tree("Quantities[1] * 2 + Lines.Count");
    assert!(!tree.is_error());

    let first = sample_order(&schema_layout);
    let second = sample_order(&schema_layout);
    second
        .write()
        .set_value_at("Quantities", 1, &EcValue::Integer(0))
        .unwrap();

    let result = |order: &InstanceHandle| {
        evaluate(&tree, &order_context(order))
            .and_then(EvaluationResult::into_value)
            .unwrap()
    };
    assert_eq!(result(&first), EcValue::Integer(42));
    assert_eq!(result(&second), EcValue::Integer(2));
}

#[timeout(1000)]
#[test]
fn test_custom_symbols_shadow_properties() {
    let schema_layout = order_schema_layout();
    let order = sample_order(&schema_layout);
    let mut context = order_context(&order);
    context.add_symbol(Symbol::value("Customer", "Override"));
    context.add_symbol(Symbol::value("TaxRate", 0.2));

    assert_eq!(value(&context, "Customer"), EcValue::from("Override"));
    assert_eq!(value(&context, "this.Customer"), EcValue::from("Acme"));
    assert_eq!(value(&context, "Lines[1].Price * TaxRate"), EcValue::Double(2.0));
}

#[timeout(5000)]
#[test]
fn test_concurrent_evaluation_on_shared_instance() {
    let schema_layout = order_schema_layout();
    let order = sample_order(&schema_layout);
    let context = Arc::new(order_context(&order));

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let context = Arc::clone(&context);
            thread::spawn(move || {
                for _ in 0..50 {
                    let total = evaluate_expression("Quantities[0] + Quantities[1]", context.as_ref())
                        .and_then(EvaluationResult::into_value)
                        .unwrap();
                    assert_eq!(total, EcValue::Integer(30));
                    let any = evaluate_expression("Lines.Any(l => l.Count > 3)", context.as_ref())
                        .and_then(EvaluationResult::into_value)
                        .unwrap();
                    assert_eq!(any, EcValue::Boolean(true));
                }
            })
        })
        .collect();
    for reader in readers {
        reader.join().unwrap();
    }

    // each assignment takes the instance lock for its own write only
    for _ in 0..10 {
        evaluate_assignment_expression("Lines[0].Count += 1", context.as_ref()).unwrap();
    }
    assert_eq!(value(context.as_ref(), "Lines[0].Count"), EcValue::Integer(14));
}
