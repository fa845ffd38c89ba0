use std::fs;
use std::path::Path;
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use serde::Serialize;
use serde_json::Value;

use ecrecord_core::expr::{
    evaluate_assignment_expression, evaluate_expression, parse_assignment_expression_and_create_tree,
    parse_value_expression_and_create_tree, SymbolExpressionContext, SymbolProviderRegistry,
};
use ecrecord_core::layout::{ClassLayout, PropertyKind, SchemaDefinition, SchemaLayout};
use ecrecord_core::types::EcValue;
use ecrecord_core::{InstanceHandle, StandaloneInstance};

use crate::cli::Commands;

/// Runs one subcommand and returns its printable output.
pub fn run(command: &Commands) -> Result<String> {
    match command {
        Commands::Layout { schema, class, json } => {
            let schema = load_schema(schema)?;
            let layouts = build_layouts(&schema)?;
            let layout = find_layout(&layouts, &schema, class)?;
            if *json {
                layout_json(&layout)
            } else {
                Ok(layout.to_string())
            }
        }
        Commands::Dump { schema, class, values } => {
            let schema = load_schema(schema)?;
            let layouts = build_layouts(&schema)?;
            let values = load_json(values)?;
            let instance = build_instance(&schema, &layouts, class, &values)?;
            Ok(instance.to_string())
        }
        Commands::Eval {
            schema,
            class,
            values,
            assign,
            expression,
        } => {
            let schema = load_schema(schema)?;
            let layouts = build_layouts(&schema)?;
            let values = match values {
                Some(path) => load_json(path)?,
                None => Value::Object(Default::default()),
            };
            let instance = build_instance(&schema, &layouts, class, &values)?.into_handle();
            eval(&instance, expression, *assign)
        }
        Commands::Parse { assign, expression } => parse(expression, *assign),
    }
}

fn load_json(path: &Path) -> Result<Value> {
    let text = fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("Invalid JSON in {}", path.display()))
}

pub fn load_schema(path: &Path) -> Result<SchemaDefinition> {
    let value = load_json(path)?;
    serde_json::from_value(value).with_context(|| format!("Invalid schema definition in {}", path.display()))
}

/// Layouts for every class of `schema`, class indices in declaration order.
pub fn build_layouts(schema: &SchemaDefinition) -> Result<SchemaLayout> {
    let layouts = SchemaLayout::new(0);
    layouts
        .build_all(schema)
        .with_context(|| format!("Failed to build layouts for schema '{}'", schema.name))?;
    tracing::debug!("Built {} class layouts for schema '{}'", schema.classes.len(), schema.name);
    Ok(layouts)
}

fn find_layout(layouts: &SchemaLayout, schema: &SchemaDefinition, class: &str) -> Result<Arc<ClassLayout>> {
    layouts
        .find_class_layout(class)
        .ok_or_else(|| anyhow!("Class '{}' not found in schema '{}'", class, schema.name))
}

#[derive(Serialize)]
struct PropertyRow<'a> {
    index: usize,
    access_string: &'a str,
    kind: String,
    offset: u32,
    null_flags_offset: u32,
    null_flags_bitmask: u32,
    fixed_size: bool,
    read_only: bool,
}

#[derive(Serialize)]
struct LayoutTable<'a> {
    class: &'a str,
    class_index: u16,
    size_of_fixed_section: u32,
    properties: Vec<PropertyRow<'a>>,
}

fn layout_json(layout: &ClassLayout) -> Result<String> {
    let properties = layout
        .property_layouts()
        .enumerate()
        .map(|(index, prop)| PropertyRow {
            index,
            access_string: prop.access_string(),
            kind: prop.type_descriptor().to_string(),
            offset: prop.offset(),
            null_flags_offset: prop.null_flags_offset(),
            null_flags_bitmask: prop.null_flags_bitmask(),
            fixed_size: prop.is_fixed_sized(),
            read_only: prop.is_read_only(),
        })
        .collect();
    let table = LayoutTable {
        class: layout.name(),
        class_index: layout.class_index(),
        size_of_fixed_section: layout.size_of_fixed_section(),
        properties,
    };
    Ok(serde_json::to_string_pretty(&table)?)
}

/// Builds an instance of `class` from a JSON object of property values.
///
/// Struct array values are JSON arrays of objects; each object becomes an
/// element instance of the array's element class.
pub fn build_instance(
    schema: &SchemaDefinition,
    layouts: &SchemaLayout,
    class: &str,
    values: &Value,
) -> Result<StandaloneInstance> {
    let layout = find_layout(layouts, schema, class)?;
    let definition = schema
        .find_class(class)
        .ok_or_else(|| anyhow!("Class '{}' not found in schema '{}'", class, schema.name))?;
    let mut plain = values
        .as_object()
        .with_context(|| format!("Values for class '{class}' must be a JSON object"))?
        .clone();
    let mut instance = StandaloneInstance::new(layout)?;

    for prop in &definition.properties {
        let PropertyKind::StructArray { class: element_class, .. } = &prop.kind else {
            continue;
        };
        let Some(elements) = plain.remove(&prop.name) else {
            continue;
        };
        let elements = elements
            .as_array()
            .with_context(|| format!("Values for '{}' must be a JSON array", prop.name))?;
        let count = instance.array_count(&prop.name)?;
        if elements.len() as u32 > count {
            instance
                .add_array_elements(&prop.name, elements.len() as u32 - count)
                .with_context(|| format!("Failed to size '{}'", prop.name))?;
        }
        for (index, element) in elements.iter().enumerate() {
            if element.is_null() {
                continue;
            }
            let element = build_instance(schema, layouts, element_class, element)
                .with_context(|| format!("Failed to build {}[{}]", prop.name, index))?;
            instance.set_value_at(&prop.name, index as u32, &EcValue::Struct(Some(element.into_handle())))?;
        }
    }

    instance
        .set_values_from_json(&Value::Object(plain))
        .with_context(|| format!("Failed to apply values to '{class}'"))?;
    Ok(instance)
}

/// Context exposing `this`, the instance properties and the built-in symbols.
pub fn instance_context(instance: &InstanceHandle) -> SymbolExpressionContext {
    let mut globals = SymbolExpressionContext::new();
    SymbolProviderRegistry::with_builtins().publish_symbols(&mut globals, &[]);
    let mut context = SymbolExpressionContext::for_instances(vec![Arc::clone(instance)]);
    context.set_outer(Arc::new(globals));
    context
}

pub fn eval(instance: &InstanceHandle, expression: &str, assign: bool) -> Result<String> {
    let context = instance_context(instance);
    if !assign {
        let result = evaluate_expression(expression, &context)
            .with_context(|| format!("Failed to evaluate '{expression}'"))?;
        return Ok(result.to_string());
    }
    let result = evaluate_assignment_expression(expression, &context)
        .with_context(|| format!("Failed to evaluate '{expression}'"))?;
    Ok(format!("{result}\n{}", instance.read()))
}

pub fn parse(expression: &str, assign: bool) -> Result<String> {
    let node = if assign {
        parse_assignment_expression_and_create_tree(expression)
    } else {
        parse_value_expression_and_create_tree(expression)
    };
    if node.is_error() {
        bail!("Failed to parse '{expression}': {node}");
    }
    Ok(node.to_string())
}

#[cfg(test)]
mod tests {
    include!("tests.rs");
}
