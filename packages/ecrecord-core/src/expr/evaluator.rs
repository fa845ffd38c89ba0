use std::fmt;

use super::context::{ExpressionContext, InstanceListExpressionContext, LambdaScope};
use super::node::{BinaryOp, Node, PrimaryList, PrimaryStep};
use super::operations::{
    apply_unit_conversion, convert_to, convert_to_double, convert_to_int32, get_boolean, perform_binary, perform_unary,
};
use super::parser::{parse_assignment_expression_and_create_tree, parse_value_expression_and_create_tree};
use super::symbols::MethodReference;
use crate::error::ExpressionError;
use crate::instance::InstanceHandle;
use crate::types::{EcValue, Point2d, Point3d};

/// Outcome of evaluating a node.
#[derive(Debug, Clone)]
pub enum EvaluationResult {
    Value(EcValue),
    /// One or more instances, such as `this` or a struct array element
    Instances(Vec<InstanceHandle>),
    /// Array property read without an index
    ValueList(ValueList),
    /// Lambda passed as a method argument
    Lambda(LambdaValue),
}

impl EvaluationResult {
    /// The primitive value, or [`ExpressionError::PrimitiveRequired`].
    pub fn into_value(self) -> Result<EcValue, ExpressionError> {
        match self {
            EvaluationResult::Value(v) => Ok(v),
            _ => Err(ExpressionError::PrimitiveRequired),
        }
    }

    pub fn as_value(&self) -> Option<&EcValue> {
        match self {
            EvaluationResult::Value(v) => Some(v),
            _ => None,
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            EvaluationResult::Value(v) => v.kind_name(),
            EvaluationResult::Instances(_) => "instance list",
            EvaluationResult::ValueList(_) => "value list",
            EvaluationResult::Lambda(_) => "lambda",
        }
    }
}

impl From<EcValue> for EvaluationResult {
    fn from(value: EcValue) -> Self {
        EvaluationResult::Value(value)
    }
}

impl fmt::Display for EvaluationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EvaluationResult::Value(v) => write!(f, "{v}"),
            EvaluationResult::Instances(instances) => {
                let names: Vec<String> = instances
                    .iter()
                    .map(|h| h.read().class_layout().name().to_string())
                    .collect();
                write!(f, "<{}>", names.join(", "))
            }
            EvaluationResult::ValueList(list) => write!(f, "{}[]", list.access_string()),
            EvaluationResult::Lambda(lambda) => write!(f, "{} => {}", lambda.parameter, lambda.body),
        }
    }
}

/// Lazy view of an array property. Elements are read on access.
#[derive(Debug, Clone)]
pub struct ValueList {
    instance: InstanceHandle,
    access_string: String,
}

impl ValueList {
    pub fn new(instance: InstanceHandle, access_string: String) -> Self {
        Self { instance, access_string }
    }

    pub fn access_string(&self) -> &str {
        &self.access_string
    }

    pub fn count(&self) -> Result<u32, ExpressionError> {
        Ok(self.instance.read().array_count(&self.access_string)?)
    }

    /// Element `index`; struct elements come back as single-instance lists.
    pub fn get(&self, index: i64) -> Result<EvaluationResult, ExpressionError> {
        let index = checked_index(index, self.count()?)?;
        let value = self.instance.read().get_value_at(&self.access_string, index)?;
        Ok(match value {
            EcValue::Struct(Some(handle)) => EvaluationResult::Instances(vec![handle]),
            EcValue::Struct(None) => EvaluationResult::Value(EcValue::Null),
            value => EvaluationResult::Value(value),
        })
    }
}

/// Unevaluated lambda body with its parameter name.
#[derive(Debug, Clone)]
pub struct LambdaValue {
    pub parameter: String,
    pub body: Node,
}

pub(crate) fn checked_index(index: i64, count: u32) -> Result<u32, ExpressionError> {
    u32::try_from(index)
        .ok()
        .filter(|&i| i < count)
        .ok_or(ExpressionError::IndexOutOfRange { index, count })
}

/// Evaluates an index expression to an integer.
pub(crate) fn evaluate_index(node: &Node, context: &dyn ExpressionContext) -> Result<i64, ExpressionError> {
    match evaluate_value(node, context)? {
        EcValue::Integer(v) => Ok(i64::from(v)),
        EcValue::Long(v) => Ok(v),
        EcValue::Null => Err(ExpressionError::WrongType("null array index".into())),
        other => Ok(i64::from(convert_to_int32(&other)?)),
    }
}

/// Evaluates a parsed tree against `context`.
pub fn evaluate(node: &Node, context: &dyn ExpressionContext) -> Result<EvaluationResult, ExpressionError> {
    match node {
        Node::Literal(value) => Ok(EvaluationResult::Value(value.clone())),
        Node::Point(components) => evaluate_point(components, context),
        Node::PrimaryList(list) => evaluate_primary_list(list, context),
        Node::Parens(inner) => evaluate(inner, context),
        Node::Unary { op, operand } => Ok(perform_unary(*op, evaluate_value(operand, context)?)?.into()),
        Node::Binary {
            op: op @ (BinaryOp::AndAlso | BinaryOp::OrElse),
            left,
            right,
        } => {
            let left = get_boolean(&evaluate_value(left, context)?, false)?;
            let result = match (op, left) {
                (BinaryOp::AndAlso, false) => false,
                (BinaryOp::OrElse, true) => true,
                _ => get_boolean(&evaluate_value(right, context)?, false)?,
            };
            Ok(EcValue::Boolean(result).into())
        }
        Node::Binary { op, left, right } => {
            let left = evaluate_value(left, context)?;
            let right = evaluate_value(right, context)?;
            Ok(perform_binary(*op, left, right)?.into())
        }
        Node::IIf {
            condition,
            when_true,
            when_false,
        } => {
            if get_boolean(&evaluate_value(condition, context)?, false)? {
                evaluate(when_true, context)
            } else {
                evaluate(when_false, context)
            }
        }
        Node::Assignment { op, left, right } => evaluate_assignment(*op, left, right, context),
        Node::UnitSpec {
            operand,
            factor,
            offset,
            ..
        } => Ok(apply_unit_conversion(evaluate_value(operand, context)?, *factor, *offset)?.into()),
        Node::Lambda { parameter, body } => Ok(EvaluationResult::Lambda(LambdaValue {
            parameter: parameter.clone(),
            body: (**body).clone(),
        })),
        Node::Error(error) => Err(ExpressionError::ParseError {
            message: error.to_string(),
        }),
    }
}

/// Evaluates a node that must produce a primitive value.
pub fn evaluate_value(node: &Node, context: &dyn ExpressionContext) -> Result<EcValue, ExpressionError> {
    evaluate(node, context)?.into_value()
}

/// Parses `text` as a value expression and evaluates it.
pub fn evaluate_expression(text: &str, context: &dyn ExpressionContext) -> Result<EvaluationResult, ExpressionError> {
    let node = parse_value_expression_and_create_tree(text);
    tracing::trace!("Evaluating {}", node);
    evaluate(&node, context)
}

/// Parses `text` as an assignment (or value) expression and evaluates it.
pub fn evaluate_assignment_expression(
    text: &str,
    context: &dyn ExpressionContext,
) -> Result<EvaluationResult, ExpressionError> {
    let node = parse_assignment_expression_and_create_tree(text);
    tracing::trace!("Evaluating {}", node);
    evaluate(&node, context)
}

fn evaluate_point(components: &[Node], context: &dyn ExpressionContext) -> Result<EvaluationResult, ExpressionError> {
    let mut coordinates = Vec::with_capacity(components.len());
    for component in components {
        coordinates.push(convert_to_double(&evaluate_value(component, context)?)?);
    }
    let value = match coordinates[..] {
        [x, y] => EcValue::Point2d(Point2d { x, y }),
        [x, y, z] => EcValue::Point3d(Point3d { x, y, z }),
        _ => return Err(ExpressionError::WrongType(format!("point with {} components", coordinates.len()))),
    };
    Ok(value.into())
}

fn evaluate_assignment(
    op: Option<BinaryOp>,
    left: &Node,
    right: &Node,
    context: &dyn ExpressionContext,
) -> Result<EvaluationResult, ExpressionError> {
    let Node::PrimaryList(list) = left else {
        return Err(ExpressionError::NeedsLValue);
    };
    if !matches!(list.steps.first(), Some(PrimaryStep::Ident(_))) {
        return Err(ExpressionError::NeedsLValue);
    }
    let reference = context.get_reference(list, 0, context)?;
    let mut value = evaluate_value(right, context)?;
    if let Some(op) = op {
        value = perform_binary(op, reference.get_value()?, value)?;
    }
    let target = reference.primitive_type()?;
    let value = convert_to(value, target)?;
    reference.set_value(&value)?;
    tracing::debug!("Assigned {} to {}", value, list);
    Ok(value.into())
}

fn evaluate_primary_list(list: &PrimaryList, context: &dyn ExpressionContext) -> Result<EvaluationResult, ExpressionError> {
    let (mut current, mut next) = match list.steps.first() {
        Some(PrimaryStep::Ident(_)) => context.get_value(list, 0, context)?,
        Some(PrimaryStep::Call { method, arguments }) => {
            let method = context.resolve_method(method)?;
            (invoke_method(&method, None, arguments, context)?, 1)
        }
        _ => return Err(ExpressionError::UnknownError(format!("malformed access path '{list}'"))),
    };
    while next < list.len() {
        (current, next) = apply_step(current, list, next, context)?;
    }
    Ok(current)
}

fn apply_step(
    current: EvaluationResult,
    list: &PrimaryList,
    index: usize,
    context: &dyn ExpressionContext,
) -> Result<(EvaluationResult, usize), ExpressionError> {
    match &list.steps[index] {
        PrimaryStep::Member(_) => match current {
            EvaluationResult::Instances(instances) => {
                InstanceListExpressionContext::new(instances).get_value(list, index, context)
            }
            current => Ok((member_of(current, list, index)?, index + 1)),
        },
        PrimaryStep::Index(node) => match current {
            EvaluationResult::ValueList(values) => {
                let i = evaluate_index(node, context)?;
                Ok((values.get(i)?, index + 1))
            }
            _ => Err(ExpressionError::ArrayRequired(list.prefix_text(index))),
        },
        PrimaryStep::Call { method, arguments } => Ok((call_on(current, method, arguments, context)?, index + 1)),
        PrimaryStep::Ident(name) => Err(ExpressionError::UnknownError(format!("unexpected identifier '{name}'"))),
    }
}

fn member_of(current: EvaluationResult, list: &PrimaryList, index: usize) -> Result<EvaluationResult, ExpressionError> {
    let name = list.name_at(index).unwrap_or_default();
    let lower = name.to_ascii_lowercase();
    let unknown = || ExpressionError::UnknownMember(name.to_string());
    let value = match current {
        EvaluationResult::Value(EcValue::Null) => EcValue::Null,
        EvaluationResult::Value(EcValue::Point2d(p)) => match lower.as_str() {
            "x" => EcValue::Double(p.x),
            "y" => EcValue::Double(p.y),
            _ => return Err(unknown()),
        },
        EvaluationResult::Value(EcValue::Point3d(p)) => match lower.as_str() {
            "x" => EcValue::Double(p.x),
            "y" => EcValue::Double(p.y),
            "z" => EcValue::Double(p.z),
            _ => return Err(unknown()),
        },
        EvaluationResult::ValueList(values) => {
            let count = values.count()?;
            return match lower.as_str() {
                "count" => Ok(EcValue::Integer(count as i32).into()),
                "first" if count == 0 => Ok(EcValue::Null.into()),
                "first" => values.get(0),
                "last" if count == 0 => Ok(EcValue::Null.into()),
                "last" => values.get(i64::from(count) - 1),
                _ => Err(unknown()),
            };
        }
        _ => return Err(ExpressionError::DotNotSupported(list.prefix_text(index))),
    };
    Ok(value.into())
}

fn call_on(
    current: EvaluationResult,
    method: &str,
    arguments: &[Node],
    context: &dyn ExpressionContext,
) -> Result<EvaluationResult, ExpressionError> {
    match current {
        EvaluationResult::ValueList(values) => call_value_list_method(&values, method, arguments, context),
        EvaluationResult::Instances(instances) => {
            let reference = context.resolve_method(method)?;
            invoke_method(&reference, Some(&instances), arguments, context)
        }
        other => Err(ExpressionError::WrongType(format!(
            "method '{method}' called on {}",
            other.kind_name()
        ))),
    }
}

/// Evaluates `arguments` and invokes `method`. Instance methods need
/// `target`; static methods must not have one.
pub(crate) fn invoke_method(
    method: &MethodReference,
    target: Option<&[InstanceHandle]>,
    arguments: &[Node],
    context: &dyn ExpressionContext,
) -> Result<EvaluationResult, ExpressionError> {
    let args = arguments
        .iter()
        .map(|argument| evaluate(argument, context))
        .collect::<Result<Vec<_>, _>>()?;
    match (method, target) {
        (MethodReference::Static(f), None) => f(&args),
        (MethodReference::Instance(f), Some(instances)) => f(instances, &args),
        (MethodReference::Static(_), Some(_)) => Err(ExpressionError::WrongType("static method called on an instance".into())),
        (MethodReference::Instance(_), None) => Err(ExpressionError::WrongType("instance method called without an instance".into())),
    }
}

fn call_value_list_method(
    values: &ValueList,
    method: &str,
    arguments: &[Node],
    context: &dyn ExpressionContext,
) -> Result<EvaluationResult, ExpressionError> {
    let lower = method.to_ascii_lowercase();
    if lower == "any" || lower == "all" {
        let [Node::Lambda { parameter, body }] = arguments else {
            return Err(ExpressionError::WrongType(format!("{method} expects one lambda argument")));
        };
        let want_any = lower == "any";
        for i in 0..values.count()? {
            let scope = LambdaScope::new(parameter, values.get(i64::from(i))?, context);
            let matched = get_boolean(&evaluate_value(body, &scope)?, false)?;
            if matched == want_any {
                return Ok(EcValue::Boolean(want_any).into());
            }
        }
        return Ok(EcValue::Boolean(!want_any).into());
    }

    if !arguments.is_empty() {
        return Err(ExpressionError::WrongType(format!("{method} takes no arguments")));
    }
    let count = values.count()?;
    match lower.as_str() {
        "count" => Ok(EcValue::Integer(count as i32).into()),
        "first" if count > 0 => values.get(0),
        "last" if count > 0 => values.get(i64::from(count) - 1),
        "first" | "last" => Ok(EcValue::Null.into()),
        _ => Err(ExpressionError::UnknownMember(method.to_string())),
    }
}
