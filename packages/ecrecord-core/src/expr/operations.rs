//! Conversions, type promotion and operator implementations over [`EcValue`].
//!
//! Arithmetic with a null operand yields null; comparisons with a null
//! operand are false. Integer arithmetic wraps on overflow.

use std::cmp::Ordering;

use super::node::{BinaryOp, UnaryOp};
use crate::error::ExpressionError;
use crate::types::{EcValue, PrimitiveType};

type OpResult = Result<EcValue, ExpressionError>;

fn wrong_type(operation: &str, value: &EcValue) -> ExpressionError {
    ExpressionError::WrongType(format!("{operation} on {}", value.kind_name()))
}

fn incompatible(operation: &str, left: &EcValue, right: &EcValue) -> ExpressionError {
    ExpressionError::IncompatibleTypes(format!("{operation} of {} and {}", left.kind_name(), right.kind_name()))
}

pub fn convert_to_int32(value: &EcValue) -> Result<i32, ExpressionError> {
    match value {
        EcValue::Integer(v) => Ok(*v),
        EcValue::Boolean(v) => Ok(i32::from(*v)),
        EcValue::Long(v) => Ok(*v as i32),
        EcValue::Double(v) => Ok(*v as i32),
        EcValue::String(_) => Err(ExpressionError::NotImpl("string to integer conversion".into())),
        other => Err(wrong_type("integer conversion", other)),
    }
}

pub fn convert_to_double(value: &EcValue) -> Result<f64, ExpressionError> {
    match value {
        EcValue::Double(v) => Ok(*v),
        EcValue::Integer(v) => Ok(f64::from(*v)),
        EcValue::Long(v) => Ok(*v as f64),
        EcValue::Boolean(v) => Ok(if *v { 1.0 } else { 0.0 }),
        other => Err(wrong_type("double conversion", other)),
    }
}

/// String form used by `&` and string coercion. Doubles print six decimals.
pub fn convert_to_string(value: &EcValue) -> Result<String, ExpressionError> {
    match value {
        EcValue::String(s) => Ok(s.clone()),
        EcValue::Integer(v) => Ok(v.to_string()),
        EcValue::Long(v) => Ok(v.to_string()),
        EcValue::Double(v) => Ok(format!("{v:.6}")),
        EcValue::Boolean(v) => Ok(if *v { "true" } else { "false" }.to_string()),
        EcValue::DateTime(ticks) => Ok(ticks.to_string()),
        other => Err(wrong_type("string conversion", other)),
    }
}

/// Truth value of a condition operand.
///
/// Null is false unless `require_boolean` is set. Numbers are true when
/// non-zero; strings must spell `1`, `0`, `true` or `false`.
pub fn get_boolean(value: &EcValue, require_boolean: bool) -> Result<bool, ExpressionError> {
    match value {
        EcValue::Null if require_boolean => Err(wrong_type("boolean conversion", value)),
        EcValue::Null => Ok(false),
        EcValue::Boolean(v) => Ok(*v),
        EcValue::Integer(v) => Ok(*v != 0),
        EcValue::Long(v) => Ok(*v != 0),
        EcValue::Double(v) => Ok(*v != 0.0),
        EcValue::String(s) => string_to_boolean(s).ok_or_else(|| wrong_type("boolean conversion", value)),
        other => Err(wrong_type("boolean conversion", other)),
    }
}

fn string_to_boolean(s: &str) -> Option<bool> {
    if s == "1" || s.eq_ignore_ascii_case("true") {
        Some(true)
    } else if s == "0" || s.eq_ignore_ascii_case("false") {
        Some(false)
    } else {
        None
    }
}

/// Parses a string operand of `And`/`Or`/`Xor` as a number or a boolean.
fn string_to_operand(s: &str) -> Result<EcValue, ExpressionError> {
    let trimmed = s.trim();
    if let Ok(v) = trimmed.parse::<i32>() {
        return Ok(EcValue::Integer(v));
    }
    if let Ok(v) = trimmed.parse::<i64>() {
        return Ok(EcValue::Long(v));
    }
    if let Ok(v) = trimmed.parse::<f64>() {
        return Ok(EcValue::Double(v));
    }
    string_to_boolean(trimmed)
        .map(EcValue::Boolean)
        .ok_or_else(|| ExpressionError::WrongType(format!("string '{s}' is not a boolean or number")))
}

/// Promotion for multiplicative, shift and bitwise operators.
///
/// Long wins over Double and Integer, Double wins over Integer. Strings are
/// accepted only as a pair and only when `allow_strings` is set.
pub fn arithmetic_promotion(left: EcValue, right: EcValue, allow_strings: bool) -> Result<(EcValue, EcValue), ExpressionError> {
    if !left.is_primitive() || !right.is_primitive() {
        return Err(ExpressionError::PrimitiveRequired);
    }
    match (left, right) {
        (l @ EcValue::String(_), r @ EcValue::String(_)) if allow_strings => Ok((l, r)),
        (l @ EcValue::String(_), r) | (l, r @ EcValue::String(_)) => Err(incompatible("arithmetic", &l, &r)),
        (l, r) => promote_numeric(l, r, "arithmetic"),
    }
}

fn promote_numeric(left: EcValue, right: EcValue, operation: &str) -> Result<(EcValue, EcValue), ExpressionError> {
    use EcValue::*;
    match (left, right) {
        (Long(a), Long(b)) => Ok((Long(a), Long(b))),
        (Long(a), Double(b)) => Ok((Long(a), Long(b as i64))),
        (Double(a), Long(b)) => Ok((Long(a as i64), Long(b))),
        (Long(a), Integer(b)) => Ok((Long(a), Long(i64::from(b)))),
        (Integer(a), Long(b)) => Ok((Long(i64::from(a)), Long(b))),
        (l @ Long(_), r) | (l, r @ Long(_)) => Err(incompatible(operation, &l, &r)),
        (Double(a), Double(b)) => Ok((Double(a), Double(b))),
        (Double(a), Integer(b)) => Ok((Double(a), Double(f64::from(b)))),
        (Integer(a), Double(b)) => Ok((Double(f64::from(a)), Double(b))),
        (l @ Double(_), r) | (l, r @ Double(_)) => Err(incompatible(operation, &l, &r)),
        (Integer(a), Integer(b)) => Ok((Integer(a), Integer(b))),
        (l, _) => Err(wrong_type(operation, &l)),
    }
}

/// Promotion for `+`, `-` and comparisons.
///
/// Same-typed pairs pass through; otherwise numeric promotion applies with
/// booleans counted as integers. Mixing a string with anything else is
/// incompatible.
pub fn promote_common(left: EcValue, right: EcValue) -> Result<(EcValue, EcValue), ExpressionError> {
    use EcValue::*;
    if !left.is_primitive() || !right.is_primitive() {
        return Err(ExpressionError::PrimitiveRequired);
    }
    match (left, right) {
        (l @ (Boolean(_) | Double(_) | Integer(_) | Long(_) | String(_) | DateTime(_)), r)
            if l.primitive_type() == r.primitive_type() =>
        {
            Ok((l, r))
        }
        (l @ String(_), r) | (l, r @ String(_)) => Err(incompatible("operation", &l, &r)),
        (Boolean(a), Integer(b)) => Ok((Integer(i32::from(a)), Integer(b))),
        (Integer(a), Boolean(b)) => Ok((Integer(a), Integer(i32::from(b)))),
        (l, r) => promote_numeric(l, r, "operation"),
    }
}

/// Promotion for `And`, `Or` and `Xor`: logical when either side is
/// boolean, bitwise otherwise.
pub fn junction_promotion(left: EcValue, right: EcValue) -> Result<(EcValue, EcValue), ExpressionError> {
    let operand = |value: EcValue| -> OpResult {
        match value {
            EcValue::String(s) => string_to_operand(&s),
            v if v.is_primitive() => Ok(v),
            v => Err(wrong_type("logical operator", &v)),
        }
    };
    let left = operand(left)?;
    let right = operand(right)?;
    if matches!(left, EcValue::Boolean(_)) || matches!(right, EcValue::Boolean(_)) {
        let l = get_boolean(&left, true)?;
        let r = get_boolean(&right, true)?;
        return Ok((EcValue::Boolean(l), EcValue::Boolean(r)));
    }
    arithmetic_promotion(left, right, false)
}

pub fn perform_unary(op: UnaryOp, value: EcValue) -> OpResult {
    match (op, value) {
        (_, EcValue::Null) => Ok(EcValue::Null),
        (UnaryOp::Plus, v) => Ok(v),
        (UnaryOp::Minus, EcValue::Integer(v)) => Ok(EcValue::Integer(v.wrapping_neg())),
        (UnaryOp::Minus, EcValue::Long(v)) => Ok(EcValue::Long(v.wrapping_neg())),
        (UnaryOp::Minus, EcValue::Double(v)) => Ok(EcValue::Double(-v)),
        (UnaryOp::Not, EcValue::Boolean(v)) => Ok(EcValue::Boolean(!v)),
        (UnaryOp::Not, EcValue::Integer(v)) => Ok(EcValue::Integer(!v)),
        (UnaryOp::Not, EcValue::Long(v)) => Ok(EcValue::Long(!v)),
        (_, v) if !v.is_primitive() => Err(ExpressionError::IncompatibleTypes(format!(
            "unary operator on {}",
            v.kind_name()
        ))),
        (_, v) => Err(wrong_type("unary operator", &v)),
    }
}

/// Applies a binary operator to evaluated operands. `AndAlso` and `OrElse`
/// are evaluated eagerly here; the evaluator short-circuits them itself.
pub fn perform_binary(op: BinaryOp, left: EcValue, right: EcValue) -> OpResult {
    match op {
        BinaryOp::Plus | BinaryOp::Minus => perform_plus_minus(op, left, right),
        BinaryOp::Multiply => perform_multiplication(left, right),
        BinaryOp::Divide => perform_division(left, right),
        BinaryOp::IntegerDivide => perform_integer_division(left, right),
        BinaryOp::Mod => perform_mod(left, right),
        BinaryOp::Exponent => perform_exponentiation(left, right),
        BinaryOp::Concatenate => perform_concatenation(&left, &right),
        BinaryOp::ShiftLeft | BinaryOp::ShiftRight | BinaryOp::UnsignedShiftRight => perform_shift(op, left, right),
        BinaryOp::Like => perform_like(&left, &right),
        BinaryOp::Is => perform_is(left, right),
        op if op.is_comparison() => perform_comparison(op, left, right),
        BinaryOp::And | BinaryOp::Or | BinaryOp::Xor => perform_junction(op, left, right),
        BinaryOp::AndAlso => Ok(EcValue::Boolean(get_boolean(&left, false)? && get_boolean(&right, false)?)),
        _ => Ok(EcValue::Boolean(get_boolean(&left, false)? || get_boolean(&right, false)?)),
    }
}

pub fn perform_plus_minus(op: BinaryOp, left: EcValue, right: EcValue) -> OpResult {
    if left.is_null() || right.is_null() {
        return Ok(EcValue::Null);
    }
    let plus = op == BinaryOp::Plus;
    match promote_common(left, right)? {
        (EcValue::String(a), EcValue::String(b)) if plus => Ok(EcValue::String(a + &b)),
        (EcValue::Long(a), EcValue::Long(b)) => Ok(EcValue::Long(if plus { a.wrapping_add(b) } else { a.wrapping_sub(b) })),
        (EcValue::Integer(a), EcValue::Integer(b)) => {
            Ok(EcValue::Integer(if plus { a.wrapping_add(b) } else { a.wrapping_sub(b) }))
        }
        (EcValue::Double(a), EcValue::Double(b)) => Ok(EcValue::Double(if plus { a + b } else { a - b })),
        (EcValue::Boolean(a), EcValue::Boolean(b)) => {
            let (a, b) = (i32::from(a), i32::from(b));
            Ok(EcValue::Integer(if plus { a + b } else { a - b }))
        }
        (l, r) => Err(incompatible(op.symbol(), &l, &r)),
    }
}

pub fn perform_multiplication(left: EcValue, right: EcValue) -> OpResult {
    if left.is_null() || right.is_null() {
        return Ok(EcValue::Null);
    }
    match arithmetic_promotion(left, right, false)? {
        (EcValue::Integer(a), EcValue::Integer(b)) => Ok(EcValue::Integer(a.wrapping_mul(b))),
        (EcValue::Long(a), EcValue::Long(b)) => Ok(EcValue::Long(a.wrapping_mul(b))),
        (EcValue::Double(a), EcValue::Double(b)) => Ok(EcValue::Double(a * b)),
        (l, _) => Err(wrong_type("multiplication", &l)),
    }
}

/// `/` always divides as doubles.
pub fn perform_division(left: EcValue, right: EcValue) -> OpResult {
    if left.is_null() || right.is_null() {
        return Ok(EcValue::Null);
    }
    let divisor = convert_to_double(&right)?;
    let dividend = convert_to_double(&left)?;
    if divisor == 0.0 {
        return Err(ExpressionError::DivideByZero);
    }
    Ok(EcValue::Double(dividend / divisor))
}

/// `\` truncates integers and floors doubles.
pub fn perform_integer_division(left: EcValue, right: EcValue) -> OpResult {
    if left.is_null() || right.is_null() {
        return Ok(EcValue::Null);
    }
    match arithmetic_promotion(left, right, false)? {
        (EcValue::Integer(_), EcValue::Integer(0)) | (EcValue::Long(_), EcValue::Long(0)) => {
            Err(ExpressionError::DivideByZero)
        }
        (EcValue::Integer(a), EcValue::Integer(b)) => Ok(EcValue::Integer(a.wrapping_div(b))),
        (EcValue::Long(a), EcValue::Long(b)) => Ok(EcValue::Long(a.wrapping_div(b))),
        (EcValue::Double(_), EcValue::Double(b)) if b == 0.0 => Err(ExpressionError::DivideByZero),
        (EcValue::Double(a), EcValue::Double(b)) => Ok(EcValue::Double((a / b).floor())),
        _ => Err(ExpressionError::InvalidTypesForDivision),
    }
}

pub fn perform_mod(left: EcValue, right: EcValue) -> OpResult {
    if left.is_null() || right.is_null() {
        return Ok(EcValue::Null);
    }
    match arithmetic_promotion(left, right, false)? {
        (EcValue::Integer(_), EcValue::Integer(0)) | (EcValue::Long(_), EcValue::Long(0)) => {
            Err(ExpressionError::DivideByZero)
        }
        (EcValue::Integer(a), EcValue::Integer(b)) => Ok(EcValue::Integer(a.wrapping_rem(b))),
        (EcValue::Long(a), EcValue::Long(b)) => Ok(EcValue::Long(a.wrapping_rem(b))),
        _ => Err(ExpressionError::InvalidTypesForDivision),
    }
}

pub fn perform_exponentiation(left: EcValue, right: EcValue) -> OpResult {
    if left.is_null() || right.is_null() {
        return Ok(EcValue::Null);
    }
    let base = convert_to_double(&left)?;
    let exponent = convert_to_double(&right)?;
    Ok(EcValue::Double(base.powf(exponent)))
}

pub fn perform_concatenation(left: &EcValue, right: &EcValue) -> OpResult {
    let mut text = convert_to_string(left)?;
    text.push_str(&convert_to_string(right)?);
    Ok(EcValue::String(text))
}

pub fn perform_shift(op: BinaryOp, left: EcValue, right: EcValue) -> OpResult {
    if left.is_null() || right.is_null() {
        return Ok(EcValue::Null);
    }
    let count = convert_to_int32(&right)? as u32;
    match (op, left) {
        (BinaryOp::ShiftLeft, EcValue::Integer(v)) => Ok(EcValue::Integer(v.wrapping_shl(count))),
        (BinaryOp::ShiftRight, EcValue::Integer(v)) => Ok(EcValue::Integer(v.wrapping_shr(count))),
        (_, EcValue::Integer(v)) => Ok(EcValue::Integer((v as u32).wrapping_shr(count) as i32)),
        (BinaryOp::ShiftLeft, EcValue::Long(v)) => Ok(EcValue::Long(v.wrapping_shl(count))),
        (BinaryOp::ShiftRight, EcValue::Long(v)) => Ok(EcValue::Long(v.wrapping_shr(count))),
        (_, EcValue::Long(v)) => Ok(EcValue::Long((v as u64).wrapping_shr(count) as i64)),
        (_, v) => Err(wrong_type("shift", &v)),
    }
}

fn ordering_matches(op: BinaryOp, ordering: Option<Ordering>) -> bool {
    match (op, ordering) {
        (BinaryOp::Equal, Some(o)) => o == Ordering::Equal,
        (BinaryOp::NotEqual, Some(o)) => o != Ordering::Equal,
        (BinaryOp::Less, Some(o)) => o == Ordering::Less,
        (BinaryOp::LessEqual, Some(o)) => o != Ordering::Greater,
        (BinaryOp::Greater, Some(o)) => o == Ordering::Greater,
        (BinaryOp::GreaterEqual, Some(o)) => o != Ordering::Less,
        // NaN compares unequal to everything
        (BinaryOp::NotEqual, None) => true,
        _ => false,
    }
}

/// `=`, `<>`, `<`, `<=`, `>`, `>=`. False when either side is null.
pub fn perform_comparison(op: BinaryOp, left: EcValue, right: EcValue) -> OpResult {
    if left.is_null() || right.is_null() {
        return Ok(EcValue::Boolean(false));
    }
    let ordering = match promote_common(left, right)? {
        (EcValue::String(a), EcValue::String(b)) => Some(a.cmp(&b)),
        (EcValue::Boolean(a), EcValue::Boolean(b)) => Some(a.cmp(&b)),
        (EcValue::Integer(a), EcValue::Integer(b)) => Some(a.cmp(&b)),
        (EcValue::Long(a), EcValue::Long(b)) | (EcValue::DateTime(a), EcValue::DateTime(b)) => Some(a.cmp(&b)),
        (EcValue::Double(a), EcValue::Double(b)) => a.partial_cmp(&b),
        (l, _) => return Err(wrong_type("comparison", &l)),
    };
    Ok(EcValue::Boolean(ordering_matches(op, ordering)))
}

/// Null-aware equality: `x Is Null` is true exactly when `x` is null.
pub fn perform_is(left: EcValue, right: EcValue) -> OpResult {
    match (left.is_null(), right.is_null()) {
        (true, true) => Ok(EcValue::Boolean(true)),
        (false, false) => perform_comparison(BinaryOp::Equal, left, right),
        _ => Ok(EcValue::Boolean(false)),
    }
}

/// `text Like pattern` with `*` (any run), `?` (one character) and `#`
/// (one digit) wildcards.
pub fn perform_like(left: &EcValue, right: &EcValue) -> OpResult {
    if left.is_null() || right.is_null() {
        return Ok(EcValue::Boolean(false));
    }
    let text = convert_to_string(left)?;
    let pattern = convert_to_string(right)?;
    Ok(EcValue::Boolean(wildcard_match(&text, &pattern)))
}

fn wildcard_match(text: &str, pattern: &str) -> bool {
    let text: Vec<char> = text.chars().collect();
    let pattern: Vec<char> = pattern.chars().collect();
    let (mut t, mut p) = (0, 0);
    let mut backtrack: Option<(usize, usize)> = None;

    while t < text.len() {
        let matches_one = p < pattern.len()
            && match pattern[p] {
                '?' => true,
                '#' => text[t].is_ascii_digit(),
                '*' => false,
                c => c == text[t],
            };
        if matches_one {
            t += 1;
            p += 1;
        } else if p < pattern.len() && pattern[p] == '*' {
            backtrack = Some((p, t));
            p += 1;
        } else if let Some((star, matched)) = backtrack {
            p = star + 1;
            t = matched + 1;
            backtrack = Some((star, matched + 1));
        } else {
            return false;
        }
    }
    pattern[p..].iter().all(|&c| c == '*')
}

pub fn perform_junction(op: BinaryOp, left: EcValue, right: EcValue) -> OpResult {
    use EcValue::*;
    let result = match (op, junction_promotion(left, right)?) {
        (BinaryOp::And, (Boolean(a), Boolean(b))) => Boolean(a & b),
        (BinaryOp::Or, (Boolean(a), Boolean(b))) => Boolean(a | b),
        (_, (Boolean(a), Boolean(b))) => Boolean(a ^ b),
        (BinaryOp::And, (Integer(a), Integer(b))) => Integer(a & b),
        (BinaryOp::Or, (Integer(a), Integer(b))) => Integer(a | b),
        (_, (Integer(a), Integer(b))) => Integer(a ^ b),
        (BinaryOp::And, (Long(a), Long(b))) => Long(a & b),
        (BinaryOp::Or, (Long(a), Long(b))) => Long(a | b),
        (_, (Long(a), Long(b))) => Long(a ^ b),
        (_, (l, _)) => return Err(wrong_type(op.symbol(), &l)),
    };
    Ok(result)
}

/// Applies a unit conversion: `value * factor + offset` when either is given.
pub fn apply_unit_conversion(value: EcValue, factor: Option<f64>, offset: Option<f64>) -> OpResult {
    if value.is_null() || (factor.is_none() && offset.is_none()) {
        return Ok(value);
    }
    let v = convert_to_double(&value)?;
    Ok(EcValue::Double(v * factor.unwrap_or(1.0) + offset.unwrap_or(0.0)))
}

/// Converts an assigned value to the type of the target property.
pub fn convert_to(value: EcValue, target: PrimitiveType) -> OpResult {
    if value.is_null() || value.primitive_type() == Some(target) {
        return Ok(value);
    }
    let converted = match target {
        PrimitiveType::Integer if value.primitive_type() != Some(PrimitiveType::String) => {
            EcValue::Integer(convert_to_int32(&value)?)
        }
        PrimitiveType::Long => match value {
            EcValue::Integer(v) => EcValue::Long(i64::from(v)),
            EcValue::Double(v) => EcValue::Long(v as i64),
            EcValue::Boolean(v) => EcValue::Long(i64::from(v)),
            other => return Err(wrong_type("long conversion", &other)),
        },
        PrimitiveType::Double => EcValue::Double(convert_to_double(&value)?),
        PrimitiveType::Boolean => EcValue::Boolean(get_boolean(&value, true)?),
        PrimitiveType::String => EcValue::String(convert_to_string(&value)?),
        PrimitiveType::DateTime => match value {
            EcValue::Long(ticks) => EcValue::DateTime(ticks),
            other => return Err(wrong_type("datetime conversion", &other)),
        },
        _ => return Err(wrong_type(target.name(), &value)),
    };
    Ok(converted)
}
