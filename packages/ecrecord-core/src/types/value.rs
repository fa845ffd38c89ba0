use std::fmt;
use std::sync::Arc;

use super::PrimitiveType;
use crate::instance::InstanceHandle;

/// Two-dimensional point stored as two doubles.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Point2d {
    pub x: f64,
    pub y: f64,
}

/// Three-dimensional point stored as three doubles.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Point3d {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

/// Array metadata returned when an array property is read without an index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArrayInfo {
    /// Element primitive type, `None` for struct arrays
    pub element_type: Option<PrimitiveType>,
    /// Reserved element count
    pub count: u32,
    /// Count is fixed by the class layout
    pub is_fixed_count: bool,
}

/// Tagged value passed in and out of instance memory and expressions.
#[derive(Debug, Clone, Default)]
pub enum EcValue {
    #[default]
    Null,
    Integer(i32),
    Long(i64),
    Double(f64),
    Boolean(bool),
    String(String),
    Binary(Vec<u8>),
    Point2d(Point2d),
    Point3d(Point3d),
    /// Ticks since the epoch
    DateTime(i64),
    Array(ArrayInfo),
    /// Struct array element; `None` when the element is null
    Struct(Option<InstanceHandle>),
}

impl EcValue {
    pub fn is_null(&self) -> bool {
        matches!(self, EcValue::Null)
    }

    pub fn is_primitive(&self) -> bool {
        self.primitive_type().is_some()
    }

    pub fn is_array(&self) -> bool {
        matches!(self, EcValue::Array(_))
    }

    pub fn is_struct(&self) -> bool {
        matches!(self, EcValue::Struct(_))
    }

    /// Primitive kind of the value, `None` for null, arrays and structs.
    pub fn primitive_type(&self) -> Option<PrimitiveType> {
        match self {
            EcValue::Integer(_) => Some(PrimitiveType::Integer),
            EcValue::Long(_) => Some(PrimitiveType::Long),
            EcValue::Double(_) => Some(PrimitiveType::Double),
            EcValue::Boolean(_) => Some(PrimitiveType::Boolean),
            EcValue::String(_) => Some(PrimitiveType::String),
            EcValue::Binary(_) => Some(PrimitiveType::Binary),
            EcValue::Point2d(_) => Some(PrimitiveType::Point2d),
            EcValue::Point3d(_) => Some(PrimitiveType::Point3d),
            EcValue::DateTime(_) => Some(PrimitiveType::DateTime),
            EcValue::Null | EcValue::Array(_) | EcValue::Struct(_) => None,
        }
    }

    /// Short kind name used in error messages.
    pub fn kind_name(&self) -> &'static str {
        match self {
            EcValue::Null => "null",
            EcValue::Array(_) => "array",
            EcValue::Struct(_) => "struct",
            other => other.primitive_type().map_or("unknown", PrimitiveType::name),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            EcValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i32(&self) -> Option<i32> {
        match self {
            EcValue::Integer(v) => Some(*v),
            _ => None,
        }
    }
}

impl PartialEq for EcValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (EcValue::Null, EcValue::Null) => true,
            (EcValue::Integer(a), EcValue::Integer(b)) => a == b,
            (EcValue::Long(a), EcValue::Long(b)) => a == b,
            (EcValue::Double(a), EcValue::Double(b)) => a.to_bits() == b.to_bits() || a == b,
            (EcValue::Boolean(a), EcValue::Boolean(b)) => a == b,
            (EcValue::String(a), EcValue::String(b)) => a == b,
            (EcValue::Binary(a), EcValue::Binary(b)) => a == b,
            (EcValue::Point2d(a), EcValue::Point2d(b)) => a == b,
            (EcValue::Point3d(a), EcValue::Point3d(b)) => a == b,
            (EcValue::DateTime(a), EcValue::DateTime(b)) => a == b,
            (EcValue::Array(a), EcValue::Array(b)) => a == b,
            (EcValue::Struct(a), EcValue::Struct(b)) => match (a, b) {
                (None, None) => true,
                (Some(a), Some(b)) => Arc::ptr_eq(a, b),
                _ => false,
            },
            _ => false,
        }
    }
}

impl fmt::Display for EcValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EcValue::Null => f.write_str("<null>"),
            EcValue::Integer(v) => write!(f, "{v}"),
            EcValue::Long(v) => write!(f, "{v}"),
            EcValue::Double(v) => write!(f, "{v}"),
            EcValue::Boolean(v) => f.write_str(if *v { "True" } else { "False" }),
            EcValue::String(s) => write!(f, "\"{s}\""),
            EcValue::Binary(bytes) => {
                f.write_str("0x")?;
                for b in bytes {
                    write!(f, "{b:02x}")?;
                }
                Ok(())
            }
            EcValue::Point2d(p) => write!(f, "{{{},{}}}", p.x, p.y),
            EcValue::Point3d(p) => write!(f, "{{{},{},{}}}", p.x, p.y, p.z),
            EcValue::DateTime(ticks) => write!(f, "@{ticks}"),
            EcValue::Array(info) => match info.element_type {
                Some(t) => write!(f, "{t}[{}]", info.count),
                None => write!(f, "struct[{}]", info.count),
            },
            EcValue::Struct(None) => f.write_str("<null struct>"),
            EcValue::Struct(Some(handle)) => {
                let instance = handle.read();
                write!(f, "<{}>", instance.class_layout().name())
            }
        }
    }
}

impl From<i32> for EcValue {
    fn from(v: i32) -> Self {
        EcValue::Integer(v)
    }
}

impl From<i64> for EcValue {
    fn from(v: i64) -> Self {
        EcValue::Long(v)
    }
}

impl From<f64> for EcValue {
    fn from(v: f64) -> Self {
        EcValue::Double(v)
    }
}

impl From<bool> for EcValue {
    fn from(v: bool) -> Self {
        EcValue::Boolean(v)
    }
}

impl From<&str> for EcValue {
    fn from(v: &str) -> Self {
        EcValue::String(v.to_string())
    }
}

impl From<String> for EcValue {
    fn from(v: String) -> Self {
        EcValue::String(v)
    }
}

impl From<Vec<u8>> for EcValue {
    fn from(v: Vec<u8>) -> Self {
        EcValue::Binary(v)
    }
}

impl From<Point2d> for EcValue {
    fn from(v: Point2d) -> Self {
        EcValue::Point2d(v)
    }
}

impl From<Point3d> for EcValue {
    fn from(v: Point3d) -> Self {
        EcValue::Point3d(v)
    }
}

impl EcValue {
    /// Converts a JSON value to a value of `primitive_type`.
    ///
    /// Points are `[x, y]` / `[x, y, z]`, binary is an array of bytes,
    /// datetime is integer ticks. Returns `None` when the shape does not fit.
    pub fn from_json(primitive_type: PrimitiveType, json: &serde_json::Value) -> Option<Self> {
        use serde_json::Value;

        if json.is_null() {
            return Some(EcValue::Null);
        }
        let doubles = |len: usize| -> Option<Vec<f64>> {
            let items = json.as_array()?;
            if items.len() != len {
                return None;
            }
            items.iter().map(Value::as_f64).collect()
        };
        let value = match primitive_type {
            PrimitiveType::Integer => EcValue::Integer(i32::try_from(json.as_i64()?).ok()?),
            PrimitiveType::Long => EcValue::Long(json.as_i64()?),
            PrimitiveType::Double => EcValue::Double(json.as_f64()?),
            PrimitiveType::Boolean => EcValue::Boolean(json.as_bool()?),
            PrimitiveType::String => EcValue::String(json.as_str()?.to_string()),
            PrimitiveType::DateTime => EcValue::DateTime(json.as_i64()?),
            PrimitiveType::Binary => EcValue::Binary(
                json.as_array()?
                    .iter()
                    .map(|b| b.as_u64().and_then(|b| u8::try_from(b).ok()))
                    .collect::<Option<Vec<u8>>>()?,
            ),
            PrimitiveType::Point2d => {
                let c = doubles(2)?;
                EcValue::Point2d(Point2d { x: c[0], y: c[1] })
            }
            PrimitiveType::Point3d => {
                let c = doubles(3)?;
                EcValue::Point3d(Point3d { x: c[0], y: c[1], z: c[2] })
            }
        };
        Some(value)
    }

    /// JSON form of a primitive value; arrays and structs render as their
    /// display text.
    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::{json, Value};

        match self {
            EcValue::Null => Value::Null,
            EcValue::Integer(v) => json!(v),
            EcValue::Long(v) | EcValue::DateTime(v) => json!(v),
            EcValue::Double(v) => json!(v),
            EcValue::Boolean(v) => json!(v),
            EcValue::String(s) => json!(s),
            EcValue::Binary(b) => json!(b),
            EcValue::Point2d(p) => json!([p.x, p.y]),
            EcValue::Point3d(p) => json!([p.x, p.y, p.z]),
            EcValue::Array(_) | EcValue::Struct(_) => json!(self.to_string()),
        }
    }
}
