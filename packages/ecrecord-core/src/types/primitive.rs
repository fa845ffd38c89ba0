use std::fmt;

use serde::{Deserialize, Serialize};

/// Primitive value kinds storable in an instance buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrimitiveType {
    Integer,
    Long,
    Double,
    Boolean,
    String,
    Binary,
    Point2d,
    Point3d,
    DateTime,
}

impl PrimitiveType {
    /// Size in bytes of a fixed-size primitive, `None` for String and Binary.
    pub fn fixed_size(self) -> Option<u32> {
        match self {
            PrimitiveType::Integer => Some(4),
            PrimitiveType::Long | PrimitiveType::Double | PrimitiveType::DateTime => Some(8),
            PrimitiveType::Boolean => Some(1),
            PrimitiveType::Point2d => Some(16),
            PrimitiveType::Point3d => Some(24),
            PrimitiveType::String | PrimitiveType::Binary => None,
        }
    }

    pub fn is_fixed_size(self) -> bool {
        self.fixed_size().is_some()
    }

    pub fn name(self) -> &'static str {
        match self {
            PrimitiveType::Integer => "int",
            PrimitiveType::Long => "long",
            PrimitiveType::Double => "double",
            PrimitiveType::Boolean => "boolean",
            PrimitiveType::String => "string",
            PrimitiveType::Binary => "binary",
            PrimitiveType::Point2d => "point2d",
            PrimitiveType::Point3d => "point3d",
            PrimitiveType::DateTime => "dateTime",
        }
    }
}

impl fmt::Display for PrimitiveType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Type of a property as seen by the layout engine.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeDescriptor {
    /// Scalar primitive value
    Primitive(PrimitiveType),
    /// Array of primitive values
    PrimitiveArray(PrimitiveType),
    /// Embedded struct; occupies no bytes of its own
    Struct,
    /// Array of separately allocated struct instances
    StructArray,
}

impl TypeDescriptor {
    pub fn is_primitive(&self) -> bool {
        matches!(self, TypeDescriptor::Primitive(_))
    }

    pub fn is_array(&self) -> bool {
        matches!(
            self,
            TypeDescriptor::PrimitiveArray(_) | TypeDescriptor::StructArray
        )
    }

    pub fn is_struct(&self) -> bool {
        matches!(self, TypeDescriptor::Struct)
    }

    pub fn is_struct_array(&self) -> bool {
        matches!(self, TypeDescriptor::StructArray)
    }

    /// Primitive kind of a scalar or array element, `None` for structs.
    pub fn primitive_type(&self) -> Option<PrimitiveType> {
        match self {
            TypeDescriptor::Primitive(t) | TypeDescriptor::PrimitiveArray(t) => Some(*t),
            TypeDescriptor::Struct | TypeDescriptor::StructArray => None,
        }
    }

    /// Fixed byte size of one array element, `None` when elements are variable.
    ///
    /// Struct array elements are variable: each stores an owner-assigned id
    /// in its own secondary-offset region.
    pub fn fixed_element_size(&self) -> Option<u32> {
        match self {
            TypeDescriptor::PrimitiveArray(t) => t.fixed_size(),
            _ => None,
        }
    }
}

impl fmt::Display for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeDescriptor::Primitive(t) => write!(f, "{t}"),
            TypeDescriptor::PrimitiveArray(t) => write!(f, "{t}[]"),
            TypeDescriptor::Struct => f.write_str("struct"),
            TypeDescriptor::StructArray => f.write_str("struct[]"),
        }
    }
}
