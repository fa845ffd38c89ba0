//! Primitive types, property type descriptors, and the tagged value union.

mod primitive;
mod value;

pub use primitive::{PrimitiveType, TypeDescriptor};
pub use value::{ArrayInfo, EcValue, Point2d, Point3d};

#[cfg(test)]
mod tests {
    include!("tests.rs");
}
