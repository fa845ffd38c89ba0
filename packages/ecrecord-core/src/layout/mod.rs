//! Class layouts: where each property of a record type lives in an instance buffer.
//!
//! A buffer is laid out as
//! `[header][null-flag words][fixed slots / secondary offsets][variable values]`.
//! Layouts are built once per class by [`ClassLayoutFactory`] (or from a
//! [`SchemaDefinition`] via [`build_from_class`]) and are immutable afterwards.

mod class_layout;
mod factory;
mod property_layout;
mod schema;

pub use class_layout::{
    ClassIndex, ClassLayout, InstanceHeader, SchemaIndex, INSTANCE_HEADER_SIZE, SOURCE_ECPOINTER,
    TARGET_ECPOINTER,
};
pub use factory::ClassLayoutFactory;
pub use property_layout::{null_flags_word_count, PropertyLayout};
pub use schema::{
    build_from_class, ClassDefinition, PropertyDefinition, PropertyKind, SchemaDefinition,
    SchemaLayout,
};

#[cfg(test)]
mod tests {
    include!("tests.rs");
}
