use std::fmt;

use crate::types::{PrimitiveType, TypeDescriptor};

/// Number of 32-bit null-flag words needed for `count` flags.
pub fn null_flags_word_count(count: u32) -> u32 {
    count.div_ceil(32)
}

/// Per-property placement inside an instance buffer.
///
/// `offset` is either the property's fixed-size slot or, for variable-size
/// properties, the slot holding its secondary offset. Struct placeholders
/// carry offset 0 and no null flag.
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyLayout {
    pub(crate) access_string: String,
    pub(crate) parent_struct_index: u32,
    pub(crate) type_descriptor: TypeDescriptor,
    pub(crate) offset: u32,
    pub(crate) null_flags_offset: u32,
    pub(crate) null_flags_bitmask: u32,
    pub(crate) fixed_count: bool,
    pub(crate) modifier_data: u32,
    pub(crate) read_only: bool,
}

impl PropertyLayout {
    pub(crate) fn new_struct(access_string: String, parent_struct_index: u32) -> Self {
        Self {
            access_string,
            parent_struct_index,
            type_descriptor: TypeDescriptor::Struct,
            offset: 0,
            null_flags_offset: 0,
            null_flags_bitmask: 0,
            fixed_count: false,
            modifier_data: 0,
            read_only: false,
        }
    }

    pub fn access_string(&self) -> &str {
        &self.access_string
    }

    /// Name of the property without its parent struct path or `[]` suffix.
    pub fn name(&self) -> &str {
        let base = self.access_string.trim_end_matches("[]");
        base.rsplit('.').next().unwrap_or(base)
    }

    pub fn parent_struct_index(&self) -> u32 {
        self.parent_struct_index
    }

    pub fn type_descriptor(&self) -> &TypeDescriptor {
        &self.type_descriptor
    }

    pub fn primitive_type(&self) -> Option<PrimitiveType> {
        self.type_descriptor.primitive_type()
    }

    pub fn offset(&self) -> u32 {
        self.offset
    }

    pub fn null_flags_offset(&self) -> u32 {
        self.null_flags_offset
    }

    pub fn null_flags_bitmask(&self) -> u32 {
        self.null_flags_bitmask
    }

    /// Element count for fixed arrays, 0 otherwise.
    pub fn modifier_data(&self) -> u32 {
        self.modifier_data
    }

    /// Array whose element count is fixed by the layout.
    pub fn is_fixed_count(&self) -> bool {
        self.fixed_count
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    pub fn is_struct(&self) -> bool {
        self.type_descriptor.is_struct()
    }

    pub fn is_array(&self) -> bool {
        self.type_descriptor.is_array()
    }

    /// Whether the property value lives entirely in the fixed section.
    pub fn is_fixed_sized(&self) -> bool {
        match &self.type_descriptor {
            TypeDescriptor::Primitive(t) => t.is_fixed_size(),
            TypeDescriptor::PrimitiveArray(t) => self.fixed_count && t.is_fixed_size(),
            TypeDescriptor::Struct => true,
            TypeDescriptor::StructArray => false,
        }
    }

    /// Bytes the property occupies in the fixed section.
    pub fn size_in_fixed_section(&self) -> u32 {
        if !self.is_fixed_sized() {
            return 4;
        }
        match &self.type_descriptor {
            TypeDescriptor::Primitive(t) => t.fixed_size().unwrap_or(0),
            TypeDescriptor::PrimitiveArray(t) => {
                null_flags_word_count(self.modifier_data) * 4
                    + self.modifier_data * t.fixed_size().unwrap_or(0)
            }
            TypeDescriptor::Struct | TypeDescriptor::StructArray => 0,
        }
    }
}

impl fmt::Display for PropertyLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_struct() {
            let name = if self.access_string.is_empty() {
                "<root>"
            } else {
                &self.access_string
            };
            return write!(f, "{name} (struct, parent={})", self.parent_struct_index);
        }
        write!(
            f,
            "{} ({}{}) offset={} nullflags={}:{:#010x} parent={}",
            self.access_string,
            if self.is_fixed_sized() { "fixed " } else { "variable " },
            self.type_descriptor,
            self.offset,
            self.null_flags_offset,
            self.null_flags_bitmask,
            self.parent_struct_index,
        )?;
        if self.is_array() {
            write!(
                f,
                " count={}{}",
                self.modifier_data,
                if self.fixed_count { " fixed" } else { "" }
            )?;
        }
        if self.read_only {
            f.write_str(" readonly")?;
        }
        Ok(())
    }
}
