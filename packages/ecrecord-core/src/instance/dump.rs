use std::fmt;

use super::memory::read_u32;
use super::offsets::{offset_of_property_value, property_value_size};
use super::storage::InstanceStorage;
use super::support::MemoryInstanceSupport;
use crate::error::InstanceError;
use crate::layout::{null_flags_word_count, ClassLayout, InstanceHeader, PropertyLayout, INSTANCE_HEADER_SIZE};
use crate::types::TypeDescriptor;

/// Read-only view used to decode a borrowed buffer.
struct BufferView<'a>(&'a [u8]);

impl InstanceStorage for BufferView<'_> {
    fn data(&self) -> &[u8] {
        self.0
    }

    fn grow_allocation(&mut self, _additional: usize) -> Result<(), InstanceError> {
        Err(InstanceError::OperationNotSupported("read-only buffer".into()))
    }

    fn modify_data(&mut self, _offset: usize, _bytes: &[u8]) -> Result<(), InstanceError> {
        Err(InstanceError::OperationNotSupported("read-only buffer".into()))
    }
}

/// Annotated dump of an instance buffer: header, null-flag words, and every
/// property with its offset, null state and value.
///
/// Unreadable regions are reported inline instead of failing the dump.
pub struct InstanceDump<'a> {
    layout: &'a ClassLayout,
    data: &'a [u8],
}

impl<'a> InstanceDump<'a> {
    pub fn new(layout: &'a ClassLayout, data: &'a [u8]) -> Self {
        Self { layout, data }
    }
}

impl fmt::Display for InstanceDump<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (layout, data) = (self.layout, self.data);
        let view = BufferView(data);

        match InstanceHeader::read(data) {
            Ok(header) => writeln!(
                f,
                "Instance of {} (schema {}, class {}, flags 0x{:08x}), {} of {} bytes used",
                layout.name(),
                header.schema_index,
                header.class_index,
                header.instance_flags,
                layout.calculate_bytes_used(data),
                data.len()
            )?,
            Err(e) => return writeln!(f, "Instance of {} with unreadable header: {}", layout.name(), e),
        }

        for word in 0..null_flags_word_count(layout.property_count_excluding_embedded_structs()) {
            let offset = INSTANCE_HEADER_SIZE + word * 4;
            match read_u32(data, offset) {
                Ok(flags) => writeln!(f, "  null flags @{offset}: 0x{flags:08x}")?,
                Err(e) => writeln!(f, "  null flags @{offset}: {e}")?,
            }
        }

        for prop in layout.property_layouts().skip(1) {
            match property_lines(&view, prop) {
                Ok(lines) => {
                    for line in lines {
                        writeln!(f, "{line}")?;
                    }
                }
                Err(e) => writeln!(f, "  {} *** {} ***", prop.access_string(), e)?,
            }
        }
        Ok(())
    }
}

/// Renders [`InstanceDump`] into a string.
pub fn instance_data_to_string(layout: &ClassLayout, data: &[u8]) -> String {
    InstanceDump::new(layout, data).to_string()
}

fn property_lines(view: &BufferView<'_>, prop: &PropertyLayout) -> Result<Vec<String>, InstanceError> {
    let data = view.data();
    if prop.is_struct() {
        return Ok(vec![format!("  {} (struct)", prop.access_string())]);
    }

    let location = if prop.is_fixed_sized() {
        format!("@{}", prop.offset())
    } else {
        format!(
            "@{} -> {} ({} bytes)",
            prop.offset(),
            offset_of_property_value(data, prop)?,
            property_value_size(data, prop)?
        )
    };

    match prop.type_descriptor() {
        TypeDescriptor::Primitive(primitive_type) => {
            let value = view.get_value_from_memory(prop, None)?;
            Ok(vec![format!("  {} {} {} = {}", prop.access_string(), location, primitive_type, value)])
        }
        descriptor => {
            let count = view.get_reserved_array_count(prop)?;
            let mut lines = vec![format!("  {} {} {}[{}]", prop.access_string(), location, descriptor, count)];
            for index in 0..count {
                let text = if descriptor.is_struct_array() {
                    if view.is_property_value_null(prop, Some(index))? {
                        "<null>".to_string()
                    } else {
                        let offset = view.get_offset_of_property_value(prop, Some(index))?;
                        format!("struct #{}", read_u32(data, offset)?)
                    }
                } else {
                    view.get_value_from_memory(prop, Some(index))?.to_string()
                };
                lines.push(format!("    [{index}] {text}"));
            }
            Ok(lines)
        }
    }
}
