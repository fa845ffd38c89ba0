use std::collections::{BTreeMap, HashMap};
use std::fmt;

use super::property_layout::{null_flags_word_count, PropertyLayout};
use crate::error::{InstanceError, LayoutError};
use crate::instance::memory::{read_u32, write_u32};

pub type SchemaIndex = u16;
pub type ClassIndex = u16;

/// Size of the instance header: schema index, class index, instance flags.
pub const INSTANCE_HEADER_SIZE: u32 = 8;

/// Access string of the relationship source pointer property.
pub const SOURCE_ECPOINTER: &str = "Source ECPointer";
/// Access string of the relationship target pointer property.
pub const TARGET_ECPOINTER: &str = "Target ECPointer";

const NULL_FLAGS_ALL_NULL: u32 = u32::MAX;

/// Fixed header at the start of every instance buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct InstanceHeader {
    pub schema_index: SchemaIndex,
    pub class_index: ClassIndex,
    pub instance_flags: u32,
}

impl InstanceHeader {
    pub fn read(data: &[u8]) -> Result<Self, InstanceError> {
        let header = data
            .get(..INSTANCE_HEADER_SIZE as usize)
            .ok_or_else(|| InstanceError::CorruptData("buffer shorter than header".into()))?;
        Ok(Self {
            schema_index: u16::from_le_bytes([header[0], header[1]]),
            class_index: u16::from_le_bytes([header[2], header[3]]),
            instance_flags: u32::from_le_bytes([header[4], header[5], header[6], header[7]]),
        })
    }

    pub fn write(&self, data: &mut [u8]) -> Result<(), InstanceError> {
        let header = data
            .get_mut(..INSTANCE_HEADER_SIZE as usize)
            .ok_or_else(|| InstanceError::CorruptData("buffer shorter than header".into()))?;
        header[0..2].copy_from_slice(&self.schema_index.to_le_bytes());
        header[2..4].copy_from_slice(&self.class_index.to_le_bytes());
        header[4..8].copy_from_slice(&self.instance_flags.to_le_bytes());
        Ok(())
    }
}

/// Immutable placement of every property of one class inside an instance buffer.
///
/// Built by [`ClassLayoutFactory`](super::ClassLayoutFactory); shared read-only
/// (usually behind an `Arc`) by every instance of the class.
#[derive(Debug, Clone)]
pub struct ClassLayout {
    class_name: String,
    schema_index: SchemaIndex,
    class_index: ClassIndex,
    property_layouts: Vec<PropertyLayout>,
    property_index_map: HashMap<String, u32>,
    logical_structure: BTreeMap<u32, Vec<u32>>,
    size_of_fixed_section: u32,
    source_ecpointer_index: Option<u32>,
    target_ecpointer_index: Option<u32>,
}

impl ClassLayout {
    pub(crate) fn new_empty(
        class_name: String,
        class_index: ClassIndex,
        schema_index: SchemaIndex,
    ) -> Self {
        Self {
            class_name,
            schema_index,
            class_index,
            property_layouts: Vec::new(),
            property_index_map: HashMap::new(),
            logical_structure: BTreeMap::new(),
            size_of_fixed_section: 0,
            source_ecpointer_index: None,
            target_ecpointer_index: None,
        }
    }

    pub(crate) fn add_property_layout(&mut self, layout: PropertyLayout) -> Result<u32, LayoutError> {
        if self.property_index_map.contains_key(&layout.access_string) {
            return Err(LayoutError::DuplicateAccessString {
                class: self.class_name.clone(),
                access_string: layout.access_string,
            });
        }

        let index = self.property_layouts.len() as u32;
        if index != 0 {
            self.logical_structure
                .get_mut(&layout.parent_struct_index)
                .ok_or_else(|| LayoutError::UnknownParentStruct {
                    access_string: layout.access_string.clone(),
                })?
                .push(index);
        }
        if layout.is_struct() {
            self.logical_structure.insert(index, Vec::new());
        }

        match layout.access_string.as_str() {
            SOURCE_ECPOINTER => self.source_ecpointer_index = Some(index),
            TARGET_ECPOINTER => self.target_ecpointer_index = Some(index),
            _ => {}
        }

        self.property_index_map
            .insert(layout.access_string.clone(), index);
        self.property_layouts.push(layout);
        Ok(index)
    }

    /// Mutable access for the factory while offsets are still being assigned.
    pub(crate) fn property_layouts_mut(&mut self) -> &mut [PropertyLayout] {
        &mut self.property_layouts
    }

    pub(crate) fn finish_layout(&mut self) {
        let last = self.property_layouts.iter().rev().find(|p| !p.is_struct());
        self.size_of_fixed_section = match last {
            None => INSTANCE_HEADER_SIZE,
            Some(last) => {
                let mut size = last.offset + last.size_in_fixed_section();
                if !last.is_fixed_sized() {
                    // sentinel holding the end of the variable section
                    size += 4;
                }
                size
            }
        };
        tracing::debug!(
            "Finished layout for class {} (index {}): {} properties, fixed section {} bytes",
            self.class_name,
            self.class_index,
            self.property_layouts.len(),
            self.size_of_fixed_section
        );
    }

    pub fn name(&self) -> &str {
        &self.class_name
    }

    pub fn schema_index(&self) -> SchemaIndex {
        self.schema_index
    }

    pub fn class_index(&self) -> ClassIndex {
        self.class_index
    }

    pub fn size_of_fixed_section(&self) -> u32 {
        self.size_of_fixed_section
    }

    pub fn property_count(&self) -> u32 {
        self.property_layouts.len() as u32
    }

    pub fn property_count_excluding_embedded_structs(&self) -> u32 {
        self.property_layouts.iter().filter(|p| !p.is_struct()).count() as u32
    }

    pub fn property_layouts(&self) -> impl Iterator<Item = &PropertyLayout> {
        self.property_layouts.iter()
    }

    /// Variable-size properties in slot order.
    pub fn variable_property_layouts(&self) -> impl Iterator<Item = &PropertyLayout> {
        self.property_layouts
            .iter()
            .filter(|p| !p.is_struct() && !p.is_fixed_sized())
    }

    pub fn is_relationship_class(&self) -> bool {
        self.source_ecpointer_index.is_some() && self.target_ecpointer_index.is_some()
    }

    pub fn source_ecpointer_index(&self) -> Option<u32> {
        self.source_ecpointer_index
    }

    pub fn target_ecpointer_index(&self) -> Option<u32> {
        self.target_ecpointer_index
    }

    /// Looks up a property by access string.
    ///
    /// Array properties are found with or without the trailing `[]`.
    pub fn get_property_layout(&self, access_string: &str) -> Option<&PropertyLayout> {
        self.get_property_index(access_string)
            .and_then(|i| self.property_layouts.get(i as usize))
    }

    pub fn get_property_index(&self, access_string: &str) -> Option<u32> {
        if let Some(index) = self.property_index_map.get(access_string) {
            return Some(*index);
        }
        if access_string.ends_with("[]") {
            return None;
        }
        let index = *self.property_index_map.get(&format!("{access_string}[]"))?;
        Some(index)
    }

    pub fn get_property_layout_by_index(&self, index: u32) -> Option<&PropertyLayout> {
        self.property_layouts.get(index as usize)
    }

    pub fn get_access_string_by_index(&self, index: u32) -> Option<&str> {
        self.get_property_layout_by_index(index)
            .map(PropertyLayout::access_string)
    }

    /// Property indices whose parent is the struct at `parent_index`.
    ///
    /// Index 0 is the root struct; an unknown or non-struct parent yields no children.
    pub fn get_logical_children(&self, parent_index: u32) -> &[u32] {
        self.logical_structure
            .get(&parent_index)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn is_property_read_only(&self, index: u32) -> bool {
        self.get_property_layout_by_index(index)
            .map_or(true, PropertyLayout::is_read_only)
    }

    /// Marks a property read-only. Returns false when the access string is unknown.
    pub fn set_property_read_only(&mut self, access_string: &str, read_only: bool) -> bool {
        match self.get_property_index(access_string) {
            Some(index) => {
                self.property_layouts[index as usize].read_only = read_only;
                true
            }
            None => false,
        }
    }

    /// True when `other` can be read through this layout: same class name and
    /// every property here exists in `other` with the same type.
    pub fn is_compatible(&self, other: &ClassLayout) -> bool {
        if std::ptr::eq(self, other) {
            return true;
        }
        if !self.class_name.eq_ignore_ascii_case(&other.class_name) {
            return false;
        }
        self.property_layouts.iter().all(|prop| {
            other
                .get_property_layout(prop.access_string())
                .is_some_and(|o| o.type_descriptor() == prop.type_descriptor())
        })
    }

    fn last_layout_is_variable(&self) -> bool {
        self.property_layouts
            .last()
            .is_some_and(|p| !p.is_struct() && !p.is_fixed_sized())
    }

    /// Offset of the end-of-data sentinel, `None` when the class has no
    /// variable-size properties.
    pub(crate) fn sentinel_offset(&self) -> Option<u32> {
        self.last_layout_is_variable()
            .then(|| self.size_of_fixed_section - 4)
    }

    /// Bytes of `data` in use by the instance.
    pub fn calculate_bytes_used(&self, data: &[u8]) -> u32 {
        match self.sentinel_offset() {
            Some(sentinel) => read_u32(data, sentinel).unwrap_or(self.size_of_fixed_section),
            None => self.size_of_fixed_section,
        }
    }

    /// Writes the header, marks every property (and fixed array element) null,
    /// and seeds the secondary offsets of an empty instance.
    pub fn initialize_memory_for_instance(&self, data: &mut [u8]) -> Result<(), InstanceError> {
        if data.len() < self.size_of_fixed_section as usize {
            return Err(InstanceError::AllocationFailed {
                requested: self.size_of_fixed_section as usize,
            });
        }

        InstanceHeader {
            schema_index: self.schema_index,
            class_index: self.class_index,
            instance_flags: 0,
        }
        .write(data)?;

        let non_struct_count = self.property_count_excluding_embedded_structs();
        if non_struct_count == 0 {
            return Ok(());
        }
        for word in 0..null_flags_word_count(non_struct_count) {
            write_u32(data, INSTANCE_HEADER_SIZE + word * 4, NULL_FLAGS_ALL_NULL)?;
        }

        let mut first_variable = true;
        for prop in self.property_layouts.iter().filter(|p| !p.is_struct()) {
            if prop.is_fixed_sized() {
                if prop.is_array() {
                    for word in 0..null_flags_word_count(prop.modifier_data) {
                        write_u32(data, prop.offset + word * 4, NULL_FLAGS_ALL_NULL)?;
                    }
                }
                continue;
            }
            let initial = if first_variable {
                self.size_of_fixed_section
            } else {
                0
            };
            write_u32(data, prop.offset, initial)?;
            first_variable = false;
        }

        if let Some(sentinel) = self.sentinel_offset() {
            write_u32(data, sentinel, self.size_of_fixed_section)?;
        }
        Ok(())
    }

    fn fmt_logical_structure(
        &self,
        f: &mut fmt::Formatter<'_>,
        parent_index: u32,
        indent: usize,
    ) -> fmt::Result {
        for &index in self.get_logical_children(parent_index) {
            let Some(prop) = self.get_property_layout_by_index(index) else {
                writeln!(f, "{index}  *** ERROR finding PropertyLayout ***")?;
                continue;
            };
            writeln!(
                f,
                "{}{:<width$}{:<40}  Parent: {}",
                "|--".repeat(indent),
                index,
                prop.access_string(),
                prop.parent_struct_index(),
                width = 12usize.saturating_sub(3 * indent)
            )?;
            if prop.is_struct() {
                self.fmt_logical_structure(f, index, indent + 1)?;
            }
        }
        Ok(())
    }
}

impl fmt::Display for ClassLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "ClassLayout for class index {} ({}), fixed section {} bytes",
            self.class_index, self.class_name, self.size_of_fixed_section
        )?;
        for (index, prop) in self.property_layouts.iter().enumerate() {
            writeln!(f, "{index:<4}{prop}")?;
        }
        writeln!(f, "Logical Structure:")?;
        self.fmt_logical_structure(f, 0, 0)
    }
}
