use super::array_resizer::{self, ArrayResizer};
use super::edit::InstanceEdit;
use super::memory::{bytes, read_u32};
use super::offsets::{
    allocated_array_count, array_element_value_size, decode_primitive, encode_primitive, is_null,
    null_flag_location, offset_of_array_index_value, offset_of_property_value, property_value_size,
    reserved_array_count,
};
use super::storage::{InstanceStorage, SetOutcome};
use crate::error::InstanceError;
use crate::layout::{ClassLayout, PropertyLayout};
use crate::types::{ArrayInfo, EcValue, PrimitiveType, TypeDescriptor};
use std::sync::Arc;

fn index_out_of_range(prop: &PropertyLayout, index: u32, count: u32) -> InstanceError {
    InstanceError::IndexOutOfRange {
        access_string: prop.access_string().to_string(),
        index,
        count,
    }
}

fn not_supported(prop: &PropertyLayout, reason: &str) -> InstanceError {
    InstanceError::DataTypeNotSupported {
        access_string: prop.access_string().to_string(),
        reason: reason.to_string(),
    }
}

fn mismatch(prop: &PropertyLayout, expected: impl ToString, value: &EcValue) -> InstanceError {
    InstanceError::DataTypeMismatch {
        access_string: prop.access_string().to_string(),
        expected: expected.to_string(),
        got: value.kind_name().to_string(),
    }
}

fn require_variable_count(prop: &PropertyLayout) -> Result<(), InstanceError> {
    if !prop.is_array() || prop.is_fixed_count() {
        return Err(InstanceError::PreconditionViolated(format!(
            "'{}' is not a variable-count array",
            prop.access_string()
        )));
    }
    Ok(())
}

/// Id held by a non-null struct array element.
fn stored_struct_id(data: &[u8], prop: &PropertyLayout, index: u32) -> Result<Option<u32>, InstanceError> {
    if !prop.type_descriptor().is_struct_array() || is_null(data, prop, Some(index))? {
        return Ok(None);
    }
    let array_offset = offset_of_property_value(data, prop)?;
    let offset = offset_of_array_index_value(data, prop, array_offset, index)?;
    Ok(Some(read_u32(data, offset)?))
}

/// Reads and writes property values in an [`InstanceStorage`] buffer laid out
/// by a [`ClassLayout`].
///
/// Implemented for every storage owner. `layout` must be the layout the buffer
/// was initialized with and `prop` one of its property layouts.
pub trait MemoryInstanceSupport: InstanceStorage {
    fn calculate_bytes_used(&self, layout: &ClassLayout) -> u32 {
        layout.calculate_bytes_used(self.data())
    }

    fn is_property_value_null(&self, prop: &PropertyLayout, index: Option<u32>) -> Result<bool, InstanceError> {
        is_null(self.data(), prop, index)
    }

    /// Sets or clears one null flag. No-op when the flag already has the
    /// requested state.
    fn set_property_value_null(
        &mut self,
        prop: &PropertyLayout,
        index: Option<u32>,
        is_null: bool,
    ) -> Result<SetOutcome, InstanceError> {
        let (offset, mask) = null_flag_location(self.data(), prop, index)?;
        let word = read_u32(self.data(), offset)?;
        let updated = if is_null { word | mask } else { word & !mask };
        if updated == word {
            return Ok(SetOutcome::Unchanged);
        }
        self.modify_data(offset as usize, &updated.to_le_bytes())?;
        Ok(SetOutcome::Changed)
    }

    fn get_offset_of_property_value(&self, prop: &PropertyLayout, index: Option<u32>) -> Result<u32, InstanceError> {
        let offset = offset_of_property_value(self.data(), prop)?;
        match index {
            None => Ok(offset),
            Some(index) => offset_of_array_index_value(self.data(), prop, offset, index),
        }
    }

    fn get_property_value_size(&self, prop: &PropertyLayout) -> Result<u32, InstanceError> {
        property_value_size(self.data(), prop)
    }

    fn get_allocated_array_count(&self, prop: &PropertyLayout) -> Result<u32, InstanceError> {
        allocated_array_count(self.data(), prop)
    }

    fn get_reserved_array_count(&self, prop: &PropertyLayout) -> Result<u32, InstanceError> {
        reserved_array_count(self.data(), prop)
    }

    /// Reads a property value, or one array element when `index` is given.
    ///
    /// Arrays read without an index yield [`EcValue::Array`]; embedded structs
    /// yield `EcValue::Struct(None)`.
    fn get_value_from_memory(&self, prop: &PropertyLayout, index: Option<u32>) -> Result<EcValue, InstanceError> {
        let data = self.data();
        match (prop.type_descriptor(), index) {
            (TypeDescriptor::Struct, None) => Ok(EcValue::Struct(None)),
            (TypeDescriptor::Primitive(primitive_type), None) => {
                if is_null(data, prop, None)? {
                    return Ok(EcValue::Null);
                }
                let offset = offset_of_property_value(data, prop)?;
                let size = property_value_size(data, prop)?;
                decode_primitive(data, *primitive_type, offset, size)
            }
            (descriptor @ (TypeDescriptor::PrimitiveArray(_) | TypeDescriptor::StructArray), None) => {
                Ok(EcValue::Array(ArrayInfo {
                    element_type: descriptor.primitive_type(),
                    count: reserved_array_count(data, prop)?,
                    is_fixed_count: prop.is_fixed_count(),
                }))
            }
            (descriptor @ (TypeDescriptor::PrimitiveArray(_) | TypeDescriptor::StructArray), Some(index)) => {
                let reserved = reserved_array_count(data, prop)?;
                if index >= reserved {
                    return Err(index_out_of_range(prop, index, reserved));
                }
                if is_null(data, prop, Some(index))? {
                    return Ok(EcValue::Null);
                }
                let array_offset = offset_of_property_value(data, prop)?;
                let offset = offset_of_array_index_value(data, prop, array_offset, index)?;
                match descriptor.primitive_type() {
                    Some(primitive_type) => {
                        let size = array_element_value_size(data, prop, array_offset, index)?;
                        decode_primitive(data, primitive_type, offset, size)
                    }
                    None => Ok(EcValue::Struct(Some(self.get_struct_value(read_u32(data, offset)?)?))),
                }
            }
            (TypeDescriptor::Struct | TypeDescriptor::Primitive(_), Some(_)) => {
                Err(not_supported(prop, "not an array"))
            }
        }
    }

    /// Writes a property value, or one array element when `index` is given.
    ///
    /// Writing a variable-size value may move every byte after the property.
    /// On error the buffer content is unchanged.
    fn set_value_to_memory(
        &mut self,
        layout: &ClassLayout,
        prop: &PropertyLayout,
        index: Option<u32>,
        value: &EcValue,
    ) -> Result<SetOutcome, InstanceError> {
        let element_type = match (prop.type_descriptor(), index) {
            (TypeDescriptor::Primitive(t), None) | (TypeDescriptor::PrimitiveArray(t), Some(_)) => Some(*t),
            (TypeDescriptor::StructArray, Some(_)) => None,
            (TypeDescriptor::Struct, _) => return Err(not_supported(prop, "embedded struct")),
            (_, None) => return Err(not_supported(prop, "array value requires an index")),
            (_, Some(_)) => return Err(not_supported(prop, "not an array")),
        };

        if let Some(index) = index {
            let reserved = reserved_array_count(self.data(), prop)?;
            if index >= reserved {
                return Err(index_out_of_range(prop, index, reserved));
            }
        }

        // fixed-count arrays of variable-size elements get their region on first write
        let unmaterialized =
            index.is_some() && !prop.is_fixed_sized() && allocated_array_count(self.data(), prop)? == 0;

        if value.is_null() {
            if unmaterialized || is_null(self.data(), prop, index)? {
                return Ok(SetOutcome::Unchanged);
            }
            let previous_id = match index {
                Some(index) => stored_struct_id(self.data(), prop, index)?,
                None => None,
            };
            let outcome = self.set_property_value_null(prop, index, true)?;
            if let Some(id) = previous_id {
                self.release_struct_value(id);
            }
            return Ok(outcome);
        }

        match element_type {
            Some(primitive_type) => {
                if value.primitive_type() != Some(primitive_type) {
                    return Err(mismatch(prop, primitive_type, value));
                }
                let encoded = encode_primitive(value).ok_or_else(|| mismatch(prop, primitive_type, value))?;
                // bitwise: 0.0 and -0.0 are distinct values here
                if !unmaterialized {
                    let stored = encode_primitive(&self.get_value_from_memory(prop, index)?);
                    if stored.as_deref() == Some(encoded.as_slice()) {
                        return Ok(SetOutcome::Unchanged);
                    }
                }
                if is_fixed_slot(prop, index, primitive_type, unmaterialized) {
                    set_fixed_bytes(self, prop, index, &encoded)?;
                } else {
                    set_variable_bytes(self, layout, prop, index, &encoded, unmaterialized)?;
                }
                Ok(SetOutcome::Changed)
            }
            None => {
                let EcValue::Struct(Some(handle)) = value else {
                    return Err(mismatch(prop, "struct", value));
                };
                let index = index.unwrap_or_default();
                let previous_id = if unmaterialized {
                    None
                } else {
                    stored_struct_id(self.data(), prop, index)?
                };
                if let Some(id) = previous_id {
                    if Arc::ptr_eq(&self.get_struct_value(id)?, handle) {
                        return Ok(SetOutcome::Unchanged);
                    }
                }
                let id = self.store_struct_value(handle.clone())?;
                if let Err(e) = set_variable_bytes(self, layout, prop, Some(index), &id.to_le_bytes(), unmaterialized) {
                    self.release_struct_value(id);
                    return Err(e);
                }
                if let Some(previous) = previous_id {
                    self.release_struct_value(previous);
                }
                Ok(SetOutcome::Changed)
            }
        }
    }

    /// Inserts `count` null elements before `index` of a variable-count array.
    fn insert_null_array_elements_at(
        &mut self,
        layout: &ClassLayout,
        prop: &PropertyLayout,
        index: u32,
        count: u32,
    ) -> Result<(), InstanceError> {
        require_variable_count(prop)?;
        if count == 0 {
            return Err(index_out_of_range(prop, index, allocated_array_count(self.data(), prop)?));
        }
        let mut edit = InstanceEdit::begin(self, layout);
        ArrayResizer::insert_null_elements(&mut edit, prop, index, count)?;
        edit.commit()
    }

    /// Appends `count` null elements to a variable-count array.
    fn add_null_array_elements_at(
        &mut self,
        layout: &ClassLayout,
        prop: &PropertyLayout,
        count: u32,
    ) -> Result<(), InstanceError> {
        let index = allocated_array_count(self.data(), prop)?;
        self.insert_null_array_elements_at(layout, prop, index, count)
    }

    /// Removes `count` elements starting at `index` from a variable-count array.
    fn remove_array_elements(
        &mut self,
        layout: &ClassLayout,
        prop: &PropertyLayout,
        index: u32,
        count: u32,
    ) -> Result<(), InstanceError> {
        require_variable_count(prop)?;
        let mut edit = InstanceEdit::begin(self, layout);
        let released = array_resizer::remove_elements(&mut edit, prop, index, count)?;
        edit.commit()?;
        for id in released {
            self.release_struct_value(id);
        }
        Ok(())
    }
}

impl<S: InstanceStorage + ?Sized> MemoryInstanceSupport for S {}

fn is_fixed_slot(prop: &PropertyLayout, index: Option<u32>, primitive_type: PrimitiveType, unmaterialized: bool) -> bool {
    match index {
        None => prop.is_fixed_sized(),
        Some(_) => primitive_type.is_fixed_size() && !unmaterialized,
    }
}

fn set_fixed_bytes<S: InstanceStorage + ?Sized>(
    owner: &mut S,
    prop: &PropertyLayout,
    index: Option<u32>,
    encoded: &[u8],
) -> Result<(), InstanceError> {
    let offset = owner.get_offset_of_property_value(prop, index)?;
    let (flag_offset, mask) = null_flag_location(owner.data(), prop, index)?;
    let flags = read_u32(owner.data(), flag_offset)? & !mask;
    bytes(owner.data(), offset, encoded.len() as u32)?;
    owner.modify_data(offset as usize, encoded)?;
    owner.modify_data(flag_offset as usize, &flags.to_le_bytes())
}

fn set_variable_bytes<S: InstanceStorage + ?Sized>(
    owner: &mut S,
    layout: &ClassLayout,
    prop: &PropertyLayout,
    index: Option<u32>,
    encoded: &[u8],
    unmaterialized: bool,
) -> Result<(), InstanceError> {
    let mut edit = InstanceEdit::begin(owner, layout);
    let bytes_needed = encoded.len() as u32;
    let offset = match index {
        None => edit.ensure_space_is_available(prop, bytes_needed)?,
        Some(index) => {
            if unmaterialized {
                ArrayResizer::insert_null_elements(&mut edit, prop, 0, prop.modifier_data())?;
            }
            if prop.type_descriptor().fixed_element_size().is_none() {
                edit.ensure_space_is_available_for_array_index_value(prop, index, bytes_needed)?;
            }
            let array_offset = offset_of_property_value(edit.data(), prop)?;
            offset_of_array_index_value(edit.data(), prop, array_offset, index)?
        }
    };
    edit.write_bytes(offset, encoded)?;
    edit.set_null_flag(prop, index, false)?;
    edit.commit()
}
