//! Read-only offset, size, null-flag and value decoding over instance bytes.
//!
//! Array element secondary offsets are relative to the start of the array's
//! value region; property secondary offsets are relative to the instance start.

use super::memory::{bytes, read_f64, read_u32, read_u64};
use crate::error::InstanceError;
use crate::layout::{null_flags_word_count, PropertyLayout};
use crate::types::{EcValue, Point2d, Point3d, PrimitiveType};

fn corrupt(message: String) -> InstanceError {
    InstanceError::CorruptData(message)
}

/// Bytes occupied by one element slot: the element itself for fixed-size
/// elements, a secondary offset otherwise.
pub(crate) fn element_slot_size(prop: &PropertyLayout) -> u32 {
    prop.type_descriptor().fixed_element_size().unwrap_or(4)
}

pub(crate) fn has_fixed_size_elements(prop: &PropertyLayout) -> bool {
    prop.type_descriptor().fixed_element_size().is_some()
}

pub(crate) fn secondary_offset(data: &[u8], prop: &PropertyLayout) -> Result<u32, InstanceError> {
    read_u32(data, prop.offset())
}

pub(crate) fn next_secondary_offset(data: &[u8], prop: &PropertyLayout) -> Result<u32, InstanceError> {
    read_u32(data, prop.offset() + 4)
}

/// Start of the property value: the fixed slot, or where the secondary offset points.
pub(crate) fn offset_of_property_value(data: &[u8], prop: &PropertyLayout) -> Result<u32, InstanceError> {
    if prop.is_fixed_sized() {
        Ok(prop.offset())
    } else {
        secondary_offset(data, prop)
    }
}

/// Bytes reserved for the property value; 0 for unmaterialized variable values.
pub(crate) fn property_value_size(data: &[u8], prop: &PropertyLayout) -> Result<u32, InstanceError> {
    if prop.is_fixed_sized() {
        return Ok(prop.size_in_fixed_section());
    }
    let current = secondary_offset(data, prop)?;
    let next = next_secondary_offset(data, prop)?;
    if current == 0 || next == 0 {
        return Ok(0);
    }
    next.checked_sub(current).ok_or_else(|| {
        corrupt(format!(
            "secondary offsets of '{}' decrease ({current} > {next})",
            prop.access_string()
        ))
    })
}

/// Elements physically present in the buffer.
pub(crate) fn allocated_array_count(data: &[u8], prop: &PropertyLayout) -> Result<u32, InstanceError> {
    if prop.is_fixed_sized() {
        return Ok(prop.modifier_data());
    }
    let current = secondary_offset(data, prop)?;
    let next = next_secondary_offset(data, prop)?;
    if current == 0 || next == 0 || current == next {
        return Ok(0);
    }
    read_u32(data, current)
}

/// Elements addressable by index: the layout count for fixed-count arrays,
/// the allocated count otherwise.
pub(crate) fn reserved_array_count(data: &[u8], prop: &PropertyLayout) -> Result<u32, InstanceError> {
    if prop.is_fixed_count() {
        Ok(prop.modifier_data())
    } else {
        allocated_array_count(data, prop)
    }
}

/// Offset of the slot for element `index`.
pub(crate) fn offset_of_array_index(
    data: &[u8],
    prop: &PropertyLayout,
    array_offset: u32,
    index: u32,
) -> Result<u32, InstanceError> {
    let count = allocated_array_count(data, prop)?;
    let mut offset = array_offset;
    if !prop.is_fixed_sized() {
        // element count word
        offset += 4;
    }
    offset += null_flags_word_count(count) * 4;
    Ok(offset + index * element_slot_size(prop))
}

/// Offset of the value bytes of element `index`.
pub(crate) fn offset_of_array_index_value(
    data: &[u8],
    prop: &PropertyLayout,
    array_offset: u32,
    index: u32,
) -> Result<u32, InstanceError> {
    let slot = offset_of_array_index(data, prop, array_offset, index)?;
    if has_fixed_size_elements(prop) {
        Ok(slot)
    } else {
        Ok(array_offset + read_u32(data, slot)?)
    }
}

/// Bytes reserved for element `index`.
pub(crate) fn array_element_value_size(
    data: &[u8],
    prop: &PropertyLayout,
    array_offset: u32,
    index: u32,
) -> Result<u32, InstanceError> {
    if let Some(size) = prop.type_descriptor().fixed_element_size() {
        return Ok(size);
    }
    let count = allocated_array_count(data, prop)?;
    let start = read_u32(data, offset_of_array_index(data, prop, array_offset, index)?)?;
    let end = if index + 1 < count {
        read_u32(data, offset_of_array_index(data, prop, array_offset, index + 1)?)?
    } else {
        next_secondary_offset(data, prop)?
            .checked_sub(array_offset)
            .ok_or_else(|| corrupt(format!("array '{}' ends before it starts", prop.access_string())))?
    };
    end.checked_sub(start).ok_or_else(|| {
        corrupt(format!(
            "element offsets of '{}' decrease at index {index}",
            prop.access_string()
        ))
    })
}

/// Null-flag word offset and bit for the property or one of its elements.
pub(crate) fn null_flag_location(
    data: &[u8],
    prop: &PropertyLayout,
    index: Option<u32>,
) -> Result<(u32, u32), InstanceError> {
    match index {
        None => Ok((prop.null_flags_offset(), prop.null_flags_bitmask())),
        Some(index) => {
            let base = if prop.is_fixed_sized() {
                prop.offset()
            } else {
                secondary_offset(data, prop)? + 4
            };
            Ok((base + (index / 32) * 4, 1u32 << (index % 32)))
        }
    }
}

/// Whether the property (or element) is null.
///
/// Elements of an array that has not been materialized yet read as null.
pub(crate) fn is_null(data: &[u8], prop: &PropertyLayout, index: Option<u32>) -> Result<bool, InstanceError> {
    if let Some(index) = index {
        if index >= allocated_array_count(data, prop)? {
            return Ok(true);
        }
    }
    let (offset, mask) = null_flag_location(data, prop, index)?;
    Ok(read_u32(data, offset)? & mask != 0)
}

pub(crate) fn decode_primitive(
    data: &[u8],
    primitive_type: PrimitiveType,
    offset: u32,
    size: u32,
) -> Result<EcValue, InstanceError> {
    let value = match primitive_type {
        PrimitiveType::Integer => EcValue::Integer(read_u32(data, offset)? as i32),
        PrimitiveType::Long => EcValue::Long(read_u64(data, offset)? as i64),
        PrimitiveType::Double => EcValue::Double(read_f64(data, offset)?),
        PrimitiveType::Boolean => EcValue::Boolean(bytes(data, offset, 1)?[0] != 0),
        PrimitiveType::DateTime => EcValue::DateTime(read_u64(data, offset)? as i64),
        PrimitiveType::Point2d => EcValue::Point2d(Point2d {
            x: read_f64(data, offset)?,
            y: read_f64(data, offset + 8)?,
        }),
        PrimitiveType::Point3d => EcValue::Point3d(Point3d {
            x: read_f64(data, offset)?,
            y: read_f64(data, offset + 8)?,
            z: read_f64(data, offset + 16)?,
        }),
        PrimitiveType::String => {
            let units: Vec<u16> = bytes(data, offset, size)?
                .chunks_exact(2)
                .map(|c| u16::from_le_bytes([c[0], c[1]]))
                .take_while(|&u| u != 0)
                .collect();
            EcValue::String(String::from_utf16_lossy(&units))
        }
        PrimitiveType::Binary => {
            let len = read_u32(data, offset)?;
            EcValue::Binary(bytes(data, offset + 4, len)?.to_vec())
        }
    };
    Ok(value)
}

/// Encoded bytes of a non-null primitive value.
///
/// Strings are UTF-16LE with a terminating zero unit; binary values carry a
/// 4-byte length prefix.
pub(crate) fn encode_primitive(value: &EcValue) -> Option<Vec<u8>> {
    let encoded = match value {
        EcValue::Integer(v) => v.to_le_bytes().to_vec(),
        EcValue::Long(v) | EcValue::DateTime(v) => v.to_le_bytes().to_vec(),
        EcValue::Double(v) => v.to_le_bytes().to_vec(),
        EcValue::Boolean(v) => vec![u8::from(*v)],
        EcValue::Point2d(p) => [p.x.to_le_bytes(), p.y.to_le_bytes()].concat(),
        EcValue::Point3d(p) => [p.x.to_le_bytes(), p.y.to_le_bytes(), p.z.to_le_bytes()].concat(),
        EcValue::String(s) => s
            .encode_utf16()
            .chain(std::iter::once(0))
            .flat_map(u16::to_le_bytes)
            .collect(),
        EcValue::Binary(b) => {
            let mut out = Vec::with_capacity(b.len() + 4);
            out.extend_from_slice(&(b.len() as u32).to_le_bytes());
            out.extend_from_slice(b);
            out
        }
        EcValue::Null | EcValue::Array(_) | EcValue::Struct(_) => return None,
    };
    Some(encoded)
}
