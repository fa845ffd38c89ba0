//! Insertion and removal of elements inside variable-count array properties.
//!
//! An array value region is laid out as
//! `[count: u32][null-flag words][element slots][variable element data]`,
//! where an element slot is the element itself for fixed-size elements or a
//! secondary offset (relative to the region start) otherwise. An array with no
//! elements has an empty region.

use super::edit::InstanceEdit;
use super::memory::{bytes, move_bytes, read_u32, write_u32};
use super::offsets::{
    allocated_array_count, element_slot_size, has_fixed_size_elements, is_null,
    offset_of_array_index, offset_of_array_index_value, array_element_value_size,
    offset_of_property_value, property_value_size,
};
use super::storage::InstanceStorage;
use crate::error::InstanceError;
use crate::layout::{null_flags_word_count, PropertyLayout};

fn header_bytes(count: u32) -> u32 {
    if count == 0 {
        0
    } else {
        4 + null_flags_word_count(count) * 4
    }
}

/// Header plus element slots, or `None` when it does not fit the 32-bit
/// offsets of an instance buffer.
fn fixed_part_bytes(count: u32, slot_size: u32) -> Option<u32> {
    header_bytes(count).checked_add(count.checked_mul(slot_size)?)
}

fn read_null_bits(data: &[u8], array_offset: u32, count: u32) -> Result<Vec<bool>, InstanceError> {
    (0..count)
        .map(|i| Ok(read_u32(data, array_offset + 4 + (i / 32) * 4)? & (1 << (i % 32)) != 0))
        .collect()
}

fn write_null_bits(data: &mut [u8], array_offset: u32, bits: &[bool]) -> Result<(), InstanceError> {
    let words = null_flags_word_count(bits.len() as u32);
    for word in 0..words {
        let mut value = u32::MAX;
        for bit in 0..32 {
            let i = (word * 32 + bit) as usize;
            if i < bits.len() && !bits[i] {
                value &= !(1 << bit);
            }
        }
        write_u32(data, array_offset + 4 + word * 4, value)?;
    }
    Ok(())
}

/// Inserts `insert_count` null elements at `index` of a variable-size array.
///
/// Element data at and after `index` moves forward by the growth of the
/// array's fixed part; when the null-flag words grow, the elements before
/// `index` move too. New elements read as null, existing ones keep their values.
pub(crate) struct ArrayResizer<'p> {
    prop: &'p PropertyLayout,
    index: u32,
    insert_count: u32,
    pre_count: u32,
    slot_size: u32,
    pre_header: u32,
    post_header: u32,
    pre_array_bytes: u32,
    resize_bytes: u32,
}

impl<'p> ArrayResizer<'p> {
    fn new(data: &[u8], prop: &'p PropertyLayout, index: u32, insert_count: u32) -> Result<Self, InstanceError> {
        let pre_count = allocated_array_count(data, prop)?;
        if index > pre_count {
            return Err(InstanceError::IndexOutOfRange {
                access_string: prop.access_string().to_string(),
                index,
                count: pre_count,
            });
        }
        let slot_size = element_slot_size(prop);
        let too_large = || InstanceError::AllocationFailed {
            requested: usize::try_from(u64::from(insert_count) * u64::from(slot_size.max(1))).unwrap_or(usize::MAX),
        };
        let post_count = pre_count.checked_add(insert_count).ok_or_else(too_large)?;
        let pre_header = header_bytes(pre_count);
        let post_header = header_bytes(post_count);
        let pre_fixed = fixed_part_bytes(pre_count, slot_size).ok_or_else(too_large)?;
        let post_fixed = fixed_part_bytes(post_count, slot_size).ok_or_else(too_large)?;
        let pre_array_bytes = property_value_size(data, prop)?;
        let resize_bytes = post_fixed - pre_fixed;
        if pre_array_bytes.checked_add(resize_bytes).is_none() {
            return Err(too_large());
        }
        Ok(Self {
            prop,
            index,
            insert_count,
            pre_count,
            slot_size,
            pre_header,
            post_header,
            pre_array_bytes,
            resize_bytes,
        })
    }

    pub(crate) fn insert_null_elements<S: InstanceStorage + ?Sized>(
        edit: &mut InstanceEdit<'_, S>,
        prop: &'p PropertyLayout,
        index: u32,
        insert_count: u32,
    ) -> Result<(), InstanceError> {
        let resizer = Self::new(edit.data(), prop, index, insert_count)?;
        let array_offset =
            edit.ensure_space_is_available(prop, resizer.pre_array_bytes + resizer.resize_bytes)?;
        let pre_nulls = read_null_bits(edit.data(), array_offset, resizer.pre_count)?;

        resizer.shift_data_following_resize_index(edit.data_mut(), array_offset)?;
        resizer.shift_data_preceding_resize_index(edit.data_mut(), array_offset)?;
        resizer.write_array_header(edit.data_mut(), array_offset, &pre_nulls)?;

        tracing::trace!(
            "Inserted {} elements at {} into {} ({} -> {} elements)",
            insert_count,
            index,
            prop.access_string(),
            resizer.pre_count,
            resizer.pre_count + insert_count
        );
        Ok(())
    }

    fn shift_data_following_resize_index(&self, data: &mut [u8], array_offset: u32) -> Result<(), InstanceError> {
        let resize_point = array_offset + self.pre_header + self.index * self.slot_size;
        let array_end = array_offset + self.pre_array_bytes;
        if array_end > resize_point {
            move_bytes(data, resize_point, resize_point + self.resize_bytes, array_end - resize_point)?;
        }

        if has_fixed_size_elements(self.prop) {
            return Ok(());
        }

        let post_shift_point = resize_point + self.resize_bytes;
        let inserted_offset = if self.index < self.pre_count {
            read_u32(data, post_shift_point)? + self.resize_bytes
        } else {
            self.pre_array_bytes + self.resize_bytes
        };

        let inserted_start = post_shift_point - self.insert_count * 4;
        for i in 0..self.insert_count {
            write_u32(data, inserted_start + i * 4, inserted_offset)?;
        }
        for i in 0..self.pre_count - self.index {
            let slot = post_shift_point + i * 4;
            let value = read_u32(data, slot)?;
            write_u32(data, slot, value + self.resize_bytes)?;
        }
        Ok(())
    }

    fn shift_data_preceding_resize_index(&self, data: &mut [u8], array_offset: u32) -> Result<(), InstanceError> {
        if self.index == 0 {
            return Ok(());
        }
        move_bytes(
            data,
            array_offset + self.pre_header,
            array_offset + self.post_header,
            self.index * self.slot_size,
        )?;

        if !has_fixed_size_elements(self.prop) {
            for i in 0..self.index {
                let slot = array_offset + self.post_header + i * 4;
                let value = read_u32(data, slot)?;
                write_u32(data, slot, value + self.resize_bytes)?;
            }
        }
        Ok(())
    }

    fn write_array_header(&self, data: &mut [u8], array_offset: u32, pre_nulls: &[bool]) -> Result<(), InstanceError> {
        let index = self.index as usize;
        let mut nulls = Vec::with_capacity(pre_nulls.len() + self.insert_count as usize);
        nulls.extend_from_slice(&pre_nulls[..index]);
        nulls.extend(std::iter::repeat(true).take(self.insert_count as usize));
        nulls.extend_from_slice(&pre_nulls[index..]);

        write_u32(data, array_offset, nulls.len() as u32)?;
        write_null_bits(data, array_offset, &nulls)
    }
}

/// Removes `remove_count` elements starting at `index` from a variable-size
/// array, compacting element data and shrinking the property region.
///
/// Returns the ids of removed non-null struct elements so the owner can
/// release them after commit.
pub(crate) fn remove_elements<S: InstanceStorage + ?Sized>(
    edit: &mut InstanceEdit<'_, S>,
    prop: &PropertyLayout,
    index: u32,
    remove_count: u32,
) -> Result<Vec<u32>, InstanceError> {
    let data = edit.data();
    let pre_count = allocated_array_count(data, prop)?;
    let end = index.checked_add(remove_count).filter(|&end| end <= pre_count);
    if end.is_none() || remove_count == 0 {
        return Err(InstanceError::IndexOutOfRange {
            access_string: prop.access_string().to_string(),
            index: index.saturating_add(remove_count.saturating_sub(1)),
            count: pre_count,
        });
    }

    let array_offset = offset_of_property_value(data, prop)?;
    let removed = index..index + remove_count;
    let kept: Vec<u32> = (0..pre_count).filter(|i| !removed.contains(i)).collect();

    let mut released = Vec::new();
    if prop.type_descriptor().is_struct_array() {
        for i in removed.clone() {
            if !is_null(data, prop, Some(i))? {
                let value_offset = offset_of_array_index_value(data, prop, array_offset, i)?;
                released.push(read_u32(data, value_offset)?);
            }
        }
    }

    let post_count = kept.len() as u32;
    let mut region = Vec::new();
    if post_count > 0 {
        let header = header_bytes(post_count);
        let slot_size = element_slot_size(prop);
        region.resize((header + post_count * slot_size) as usize, 0);

        let nulls = kept
            .iter()
            .map(|&i| is_null(data, prop, Some(i)))
            .collect::<Result<Vec<bool>, InstanceError>>()?;
        write_u32(&mut region, 0, post_count)?;
        write_null_bits(&mut region, 0, &nulls)?;

        for (new_index, &old_index) in kept.iter().enumerate() {
            let slot = header + new_index as u32 * slot_size;
            if has_fixed_size_elements(prop) {
                let old_slot = offset_of_array_index(data, prop, array_offset, old_index)?;
                let element = bytes(data, old_slot, slot_size)?.to_vec();
                region[slot as usize..(slot + slot_size) as usize].copy_from_slice(&element);
            } else {
                let value_offset = offset_of_array_index_value(data, prop, array_offset, old_index)?;
                let size = array_element_value_size(data, prop, array_offset, old_index)?;
                let element = bytes(data, value_offset, size)?.to_vec();
                let element_offset = region.len() as u32;
                write_u32(&mut region, slot, element_offset)?;
                region.extend_from_slice(&element);
            }
        }
    }

    edit.replace_property_value(prop, &region)?;
    tracing::trace!(
        "Removed {} elements at {} from {} ({} -> {} elements)",
        remove_count,
        index,
        prop.access_string(),
        pre_count,
        post_count
    );
    Ok(released)
}
