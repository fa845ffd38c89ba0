//! Scratch-buffer editing of variable-size values.
//!
//! Every multi-step mutation (grow, shift, array resize) runs on a private copy
//! of the owner's bytes and is installed with one `modify_data` call in
//! [`InstanceEdit::commit`]. A failure at any step drops the copy, so the
//! owner's bytes never observe a half-applied shift. Only the owner's
//! allocation may have grown, which preserves content.

use super::memory::{bytes_mut, move_bytes, read_u32, write_u32};
use super::offsets::{
    allocated_array_count, array_element_value_size, next_secondary_offset, null_flag_location,
    offset_of_array_index, offset_of_array_index_value, offset_of_property_value, property_value_size,
};
use super::storage::InstanceStorage;
use crate::error::InstanceError;
use crate::layout::{ClassLayout, PropertyLayout};

pub(crate) struct InstanceEdit<'a, S: InstanceStorage + ?Sized> {
    owner: &'a mut S,
    layout: &'a ClassLayout,
    data: Vec<u8>,
}

impl<'a, S: InstanceStorage + ?Sized> InstanceEdit<'a, S> {
    pub(crate) fn begin(owner: &'a mut S, layout: &'a ClassLayout) -> Self {
        let data = owner.data().to_vec();
        Self { owner, layout, data }
    }

    pub(crate) fn data(&self) -> &[u8] {
        &self.data
    }

    pub(crate) fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    pub(crate) fn write_bytes(&mut self, offset: u32, value: &[u8]) -> Result<(), InstanceError> {
        bytes_mut(&mut self.data, offset, value.len() as u32)?.copy_from_slice(value);
        Ok(())
    }

    pub(crate) fn set_null_flag(
        &mut self,
        prop: &PropertyLayout,
        index: Option<u32>,
        is_null: bool,
    ) -> Result<(), InstanceError> {
        let (offset, mask) = null_flag_location(&self.data, prop, index)?;
        let word = read_u32(&self.data, offset)?;
        let word = if is_null { word | mask } else { word & !mask };
        write_u32(&mut self.data, offset, word)
    }

    /// Installs the edited bytes in the owner.
    pub(crate) fn commit(self) -> Result<(), InstanceError> {
        self.owner.modify_data(0, &self.data)
    }

    fn grow_allocation(&mut self, additional: u32) -> Result<(), InstanceError> {
        let required = self.data.len() + additional as usize;
        self.owner.grow_allocation(additional as usize)?;
        let allocated = self.owner.bytes_allocated();
        if allocated < required {
            return Err(InstanceError::AllocationFailed {
                requested: additional as usize,
            });
        }
        self.data.resize(allocated, 0);
        Ok(())
    }

    fn sentinel_offset(&self) -> Result<u32, InstanceError> {
        self.layout.sentinel_offset().ok_or_else(|| {
            InstanceError::CorruptData(format!(
                "class '{}' has no variable-size section",
                self.layout.name()
            ))
        })
    }

    /// Makes sure the variable property `prop` has at least `bytes_needed`
    /// bytes reserved, growing and shifting as required. Returns the offset of
    /// its value.
    pub(crate) fn ensure_space_is_available(
        &mut self,
        prop: &PropertyLayout,
        bytes_needed: u32,
    ) -> Result<u32, InstanceError> {
        let slot = prop.offset();
        let mut current = read_u32(&self.data, slot)?;
        if current == 0 {
            current = self.backfill_secondary_offsets(prop)?;
        }

        let next = read_u32(&self.data, slot + 4)?;
        let available = if next == 0 {
            write_u32(&mut self.data, slot + 4, current)?;
            0
        } else {
            next.checked_sub(current).ok_or_else(|| {
                InstanceError::CorruptData(format!(
                    "secondary offsets of '{}' decrease",
                    prop.access_string()
                ))
            })?
        };

        if bytes_needed > available {
            self.grow_property_value(prop, bytes_needed - available)?;
        }
        Ok(current)
    }

    /// Materializes the zero secondary offsets between the nearest non-zero
    /// predecessor and `prop`, giving them the predecessor's value.
    fn backfill_secondary_offsets(&mut self, prop: &PropertyLayout) -> Result<u32, InstanceError> {
        let first = self
            .layout
            .variable_property_layouts()
            .next()
            .map(PropertyLayout::offset)
            .ok_or_else(|| InstanceError::CorruptData("no variable-size properties".into()))?;

        let mut prior = prop.offset();
        let value = loop {
            if prior <= first {
                return Err(InstanceError::CorruptData(
                    "first secondary offset is zero".into(),
                ));
            }
            prior -= 4;
            let value = read_u32(&self.data, prior)?;
            if value != 0 {
                break value;
            }
        };

        let mut slot = prior + 4;
        while slot <= prop.offset() {
            write_u32(&mut self.data, slot, value)?;
            slot += 4;
        }
        Ok(value)
    }

    /// Adds `additional` bytes to the end of the property's value region.
    pub(crate) fn grow_property_value(
        &mut self,
        prop: &PropertyLayout,
        additional: u32,
    ) -> Result<(), InstanceError> {
        let used = self.layout.calculate_bytes_used(&self.data) as usize;
        let free = self.data.len().saturating_sub(used);
        if additional as usize > free {
            self.grow_allocation(additional - free as u32)?;
        }
        self.shift_value_data(prop, i64::from(additional))
    }

    /// Moves every value after `prop` by `shift_by` bytes and adjusts all
    /// following secondary offsets and the sentinel.
    pub(crate) fn shift_value_data(
        &mut self,
        prop: &PropertyLayout,
        shift_by: i64,
    ) -> Result<(), InstanceError> {
        let sentinel = self.sentinel_offset()?;
        let next_slot = prop.offset() + 4;
        let start = read_u32(&self.data, next_slot)?;
        let end = read_u32(&self.data, sentinel)?;
        let shifted = |value: u32| -> Result<u32, InstanceError> {
            u32::try_from(i64::from(value) + shift_by).map_err(|_| {
                InstanceError::CorruptData(format!("offset {value} shifted by {shift_by} out of range"))
            })
        };

        if end > start {
            let to = shifted(start)?;
            if to as usize + (end - start) as usize > self.data.len() {
                return Err(InstanceError::AllocationFailed {
                    requested: shift_by.max(0) as usize,
                });
            }
            move_bytes(&mut self.data, start, to, end - start)?;
        }

        let mut slot = next_slot;
        while slot < sentinel {
            let value = read_u32(&self.data, slot)?;
            if value == 0 {
                break;
            }
            write_u32(&mut self.data, slot, shifted(value)?)?;
            slot += 4;
        }
        write_u32(&mut self.data, sentinel, shifted(end)?)?;

        tracing::trace!(
            "Shifted {} bytes after {} by {}",
            end.saturating_sub(start),
            prop.access_string(),
            shift_by
        );
        Ok(())
    }

    /// Makes sure element `index` of a variable-element array has at least
    /// `bytes_needed` bytes, shifting later elements of the same array.
    pub(crate) fn ensure_space_is_available_for_array_index_value(
        &mut self,
        prop: &PropertyLayout,
        index: u32,
        bytes_needed: u32,
    ) -> Result<(), InstanceError> {
        let array_offset = offset_of_property_value(&self.data, prop)?;
        let available = array_element_value_size(&self.data, prop, array_offset, index)?;
        if bytes_needed <= available {
            return Ok(());
        }

        let additional = bytes_needed - available;
        let count = allocated_array_count(&self.data, prop)?;
        let end_pre_grow = next_secondary_offset(&self.data, prop)?;
        self.grow_property_value(prop, additional)?;

        if index + 1 < count {
            self.shift_array_index_value_data(prop, array_offset, index, count, end_pre_grow, additional)?;
        }
        Ok(())
    }

    fn shift_array_index_value_data(
        &mut self,
        prop: &PropertyLayout,
        array_offset: u32,
        index: u32,
        count: u32,
        end_pre_grow: u32,
        shift_by: u32,
    ) -> Result<(), InstanceError> {
        let array_end = next_secondary_offset(&self.data, prop)?;
        let from = offset_of_array_index_value(&self.data, prop, array_offset, index + 1)?;
        let len = end_pre_grow.saturating_sub(from);
        if from + shift_by + len > array_end {
            return Err(InstanceError::CorruptData(format!(
                "element data of '{}' overruns its array",
                prop.access_string()
            )));
        }
        move_bytes(&mut self.data, from, from + shift_by, len)?;

        for i in index + 1..count {
            let slot = offset_of_array_index(&self.data, prop, array_offset, i)?;
            let value = read_u32(&self.data, slot)?;
            write_u32(&mut self.data, slot, value + shift_by)?;
        }
        Ok(())
    }

    /// Replaces the whole value region of a materialized variable property,
    /// growing or shrinking it and shifting everything that follows.
    pub(crate) fn replace_property_value(
        &mut self,
        prop: &PropertyLayout,
        value: &[u8],
    ) -> Result<(), InstanceError> {
        let offset = self.ensure_space_is_available(prop, 0)?;
        let old_size = property_value_size(&self.data, prop)?;
        let new_size = value.len() as u32;
        let old_used = self.layout.calculate_bytes_used(&self.data);

        if new_size > old_size {
            self.grow_property_value(prop, new_size - old_size)?;
        } else if new_size < old_size {
            self.shift_value_data(prop, -i64::from(old_size - new_size))?;
            let new_used = self.layout.calculate_bytes_used(&self.data);
            bytes_mut(&mut self.data, new_used, old_used - new_used)?.fill(0);
        }
        self.write_bytes(offset, value)
    }
}
