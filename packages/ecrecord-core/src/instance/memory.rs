//! Bounds-checked little-endian accessors over raw instance bytes.

use crate::error::InstanceError;

fn out_of_bounds(offset: u32, len: u32, available: usize) -> InstanceError {
    InstanceError::CorruptData(format!(
        "range {offset}..{} beyond buffer of {available} bytes",
        u64::from(offset) + u64::from(len)
    ))
}

pub(crate) fn bytes(data: &[u8], offset: u32, len: u32) -> Result<&[u8], InstanceError> {
    let start = offset as usize;
    let end = start
        .checked_add(len as usize)
        .ok_or_else(|| out_of_bounds(offset, len, data.len()))?;
    data.get(start..end)
        .ok_or_else(|| out_of_bounds(offset, len, data.len()))
}

pub(crate) fn bytes_mut(data: &mut [u8], offset: u32, len: u32) -> Result<&mut [u8], InstanceError> {
    let available = data.len();
    let start = offset as usize;
    let end = start
        .checked_add(len as usize)
        .ok_or_else(|| out_of_bounds(offset, len, available))?;
    data.get_mut(start..end)
        .ok_or_else(|| out_of_bounds(offset, len, available))
}

pub(crate) fn read_u32(data: &[u8], offset: u32) -> Result<u32, InstanceError> {
    let b = bytes(data, offset, 4)?;
    Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
}

pub(crate) fn write_u32(data: &mut [u8], offset: u32, value: u32) -> Result<(), InstanceError> {
    bytes_mut(data, offset, 4)?.copy_from_slice(&value.to_le_bytes());
    Ok(())
}

pub(crate) fn read_u64(data: &[u8], offset: u32) -> Result<u64, InstanceError> {
    let b = bytes(data, offset, 8)?;
    let mut word = [0u8; 8];
    word.copy_from_slice(b);
    Ok(u64::from_le_bytes(word))
}

pub(crate) fn read_f64(data: &[u8], offset: u32) -> Result<f64, InstanceError> {
    read_u64(data, offset).map(f64::from_bits)
}

/// Moves `len` bytes from `from` to `to`; ranges may overlap.
pub(crate) fn move_bytes(data: &mut [u8], from: u32, to: u32, len: u32) -> Result<(), InstanceError> {
    if len == 0 {
        return Ok(());
    }
    bytes(data, from, len)?;
    bytes(data, to, len)?;
    let from = from as usize;
    data.copy_within(from..from + len as usize, to as usize);
    Ok(())
}
