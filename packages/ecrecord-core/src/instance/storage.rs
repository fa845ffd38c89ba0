use super::InstanceHandle;
use crate::error::InstanceError;

/// Result of a successful write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetOutcome {
    /// Bytes or null flags were modified
    Changed,
    /// Property already held the value
    Unchanged,
}

/// Owner of an instance buffer.
///
/// The layout engine never allocates: it asks the owner to grow the buffer and
/// writes through [`modify_data`](InstanceStorage::modify_data). `data()` spans
/// the whole allocation, used or not.
pub trait InstanceStorage {
    fn data(&self) -> &[u8];

    fn bytes_allocated(&self) -> usize {
        self.data().len()
    }

    /// Extends the allocation by at least `additional` zeroed bytes,
    /// preserving existing content.
    fn grow_allocation(&mut self, additional: usize) -> Result<(), InstanceError>;

    /// Copies `bytes` into the buffer at `offset`.
    fn modify_data(&mut self, offset: usize, bytes: &[u8]) -> Result<(), InstanceError>;

    /// Takes ownership of a struct array element and returns the id stored in
    /// the element slot.
    fn store_struct_value(&mut self, _value: InstanceHandle) -> Result<u32, InstanceError> {
        Err(InstanceError::OperationNotSupported(
            "struct array values".into(),
        ))
    }

    fn get_struct_value(&self, _id: u32) -> Result<InstanceHandle, InstanceError> {
        Err(InstanceError::OperationNotSupported(
            "struct array values".into(),
        ))
    }

    /// Drops a struct array element whose slot was overwritten or removed.
    fn release_struct_value(&mut self, _id: u32) {}
}
