//! Instance buffers: reading, writing and resizing property values in the
//! bytes described by a [`ClassLayout`](crate::layout::ClassLayout).
//!
//! [`MemoryInstanceSupport`] holds the algorithms and works over any
//! [`InstanceStorage`] owner. [`StandaloneInstance`] is the in-process owner
//! used by the expression engine and the CLI.

mod array_resizer;
mod dump;
mod edit;
pub(crate) mod memory;
mod offsets;
mod standalone;
mod storage;
mod support;

use std::sync::Arc;

use parking_lot::RwLock;

pub use dump::{instance_data_to_string, InstanceDump};
pub use standalone::StandaloneInstance;
pub use storage::{InstanceStorage, SetOutcome};
pub use support::MemoryInstanceSupport;

/// Shared, lockable instance. Struct array elements and expression results
/// hold instances through this handle.
pub type InstanceHandle = Arc<RwLock<StandaloneInstance>>;

#[cfg(test)]
mod tests {
    include!("tests.rs");
}
