//! Self-describing record layouts and an embedded expression engine.
//!
//! Builds byte-level class layouts from schema definitions, reads and writes
//! property values in instance buffers (including in-place resizing of
//! variable-size values and arrays), and evaluates expressions against
//! instances.

pub mod config;
pub mod error;
pub mod expr;
pub mod instance;
pub mod layout;
pub mod types;

pub use instance::{InstanceHandle, StandaloneInstance};
