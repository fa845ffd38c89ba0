//! Integration test suite.
//!
//! 1. Schema loading and layout registration
//! 2. Instance memory through the public API
//! 3. Expressions against instances built from JSON

pub mod expression_tests;
pub mod helpers;
pub mod instance_tests;
pub mod schema_tests;
