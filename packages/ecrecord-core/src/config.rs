//! Engine configuration.

/// Instance allocation and expression parsing limits.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Extra bytes reserved beyond the fixed section when an instance is created
    pub initial_instance_capacity: usize,
    /// Maximum allocation per instance in bytes (default: unlimited)
    pub max_instance_bytes: usize,
    /// Double the allocation on growth instead of growing by the exact request
    pub grow_by_doubling: bool,
    /// Maximum parser nesting depth before an error node is produced
    pub max_expression_depth: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            initial_instance_capacity: 64,
            max_instance_bytes: usize::MAX,
            grow_by_doubling: true,
            max_expression_depth: 64,
        }
    }
}
