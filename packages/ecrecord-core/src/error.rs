//! Error types for layout building, instance memory access and expressions.

use thiserror::Error;

/// Errors raised while building or registering class layouts.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LayoutError {
    /// Fixed-size property added after the builder switched to variable-size properties
    #[error("Cannot add fixed-size property '{access_string}' after variable-size properties")]
    NotAcceptingFixedSizeProperties { access_string: String },

    /// Property kind not valid for the builder call
    #[error("Invalid property type for '{access_string}': {reason}")]
    InvalidPropertyType {
        access_string: String,
        reason: String,
    },

    /// Access string registered twice
    #[error("Duplicate access string '{access_string}' in class '{class}'")]
    DuplicateAccessString { class: String, access_string: String },

    /// Dotted access string whose parent struct was never added
    #[error("Parent struct of '{access_string}' not found")]
    UnknownParentStruct { access_string: String },

    /// Class referenced by a struct property is not defined in the schema
    #[error("Class '{class}' not found in schema '{schema}'")]
    ClassNotFound { schema: String, class: String },

    /// Struct property refers (directly or indirectly) to its own class
    #[error("Struct class '{class}' contains itself")]
    RecursiveStruct { class: String },

    /// Array occurrence bounds are inconsistent
    #[error("Invalid occurrence bounds for '{access_string}': min {min_occurs} > max {max_occurs}")]
    InvalidOccurs {
        access_string: String,
        min_occurs: u32,
        max_occurs: u32,
    },

    /// Class index already in use within a schema layout
    #[error("Class index {class_index} already in use by '{existing}'")]
    ClassIndexInUse { class_index: u16, existing: String },

    /// No free class index remains
    #[error("No class index available in schema layout {schema_index}")]
    NoClassIndexAvailable { schema_index: u16 },

    /// Lock poisoned (RwLock poisoned)
    #[error("Lock poisoned")]
    LockPoisoned,
}

/// Errors raised while reading or writing instance memory.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InstanceError {
    /// Access string does not name a property of the class
    #[error("Property '{access_string}' not found in class '{class}'")]
    PropertyNotFound { class: String, access_string: String },

    /// Array index beyond the reserved element count
    #[error("Index {index} out of range for '{access_string}' (count: {count})")]
    IndexOutOfRange {
        access_string: String,
        index: u32,
        count: u32,
    },

    /// Operation precondition not met, such as resizing a fixed-count array
    #[error("Precondition violated: {0}")]
    PreconditionViolated(String),

    /// Value type differs from the property type
    #[error("Data type mismatch for '{access_string}': expected {expected}, got {got}")]
    DataTypeMismatch {
        access_string: String,
        expected: String,
        got: String,
    },

    /// Property kind cannot carry the requested value
    #[error("Data type not supported for '{access_string}': {reason}")]
    DataTypeNotSupported {
        access_string: String,
        reason: String,
    },

    /// Property is marked read-only
    #[error("Property '{access_string}' is read-only")]
    ReadOnly { access_string: String },

    /// Owner could not provide the requested bytes
    #[error("Allocation of {requested} additional bytes failed")]
    AllocationFailed { requested: usize },

    /// Growing the instance would exceed the configured limit
    #[error("Memory limit exceeded: requested {requested} bytes, limit {limit}")]
    MemoryLimitExceeded { requested: usize, limit: usize },

    /// Owner does not support the operation
    #[error("Operation not supported: {0}")]
    OperationNotSupported(String),

    /// Offsets in the buffer point outside the allocation
    #[error("Corrupt instance data: {0}")]
    CorruptData(String),

    /// Instance class layout differs from the one supplied
    #[error("Instance of class {actual} used with layout of class {expected}")]
    ClassMismatch { expected: u16, actual: u16 },
}

/// Expression evaluation status for every non-success outcome.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExpressionError {
    /// Unclassified failure
    #[error("Unknown error: {0}")]
    UnknownError(String),

    /// Identifier not found in any context
    #[error("Unknown symbol '{0}'")]
    UnknownSymbol(String),

    /// Member not found on the current value or instance
    #[error("Unknown member '{0}'")]
    UnknownMember(String),

    /// Primitive value required
    #[error("Primitive value required")]
    PrimitiveRequired,

    /// Array value required
    #[error("Array value required for '{0}'")]
    ArrayRequired(String),

    /// Struct value required
    #[error("Struct value required for '{0}'")]
    StructRequired(String),

    /// Operand type not valid for the operation
    #[error("Wrong type for {0}")]
    WrongType(String),

    /// Member access on a value that has no members
    #[error("Dot operator not supported on '{0}'")]
    DotNotSupported(String),

    /// Operation not implemented
    #[error("Not implemented: {0}")]
    NotImpl(String),

    /// Operand types cannot be combined
    #[error("Incompatible types for {0}")]
    IncompatibleTypes(String),

    /// Unit specifications cannot be combined
    #[error("Incompatible units: {0}")]
    IncompatibleUnits(String),

    /// Division by zero
    #[error("Divide by zero")]
    DivideByZero,

    /// Operand types not valid for division
    #[error("Invalid types for division")]
    InvalidTypesForDivision,

    /// Call target is not a method
    #[error("Method required for '{0}'")]
    MethodRequired(String),

    /// Assignment target is not assignable
    #[error("Left side of assignment is not assignable")]
    NeedsLValue,

    /// Array index beyond the element count
    #[error("Index {index} out of range (count: {count})")]
    IndexOutOfRange { index: i64, count: u32 },

    /// Expression text did not parse
    #[error("Parse error: {message}")]
    ParseError { message: String },

    /// Instance access failed during evaluation
    #[error(transparent)]
    Instance(#[from] InstanceError),
}
