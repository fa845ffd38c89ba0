use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;

use super::dump::InstanceDump;
use super::storage::{InstanceStorage, SetOutcome};
use super::support::MemoryInstanceSupport;
use super::InstanceHandle;
use crate::config::EngineConfig;
use crate::error::InstanceError;
use crate::layout::{ClassLayout, PropertyLayout};
use crate::types::EcValue;

/// An instance that owns its buffer and the struct array elements it refers to.
///
/// Properties are addressed by access string (`"Address.City"`, `"Tags"`).
/// Variable-size writes grow the buffer on demand up to
/// [`EngineConfig::max_instance_bytes`].
pub struct StandaloneInstance {
    class_layout: Arc<ClassLayout>,
    data: Vec<u8>,
    config: EngineConfig,
    struct_values: HashMap<u32, InstanceHandle>,
    next_struct_id: u32,
}

impl StandaloneInstance {
    pub fn new(class_layout: Arc<ClassLayout>) -> Result<Self, InstanceError> {
        Self::with_config(class_layout, EngineConfig::default())
    }

    pub fn with_config(class_layout: Arc<ClassLayout>, config: EngineConfig) -> Result<Self, InstanceError> {
        let fixed = class_layout.size_of_fixed_section() as usize;
        let limit = config.max_instance_bytes;
        if fixed > limit {
            return Err(InstanceError::MemoryLimitExceeded { requested: fixed, limit });
        }
        let size = fixed.saturating_add(config.initial_instance_capacity).min(limit);

        let mut data = vec![0u8; size];
        class_layout.initialize_memory_for_instance(&mut data)?;
        tracing::debug!(
            "Created {} instance with {} of {} bytes used",
            class_layout.name(),
            fixed,
            size
        );

        Ok(Self {
            class_layout,
            data,
            config,
            struct_values: HashMap::new(),
            next_struct_id: 1,
        })
    }

    pub fn into_handle(self) -> InstanceHandle {
        Arc::new(RwLock::new(self))
    }

    pub fn class_layout(&self) -> &Arc<ClassLayout> {
        &self.class_layout
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn bytes_used(&self) -> u32 {
        self.class_layout.calculate_bytes_used(&self.data)
    }

    /// The used part of the buffer.
    pub fn used_data(&self) -> &[u8] {
        let used = (self.bytes_used() as usize).min(self.data.len());
        &self.data[..used]
    }

    fn property<'l>(layout: &'l ClassLayout, access_string: &str) -> Result<&'l PropertyLayout, InstanceError> {
        layout
            .get_property_layout(access_string)
            .ok_or_else(|| InstanceError::PropertyNotFound {
                class: layout.name().to_string(),
                access_string: access_string.to_string(),
            })
    }

    pub fn get_value(&self, access_string: &str) -> Result<EcValue, InstanceError> {
        let prop = Self::property(&self.class_layout, access_string)?;
        self.get_value_from_memory(prop, None)
    }

    pub fn get_value_at(&self, access_string: &str, index: u32) -> Result<EcValue, InstanceError> {
        let prop = Self::property(&self.class_layout, access_string)?;
        self.get_value_from_memory(prop, Some(index))
    }

    pub fn is_null(&self, access_string: &str) -> Result<bool, InstanceError> {
        let prop = Self::property(&self.class_layout, access_string)?;
        self.is_property_value_null(prop, None)
    }

    pub fn is_null_at(&self, access_string: &str, index: u32) -> Result<bool, InstanceError> {
        let prop = Self::property(&self.class_layout, access_string)?;
        self.is_property_value_null(prop, Some(index))
    }

    /// Number of addressable elements of an array property.
    pub fn array_count(&self, access_string: &str) -> Result<u32, InstanceError> {
        let prop = Self::property(&self.class_layout, access_string)?;
        if !prop.is_array() {
            return Err(InstanceError::DataTypeNotSupported {
                access_string: access_string.to_string(),
                reason: "not an array".into(),
            });
        }
        self.get_reserved_array_count(prop)
    }

    /// Sets a property value; fails with [`InstanceError::ReadOnly`] for
    /// read-only properties.
    pub fn set_value(&mut self, access_string: &str, value: &EcValue) -> Result<SetOutcome, InstanceError> {
        self.set(access_string, None, value, true)
    }

    pub fn set_value_at(&mut self, access_string: &str, index: u32, value: &EcValue) -> Result<SetOutcome, InstanceError> {
        self.set(access_string, Some(index), value, true)
    }

    /// Sets a property value ignoring the read-only flag.
    pub fn set_internal_value(
        &mut self,
        access_string: &str,
        index: Option<u32>,
        value: &EcValue,
    ) -> Result<SetOutcome, InstanceError> {
        self.set(access_string, index, value, false)
    }

    fn set(
        &mut self,
        access_string: &str,
        index: Option<u32>,
        value: &EcValue,
        check_read_only: bool,
    ) -> Result<SetOutcome, InstanceError> {
        let layout = Arc::clone(&self.class_layout);
        let prop = Self::property(&layout, access_string)?;
        if check_read_only && prop.is_read_only() {
            return Err(InstanceError::ReadOnly {
                access_string: access_string.to_string(),
            });
        }
        self.set_value_to_memory(&layout, prop, index, value)
    }

    pub fn insert_array_elements(&mut self, access_string: &str, index: u32, count: u32) -> Result<(), InstanceError> {
        let layout = Arc::clone(&self.class_layout);
        let prop = Self::property(&layout, access_string)?;
        self.insert_null_array_elements_at(&layout, prop, index, count)
    }

    pub fn add_array_elements(&mut self, access_string: &str, count: u32) -> Result<(), InstanceError> {
        let layout = Arc::clone(&self.class_layout);
        let prop = Self::property(&layout, access_string)?;
        self.add_null_array_elements_at(&layout, prop, count)
    }

    pub fn remove_array_elements(&mut self, access_string: &str, index: u32, count: u32) -> Result<(), InstanceError> {
        let layout = Arc::clone(&self.class_layout);
        let prop = Self::property(&layout, access_string)?;
        MemoryInstanceSupport::remove_array_elements(self, &layout, prop, index, count)
    }

    /// Applies a JSON object of property values.
    ///
    /// Keys are property names; nested objects address embedded struct
    /// members and JSON arrays fill array properties (appending elements to
    /// variable-count arrays as needed). Struct arrays are not supported.
    pub fn set_values_from_json(&mut self, values: &serde_json::Value) -> Result<(), InstanceError> {
        self.apply_json_object("", values)
    }

    fn apply_json_object(&mut self, prefix: &str, values: &serde_json::Value) -> Result<(), InstanceError> {
        let object = values.as_object().ok_or_else(|| {
            InstanceError::PreconditionViolated(format!("values for '{prefix}' must be a JSON object"))
        })?;
        for (name, json) in object {
            let access_string = if prefix.is_empty() {
                name.clone()
            } else {
                format!("{prefix}.{name}")
            };
            let layout = Arc::clone(&self.class_layout);
            let prop = Self::property(&layout, &access_string)?;
            if prop.is_struct() {
                self.apply_json_object(&access_string, json)?;
                continue;
            }
            let Some(primitive_type) = prop.primitive_type() else {
                return Err(InstanceError::DataTypeNotSupported {
                    access_string,
                    reason: "struct array values from JSON".into(),
                });
            };
            let json_mismatch = |access_string: &str, json: &serde_json::Value| InstanceError::DataTypeMismatch {
                access_string: access_string.to_string(),
                expected: primitive_type.to_string(),
                got: json.to_string(),
            };

            if !prop.is_array() {
                let value = EcValue::from_json(primitive_type, json).ok_or_else(|| json_mismatch(&access_string, json))?;
                self.set_internal_value(&access_string, None, &value)?;
                continue;
            }

            let items = json.as_array().ok_or_else(|| json_mismatch(&access_string, json))?;
            let count = self.array_count(&access_string)?;
            if !prop.is_fixed_count() && (items.len() as u32) > count {
                self.add_array_elements(&access_string, items.len() as u32 - count)?;
            }
            for (index, item) in items.iter().enumerate() {
                let value = EcValue::from_json(primitive_type, item).ok_or_else(|| json_mismatch(&access_string, item))?;
                self.set_internal_value(&access_string, Some(index as u32), &value)?;
            }
        }
        Ok(())
    }
}

impl InstanceStorage for StandaloneInstance {
    fn data(&self) -> &[u8] {
        &self.data
    }

    fn grow_allocation(&mut self, additional: usize) -> Result<(), InstanceError> {
        let current = self.data.len();
        let limit = self.config.max_instance_bytes;
        let required = current.saturating_add(additional);
        if required > limit {
            tracing::warn!(
                "{} instance would need {} bytes, limit is {}",
                self.class_layout.name(),
                required,
                limit
            );
            return Err(InstanceError::MemoryLimitExceeded { requested: required, limit });
        }

        let new_size = if self.config.grow_by_doubling {
            current.saturating_mul(2).max(required).min(limit)
        } else {
            required
        };
        self.data.resize(new_size, 0);
        tracing::debug!(
            "Grew {} instance from {} to {} bytes",
            self.class_layout.name(),
            current,
            new_size
        );
        Ok(())
    }

    fn modify_data(&mut self, offset: usize, bytes: &[u8]) -> Result<(), InstanceError> {
        let end = offset
            .checked_add(bytes.len())
            .filter(|&end| end <= self.data.len())
            .ok_or(InstanceError::AllocationFailed { requested: bytes.len() })?;
        self.data[offset..end].copy_from_slice(bytes);
        Ok(())
    }

    fn store_struct_value(&mut self, value: InstanceHandle) -> Result<u32, InstanceError> {
        let id = self.next_struct_id;
        self.next_struct_id = id
            .checked_add(1)
            .ok_or_else(|| InstanceError::OperationNotSupported("struct value ids exhausted".into()))?;
        self.struct_values.insert(id, value);
        Ok(id)
    }

    fn get_struct_value(&self, id: u32) -> Result<InstanceHandle, InstanceError> {
        self.struct_values
            .get(&id)
            .cloned()
            .ok_or_else(|| InstanceError::CorruptData(format!("no struct value with id {id}")))
    }

    fn release_struct_value(&mut self, id: u32) {
        self.struct_values.remove(&id);
    }
}

impl fmt::Debug for StandaloneInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StandaloneInstance")
            .field("class", &self.class_layout.name())
            .field("bytes_used", &self.bytes_used())
            .field("bytes_allocated", &self.data.len())
            .field("struct_values", &self.struct_values.len())
            .finish()
    }
}

impl fmt::Display for StandaloneInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&InstanceDump::new(&self.class_layout, &self.data), f)
    }
}
