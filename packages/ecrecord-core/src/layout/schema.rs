//! Serializable class definitions and the per-schema class layout registry.

use std::collections::HashSet;
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};

use super::class_layout::{ClassIndex, ClassLayout, SchemaIndex};
use super::factory::ClassLayoutFactory;
use crate::error::LayoutError;
use crate::types::{PrimitiveType, TypeDescriptor};

/// Named collection of class definitions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaDefinition {
    /// Schema name
    pub name: String,
    /// Classes in declaration order
    #[serde(default)]
    pub classes: Vec<ClassDefinition>,
}

/// Class (record type) definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassDefinition {
    /// Class name
    pub name: String,
    /// Properties in declaration order
    #[serde(default)]
    pub properties: Vec<PropertyDefinition>,
    /// Relationship classes carry source and target pointer properties
    #[serde(default)]
    pub is_relationship: bool,
}

/// Property definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyDefinition {
    /// Property name (no dots)
    pub name: String,
    /// Value kind
    #[serde(flatten)]
    pub kind: PropertyKind,
    /// Rejects writes through the instance API
    #[serde(default)]
    pub read_only: bool,
}

/// Value kind of a property.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PropertyKind {
    Primitive {
        #[serde(rename = "type")]
        primitive_type: PrimitiveType,
    },
    Struct {
        class: String,
    },
    PrimitiveArray {
        element: PrimitiveType,
        #[serde(default)]
        min_occurs: u32,
        #[serde(default = "unbounded")]
        max_occurs: u32,
    },
    StructArray {
        class: String,
        #[serde(default)]
        min_occurs: u32,
        #[serde(default = "unbounded")]
        max_occurs: u32,
    },
}

fn unbounded() -> u32 {
    u32::MAX
}

impl PropertyDefinition {
    pub fn primitive(name: &str, primitive_type: PrimitiveType) -> Self {
        Self {
            name: name.to_string(),
            kind: PropertyKind::Primitive { primitive_type },
            read_only: false,
        }
    }

    pub fn structure(name: &str, class: &str) -> Self {
        Self {
            name: name.to_string(),
            kind: PropertyKind::Struct {
                class: class.to_string(),
            },
            read_only: false,
        }
    }

    pub fn primitive_array(name: &str, element: PrimitiveType, min_occurs: u32, max_occurs: u32) -> Self {
        Self {
            name: name.to_string(),
            kind: PropertyKind::PrimitiveArray {
                element,
                min_occurs,
                max_occurs,
            },
            read_only: false,
        }
    }

    pub fn struct_array(name: &str, class: &str, min_occurs: u32, max_occurs: u32) -> Self {
        Self {
            name: name.to_string(),
            kind: PropertyKind::StructArray {
                class: class.to_string(),
                min_occurs,
                max_occurs,
            },
            read_only: false,
        }
    }

    pub fn read_only(mut self) -> Self {
        self.read_only = true;
        self
    }
}

impl ClassDefinition {
    pub fn new(name: &str, properties: Vec<PropertyDefinition>) -> Self {
        Self {
            name: name.to_string(),
            properties,
            is_relationship: false,
        }
    }
}

impl SchemaDefinition {
    pub fn find_class(&self, name: &str) -> Option<&ClassDefinition> {
        self.classes.iter().find(|c| c.name == name)
    }

    fn require_class(&self, name: &str) -> Result<&ClassDefinition, LayoutError> {
        self.find_class(name).ok_or_else(|| LayoutError::ClassNotFound {
            schema: self.name.clone(),
            class: name.to_string(),
        })
    }
}

fn check_occurs(access_string: &str, min_occurs: u32, max_occurs: u32) -> Result<bool, LayoutError> {
    if min_occurs > max_occurs {
        return Err(LayoutError::InvalidOccurs {
            access_string: access_string.to_string(),
            min_occurs,
            max_occurs,
        });
    }
    Ok(min_occurs == max_occurs)
}

struct LayoutBuilder<'a> {
    schema: &'a SchemaDefinition,
    factory: ClassLayoutFactory,
    struct_stack: HashSet<String>,
}

impl LayoutBuilder<'_> {
    fn add_properties(
        &mut self,
        class: &ClassDefinition,
        name_root: Option<&str>,
        adding_fixed_size: bool,
    ) -> Result<(), LayoutError> {
        if adding_fixed_size {
            if let Some(root) = name_root {
                self.factory.add_struct_property(root)?;
            }
        }

        for prop in &class.properties {
            let access = match name_root {
                Some(root) => format!("{root}.{}", prop.name),
                None => prop.name.clone(),
            };

            match &prop.kind {
                PropertyKind::Primitive { primitive_type } => {
                    let fixed = primitive_type.is_fixed_size();
                    if adding_fixed_size && fixed {
                        self.factory
                            .add_fixed_size_property(&access, *primitive_type, prop.read_only)?;
                    } else if !adding_fixed_size && !fixed {
                        self.factory.add_variable_size_property(
                            &access,
                            TypeDescriptor::Primitive(*primitive_type),
                            prop.read_only,
                        )?;
                    }
                }
                PropertyKind::Struct { class: struct_class } => {
                    if !self.struct_stack.insert(struct_class.clone()) {
                        return Err(LayoutError::RecursiveStruct {
                            class: struct_class.clone(),
                        });
                    }
                    let nested = self.schema.require_class(struct_class)?;
                    self.add_properties(nested, Some(&access), adding_fixed_size)?;
                    self.struct_stack.remove(struct_class);
                }
                PropertyKind::PrimitiveArray {
                    element,
                    min_occurs,
                    max_occurs,
                } => {
                    let fixed_count = check_occurs(&access, *min_occurs, *max_occurs)?;
                    let fixed_size = fixed_count && element.is_fixed_size();
                    if adding_fixed_size && fixed_size {
                        self.factory.add_fixed_size_array_property(
                            &access,
                            *element,
                            *min_occurs,
                            prop.read_only,
                        )?;
                    } else if !adding_fixed_size && !fixed_size {
                        let descriptor = TypeDescriptor::PrimitiveArray(*element);
                        if fixed_count {
                            self.factory.add_variable_size_array_property_with_fixed_count(
                                &access,
                                descriptor,
                                *min_occurs,
                                prop.read_only,
                            )?;
                        } else {
                            self.factory
                                .add_variable_size_property(&access, descriptor, prop.read_only)?;
                        }
                    }
                }
                PropertyKind::StructArray {
                    class: element_class,
                    min_occurs,
                    max_occurs,
                } => {
                    // element class must exist even though it is laid out separately
                    self.schema.require_class(element_class)?;
                    let fixed_count = check_occurs(&access, *min_occurs, *max_occurs)?;
                    if !adding_fixed_size {
                        if fixed_count {
                            self.factory.add_variable_size_array_property_with_fixed_count(
                                &access,
                                TypeDescriptor::StructArray,
                                *min_occurs,
                                prop.read_only,
                            )?;
                        } else {
                            self.factory.add_variable_size_property(
                                &access,
                                TypeDescriptor::StructArray,
                                prop.read_only,
                            )?;
                        }
                    }
                }
            }
        }
        Ok(())
    }
}

/// Builds the layout of `class_name` from its definition in `schema`.
///
/// Embedded structs are flattened into dotted access strings; struct arrays
/// become single variable-size properties whose elements are separate instances.
pub fn build_from_class(
    schema: &SchemaDefinition,
    class_name: &str,
    class_index: ClassIndex,
    schema_index: SchemaIndex,
) -> Result<ClassLayout, LayoutError> {
    let class = schema.require_class(class_name)?;
    let mut builder = LayoutBuilder {
        schema,
        factory: ClassLayoutFactory::new(&class.name, class_index, schema_index)?,
        struct_stack: HashSet::from([class.name.clone()]),
    };

    builder.add_properties(class, None, true)?;
    builder.add_properties(class, None, false)?;
    if class.is_relationship {
        builder.factory.add_relationship_pointers()?;
    }

    Ok(builder.factory.finish())
}

/// Class layouts of one schema, indexed by class index.
pub struct SchemaLayout {
    schema_index: SchemaIndex,
    class_layouts: RwLock<Vec<Option<Arc<ClassLayout>>>>,
}

impl SchemaLayout {
    pub fn new(schema_index: SchemaIndex) -> Self {
        Self {
            schema_index,
            class_layouts: RwLock::new(Vec::new()),
        }
    }

    pub fn schema_index(&self) -> SchemaIndex {
        self.schema_index
    }

    /// Registers a layout at its class index.
    ///
    /// # Errors
    /// Returns `ClassIndexInUse` if another layout already occupies the index.
    pub fn add_class_layout(&self, layout: Arc<ClassLayout>) -> Result<(), LayoutError> {
        let mut layouts = self
            .class_layouts
            .write()
            .map_err(|_| LayoutError::LockPoisoned)?;
        let index = layout.class_index() as usize;
        if layouts.len() <= index {
            layouts.resize(index + 1, None);
        }
        if let Some(existing) = &layouts[index] {
            return Err(LayoutError::ClassIndexInUse {
                class_index: layout.class_index(),
                existing: existing.name().to_string(),
            });
        }
        tracing::debug!(
            "Registered class layout {} at index {} in schema {}",
            layout.name(),
            index,
            self.schema_index
        );
        layouts[index] = Some(layout);
        Ok(())
    }

    pub fn get_class_layout(&self, class_index: ClassIndex) -> Option<Arc<ClassLayout>> {
        self.class_layouts
            .read()
            .ok()?
            .get(class_index as usize)
            .cloned()
            .flatten()
    }

    pub fn find_class_layout(&self, class_name: &str) -> Option<Arc<ClassLayout>> {
        self.class_layouts
            .read()
            .ok()?
            .iter()
            .flatten()
            .find(|l| l.name() == class_name)
            .cloned()
    }

    /// Highest registered class index, `None` when empty.
    pub fn max_class_index(&self) -> Option<ClassIndex> {
        let layouts = self.class_layouts.read().ok()?;
        layouts
            .iter()
            .rposition(Option::is_some)
            .map(|i| i as ClassIndex)
    }

    /// Lowest class index with no layout registered.
    pub fn find_available_class_index(&self) -> Result<ClassIndex, LayoutError> {
        let layouts = self
            .class_layouts
            .read()
            .map_err(|_| LayoutError::LockPoisoned)?;
        let index = layouts
            .iter()
            .position(Option::is_none)
            .unwrap_or(layouts.len());
        ClassIndex::try_from(index).map_err(|_| LayoutError::NoClassIndexAvailable {
            schema_index: self.schema_index,
        })
    }

    /// Builds and registers a layout for every class of `schema`, assigning
    /// class indices in declaration order.
    pub fn build_all(&self, schema: &SchemaDefinition) -> Result<(), LayoutError> {
        for class in &schema.classes {
            if self.find_class_layout(&class.name).is_some() {
                continue;
            }
            let class_index = self.find_available_class_index()?;
            let layout = build_from_class(schema, &class.name, class_index, self.schema_index)?;
            self.add_class_layout(Arc::new(layout))?;
        }
        Ok(())
    }
}
