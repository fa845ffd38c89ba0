use super::class_layout::{
    ClassIndex, ClassLayout, SchemaIndex, INSTANCE_HEADER_SIZE, SOURCE_ECPOINTER, TARGET_ECPOINTER,
};
use super::property_layout::PropertyLayout;
use crate::error::LayoutError;
use crate::types::{PrimitiveType, TypeDescriptor};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FactoryState {
    AcceptingFixedSizeProperties,
    AcceptingVariableSizeProperties,
}

/// Two-phase builder for [`ClassLayout`].
///
/// Fixed-size properties must all be added before the first variable-size
/// property; the switch is irreversible. Every 32nd non-struct property opens a
/// new null-flag word, which pushes the offsets of everything added so far back
/// by 4 bytes.
pub struct ClassLayoutFactory {
    state: FactoryState,
    offset: u32,
    null_flags_offset: u32,
    non_struct_property_count: u32,
    under_construction: ClassLayout,
}

impl ClassLayoutFactory {
    /// Creates a factory with the root struct placeholder (access string `""`)
    /// already registered at index 0.
    pub fn new(class_name: &str, class_index: ClassIndex, schema_index: SchemaIndex) -> Result<Self, LayoutError> {
        let mut under_construction =
            ClassLayout::new_empty(class_name.to_string(), class_index, schema_index);
        under_construction.add_property_layout(PropertyLayout::new_struct(String::new(), 0))?;
        Ok(Self {
            state: FactoryState::AcceptingFixedSizeProperties,
            offset: INSTANCE_HEADER_SIZE + 4,
            null_flags_offset: INSTANCE_HEADER_SIZE,
            non_struct_property_count: 0,
            under_construction,
        })
    }

    fn parent_struct_index(&self, access_string: &str) -> Result<u32, LayoutError> {
        let Some((parent, _)) = access_string.rsplit_once('.') else {
            return Ok(0);
        };
        match self.under_construction.get_property_index(parent) {
            Some(index)
                if self
                    .under_construction
                    .get_property_layout_by_index(index)
                    .is_some_and(PropertyLayout::is_struct) =>
            {
                Ok(index)
            }
            _ => Err(LayoutError::UnknownParentStruct {
                access_string: access_string.to_string(),
            }),
        }
    }

    fn require_fixed_state(&self, access_string: &str) -> Result<(), LayoutError> {
        if self.state != FactoryState::AcceptingFixedSizeProperties {
            return Err(LayoutError::NotAcceptingFixedSizeProperties {
                access_string: access_string.to_string(),
            });
        }
        Ok(())
    }

    /// Adds an embedded struct placeholder. Struct placeholders occupy no bytes.
    pub fn add_struct_property(&mut self, access_string: &str) -> Result<(), LayoutError> {
        self.require_fixed_state(access_string)?;
        let parent = self.parent_struct_index(access_string)?;
        self.under_construction
            .add_property_layout(PropertyLayout::new_struct(access_string.to_string(), parent))?;
        Ok(())
    }

    fn add_property(
        &mut self,
        access_string: &str,
        type_descriptor: TypeDescriptor,
        size: u32,
        fixed_count: bool,
        modifier_data: u32,
        read_only: bool,
    ) -> Result<(), LayoutError> {
        let parent_struct_index = self.parent_struct_index(access_string)?;
        let position_in_word = self.non_struct_property_count % 32;
        let null_flags_bitmask = 1u32 << position_in_word;

        if position_in_word == 0 && self.non_struct_property_count != 0 {
            // new null-flag word goes ahead of all property data
            self.null_flags_offset += 4;
            self.offset += 4;
            for prop in self.under_construction.property_layouts_mut() {
                if !prop.is_struct() {
                    prop.offset += 4;
                }
            }
        }

        let mut access = access_string.to_string();
        if type_descriptor.is_array() {
            access.push_str("[]");
        }

        self.under_construction.add_property_layout(PropertyLayout {
            access_string: access,
            parent_struct_index,
            type_descriptor,
            offset: self.offset,
            null_flags_offset: self.null_flags_offset,
            null_flags_bitmask,
            fixed_count,
            modifier_data,
            read_only,
        })?;

        self.offset += size;
        self.non_struct_property_count += 1;
        Ok(())
    }

    pub fn add_fixed_size_property(
        &mut self,
        access_string: &str,
        primitive_type: PrimitiveType,
        read_only: bool,
    ) -> Result<(), LayoutError> {
        self.require_fixed_state(access_string)?;
        let size = primitive_type
            .fixed_size()
            .ok_or_else(|| LayoutError::InvalidPropertyType {
                access_string: access_string.to_string(),
                reason: format!("{primitive_type} is not fixed size"),
            })?;
        self.add_property(
            access_string,
            TypeDescriptor::Primitive(primitive_type),
            size,
            false,
            0,
            read_only,
        )
    }

    pub fn add_fixed_size_array_property(
        &mut self,
        access_string: &str,
        element_type: PrimitiveType,
        array_count: u32,
        read_only: bool,
    ) -> Result<(), LayoutError> {
        self.require_fixed_state(access_string)?;
        let element_size = element_type
            .fixed_size()
            .ok_or_else(|| LayoutError::InvalidPropertyType {
                access_string: access_string.to_string(),
                reason: format!("{element_type} elements are not fixed size"),
            })?;
        let size = super::null_flags_word_count(array_count) * 4 + array_count * element_size;
        self.add_property(
            access_string,
            TypeDescriptor::PrimitiveArray(element_type),
            size,
            true,
            array_count,
            read_only,
        )
    }

    fn enter_variable_state(&mut self, access_string: &str, type_descriptor: &TypeDescriptor) -> Result<(), LayoutError> {
        if type_descriptor.is_struct() {
            return Err(LayoutError::InvalidPropertyType {
                access_string: access_string.to_string(),
                reason: "embedded structs are added with add_struct_property".into(),
            });
        }
        self.state = FactoryState::AcceptingVariableSizeProperties;
        Ok(())
    }

    /// Adds a property whose value lives in the variable section; only its
    /// 4-byte secondary offset is stored in the fixed section.
    pub fn add_variable_size_property(
        &mut self,
        access_string: &str,
        type_descriptor: TypeDescriptor,
        read_only: bool,
    ) -> Result<(), LayoutError> {
        self.enter_variable_state(access_string, &type_descriptor)?;
        self.add_property(access_string, type_descriptor, 4, false, 0, read_only)
    }

    pub fn add_variable_size_array_property_with_fixed_count(
        &mut self,
        access_string: &str,
        type_descriptor: TypeDescriptor,
        array_count: u32,
        read_only: bool,
    ) -> Result<(), LayoutError> {
        self.enter_variable_state(access_string, &type_descriptor)?;
        if !type_descriptor.is_array() {
            return Err(LayoutError::InvalidPropertyType {
                access_string: access_string.to_string(),
                reason: "fixed count requires an array".into(),
            });
        }
        self.add_property(access_string, type_descriptor, 4, true, array_count, read_only)
    }

    /// Appends the source and target pointer properties carried by relationship classes.
    pub fn add_relationship_pointers(&mut self) -> Result<(), LayoutError> {
        let binary = TypeDescriptor::Primitive(PrimitiveType::Binary);
        self.add_variable_size_property(SOURCE_ECPOINTER, binary.clone(), false)?;
        self.add_variable_size_property(TARGET_ECPOINTER, binary, false)
    }

    /// Computes the fixed-section size and hands over the finished layout.
    pub fn finish(mut self) -> ClassLayout {
        self.under_construction.finish_layout();
        self.under_construction
    }
}
