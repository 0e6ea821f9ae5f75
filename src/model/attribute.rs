use serde::{Deserialize, Serialize};

use crate::classfile::JavaType;

fn default_true() -> bool {
    true
}

/// Weaving metadata for one mapped attribute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeDetails {
    pub name: String,

    /// Declared type. Accepts descriptors or Java spellings in JSON.
    #[serde(rename = "type")]
    pub java_type: JavaType,

    /// Whether the class declares a field of that name. Property-only
    /// attributes have accessors but no backing field.
    #[serde(default = "default_true")]
    pub has_field: bool,

    #[serde(default)]
    pub getter: Option<String>,

    #[serde(default)]
    pub setter: Option<String>,

    #[serde(default)]
    pub weave_value_holders: bool,

    #[serde(default)]
    pub weave_transient_field_value_holders: bool,

    /// Declared by a mapped superclass; the class itself owns no field.
    #[serde(default)]
    pub attribute_on_superclass: bool,

    #[serde(default)]
    pub virtual_property: bool,

    #[serde(default)]
    pub map_accessor: bool,

    #[serde(default)]
    pub mapped_key_map_accessor: bool,
}

impl AttributeDetails {
    pub fn new(name: &str, java_type: JavaType) -> Self {
        Self {
            name: name.to_string(),
            java_type,
            has_field: true,
            getter: None,
            setter: None,
            weave_value_holders: false,
            weave_transient_field_value_holders: false,
            attribute_on_superclass: false,
            virtual_property: false,
            map_accessor: false,
            mapped_key_map_accessor: false,
        }
    }

    pub fn lazy(mut self) -> Self {
        self.weave_value_holders = true;
        self
    }

    pub fn with_accessors(mut self, getter: &str, setter: &str) -> Self {
        self.getter = Some(getter.to_string());
        self.setter = Some(setter.to_string());
        self
    }

    pub fn descriptor(&self) -> String {
        self.java_type.descriptor()
    }

    /// Class operand used to cast values of this attribute.
    pub fn cast_target(&self) -> String {
        self.java_type
            .wrapper()
            .map(str::to_string)
            .or_else(|| self.java_type.class_operand())
            .unwrap_or_else(|| "java/lang/Object".to_string())
    }

    pub fn getter_name(&self) -> Option<&str> {
        self.getter.as_deref().filter(|g| !g.is_empty())
    }

    pub fn setter_name(&self) -> Option<&str> {
        self.setter.as_deref().filter(|s| !s.is_empty())
    }

    /// Accessors of a keyed virtual attribute take the attribute name:
    /// `get(String)` and `set(String, Object)`.
    pub fn uses_keyed_accessors(&self) -> bool {
        self.virtual_property && (self.map_accessor || self.mapped_key_map_accessor)
    }

    /// Own attributes get synthesized members; inherited ones are handled by
    /// the declaring class.
    pub fn is_own(&self) -> bool {
        !self.attribute_on_superclass
    }
}
