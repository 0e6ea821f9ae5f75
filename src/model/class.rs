use serde::{Deserialize, Serialize};

use super::attribute::AttributeDetails;

/// Weaving policy for one class.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassDetails {
    /// Internal name once loaded into a [`WeavingModel`](super::WeavingModel).
    pub name: String,

    /// Superclass that has its own descriptor. `None` marks the root of a
    /// woven hierarchy, whatever the class file's actual superclass is.
    pub superclass: Option<String>,

    pub weave_internal: bool,
    pub weave_value_holders: bool,
    pub weave_change_tracking: bool,
    pub weave_fetch_groups: bool,
    pub weave_rest: bool,
    pub can_weave_constructor_optimization: bool,
    pub embeddable: bool,
    pub uses_attribute_access: bool,

    /// Declaration order.
    pub attributes: Vec<AttributeDetails>,
}

impl ClassDetails {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.replace('.', "/"),
            ..Self::default()
        }
    }

    pub fn is_root(&self) -> bool {
        self.superclass.is_none()
    }

    pub fn attribute(&self, name: &str) -> Option<&AttributeDetails> {
        self.attributes.iter().find(|a| a.name == name)
    }

    pub fn own_attributes(&self) -> impl Iterator<Item = &AttributeDetails> {
        self.attributes.iter().filter(|a| a.is_own())
    }

    pub(crate) fn normalize(&mut self) {
        self.name = self.name.replace('.', "/");
        if let Some(s) = self.superclass.as_mut() {
            *s = s.replace('.', "/");
        }
        if self.superclass.as_deref() == Some("java/lang/Object") {
            self.superclass = None;
        }
    }
}
