//! Descriptor model handed over by the metadata pipeline: what to weave,
//! per class and per attribute.
//!
//! The model is built and validated once, then shared read-only by every
//! class transformation.

mod attribute;
mod class;

use std::collections::{HashMap, HashSet};
use std::path::Path;

use serde::Deserialize;

pub use attribute::AttributeDetails;
pub use class::ClassDetails;

use crate::error::ModelError;

#[derive(Debug, Deserialize)]
struct ModelFile {
    classes: Vec<ClassDetails>,
}

/// Name-keyed registry of class descriptors. Superclass links are resolved
/// by lookup, never owned.
#[derive(Debug, Default, Clone)]
pub struct WeavingModel {
    classes: Vec<ClassDetails>,
    by_name: HashMap<String, usize>,
}

impl WeavingModel {
    pub fn from_json(json: &str) -> Result<Self, ModelError> {
        let file: ModelFile = serde_json::from_str(json)?;
        Self::from_classes(file.classes)
    }

    pub fn from_json_file(path: &Path) -> anyhow::Result<Self> {
        use anyhow::Context;
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read weaving model: {}", path.display()))?;
        Self::from_json(&json)
            .with_context(|| format!("Invalid weaving model: {}", path.display()))
    }

    pub fn from_classes(classes: Vec<ClassDetails>) -> Result<Self, ModelError> {
        let mut model = WeavingModel::default();
        for mut details in classes {
            details.normalize();
            if model.by_name.contains_key(&details.name) {
                return Err(ModelError::DuplicateClass(details.name));
            }
            model.by_name.insert(details.name.clone(), model.classes.len());
            model.classes.push(details);
        }
        model.validate()?;
        Ok(model)
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    pub fn classes(&self) -> impl Iterator<Item = &ClassDetails> {
        self.classes.iter()
    }

    pub fn get(&self, name: &str) -> Option<&ClassDetails> {
        self.by_name.get(name).map(|i| &self.classes[*i])
    }

    pub fn superclass_of(&self, details: &ClassDetails) -> Option<&ClassDetails> {
        details.superclass.as_deref().and_then(|s| self.get(s))
    }

    /// Ancestors with descriptors, nearest first.
    pub fn ancestors<'a>(&'a self, details: &'a ClassDetails) -> Ancestors<'a> {
        Ancestors {
            model: self,
            next: self.superclass_of(details),
            remaining: self.classes.len(),
        }
    }

    pub fn does_superclass_weave_change_tracking(&self, details: &ClassDetails) -> bool {
        self.ancestors(details).any(|a| a.weave_change_tracking)
    }

    fn validate(&self) -> Result<(), ModelError> {
        for details in &self.classes {
            let mut seen = HashSet::new();
            for attr in &details.attributes {
                if !seen.insert(attr.name.as_str()) {
                    return Err(ModelError::DuplicateAttributeName {
                        class: details.name.clone(),
                        attribute: attr.name.clone(),
                    });
                }
                if attr.weave_value_holders && attr.java_type.is_primitive() {
                    return Err(ModelError::PrimitiveValueHolder {
                        class: details.name.clone(),
                        attribute: attr.name.clone(),
                        descriptor: attr.descriptor(),
                    });
                }
                let reachable = attr.has_field
                    || (attr.getter_name().is_some() && attr.setter_name().is_some());
                if attr.weave_value_holders && attr.is_own() && !reachable {
                    return Err(ModelError::UnreachableValueHolder {
                        class: details.name.clone(),
                        attribute: attr.name.clone(),
                    });
                }
            }

            if let Some(superclass) = &details.superclass
                && self.get(superclass).is_none()
            {
                return Err(ModelError::MissingSuperclass {
                    class: details.name.clone(),
                    superclass: superclass.clone(),
                });
            }
        }

        for details in &self.classes {
            self.check_acyclic(details)?;
        }

        for details in &self.classes {
            if let Some(parent) = self.superclass_of(details) {
                let capabilities = [
                    ("internal", details.weave_internal, parent.weave_internal),
                    ("fetch group", details.weave_fetch_groups, parent.weave_fetch_groups),
                    ("REST", details.weave_rest, parent.weave_rest),
                ];
                for (capability, child, inherited) in capabilities {
                    if child && !inherited {
                        return Err(ModelError::CapabilityNotInherited {
                            class: details.name.clone(),
                            capability,
                            superclass: parent.name.clone(),
                        });
                    }
                }
            }

            for attr in details.own_attributes() {
                let clash = self.ancestors(details).find(|ancestor| {
                    ancestor
                        .attribute(&attr.name)
                        .is_some_and(|a| a.is_own())
                });
                if let Some(ancestor) = clash {
                    return Err(ModelError::DuplicateAttribute {
                        class: details.name.clone(),
                        attribute: attr.name.clone(),
                        ancestor: ancestor.name.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    fn check_acyclic(&self, details: &ClassDetails) -> Result<(), ModelError> {
        let mut visited = HashSet::from([details.name.as_str()]);
        let mut current = self.superclass_of(details);
        while let Some(c) = current {
            if !visited.insert(c.name.as_str()) {
                return Err(ModelError::CyclicHierarchy(details.name.clone()));
            }
            current = self.superclass_of(c);
        }
        Ok(())
    }
}

pub struct Ancestors<'a> {
    model: &'a WeavingModel,
    next: Option<&'a ClassDetails>,
    // Bounds the walk even if called on an unvalidated cycle.
    remaining: usize,
}

impl<'a> Iterator for Ancestors<'a> {
    type Item = &'a ClassDetails;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;
        let current = self.next?;
        self.next = self.model.superclass_of(current);
        Some(current)
    }
}
