use std::collections::HashSet;

use tracing::debug;

use super::names;
use crate::classfile::{ClassFile, JavaVersion};
use crate::error::ClassFormatError;
use crate::model::{ClassDetails, WeavingModel};

/// State shared by every class transformation of one build session.
///
/// Created once by the caller, filled by a header pre-pass over all inputs,
/// then only read while classes are woven (possibly in parallel). Discard it
/// when the session ends; a new build needs a new context.
#[derive(Debug, Clone)]
pub struct WeaveContext {
    target: &'static JavaVersion,
    xml_transient: bool,
    native_change_trackers: HashSet<String>,
}

impl WeaveContext {
    pub fn new(target: &'static JavaVersion, xml_transient: bool) -> Self {
        Self {
            target,
            xml_transient,
            native_change_trackers: HashSet::new(),
        }
    }

    /// Runtime the woven classes are meant for. Only checked against each
    /// class; woven output keeps the input's class-file version.
    pub fn target(&self) -> &'static JavaVersion {
        self.target
    }

    /// Whether `XmlTransient` is available to annotate synthesized fields.
    pub fn xml_transient(&self) -> bool {
        self.xml_transient
    }

    /// Pre-pass over one class header. Records classes whose author
    /// implemented the change-tracking interface by hand.
    pub fn observe(&mut self, bytes: &[u8]) -> Result<(), ClassFormatError> {
        let class = ClassFile::parse(bytes)?;
        let interfaces = class.interface_names()?;
        let already_woven = interfaces.iter().any(|i| i == names::PERSISTENCE_WEAVED);
        if !already_woven && interfaces.iter().any(|i| i == names::CHANGE_TRACKER) {
            let name = class.name()?;
            debug!(class = %name, "Class tracks its own changes");
            self.native_change_trackers.insert(name);
        }
        Ok(())
    }

    pub fn record_native_change_tracker(&mut self, class: &str) {
        self.native_change_trackers.insert(class.to_string());
    }

    /// True when the class or one of its described ancestors implements
    /// change tracking itself.
    pub fn tracks_changes_natively(&self, model: &WeavingModel, details: &ClassDetails) -> bool {
        self.native_change_trackers.contains(&details.name)
            || model
                .ancestors(details)
                .any(|a| self.native_change_trackers.contains(&a.name))
    }

    pub fn native_change_tracker_count(&self) -> usize {
        self.native_change_trackers.len()
    }
}

impl Default for WeaveContext {
    fn default() -> Self {
        Self::new(JavaVersion::latest(), true)
    }
}
