use super::context::WeaveContext;
use super::names;
use crate::error::WeaveError;
use crate::model::{AttributeDetails, ClassDetails, WeavingModel};

/// Effective flags for one class: the descriptor's policy after the
/// hierarchy and the environment have had their say.
#[derive(Debug)]
pub(crate) struct WeavePlan<'a> {
    pub details: &'a ClassDetails,
    pub class_name: &'a str,
    /// Superclass as the class file names it; used for every `super` call.
    pub super_name: String,
    pub root: bool,
    pub internal: bool,
    pub value_holders: bool,
    pub change_tracking: bool,
    pub fetch_groups: bool,
    pub rest: bool,
    pub constructor_optimization: bool,
    pub embeddable: bool,
    pub attribute_access: bool,
    pub superclass_tracks_changes: bool,
    pub superclass_internal: bool,
    pub superclass_constructor_optimization: bool,
    pub xml_transient: bool,
}

impl<'a> WeavePlan<'a> {
    pub fn new(
        details: &'a ClassDetails,
        model: &WeavingModel,
        context: &WeaveContext,
        file_super: Option<&str>,
        interfaces: &[String],
    ) -> Result<Self, WeaveError> {
        let super_name = file_super.unwrap_or(names::OBJECT).to_string();
        if let Some(expected) = &details.superclass
            && *expected != super_name
        {
            return Err(WeaveError::ClassMismatch {
                expected: format!("{} extends {expected}", details.name),
                found: format!("{} extends {super_name}", details.name),
            });
        }

        let parent = model.superclass_of(details);
        let native_tracking = context.tracks_changes_natively(model, details)
            || interfaces.iter().any(|i| i == names::CHANGE_TRACKER);

        Ok(Self {
            details,
            class_name: &details.name,
            super_name,
            root: details.is_root(),
            internal: details.weave_internal,
            value_holders: details.weave_value_holders,
            change_tracking: details.weave_change_tracking && !native_tracking,
            fetch_groups: details.weave_fetch_groups,
            rest: details.weave_rest,
            constructor_optimization: details.can_weave_constructor_optimization,
            embeddable: details.embeddable,
            attribute_access: details.uses_attribute_access,
            superclass_tracks_changes: model.does_superclass_weave_change_tracking(details),
            superclass_internal: parent.is_some_and(|p| p.weave_internal),
            superclass_constructor_optimization: parent
                .is_some_and(|p| p.weave_internal && p.can_weave_constructor_optimization),
            xml_transient: context.xml_transient(),
        })
    }

    /// Attributes this class declares, in declaration order.
    pub fn own_attributes(&self) -> impl Iterator<Item = &'a AttributeDetails> + use<'a> {
        self.details.own_attributes()
    }

    pub fn weaves_holder(&self, attr: &AttributeDetails) -> bool {
        self.value_holders && attr.weave_value_holders
    }

    /// Attribute gets `_persistence_get_<a>`/`_persistence_set_<a>`.
    pub fn intercepts(&self, attr: &AttributeDetails) -> bool {
        attr.has_field && (self.change_tracking || self.fetch_groups || self.weaves_holder(attr))
    }

    /// Listener support lives at the first tracking level of the hierarchy.
    pub fn owns_listener(&self) -> bool {
        self.change_tracking && (self.root || !self.superclass_tracks_changes)
    }

    /// Annotations marking a synthesized field invisible to the mapping layer.
    pub fn transient_annotations(&self) -> Vec<&'static str> {
        let mut out = vec![names::JPA_TRANSIENT];
        if self.xml_transient {
            out.push(names::XML_TRANSIENT);
        }
        out
    }
}
