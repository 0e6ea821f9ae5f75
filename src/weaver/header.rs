//! Class header: implemented interfaces and the generic signature.

use super::names;
use super::plan::WeavePlan;
use crate::emit::ClassBuilder;
use crate::error::WeaveError;

pub(crate) fn is_woven(interfaces: &[String]) -> bool {
    interfaces.iter().any(|i| i == names::PERSISTENCE_WEAVED)
}

/// Interfaces to append, in order. Root-only markers carry state that lives
/// once per hierarchy; the `PersistenceWeaved*` markers record what each
/// level emitted.
pub(crate) fn added_interfaces(plan: &WeavePlan<'_>, existing: &[String]) -> Vec<&'static str> {
    let mut out = Vec::new();
    if plan.internal && plan.root {
        out.push(names::CLONEABLE);
    }
    out.push(names::PERSISTENCE_WEAVED);
    if plan.internal {
        if plan.root && !plan.embeddable {
            out.push(names::PERSISTENCE_ENTITY);
        }
        out.push(names::PERSISTENCE_OBJECT);
    }
    if plan.fetch_groups {
        if plan.root {
            out.push(names::FETCH_GROUP_TRACKER);
        }
        out.push(names::PERSISTENCE_WEAVED_FETCH_GROUPS);
    }
    if plan.value_holders {
        out.push(names::PERSISTENCE_WEAVED_LAZY);
    }
    if plan.change_tracking {
        if !plan.superclass_tracks_changes {
            out.push(names::CHANGE_TRACKER);
        }
        out.push(names::PERSISTENCE_WEAVED_CHANGE_TRACKING);
    }
    if plan.rest && plan.root {
        out.push(names::PERSISTENCE_WEAVED_REST);
    }
    out.retain(|i| !existing.iter().any(|e| e == i));
    out
}

/// Appends the interfaces and extends the signature, if the class has one.
pub(crate) fn apply(
    builder: &mut ClassBuilder,
    plan: &WeavePlan<'_>,
    existing: &[String],
) -> Result<(), WeaveError> {
    let added = added_interfaces(plan, existing);
    for interface in &added {
        builder.add_interface(interface)?;
    }

    let signature = builder.class().signature()?;
    if let Some(mut signature) = signature {
        for interface in &added {
            signature.push('L');
            signature.push_str(interface);
            signature.push(';');
        }
        let class = builder.class_name().to_string();
        builder
            .class_mut()
            .set_signature(&signature)
            .map_err(|e| WeaveError::emission(&class, "Signature", e))?;
    }
    Ok(())
}
