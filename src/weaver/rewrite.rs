//! Routes direct field access in existing method bodies through the
//! synthesized accessors.
//!
//! `getfield`/`putfield` and the replacing `invokevirtual` have the same
//! length and the same stack effect, so offsets, branch targets and the
//! existing stack maps all stay valid.

use std::collections::HashMap;

use serde::Serialize;

use super::names;
use super::plan::WeavePlan;
use crate::classfile::{CODE_ATTRIBUTE, ClassFile};
use crate::emit::Opcode;
use crate::emit::walk::{Instructions, code_range};
use crate::error::{ClassFormatError, WeaveError};

/// One field access that now goes through an accessor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RewrittenAccess {
    pub method: String,
    pub pc: usize,
    pub field: String,
    pub write: bool,
}

struct Patch {
    method: usize,
    attribute: usize,
    at: usize,
    index: u16,
}

/// Rewrites accesses to intercepted attributes of this class in every
/// original method except constructors and static initializers. Must run
/// before synthesized methods are added.
pub(crate) fn rewrite_field_access(
    class: &mut ClassFile,
    plan: &WeavePlan<'_>,
) -> Result<Vec<RewrittenAccess>, WeaveError> {
    let intercepted: HashMap<String, String> = plan
        .own_attributes()
        .filter(|a| plan.intercepts(a))
        .map(|a| (a.name.clone(), a.descriptor()))
        .collect();
    if intercepted.is_empty() {
        return Ok(Vec::new());
    }

    let mut found = Vec::new();
    let mut report = Vec::new();
    for (mi, method) in class.methods.iter().enumerate() {
        let name = class.member_name(method)?;
        if name == "<init>" || name == "<clinit>" {
            continue;
        }
        let Some(ai) = class.find_attribute(&method.attributes, CODE_ATTRIBUTE) else {
            continue;
        };
        let info = &method.attributes[ai].info;
        let range = code_range(info)?;
        let code = &info[range.clone()];
        for insn in Instructions::new(code) {
            let (pc, opcode) = insn?;
            let write = match opcode {
                op if op == Opcode::Getfield.byte() => false,
                op if op == Opcode::Putfield.byte() => true,
                _ => continue,
            };
            let index = u16::from_be_bytes([code[pc + 1], code[pc + 2]]);
            let (owner, field, descriptor) = class.constant_pool.field_ref_at(index)?;
            if owner != plan.class_name || intercepted.get(&field) != Some(&descriptor) {
                continue;
            }
            found.push((mi, ai, range.start + pc, field.clone(), descriptor, write));
            report.push(RewrittenAccess {
                method: format!("{name}{}", class.member_descriptor(method)?),
                pc,
                field,
                write,
            });
        }
    }

    let mut patches = Vec::with_capacity(found.len());
    for (mi, ai, at, field, descriptor, write) in found {
        let (accessor, desc) = if write {
            (names::field_setter(&field), format!("({descriptor})V"))
        } else {
            (names::field_getter(&field), format!("(){descriptor}"))
        };
        let index = class
            .constant_pool
            .method_ref(plan.class_name, &accessor, &desc, false)
            .map_err(|e| WeaveError::emission(plan.class_name, &accessor, e))?;
        patches.push(Patch {
            method: mi,
            attribute: ai,
            at,
            index,
        });
    }
    for patch in patches {
        let info = &mut class.methods[patch.method].attributes[patch.attribute].info;
        let bytes = info
            .get_mut(patch.at..patch.at + 3)
            .ok_or(ClassFormatError::UnexpectedEnd(patch.at))?;
        bytes[0] = Opcode::Invokevirtual.byte();
        bytes[1..3].copy_from_slice(&patch.index.to_be_bytes());
    }
    Ok(report)
}
