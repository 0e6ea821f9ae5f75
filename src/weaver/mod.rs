//! The weaving engine: turns a compiled entity class plus its descriptor
//! into the augmented class the persistence runtime expects.
//!
//! One call transforms one class and holds no state afterwards. The steps:
//!
//! 1. bail out if the class already carries the woven marker,
//! 2. derive a [`WeavePlan`](plan::WeavePlan) from descriptor, hierarchy
//!    and [`WeaveContext`],
//! 3. route field access in existing methods through the new accessors,
//! 4. extend the interface list and signature,
//! 5. append class-level and per-attribute members,
//! 6. serialize.
//!
//! Any failure leaves the input untouched; nothing is returned half-woven.

mod context;
mod header;
mod lifecycle;
mod members;
pub mod names;
mod plan;
mod rewrite;

use serde::Serialize;
use tracing::{debug, warn};

pub use context::WeaveContext;
pub use rewrite::RewrittenAccess;

use crate::classfile::ClassFile;
use crate::emit::ClassBuilder;
use crate::error::WeaveError;
use crate::model::{ClassDetails, WeavingModel};
use plan::WeavePlan;

/// What was added to one class.
#[derive(Debug, Clone, Serialize)]
pub struct WeaveReport {
    pub class: String,
    pub interfaces: Vec<String>,
    pub fields: Vec<String>,
    pub methods: Vec<String>,
    pub rewritten_accesses: Vec<RewrittenAccess>,
    pub stack_maps: bool,
}

#[derive(Debug)]
pub enum WeaveOutcome {
    /// The class carries the woven marker; the input is the output.
    AlreadyWoven,
    Woven { bytes: Vec<u8>, report: WeaveReport },
}

impl WeaveOutcome {
    /// Output bytes, falling back to `input` for an already woven class.
    pub fn into_bytes(self, input: &[u8]) -> Vec<u8> {
        match self {
            WeaveOutcome::AlreadyWoven => input.to_vec(),
            WeaveOutcome::Woven { bytes, .. } => bytes,
        }
    }

    pub fn report(&self) -> Option<&WeaveReport> {
        match self {
            WeaveOutcome::AlreadyWoven => None,
            WeaveOutcome::Woven { report, .. } => Some(report),
        }
    }
}

/// Weaves classes against a validated model. Cheap to copy and safe to share
/// across threads.
#[derive(Debug, Clone, Copy)]
pub struct ClassWeaver<'a> {
    model: &'a WeavingModel,
    context: &'a WeaveContext,
}

impl<'a> ClassWeaver<'a> {
    pub fn new(model: &'a WeavingModel, context: &'a WeaveContext) -> Self {
        Self { model, context }
    }

    pub fn model(&self) -> &'a WeavingModel {
        self.model
    }

    /// Weaves a class using the descriptor registered under its name.
    pub fn weave(&self, bytes: &[u8]) -> Result<WeaveOutcome, WeaveError> {
        let class = ClassFile::parse(bytes)?;
        let name = class.name()?;
        let details = self
            .model
            .get(&name)
            .ok_or_else(|| WeaveError::UnknownClass(name.clone()))?;
        self.weave_parsed(class, details)
    }

    /// Weaves a class against an explicit descriptor, which must name it.
    pub fn weave_class(
        &self,
        bytes: &[u8],
        details: &ClassDetails,
    ) -> Result<WeaveOutcome, WeaveError> {
        let class = ClassFile::parse(bytes)?;
        let name = class.name()?;
        if name != details.name {
            return Err(WeaveError::ClassMismatch {
                expected: details.name.clone(),
                found: name,
            });
        }
        self.weave_parsed(class, details)
    }

    fn weave_parsed(
        &self,
        mut class: ClassFile,
        details: &ClassDetails,
    ) -> Result<WeaveOutcome, WeaveError> {
        let interfaces = class.interface_names()?;
        if header::is_woven(&interfaces) {
            debug!(class = %details.name, "Already woven");
            return Ok(WeaveOutcome::AlreadyWoven);
        }

        let file_super = class.super_name()?;
        let plan = WeavePlan::new(
            details,
            self.model,
            self.context,
            file_super.as_deref(),
            &interfaces,
        )?;
        if details.weave_change_tracking && !plan.change_tracking {
            debug!(class = %details.name, "Change tracking left to the class itself");
        }
        let target = self.context.target();
        if class.major_version > target.major {
            warn!(
                class = %details.name,
                major = class.major_version,
                target = target.name,
                "Class is newer than the target runtime"
            );
        }

        let rewritten_accesses = rewrite::rewrite_field_access(&mut class, &plan)?;

        let mut builder = ClassBuilder::new(class)?;
        header::apply(&mut builder, &plan, &interfaces)?;
        if plan.internal {
            lifecycle::weave_internal(&mut builder, &plan)?;
        }
        for attr in plan.own_attributes() {
            members::weave_attribute(&mut builder, &plan, attr)?;
        }
        if plan.owns_listener() {
            lifecycle::weave_change_listener(&mut builder, &plan)?;
        }
        if plan.fetch_groups && plan.root {
            lifecycle::weave_fetch_groups(&mut builder, &plan)?;
        }
        if plan.rest && plan.root {
            lifecycle::weave_rest(&mut builder, &plan)?;
        }

        let stack_maps = builder.emits_frames();
        let (class, added) = builder.finish();
        let bytes = class.to_bytes();
        debug!(
            class = %details.name,
            interfaces = added.interfaces.len(),
            fields = added.fields.len(),
            methods = added.methods.len(),
            rewrites = rewritten_accesses.len(),
            "Woven"
        );
        Ok(WeaveOutcome::Woven {
            bytes,
            report: WeaveReport {
                class: details.name.clone(),
                interfaces: added.interfaces,
                fields: added.fields,
                methods: added.methods,
                rewritten_accesses,
                stack_maps,
            },
        })
    }
}

#[cfg(test)]
pub(crate) mod fixtures;
