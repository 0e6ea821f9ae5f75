use serde::Serialize;
use tracing::warn;

use super::field::FieldSpec;
use super::method::MethodBuilder;
use crate::classfile::{ClassFile, version};
use crate::error::{ClassFormatError, WeaveError};

/// Members appended to a class, in emission order.
#[derive(Debug, Clone, Default, Serialize)]
pub struct AddedMembers {
    pub interfaces: Vec<String>,
    pub fields: Vec<String>,
    pub methods: Vec<String>,
}

/// Appends interfaces, fields and methods to a parsed class. Existing
/// members are never touched; a synthesized member that collides with one
/// already declared is an error.
#[derive(Debug)]
pub struct ClassBuilder {
    class: ClassFile,
    name: String,
    emit_frames: bool,
    added: AddedMembers,
}

impl ClassBuilder {
    pub fn new(class: ClassFile) -> Result<Self, ClassFormatError> {
        let name = class.name()?;
        let (release, clamped) = version::for_class_major(class.major_version);
        if clamped {
            warn!(
                class = %name,
                major = class.major_version,
                fallback = release.name,
                "Unrecognized class file version"
            );
        }
        Ok(Self {
            class,
            name,
            emit_frames: release.has_stack_maps(),
            added: AddedMembers::default(),
        })
    }

    pub fn class_name(&self) -> &str {
        &self.name
    }

    pub fn class(&self) -> &ClassFile {
        &self.class
    }

    pub fn class_mut(&mut self) -> &mut ClassFile {
        &mut self.class
    }

    pub fn emits_frames(&self) -> bool {
        self.emit_frames
    }

    pub fn add_interface(&mut self, internal_name: &str) -> Result<(), WeaveError> {
        self.class
            .add_interface(internal_name)
            .map_err(|e| WeaveError::emission(&self.name, internal_name, e))?;
        self.added.interfaces.push(internal_name.to_string());
        Ok(())
    }

    pub fn add_field(&mut self, spec: FieldSpec) -> Result<(), WeaveError> {
        if self.class.has_field(&spec.name) {
            return Err(WeaveError::DuplicateMember {
                class: self.name.clone(),
                name: spec.name,
                descriptor: spec.descriptor,
            });
        }
        let name = spec.name.clone();
        let member = spec
            .into_member(&mut self.class.constant_pool)
            .map_err(|e| WeaveError::emission(&self.name, &name, e))?;
        self.class.fields.push(member);
        self.added.fields.push(name);
        Ok(())
    }

    pub fn add_method(&mut self, method: MethodBuilder) -> Result<(), WeaveError> {
        if self.class.has_method(method.name(), method.descriptor()) {
            return Err(WeaveError::DuplicateMember {
                class: self.name.clone(),
                name: method.name().to_string(),
                descriptor: method.descriptor().to_string(),
            });
        }
        let signature = format!("{}{}", method.name(), method.descriptor());
        let member = method
            .into_member(&self.name, &mut self.class.constant_pool, self.emit_frames)
            .map_err(|e| WeaveError::emission(&self.name, &signature, e))?;
        self.class.methods.push(member);
        self.added.methods.push(signature);
        Ok(())
    }

    pub fn finish(self) -> (ClassFile, AddedMembers) {
        (self.class, self.added)
    }
}
