use crate::classfile::{
    AttributeInfo, ByteReader, ConstantPool, MemberInfo, RUNTIME_VISIBLE_ANNOTATIONS,
};
use crate::error::{ClassFormatError, EmissionError};

/// A field declaration with optional element-less marker annotations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSpec {
    pub access: u16,
    pub name: String,
    pub descriptor: String,
    /// Annotation type descriptors, e.g. `Ljakarta/persistence/Transient;`.
    pub annotations: Vec<String>,
}

impl FieldSpec {
    pub fn new(access: u16, name: impl Into<String>, descriptor: impl Into<String>) -> Self {
        Self {
            access,
            name: name.into(),
            descriptor: descriptor.into(),
            annotations: Vec::new(),
        }
    }

    pub fn annotated(mut self, annotation: &str) -> Self {
        self.annotations.push(annotation.to_string());
        self
    }

    pub fn into_member(self, pool: &mut ConstantPool) -> Result<MemberInfo, EmissionError> {
        let mut attributes = Vec::new();
        if !self.annotations.is_empty() {
            let mut info = Vec::with_capacity(2 + self.annotations.len() * 4);
            info.extend_from_slice(&(self.annotations.len() as u16).to_be_bytes());
            for annotation in &self.annotations {
                info.extend_from_slice(&pool.utf8(annotation)?.to_be_bytes());
                info.extend_from_slice(&0u16.to_be_bytes());
            }
            attributes.push(AttributeInfo {
                name_index: pool.utf8(RUNTIME_VISIBLE_ANNOTATIONS)?,
                info,
            });
        }
        Ok(MemberInfo {
            access_flags: self.access,
            name_index: pool.utf8(&self.name)?,
            descriptor_index: pool.utf8(&self.descriptor)?,
            attributes,
        })
    }
}

/// Reads back the annotation type descriptors of a field or method.
pub fn annotation_types(
    member: &MemberInfo,
    pool: &ConstantPool,
) -> Result<Vec<String>, ClassFormatError> {
    let mut types = Vec::new();
    for attr in &member.attributes {
        if pool.utf8_at(attr.name_index)? != RUNTIME_VISIBLE_ANNOTATIONS {
            continue;
        }
        let mut r = ByteReader::new(&attr.info);
        let count = r.u16()?;
        for _ in 0..count {
            types.push(pool.utf8_at(r.u16()?)?);
            if r.u16()? != 0 {
                // Element values are never emitted by the weaver; stop at the
                // first annotation that carries any.
                break;
            }
        }
    }
    Ok(types)
}
