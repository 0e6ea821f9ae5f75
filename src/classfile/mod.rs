//! Structural model of a compiled class: read, inspect, write.
//!
//! Method bodies and attributes the weaver does not touch are kept as raw
//! bytes, so a parse followed by a write reproduces the input exactly.

pub mod constant_pool;
pub mod descriptor;
pub mod version;

use serde::Serialize;

pub use constant_pool::{Constant, ConstantPool};
pub use descriptor::{JavaType, MethodDescriptor};
pub use version::JavaVersion;

use crate::error::{ClassFormatError, EmissionError};

pub const MAGIC: u32 = 0xCAFE_BABE;

pub const CODE_ATTRIBUTE: &str = "Code";
pub const SIGNATURE_ATTRIBUTE: &str = "Signature";
pub const STACK_MAP_TABLE_ATTRIBUTE: &str = "StackMapTable";
pub const RUNTIME_VISIBLE_ANNOTATIONS: &str = "RuntimeVisibleAnnotations";

pub mod access {
    pub const ACC_PUBLIC: u16 = 0x0001;
    pub const ACC_PRIVATE: u16 = 0x0002;
    pub const ACC_PROTECTED: u16 = 0x0004;
    pub const ACC_STATIC: u16 = 0x0008;
    pub const ACC_FINAL: u16 = 0x0010;
    pub const ACC_SUPER: u16 = 0x0020;
    pub const ACC_TRANSIENT: u16 = 0x0080;
    pub const ACC_INTERFACE: u16 = 0x0200;
    pub const ACC_ABSTRACT: u16 = 0x0400;
    pub const ACC_SYNTHETIC: u16 = 0x1000;
}

pub(crate) struct ByteReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    pub(crate) fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub(crate) fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    pub(crate) fn bytes(&mut self, len: usize) -> Result<&'a [u8], ClassFormatError> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|end| *end <= self.data.len())
            .ok_or(ClassFormatError::UnexpectedEnd(self.pos))?;
        let slice = &self.data[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    pub(crate) fn u8(&mut self) -> Result<u8, ClassFormatError> {
        Ok(self.bytes(1)?[0])
    }

    pub(crate) fn u16(&mut self) -> Result<u16, ClassFormatError> {
        let b = self.bytes(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    pub(crate) fn u32(&mut self) -> Result<u32, ClassFormatError> {
        let b = self.bytes(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub(crate) fn u64(&mut self) -> Result<u64, ClassFormatError> {
        let hi = self.u32()? as u64;
        let lo = self.u32()? as u64;
        Ok((hi << 32) | lo)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeInfo {
    pub name_index: u16,
    pub info: Vec<u8>,
}

/// A field or method slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberInfo {
    pub access_flags: u16,
    pub name_index: u16,
    pub descriptor_index: u16,
    pub attributes: Vec<AttributeInfo>,
}

#[derive(Debug, Clone)]
pub struct ClassFile {
    pub minor_version: u16,
    pub major_version: u16,
    pub constant_pool: ConstantPool,
    pub access_flags: u16,
    pub this_class: u16,
    pub super_class: u16,
    pub interfaces: Vec<u16>,
    pub fields: Vec<MemberInfo>,
    pub methods: Vec<MemberInfo>,
    pub attributes: Vec<AttributeInfo>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MemberSummary {
    pub name: String,
    pub descriptor: String,
    pub access_flags: u16,
}

#[derive(Debug, Clone, Serialize)]
pub struct ClassSummary {
    pub name: String,
    pub super_name: Option<String>,
    pub major_version: u16,
    pub interfaces: Vec<String>,
    pub signature: Option<String>,
    pub fields: Vec<MemberSummary>,
    pub methods: Vec<MemberSummary>,
}

impl ClassFile {
    /// An empty class with no members, used to synthesize classes from scratch.
    pub fn new(
        name: &str,
        super_name: Option<&str>,
        access_flags: u16,
        major_version: u16,
    ) -> Result<Self, EmissionError> {
        let mut constant_pool = ConstantPool::new();
        let this_class = constant_pool.class(name)?;
        let super_class = match super_name {
            Some(s) => constant_pool.class(s)?,
            None => 0,
        };
        Ok(Self {
            minor_version: 0,
            major_version,
            constant_pool,
            access_flags,
            this_class,
            super_class,
            interfaces: Vec::new(),
            fields: Vec::new(),
            methods: Vec::new(),
            attributes: Vec::new(),
        })
    }

    pub fn parse(bytes: &[u8]) -> Result<Self, ClassFormatError> {
        let mut r = ByteReader::new(bytes);
        let magic = r.u32()?;
        if magic != MAGIC {
            return Err(ClassFormatError::InvalidMagic(magic));
        }
        let minor_version = r.u16()?;
        let major_version = r.u16()?;
        let constant_pool = ConstantPool::read(&mut r)?;
        let access_flags = r.u16()?;
        let this_class = r.u16()?;
        let super_class = r.u16()?;
        let interface_count = r.u16()?;
        let mut interfaces = Vec::with_capacity(interface_count as usize);
        for _ in 0..interface_count {
            interfaces.push(r.u16()?);
        }
        let fields = read_members(&mut r)?;
        let methods = read_members(&mut r)?;
        let attributes = read_attributes(&mut r)?;
        if r.remaining() > 0 {
            return Err(ClassFormatError::TrailingBytes(r.remaining()));
        }
        Ok(Self {
            minor_version,
            major_version,
            constant_pool,
            access_flags,
            this_class,
            super_class,
            interfaces,
            fields,
            methods,
            attributes,
        })
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(1024);
        out.extend_from_slice(&MAGIC.to_be_bytes());
        out.extend_from_slice(&self.minor_version.to_be_bytes());
        out.extend_from_slice(&self.major_version.to_be_bytes());
        self.constant_pool.write(&mut out);
        out.extend_from_slice(&self.access_flags.to_be_bytes());
        out.extend_from_slice(&self.this_class.to_be_bytes());
        out.extend_from_slice(&self.super_class.to_be_bytes());
        out.extend_from_slice(&(self.interfaces.len() as u16).to_be_bytes());
        for i in &self.interfaces {
            out.extend_from_slice(&i.to_be_bytes());
        }
        write_members(&mut out, &self.fields);
        write_members(&mut out, &self.methods);
        write_attributes(&mut out, &self.attributes);
        out
    }

    pub fn name(&self) -> Result<String, ClassFormatError> {
        self.constant_pool.class_name_at(self.this_class)
    }

    pub fn super_name(&self) -> Result<Option<String>, ClassFormatError> {
        if self.super_class == 0 {
            return Ok(None);
        }
        self.constant_pool.class_name_at(self.super_class).map(Some)
    }

    pub fn interface_names(&self) -> Result<Vec<String>, ClassFormatError> {
        self.interfaces
            .iter()
            .map(|i| self.constant_pool.class_name_at(*i))
            .collect()
    }

    pub fn member_name(&self, member: &MemberInfo) -> Result<String, ClassFormatError> {
        self.constant_pool.utf8_at(member.name_index)
    }

    pub fn member_descriptor(&self, member: &MemberInfo) -> Result<String, ClassFormatError> {
        self.constant_pool.utf8_at(member.descriptor_index)
    }

    pub fn has_method(&self, name: &str, descriptor: &str) -> bool {
        self.methods.iter().any(|m| self.member_is(m, name, Some(descriptor)))
    }

    /// Fields are unique by name within a class as far as the weaver is
    /// concerned, whatever their descriptor.
    pub fn has_field(&self, name: &str) -> bool {
        self.fields.iter().any(|f| self.member_is(f, name, None))
    }

    fn member_is(&self, member: &MemberInfo, name: &str, descriptor: Option<&str>) -> bool {
        let name_matches = self.member_name(member).is_ok_and(|n| n == name);
        let desc_matches = match descriptor {
            Some(d) => self.member_descriptor(member).is_ok_and(|md| md == d),
            None => true,
        };
        name_matches && desc_matches
    }

    pub fn find_attribute(&self, attributes: &[AttributeInfo], name: &str) -> Option<usize> {
        attributes.iter().position(|a| {
            self.constant_pool
                .utf8_at(a.name_index)
                .is_ok_and(|n| n == name)
        })
    }

    pub fn signature(&self) -> Result<Option<String>, ClassFormatError> {
        let Some(pos) = self.find_attribute(&self.attributes, SIGNATURE_ATTRIBUTE) else {
            return Ok(None);
        };
        let mut r = ByteReader::new(&self.attributes[pos].info);
        let index = r.u16()?;
        self.constant_pool.utf8_at(index).map(Some)
    }

    pub fn set_signature(&mut self, signature: &str) -> Result<(), EmissionError> {
        let value = self.constant_pool.utf8(signature)?;
        let info = value.to_be_bytes().to_vec();
        match self.find_attribute(&self.attributes, SIGNATURE_ATTRIBUTE) {
            Some(pos) => self.attributes[pos].info = info,
            None => {
                let name_index = self.constant_pool.utf8(SIGNATURE_ATTRIBUTE)?;
                self.attributes.push(AttributeInfo { name_index, info });
            }
        }
        Ok(())
    }

    pub fn add_interface(&mut self, internal_name: &str) -> Result<(), EmissionError> {
        let index = self.constant_pool.class(internal_name)?;
        self.interfaces.push(index);
        Ok(())
    }

    pub fn summary(&self) -> Result<ClassSummary, ClassFormatError> {
        let summarize = |members: &[MemberInfo]| -> Result<Vec<MemberSummary>, ClassFormatError> {
            members
                .iter()
                .map(|m| {
                    Ok(MemberSummary {
                        name: self.member_name(m)?,
                        descriptor: self.member_descriptor(m)?,
                        access_flags: m.access_flags,
                    })
                })
                .collect()
        };
        Ok(ClassSummary {
            name: self.name()?,
            super_name: self.super_name()?,
            major_version: self.major_version,
            interfaces: self.interface_names()?,
            signature: self.signature()?,
            fields: summarize(&self.fields)?,
            methods: summarize(&self.methods)?,
        })
    }
}

fn read_attributes(r: &mut ByteReader<'_>) -> Result<Vec<AttributeInfo>, ClassFormatError> {
    let count = r.u16()?;
    let mut attributes = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let name_index = r.u16()?;
        let len = r.u32()? as usize;
        attributes.push(AttributeInfo {
            name_index,
            info: r.bytes(len)?.to_vec(),
        });
    }
    Ok(attributes)
}

fn read_members(r: &mut ByteReader<'_>) -> Result<Vec<MemberInfo>, ClassFormatError> {
    let count = r.u16()?;
    let mut members = Vec::with_capacity(count as usize);
    for _ in 0..count {
        members.push(MemberInfo {
            access_flags: r.u16()?,
            name_index: r.u16()?,
            descriptor_index: r.u16()?,
            attributes: read_attributes(r)?,
        });
    }
    Ok(members)
}

fn write_attributes(out: &mut Vec<u8>, attributes: &[AttributeInfo]) {
    out.extend_from_slice(&(attributes.len() as u16).to_be_bytes());
    for a in attributes {
        out.extend_from_slice(&a.name_index.to_be_bytes());
        out.extend_from_slice(&(a.info.len() as u32).to_be_bytes());
        out.extend_from_slice(&a.info);
    }
}

fn write_members(out: &mut Vec<u8>, members: &[MemberInfo]) {
    out.extend_from_slice(&(members.len() as u16).to_be_bytes());
    for m in members {
        out.extend_from_slice(&m.access_flags.to_be_bytes());
        out.extend_from_slice(&m.name_index.to_be_bytes());
        out.extend_from_slice(&m.descriptor_index.to_be_bytes());
        write_attributes(out, &m.attributes);
    }
}
