//! Constant pool with append-only interning.
//!
//! Entries read from an existing class keep their indices so that method
//! bodies referring to them stay valid. New entries are appended and
//! deduplicated against everything already present.

use std::collections::HashMap;

use super::ByteReader;
use crate::error::{ClassFormatError, EmissionError};

const MAX_POOL_SLOTS: usize = u16::MAX as usize;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Constant {
    /// Raw modified UTF-8 bytes.
    Utf8(Vec<u8>),
    Integer(i32),
    /// IEEE bits, so the pool stays hashable.
    Float(u32),
    Long(i64),
    Double(u64),
    Class(u16),
    String(u16),
    FieldRef(u16, u16),
    MethodRef(u16, u16),
    InterfaceMethodRef(u16, u16),
    NameAndType(u16, u16),
    MethodHandle(u8, u16),
    MethodType(u16),
    Dynamic(u16, u16),
    InvokeDynamic(u16, u16),
    Module(u16),
    Package(u16),
    /// Slot 0 and the upper half of a long or double.
    Unusable,
}

impl Constant {
    fn is_wide(&self) -> bool {
        matches!(self, Constant::Long(_) | Constant::Double(_))
    }
}

#[derive(Debug, Clone)]
pub struct ConstantPool {
    entries: Vec<Constant>,
    lookup: HashMap<Constant, u16>,
}

impl Default for ConstantPool {
    fn default() -> Self {
        Self::new()
    }
}

impl ConstantPool {
    pub fn new() -> Self {
        Self {
            entries: vec![Constant::Unusable],
            lookup: HashMap::new(),
        }
    }

    /// Value of `constant_pool_count` in the class file.
    pub fn count(&self) -> usize {
        self.entries.len()
    }

    pub fn get(&self, index: u16) -> Option<&Constant> {
        match self.entries.get(index as usize) {
            Some(Constant::Unusable) | None => None,
            Some(c) => Some(c),
        }
    }

    pub fn utf8_at(&self, index: u16) -> Result<String, ClassFormatError> {
        match self.get(index) {
            Some(Constant::Utf8(bytes)) => Ok(decode_modified_utf8(bytes)),
            _ => Err(ClassFormatError::BadConstantRef {
                index,
                expected: "Utf8",
            }),
        }
    }

    pub fn class_name_at(&self, index: u16) -> Result<String, ClassFormatError> {
        match self.get(index) {
            Some(Constant::Class(name)) => self.utf8_at(*name),
            _ => Err(ClassFormatError::BadConstantRef {
                index,
                expected: "Class",
            }),
        }
    }

    /// Resolves a field reference into `(owner, name, descriptor)`.
    pub fn field_ref_at(&self, index: u16) -> Result<(String, String, String), ClassFormatError> {
        let Some(Constant::FieldRef(class, nat)) = self.get(index) else {
            return Err(ClassFormatError::BadConstantRef {
                index,
                expected: "Fieldref",
            });
        };
        self.resolve_member(*class, *nat)
    }

    /// Like [`field_ref_at`](Self::field_ref_at), for any field, method or
    /// interface method reference.
    pub fn member_ref_at(&self, index: u16) -> Result<(String, String, String), ClassFormatError> {
        match self.get(index) {
            Some(
                Constant::FieldRef(class, nat)
                | Constant::MethodRef(class, nat)
                | Constant::InterfaceMethodRef(class, nat),
            ) => self.resolve_member(*class, *nat),
            _ => Err(ClassFormatError::BadConstantRef {
                index,
                expected: "member reference",
            }),
        }
    }

    fn resolve_member(
        &self,
        class: u16,
        nat: u16,
    ) -> Result<(String, String, String), ClassFormatError> {
        let Some(Constant::NameAndType(name, desc)) = self.get(nat) else {
            return Err(ClassFormatError::BadConstantRef {
                index: nat,
                expected: "NameAndType",
            });
        };
        Ok((
            self.class_name_at(class)?,
            self.utf8_at(*name)?,
            self.utf8_at(*desc)?,
        ))
    }

    /// Interns a constant, returning the index of an equal existing entry when
    /// there is one.
    pub fn intern(&mut self, constant: Constant) -> Result<u16, EmissionError> {
        if let Some(&index) = self.lookup.get(&constant) {
            return Ok(index);
        }
        let slots = if constant.is_wide() { 2 } else { 1 };
        if self.entries.len() + slots > MAX_POOL_SLOTS {
            return Err(EmissionError::ConstantPoolOverflow);
        }
        let index = self.entries.len() as u16;
        let wide = constant.is_wide();
        self.lookup.insert(constant.clone(), index);
        self.entries.push(constant);
        if wide {
            self.entries.push(Constant::Unusable);
        }
        Ok(index)
    }

    pub fn utf8(&mut self, value: &str) -> Result<u16, EmissionError> {
        self.intern(Constant::Utf8(encode_modified_utf8(value)))
    }

    pub fn class(&mut self, internal_name: &str) -> Result<u16, EmissionError> {
        let name = self.utf8(internal_name)?;
        self.intern(Constant::Class(name))
    }

    pub fn string(&mut self, value: &str) -> Result<u16, EmissionError> {
        let utf8 = self.utf8(value)?;
        self.intern(Constant::String(utf8))
    }

    pub fn name_and_type(&mut self, name: &str, descriptor: &str) -> Result<u16, EmissionError> {
        let name = self.utf8(name)?;
        let descriptor = self.utf8(descriptor)?;
        self.intern(Constant::NameAndType(name, descriptor))
    }

    pub fn field_ref(
        &mut self,
        owner: &str,
        name: &str,
        descriptor: &str,
    ) -> Result<u16, EmissionError> {
        let class = self.class(owner)?;
        let nat = self.name_and_type(name, descriptor)?;
        self.intern(Constant::FieldRef(class, nat))
    }

    pub fn method_ref(
        &mut self,
        owner: &str,
        name: &str,
        descriptor: &str,
        interface: bool,
    ) -> Result<u16, EmissionError> {
        let class = self.class(owner)?;
        let nat = self.name_and_type(name, descriptor)?;
        if interface {
            self.intern(Constant::InterfaceMethodRef(class, nat))
        } else {
            self.intern(Constant::MethodRef(class, nat))
        }
    }

    pub(crate) fn read(reader: &mut ByteReader<'_>) -> Result<Self, ClassFormatError> {
        let count = reader.u16()?;
        let mut pool = ConstantPool::new();
        let mut index: u16 = 1;
        while index < count {
            let tag = reader.u8()?;
            let constant = match tag {
                1 => {
                    let len = reader.u16()? as usize;
                    Constant::Utf8(reader.bytes(len)?.to_vec())
                }
                3 => Constant::Integer(reader.u32()? as i32),
                4 => Constant::Float(reader.u32()?),
                5 => Constant::Long(reader.u64()? as i64),
                6 => Constant::Double(reader.u64()?),
                7 => Constant::Class(reader.u16()?),
                8 => Constant::String(reader.u16()?),
                9 => Constant::FieldRef(reader.u16()?, reader.u16()?),
                10 => Constant::MethodRef(reader.u16()?, reader.u16()?),
                11 => Constant::InterfaceMethodRef(reader.u16()?, reader.u16()?),
                12 => Constant::NameAndType(reader.u16()?, reader.u16()?),
                15 => Constant::MethodHandle(reader.u8()?, reader.u16()?),
                16 => Constant::MethodType(reader.u16()?),
                17 => Constant::Dynamic(reader.u16()?, reader.u16()?),
                18 => Constant::InvokeDynamic(reader.u16()?, reader.u16()?),
                19 => Constant::Module(reader.u16()?),
                20 => Constant::Package(reader.u16()?),
                _ => return Err(ClassFormatError::InvalidConstantTag { tag, index }),
            };
            let wide = constant.is_wide();
            pool.lookup.entry(constant.clone()).or_insert(index);
            pool.entries.push(constant);
            if wide {
                pool.entries.push(Constant::Unusable);
                index = index.saturating_add(2);
            } else {
                index += 1;
            }
        }
        Ok(pool)
    }

    pub(crate) fn write(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&(self.entries.len() as u16).to_be_bytes());
        for constant in &self.entries {
            match constant {
                Constant::Unusable => {}
                Constant::Utf8(bytes) => {
                    out.push(1);
                    out.extend_from_slice(&(bytes.len() as u16).to_be_bytes());
                    out.extend_from_slice(bytes);
                }
                Constant::Integer(v) => {
                    out.push(3);
                    out.extend_from_slice(&v.to_be_bytes());
                }
                Constant::Float(bits) => {
                    out.push(4);
                    out.extend_from_slice(&bits.to_be_bytes());
                }
                Constant::Long(v) => {
                    out.push(5);
                    out.extend_from_slice(&v.to_be_bytes());
                }
                Constant::Double(bits) => {
                    out.push(6);
                    out.extend_from_slice(&bits.to_be_bytes());
                }
                Constant::Class(i) => push_tagged(out, 7, &[*i]),
                Constant::String(i) => push_tagged(out, 8, &[*i]),
                Constant::FieldRef(a, b) => push_tagged(out, 9, &[*a, *b]),
                Constant::MethodRef(a, b) => push_tagged(out, 10, &[*a, *b]),
                Constant::InterfaceMethodRef(a, b) => push_tagged(out, 11, &[*a, *b]),
                Constant::NameAndType(a, b) => push_tagged(out, 12, &[*a, *b]),
                Constant::MethodHandle(kind, i) => {
                    out.push(15);
                    out.push(*kind);
                    out.extend_from_slice(&i.to_be_bytes());
                }
                Constant::MethodType(i) => push_tagged(out, 16, &[*i]),
                Constant::Dynamic(a, b) => push_tagged(out, 17, &[*a, *b]),
                Constant::InvokeDynamic(a, b) => push_tagged(out, 18, &[*a, *b]),
                Constant::Module(i) => push_tagged(out, 19, &[*i]),
                Constant::Package(i) => push_tagged(out, 20, &[*i]),
            }
        }
    }
}

fn push_tagged(out: &mut Vec<u8>, tag: u8, operands: &[u16]) {
    out.push(tag);
    for operand in operands {
        out.extend_from_slice(&operand.to_be_bytes());
    }
}

/// Encodes a string the way the JVM stores it: NUL as two bytes and
/// supplementary characters as surrogate pairs.
pub fn encode_modified_utf8(value: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(value.len());
    for unit in value.encode_utf16() {
        match unit {
            0x0001..=0x007F => out.push(unit as u8),
            0x0000 | 0x0080..=0x07FF => {
                out.push(0xC0 | ((unit >> 6) & 0x1F) as u8);
                out.push(0x80 | (unit & 0x3F) as u8);
            }
            _ => {
                out.push(0xE0 | ((unit >> 12) & 0x0F) as u8);
                out.push(0x80 | ((unit >> 6) & 0x3F) as u8);
                out.push(0x80 | (unit & 0x3F) as u8);
            }
        }
    }
    out
}

pub fn decode_modified_utf8(bytes: &[u8]) -> String {
    let mut units = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i];
        if b & 0x80 == 0 {
            units.push(b as u16);
            i += 1;
        } else if b & 0xE0 == 0xC0 && i + 1 < bytes.len() {
            units.push((((b & 0x1F) as u16) << 6) | (bytes[i + 1] & 0x3F) as u16);
            i += 2;
        } else if b & 0xF0 == 0xE0 && i + 2 < bytes.len() {
            units.push(
                (((b & 0x0F) as u16) << 12)
                    | (((bytes[i + 1] & 0x3F) as u16) << 6)
                    | (bytes[i + 2] & 0x3F) as u16,
            );
            i += 3;
        } else {
            units.push(0xFFFD);
            i += 1;
        }
    }
    String::from_utf16_lossy(&units)
}
