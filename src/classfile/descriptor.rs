//! Field and method descriptors.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::emit::Opcode;
use crate::error::ClassFormatError;

/// Declared type of a field, parameter or return value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum JavaType {
    Boolean,
    Byte,
    Char,
    Short,
    Int,
    Long,
    Float,
    Double,
    Void,
    /// Internal name, e.g. `java/lang/String`.
    Object(String),
    /// Full array descriptor, e.g. `[Ljava/lang/String;`.
    Array(String),
}

impl JavaType {
    pub fn object(internal_name: &str) -> Self {
        JavaType::Object(internal_name.replace('.', "/"))
    }

    pub fn from_descriptor(descriptor: &str) -> Result<Self, ClassFormatError> {
        let (ty, used) = parse_one(descriptor, 0)?;
        if used != descriptor.len() {
            return Err(ClassFormatError::InvalidDescriptor(descriptor.to_string()));
        }
        Ok(ty)
    }

    /// Accepts Java source spellings (`int`, `java.util.List`, `byte[]`).
    pub fn from_java_name(name: &str) -> Result<Self, ClassFormatError> {
        let name = name.trim();
        if let Some(element) = name.strip_suffix("[]") {
            let element = JavaType::from_java_name(element)?;
            if element == JavaType::Void {
                return Err(ClassFormatError::InvalidDescriptor(name.to_string()));
            }
            return Ok(JavaType::Array(format!("[{}", element.descriptor())));
        }
        let ty = match name {
            "boolean" => JavaType::Boolean,
            "byte" => JavaType::Byte,
            "char" => JavaType::Char,
            "short" => JavaType::Short,
            "int" => JavaType::Int,
            "long" => JavaType::Long,
            "float" => JavaType::Float,
            "double" => JavaType::Double,
            "void" => JavaType::Void,
            "" => return Err(ClassFormatError::InvalidDescriptor(name.to_string())),
            other => JavaType::object(other),
        };
        Ok(ty)
    }

    pub fn descriptor(&self) -> String {
        match self {
            JavaType::Boolean => "Z".to_string(),
            JavaType::Byte => "B".to_string(),
            JavaType::Char => "C".to_string(),
            JavaType::Short => "S".to_string(),
            JavaType::Int => "I".to_string(),
            JavaType::Long => "J".to_string(),
            JavaType::Float => "F".to_string(),
            JavaType::Double => "D".to_string(),
            JavaType::Void => "V".to_string(),
            JavaType::Object(name) => format!("L{name};"),
            JavaType::Array(desc) => desc.clone(),
        }
    }

    /// Operand of `checkcast`/`new`: the internal name, or the descriptor
    /// for arrays.
    pub fn class_operand(&self) -> Option<String> {
        match self {
            JavaType::Object(name) => Some(name.clone()),
            JavaType::Array(desc) => Some(desc.clone()),
            _ => None,
        }
    }

    pub fn is_primitive(&self) -> bool {
        !matches!(self, JavaType::Object(_) | JavaType::Array(_) | JavaType::Void)
    }

    pub fn is_reference(&self) -> bool {
        matches!(self, JavaType::Object(_) | JavaType::Array(_))
    }

    /// Local variable slots occupied.
    pub fn size(&self) -> u16 {
        match self {
            JavaType::Void => 0,
            JavaType::Long | JavaType::Double => 2,
            _ => 1,
        }
    }

    /// Boxed counterpart of a primitive.
    pub fn wrapper(&self) -> Option<&'static str> {
        Some(match self {
            JavaType::Boolean => "java/lang/Boolean",
            JavaType::Byte => "java/lang/Byte",
            JavaType::Char => "java/lang/Character",
            JavaType::Short => "java/lang/Short",
            JavaType::Int => "java/lang/Integer",
            JavaType::Long => "java/lang/Long",
            JavaType::Float => "java/lang/Float",
            JavaType::Double => "java/lang/Double",
            _ => return None,
        })
    }

    /// Method on the wrapper returning the primitive value.
    pub fn unbox_method(&self) -> Option<&'static str> {
        Some(match self {
            JavaType::Boolean => "booleanValue",
            JavaType::Byte => "byteValue",
            JavaType::Char => "charValue",
            JavaType::Short => "shortValue",
            JavaType::Int => "intValue",
            JavaType::Long => "longValue",
            JavaType::Float => "floatValue",
            JavaType::Double => "doubleValue",
            _ => return None,
        })
    }

    pub fn load_opcode(&self) -> Opcode {
        match self {
            JavaType::Long => Opcode::Lload,
            JavaType::Float => Opcode::Fload,
            JavaType::Double => Opcode::Dload,
            JavaType::Object(_) | JavaType::Array(_) => Opcode::Aload,
            _ => Opcode::Iload,
        }
    }

    pub fn store_opcode(&self) -> Opcode {
        match self {
            JavaType::Long => Opcode::Lstore,
            JavaType::Float => Opcode::Fstore,
            JavaType::Double => Opcode::Dstore,
            JavaType::Object(_) | JavaType::Array(_) => Opcode::Astore,
            _ => Opcode::Istore,
        }
    }

    pub fn return_opcode(&self) -> Opcode {
        match self {
            JavaType::Void => Opcode::Return,
            JavaType::Long => Opcode::Lreturn,
            JavaType::Float => Opcode::Freturn,
            JavaType::Double => Opcode::Dreturn,
            JavaType::Object(_) | JavaType::Array(_) => Opcode::Areturn,
            _ => Opcode::Ireturn,
        }
    }
}

impl fmt::Display for JavaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.descriptor())
    }
}

impl FromStr for JavaType {
    type Err = ClassFormatError;

    /// Descriptors first, then Java source spellings.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let looks_like_descriptor = s.starts_with('[')
            || (s.starts_with('L') && s.ends_with(';'))
            || (s.len() == 1 && "ZBCSIJFDV".contains(s));
        if looks_like_descriptor {
            JavaType::from_descriptor(s)
        } else {
            JavaType::from_java_name(s)
        }
    }
}

impl TryFrom<String> for JavaType {
    type Error = ClassFormatError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<JavaType> for String {
    fn from(value: JavaType) -> Self {
        value.descriptor()
    }
}

fn parse_one(descriptor: &str, start: usize) -> Result<(JavaType, usize), ClassFormatError> {
    let bytes = descriptor.as_bytes();
    let invalid = || ClassFormatError::InvalidDescriptor(descriptor.to_string());
    let tag = *bytes.get(start).ok_or_else(invalid)?;
    let ty = match tag {
        b'Z' => JavaType::Boolean,
        b'B' => JavaType::Byte,
        b'C' => JavaType::Char,
        b'S' => JavaType::Short,
        b'I' => JavaType::Int,
        b'J' => JavaType::Long,
        b'F' => JavaType::Float,
        b'D' => JavaType::Double,
        b'V' => JavaType::Void,
        b'L' => {
            let end = descriptor[start..].find(';').ok_or_else(invalid)? + start;
            if end == start + 1 {
                return Err(invalid());
            }
            return Ok((JavaType::Object(descriptor[start + 1..end].to_string()), end + 1));
        }
        b'[' => {
            let mut element = start;
            while bytes.get(element) == Some(&b'[') {
                element += 1;
            }
            let (inner, end) = parse_one(descriptor, element)?;
            if inner == JavaType::Void {
                return Err(invalid());
            }
            return Ok((JavaType::Array(descriptor[start..end].to_string()), end));
        }
        _ => return Err(invalid()),
    };
    Ok((ty, start + 1))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodDescriptor {
    pub params: Vec<JavaType>,
    pub ret: JavaType,
}

impl MethodDescriptor {
    pub fn new(params: Vec<JavaType>, ret: JavaType) -> Self {
        Self { params, ret }
    }

    pub fn parse(descriptor: &str) -> Result<Self, ClassFormatError> {
        let invalid = || ClassFormatError::InvalidDescriptor(descriptor.to_string());
        if !descriptor.starts_with('(') {
            return Err(invalid());
        }
        let mut pos = 1;
        let mut params = Vec::new();
        while descriptor.as_bytes().get(pos) != Some(&b')') {
            let (ty, next) = parse_one(descriptor, pos)?;
            if ty == JavaType::Void {
                return Err(invalid());
            }
            params.push(ty);
            pos = next;
        }
        let (ret, end) = parse_one(descriptor, pos + 1)?;
        if end != descriptor.len() {
            return Err(invalid());
        }
        Ok(Self { params, ret })
    }

    /// Slots taken by the arguments, excluding `this`.
    pub fn arg_slots(&self) -> u16 {
        self.params.iter().map(JavaType::size).sum()
    }
}

impl fmt::Display for MethodDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("(")?;
        for p in &self.params {
            f.write_str(&p.descriptor())?;
        }
        write!(f, "){}", self.ret.descriptor())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_descriptors_and_java_names_alike() {
        assert_eq!("I".parse::<JavaType>().unwrap(), JavaType::Int);
        assert_eq!("int".parse::<JavaType>().unwrap(), JavaType::Int);
        assert_eq!(
            "com.acme.Employee".parse::<JavaType>().unwrap(),
            JavaType::Object("com/acme/Employee".into())
        );
        assert_eq!(
            "Ljava/util/List;".parse::<JavaType>().unwrap(),
            JavaType::Object("java/util/List".into())
        );
        assert_eq!(
            "java.lang.String[][]".parse::<JavaType>().unwrap(),
            JavaType::Array("[[Ljava/lang/String;".into())
        );
        assert!("[V".parse::<JavaType>().is_err());
        assert!("L;".parse::<JavaType>().is_err());
    }

    #[test]
    fn method_descriptor_counts_wide_slots() {
        let md = MethodDescriptor::parse("(JLjava/lang/String;[ID)V").unwrap();
        assert_eq!(md.params.len(), 4);
        assert_eq!(md.arg_slots(), 6);
        assert_eq!(md.ret, JavaType::Void);
        assert_eq!(md.to_string(), "(JLjava/lang/String;[ID)V");
        assert!(MethodDescriptor::parse("(I").is_err());
        assert!(MethodDescriptor::parse("(I)VX").is_err());
    }

    #[test]
    fn primitive_boxing_table() {
        assert_eq!(JavaType::Char.wrapper(), Some("java/lang/Character"));
        assert_eq!(JavaType::Char.unbox_method(), Some("charValue"));
        assert_eq!(JavaType::object("java.lang.String").wrapper(), None);
        assert_eq!(JavaType::Double.return_opcode(), Opcode::Dreturn);
        assert_eq!(JavaType::Boolean.load_opcode(), Opcode::Iload);
    }
}
