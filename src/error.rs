//! Error taxonomy for the weaving library.
//!
//! Every variant here is fatal for the class being transformed: the engine does
//! no local recovery, and a class that fails is never written out half-woven.
//! Environment and version problems are not errors; they are logged and a safe
//! default is used instead.

use thiserror::Error;

/// Malformed or truncated class-file input.
#[derive(Debug, Error)]
pub enum ClassFormatError {
    #[error("Unexpected end of class data at offset {0}")]
    UnexpectedEnd(usize),

    #[error("Invalid magic number {0:#010x}")]
    InvalidMagic(u32),

    #[error("Invalid constant pool tag {tag} at index {index}")]
    InvalidConstantTag { tag: u8, index: u16 },

    #[error("Constant pool index {index} is not a {expected} entry")]
    BadConstantRef { index: u16, expected: &'static str },

    #[error("Invalid descriptor: {0}")]
    InvalidDescriptor(String),

    #[error("{0} trailing bytes after class data")]
    TrailingBytes(usize),

    #[error("Invalid instruction {opcode:#04x} at pc {pc}")]
    InvalidInstruction { opcode: u8, pc: usize },
}

/// A fault in the engine's own output. These indicate a defect in the
/// weaver, never a problem with user input.
#[derive(Debug, Error)]
pub enum EmissionError {
    #[error("Label {0} is referenced but never bound")]
    UnresolvedLabel(u32),

    #[error("Label {0} is bound more than once")]
    DuplicateLabel(u32),

    #[error("Branch at offset {offset} cannot reach its target ({delta} bytes)")]
    BranchOutOfRange { offset: usize, delta: i64 },

    #[error("Stack underflow at instruction {0}")]
    StackUnderflow(usize),

    #[error("Stack height mismatch at instruction {index}: {expected} vs {actual}")]
    StackMismatch {
        index: usize,
        expected: usize,
        actual: usize,
    },

    #[error("Type mismatch at instruction {index}: expected {expected}, found {found}")]
    TypeMismatch {
        index: usize,
        expected: &'static str,
        found: String,
    },

    #[error("Execution falls off the end of the method")]
    FallOffEnd,

    #[error("Instruction {0} is unreachable")]
    Unreachable(usize),

    #[error("Constant pool overflow")]
    ConstantPoolOverflow,

    #[error("Method body too large ({0} bytes)")]
    CodeTooLarge(usize),

    #[error("Malformed descriptor {0}")]
    BadDescriptor(String),
}

/// Inconsistent descriptor model handed over by the metadata pipeline.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("Failed to parse weaving model: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Duplicate class descriptor {0}")]
    DuplicateClass(String),

    #[error("Class {class} declares attribute {attribute} twice")]
    DuplicateAttributeName { class: String, attribute: String },

    #[error("Class {class} names superclass {superclass} which has no descriptor")]
    MissingSuperclass { class: String, superclass: String },

    #[error("Superclass chain of {0} is cyclic")]
    CyclicHierarchy(String),

    #[error("Attribute {attribute} of {class} is also declared by ancestor {ancestor}")]
    DuplicateAttribute {
        class: String,
        attribute: String,
        ancestor: String,
    },

    #[error("Attribute {attribute} of {class} requests a value holder but has type {descriptor}")]
    PrimitiveValueHolder {
        class: String,
        attribute: String,
        descriptor: String,
    },

    #[error("Lazy attribute {attribute} of {class} has neither a field nor accessors")]
    UnreachableValueHolder { class: String, attribute: String },

    #[error("{class} enables {capability} weaving but its superclass {superclass} does not")]
    CapabilityNotInherited {
        class: String,
        capability: &'static str,
        superclass: String,
    },
}

/// Failure of one class transformation, with enough context to diagnose it
/// without re-running.
#[derive(Debug, Error)]
pub enum WeaveError {
    #[error("Malformed class file: {0}")]
    ClassFormat(#[from] ClassFormatError),

    #[error("Invalid weaving model: {0}")]
    Model(#[from] ModelError),

    #[error("No weaving descriptor for class {0}")]
    UnknownClass(String),

    #[error("Class file declares {found} but descriptor is for {expected}")]
    ClassMismatch { expected: String, found: String },

    #[error("{class} already declares {name}{descriptor}")]
    DuplicateMember {
        class: String,
        name: String,
        descriptor: String,
    },

    #[error("Failed to emit {member} in {class}: {source}")]
    Emission {
        class: String,
        member: String,
        #[source]
        source: EmissionError,
    },
}

impl WeaveError {
    pub(crate) fn emission(class: &str, member: &str, source: EmissionError) -> Self {
        WeaveError::Emission {
            class: class.to_string(),
            member: member.to_string(),
            source,
        }
    }
}
