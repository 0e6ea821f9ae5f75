//! Emission primitives: symbolic instructions, method assembly with
//! automatic frame computation, annotated field declarations, and a
//! builder that appends them to a parsed class.

pub mod builder;
pub mod field;
pub mod frames;
pub mod insn;
pub mod method;
pub mod walk;

pub use builder::{AddedMembers, ClassBuilder};
pub use field::FieldSpec;
pub use insn::{Insn, Label, MemberRef, Opcode};
pub use method::{CodeBody, MethodBuilder};
