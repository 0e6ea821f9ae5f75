//! Frame computation by abstract interpretation.
//!
//! Every emitted body is interpreted over verification types to derive
//! `max_stack`, `max_locals` and the `StackMapTable` entries for branch
//! targets. The analysis doubles as a structural check: underflow, type
//! confusion, mismatched joins, dead code and fall-through past the last
//! instruction all fail assembly.

use std::collections::{HashMap, VecDeque};

use super::insn::{Insn, Label, Opcode};
use crate::classfile::{ConstantPool, JavaType, MethodDescriptor};
use crate::error::EmissionError;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum VType {
    Top,
    Integer,
    Float,
    Long,
    Double,
    Null,
    UninitializedThis,
    /// Internal name or array descriptor.
    Object(String),
    /// Result of the `new` at this bytecode offset, before its constructor ran.
    Uninitialized(u16),
}

impl VType {
    pub fn of(ty: &JavaType) -> VType {
        match ty {
            JavaType::Boolean
            | JavaType::Byte
            | JavaType::Char
            | JavaType::Short
            | JavaType::Int => VType::Integer,
            JavaType::Float => VType::Float,
            JavaType::Long => VType::Long,
            JavaType::Double => VType::Double,
            JavaType::Object(name) => VType::Object(name.clone()),
            JavaType::Array(desc) => VType::Object(desc.clone()),
            JavaType::Void => VType::Top,
        }
    }

    pub fn is_wide(&self) -> bool {
        matches!(self, VType::Long | VType::Double)
    }

    pub fn is_reference(&self) -> bool {
        matches!(
            self,
            VType::Null | VType::Object(_) | VType::UninitializedThis | VType::Uninitialized(_)
        )
    }

    fn slots(&self) -> usize {
        if self.is_wide() { 2 } else { 1 }
    }

    /// Least upper bound, without a class hierarchy: distinct classes meet
    /// at `java/lang/Object`.
    pub fn merge(&self, other: &VType) -> VType {
        match (self, other) {
            (a, b) if a == b => a.clone(),
            (VType::Null, VType::Object(o)) | (VType::Object(o), VType::Null) => {
                VType::Object(o.clone())
            }
            (VType::Object(_), VType::Object(_)) => VType::Object("java/lang/Object".into()),
            _ => VType::Top,
        }
    }

    fn describe(&self) -> String {
        match self {
            VType::Object(name) => name.clone(),
            VType::Uninitialized(offset) => format!("uninitialized@{offset}"),
            other => format!("{other:?}").to_lowercase(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Frame {
    /// One entry per slot; the second half of a long or double is `Top`.
    pub locals: Vec<VType>,
    /// One entry per value, whatever its width.
    pub stack: Vec<VType>,
}

impl Frame {
    /// Entry frame of a method: `this` (uninitialized inside constructors)
    /// followed by the parameters.
    pub fn entry(this_class: &str, name: &str, is_static: bool, desc: &MethodDescriptor) -> Self {
        let mut frame = Frame::default();
        if !is_static {
            if name == "<init>" && this_class != "java/lang/Object" {
                frame.locals.push(VType::UninitializedThis);
            } else {
                frame.locals.push(VType::Object(this_class.to_string()));
            }
        }
        for param in &desc.params {
            let v = VType::of(param);
            let wide = v.is_wide();
            frame.locals.push(v);
            if wide {
                frame.locals.push(VType::Top);
            }
        }
        frame
    }

    pub fn stack_slots(&self) -> usize {
        self.stack.iter().map(VType::slots).sum()
    }

    /// Locals as written in a stack map: wide values take one entry and
    /// trailing `Top`s are dropped.
    pub fn encoded_locals(&self) -> Vec<VType> {
        let mut out = Vec::with_capacity(self.locals.len());
        let mut i = 0;
        while i < self.locals.len() {
            let v = &self.locals[i];
            out.push(v.clone());
            i += v.slots();
        }
        while out.last() == Some(&VType::Top) {
            out.pop();
        }
        out
    }

    fn push(&mut self, v: VType) {
        self.stack.push(v);
    }

    fn pop(&mut self, index: usize) -> Result<VType, EmissionError> {
        self.stack.pop().ok_or(EmissionError::StackUnderflow(index))
    }

    fn pop_reference(&mut self, index: usize) -> Result<VType, EmissionError> {
        let v = self.pop(index)?;
        if v.is_reference() {
            Ok(v)
        } else {
            Err(mismatch(index, "reference", &v))
        }
    }

    fn pop_category1(&mut self, index: usize) -> Result<VType, EmissionError> {
        let v = self.pop(index)?;
        if v.is_wide() || v == VType::Top {
            Err(mismatch(index, "category 1 value", &v))
        } else {
            Ok(v)
        }
    }

    /// Pops a value assignable to a declared type.
    fn pop_value(&mut self, ty: &JavaType, index: usize) -> Result<VType, EmissionError> {
        let v = self.pop(index)?;
        let (ok, expected) = match VType::of(ty) {
            VType::Object(_) => (v.is_reference(), "reference"),
            VType::Integer => (v == VType::Integer, "int"),
            VType::Float => (v == VType::Float, "float"),
            VType::Long => (v == VType::Long, "long"),
            VType::Double => (v == VType::Double, "double"),
            _ => (false, "value"),
        };
        if ok { Ok(v) } else { Err(mismatch(index, expected, &v)) }
    }

    fn load(&mut self, op: Opcode, slot: u16, index: usize) -> Result<(), EmissionError> {
        let v = self
            .locals
            .get(slot as usize)
            .cloned()
            .unwrap_or(VType::Top);
        let (ok, expected) = match op {
            Opcode::Iload => (v == VType::Integer, "int"),
            Opcode::Lload => (v == VType::Long, "long"),
            Opcode::Fload => (v == VType::Float, "float"),
            Opcode::Dload => (v == VType::Double, "double"),
            _ => (v.is_reference(), "reference"),
        };
        if !ok {
            return Err(mismatch(index, expected, &v));
        }
        self.push(v);
        Ok(())
    }

    fn store(&mut self, op: Opcode, slot: u16, index: usize) -> Result<(), EmissionError> {
        let v = self.pop(index)?;
        let (ok, expected) = match op {
            Opcode::Istore => (v == VType::Integer, "int"),
            Opcode::Lstore => (v == VType::Long, "long"),
            Opcode::Fstore => (v == VType::Float, "float"),
            Opcode::Dstore => (v == VType::Double, "double"),
            _ => (v.is_reference(), "reference"),
        };
        if !ok {
            return Err(mismatch(index, expected, &v));
        }
        let slot = slot as usize;
        let width = v.slots();
        if self.locals.len() < slot + width {
            self.locals.resize(slot + width, VType::Top);
        }
        if slot > 0 && self.locals[slot - 1].is_wide() {
            self.locals[slot - 1] = VType::Top;
        }
        self.locals[slot] = v;
        if width == 2 {
            self.locals[slot + 1] = VType::Top;
        }
        Ok(())
    }

    fn replace(&mut self, from: &VType, to: &VType) {
        for v in self.locals.iter_mut().chain(self.stack.iter_mut()) {
            if v == from {
                *v = to.clone();
            }
        }
    }

    fn trim_locals(&mut self) {
        while self.locals.last() == Some(&VType::Top) {
            let n = self.locals.len();
            if n >= 2 && self.locals[n - 2].is_wide() {
                break;
            }
            self.locals.pop();
        }
    }

    /// Widens `self` to accept `other` as well. Returns whether anything
    /// changed.
    fn merge_from(&mut self, other: &Frame, index: usize) -> Result<bool, EmissionError> {
        if self.stack.len() != other.stack.len() {
            return Err(EmissionError::StackMismatch {
                index,
                expected: self.stack.len(),
                actual: other.stack.len(),
            });
        }
        let before = self.clone();
        for (mine, theirs) in self.stack.iter_mut().zip(&other.stack) {
            *mine = mine.merge(theirs);
        }
        let len = self.locals.len().max(other.locals.len());
        self.locals.resize(len, VType::Top);
        for (i, mine) in self.locals.iter_mut().enumerate() {
            let theirs = other.locals.get(i).unwrap_or(&VType::Top);
            *mine = mine.merge(theirs);
        }
        self.trim_locals();
        Ok(*self != before)
    }
}

fn mismatch(index: usize, expected: &'static str, found: &VType) -> EmissionError {
    EmissionError::TypeMismatch {
        index,
        expected,
        found: found.describe(),
    }
}

fn parse_method(descriptor: &str) -> Result<MethodDescriptor, EmissionError> {
    MethodDescriptor::parse(descriptor).map_err(|_| EmissionError::BadDescriptor(descriptor.into()))
}

fn parse_field(descriptor: &str) -> Result<JavaType, EmissionError> {
    JavaType::from_descriptor(descriptor).map_err(|_| EmissionError::BadDescriptor(descriptor.into()))
}

#[derive(Debug)]
pub struct Analysis {
    pub max_stack: u16,
    pub max_locals: u16,
    /// Frame on entry to each instruction.
    pub frames: Vec<Option<Frame>>,
}

/// Runs the interpreter to a fixed point. `labels` maps each label to the
/// index of its `Mark`; `offsets` gives each instruction's bytecode offset.
pub fn analyze(
    insns: &[Insn],
    offsets: &[usize],
    labels: &HashMap<Label, usize>,
    entry: Frame,
    this_class: &str,
) -> Result<Analysis, EmissionError> {
    let n = insns.len();
    if n == 0 {
        return Err(EmissionError::FallOffEnd);
    }
    let mut frames: Vec<Option<Frame>> = vec![None; n];
    let mut queued = vec![false; n];
    let mut work = VecDeque::from([0usize]);
    let mut max_stack = 0usize;
    let mut max_locals = entry.locals.len();
    frames[0] = Some(entry);
    queued[0] = true;

    while let Some(i) = work.pop_front() {
        queued[i] = false;
        let Some(mut frame) = frames[i].clone() else {
            continue;
        };
        max_stack = max_stack.max(frame.stack_slots());
        execute(&insns[i], &mut frame, i, offsets[i], this_class)?;
        max_stack = max_stack.max(frame.stack_slots());
        max_locals = max_locals.max(frame.locals.len());

        let mut successors = Vec::with_capacity(2);
        let falls_through = insns[i].opcode().is_none_or(|op| !op.ends_block());
        if falls_through {
            successors.push(i + 1);
        }
        if let Insn::Jump(_, label) = &insns[i] {
            let target = labels
                .get(label)
                .copied()
                .ok_or(EmissionError::UnresolvedLabel(label.0))?;
            successors.push(target);
        }
        for s in successors {
            if s >= n {
                return Err(EmissionError::FallOffEnd);
            }
            let changed = if let Some(existing) = frames[s].as_mut() {
                existing.merge_from(&frame, s)?
            } else {
                let mut incoming = frame.clone();
                incoming.trim_locals();
                frames[s] = Some(incoming);
                true
            };
            if changed && !queued[s] {
                queued[s] = true;
                work.push_back(s);
            }
        }
    }

    if let Some(dead) = (0..n).find(|i| frames[*i].is_none() && !matches!(insns[*i], Insn::Mark(_)))
    {
        return Err(EmissionError::Unreachable(dead));
    }

    Ok(Analysis {
        max_stack: u16::try_from(max_stack).map_err(|_| EmissionError::CodeTooLarge(max_stack))?,
        max_locals: u16::try_from(max_locals)
            .map_err(|_| EmissionError::CodeTooLarge(max_locals))?,
        frames,
    })
}

fn execute(
    insn: &Insn,
    frame: &mut Frame,
    index: usize,
    offset: usize,
    this_class: &str,
) -> Result<(), EmissionError> {
    match insn {
        Insn::Mark(_) => {}
        Insn::Simple(op) => match op {
            Opcode::AconstNull => frame.push(VType::Null),
            Opcode::Iconst0 | Opcode::Iconst1 => frame.push(VType::Integer),
            Opcode::Pop => {
                frame.pop_category1(index)?;
            }
            Opcode::Dup => {
                let v = frame.pop_category1(index)?;
                frame.push(v.clone());
                frame.push(v);
            }
            Opcode::Athrow | Opcode::Areturn => {
                frame.pop_reference(index)?;
            }
            Opcode::Ireturn => {
                frame.pop_value(&JavaType::Int, index)?;
            }
            Opcode::Lreturn => {
                frame.pop_value(&JavaType::Long, index)?;
            }
            Opcode::Freturn => {
                frame.pop_value(&JavaType::Float, index)?;
            }
            Opcode::Dreturn => {
                frame.pop_value(&JavaType::Double, index)?;
            }
            Opcode::Return => {}
            other => {
                return Err(EmissionError::TypeMismatch {
                    index,
                    expected: "operand-free instruction",
                    found: format!("{other:?}"),
                });
            }
        },
        Insn::Var(op, slot) => {
            if op.is_load() {
                frame.load(*op, *slot, index)?;
            } else {
                frame.store(*op, *slot, index)?;
            }
        }
        Insn::Field(op, member) => {
            let ty = parse_field(&member.descriptor)?;
            match op {
                Opcode::Getfield => {
                    frame.pop_reference(index)?;
                    frame.push(VType::of(&ty));
                }
                Opcode::Putfield => {
                    frame.pop_value(&ty, index)?;
                    frame.pop_reference(index)?;
                }
                Opcode::Getstatic => frame.push(VType::of(&ty)),
                _ => {
                    frame.pop_value(&ty, index)?;
                }
            }
        }
        Insn::Invoke(op, member) => {
            let desc = parse_method(&member.descriptor)?;
            for param in desc.params.iter().rev() {
                frame.pop_value(param, index)?;
            }
            if *op != Opcode::Invokestatic {
                let receiver = frame.pop_reference(index)?;
                if member.name == "<init>" {
                    let initialized = match &receiver {
                        VType::UninitializedThis => VType::Object(this_class.to_string()),
                        VType::Uninitialized(_) => VType::Object(member.owner.clone()),
                        other => return Err(mismatch(index, "uninitialized reference", other)),
                    };
                    frame.replace(&receiver, &initialized);
                }
            }
            if desc.ret != JavaType::Void {
                frame.push(VType::of(&desc.ret));
            }
        }
        Insn::Type(op, class) => match op {
            Opcode::New => {
                let offset =
                    u16::try_from(offset).map_err(|_| EmissionError::CodeTooLarge(offset))?;
                frame.push(VType::Uninitialized(offset));
            }
            Opcode::Checkcast => {
                frame.pop_reference(index)?;
                frame.push(VType::Object(class.clone()));
            }
            _ => {
                frame.pop_reference(index)?;
                frame.push(VType::Integer);
            }
        },
        Insn::LdcString(_) => frame.push(VType::Object("java/lang/String".into())),
        Insn::Jump(op, _) => match op {
            Opcode::Ifeq | Opcode::Ifne => {
                frame.pop_value(&JavaType::Int, index)?;
            }
            Opcode::IfAcmpeq | Opcode::IfAcmpne => {
                frame.pop_reference(index)?;
                frame.pop_reference(index)?;
            }
            Opcode::Ifnull | Opcode::Ifnonnull => {
                frame.pop_reference(index)?;
            }
            _ => {}
        },
    }
    Ok(())
}

const SAME_FRAME_MAX: usize = 63;
const SAME_LOCALS_1_STACK_ITEM: u8 = 64;
const SAME_LOCALS_1_STACK_ITEM_EXTENDED: u8 = 247;
const SAME_FRAME_EXTENDED: u8 = 251;
const FULL_FRAME: u8 = 255;

/// Encodes the body of a `StackMapTable` attribute. `targets` must be sorted
/// by offset without duplicates.
pub fn encode_stack_map(
    targets: &[(usize, &Frame)],
    entry: &Frame,
    pool: &mut ConstantPool,
) -> Result<Vec<u8>, EmissionError> {
    let mut out = Vec::new();
    out.extend_from_slice(&(targets.len() as u16).to_be_bytes());
    let mut previous_locals = entry.encoded_locals();
    let mut previous_offset: Option<usize> = None;

    for (offset, frame) in targets {
        let delta = match previous_offset {
            None => *offset,
            Some(prev) => offset - prev - 1,
        };
        let delta16 = u16::try_from(delta).map_err(|_| EmissionError::CodeTooLarge(delta))?;
        let locals = frame.encoded_locals();
        let same_locals = locals == previous_locals;

        if same_locals && frame.stack.is_empty() {
            if delta <= SAME_FRAME_MAX {
                out.push(delta as u8);
            } else {
                out.push(SAME_FRAME_EXTENDED);
                out.extend_from_slice(&delta16.to_be_bytes());
            }
        } else if same_locals && frame.stack.len() == 1 {
            if delta <= SAME_FRAME_MAX {
                out.push(SAME_LOCALS_1_STACK_ITEM + delta as u8);
            } else {
                out.push(SAME_LOCALS_1_STACK_ITEM_EXTENDED);
                out.extend_from_slice(&delta16.to_be_bytes());
            }
            write_vtype(&mut out, &frame.stack[0], pool)?;
        } else {
            out.push(FULL_FRAME);
            out.extend_from_slice(&delta16.to_be_bytes());
            out.extend_from_slice(&(locals.len() as u16).to_be_bytes());
            for v in &locals {
                write_vtype(&mut out, v, pool)?;
            }
            out.extend_from_slice(&(frame.stack.len() as u16).to_be_bytes());
            for v in &frame.stack {
                write_vtype(&mut out, v, pool)?;
            }
        }
        previous_locals = locals;
        previous_offset = Some(*offset);
    }
    Ok(out)
}

fn write_vtype(out: &mut Vec<u8>, v: &VType, pool: &mut ConstantPool) -> Result<(), EmissionError> {
    match v {
        VType::Top => out.push(0),
        VType::Integer => out.push(1),
        VType::Float => out.push(2),
        VType::Double => out.push(3),
        VType::Long => out.push(4),
        VType::Null => out.push(5),
        VType::UninitializedThis => out.push(6),
        VType::Object(name) => {
            out.push(7);
            out.extend_from_slice(&pool.class(name)?.to_be_bytes());
        }
        VType::Uninitialized(offset) => {
            out.push(8);
            out.extend_from_slice(&offset.to_be_bytes());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_rules() {
        let a = VType::Object("com/acme/A".into());
        let b = VType::Object("com/acme/B".into());
        assert_eq!(a.merge(&a), a);
        assert_eq!(VType::Null.merge(&a), a);
        assert_eq!(a.merge(&b), VType::Object("java/lang/Object".into()));
        assert_eq!(VType::Integer.merge(&a), VType::Top);
    }

    #[test]
    fn entry_frame_marks_constructor_receiver_uninitialized() {
        let desc = MethodDescriptor::parse("(JLjava/lang/String;)V").unwrap();
        let frame = Frame::entry("com/acme/A", "<init>", false, &desc);
        assert_eq!(
            frame.locals,
            vec![
                VType::UninitializedThis,
                VType::Long,
                VType::Top,
                VType::Object("java/lang/String".into())
            ]
        );
        assert_eq!(frame.encoded_locals().len(), 3);
    }

    #[test]
    fn encoded_locals_drop_trailing_top_but_keep_wide_halves_implicit() {
        let frame = Frame {
            locals: vec![VType::Object("A".into()), VType::Double, VType::Top, VType::Top],
            stack: vec![],
        };
        assert_eq!(
            frame.encoded_locals(),
            vec![VType::Object("A".into()), VType::Double]
        );
    }

    #[test]
    fn same_frame_then_full_frame_encoding() {
        let mut pool = ConstantPool::new();
        let entry = Frame {
            locals: vec![VType::Object("A".into())],
            stack: vec![],
        };
        let grown = Frame {
            locals: vec![VType::Object("A".into()), VType::Integer],
            stack: vec![],
        };
        let bytes = encode_stack_map(&[(5, &entry), (9, &grown)], &entry, &mut pool).unwrap();
        assert_eq!(&bytes[0..2], &[0, 2]);
        assert_eq!(bytes[2], 5);
        assert_eq!(bytes[3], FULL_FRAME);
        assert_eq!(&bytes[4..6], &[0, 3]);
    }
}
