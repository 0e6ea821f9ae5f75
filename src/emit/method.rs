use std::collections::{BTreeMap, HashMap};

use super::frames::{analyze, encode_stack_map, Frame};
use super::insn::{Insn, Label, MemberRef, Opcode};
use crate::classfile::access::ACC_STATIC;
use crate::classfile::{
    AttributeInfo, CODE_ATTRIBUTE, ConstantPool, JavaType, MemberInfo, MethodDescriptor,
    STACK_MAP_TABLE_ATTRIBUTE,
};
use crate::error::EmissionError;

const MAX_CODE_LENGTH: usize = 65535;

/// Accumulates one method body. Nothing is checked until [`assemble`].
///
/// [`assemble`]: MethodBuilder::assemble
#[derive(Debug, Clone)]
pub struct MethodBuilder {
    access: u16,
    name: String,
    descriptor: String,
    insns: Vec<Insn>,
    next_label: u32,
}

/// An assembled `Code` attribute body.
#[derive(Debug, Clone)]
pub struct CodeBody {
    pub max_stack: u16,
    pub max_locals: u16,
    pub code: Vec<u8>,
    pub stack_map: Option<Vec<u8>>,
}

impl MethodBuilder {
    pub fn new(access: u16, name: impl Into<String>, descriptor: impl Into<String>) -> Self {
        Self {
            access,
            name: name.into(),
            descriptor: descriptor.into(),
            insns: Vec::new(),
            next_label: 0,
        }
    }

    pub fn access(&self) -> u16 {
        self.access
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn descriptor(&self) -> &str {
        &self.descriptor
    }

    pub fn insns(&self) -> &[Insn] {
        &self.insns
    }

    pub fn new_label(&mut self) -> Label {
        let label = Label(self.next_label);
        self.next_label += 1;
        label
    }

    pub fn mark(&mut self, label: Label) -> &mut Self {
        self.insns.push(Insn::Mark(label));
        self
    }

    pub fn op(&mut self, op: Opcode) -> &mut Self {
        self.insns.push(Insn::Simple(op));
        self
    }

    pub fn var(&mut self, op: Opcode, slot: u16) -> &mut Self {
        self.insns.push(Insn::Var(op, slot));
        self
    }

    pub fn aload(&mut self, slot: u16) -> &mut Self {
        self.var(Opcode::Aload, slot)
    }

    pub fn load(&mut self, ty: &JavaType, slot: u16) -> &mut Self {
        self.var(ty.load_opcode(), slot)
    }

    pub fn get_field(&mut self, owner: &str, name: &str, descriptor: &str) -> &mut Self {
        self.insns
            .push(Insn::Field(Opcode::Getfield, MemberRef::new(owner, name, descriptor)));
        self
    }

    pub fn put_field(&mut self, owner: &str, name: &str, descriptor: &str) -> &mut Self {
        self.insns
            .push(Insn::Field(Opcode::Putfield, MemberRef::new(owner, name, descriptor)));
        self
    }

    pub fn invoke(&mut self, op: Opcode, owner: &str, name: &str, descriptor: &str) -> &mut Self {
        self.insns
            .push(Insn::Invoke(op, MemberRef::new(owner, name, descriptor)));
        self
    }

    pub fn invoke_virtual(&mut self, owner: &str, name: &str, descriptor: &str) -> &mut Self {
        self.invoke(Opcode::Invokevirtual, owner, name, descriptor)
    }

    pub fn invoke_special(&mut self, owner: &str, name: &str, descriptor: &str) -> &mut Self {
        self.invoke(Opcode::Invokespecial, owner, name, descriptor)
    }

    pub fn invoke_static(&mut self, owner: &str, name: &str, descriptor: &str) -> &mut Self {
        self.invoke(Opcode::Invokestatic, owner, name, descriptor)
    }

    pub fn invoke_interface(&mut self, owner: &str, name: &str, descriptor: &str) -> &mut Self {
        self.invoke(Opcode::Invokeinterface, owner, name, descriptor)
    }

    pub fn new_object(&mut self, class: &str) -> &mut Self {
        self.insns.push(Insn::Type(Opcode::New, class.to_string()));
        self
    }

    pub fn checkcast(&mut self, class: &str) -> &mut Self {
        self.insns.push(Insn::Type(Opcode::Checkcast, class.to_string()));
        self
    }

    pub fn ldc(&mut self, value: &str) -> &mut Self {
        self.insns.push(Insn::LdcString(value.to_string()));
        self
    }

    pub fn jump(&mut self, op: Opcode, label: Label) -> &mut Self {
        self.insns.push(Insn::Jump(op, label));
        self
    }

    pub fn ret(&mut self, ty: &JavaType) -> &mut Self {
        self.op(ty.return_opcode())
    }

    /// Interns operands, lays out the body, computes frames and encodes it.
    pub fn assemble(
        &self,
        this_class: &str,
        pool: &mut ConstantPool,
        emit_frames: bool,
    ) -> Result<CodeBody, EmissionError> {
        let desc = MethodDescriptor::parse(&self.descriptor)
            .map_err(|_| EmissionError::BadDescriptor(self.descriptor.clone()))?;

        let mut operands = Vec::with_capacity(self.insns.len());
        for insn in &self.insns {
            let index = match insn {
                Insn::Field(_, m) => pool.field_ref(&m.owner, &m.name, &m.descriptor)?,
                Insn::Invoke(op, m) => pool.method_ref(
                    &m.owner,
                    &m.name,
                    &m.descriptor,
                    *op == Opcode::Invokeinterface,
                )?,
                Insn::Type(_, class) => pool.class(class)?,
                Insn::LdcString(value) => pool.string(value)?,
                _ => 0,
            };
            operands.push(index);
        }

        let mut offsets = Vec::with_capacity(self.insns.len());
        let mut labels: HashMap<Label, usize> = HashMap::new();
        let mut pc = 0usize;
        for (i, insn) in self.insns.iter().enumerate() {
            offsets.push(pc);
            if let Insn::Mark(label) = insn
                && labels.insert(*label, i).is_some()
            {
                return Err(EmissionError::DuplicateLabel(label.0));
            }
            pc += encoded_len(insn, operands[i]);
        }
        if pc > MAX_CODE_LENGTH {
            return Err(EmissionError::CodeTooLarge(pc));
        }
        for insn in &self.insns {
            if let Insn::Jump(_, label) = insn
                && !labels.contains_key(label)
            {
                return Err(EmissionError::UnresolvedLabel(label.0));
            }
        }

        let entry = Frame::entry(this_class, &self.name, self.access & ACC_STATIC != 0, &desc);
        let analysis = analyze(&self.insns, &offsets, &labels, entry.clone(), this_class)?;

        let mut code = Vec::with_capacity(pc);
        for (i, insn) in self.insns.iter().enumerate() {
            encode(&mut code, insn, operands[i], offsets[i], &offsets, &labels)?;
        }

        let stack_map = if emit_frames {
            let mut targets: BTreeMap<usize, &Frame> = BTreeMap::new();
            for insn in &self.insns {
                let Insn::Jump(_, label) = insn else {
                    continue;
                };
                let mut at = labels[label];
                while matches!(self.insns[at], Insn::Mark(_)) && at + 1 < self.insns.len() {
                    at += 1;
                }
                let frame = analysis.frames[at]
                    .as_ref()
                    .ok_or(EmissionError::Unreachable(at))?;
                targets.insert(offsets[at], frame);
            }
            if targets.is_empty() {
                None
            } else {
                let targets: Vec<(usize, &Frame)> = targets.into_iter().collect();
                Some(encode_stack_map(&targets, &entry, pool)?)
            }
        } else {
            None
        };

        Ok(CodeBody {
            max_stack: analysis.max_stack,
            max_locals: analysis.max_locals,
            code,
            stack_map,
        })
    }

    /// Assembles the body and wraps it into a method slot.
    pub fn into_member(
        self,
        this_class: &str,
        pool: &mut ConstantPool,
        emit_frames: bool,
    ) -> Result<MemberInfo, EmissionError> {
        let body = self.assemble(this_class, pool, emit_frames)?;
        Ok(MemberInfo {
            access_flags: self.access,
            name_index: pool.utf8(&self.name)?,
            descriptor_index: pool.utf8(&self.descriptor)?,
            attributes: vec![body.into_attribute(pool)?],
        })
    }
}

impl CodeBody {
    pub fn into_attribute(self, pool: &mut ConstantPool) -> Result<AttributeInfo, EmissionError> {
        let mut info = Vec::with_capacity(self.code.len() + 32);
        info.extend_from_slice(&self.max_stack.to_be_bytes());
        info.extend_from_slice(&self.max_locals.to_be_bytes());
        info.extend_from_slice(&(self.code.len() as u32).to_be_bytes());
        info.extend_from_slice(&self.code);
        info.extend_from_slice(&0u16.to_be_bytes());
        match self.stack_map {
            Some(table) => {
                info.extend_from_slice(&1u16.to_be_bytes());
                info.extend_from_slice(&pool.utf8(STACK_MAP_TABLE_ATTRIBUTE)?.to_be_bytes());
                info.extend_from_slice(&(table.len() as u32).to_be_bytes());
                info.extend_from_slice(&table);
            }
            None => info.extend_from_slice(&0u16.to_be_bytes()),
        }
        Ok(AttributeInfo {
            name_index: pool.utf8(CODE_ATTRIBUTE)?,
            info,
        })
    }
}

fn encoded_len(insn: &Insn, operand: u16) -> usize {
    match insn {
        Insn::Mark(_) => 0,
        Insn::Simple(_) => 1,
        Insn::Var(op, slot) => {
            if op.short_var_form(*slot).is_some() {
                1
            } else if *slot <= u8::MAX as u16 {
                2
            } else {
                4
            }
        }
        Insn::Invoke(Opcode::Invokeinterface, _) => 5,
        Insn::Field(..) | Insn::Invoke(..) | Insn::Type(..) | Insn::Jump(..) => 3,
        Insn::LdcString(_) => {
            if operand <= u8::MAX as u16 {
                2
            } else {
                3
            }
        }
    }
}

fn encode(
    out: &mut Vec<u8>,
    insn: &Insn,
    operand: u16,
    offset: usize,
    offsets: &[usize],
    labels: &HashMap<Label, usize>,
) -> Result<(), EmissionError> {
    match insn {
        Insn::Mark(_) => {}
        Insn::Simple(op) => out.push(op.byte()),
        Insn::Var(op, slot) => {
            if let Some(short) = op.short_var_form(*slot) {
                out.push(short);
            } else if *slot <= u8::MAX as u16 {
                out.push(op.byte());
                out.push(*slot as u8);
            } else {
                out.push(Opcode::Wide.byte());
                out.push(op.byte());
                out.extend_from_slice(&slot.to_be_bytes());
            }
        }
        Insn::Invoke(Opcode::Invokeinterface, m) => {
            let desc = MethodDescriptor::parse(&m.descriptor)
                .map_err(|_| EmissionError::BadDescriptor(m.descriptor.clone()))?;
            out.push(Opcode::Invokeinterface.byte());
            out.extend_from_slice(&operand.to_be_bytes());
            out.push((desc.arg_slots() + 1) as u8);
            out.push(0);
        }
        Insn::Field(op, _) | Insn::Invoke(op, _) | Insn::Type(op, _) => {
            out.push(op.byte());
            out.extend_from_slice(&operand.to_be_bytes());
        }
        Insn::LdcString(_) => {
            if operand <= u8::MAX as u16 {
                out.push(Opcode::Ldc.byte());
                out.push(operand as u8);
            } else {
                out.push(Opcode::LdcW.byte());
                out.extend_from_slice(&operand.to_be_bytes());
            }
        }
        Insn::Jump(op, label) => {
            let target = labels
                .get(label)
                .ok_or(EmissionError::UnresolvedLabel(label.0))?;
            let delta = offsets[*target] as i64 - offset as i64;
            let delta16 = i16::try_from(delta)
                .map_err(|_| EmissionError::BranchOutOfRange { offset, delta })?;
            out.push(op.byte());
            out.extend_from_slice(&delta16.to_be_bytes());
        }
    }
    Ok(())
}
