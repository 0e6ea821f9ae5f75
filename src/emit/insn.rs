//! Symbolic instructions. Operands stay as strings until assembly interns
//! them into the constant pool.

/// The subset of the JVM instruction set the weaver emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Opcode {
    AconstNull = 0x01,
    Iconst0 = 0x03,
    Iconst1 = 0x04,
    Ldc = 0x12,
    LdcW = 0x13,
    Iload = 0x15,
    Lload = 0x16,
    Fload = 0x17,
    Dload = 0x18,
    Aload = 0x19,
    Istore = 0x36,
    Lstore = 0x37,
    Fstore = 0x38,
    Dstore = 0x39,
    Astore = 0x3a,
    Pop = 0x57,
    Dup = 0x59,
    Ifeq = 0x99,
    Ifne = 0x9a,
    IfAcmpeq = 0xa5,
    IfAcmpne = 0xa6,
    Goto = 0xa7,
    Ireturn = 0xac,
    Lreturn = 0xad,
    Freturn = 0xae,
    Dreturn = 0xaf,
    Areturn = 0xb0,
    Return = 0xb1,
    Getstatic = 0xb2,
    Putstatic = 0xb3,
    Getfield = 0xb4,
    Putfield = 0xb5,
    Invokevirtual = 0xb6,
    Invokespecial = 0xb7,
    Invokestatic = 0xb8,
    Invokeinterface = 0xb9,
    New = 0xbb,
    Athrow = 0xbf,
    Checkcast = 0xc0,
    Instanceof = 0xc1,
    Wide = 0xc4,
    Ifnull = 0xc6,
    Ifnonnull = 0xc7,
}

impl Opcode {
    pub fn byte(self) -> u8 {
        self as u8
    }

    pub fn is_return(self) -> bool {
        matches!(
            self,
            Opcode::Ireturn
                | Opcode::Lreturn
                | Opcode::Freturn
                | Opcode::Dreturn
                | Opcode::Areturn
                | Opcode::Return
        )
    }

    /// Control never reaches the next instruction.
    pub fn ends_block(self) -> bool {
        self.is_return() || matches!(self, Opcode::Goto | Opcode::Athrow)
    }

    pub fn is_load(self) -> bool {
        matches!(
            self,
            Opcode::Iload | Opcode::Lload | Opcode::Fload | Opcode::Dload | Opcode::Aload
        )
    }

    pub fn is_store(self) -> bool {
        matches!(
            self,
            Opcode::Istore | Opcode::Lstore | Opcode::Fstore | Opcode::Dstore | Opcode::Astore
        )
    }

    /// `iload_0`-style single byte form for slots 0 to 3.
    pub(crate) fn short_var_form(self, index: u16) -> Option<u8> {
        if index > 3 {
            return None;
        }
        let n = index as u8;
        if self.is_load() {
            Some(0x1a + (self.byte() - Opcode::Iload.byte()) * 4 + n)
        } else if self.is_store() {
            Some(0x3b + (self.byte() - Opcode::Istore.byte()) * 4 + n)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Label(pub(crate) u32);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberRef {
    pub owner: String,
    pub name: String,
    pub descriptor: String,
}

impl MemberRef {
    pub fn new(owner: &str, name: &str, descriptor: &str) -> Self {
        Self {
            owner: owner.to_string(),
            name: name.to_string(),
            descriptor: descriptor.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Insn {
    /// No operand: constants, stack ops, returns.
    Simple(Opcode),
    /// Local variable load or store.
    Var(Opcode, u16),
    Field(Opcode, MemberRef),
    Invoke(Opcode, MemberRef),
    /// `new`, `checkcast`, `instanceof` with an internal class name.
    Type(Opcode, String),
    LdcString(String),
    Jump(Opcode, Label),
    /// Binds a label to the next instruction.
    Mark(Label),
}

impl Insn {
    pub fn opcode(&self) -> Option<Opcode> {
        match self {
            Insn::Simple(op)
            | Insn::Var(op, _)
            | Insn::Field(op, _)
            | Insn::Invoke(op, _)
            | Insn::Type(op, _)
            | Insn::Jump(op, _) => Some(*op),
            Insn::LdcString(_) => Some(Opcode::Ldc),
            Insn::Mark(_) => None,
        }
    }
}
