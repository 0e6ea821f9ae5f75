//! Instruction boundaries of existing method bodies.

use std::ops::Range;

use crate::classfile::ByteReader;
use crate::error::ClassFormatError;

/// Byte range of the `code` array inside a `Code` attribute's info.
pub fn code_range(code_attribute: &[u8]) -> Result<Range<usize>, ClassFormatError> {
    let mut r = ByteReader::new(code_attribute);
    let _max_stack = r.u16()?;
    let _max_locals = r.u16()?;
    let len = r.u32()? as usize;
    let start = 8;
    r.bytes(len)?;
    Ok(start..start + len)
}

/// Iterates `(pc, opcode)` over a code array.
pub struct Instructions<'a> {
    code: &'a [u8],
    pc: usize,
}

impl<'a> Instructions<'a> {
    pub fn new(code: &'a [u8]) -> Self {
        Self { code, pc: 0 }
    }
}

impl Iterator for Instructions<'_> {
    type Item = Result<(usize, u8), ClassFormatError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.pc >= self.code.len() {
            return None;
        }
        let pc = self.pc;
        let opcode = self.code[pc];
        match instruction_len(self.code, pc) {
            Ok(len) => {
                self.pc += len;
                Some(Ok((pc, opcode)))
            }
            Err(e) => {
                self.pc = self.code.len();
                Some(Err(e))
            }
        }
    }
}

fn read_i32(code: &[u8], at: usize) -> Result<i32, ClassFormatError> {
    let bytes = code
        .get(at..at + 4)
        .ok_or(ClassFormatError::UnexpectedEnd(at))?;
    Ok(i32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

/// Encoded length of the instruction at `pc`, operands included.
pub fn instruction_len(code: &[u8], pc: usize) -> Result<usize, ClassFormatError> {
    let opcode = *code.get(pc).ok_or(ClassFormatError::UnexpectedEnd(pc))?;
    let len = match opcode {
        0x00..=0x0f => 1,
        0x10 => 2,
        0x11 => 3,
        0x12 => 2,
        0x13 | 0x14 => 3,
        0x15..=0x19 => 2,
        0x1a..=0x35 => 1,
        0x36..=0x3a => 2,
        0x3b..=0x83 => 1,
        0x84 => 3,
        0x85..=0x98 => 1,
        0x99..=0xa8 => 3,
        0xa9 => 2,
        0xaa => {
            let pad = (4 - (pc + 1) % 4) % 4;
            let base = pc + 1 + pad;
            let low = read_i32(code, base + 4)?;
            let high = read_i32(code, base + 8)?;
            if high < low {
                return Err(ClassFormatError::InvalidInstruction { opcode, pc });
            }
            let entries = (high as i64 - low as i64 + 1) as usize;
            1 + pad + 12 + entries * 4
        }
        0xab => {
            let pad = (4 - (pc + 1) % 4) % 4;
            let base = pc + 1 + pad;
            let pairs = read_i32(code, base + 4)?;
            if pairs < 0 {
                return Err(ClassFormatError::InvalidInstruction { opcode, pc });
            }
            1 + pad + 8 + pairs as usize * 8
        }
        0xac..=0xb1 => 1,
        0xb2..=0xb8 => 3,
        0xb9 | 0xba => 5,
        0xbb => 3,
        0xbc => 2,
        0xbd => 3,
        0xbe | 0xbf => 1,
        0xc0 | 0xc1 => 3,
        0xc2 | 0xc3 => 1,
        0xc4 => match code.get(pc + 1) {
            Some(0x84) => 6,
            Some(_) => 4,
            None => return Err(ClassFormatError::UnexpectedEnd(pc + 1)),
        },
        0xc5 => 4,
        0xc6 | 0xc7 => 3,
        0xc8 | 0xc9 => 5,
        0xca => 1,
        _ => return Err(ClassFormatError::InvalidInstruction { opcode, pc }),
    };
    if pc + len > code.len() {
        return Err(ClassFormatError::UnexpectedEnd(code.len()));
    }
    Ok(len)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn walks_switches_and_wide() {
        let mut code = vec![
            0x2a, // aload_0
            0xc4, 0x15, 0x01, 0x00, // wide iload 256
            0xc4, 0x84, 0x01, 0x00, 0x00, 0x01, // wide iinc
        ];
        // tableswitch at pc 11: no pad, default, low=0, high=1, two targets
        code.push(0xaa);
        code.extend_from_slice(&[0; 4]);
        code.extend_from_slice(&0i32.to_be_bytes());
        code.extend_from_slice(&1i32.to_be_bytes());
        code.extend_from_slice(&[0; 8]);
        // lookupswitch at pc 32: three pad bytes, default, one pair
        code.push(0xab);
        code.extend_from_slice(&[0; 3]);
        code.extend_from_slice(&[0; 4]);
        code.extend_from_slice(&1i32.to_be_bytes());
        code.extend_from_slice(&[0; 8]);
        code.push(0xb1);

        let pcs: Vec<usize> = Instructions::new(&code)
            .map(|r| r.unwrap().0)
            .collect();
        assert_eq!(pcs, vec![0, 1, 5, 11, 32, 52]);
    }

    #[test]
    fn truncated_operand_is_reported() {
        let code = [0xb4, 0x00];
        let err = Instructions::new(&code).next().unwrap().unwrap_err();
        assert!(matches!(err, ClassFormatError::UnexpectedEnd(_)));
    }

    #[test]
    fn code_range_skips_header() {
        let mut info = vec![0, 1, 0, 1, 0, 0, 0, 2, 0x2a, 0xb0];
        info.extend_from_slice(&[0, 0, 0, 0]);
        assert_eq!(code_range(&info).unwrap(), 8..10);
    }
}
