//! Method bodies: instruction walking and line-number tables

use super::constant_pool::ConstantPool;
use super::error::ClassFileError;
use super::reader::ClassReader;

/// The parts of a `Code` attribute needed to locate type references
pub(crate) struct CodeAttribute<'a> {
    code: &'a [u8],
    /// `(start_pc, line)` in table order
    line_numbers: Vec<(u16, u16)>,
}

impl<'a> CodeAttribute<'a> {
    pub(crate) fn parse(body: &'a [u8], pool: &ConstantPool) -> Result<Self, ClassFileError> {
        let mut reader = ClassReader::new(body);
        reader.skip(4)?; // max_stack, max_locals
        let length = reader.read_u4()? as usize;
        let code = reader.read_slice(length)?;
        let handlers = reader.read_u2()? as usize;
        reader.skip(handlers * 8)?;

        let mut line_numbers = Vec::new();
        let attributes = reader.read_u2()?;
        for _ in 0..attributes {
            let (name_index, attribute) = reader.read_attribute()?;
            if pool.utf8(name_index)? == "LineNumberTable" {
                let mut table = ClassReader::new(attribute);
                let count = table.read_u2()?;
                for _ in 0..count {
                    line_numbers.push((table.read_u2()?, table.read_u2()?));
                }
            }
        }

        Ok(Self { code, line_numbers })
    }

    /// Offset of the first instruction that refers to `binary_name`
    pub(crate) fn first_reference(
        &self,
        pool: &ConstantPool,
        binary_name: &str,
    ) -> Result<Option<usize>, ClassFileError> {
        let array_element = format!("L{};", binary_name);
        let matches = |name: &str| {
            name == binary_name || (name.starts_with('[') && name.ends_with(&array_element))
        };

        let mut pc = 0;
        while pc < self.code.len() {
            let opcode = self.code[pc];
            let referenced = match opcode {
                // ldc
                0x12 => pool.loadable_class(u16::from(self.byte(pc + 1)?)),
                // ldc_w, ldc2_w
                0x13 | 0x14 => pool.loadable_class(self.index(pc + 1)?),
                // getstatic .. invokeinterface, invokedynamic excluded
                0xb2..=0xb9 => Some(pool.member_owner(self.index(pc + 1)?)?),
                // new, anewarray, checkcast, instanceof, multianewarray
                0xbb | 0xbd | 0xc0 | 0xc1 | 0xc5 => Some(pool.class_name(self.index(pc + 1)?)?),
                _ => None,
            };
            if referenced.is_some_and(|name| matches(name)) {
                return Ok(Some(pc));
            }
            pc += self.instruction_length(pc)?;
        }
        Ok(None)
    }

    pub(crate) fn has_line_numbers(&self) -> bool {
        !self.line_numbers.is_empty()
    }

    /// Source line of the instruction at `pc`
    pub(crate) fn line_at(&self, pc: usize) -> Option<u16> {
        self.line_numbers
            .iter()
            .filter(|(start, _)| usize::from(*start) <= pc)
            .max_by_key(|(start, _)| *start)
            .map(|(_, line)| *line)
    }

    /// Lines from the method's first instruction to its highest line
    pub(crate) fn line_range(&self) -> Option<(u16, u16)> {
        let first = self
            .line_numbers
            .iter()
            .min_by_key(|(start, _)| *start)
            .map(|(_, line)| *line)?;
        let last = self.line_numbers.iter().map(|(_, line)| *line).max()?;
        Some((first, last))
    }

    fn byte(&self, at: usize) -> Result<u8, ClassFileError> {
        self.code.get(at).copied().ok_or(ClassFileError::UnexpectedEof)
    }

    fn index(&self, at: usize) -> Result<u16, ClassFileError> {
        Ok(u16::from_be_bytes([self.byte(at)?, self.byte(at + 1)?]))
    }

    fn int(&self, at: usize) -> Result<i32, ClassFileError> {
        let bytes = self.code.get(at..at + 4).ok_or(ClassFileError::UnexpectedEof)?;
        Ok(i32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    fn instruction_length(&self, pc: usize) -> Result<usize, ClassFileError> {
        let opcode = self.code[pc];
        let length = match opcode {
            0x10 | 0x12 | 0x15..=0x19 | 0x36..=0x3a | 0xa9 | 0xbc => 2,
            0x11 | 0x13 | 0x14 | 0x84 | 0x99..=0xa8 | 0xb2..=0xb8 | 0xbb | 0xbd | 0xc0 | 0xc1
            | 0xc6 | 0xc7 => 3,
            0xc5 => 4,
            0xb9 | 0xba | 0xc8 | 0xc9 => 5,
            0xc4 => {
                if self.byte(pc + 1)? == 0x84 {
                    6
                } else {
                    4
                }
            }
            0xaa => {
                let base = pc + 1 + padding(pc);
                let low = self.int(base + 4)?;
                let high = self.int(base + 8)?;
                let entries = i64::from(high) - i64::from(low) + 1;
                if entries < 0 {
                    return Err(ClassFileError::MalformedAttribute("Code".into()));
                }
                1 + padding(pc) + 12 + entries as usize * 4
            }
            0xab => {
                let base = pc + 1 + padding(pc);
                let pairs = self.int(base + 4)?;
                if pairs < 0 {
                    return Err(ClassFileError::MalformedAttribute("Code".into()));
                }
                1 + padding(pc) + 8 + pairs as usize * 8
            }
            0x00..=0xca => 1,
            _ => return Err(ClassFileError::UnknownOpcode { opcode, pc }),
        };
        Ok(length)
    }
}

/// Switch operands start at the next four-byte boundary
fn padding(pc: usize) -> usize {
    (4 - (pc + 1) % 4) % 4
}
