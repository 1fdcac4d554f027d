use super::error::ClassFileError;
use super::reader::ClassReader;
use crate::model::{ConstantValue, MethodKey};

#[derive(Debug, Clone)]
enum Constant {
    Utf8(String),
    Integer(i32),
    Float(f32),
    Long(i64),
    Double(f64),
    Class { name_index: u16 },
    String { string_index: u16 },
    MemberRef { class_index: u16 },
    NameAndType { name_index: u16, descriptor_index: u16 },
    Other,
    Unusable,
}

/// Decoded constant pool of one class file
pub(crate) struct ConstantPool {
    entries: Vec<Constant>,
}

impl ConstantPool {
    pub(crate) fn parse(reader: &mut ClassReader<'_>) -> Result<Self, ClassFileError> {
        let count = reader.read_u2()? as usize;
        let mut entries = Vec::with_capacity(count);
        entries.push(Constant::Unusable); // index 0 unused

        let mut index = 1;
        while index < count {
            let tag = reader.read_u1()?;
            let entry = match tag {
                1 => {
                    let length = reader.read_u2()? as usize;
                    Constant::Utf8(decode_modified_utf8(reader.read_slice(length)?)?)
                }
                3 => Constant::Integer(reader.read_i4()?),
                4 => Constant::Float(f32::from_bits(reader.read_u4()?)),
                5 | 6 => {
                    let bits = reader.read_u8()?;
                    let value = if tag == 5 {
                        Constant::Long(bits as i64)
                    } else {
                        Constant::Double(f64::from_bits(bits))
                    };
                    // long and double occupy two slots
                    entries.push(value);
                    index += 1;
                    Constant::Unusable
                }
                7 => Constant::Class {
                    name_index: reader.read_u2()?,
                },
                8 => Constant::String {
                    string_index: reader.read_u2()?,
                },
                9..=11 => {
                    let class_index = reader.read_u2()?;
                    reader.read_u2()?; // name and type
                    Constant::MemberRef { class_index }
                }
                12 => Constant::NameAndType {
                    name_index: reader.read_u2()?,
                    descriptor_index: reader.read_u2()?,
                },
                15 => {
                    reader.skip(3)?;
                    Constant::Other
                }
                16 | 19 | 20 => {
                    reader.read_u2()?;
                    Constant::Other
                }
                17 | 18 => {
                    reader.skip(4)?;
                    Constant::Other
                }
                other => return Err(ClassFileError::UnsupportedConstant { tag: other }),
            };

            entries.push(entry);
            index += 1;
        }

        Ok(Self { entries })
    }

    fn get(&self, index: u16) -> Result<&Constant, ClassFileError> {
        self.entries
            .get(index as usize)
            .ok_or(ClassFileError::InvalidConstantIndex { index })
    }

    pub(crate) fn utf8(&self, index: u16) -> Result<&str, ClassFileError> {
        match self.get(index)? {
            Constant::Utf8(value) => Ok(value.as_str()),
            _ => Err(ClassFileError::InvalidConstantIndex { index }),
        }
    }

    /// Internal binary name of a `CONSTANT_Class` entry
    pub(crate) fn class_name(&self, index: u16) -> Result<&str, ClassFileError> {
        match self.get(index)? {
            Constant::Class { name_index } => self.utf8(*name_index),
            _ => Err(ClassFileError::InvalidConstantIndex { index }),
        }
    }

    /// Like [`class_name`](Self::class_name) but index zero means absent
    pub(crate) fn optional_class_name(&self, index: u16) -> Result<Option<&str>, ClassFileError> {
        if index == 0 {
            Ok(None)
        } else {
            self.class_name(index).map(Some)
        }
    }

    pub(crate) fn optional_utf8(&self, index: u16) -> Result<Option<&str>, ClassFileError> {
        if index == 0 {
            Ok(None)
        } else {
            self.utf8(index).map(Some)
        }
    }

    pub(crate) fn name_and_type(&self, index: u16) -> Result<MethodKey, ClassFileError> {
        match self.get(index)? {
            Constant::NameAndType {
                name_index,
                descriptor_index,
            } => Ok(MethodKey::new(
                self.utf8(*name_index)?,
                self.utf8(*descriptor_index)?,
            )),
            _ => Err(ClassFileError::InvalidConstantIndex { index }),
        }
    }

    /// Owner class of a field or method reference
    pub(crate) fn member_owner(&self, index: u16) -> Result<&str, ClassFileError> {
        match self.get(index)? {
            Constant::MemberRef { class_index } => self.class_name(*class_index),
            _ => Err(ClassFileError::InvalidConstantIndex { index }),
        }
    }

    /// Class name when the entry is a `CONSTANT_Class`, for `ldc` operands
    pub(crate) fn loadable_class(&self, index: u16) -> Option<&str> {
        match self.get(index) {
            Ok(Constant::Class { name_index }) => self.utf8(*name_index).ok(),
            _ => None,
        }
    }

    pub(crate) fn constant_value(&self, index: u16) -> Result<ConstantValue, ClassFileError> {
        Ok(match self.get(index)? {
            Constant::Integer(v) => ConstantValue::Int(*v),
            Constant::Float(v) => ConstantValue::Float(*v),
            Constant::Long(v) => ConstantValue::Long(*v),
            Constant::Double(v) => ConstantValue::Double(*v),
            Constant::String { string_index } => {
                ConstantValue::String(self.utf8(*string_index)?.to_string())
            }
            _ => return Err(ClassFileError::InvalidConstantIndex { index }),
        })
    }

    pub(crate) fn integer(&self, index: u16) -> Result<i32, ClassFileError> {
        match self.get(index)? {
            Constant::Integer(v) => Ok(*v),
            _ => Err(ClassFileError::InvalidConstantIndex { index }),
        }
    }
}

/// Decodes the JVM's modified UTF-8 (two-byte NUL, surrogate pairs)
pub(crate) fn decode_modified_utf8(bytes: &[u8]) -> Result<String, ClassFileError> {
    if bytes.iter().all(|b| *b != 0 && *b < 0x80) {
        return String::from_utf8(bytes.to_vec()).map_err(|_| ClassFileError::InvalidUtf8);
    }

    let continuation = |i: usize| -> Result<u16, ClassFileError> {
        match bytes.get(i) {
            Some(b) if b & 0xC0 == 0x80 => Ok(u16::from(b & 0x3F)),
            _ => Err(ClassFileError::InvalidUtf8),
        }
    };

    let mut units = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i];
        if b & 0x80 == 0 {
            units.push(u16::from(b));
            i += 1;
        } else if b & 0xE0 == 0xC0 {
            units.push((u16::from(b & 0x1F) << 6) | continuation(i + 1)?);
            i += 2;
        } else if b & 0xF0 == 0xE0 {
            units.push((u16::from(b & 0x0F) << 12) | (continuation(i + 1)? << 6) | continuation(i + 2)?);
            i += 3;
        } else {
            return Err(ClassFileError::InvalidUtf8);
        }
    }
    String::from_utf16(&units).map_err(|_| ClassFileError::InvalidUtf8)
}
