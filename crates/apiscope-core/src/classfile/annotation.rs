//! Annotation attributes
//!
//! Only two things are extracted: the descriptors of annotations present on
//! a member, and annotation default values flattened into a single string.
//! Nested arrays and annotations are comma-joined, which loses structure.

use super::constant_pool::ConstantPool;
use super::error::ClassFileError;
use super::reader::ClassReader;
use crate::model::ConstantValue;

/// Descriptor of the annotation marking signature-polymorphic methods
pub const POLYMORPHIC_SIGNATURE: &str = "Ljava/lang/invoke/MethodHandle$PolymorphicSignature;";

/// Reads a `Runtime*Annotations` attribute body and returns the annotation
/// type descriptors
pub(crate) fn annotation_types(
    body: &[u8],
    pool: &ConstantPool,
) -> Result<Vec<String>, ClassFileError> {
    let mut reader = ClassReader::new(body);
    let count = reader.read_u2()?;
    let mut types = Vec::with_capacity(count as usize);
    for _ in 0..count {
        types.push(read_annotation(&mut reader, pool)?.descriptor);
    }
    Ok(types)
}

/// Flattens an `AnnotationDefault` attribute body
pub(crate) fn default_value(body: &[u8], pool: &ConstantPool) -> Result<String, ClassFileError> {
    let mut reader = ClassReader::new(body);
    read_element_value(&mut reader, pool)
}

struct Annotation {
    descriptor: String,
}

fn read_annotation(
    reader: &mut ClassReader<'_>,
    pool: &ConstantPool,
) -> Result<Annotation, ClassFileError> {
    let descriptor = pool.utf8(reader.read_u2()?)?.to_string();
    let pairs = reader.read_u2()?;
    for _ in 0..pairs {
        reader.read_u2()?; // element name
        read_element_value(reader, pool)?;
    }
    Ok(Annotation { descriptor })
}

fn read_element_value(
    reader: &mut ClassReader<'_>,
    pool: &ConstantPool,
) -> Result<String, ClassFileError> {
    let tag = reader.read_u1()?;
    let value = match tag {
        b'B' | b'S' | b'I' => pool.integer(reader.read_u2()?)?.to_string(),
        b'C' => {
            let code = pool.integer(reader.read_u2()?)?;
            char::from_u32(code as u32)
                .map(String::from)
                .unwrap_or_default()
        }
        b'Z' => (pool.integer(reader.read_u2()?)? != 0).to_string(),
        b'D' | b'F' | b'J' => match pool.constant_value(reader.read_u2()?)? {
            ConstantValue::Long(v) => v.to_string(),
            ConstantValue::Float(v) => v.to_string(),
            ConstantValue::Double(v) => v.to_string(),
            ConstantValue::Int(v) => v.to_string(),
            ConstantValue::String(v) => v,
        },
        b's' => pool.utf8(reader.read_u2()?)?.to_string(),
        b'e' => {
            let descriptor = pool.utf8(reader.read_u2()?)?;
            let constant = pool.utf8(reader.read_u2()?)?;
            format!("{}.{}", descriptor, constant)
        }
        b'c' => pool.utf8(reader.read_u2()?)?.to_string(),
        b'@' => format!("@{}", read_annotation(reader, pool)?.descriptor),
        b'[' => {
            let count = reader.read_u2()?;
            let mut values = Vec::with_capacity(count as usize);
            for _ in 0..count {
                values.push(read_element_value(reader, pool)?);
            }
            values.join(",")
        }
        _ => return Err(ClassFileError::MalformedAttribute("AnnotationDefault".into())),
    };
    Ok(value)
}
