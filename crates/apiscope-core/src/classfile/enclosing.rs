//! Second pass locating the method that declares a local or anonymous type
//!
//! Used when the nested class carries no method in its `EnclosingMethod`
//! record. The enclosing type's methods are scanned in declaration order and
//! the first one whose body references the nested type wins. Static
//! initializers, abstract and native methods are skipped. A constructor only
//! matches when the referencing instruction's line lies inside the
//! constructor's own line range, so anonymous classes created by field
//! initializers (which the compiler copies into every constructor) are not
//! attributed to the constructor. This is a best-effort rule, not a proof.

use tracing::trace;

use super::code::CodeAttribute;
use super::constant_pool::ConstantPool;
use super::error::ClassFileError;
use super::reader::ClassReader;
use super::skip_members;
use crate::flags::Modifiers;
use crate::model::MethodKey;

/// Finds the method in `enclosing_bytes` that first references `binary_name`
pub fn find_enclosing_method(
    enclosing_bytes: &[u8],
    binary_name: &str,
) -> Result<Option<MethodKey>, ClassFileError> {
    let mut reader = ClassReader::new(enclosing_bytes);
    reader.expect_magic()?;
    reader.skip(4)?; // minor, major
    let pool = ConstantPool::parse(&mut reader)?;
    reader.skip(6)?; // access, this, super
    let interfaces = reader.read_u2()? as usize;
    reader.skip(interfaces * 2)?;
    skip_members(&mut reader)?;

    let methods = reader.read_u2()?;
    for _ in 0..methods {
        let modifiers = Modifiers::from_access(reader.read_u2()?);
        let name = pool.utf8(reader.read_u2()?)?;
        let descriptor = pool.utf8(reader.read_u2()?)?;
        let attributes = reader.read_u2()?;

        let mut code = None;
        for _ in 0..attributes {
            let (name_index, body) = reader.read_attribute()?;
            if pool.utf8(name_index)? == "Code" {
                code = Some(body);
            }
        }

        if name == "<clinit>" || modifiers.is_abstract() || modifiers.is_native() {
            continue;
        }
        let Some(body) = code else {
            continue;
        };

        let code = CodeAttribute::parse(body, &pool)?;
        let Some(pc) = code.first_reference(&pool, binary_name)? else {
            continue;
        };

        if name == "<init>" && !within_own_lines(&code, pc) {
            trace!(
                "Skipping {}{} for {}: reference outside constructor lines",
                name,
                descriptor,
                binary_name
            );
            continue;
        }
        return Ok(Some(MethodKey::new(name, descriptor)));
    }
    Ok(None)
}

fn within_own_lines(code: &CodeAttribute<'_>, pc: usize) -> bool {
    if !code.has_line_numbers() {
        return true;
    }
    match (code.line_range(), code.line_at(pc)) {
        (Some((first, last)), Some(line)) => first <= line && line <= last,
        _ => true,
    }
}
