//! Class-file decoding

mod annotation;
mod builder;
mod code;
mod constant_pool;
pub mod enclosing;
mod error;
mod reader;

pub use annotation::POLYMORPHIC_SIGNATURE;
pub use builder::StructureBuilder;
pub use error::ClassFileError;

use reader::ClassReader;

/// Skips a fields table
fn skip_members(reader: &mut ClassReader<'_>) -> Result<(), ClassFileError> {
    let count = reader.read_u2()?;
    for _ in 0..count {
        reader.skip(6)?; // access, name, descriptor
        let attributes = reader.read_u2()?;
        for _ in 0..attributes {
            reader.read_attribute()?;
        }
    }
    Ok(())
}
