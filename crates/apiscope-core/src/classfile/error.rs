use thiserror::Error;

/// Failures while decoding class-file bytes
#[derive(Debug, Error)]
pub enum ClassFileError {
    #[error("unexpected end of class file")]
    UnexpectedEof,
    #[error("invalid class file magic header")]
    InvalidMagic,
    #[error("unsupported constant pool tag {tag}")]
    UnsupportedConstant { tag: u8 },
    #[error("invalid constant pool index {index}")]
    InvalidConstantIndex { index: u16 },
    #[error("invalid modified UTF-8 string in constant pool")]
    InvalidUtf8,
    #[error("unknown opcode {opcode:#04x} at offset {pc}")]
    UnknownOpcode { opcode: u8, pc: usize },
    #[error("malformed {0} attribute")]
    MalformedAttribute(String),
}
