//! Fields and methods of a [`Type`](super::Type)

use std::fmt;

use crate::flags::Modifiers;

/// Compile-time constant attached to a static final field
#[derive(Debug, Clone, PartialEq)]
pub enum ConstantValue {
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    String(String),
}

impl fmt::Display for ConstantValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(v) => write!(f, "{}", v),
            Self::Long(v) => write!(f, "{}L", v),
            Self::Float(v) => write!(f, "{}f", v),
            Self::Double(v) => write!(f, "{}d", v),
            Self::String(v) => write!(f, "{:?}", v),
        }
    }
}

/// A field declared by a type. Identity is the declaring type plus the name.
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    name: String,
    descriptor: String,
    generic_signature: Option<String>,
    modifiers: Modifiers,
    constant_value: Option<ConstantValue>,
}

impl Field {
    pub fn new(name: impl Into<String>, descriptor: impl Into<String>, modifiers: Modifiers) -> Self {
        Self {
            name: name.into(),
            descriptor: descriptor.into(),
            generic_signature: None,
            modifiers,
            constant_value: None,
        }
    }

    pub fn with_generic_signature(mut self, signature: Option<String>) -> Self {
        self.generic_signature = signature;
        self
    }

    pub fn with_constant_value(mut self, value: Option<ConstantValue>) -> Self {
        self.constant_value = value;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn descriptor(&self) -> &str {
        &self.descriptor
    }

    pub fn generic_signature(&self) -> Option<&str> {
        self.generic_signature.as_deref()
    }

    pub fn modifiers(&self) -> Modifiers {
        self.modifiers
    }

    pub fn constant_value(&self) -> Option<&ConstantValue> {
        self.constant_value.as_ref()
    }
}

/// Identity of a method within its declaring type
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MethodKey {
    pub name: String,
    pub descriptor: String,
}

impl MethodKey {
    pub fn new(name: impl Into<String>, descriptor: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            descriptor: descriptor.into(),
        }
    }
}

impl fmt::Display for MethodKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.name, self.descriptor)
    }
}

/// A method declared by a type
///
/// The generic signature and the exception list are not part of the
/// method's identity.
#[derive(Debug, Clone, PartialEq)]
pub struct Method {
    key: MethodKey,
    generic_signature: Option<String>,
    modifiers: Modifiers,
    exceptions: Vec<String>,
    default_value: Option<String>,
    polymorphic: bool,
}

impl Method {
    pub fn new(name: impl Into<String>, descriptor: impl Into<String>, modifiers: Modifiers) -> Self {
        Self {
            key: MethodKey::new(name, descriptor),
            generic_signature: None,
            modifiers,
            exceptions: Vec::new(),
            default_value: None,
            polymorphic: false,
        }
    }

    pub fn with_generic_signature(mut self, signature: Option<String>) -> Self {
        self.generic_signature = signature;
        self
    }

    pub fn with_exceptions(mut self, exceptions: Vec<String>) -> Self {
        self.exceptions = exceptions;
        self
    }

    /// Records the annotation default once the attribute has been decoded
    pub fn set_default_value(&mut self, value: Option<String>) {
        self.default_value = value;
    }

    pub fn set_polymorphic(&mut self, polymorphic: bool) {
        self.polymorphic = polymorphic;
    }

    pub fn key(&self) -> &MethodKey {
        &self.key
    }

    pub fn name(&self) -> &str {
        &self.key.name
    }

    pub fn descriptor(&self) -> &str {
        &self.key.descriptor
    }

    pub fn generic_signature(&self) -> Option<&str> {
        self.generic_signature.as_deref()
    }

    pub fn modifiers(&self) -> Modifiers {
        self.modifiers
    }

    pub fn exceptions(&self) -> &[String] {
        &self.exceptions
    }

    pub fn default_value(&self) -> Option<&str> {
        self.default_value.as_deref()
    }

    pub fn is_polymorphic(&self) -> bool {
        self.polymorphic
    }

    pub fn is_constructor(&self) -> bool {
        self.key.name == "<init>"
    }

    pub fn is_class_initializer(&self) -> bool {
        self.key.name == "<clinit>"
    }
}
