//! Access and modifier flags for types and members

use bitflags::bitflags;

bitflags! {
    /// Modifier bits as they appear in the class-file format, plus the
    /// semantic `DEPRECATED` bit derived from the `Deprecated` attribute.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Modifiers: u32 {
        const PUBLIC = 0x0001;
        const PRIVATE = 0x0002;
        const PROTECTED = 0x0004;
        const STATIC = 0x0008;
        const FINAL = 0x0010;
        const SYNCHRONIZED = 0x0020;
        const VOLATILE = 0x0040;
        const TRANSIENT = 0x0080;
        const NATIVE = 0x0100;
        const INTERFACE = 0x0200;
        const ABSTRACT = 0x0400;
        const STRICT = 0x0800;
        const SYNTHETIC = 0x1000;
        const ANNOTATION = 0x2000;
        const ENUM = 0x4000;
        const MANDATED = 0x8000;
        const DEPRECATED = 0x10_0000;
    }
}

impl Modifiers {
    /// `ACC_SUPER` on classes shares its bit with `SYNCHRONIZED`
    pub const SUPER: Self = Self::SYNCHRONIZED;
    /// `ACC_BRIDGE` on methods shares its bit with `VOLATILE`
    pub const BRIDGE: Self = Self::VOLATILE;
    /// `ACC_VARARGS` on methods shares its bit with `TRANSIENT`
    pub const VARARGS: Self = Self::TRANSIENT;

    /// Builds modifiers from a raw class-file access word
    pub fn from_access(access: u16) -> Self {
        Self::from_bits_truncate(u32::from(access))
    }

    pub fn is_public(self) -> bool {
        self.contains(Self::PUBLIC)
    }

    pub fn is_static(self) -> bool {
        self.contains(Self::STATIC)
    }

    pub fn is_abstract(self) -> bool {
        self.contains(Self::ABSTRACT)
    }

    pub fn is_native(self) -> bool {
        self.contains(Self::NATIVE)
    }

    pub fn is_interface(self) -> bool {
        self.contains(Self::INTERFACE)
    }

    pub fn is_deprecated(self) -> bool {
        self.contains(Self::DEPRECATED)
    }

    /// Java-style keyword rendering used by the CLI
    pub fn keywords(self) -> Vec<&'static str> {
        let mut words = Vec::new();
        for (flag, word) in [
            (Self::PUBLIC, "public"),
            (Self::PROTECTED, "protected"),
            (Self::PRIVATE, "private"),
            (Self::STATIC, "static"),
            (Self::FINAL, "final"),
            (Self::ABSTRACT, "abstract"),
            (Self::NATIVE, "native"),
        ] {
            if self.contains(flag) {
                words.push(word);
            }
        }
        if self.is_deprecated() {
            words.push("@deprecated");
        }
        words
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_access() {
        let modifiers = Modifiers::from_access(0x0421);
        assert!(modifiers.is_public());
        assert!(modifiers.is_abstract());
        assert!(modifiers.contains(Modifiers::SUPER));
        assert!(!modifiers.is_deprecated());
    }

    #[test]
    fn test_deprecated_outside_access_word() {
        let modifiers = Modifiers::from_access(0xFFFF);
        assert!(!modifiers.is_deprecated());
        assert!((modifiers | Modifiers::DEPRECATED).is_deprecated());
    }
}
