use bitflags::bitflags;

bitflags! {
    /// Usage restrictions placed on an API element
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Restrictions: u32 {
        const NO_EXTEND = 0x01;
        const NO_IMPLEMENT = 0x02;
        const NO_INSTANTIATE = 0x04;
        const NO_REFERENCE = 0x08;
        const NO_OVERRIDE = 0x10;
    }
}

impl Restrictions {
    /// Javadoc-style tag names of the set restrictions
    pub fn tags(self) -> Vec<&'static str> {
        [
            (Self::NO_EXTEND, "@noextend"),
            (Self::NO_IMPLEMENT, "@noimplement"),
            (Self::NO_INSTANTIATE, "@noinstantiate"),
            (Self::NO_REFERENCE, "@noreference"),
            (Self::NO_OVERRIDE, "@nooverride"),
        ]
        .into_iter()
        .filter(|(flag, _)| self.contains(*flag))
        .map(|(_, tag)| tag)
        .collect()
    }
}
