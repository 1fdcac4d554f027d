use super::error::ClassFileError;

/// Big-endian cursor over class-file bytes
pub(crate) struct ClassReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ClassReader<'a> {
    pub(crate) fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub(crate) fn expect_magic(&mut self) -> Result<(), ClassFileError> {
        const MAGIC: u32 = 0xCAFEBABE;
        if self.read_u4()? != MAGIC {
            return Err(ClassFileError::InvalidMagic);
        }
        Ok(())
    }

    fn take<const N: usize>(&mut self) -> Result<[u8; N], ClassFileError> {
        let end = self.pos.checked_add(N).ok_or(ClassFileError::UnexpectedEof)?;
        let bytes = self
            .data
            .get(self.pos..end)
            .ok_or(ClassFileError::UnexpectedEof)?;
        let mut out = [0u8; N];
        out.copy_from_slice(bytes);
        self.pos = end;
        Ok(out)
    }

    pub(crate) fn read_u1(&mut self) -> Result<u8, ClassFileError> {
        Ok(self.take::<1>()?[0])
    }

    pub(crate) fn read_u2(&mut self) -> Result<u16, ClassFileError> {
        Ok(u16::from_be_bytes(self.take()?))
    }

    pub(crate) fn read_u4(&mut self) -> Result<u32, ClassFileError> {
        Ok(u32::from_be_bytes(self.take()?))
    }

    pub(crate) fn read_i4(&mut self) -> Result<i32, ClassFileError> {
        Ok(i32::from_be_bytes(self.take()?))
    }

    pub(crate) fn read_u8(&mut self) -> Result<u64, ClassFileError> {
        Ok(u64::from_be_bytes(self.take()?))
    }

    pub(crate) fn read_slice(&mut self, len: usize) -> Result<&'a [u8], ClassFileError> {
        let end = self.pos.checked_add(len).ok_or(ClassFileError::UnexpectedEof)?;
        let slice = self
            .data
            .get(self.pos..end)
            .ok_or(ClassFileError::UnexpectedEof)?;
        self.pos = end;
        Ok(slice)
    }

    pub(crate) fn skip(&mut self, len: usize) -> Result<(), ClassFileError> {
        self.read_slice(len).map(|_| ())
    }

    /// Reads an attribute header and returns its name index and body
    pub(crate) fn read_attribute(&mut self) -> Result<(u16, &'a [u8]), ClassFileError> {
        let name_index = self.read_u2()?;
        let length = self.read_u4()? as usize;
        Ok((name_index, self.read_slice(length)?))
    }
}
