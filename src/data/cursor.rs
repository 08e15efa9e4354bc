//! Sequential reader over a [`ByteSource`].

use tracing::debug;

use crate::data::parser_utils::{Vec3, escape_legacy_bytes};
use crate::data::source::{ByteSource, decode_wide_units};
use crate::error::ReadError;

/// Reads fields one after another, advancing by each field's encoded width.
///
/// The cursor only borrows its source; parsers create one per pass and seek it
/// around as offset tables dictate.
#[derive(Debug)]
pub struct Cursor<'a, S: ?Sized> {
    source: &'a S,
    offset: u64,
}

impl<'a, S: ByteSource + ?Sized> Cursor<'a, S> {
    pub fn new(source: &'a S) -> Self {
        Self::at(source, 0)
    }

    pub fn at(source: &'a S, offset: u64) -> Self {
        Cursor { source, offset }
    }

    pub fn source(&self) -> &'a S {
        self.source
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn seek(&mut self, offset: u64) {
        self.offset = offset;
    }

    pub fn skip(&mut self, bytes: u64) {
        self.offset += bytes;
    }

    pub fn read_u32(&mut self) -> Result<u32, ReadError> {
        let v = self.source.read_u32(self.offset)?;
        self.offset += 4;
        Ok(v)
    }

    pub fn read_u16(&mut self) -> Result<u16, ReadError> {
        let v = self.source.read_u16(self.offset)?;
        self.offset += 2;
        Ok(v)
    }

    pub fn read_i16(&mut self) -> Result<i16, ReadError> {
        let v = self.source.read_i16(self.offset)?;
        self.offset += 2;
        Ok(v)
    }

    pub fn read_f32(&mut self) -> Result<f32, ReadError> {
        let v = self.source.read_f32(self.offset)?;
        self.offset += 4;
        Ok(v)
    }

    pub fn read_vec3(&mut self) -> Result<Vec3, ReadError> {
        let v = self.source.read_vec3(self.offset)?;
        self.offset += 12;
        Ok(v)
    }

    pub fn read_bytes(&mut self, count: u64) -> Result<Vec<u8>, ReadError> {
        let v = self.source.read_bytes(self.offset, count)?;
        self.offset += count;
        Ok(v)
    }

    /// Read `N` consecutive words.
    pub fn read_words<const N: usize>(&mut self) -> Result<[u32; N], ReadError> {
        let mut words = [0u32; N];
        for word in &mut words {
            *word = self.read_u32()?;
        }
        Ok(words)
    }

    /// Read an inline wide string, advancing past its terminator.
    pub fn read_wide_string(&mut self) -> Result<String, ReadError> {
        let units = self.source.read_wide_units(self.offset)?;
        self.offset += (units.len() as u64 + 1) * 2;
        Ok(decode_wide_units(&units))
    }

    /// Read an inline C string, advancing past its terminator.
    pub fn read_cstring(&mut self) -> Result<String, ReadError> {
        let bytes = self.source.cstring_bytes(self.offset)?;
        self.offset += bytes.len() as u64 + 1;
        Ok(escape_legacy_bytes(bytes))
    }

    /// Read a word `v` and return the word stored at absolute offset `v`.
    pub fn read_ptr_u32(&mut self) -> Result<u32, ReadError> {
        let ptr = self.read_u32()?;
        self.source.read_u32(ptr as u64)
    }

    /// Read a word `v` and return the wide string stored at absolute offset `v`.
    pub fn read_ptr_wide_string(&mut self) -> Result<String, ReadError> {
        let ptr = self.read_u32()?;
        self.source.read_wide_string(ptr as u64)
    }

    /// Read a word `v` and return the C string stored at absolute offset `v`.
    pub fn read_ptr_cstring(&mut self) -> Result<String, ReadError> {
        let ptr = self.read_u32()?;
        self.source.read_cstring(ptr as u64)
    }

    /// Read a word `v` and return the C string at `v` relative to the word's own position.
    pub fn read_rel_cstring(&mut self) -> Result<String, ReadError> {
        let field = self.offset;
        let rel = self.read_u32()?;
        self.source.read_cstring(field + rel as u64)
    }

    /// Consume `count` words that are expected to be zero, logging any that aren't.
    pub fn read_reserved(&mut self, label: &str, count: usize) -> Result<(), ReadError> {
        for i in 0..count {
            let at = self.offset;
            let word = self.read_u32()?;
            if word != 0 {
                debug!("{label}[{i}] @ 0x{at:08X} = 0x{word:08X}");
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_advance_by_width() {
        let mut data = Vec::new();
        data.extend_from_slice(&7u32.to_be_bytes());
        data.extend_from_slice(&0x0102u16.to_be_bytes());
        data.extend_from_slice(&(-3i16).to_be_bytes());
        data.extend_from_slice(&0.5f32.to_be_bytes());
        for v in [3.0f32, 2.0, 1.0] {
            data.extend_from_slice(&v.to_be_bytes());
        }
        data.extend_from_slice(&[9, 8, 7]);

        let mut cursor = Cursor::new(&data[..]);
        assert_eq!(cursor.read_u32().unwrap(), 7);
        assert_eq!(cursor.offset(), 4);
        assert_eq!(cursor.read_u16().unwrap(), 0x0102);
        assert_eq!(cursor.read_i16().unwrap(), -3);
        assert_eq!(cursor.read_f32().unwrap(), 0.5);
        assert_eq!(cursor.read_vec3().unwrap(), Vec3::new(1.0, 2.0, 3.0));
        assert_eq!(cursor.offset(), 24);
        assert_eq!(cursor.read_bytes(3).unwrap(), vec![9, 8, 7]);
        assert_eq!(cursor.offset(), 27);
        assert!(cursor.read_u16().is_err());
        assert_eq!(cursor.offset(), 27);
    }

    #[test]
    fn strings_advance_past_terminator() {
        let data = [0x00u8, b'O', 0x00, b'K', 0x00, 0x00, 0xE9, b'x', 0x00, 0xAA];
        let mut cursor = Cursor::new(&data[..]);
        assert_eq!(cursor.read_wide_string().unwrap(), "OK");
        assert_eq!(cursor.offset(), 6);
        assert_eq!(cursor.read_cstring().unwrap(), "E9x");
        assert_eq!(cursor.offset(), 9);
    }

    #[test]
    fn pointer_reads_dereference_but_advance_one_word() {
        let mut data = vec![0u8; 16];
        data[3] = 8;
        data[8..12].copy_from_slice(&0xCAFEu32.to_be_bytes());
        data[4..8].copy_from_slice(&4u32.to_be_bytes());
        data[12] = b'n';

        let mut cursor = Cursor::new(&data);
        assert_eq!(cursor.read_ptr_u32().unwrap(), 0xCAFE);
        assert_eq!(cursor.offset(), 4);
        // relative to the field at 4: 4 + 4 = 8, which holds 0x00 0x00 0xCA 0xFE -> empty string
        assert_eq!(cursor.read_rel_cstring().unwrap(), "");
        assert_eq!(cursor.offset(), 8);

        cursor.seek(12);
        assert_eq!(cursor.source().read_cstring(12).unwrap(), "n");
    }

    #[test]
    fn skip_and_reserved_words() {
        let data = [0u8, 0, 0, 0, 0, 0, 0, 5, 0, 0, 0, 9];
        let mut cursor = Cursor::new(&data[..]);
        cursor.read_reserved("pad", 2).unwrap();
        assert_eq!(cursor.offset(), 8);
        cursor.seek(0);
        cursor.skip(8);
        assert_eq!(cursor.read_words::<1>().unwrap(), [9]);
    }
}
