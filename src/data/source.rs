//! Random-access big-endian readers.
//!
//! A [`ByteSource`] is anything that can hand out a borrowed byte range at an
//! absolute offset. All typed reads are provided on top of that single
//! primitive and decode through [`decode_be`], so the on-disk byte order is
//! enforced in exactly one place.

use crate::data::parser_utils::{
    FieldParser, Vec3, be_f32_field, be_i16_field, be_u16_field, be_u32_field, decode_be,
    escape_legacy_bytes,
};
use crate::error::ReadError;

pub trait ByteSource {
    /// Total number of addressable bytes.
    fn size(&self) -> u64;

    /// Borrow `len` bytes starting at `offset`.
    fn bytes_at(&self, offset: u64, len: u64) -> Result<&[u8], ReadError>;

    /// Fail with [`ReadError::OutOfRange`] unless `offset..offset + len` is readable.
    fn ensure_range(&self, offset: u64, len: u64) -> Result<(), ReadError> {
        match offset.checked_add(len) {
            Some(end) if end <= self.size() => Ok(()),
            _ => Err(ReadError::out_of_range(offset, len, self.size())),
        }
    }

    fn read_be<T>(&self, offset: u64, width: u64, parser: FieldParser<T>) -> Result<T, ReadError> {
        let bytes = self.bytes_at(offset, width)?;
        decode_be(bytes, offset, parser)
    }

    fn read_u32(&self, offset: u64) -> Result<u32, ReadError> {
        self.read_be(offset, 4, be_u32_field)
    }

    fn read_u16(&self, offset: u64) -> Result<u16, ReadError> {
        self.read_be(offset, 2, be_u16_field)
    }

    fn read_i16(&self, offset: u64) -> Result<i16, ReadError> {
        self.read_be(offset, 2, be_i16_field)
    }

    fn read_f32(&self, offset: u64) -> Result<f32, ReadError> {
        self.read_be(offset, 4, be_f32_field)
    }

    /// Read three floats stored z, y, x into a [`Vec3`].
    fn read_vec3(&self, offset: u64) -> Result<Vec3, ReadError> {
        let z = self.read_f32(offset)?;
        let y = self.read_f32(offset + 4)?;
        let x = self.read_f32(offset + 8)?;
        Ok(Vec3::new(x, y, z))
    }

    fn read_bytes(&self, offset: u64, count: u64) -> Result<Vec<u8>, ReadError> {
        Ok(self.bytes_at(offset, count)?.to_vec())
    }

    /// Read 16-bit code units up to (not including) a zero unit.
    fn read_wide_units(&self, offset: u64) -> Result<Vec<u16>, ReadError> {
        let mut units = Vec::new();
        let mut at = offset;
        loop {
            let unit = self.read_u16(at)?;
            if unit == 0 {
                return Ok(units);
            }
            units.push(unit);
            at += 2;
        }
    }

    /// Read a zero-terminated string of 16-bit units, one character per unit.
    ///
    /// Units are not combined into surrogate pairs; a lone surrogate decodes to
    /// U+FFFD.
    fn read_wide_string(&self, offset: u64) -> Result<String, ReadError> {
        Ok(decode_wide_units(&self.read_wide_units(offset)?))
    }

    /// Borrow the bytes of a NUL-terminated string, without the terminator.
    fn cstring_bytes(&self, offset: u64) -> Result<&[u8], ReadError> {
        let remaining = self.size().saturating_sub(offset);
        let bytes = self.bytes_at(offset, remaining)?;
        match bytes.iter().position(|&b| b == 0) {
            Some(end) => Ok(&bytes[..end]),
            None => Err(ReadError::out_of_range(offset, remaining + 1, self.size())),
        }
    }

    /// Read a NUL-terminated single-byte string; bytes above 0x7F are rendered as hex.
    fn read_cstring(&self, offset: u64) -> Result<String, ReadError> {
        Ok(escape_legacy_bytes(self.cstring_bytes(offset)?))
    }
}

pub fn decode_wide_units(units: &[u16]) -> String {
    units
        .iter()
        .map(|&u| char::from_u32(u as u32).unwrap_or(char::REPLACEMENT_CHARACTER))
        .collect()
}

fn slice_range(data: &[u8], offset: u64, len: u64) -> Result<&[u8], ReadError> {
    let size = data.len() as u64;
    match offset.checked_add(len) {
        Some(end) if end <= size => Ok(&data[offset as usize..end as usize]),
        _ => Err(ReadError::out_of_range(offset, len, size)),
    }
}

impl ByteSource for [u8] {
    fn size(&self) -> u64 {
        self.len() as u64
    }

    fn bytes_at(&self, offset: u64, len: u64) -> Result<&[u8], ReadError> {
        slice_range(self, offset, len)
    }
}

impl ByteSource for Vec<u8> {
    fn size(&self) -> u64 {
        self.len() as u64
    }

    fn bytes_at(&self, offset: u64, len: u64) -> Result<&[u8], ReadError> {
        slice_range(self, offset, len)
    }
}

/// Rebases every read of `backend` by `base`, scoping a parser to a sub-region
/// without copying it.
#[derive(Debug)]
pub struct OffsetView<'a, S: ?Sized> {
    backend: &'a S,
    base: u64,
}

impl<'a, S: ByteSource + ?Sized> OffsetView<'a, S> {
    pub fn new(backend: &'a S, base: u64) -> Self {
        OffsetView { backend, base }
    }

    pub fn base(&self) -> u64 {
        self.base
    }
}

impl<S: ByteSource + ?Sized> ByteSource for OffsetView<'_, S> {
    fn size(&self) -> u64 {
        self.backend.size().saturating_sub(self.base)
    }

    fn bytes_at(&self, offset: u64, len: u64) -> Result<&[u8], ReadError> {
        let absolute = self
            .base
            .checked_add(offset)
            .ok_or_else(|| ReadError::out_of_range(offset, len, self.size()))?;
        self.backend
            .bytes_at(absolute, len)
            .map_err(|_| ReadError::out_of_range(offset, len, self.size()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_big_endian_primitives() {
        let data = [0x12u8, 0x34, 0x56, 0x78, 0xFF, 0xFF];
        assert_eq!(data.read_u32(0).unwrap(), 0x1234_5678);
        assert_eq!(data.read_u16(2).unwrap(), 0x5678);
        assert_eq!(data.read_i16(4).unwrap(), -1);
        assert_eq!(data.read_u16(4).unwrap(), 0xFFFF);
    }

    #[test]
    fn read_past_end_is_out_of_range() {
        let data = [0u8; 6];
        assert_eq!(
            data.read_u32(4),
            Err(ReadError::OutOfRange {
                offset: 4,
                len: 4,
                size: 6
            })
        );
        assert!(data.read_bytes(u64::MAX, 2).is_err());
    }

    #[test]
    fn vec3_is_stored_z_y_x() {
        let mut data = Vec::new();
        data.extend_from_slice(&3.0f32.to_be_bytes());
        data.extend_from_slice(&2.0f32.to_be_bytes());
        data.extend_from_slice(&1.0f32.to_be_bytes());
        assert_eq!(data.read_vec3(0).unwrap(), Vec3::new(1.0, 2.0, 3.0));
    }

    #[test]
    fn wide_string_stops_at_zero_unit() {
        let data = [0x00u8, 0x48, 0x00, 0x69, 0x00, 0x00, 0x00, 0x41];
        assert_eq!(data.read_wide_string(0).unwrap(), "Hi");
    }

    #[test]
    fn wide_string_lone_surrogate_is_replaced() {
        let data = [0xD8u8, 0x00, 0x00, 0x41, 0x00, 0x00];
        assert_eq!(data.read_wide_string(0).unwrap(), "\u{FFFD}A");
    }

    #[test]
    fn unterminated_wide_string_is_out_of_range() {
        let data = [0x00u8, 0x48, 0x00];
        assert!(matches!(
            data.read_wide_string(0),
            Err(ReadError::OutOfRange { .. })
        ));
    }

    #[test]
    fn cstring_escapes_high_bytes() {
        let data = [b'a', 0xFF, b'b', 0x00, b'z'];
        assert_eq!(data.read_cstring(0).unwrap(), "aFFb");
        assert_eq!([0xFFu8, 0x00].read_cstring(0).unwrap(), "FF");
        assert_eq!(data.read_cstring(3).unwrap(), "");
    }

    #[test]
    fn unterminated_cstring_is_out_of_range() {
        let data = [b'a', b'b'];
        assert!(matches!(
            data.read_cstring(0),
            Err(ReadError::OutOfRange { .. })
        ));
    }

    #[test]
    fn offset_view_rebases_reads() {
        let data = [0xAAu8, 0xBB, 0x00, 0x00, 0x00, 0x2A];
        let view = OffsetView::new(&data[..], 2);
        assert_eq!(view.size(), 4);
        assert_eq!(view.read_u32(0).unwrap(), 42);
        assert_eq!(
            view.read_u16(3),
            Err(ReadError::OutOfRange {
                offset: 3,
                len: 2,
                size: 4
            })
        );

        let nested = OffsetView::new(&view, 2);
        assert_eq!(nested.read_u16(0).unwrap(), 0x002A);
    }

    #[test]
    fn ensure_range_checks_overflow() {
        let data = [0u8; 8];
        assert!(data.ensure_range(0, 8).is_ok());
        assert!(data.ensure_range(4, 5).is_err());
        assert!(data.ensure_range(u64::MAX, 1).is_err());
    }
}
