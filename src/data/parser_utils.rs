//! Shared winnow-based field decoders and small value types used by every format parser.

use std::fmt;

use winnow::Parser;
use winnow::binary::{be_f32, be_i16, be_u16, be_u32};
use winnow::combinator::repeat;
use winnow::error::{ContextError, ErrMode};

use crate::error::ReadError;

/// Common result type for winnow parsers.
pub type WResult<T> = Result<T, ErrMode<ContextError>>;

/// A fixed-width big-endian field decoder.
pub type FieldParser<T> = fn(&mut &[u8]) -> WResult<T>;

/// Decode a single big-endian field from exactly `bytes`.
///
/// This is the only place byte order is applied; every typed read on a
/// [`ByteSource`](crate::data::source::ByteSource) goes through it.
pub fn decode_be<T>(bytes: &[u8], offset: u64, parser: FieldParser<T>) -> Result<T, ReadError> {
    let input = &mut &bytes[..];
    parser(input).map_err(|e| ReadError::Decode {
        offset,
        detail: format!("{e}"),
    })
}

/// Decode `count` consecutive fields from the start of `bytes`.
pub fn decode_be_array<T>(
    bytes: &[u8],
    offset: u64,
    count: usize,
    parser: FieldParser<T>,
) -> Result<Vec<T>, ReadError> {
    let input = &mut &bytes[..];
    repeat(count, parser)
        .parse_next(input)
        .map_err(|e: ErrMode<ContextError>| ReadError::Decode {
            offset,
            detail: format!("{e}"),
        })
}

pub(crate) fn be_u32_field(input: &mut &[u8]) -> WResult<u32> {
    be_u32.parse_next(input)
}

pub(crate) fn be_u16_field(input: &mut &[u8]) -> WResult<u16> {
    be_u16.parse_next(input)
}

pub(crate) fn be_i16_field(input: &mut &[u8]) -> WResult<i16> {
    be_i16.parse_next(input)
}

pub(crate) fn be_f32_field(input: &mut &[u8]) -> WResult<f32> {
    be_f32.parse_next(input)
}

/// Render a NUL-free byte string the way the game tools always have: ASCII is
/// kept as-is, anything above 0x7F becomes two uppercase hex digits.
pub fn escape_legacy_bytes(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len());
    for &b in bytes {
        if b > 127 {
            out.push_str(&format!("{b:02X}"));
        } else {
            out.push(b as char);
        }
    }
    out
}

/// File name without directories or the last extension.
///
/// Paths stored by the engine use Windows separators, so both `\` and `/` are
/// treated as separators regardless of host.
pub fn file_stem(path: &str) -> &str {
    let name = path.rsplit(['\\', '/']).next().unwrap_or(path);
    match name.rfind('.') {
        Some(0) | None => name,
        Some(dot) => &name[..dot],
    }
}

/// Three single-precision floats.
///
/// On disk the components are stored z, y, x; see
/// [`ByteSource::read_vec3`](crate::data::source::ByteSource::read_vec3).
#[derive(Debug, Clone, Copy, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3 {
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Vec3 { x, y, z }
    }

    /// Render as `(x<sep>y<sep>z)`, each component signed, zero-padded to
    /// `width` and with three decimals, e.g. `(+001.000, -002.500, +000.000)`.
    pub fn format_signed(&self, sep: &str, width: usize) -> String {
        format!(
            "({:+0w$.3}{sep}{:+0w$.3}{sep}{:+0w$.3})",
            self.x,
            self.y,
            self.z,
            w = width
        )
    }
}

/// Honors the precision and `+` flags, e.g. `{:+.3}` renders `(+1.000,-2.500,+0.000)`.
impl fmt::Display for Vec3 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let plus = f.sign_plus();
        let precision = f.precision();
        let render = move |v: f32| match (plus, precision) {
            (true, Some(p)) => format!("{v:+.p$}"),
            (true, None) => format!("{v:+}"),
            (false, Some(p)) => format!("{v:.p$}"),
            (false, None) => format!("{v}"),
        };
        write!(
            f,
            "({},{},{})",
            render(self.x),
            render(self.y),
            render(self.z)
        )
    }
}

/// Axis-aligned bounding box.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct BoundingBox {
    pub min: Vec3,
    pub max: Vec3,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_big_endian_fields() {
        assert_eq!(
            decode_be(&[0x12, 0x34, 0x56, 0x78], 0, be_u32_field).unwrap(),
            0x1234_5678
        );
        assert_eq!(decode_be(&[0xFF, 0xFE], 0, be_i16_field).unwrap(), -2);
        assert_eq!(
            decode_be(&1.5f32.to_be_bytes(), 0, be_f32_field).unwrap(),
            1.5
        );
    }

    #[test]
    fn decodes_arrays() {
        let bytes = [0x00, 0x01, 0x00, 0x02, 0xFF, 0xFF, 0x99];
        assert_eq!(
            decode_be_array(&bytes, 0, 3, be_u16_field).unwrap(),
            vec![1, 2, 0xFFFF]
        );
        assert!(decode_be_array(&bytes, 0, 4, be_u16_field).is_err());
    }

    #[test]
    fn short_input_is_a_decode_error() {
        let err = decode_be(&[0x00], 7, be_u16_field).unwrap_err();
        assert!(matches!(err, ReadError::Decode { offset: 7, .. }));
    }

    #[test]
    fn escapes_high_bytes() {
        assert_eq!(escape_legacy_bytes(b"ab"), "ab");
        assert_eq!(escape_legacy_bytes(&[b'a', 0xFF, 0x80]), "aFF80");
    }

    #[test]
    fn file_stem_handles_windows_paths() {
        assert_eq!(file_stem("N:\\FRPG\\data\\tex\\m10_wall.tga"), "m10_wall");
        assert_eq!(file_stem("chr/c0000.flver"), "c0000");
        assert_eq!(file_stem("archive.tar.gz"), "archive.tar");
        assert_eq!(file_stem("noext"), "noext");
        assert_eq!(file_stem(".hidden"), ".hidden");
    }

    #[test]
    fn vec3_rendering() {
        let v = Vec3::new(1.0, -2.5, 0.0);
        assert_eq!(v.to_string(), "(1,-2.5,0)");
        assert_eq!(format!("{v:.2}"), "(1.00,-2.50,0.00)");
        assert_eq!(format!("{v:+.1}"), "(+1.0,-2.5,+0.0)");
        assert_eq!(v.format_signed(", ", 8), "(+001.000, -002.500, +000.000)");
        assert_eq!(v.format_signed(",", 7), "(+01.000,-02.500,+00.000)");
    }

    #[test]
    fn vec3_equality_is_componentwise() {
        assert_eq!(Vec3::new(1.0, 2.0, 3.0), Vec3::new(1.0, 2.0, 3.0));
        assert_ne!(Vec3::new(1.0, 2.0, 3.0), Vec3::new(1.0, 3.0, 3.0));
    }
}
