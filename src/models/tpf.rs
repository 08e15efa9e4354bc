//! TPF texture containers.
//!
//! A flat table of textures; payloads are kept as the raw (big-endian,
//! block-compressed) bytes found in the file.

use std::fmt;

use rootcause::Report;
use thiserror::Error;

use crate::data::cursor::Cursor;
use crate::data::source::ByteSource;
use crate::error::ReadError;
use crate::recognized::Recognized;

const COUNT_OFFSET: u64 = 0x08;
const ENTRY_TABLE_OFFSET: u64 = 0x10;
const ENTRY_SIZE: u64 = 0x1C;

#[derive(Debug, Error)]
pub enum TpfError {
    #[error("read error")]
    Read(#[from] ReadError),
    #[error("{count} texture entries cannot fit in a {size} byte file")]
    TableTooLarge { count: u32, size: u64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum TextureFormat {
    Dxt1,
    Dxt5,
}

impl TryFrom<u16> for TextureFormat {
    type Error = u16;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        match value {
            0x0000 => Ok(TextureFormat::Dxt1),
            0x0500 => Ok(TextureFormat::Dxt5),
            other => Err(other),
        }
    }
}

impl fmt::Display for TextureFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TextureFormat::Dxt1 => f.write_str("DXT1"),
            TextureFormat::Dxt5 => f.write_str("DXT5"),
        }
    }
}

/// Which texture payloads to read.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TextureSelection {
    #[default]
    All,
    Only(usize),
    None,
}

impl TextureSelection {
    fn includes(self, index: usize) -> bool {
        match self {
            TextureSelection::All => true,
            TextureSelection::Only(i) => i == index,
            TextureSelection::None => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Texture {
    pub name: String,
    pub data_offset: u32,
    pub data_len: u32,
    pub format: Recognized<TextureFormat, u16>,
    pub subtype: u16,
    pub width: u16,
    pub height: u16,
    pub unknown0: u32,
    #[cfg_attr(feature = "serde", serde(skip))]
    pub data: Option<Vec<u8>>,
}

impl Texture {
    /// Raw format tag as stored.
    pub fn format_tag(&self) -> u16 {
        match self.format {
            Recognized::Known(TextureFormat::Dxt1) => 0x0000,
            Recognized::Known(TextureFormat::Dxt5) => 0x0500,
            Recognized::Unknown(raw) => raw,
        }
    }

    /// Payload bits per pixel, `data_len * 8 / (width * height)`. Zero for
    /// a zero-sized texture. DXT1 comes out at 4 and DXT5 at 8.
    pub fn bits_per_pixel(&self) -> f32 {
        let pixels = self.width as f32 * self.height as f32;
        if pixels == 0.0 {
            0.0
        } else {
            self.data_len as f32 * 8.0 / pixels
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct TextureContainer {
    pub textures: Vec<Texture>,
}

pub fn parse_tpf<S: ByteSource + ?Sized>(
    source: &S,
    selection: TextureSelection,
) -> Result<TextureContainer, Report<TpfError>> {
    let count = source.read_u32(COUNT_OFFSET).map_err(TpfError::from)?;
    if ENTRY_TABLE_OFFSET + count as u64 * ENTRY_SIZE > source.size() {
        return Err(Report::new(TpfError::TableTooLarge {
            count,
            size: source.size(),
        }));
    }

    let mut textures = Vec::with_capacity(count as usize);
    for index in 0..count as usize {
        let mut cursor = Cursor::at(source, ENTRY_TABLE_OFFSET + index as u64 * ENTRY_SIZE);
        let mut texture = read_entry(&mut cursor).map_err(TpfError::from)?;
        if selection.includes(index) {
            texture.data = Some(
                source
                    .read_bytes(texture.data_offset as u64, texture.data_len as u64)
                    .map_err(TpfError::from)?,
            );
        }
        textures.push(texture);
    }

    Ok(TextureContainer { textures })
}

fn read_entry<S: ByteSource + ?Sized>(cursor: &mut Cursor<'_, S>) -> Result<Texture, ReadError> {
    let data_offset = cursor.read_u32()?;
    let data_len = cursor.read_u32()?;
    let format = Recognized::from_raw(cursor.read_u16()?);
    let subtype = cursor.read_u16()?;
    let width = cursor.read_u16()?;
    let height = cursor.read_u16()?;
    let unknown0 = cursor.read_u32()?;
    let name = cursor.read_ptr_cstring()?;

    Ok(Texture {
        name,
        data_offset,
        data_len,
        format,
        subtype,
        width,
        height,
        unknown0,
        data: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::test_util::BlobWriter;

    fn build_tpf() -> Vec<u8> {
        let mut b = BlobWriter::new(0x80);
        b.put_bytes(0, b"TPF\0").put_u32(0x08, 2);

        b.put_u32(0x10, 0x60).put_u32(0x14, 8);
        b.put_u16(0x18, 0x0500).put_u16(0x1A, 1).put_u16(0x1C, 4).put_u16(0x1E, 4);
        b.put_u32(0x24, 0x48);

        b.put_u32(0x2C, 0x68).put_u32(0x30, 4);
        b.put_u16(0x34, 0x0300).put_u16(0x38, 2).put_u16(0x3A, 2);
        b.put_u32(0x40, 0x50);

        b.put_cstring(0x48, b"m10_a");
        b.put_cstring(0x50, b"m10_b\xE9");
        b.put_bytes(0x60, &[1, 2, 3, 4, 5, 6, 7, 8]);
        b.put_bytes(0x68, &[9, 9, 9, 9]);
        b.into_inner()
    }

    #[test]
    fn parses_entries_and_payloads() {
        let tpf = parse_tpf(&build_tpf(), TextureSelection::All).unwrap();
        assert_eq!(tpf.textures.len(), 2);

        let a = &tpf.textures[0];
        assert_eq!(a.name, "m10_a");
        assert_eq!(a.format, Recognized::Known(TextureFormat::Dxt5));
        assert_eq!((a.subtype, a.width, a.height), (1, 4, 4));
        assert_eq!(a.data.as_deref(), Some(&[1, 2, 3, 4, 5, 6, 7, 8][..]));
        assert_eq!(a.bits_per_pixel(), 4.0);

        let b = &tpf.textures[1];
        assert_eq!(b.name, "m10_bE9");
        assert_eq!(b.format, Recognized::Unknown(0x0300));
        assert_eq!(b.format_tag(), 0x0300);
        assert_eq!(b.data.as_deref(), Some(&[9, 9, 9, 9][..]));
    }

    #[test]
    fn selection_limits_payloads() {
        let data = build_tpf();
        let only = parse_tpf(&data, TextureSelection::Only(1)).unwrap();
        assert!(only.textures[0].data.is_none());
        assert!(only.textures[1].data.is_some());

        let none = parse_tpf(&data, TextureSelection::None).unwrap();
        assert!(none.textures.iter().all(|t| t.data.is_none()));
    }

    #[test]
    fn payload_past_end_fails() {
        let mut data = build_tpf();
        data[0x14..0x18].copy_from_slice(&0x1000u32.to_be_bytes());
        assert!(parse_tpf(&data, TextureSelection::All).is_err());
        assert!(parse_tpf(&data, TextureSelection::None).is_ok());
    }
}
