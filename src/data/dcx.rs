//! `DCX` compressed blocks as found inside `.bdf` data files.
//!
//! A block is a 0x4C byte header followed by a zlib stream. Only the three
//! header fields needed for extraction are decoded.

use std::io::{self, Read, Write};

use flate2::read::ZlibDecoder;
use thiserror::Error;

use crate::data::source::ByteSource;
use crate::error::ReadError;

/// `DCX\0` read as a big-endian word.
pub const DCX_MAGIC: u32 = 0x4443_5800;

/// Offset of the zlib stream from the start of a block.
pub const DCX_PAYLOAD_OFFSET: u64 = 0x4C;

const UNCOMPRESSED_SIZE_OFFSET: u64 = 7 * 4;
const COMPRESSED_SIZE_OFFSET: u64 = 8 * 4;

#[derive(Debug, Error)]
pub enum DcxError {
    #[error("no DCX block at 0x{0:X}")]
    MissingMagic(u64),
    #[error("malformed compressed block at 0x{offset:X}: {reason}")]
    MalformedCompressedBlock { offset: u64, reason: String },
    #[error("read error")]
    Read(#[from] ReadError),
    #[error("I/O error")]
    Io(#[from] io::Error),
}

/// Location and sizes of one compressed block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct DcxBlock {
    pub offset: u64,
    pub size: u32,
    pub compressed_size: u32,
}

impl DcxBlock {
    /// Read the block header at `offset`, checking the magic.
    pub fn read<S: ByteSource + ?Sized>(source: &S, offset: u64) -> Result<Self, DcxError> {
        if source.read_u32(offset)? != DCX_MAGIC {
            return Err(DcxError::MissingMagic(offset));
        }
        Ok(DcxBlock {
            offset,
            size: source.read_u32(offset + UNCOMPRESSED_SIZE_OFFSET)?,
            compressed_size: source.read_u32(offset + COMPRESSED_SIZE_OFFSET)?,
        })
    }

    /// Offset at which the scan for the next block resumes.
    ///
    /// Blocks start 16-byte aligned, so the end of this one is rounded down. If
    /// that would not move forward the scan steps a single slot instead.
    pub fn next_scan_offset(&self) -> u64 {
        let next = (self.offset + self.compressed_size as u64) & !0xF;
        if next > self.offset {
            next
        } else {
            self.offset + 16
        }
    }

    /// Inflate this block into `out`, writing at most `size` bytes.
    ///
    /// Returns the number of bytes written.
    pub fn decompress_into<S: ByteSource + ?Sized, W: Write>(
        &self,
        source: &S,
        out: &mut W,
    ) -> Result<u64, DcxError> {
        let start = self.offset + DCX_PAYLOAD_OFFSET;
        let available = source.size().saturating_sub(start);
        let payload = source.bytes_at(start, available)?;

        let mut decoder = ZlibDecoder::new(payload).take(self.size as u64);
        io::copy(&mut decoder, out).map_err(|e| match e.kind() {
            io::ErrorKind::InvalidInput | io::ErrorKind::InvalidData => {
                DcxError::MalformedCompressedBlock {
                    offset: self.offset,
                    reason: e.to_string(),
                }
            }
            _ => DcxError::Io(e),
        })
    }

    pub fn decompress<S: ByteSource + ?Sized>(&self, source: &S) -> Result<Vec<u8>, DcxError> {
        let mut out = Vec::with_capacity(self.size as usize);
        self.decompress_into(source, &mut out)?;
        Ok(out)
    }
}

/// Walk `source` in 16-byte steps and collect every block header found.
pub fn scan_blocks<S: ByteSource + ?Sized>(source: &S) -> Result<Vec<DcxBlock>, DcxError> {
    let mut blocks = Vec::new();
    let mut offset = 0u64;
    // A trailing partial word cannot hold a header.
    while offset + 4 <= source.size() {
        if source.read_u32(offset)? == DCX_MAGIC {
            let block = DcxBlock::read(source, offset)?;
            offset = block.next_scan_offset();
            blocks.push(block);
        } else {
            offset += 16;
        }
    }
    Ok(blocks)
}
