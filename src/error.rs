use thiserror::Error;

/// Failure reading from a [`ByteSource`](crate::data::source::ByteSource).
///
/// Every format parser in this crate bottoms out in one of these. An
/// out-of-range read almost always means an offset table was misparsed or the
/// file is corrupt, so parsers propagate it instead of recovering.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReadError {
    #[error("read of {len} bytes at 0x{offset:X} exceeds source size 0x{size:X}")]
    OutOfRange { offset: u64, len: u64, size: u64 },
    #[error("failed to decode field at 0x{offset:X}: {detail}")]
    Decode { offset: u64, detail: String },
}

impl ReadError {
    pub fn out_of_range(offset: u64, len: u64, size: u64) -> Self {
        ReadError::OutOfRange { offset, len, size }
    }
}
