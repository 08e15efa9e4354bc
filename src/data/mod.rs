/// Data-file scanning and entry extraction
pub mod bdf;
/// Archive header parsing and the header/data matching database
pub mod bhf;
/// Sequential reader over a byte source
pub mod cursor;
/// Compressed block headers and decompression
pub mod dcx;
// Field decoders and shared value types
pub mod parser_utils;
/// Random-access big-endian readers
pub mod source;
/// Backends for byte sources
pub mod wrappers;

#[cfg(test)]
pub(crate) mod test_util;
