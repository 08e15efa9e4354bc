//! Builders for synthetic big-endian test files.

use crate::data::parser_utils::Vec3;

/// A growable byte buffer with positioned big-endian writes.
#[derive(Debug, Default)]
pub struct BlobWriter {
    pub buf: Vec<u8>,
}

impl BlobWriter {
    pub fn new(len: usize) -> Self {
        BlobWriter { buf: vec![0; len] }
    }

    fn reserve_to(&mut self, end: usize) {
        if self.buf.len() < end {
            self.buf.resize(end, 0);
        }
    }

    pub fn put_bytes(&mut self, at: usize, bytes: &[u8]) -> &mut Self {
        self.reserve_to(at + bytes.len());
        self.buf[at..at + bytes.len()].copy_from_slice(bytes);
        self
    }

    pub fn put_u32(&mut self, at: usize, v: u32) -> &mut Self {
        self.put_bytes(at, &v.to_be_bytes())
    }

    pub fn put_u16(&mut self, at: usize, v: u16) -> &mut Self {
        self.put_bytes(at, &v.to_be_bytes())
    }

    pub fn put_i16(&mut self, at: usize, v: i16) -> &mut Self {
        self.put_bytes(at, &v.to_be_bytes())
    }

    pub fn put_f32(&mut self, at: usize, v: f32) -> &mut Self {
        self.put_bytes(at, &v.to_be_bytes())
    }

    /// Write a vector in on-disk z, y, x order.
    pub fn put_vec3(&mut self, at: usize, v: Vec3) -> &mut Self {
        self.put_f32(at, v.z).put_f32(at + 4, v.y).put_f32(at + 8, v.x)
    }

    /// Write a zero-terminated UTF-16BE string; returns the offset after the terminator.
    pub fn put_wide(&mut self, at: usize, s: &str) -> usize {
        let mut pos = at;
        for unit in s.encode_utf16() {
            self.put_u16(pos, unit);
            pos += 2;
        }
        self.put_u16(pos, 0);
        pos + 2
    }

    /// Write a NUL-terminated byte string; returns the offset after the terminator.
    pub fn put_cstring(&mut self, at: usize, s: &[u8]) -> usize {
        self.put_bytes(at, s);
        self.put_bytes(at + s.len(), &[0]);
        at + s.len() + 1
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.buf
    }
}
