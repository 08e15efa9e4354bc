//! Memory-mapped file source.
//!
//! Maps a whole file once and serves every [`ByteSource`] read straight out of
//! the mapping, so seeking around offset tables never copies.

use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};

use memmap2::{Mmap, MmapOptions};

use crate::data::source::ByteSource;
use crate::error::ReadError;

/// A [`ByteSource`] backed by a memory-mapped file.
#[derive(Debug)]
pub struct MmapSource {
    path: PathBuf,
    // Zero-length files cannot be mapped on every platform.
    mmap: Option<Mmap>,
}

impl MmapSource {
    /// Open and map the file at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)?;
        let mmap = if file.metadata()?.len() == 0 {
            None
        } else {
            Some(unsafe { MmapOptions::new().map(&file)? })
        };

        Ok(MmapSource {
            path: path.to_owned(),
            mmap,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn data(&self) -> &[u8] {
        self.mmap.as_deref().unwrap_or(&[])
    }
}

impl ByteSource for MmapSource {
    fn size(&self) -> u64 {
        self.data().len() as u64
    }

    fn bytes_at(&self, offset: u64, len: u64) -> Result<&[u8], ReadError> {
        self.data().bytes_at(offset, len)
    }
}
