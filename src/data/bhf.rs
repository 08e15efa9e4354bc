//! `.bhf` archive headers.
//!
//! A header file lists the name and data-file offset of every entry of its
//! companion `.bdf` data file. Header and data files are not paired by name on
//! disk, so parsed headers are collected into an [`ArchiveDatabase`] that data
//! files are later matched against by their block layout.

use std::io;
use std::path::{Path, PathBuf};

use rootcause::Report;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::data::source::ByteSource;
use crate::data::wrappers::mmap::MmapSource;
use crate::error::ReadError;

const ENTRY_COUNT_OFFSET: u64 = 0x10;
const ENTRY_TABLE_OFFSET: u64 = 0x20;
const ENTRY_STRIDE: u64 = 0x18;

#[derive(Debug, Error)]
pub enum BhfError {
    #[error("entry table of {count} entries does not fit in {size} bytes")]
    EntryTableTooLarge { count: u32, size: u64 },
    #[error("read error")]
    Read(#[from] ReadError),
    #[error("could not open {}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// One entry of an archive.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct ArchiveEntry {
    pub index: usize,
    pub name: String,
    /// Offset of the entry's compressed block in the data file.
    pub offset: u32,
    /// Uncompressed size. Only known once the data file has been scanned.
    pub size: u32,
    /// Compressed size as recorded by the header file.
    pub compressed_size_header: u32,
    /// Compressed size as recorded by the block itself.
    pub compressed_size_data: u32,
}

/// A parsed header file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct ArchiveHeader {
    /// File stem of the header file.
    pub name: String,
    pub entries: Vec<ArchiveEntry>,
}

impl ArchiveHeader {
    /// Whether a data file whose blocks sit at `offsets` belongs to this header.
    pub fn matches_offsets(&self, offsets: &[u32]) -> bool {
        self.entries.len() == offsets.len()
            && self
                .entries
                .iter()
                .zip(offsets)
                .all(|(entry, &offset)| entry.offset == offset)
    }
}

/// Parse a `.bhf` header file named `name`.
pub fn parse_bhf<S: ByteSource + ?Sized>(
    name: &str,
    source: &S,
) -> Result<ArchiveHeader, Report<BhfError>> {
    let count = source.read_u32(ENTRY_COUNT_OFFSET).map_err(BhfError::from)?;
    if ENTRY_TABLE_OFFSET + count as u64 * ENTRY_STRIDE > source.size() {
        return Err(Report::new(BhfError::EntryTableTooLarge {
            count,
            size: source.size(),
        }));
    }

    let mut entries = Vec::with_capacity(count as usize);
    for index in 0..count as usize {
        let base = ENTRY_TABLE_OFFSET + index as u64 * ENTRY_STRIDE;
        let name_offset = source.read_u32(base + 16).map_err(BhfError::from)?;
        entries.push(ArchiveEntry {
            index,
            name: source
                .read_cstring(name_offset as u64)
                .map_err(BhfError::from)?,
            offset: source.read_u32(base + 8).map_err(BhfError::from)?,
            compressed_size_header: source.read_u32(base + 4).map_err(BhfError::from)?,
            ..Default::default()
        });
    }

    debug!("{name}: {} entries", entries.len());

    Ok(ArchiveHeader {
        name: name.to_string(),
        entries,
    })
}

/// Open and parse the header file at `path`, named by its file stem.
pub fn load_bhf(path: &Path) -> Result<ArchiveHeader, Report<BhfError>> {
    let source = MmapSource::open(path).map_err(|source| BhfError::Open {
        path: path.to_path_buf(),
        source,
    })?;
    let name = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    parse_bhf(&name, &source)
}

/// Every header parsed so far, in the order they were published.
///
/// Build it single-threaded, then share it by reference with the extraction
/// workers; lookups never modify it.
#[derive(Debug, Default)]
pub struct ArchiveDatabase {
    headers: Vec<ArchiveHeader>,
}

impl ArchiveDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publish(&mut self, header: ArchiveHeader) {
        self.headers.push(header);
    }

    /// Load and publish the header files at `paths` in order. Files that
    /// can't be opened or parsed are skipped and returned.
    pub fn publish_files<P: AsRef<Path>>(&mut self, paths: &[P]) -> Vec<Report<BhfError>> {
        let mut failures = Vec::new();
        for path in paths {
            let path = path.as_ref();
            info!("{}", path.display());
            match load_bhf(path) {
                Ok(header) => self.publish(header),
                Err(report) => {
                    warn!("{}: {report}", path.display());
                    failures.push(report);
                }
            }
        }
        failures
    }

    pub fn headers(&self) -> &[ArchiveHeader] {
        &self.headers
    }

    pub fn len(&self) -> usize {
        self.headers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.headers.is_empty()
    }

    /// First published header with exactly these block offsets.
    pub fn find_match(&self, offsets: &[u32]) -> Option<&ArchiveHeader> {
        let found = self
            .headers
            .iter()
            .find(|header| header.matches_offsets(offsets));
        if let Some(header) = found {
            info!("matched {} entries to header {}", offsets.len(), header.name);
        }
        found
    }
}
