//! `.bdf` data files: locating compressed entries and writing them out.
//!
//! A data file carries no table of contents. Its entries are found by scanning
//! for block headers, then named by matching the block layout against the
//! headers in an [`ArchiveDatabase`].

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Component, Path, PathBuf};

use bon::Builder;
use rootcause::Report;
use thiserror::Error;
use tracing::{debug, warn};

use crate::data::bhf::{ArchiveDatabase, ArchiveEntry};
use crate::data::dcx::{DcxBlock, DcxError, scan_blocks};
use crate::data::source::ByteSource;

/// Default output directory, relative to the working directory.
pub const DEFAULT_OUT_DIR: &str = "bdfout__";

const GUESSED_EXTENSION_LEN: usize = 3;

#[derive(Debug, Error)]
pub enum BdfError {
    #[error("failed to scan data file")]
    Scan(#[source] DcxError),
    #[error("entry {index} ({name})")]
    Entry {
        index: usize,
        name: String,
        #[source]
        source: DcxError,
    },
    #[error("failed to write {}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

#[derive(Debug, Clone, Builder)]
pub struct ExtractOptions {
    #[builder(into, default = PathBuf::from(DEFAULT_OUT_DIR))]
    pub out_dir: PathBuf,
    /// When false entries are only decompressed and listed.
    #[builder(default = true)]
    pub write_files: bool,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// A data file's entries, named from a matching header when one was found.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct ResolvedArchive {
    /// File stem of the data file.
    pub name: String,
    /// Name of the header file the entries were matched to.
    pub header: Option<String>,
    pub entries: Vec<ArchiveEntry>,
}

/// Scan a data file and resolve its entry names against `db`.
pub fn scan_bdf<S: ByteSource + ?Sized>(
    name: &str,
    source: &S,
    db: &ArchiveDatabase,
) -> Result<ResolvedArchive, Report<BdfError>> {
    let blocks = scan_blocks(source).map_err(BdfError::Scan)?;
    debug!("{name}: {} blocks", blocks.len());

    let mut entries: Vec<ArchiveEntry> = blocks
        .iter()
        .enumerate()
        .map(|(index, block)| ArchiveEntry {
            index,
            name: format!("__undefined__{name}_{index}"),
            offset: block.offset as u32,
            size: block.size,
            compressed_size_header: 0,
            compressed_size_data: block.compressed_size,
        })
        .collect();

    let offsets: Vec<u32> = entries.iter().map(|e| e.offset).collect();
    let header = db.find_match(&offsets).map(|header| {
        for (entry, named) in entries.iter_mut().zip(&header.entries) {
            entry.name = named.name.clone();
            entry.compressed_size_header = named.compressed_size_header;
        }
        header.name.clone()
    });

    Ok(ResolvedArchive {
        name: name.to_string(),
        header,
        entries,
    })
}

/// Output name for an entry: `.dcx` is dropped, and names without any
/// extension get one guessed from the first bytes of the payload.
pub fn output_name(entry_name: &str, payload: &[u8]) -> String {
    if !entry_name.contains('.') {
        let guessed: String = payload
            .iter()
            .take(GUESSED_EXTENSION_LEN)
            .filter(|b| b.is_ascii_alphanumeric())
            .map(|&b| b as char)
            .collect();
        if guessed.is_empty() {
            entry_name.to_string()
        } else {
            format!("{entry_name}.{guessed}")
        }
    } else if let Some(stripped) = entry_name.strip_suffix(".dcx") {
        stripped.to_string()
    } else {
        entry_name.to_string()
    }
}

/// Turn an archive path like `\chr\c0000.flver` into a relative host path.
///
/// Only plain name components survive, so the result never climbs out of the
/// directory it is joined to: `.`, `..`, roots and drive prefixes are dropped.
pub fn relative_output_path(name: &str) -> PathBuf {
    name.split(['\\', '/'])
        .flat_map(|part| Path::new(part).components())
        .filter_map(|component| match component {
            Component::Normal(part) => Some(part),
            _ => None,
        })
        .collect()
}

/// `path`, or the first `path_ovr-NN` that does not exist yet.
pub fn unused_path(path: &Path) -> PathBuf {
    let mut candidate = path.to_path_buf();
    let mut attempt = 0u32;
    while candidate.exists() {
        let mut name = path.as_os_str().to_owned();
        name.push(format!("_ovr-{attempt:02}"));
        candidate = PathBuf::from(name);
        attempt += 1;
    }
    candidate
}

/// One successfully decompressed entry.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct ExtractedEntry {
    pub entry: ArchiveEntry,
    /// Name after extension fix-ups, still in archive form.
    pub output_name: String,
    /// Where the entry was written, if files were written.
    pub path: Option<PathBuf>,
    pub bytes: u64,
}

/// Result of extracting one data file. Failed entries don't stop the rest.
#[derive(Debug, Default)]
pub struct ExtractReport {
    pub extracted: Vec<ExtractedEntry>,
    pub failures: Vec<Report<BdfError>>,
}

/// Decompress every entry of `archive` and, if configured, write it below
/// `options.out_dir`.
pub fn extract_archive<S: ByteSource + ?Sized>(
    archive: &ResolvedArchive,
    source: &S,
    options: &ExtractOptions,
) -> ExtractReport {
    let mut report = ExtractReport::default();
    for entry in &archive.entries {
        match extract_entry(entry, source, options) {
            Ok(extracted) => report.extracted.push(extracted),
            Err(e) => {
                warn!("{}: {e}", archive.name);
                report.failures.push(Report::new(e));
            }
        }
    }
    report
}

fn extract_entry<S: ByteSource + ?Sized>(
    entry: &ArchiveEntry,
    source: &S,
    options: &ExtractOptions,
) -> Result<ExtractedEntry, BdfError> {
    let entry_error = |source: DcxError| BdfError::Entry {
        index: entry.index,
        name: entry.name.clone(),
        source,
    };

    let block = DcxBlock::read(source, entry.offset as u64).map_err(entry_error)?;
    let payload = block.decompress(source).map_err(entry_error)?;
    let output_name = output_name(&entry.name, &payload);

    let path = if options.write_files {
        Some(write_entry(
            &options.out_dir.join(relative_output_path(&output_name)),
            &payload,
        )?)
    } else {
        None
    };

    Ok(ExtractedEntry {
        entry: entry.clone(),
        output_name,
        path,
        bytes: payload.len() as u64,
    })
}

fn write_entry(target: &Path, payload: &[u8]) -> Result<PathBuf, BdfError> {
    let write_error = |path: &Path| {
        let path = path.to_path_buf();
        move |source: io::Error| BdfError::Write { path, source }
    };

    if let Some(dir) = target.parent() {
        fs::create_dir_all(dir).map_err(write_error(dir))?;
    }
    let path = unused_path(target);
    let mut file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&path)
        .map_err(write_error(&path))?;
    file.write_all(payload).map_err(write_error(&path))?;
    Ok(path)
}
