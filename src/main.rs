use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use rayon::prelude::*;
use rootcause::prelude::*;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use dksunpack::data::bdf::{self, ExtractOptions};
use dksunpack::data::bhf::ArchiveDatabase;
use dksunpack::data::wrappers::mmap::MmapSource;
use dksunpack::export::dump;
use dksunpack::models::{flver, hkx, msb, tpf};

/// Extract and inspect Dark Souls archives, meshes, textures, collision and maps
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Log at debug level. RUST_LOG takes precedence when set.
    #[clap(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Extract every .bdf data file in a directory, naming entries from the
    /// .bhf headers in another
    ExtractBdf {
        bhf_dir: PathBuf,
        bdf_dir: PathBuf,

        /// Output directory
        #[clap(short, long, default_value = bdf::DEFAULT_OUT_DIR)]
        out_dir: PathBuf,

        /// Decompress and list entries without writing them
        #[clap(long)]
        list_only: bool,
    },
    /// Dump FLVER mesh structure
    DumpFlver {
        /// Only decode the tables, skipping index and vertex data
        #[clap(long)]
        no_data: bool,

        /// List every vertex instead of the structure
        #[clap(long, conflicts_with = "no_data")]
        vertices: bool,

        /// Print the decoded file as JSON
        #[clap(long, conflicts_with = "vertices")]
        json: bool,

        /// Files or glob patterns
        #[clap(required = true)]
        files: Vec<String>,
    },
    /// List the textures in TPF containers
    DumpTpf {
        /// Don't read texture payloads
        #[clap(long)]
        no_data: bool,

        #[clap(required = true)]
        files: Vec<String>,
    },
    /// List models, parts and points of MSB map files
    DumpMsb {
        #[clap(required = true)]
        files: Vec<String>,
    },
    /// Summarize collision meshes in HKX files
    DumpHkx {
        #[clap(required = true)]
        files: Vec<String>,
    },
}

#[derive(Debug, Clone, Copy)]
enum DumpKind {
    Flver { load_data: bool, vertices: bool, json: bool },
    Tpf { selection: tpf::TextureSelection },
    Msb,
    Hkx,
}

fn stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Expand each pattern; a pattern matching nothing is kept as a literal path
/// so opening it reports the problem.
fn expand_patterns(patterns: &[String]) -> Result<Vec<PathBuf>, Report> {
    let mut paths = Vec::new();
    for pattern in patterns {
        let before = paths.len();
        for entry in glob::glob(pattern).context_with(|| format!("Bad pattern: {pattern}"))? {
            paths.push(entry.context("Failed to read directory entry")?);
        }
        if paths.len() == before {
            paths.push(PathBuf::from(pattern));
        }
    }
    Ok(paths)
}

fn files_with_extension(dir: &Path, extension: &str) -> Result<Vec<PathBuf>, Report> {
    let pattern = dir.join(format!("*.{extension}"));
    let mut paths = Vec::new();
    for entry in glob::glob(&pattern.to_string_lossy())
        .context_with(|| format!("Bad directory: {}", dir.display()))?
    {
        let path = entry.context("Failed to read directory entry")?;
        if path.is_file() {
            paths.push(path);
        }
    }
    Ok(paths)
}

fn open(path: &Path) -> Result<MmapSource, Report> {
    Ok(MmapSource::open(path).context_with(|| format!("Could not open {}", path.display()))?)
}

fn dump_file(kind: DumpKind, path: &Path) -> Result<Vec<u8>, Report> {
    let source = open(path)?;
    let name = stem(source.path());
    let mut out = Vec::new();

    match kind {
        DumpKind::Flver {
            load_data,
            vertices,
            json,
        } => {
            let options = flver::ParseOptions::builder().load_data(load_data).build();
            let flver = flver::parse_flver(&source, &options).context("Failed to parse FLVER")?;
            if json {
                serde_json::to_writer_pretty(&mut out, &flver)?;
                writeln!(out)?;
            } else if vertices {
                dump::dump_flver_vertices(&path.display().to_string(), &flver, &mut out)?;
            } else {
                writeln!(out, "flv {}", path.display())?;
                dump::dump_flver(&flver, &mut out)?;
            }
        }
        DumpKind::Tpf { selection } => {
            let tpf = tpf::parse_tpf(&source, selection).context("Failed to parse TPF")?;
            dump::dump_tpf(&name, &tpf, &mut out)?;
        }
        DumpKind::Msb => {
            let scene = msb::parse_msb(&source).context("Failed to parse MSB")?;
            writeln!(out, "msb {}", path.display())?;
            dump::dump_msb(&scene, &mut out)?;
        }
        DumpKind::Hkx => {
            let geometry = hkx::parse_hkx(&source).context("Failed to parse HKX")?;
            dump::dump_hkx(&name, &geometry, &mut out)?;
        }
    }
    Ok(out)
}

/// Dump every file in parallel, printing results in argument order.
/// Returns the number of files that failed and whether there was only one.
fn dump_files(kind: DumpKind, patterns: &[String]) -> Result<(usize, bool), Report> {
    let paths = expand_patterns(patterns)?;
    let results: Vec<_> = paths
        .par_iter()
        .map(|path| (path, dump_file(kind, path)))
        .collect();

    let mut stdout = io::stdout().lock();
    let mut failures = 0;
    for (path, result) in results {
        match result {
            Ok(text) => stdout.write_all(&text)?,
            Err(report) => {
                failures += 1;
                eprintln!("{}: {report}", path.display());
            }
        }
    }
    Ok((failures, paths.len() == 1))
}

fn extract_one(
    path: &Path,
    db: &ArchiveDatabase,
    options: &ExtractOptions,
) -> Result<(Vec<u8>, usize), Report> {
    let source = open(path)?;
    let archive = bdf::scan_bdf(&stem(path), &source, db).context("Failed to scan data file")?;
    let report = bdf::extract_archive(&archive, &source, options);

    let mut out = Vec::new();
    writeln!(out, "{}", path.display())?;
    dump::dump_extract_report(&archive, &report, &mut out)?;
    Ok((out, report.failures.len()))
}

/// Returns the number of header files, data files or entries that failed.
fn extract_bdfs(bhf_dir: &Path, bdf_dir: &Path, options: &ExtractOptions) -> Result<usize, Report> {
    // Every header is published before any data file is matched against them.
    let mut db = ArchiveDatabase::new();
    info!("parsing bhfs...");
    let header_failures = db.publish_files(&files_with_extension(bhf_dir, "bhf")?).len();
    info!("{} headers", db.len());

    info!("parsing bdfs...");
    let db = &db;
    let failures: usize = files_with_extension(bdf_dir, "bdf")?
        .par_iter()
        .map(|path| match extract_one(path, db, options) {
            Ok((text, failed)) => match io::stdout().lock().write_all(&text) {
                Ok(()) => failed,
                Err(e) => {
                    warn!("{}: failed to write listing: {e}", path.display());
                    failed + 1
                }
            },
            Err(report) => {
                eprintln!("{}: {report}", path.display());
                1
            }
        })
        .sum();
    Ok(header_failures + failures)
}

fn main() -> Result<ExitCode, Report> {
    let args = Args::parse();

    let default_level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(io::stderr)
        .init();

    let (failures, single_file) = match args.command {
        Command::ExtractBdf {
            bhf_dir,
            bdf_dir,
            out_dir,
            list_only,
        } => {
            let options = ExtractOptions::builder()
                .out_dir(out_dir)
                .write_files(!list_only)
                .build();
            (extract_bdfs(&bhf_dir, &bdf_dir, &options)?, false)
        }
        Command::DumpFlver {
            no_data,
            vertices,
            json,
            files,
        } => {
            let kind = DumpKind::Flver {
                load_data: !no_data,
                vertices,
                json,
            };
            dump_files(kind, &files)?
        }
        Command::DumpTpf { no_data, files } => {
            let selection = if no_data {
                tpf::TextureSelection::None
            } else {
                tpf::TextureSelection::All
            };
            dump_files(DumpKind::Tpf { selection }, &files)?
        }
        Command::DumpMsb { files } => dump_files(DumpKind::Msb, &files)?,
        Command::DumpHkx { files } => dump_files(DumpKind::Hkx, &files)?,
    };

    if failures > 0 {
        warn!("{failures} failures");
    }
    if single_file && failures > 0 {
        return Ok(ExitCode::FAILURE);
    }
    Ok(ExitCode::SUCCESS)
}
