//! Filesystem-facing API — the primary embedding surface.
//!
//! ```no_run
//! use minitar::archive::{self, PackOptions};
//!
//! // Write
//! let mut ar = archive::create("out.tar", PackOptions::default())?;
//! ar.append("readme.txt", b"Hello, world!")?;
//! ar.finalize()?;
//!
//! // Read
//! let ar = archive::open("out.tar")?;
//! assert_eq!(ar.get("readme.txt")?, b"Hello, world!");
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::{Component, Path};

use serde::Serialize;

use crate::error::{ArchiveError, Result};
use crate::io_stream::{TarReader, TarWriter};

// ── PackOptions ───────────────────────────────────────────────────────────────

/// Configuration for [`create`].
#[derive(Debug, Clone, Default)]
pub struct PackOptions {
    /// Header mtime in seconds since the epoch.  `None` uses the current
    /// time for every entry.
    pub mtime: Option<u64>,
}

// ── EntryInfo ─────────────────────────────────────────────────────────────────

/// Lightweight descriptor returned by [`list`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntryInfo {
    pub name:  String,
    pub size:  u64,
    pub mtime: u64,
}

// ── Constructors ──────────────────────────────────────────────────────────────

/// Create (or truncate) `path` and return a writer for it.
pub fn create<P: AsRef<Path>>(path: P, opts: PackOptions) -> Result<TarWriter<BufWriter<File>>> {
    let path = path.as_ref();
    let file = File::create(path).map_err(|source| ArchiveError::Open {
        path: path.to_owned(),
        source,
    })?;
    tracing::debug!(path = %path.display(), "created archive");
    Ok(TarWriter::with_options(BufWriter::new(file), opts.mtime))
}

/// Open `path` and index every entry.
pub fn open<P: AsRef<Path>>(path: P) -> Result<TarReader> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|source| ArchiveError::Open {
        path: path.to_owned(),
        source,
    })?;
    TarReader::new(BufReader::new(file))
}

// ── Read helpers ──────────────────────────────────────────────────────────────

pub fn list(reader: &TarReader) -> Vec<EntryInfo> {
    reader.entries()
        .map(|(name, data)| EntryInfo {
            name:  name.to_owned(),
            size:  data.len() as u64,
            mtime: reader.mtime(name).unwrap_or_default(),
        })
        .collect()
}

/// Extract all entries into `dest`, creating it if necessary.  Returns the
/// number of files written.
pub fn extract_all<P: AsRef<Path>>(reader: &TarReader, dest: P) -> Result<usize> {
    let dest = dest.as_ref();
    for name in reader.names() {
        check_relative(name)?;
    }

    fs::create_dir_all(dest)?;
    let mut written = 0;
    for (name, data) in reader.entries() {
        let target = dest.join(name);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&target, data)?;
        tracing::debug!(path = %target.display(), bytes = data.len(), "extracted");
        written += 1;
    }
    Ok(written)
}

/// Entry names must stay below the destination directory.
fn check_relative(name: &str) -> Result<()> {
    let safe = Path::new(name)
        .components()
        .all(|c| matches!(c, Component::Normal(_) | Component::CurDir));
    if safe {
        Ok(())
    } else {
        Err(ArchiveError::UnsafePath(name.to_owned()))
    }
}
