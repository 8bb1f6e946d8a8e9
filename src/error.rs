use std::io;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ArchiveError {
    #[error("cannot open {}: {source}", path.display())]
    Open { path: PathBuf, source: io::Error },
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("malformed header: {0}")]
    Format(String),
    #[error("field '{field}' overflow: {detail}")]
    FieldOverflow { field: &'static str, detail: String },
    #[error("duplicate entry name: {0}")]
    DuplicateName(String),
    #[error("entry name is empty")]
    EmptyName,
    #[error("entry name is {len} bytes, max 99: {name}")]
    NameTooLong { name: String, len: usize },
    #[error("entry name contains NUL: {0:?}")]
    NulInName(String),
    #[error("corrupt archive: {0}")]
    CorruptArchive(String),
    #[error("truncated entry: {0}")]
    TruncatedEntry(String),
    #[error("entry not found: {0}")]
    NotFound(String),
    #[error("archive already finalized")]
    Finalized,
    #[error("entry name escapes destination directory: {0}")]
    UnsafePath(String),
}

pub type Result<T> = std::result::Result<T, ArchiveError>;
