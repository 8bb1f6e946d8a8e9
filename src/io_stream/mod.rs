//! Streaming archive engine — writer and reader.
//!
//! # Writer
//! [`TarWriter`] appends entries one at a time as
//! `[header][content][zero padding to 512]` and writes the two-block zero
//! terminator when finalized.  Finalization happens at most once: either
//! explicitly through [`TarWriter::finalize`] / [`TarWriter::finish`] or
//! implicitly when the writer is dropped.
//!
//! # Reader
//! [`TarReader`] makes one forward pass over its source and keeps every
//! entry in memory, keyed by name.  After construction it performs no I/O
//! and can be shared between threads for lookups.

use std::collections::{BTreeMap, HashSet};
use std::io::{self, Cursor, Read, Write};

use crate::error::{ArchiveError, Result};
use crate::header::{Header, HeaderBlock, BLOCK_SIZE};

const ZERO_BLOCK: [u8; BLOCK_SIZE] = [0u8; BLOCK_SIZE];

// ── Writer ───────────────────────────────────────────────────────────────────

pub struct TarWriter<W: Write> {
    /// `None` only after [`TarWriter::finish`] handed the sink back.
    writer:        Option<W>,
    names:         HashSet<String>,
    /// Pinned header mtime; `None` stamps each header with the current time.
    mtime:         Option<u64>,
    finalized:     bool,
    bytes_written: u64,
}

impl<W: Write> TarWriter<W> {
    pub fn new(writer: W) -> Self {
        Self::with_options(writer, None)
    }

    pub fn with_options(writer: W, mtime: Option<u64>) -> Self {
        Self {
            writer:        Some(writer),
            names:         HashSet::new(),
            mtime,
            finalized:     false,
            bytes_written: 0,
        }
    }

    // ── Entry ingestion ──────────────────────────────────────────────────────

    /// Append one entry.
    ///
    /// Fails without touching the sink when the name was already used in
    /// this archive or does not fit the header.  An I/O failure part way
    /// through leaves the bytes already written in place.
    pub fn append(&mut self, name: &str, content: &[u8]) -> Result<()> {
        if self.finalized {
            return Err(ArchiveError::Finalized);
        }
        if self.names.contains(name) {
            return Err(ArchiveError::DuplicateName(name.to_owned()));
        }

        let size = content.len() as u64;
        let header = match self.mtime {
            Some(mtime) => Header::with_mtime(name, size, mtime),
            None        => Header::new(name, size),
        };
        let block = header.encode()?;
        self.names.insert(name.to_owned());

        let padding = header.padding() as usize;
        let writer = self.writer.as_mut().ok_or(ArchiveError::Finalized)?;
        writer.write_all(&block)?;
        writer.write_all(content)?;
        writer.write_all(&ZERO_BLOCK[..padding])?;

        self.bytes_written += (BLOCK_SIZE + content.len() + padding) as u64;
        tracing::debug!(name, size, padding, "appended entry");
        Ok(())
    }

    /// Append an entry whose content is produced by `fill`.
    pub fn append_with<F>(&mut self, name: &str, fill: F) -> Result<()>
    where
        F: FnOnce(&mut Vec<u8>) -> io::Result<()>,
    {
        let mut content = Vec::new();
        fill(&mut content)?;
        self.append(name, &content)
    }

    // ── Finalization ─────────────────────────────────────────────────────────

    /// Write the end-of-archive terminator and flush.  Later calls are no-ops.
    pub fn finalize(&mut self) -> Result<()> {
        if self.finalized {
            return Ok(());
        }
        let writer = self.writer.as_mut().ok_or(ArchiveError::Finalized)?;
        writer.write_all(&ZERO_BLOCK)?;
        writer.write_all(&ZERO_BLOCK)?;
        writer.flush()?;

        self.finalized      = true;
        self.bytes_written += 2 * BLOCK_SIZE as u64;
        tracing::debug!(entries = self.names.len(), bytes = self.bytes_written, "archive finalized");
        Ok(())
    }

    /// Finalize and return the underlying sink.
    pub fn finish(mut self) -> Result<W> {
        self.finalize()?;
        self.writer.take().ok_or(ArchiveError::Finalized)
    }

    // ── Metadata ─────────────────────────────────────────────────────────────

    pub fn len(&self) -> usize { self.names.len() }

    pub fn is_empty(&self) -> bool { self.names.is_empty() }

    pub fn is_finalized(&self) -> bool { self.finalized }

    /// Bytes emitted so far, terminator included once finalized.
    pub fn bytes_written(&self) -> u64 { self.bytes_written }
}

impl<W: Write> Drop for TarWriter<W> {
    fn drop(&mut self) {
        if self.finalized || self.writer.is_none() {
            return;
        }
        if let Err(e) = self.finalize() {
            tracing::warn!(error = %e, "failed to finalize archive on drop");
        }
    }
}

// ── Reader ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
struct IndexedEntry {
    mtime:   u64,
    content: Vec<u8>,
}

/// In-memory index of every entry in one archive.
#[derive(Debug, Clone, Default)]
pub struct TarReader {
    entries: BTreeMap<String, IndexedEntry>,
}

impl TarReader {
    /// Read the whole archive from `source` up to its terminator.
    pub fn new<R: Read>(mut source: R) -> Result<Self> {
        let mut entries = BTreeMap::new();
        let mut block: HeaderBlock = [0u8; BLOCK_SIZE];

        loop {
            source.read_exact(&mut block)
                .map_err(|e| truncated(e, "end of input before the next header".into()))?;

            if block == ZERO_BLOCK {
                source.read_exact(&mut block)
                    .map_err(|e| corrupt(e, "missing second terminator block"))?;
                if block != ZERO_BLOCK {
                    return Err(ArchiveError::CorruptArchive(
                        "first terminator block is followed by data".into(),
                    ));
                }
                break;
            }

            let header = Header::decode(&block)?;
            if entries.contains_key(&header.name) {
                return Err(ArchiveError::DuplicateName(header.name));
            }

            let content = read_content(&mut source, &header)?;
            let padding = header.padding() as usize;
            source.read_exact(&mut block[..padding]).map_err(|e| {
                truncated(e, format!("'{}': padding cut short", header.name))
            })?;

            tracing::debug!(name = %header.name, size = header.size, "indexed entry");
            entries.insert(header.name, IndexedEntry { mtime: header.mtime, content });
        }

        tracing::debug!(entries = entries.len(), "archive indexed");
        Ok(Self { entries })
    }

    // ── Lookup ───────────────────────────────────────────────────────────────

    pub fn get(&self, name: &str) -> Result<&[u8]> {
        self.entry(name).map(|e| e.content.as_slice())
    }

    /// `Read` access to the content of `name`.
    pub fn entry_reader(&self, name: &str) -> Result<Cursor<&[u8]>> {
        self.get(name).map(Cursor::new)
    }

    pub fn mtime(&self, name: &str) -> Result<u64> {
        self.entry(name).map(|e| e.mtime)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Entry names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// `(name, content)` pairs in name order.
    pub fn entries(&self) -> impl Iterator<Item = (&str, &[u8])> {
        self.entries.iter().map(|(n, e)| (n.as_str(), e.content.as_slice()))
    }

    pub fn len(&self) -> usize { self.entries.len() }

    pub fn is_empty(&self) -> bool { self.entries.is_empty() }

    fn entry(&self, name: &str) -> Result<&IndexedEntry> {
        self.entries.get(name).ok_or_else(|| ArchiveError::NotFound(name.to_owned()))
    }
}

// ── Internal helpers ─────────────────────────────────────────────────────────

fn read_content<R: Read>(source: &mut R, header: &Header) -> Result<Vec<u8>> {
    // Capacity is capped so a lying size field cannot force a huge allocation.
    let mut content = Vec::with_capacity(header.size.min(1 << 20) as usize);
    source.by_ref().take(header.size).read_to_end(&mut content)?;
    if (content.len() as u64) < header.size {
        return Err(ArchiveError::TruncatedEntry(format!(
            "'{}': {} of {} content bytes",
            header.name,
            content.len(),
            header.size
        )));
    }
    Ok(content)
}

fn truncated(e: io::Error, what: String) -> ArchiveError {
    match e.kind() {
        io::ErrorKind::UnexpectedEof => ArchiveError::TruncatedEntry(what),
        _ => ArchiveError::Io(e),
    }
}

fn corrupt(e: io::Error, what: &str) -> ArchiveError {
    match e.kind() {
        io::ErrorKind::UnexpectedEof => ArchiveError::CorruptArchive(what.into()),
        _ => ArchiveError::Io(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::header::{padding_for, seal, write_field, Field};

    const MTIME: u64 = 0o14_000_000_000;

    fn build(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let mut w = TarWriter::with_options(Vec::new(), Some(MTIME));
        for (name, data) in entries {
            w.append(name, data).unwrap();
        }
        w.finish().unwrap()
    }

    #[test]
    fn concrete_scenario() {
        let bytes = build(&[("a.txt", b"hello"), ("b.txt", b"")]);
        assert_eq!(bytes.len(), 2560);

        let r = TarReader::new(bytes.as_slice()).unwrap();
        assert_eq!(r.get("a.txt").unwrap(), b"hello");
        assert_eq!(r.get("b.txt").unwrap(), b"");
        assert!(matches!(r.get("c.txt"), Err(ArchiveError::NotFound(n)) if n == "c.txt"));
        assert_eq!(r.names().collect::<Vec<_>>(), ["a.txt", "b.txt"]);
        assert_eq!(r.mtime("a.txt").unwrap(), MTIME);
    }

    #[test]
    fn round_trip_block_edges() {
        for len in [0usize, 1, 511, 512, 513, 1024, 1500] {
            let data: Vec<u8> = (0..len).map(|i| (i % 251) as u8).collect();
            let bytes = build(&[("edge.bin", &data)]);
            assert_eq!(bytes.len() % BLOCK_SIZE, 0);
            let r = TarReader::new(bytes.as_slice()).unwrap();
            assert_eq!(r.get("edge.bin").unwrap(), data.as_slice(), "len {len}");
        }
    }

    #[test]
    fn padding_is_zero() {
        for len in [1usize, 100, 511, 513] {
            let data = vec![0xAAu8; len];
            let bytes = build(&[("p", &data)]);
            let start = BLOCK_SIZE + len;
            let pad = padding_for(len as u64) as usize;
            assert_eq!(pad, (512 - len % 512) % 512);
            assert!(bytes[start..start + pad].iter().all(|&b| b == 0));
            assert_eq!(bytes.len(), start + pad + 2 * BLOCK_SIZE);
        }
    }

    #[test]
    fn terminator_is_two_zero_blocks() {
        let bytes = build(&[("x", b"data")]);
        assert_eq!(bytes.len() % BLOCK_SIZE, 0);
        assert!(bytes[bytes.len() - 1024..].iter().all(|&b| b == 0));
    }

    #[test]
    fn empty_archive() {
        let bytes = build(&[]);
        assert_eq!(bytes.len(), 1024);
        let r = TarReader::new(bytes.as_slice()).unwrap();
        assert!(r.is_empty());
    }

    #[test]
    fn duplicate_append_rejected() {
        let mut w = TarWriter::new(Vec::new());
        w.append("a", b"x").unwrap();
        let before = w.bytes_written();
        assert!(matches!(w.append("a", b"y"), Err(ArchiveError::DuplicateName(n)) if n == "a"));
        assert_eq!(w.bytes_written(), before);
        assert_eq!(w.len(), 1);
    }

    #[test]
    fn duplicate_header_in_stream_rejected() {
        let first  = build(&[("a", b"one")]);
        let second = build(&[("a", b"two")]);
        // header + one content block from each, then a terminator
        let mut spliced = first[..1024].to_vec();
        spliced.extend_from_slice(&second[..1024]);
        spliced.extend_from_slice(&[0u8; 1024]);
        assert!(matches!(
            TarReader::new(spliced.as_slice()),
            Err(ArchiveError::DuplicateName(n)) if n == "a"
        ));
    }

    #[test]
    fn name_errors_leave_sink_untouched() {
        let mut w = TarWriter::new(Vec::new());
        assert!(matches!(w.append("", b"x"), Err(ArchiveError::EmptyName)));
        assert!(matches!(
            w.append(&"n".repeat(100), b"x"),
            Err(ArchiveError::NameTooLong { len: 100, .. })
        ));
        w.append(&"n".repeat(99), b"x").unwrap();
        let bytes = w.finish().unwrap();
        assert_eq!(bytes.len(), 4 * BLOCK_SIZE);
    }

    #[test]
    fn single_zero_block_then_eof_is_corrupt() {
        let mut bytes = build(&[("a", b"x")]);
        bytes.truncate(bytes.len() - BLOCK_SIZE);
        assert!(matches!(TarReader::new(bytes.as_slice()), Err(ArchiveError::CorruptArchive(_))));
    }

    #[test]
    fn data_after_first_zero_block_is_corrupt() {
        let mut bytes = build(&[("a", b"x")]);
        let last = bytes.len() - 1;
        bytes[last] = 1;
        assert!(matches!(TarReader::new(bytes.as_slice()), Err(ArchiveError::CorruptArchive(_))));
    }

    #[test]
    fn missing_terminator_is_truncated() {
        let mut bytes = build(&[("a", b"x")]);
        bytes.truncate(2 * BLOCK_SIZE);
        assert!(matches!(TarReader::new(bytes.as_slice()), Err(ArchiveError::TruncatedEntry(_))));
        assert!(matches!(TarReader::new(&[0u8; 0][..]), Err(ArchiveError::TruncatedEntry(_))));
        assert!(matches!(TarReader::new(&[0u8; 100][..]), Err(ArchiveError::TruncatedEntry(_))));
    }

    #[test]
    fn short_content_is_truncated() {
        let bytes = build(&[("big", &[7u8; 1000])]);
        assert!(matches!(
            TarReader::new(&bytes[..BLOCK_SIZE + 600]),
            Err(ArchiveError::TruncatedEntry(msg)) if msg.contains("big")
        ));
        assert!(matches!(
            TarReader::new(&bytes[..BLOCK_SIZE + 1010]),
            Err(ArchiveError::TruncatedEntry(_))
        ));
    }

    #[test]
    fn lying_size_field_is_truncated() {
        let mut bytes = build(&[("liar", b"abc")]);
        let mut block: HeaderBlock = [0u8; BLOCK_SIZE];
        block.copy_from_slice(&bytes[..BLOCK_SIZE]);
        write_field(&mut block, Field::Size, b"77777777777").unwrap();
        seal(&mut block).unwrap();
        bytes[..BLOCK_SIZE].copy_from_slice(&block);
        assert!(matches!(TarReader::new(bytes.as_slice()), Err(ArchiveError::TruncatedEntry(_))));
    }

    #[test]
    fn corrupted_header_is_format_error() {
        let mut bytes = build(&[("a", b"x")]);
        bytes[0] = b'b';
        assert!(matches!(TarReader::new(bytes.as_slice()), Err(ArchiveError::Format(_))));
    }

    #[test]
    fn trailing_bytes_after_terminator_are_ignored() {
        let mut bytes = build(&[("a", b"x")]);
        bytes.extend_from_slice(b"garbage");
        let r = TarReader::new(bytes.as_slice()).unwrap();
        assert_eq!(r.get("a").unwrap(), b"x");
    }

    #[test]
    fn finalize_is_idempotent_and_blocks_append() {
        let mut w = TarWriter::new(Vec::new());
        w.append("a", b"1").unwrap();
        w.finalize().unwrap();
        w.finalize().unwrap();
        assert!(w.is_finalized());
        assert!(matches!(w.append("b", b"2"), Err(ArchiveError::Finalized)));
        let bytes = w.finish().unwrap();
        assert_eq!(bytes.len(), 4 * BLOCK_SIZE);
        assert_eq!(TarReader::new(bytes.as_slice()).unwrap().len(), 1);
    }

    #[test]
    fn drop_writes_terminator() {
        let mut sink = Vec::new();
        {
            let mut w = TarWriter::new(&mut sink);
            w.append("dropped.txt", b"bye").unwrap();
        }
        assert_eq!(sink.len(), 4 * BLOCK_SIZE);
        let r = TarReader::new(sink.as_slice()).unwrap();
        assert_eq!(r.get("dropped.txt").unwrap(), b"bye");
    }

    #[test]
    fn append_with_callback() {
        let mut w = TarWriter::new(Vec::new());
        w.append_with("gen.txt", |buf| write!(buf, "{}-{}", 1, 2)).unwrap();
        let bytes = w.finish().unwrap();
        let r = TarReader::new(bytes.as_slice()).unwrap();
        let mut text = String::new();
        r.entry_reader("gen.txt").unwrap().read_to_string(&mut text).unwrap();
        assert_eq!(text, "1-2");
    }

    #[test]
    fn bytes_written_tracks_sink() {
        let mut w = TarWriter::new(Vec::new());
        w.append("a", &[1u8; 600]).unwrap();
        assert_eq!(w.bytes_written(), 512 + 1024);
        w.finalize().unwrap();
        assert_eq!(w.bytes_written(), 512 + 1024 + 1024);
    }
}
