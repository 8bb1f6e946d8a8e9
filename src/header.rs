//! ustar header records.
//!
//! Every entry starts with one 512-byte header.  Only the fields needed
//! for plain files are populated: `name`, `mode`, `size`, `mtime`,
//! `typeflag`, `magic` and `checksum`.  Everything else is zero filled.
//!
//! # Checksum
//! The checksum field is treated as eight ASCII spaces, all 512 bytes are
//! summed as unsigned values and the sum is stored as six octal digits
//! followed by NUL and a space.

use std::ops::Range;

use chrono::Utc;

use crate::error::{ArchiveError, Result};
use crate::numeric::{format_octal, parse_octal};

/// Alignment unit for headers, content padding and the terminator.
pub const BLOCK_SIZE: usize = 512;
/// Longest accepted entry name in bytes.
pub const MAX_NAME_LEN: usize = 99;

pub const MAGIC:    &[u8] = b"ustar";
pub const MODE:     &[u8] = b"000644";
pub const TYPEFLAG: &[u8] = b"0";

/// One raw header record.
pub type HeaderBlock = [u8; BLOCK_SIZE];

// ── Field table ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    pub offset: usize,
    pub len:    usize,
}

const fn spec(offset: usize, len: usize) -> FieldSpec {
    FieldSpec { offset, len }
}

/// Byte layout of a header, indexed by [`Field`].
pub const FIELD_LAYOUT: [FieldSpec; 17] = [
    spec(0, 100),   // name
    spec(100, 8),   // mode
    spec(108, 8),   // uid
    spec(116, 8),   // gid
    spec(124, 12),  // size
    spec(136, 12),  // mtime
    spec(148, 8),   // checksum
    spec(156, 1),   // typeflag
    spec(157, 100), // linkname
    spec(257, 6),   // magic
    spec(263, 2),   // version
    spec(265, 32),  // uname
    spec(297, 32),  // gname
    spec(329, 8),   // devmajor
    spec(337, 8),   // devminor
    spec(345, 155), // prefix
    spec(500, 12),  // pad
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Name,
    Mode,
    Uid,
    Gid,
    Size,
    Mtime,
    Checksum,
    Typeflag,
    Linkname,
    Magic,
    Version,
    Uname,
    Gname,
    Devmajor,
    Devminor,
    Prefix,
    Pad,
}

impl Field {
    pub const ALL: [Field; 17] = [
        Field::Name, Field::Mode, Field::Uid, Field::Gid, Field::Size,
        Field::Mtime, Field::Checksum, Field::Typeflag, Field::Linkname,
        Field::Magic, Field::Version, Field::Uname, Field::Gname,
        Field::Devmajor, Field::Devminor, Field::Prefix, Field::Pad,
    ];

    pub const fn spec(self) -> FieldSpec {
        FIELD_LAYOUT[self as usize]
    }

    pub const fn len(self) -> usize {
        self.spec().len
    }

    pub fn range(self) -> Range<usize> {
        let s = self.spec();
        s.offset..s.offset + s.len
    }

    pub const fn name(self) -> &'static str {
        match self {
            Field::Name     => "name",
            Field::Mode     => "mode",
            Field::Uid      => "uid",
            Field::Gid      => "gid",
            Field::Size     => "size",
            Field::Mtime    => "mtime",
            Field::Checksum => "checksum",
            Field::Typeflag => "typeflag",
            Field::Linkname => "linkname",
            Field::Magic    => "magic",
            Field::Version  => "version",
            Field::Uname    => "uname",
            Field::Gname    => "gname",
            Field::Devmajor => "devmajor",
            Field::Devminor => "devminor",
            Field::Prefix   => "prefix",
            Field::Pad      => "pad",
        }
    }
}

/// Copy `data` into `field`, zero filling the remainder.
pub fn write_field(block: &mut HeaderBlock, field: Field, data: &[u8]) -> Result<()> {
    if data.len() > field.len() {
        return Err(ArchiveError::FieldOverflow {
            field:  field.name(),
            detail: format!("{} bytes, max {}", data.len(), field.len()),
        });
    }
    let range = field.range();
    let (head, tail) = block[range].split_at_mut(data.len());
    head.copy_from_slice(data);
    tail.fill(0);
    Ok(())
}

pub fn read_field(block: &HeaderBlock, field: Field) -> &[u8] {
    &block[field.range()]
}

/// Everything before the first NUL.
pub fn cut_nul(data: &[u8]) -> &[u8] {
    let end = data.iter().position(|&b| b == 0).unwrap_or(data.len());
    &data[..end]
}

// ── Checksum ─────────────────────────────────────────────────────────────────

/// Unsigned byte sum with the checksum field counted as spaces.
pub fn checksum(block: &HeaderBlock) -> u32 {
    let blanked = Field::Checksum.range();
    let spaces  = (Field::Checksum.len() as u32) * u32::from(b' ');
    block.iter()
        .enumerate()
        .filter(|(i, _)| !blanked.contains(i))
        .map(|(_, &b)| u32::from(b))
        .sum::<u32>()
        + spaces
}

/// `"dddddd\0 "`: six octal digits, NUL, space.
pub fn format_checksum(sum: u32) -> Result<[u8; 8]> {
    let digits = format_octal(u64::from(sum), 6).map_err(|e| ArchiveError::FieldOverflow {
        field:  Field::Checksum.name(),
        detail: e.to_string(),
    })?;
    let mut out = [0u8; 8];
    out[..6].copy_from_slice(digits.as_bytes());
    out[6] = 0;
    out[7] = b' ';
    Ok(out)
}

/// Recompute and store the checksum of `block`.
pub fn seal(block: &mut HeaderBlock) -> Result<()> {
    let sum = format_checksum(checksum(block))?;
    write_field(block, Field::Checksum, &sum)
}

// ── Names ────────────────────────────────────────────────────────────────────

pub fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(ArchiveError::EmptyName);
    }
    if name.contains('\0') {
        return Err(ArchiveError::NulInName(name.to_owned()));
    }
    if name.len() > MAX_NAME_LEN {
        return Err(ArchiveError::NameTooLong { name: name.to_owned(), len: name.len() });
    }
    Ok(())
}

// ── Header ───────────────────────────────────────────────────────────────────

/// Metadata of one entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub name:  String,
    pub size:  u64,
    /// Seconds since the Unix epoch.
    pub mtime: u64,
}

impl Header {
    /// Header stamped with the current time.
    pub fn new(name: impl Into<String>, size: u64) -> Self {
        Self::with_mtime(name, size, now())
    }

    pub fn with_mtime(name: impl Into<String>, size: u64, mtime: u64) -> Self {
        Self { name: name.into(), size, mtime }
    }

    pub fn encode(&self) -> Result<HeaderBlock> {
        validate_name(&self.name)?;

        let mut block = [0u8; BLOCK_SIZE];
        write_field(&mut block, Field::Magic, MAGIC)?;
        write_field(&mut block, Field::Mode, MODE)?;
        write_field(&mut block, Field::Mtime, octal_field(Field::Mtime, self.mtime)?.as_bytes())?;
        write_field(&mut block, Field::Typeflag, TYPEFLAG)?;
        write_field(&mut block, Field::Name, self.name.as_bytes())?;
        write_field(&mut block, Field::Size, octal_field(Field::Size, self.size)?.as_bytes())?;
        seal(&mut block)?;
        Ok(block)
    }

    pub fn decode(block: &HeaderBlock) -> Result<Self> {
        let stored = parse_octal(read_field(block, Field::Checksum));
        if stored != Ok(u64::from(checksum(block))) {
            return Err(ArchiveError::Format("wrong checksum".into()));
        }

        let magic = cut_nul(read_field(block, Field::Magic));
        if magic != MAGIC {
            return Err(ArchiveError::Format(format!(
                "bad magic '{}'",
                String::from_utf8_lossy(magic)
            )));
        }

        let name = std::str::from_utf8(cut_nul(read_field(block, Field::Name)))
            .map_err(|_| ArchiveError::Format("entry name is not valid UTF-8".into()))?
            .to_owned();

        let size = parse_octal(read_field(block, Field::Size))
            .map_err(|e| ArchiveError::Format(format!("size of '{name}': {e}")))?;
        let mtime = parse_octal(read_field(block, Field::Mtime)).unwrap_or_default();

        tracing::trace!(%name, size, mtime, "decoded header");
        Ok(Self { name, size, mtime })
    }

    /// Zero bytes that follow `size` content bytes.
    pub fn padding(&self) -> u64 {
        padding_for(self.size)
    }
}

/// `(512 - size % 512) % 512`
pub fn padding_for(size: u64) -> u64 {
    let block = BLOCK_SIZE as u64;
    (block - size % block) % block
}

/// Number field rendering: one digit short of the field, the last byte
/// stays NUL.
fn octal_field(field: Field, value: u64) -> Result<String> {
    format_octal(value, field.len() - 1).map_err(|e| ArchiveError::FieldOverflow {
        field:  field.name(),
        detail: e.to_string(),
    })
}

fn now() -> u64 {
    u64::try_from(Utc::now().timestamp()).unwrap_or(0)
}
