//! `.folio` binary file format
//!
//! # File Structure
//!
//! ```text
//! Offset   Size     Type          Description
//! ──────────────────────────────────────────────────────────────
//! 0x00     8        [u8; 8]       Magic: "FOLIO001"
//! 0x08     8        u64 LE        N: number of rows
//! 0x10     4        u32 LE        D: dimensions
//! 0x14     4        u32 LE        Section count (9)
//! 0x18     8        -             Reserved (zero)
//! 0x20     9*16     (u64, u64)    Section table: (offset, length) per section
//! ...               sections      Each starts on an 8-byte boundary
//! len-4    4        u32 LE        CRC32 of every preceding byte
//! ```
//!
//! Sections, in table order:
//!
//! ```text
//! embeddings          N*D*4   [f32]
//! embeddings_normed   N*D*4   [f32]
//! document_id         N*4     [i32]
//! start_token         N*4     [i32]
//! end_token           N*4     [i32]
//! text_offsets        (N+1)*8 [u64]   byte offsets into text_pool
//! text_pool           var     UTF-8
//! range_index         var     u32 count, then per entry:
//!                             i32 document_id, i64 start_row, i64 end_row,
//!                             u32 title_len, title bytes
//! metadata            var     JSON
//! ```
//!
//! All integers and floats are little-endian. The reader maps the f32 columns
//! directly, so stores are only readable on little-endian hosts.

use thiserror::Error;

use crate::range_index::RangeEntry;

/// Magic bytes identifying a `.folio` file.
pub const MAGIC: [u8; 8] = *b"FOLIO001";

/// Number of entries in the section table.
pub const SECTION_COUNT: usize = 9;

/// Fixed prefix (32 bytes) plus the section table.
pub const HEADER_SIZE: usize = 32 + SECTION_COUNT * 16;

/// Trailing CRC32.
pub const FOOTER_SIZE: usize = 4;

const SECTION_ALIGN: u64 = 8;

#[derive(Error, Debug)]
pub enum FormatError {
    #[error("invalid magic bytes: expected FOLIO001")]
    InvalidMagic,

    #[error("file too small: {0} bytes")]
    TooSmall(usize),

    #[error("unsupported section count {0}")]
    SectionCount(u32),

    #[error("section {section} is malformed: {reason}")]
    BadSection {
        section: &'static str,
        reason: String,
    },

    #[error("checksum mismatch: stored {stored:#010x}, computed {computed:#010x}")]
    ChecksumMismatch { stored: u32, computed: u32 },

    #[error("invalid data: {0}")]
    Invalid(String),
}

/// Sections of the file, in table order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Section {
    Embeddings,
    EmbeddingsNormed,
    DocumentIds,
    StartTokens,
    EndTokens,
    TextOffsets,
    TextPool,
    RangeIndex,
    Metadata,
}

impl Section {
    pub const ALL: [Section; SECTION_COUNT] = [
        Section::Embeddings,
        Section::EmbeddingsNormed,
        Section::DocumentIds,
        Section::StartTokens,
        Section::EndTokens,
        Section::TextOffsets,
        Section::TextPool,
        Section::RangeIndex,
        Section::Metadata,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Section::Embeddings => "embeddings",
            Section::EmbeddingsNormed => "embeddings_normed",
            Section::DocumentIds => "document_id",
            Section::StartTokens => "start_token",
            Section::EndTokens => "end_token",
            Section::TextOffsets => "text_offsets",
            Section::TextPool => "text_pool",
            Section::RangeIndex => "range_index",
            Section::Metadata => "metadata",
        }
    }

    /// Exact byte length for fixed-width sections, `None` for variable ones.
    fn fixed_len(self, rows: u64, dimensions: u32) -> Option<u64> {
        match self {
            Section::Embeddings | Section::EmbeddingsNormed => Some(rows * dimensions as u64 * 4),
            Section::DocumentIds | Section::StartTokens | Section::EndTokens => Some(rows * 4),
            Section::TextOffsets => Some((rows + 1) * 8),
            Section::TextPool | Section::RangeIndex | Section::Metadata => None,
        }
    }
}

/// Byte span of one section.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SectionSpan {
    pub offset: u64,
    pub len: u64,
}

impl SectionSpan {
    pub fn end(&self) -> u64 {
        self.offset + self.len
    }
}

/// Parsed file header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreHeader {
    pub rows: u64,
    pub dimensions: u32,
    pub sections: [SectionSpan; SECTION_COUNT],
}

fn align_up(n: u64) -> u64 {
    n.div_ceil(SECTION_ALIGN) * SECTION_ALIGN
}

impl StoreHeader {
    /// Lays sections out back to back after the header, each 8-byte aligned.
    pub fn layout(
        rows: u64,
        dimensions: u32,
        text_pool_len: u64,
        range_index_len: u64,
        metadata_len: u64,
    ) -> Self {
        let mut sections = [SectionSpan::default(); SECTION_COUNT];
        let mut cursor = HEADER_SIZE as u64;
        for (i, section) in Section::ALL.iter().enumerate() {
            let len = section.fixed_len(rows, dimensions).unwrap_or(match section {
                Section::TextPool => text_pool_len,
                Section::RangeIndex => range_index_len,
                _ => metadata_len,
            });
            cursor = align_up(cursor);
            sections[i] = SectionSpan {
                offset: cursor,
                len,
            };
            cursor += len;
        }
        Self {
            rows,
            dimensions,
            sections,
        }
    }

    pub fn span(&self, section: Section) -> SectionSpan {
        self.sections[section as usize]
    }

    /// Byte offset where the CRC footer starts.
    pub fn payload_len(&self) -> u64 {
        self.span(Section::Metadata).end()
    }

    pub fn file_size(&self) -> u64 {
        self.payload_len() + FOOTER_SIZE as u64
    }

    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        buf[0..8].copy_from_slice(&MAGIC);
        buf[8..16].copy_from_slice(&self.rows.to_le_bytes());
        buf[16..20].copy_from_slice(&self.dimensions.to_le_bytes());
        buf[20..24].copy_from_slice(&(SECTION_COUNT as u32).to_le_bytes());
        for (i, span) in self.sections.iter().enumerate() {
            let at = 32 + i * 16;
            buf[at..at + 8].copy_from_slice(&span.offset.to_le_bytes());
            buf[at + 8..at + 16].copy_from_slice(&span.len.to_le_bytes());
        }
        buf
    }

    /// Parses and validates the header against the total file length: every section
    /// must be aligned, lie inside the payload, and fixed-width sections must have the
    /// length implied by N and D.
    pub fn from_bytes(bytes: &[u8], file_len: usize) -> Result<Self, FormatError> {
        if bytes.len() < HEADER_SIZE || file_len < HEADER_SIZE + FOOTER_SIZE {
            return Err(FormatError::TooSmall(file_len));
        }
        if bytes[0..8] != MAGIC {
            return Err(FormatError::InvalidMagic);
        }
        let rows = read_u64(&bytes[8..16]);
        let dimensions = read_u32(&bytes[16..20]);
        let count = read_u32(&bytes[20..24]);
        if count as usize != SECTION_COUNT {
            return Err(FormatError::SectionCount(count));
        }
        if dimensions == 0 {
            return Err(FormatError::Invalid("dimension is zero".to_string()));
        }

        let payload_end = (file_len - FOOTER_SIZE) as u64;
        let fits = (rows as u128) * (dimensions as u128) * 4 <= payload_end as u128;
        if !fits || rows > payload_end / 4 {
            return Err(FormatError::Invalid(format!(
                "{rows} rows of dimension {dimensions} cannot fit in {file_len} bytes"
            )));
        }

        let mut sections = [SectionSpan::default(); SECTION_COUNT];
        let mut prev_end = HEADER_SIZE as u64;
        for (i, section) in Section::ALL.iter().enumerate() {
            let at = 32 + i * 16;
            let span = SectionSpan {
                offset: read_u64(&bytes[at..at + 8]),
                len: read_u64(&bytes[at + 8..at + 16]),
            };
            let bad = |reason: String| FormatError::BadSection {
                section: section.name(),
                reason,
            };
            if span.offset % SECTION_ALIGN != 0 {
                return Err(bad(format!("offset {} is not 8-byte aligned", span.offset)));
            }
            if span.offset < prev_end {
                return Err(bad(format!("offset {} overlaps earlier data", span.offset)));
            }
            let end = span
                .offset
                .checked_add(span.len)
                .filter(|&end| end <= payload_end)
                .ok_or_else(|| bad(format!("extends past end of file ({payload_end} bytes)")))?;
            if let Some(expected) = section.fixed_len(rows, dimensions) {
                if span.len != expected {
                    return Err(bad(format!("length {} != expected {}", span.len, expected)));
                }
            }
            sections[i] = span;
            prev_end = end;
        }

        Ok(Self {
            rows,
            dimensions,
            sections,
        })
    }
}

/// Checks the trailing CRC32 against everything before it.
pub fn verify_checksum(file: &[u8]) -> Result<(), FormatError> {
    if file.len() < FOOTER_SIZE {
        return Err(FormatError::TooSmall(file.len()));
    }
    let (payload, footer) = file.split_at(file.len() - FOOTER_SIZE);
    let stored = read_u32(footer);
    let computed = crc32fast::hash(payload);
    if stored != computed {
        return Err(FormatError::ChecksumMismatch { stored, computed });
    }
    Ok(())
}

pub fn encode_range_index(entries: &[RangeEntry]) -> Vec<u8> {
    let titles: usize = entries.iter().map(|e| e.title.len()).sum();
    let mut buf = Vec::with_capacity(4 + entries.len() * 24 + titles);
    buf.extend_from_slice(&(entries.len() as u32).to_le_bytes());
    for e in entries {
        buf.extend_from_slice(&e.document_id.to_le_bytes());
        buf.extend_from_slice(&(e.start_row as i64).to_le_bytes());
        buf.extend_from_slice(&(e.end_row as i64).to_le_bytes());
        buf.extend_from_slice(&(e.title.len() as u32).to_le_bytes());
        buf.extend_from_slice(e.title.as_bytes());
    }
    buf
}

pub fn decode_range_index(bytes: &[u8]) -> Result<Vec<RangeEntry>, FormatError> {
    let mut cursor = Cursor { bytes, at: 0 };
    let count = cursor.take_u32()? as usize;
    // Each entry needs at least 24 bytes; reject absurd counts before allocating.
    if count > bytes.len() / 24 {
        return Err(cursor.bad(format!("entry count {count} exceeds section size")));
    }
    let mut entries = Vec::with_capacity(count);
    for _ in 0..count {
        let document_id = cursor.take_i32()?;
        let start_row = cursor.take_row()?;
        let end_row = cursor.take_row()?;
        let title_len = cursor.take_u32()? as usize;
        let title = std::str::from_utf8(cursor.take(title_len)?)
            .map_err(|e| cursor.bad(format!("title is not UTF-8: {e}")))?
            .to_string();
        entries.push(RangeEntry {
            document_id,
            title,
            start_row,
            end_row,
        });
    }
    if cursor.at != bytes.len() {
        return Err(cursor.bad(format!("{} trailing bytes", bytes.len() - cursor.at)));
    }
    Ok(entries)
}

struct Cursor<'a> {
    bytes: &'a [u8],
    at: usize,
}

impl<'a> Cursor<'a> {
    fn bad(&self, reason: String) -> FormatError {
        FormatError::BadSection {
            section: Section::RangeIndex.name(),
            reason,
        }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], FormatError> {
        let end = self
            .at
            .checked_add(n)
            .filter(|&end| end <= self.bytes.len())
            .ok_or_else(|| self.bad(format!("truncated at byte {}", self.at)))?;
        let out = &self.bytes[self.at..end];
        self.at = end;
        Ok(out)
    }

    fn take_u32(&mut self) -> Result<u32, FormatError> {
        self.take(4).map(read_u32)
    }

    fn take_i32(&mut self) -> Result<i32, FormatError> {
        self.take(4).map(read_i32)
    }

    fn take_row(&mut self) -> Result<usize, FormatError> {
        let v = read_u64(self.take(8)?) as i64;
        usize::try_from(v).map_err(|_| self.bad(format!("negative row {v}")))
    }
}

pub(crate) fn read_u32(b: &[u8]) -> u32 {
    u32::from_le_bytes([b[0], b[1], b[2], b[3]])
}

pub(crate) fn read_i32(b: &[u8]) -> i32 {
    i32::from_le_bytes([b[0], b[1], b[2], b[3]])
}

pub(crate) fn read_u64(b: &[u8]) -> u64 {
    u64::from_le_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]])
}
