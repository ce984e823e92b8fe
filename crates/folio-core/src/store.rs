//! On-disk vector store: one immutable `.folio` file per build.
//!
//! [write_store] validates the rows, computes normalized embeddings and publishes the
//! file atomically (temp file in the target directory, fsync, rename). [VectorStore]
//! memory-maps a published file read-only and hands out row-range slices.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::ops::Range;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use memmap2::Mmap;
use serde::{Deserialize, Serialize};

use crate::format::{
    decode_range_index, encode_range_index, read_i32, read_u64, verify_checksum, FormatError,
    Section, StoreHeader, FOOTER_SIZE, HEADER_SIZE,
};
use crate::range_index::{RangeIndex, RangeIndexError};

/// Norms below this are clamped so a zero vector normalizes to zero instead of NaN.
pub const NORM_EPSILON: f32 = 1e-12;

/// File-level attributes, set once when the store is written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreMetadata {
    pub embedding_model: String,
    pub dimension: usize,
    pub created_at: DateTime<Utc>,
    pub max_tokens: usize,
    pub overlap: usize,
    pub row_count: usize,
    /// Free-text provenance / license note.
    pub note: String,
    #[serde(default)]
    pub tokenizer: String,
    /// Where the source text came from (URL or path actually used).
    #[serde(default)]
    pub source: String,
}

/// One chunk to persist. Rows are stored in slice order.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkRow {
    pub text: String,
    pub document_id: i32,
    pub start_token: usize,
    pub end_token: usize,
    pub embedding: Vec<f32>,
}

/// `v / max(||v||, NORM_EPSILON)`.
pub fn normalize(v: &[f32]) -> Vec<f32> {
    let norm = v.iter().map(|&x| x as f64 * x as f64).sum::<f64>().sqrt() as f32;
    let norm = norm.max(NORM_EPSILON);
    v.iter().map(|x| x / norm).collect()
}

/// Writes a complete store to `path`, replacing any existing file as a unit.
///
/// Fails without touching `path` if the rows are empty, embedding widths disagree
/// with each other or with `metadata`, a token span is empty, or a row's document is
/// missing from `index` or its range does not contain the row.
pub fn write_store(
    path: &Path,
    rows: &[ChunkRow],
    index: &RangeIndex,
    metadata: &StoreMetadata,
) -> Result<(), StoreError> {
    let dim = validate_rows(rows, index, metadata)?;
    let metadata_json = serde_json::to_vec(metadata).map_err(StoreError::Metadata)?;
    let range_bytes = encode_range_index(index.entries());
    let text_pool_len: u64 = rows.iter().map(|r| r.text.len() as u64).sum();
    let header = StoreHeader::layout(
        rows.len() as u64,
        dim as u32,
        text_pool_len,
        range_bytes.len() as u64,
        metadata_json.len() as u64,
    );

    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    std::fs::create_dir_all(&parent)?;
    let mut tmp = tempfile::NamedTempFile::new_in(&parent)?;
    {
        let mut out = SectionWriter::new(BufWriter::new(tmp.as_file_mut()));
        out.write(&header.to_bytes())?;

        let mut buf = Vec::with_capacity(dim * 4);
        out.pad_to(header.span(Section::Embeddings).offset)?;
        for row in rows {
            buf.clear();
            row.embedding.iter().for_each(|x| buf.extend_from_slice(&x.to_le_bytes()));
            out.write(&buf)?;
        }
        out.pad_to(header.span(Section::EmbeddingsNormed).offset)?;
        for row in rows {
            buf.clear();
            normalize(&row.embedding)
                .iter()
                .for_each(|x| buf.extend_from_slice(&x.to_le_bytes()));
            out.write(&buf)?;
        }

        out.pad_to(header.span(Section::DocumentIds).offset)?;
        for row in rows {
            out.write(&row.document_id.to_le_bytes())?;
        }
        out.pad_to(header.span(Section::StartTokens).offset)?;
        for row in rows {
            out.write(&(row.start_token as i32).to_le_bytes())?;
        }
        out.pad_to(header.span(Section::EndTokens).offset)?;
        for row in rows {
            out.write(&(row.end_token as i32).to_le_bytes())?;
        }

        out.pad_to(header.span(Section::TextOffsets).offset)?;
        let mut offset = 0u64;
        out.write(&offset.to_le_bytes())?;
        for row in rows {
            offset += row.text.len() as u64;
            out.write(&offset.to_le_bytes())?;
        }
        out.pad_to(header.span(Section::TextPool).offset)?;
        for row in rows {
            out.write(row.text.as_bytes())?;
        }

        out.pad_to(header.span(Section::RangeIndex).offset)?;
        out.write(&range_bytes)?;
        out.pad_to(header.span(Section::Metadata).offset)?;
        out.write(&metadata_json)?;
        out.finish()?;
    }
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| StoreError::Io(e.error))?;
    sync_dir(&parent);

    tracing::info!(
        "Wrote store {} ({} rows, dim {}, {} documents, {} bytes)",
        path.display(),
        rows.len(),
        dim,
        index.len(),
        header.file_size()
    );
    Ok(())
}

fn validate_rows(
    rows: &[ChunkRow],
    index: &RangeIndex,
    metadata: &StoreMetadata,
) -> Result<usize, StoreError> {
    let first = rows.first().ok_or(StoreError::EmptyStore)?;
    let dim = first.embedding.len();
    if dim == 0 {
        return Err(StoreError::InvalidInput(
            "embedding dimension must be at least 1".to_string(),
        ));
    }
    if u32::try_from(dim).is_err() {
        return Err(StoreError::InvalidInput(format!("embedding dimension {dim} is too large")));
    }
    if metadata.dimension != dim {
        return Err(StoreError::DimensionMismatch {
            expected: metadata.dimension,
            actual: dim,
        });
    }
    if metadata.row_count != rows.len() {
        return Err(StoreError::InvalidInput(format!(
            "metadata row_count {} != {} rows",
            metadata.row_count,
            rows.len()
        )));
    }
    index.check_within(rows.len())?;

    for (i, row) in rows.iter().enumerate() {
        if row.embedding.len() != dim {
            return Err(StoreError::DimensionMismatch {
                expected: dim,
                actual: row.embedding.len(),
            });
        }
        if row.end_token <= row.start_token || i32::try_from(row.end_token).is_err() {
            return Err(StoreError::InvalidInput(format!(
                "row {i} has invalid token span [{}, {})",
                row.start_token, row.end_token
            )));
        }
        let covered = index
            .get(row.document_id)
            .is_some_and(|e| e.rows().contains(&i));
        if !covered {
            return Err(StoreError::UncoveredRow {
                row: i,
                document_id: row.document_id,
            });
        }
    }
    Ok(dim)
}

/// Streams sections, tracking position for padding and hashing every byte for the
/// CRC footer.
struct SectionWriter<W: Write> {
    inner: W,
    hasher: crc32fast::Hasher,
    written: u64,
}

impl<W: Write> SectionWriter<W> {
    fn new(inner: W) -> Self {
        Self {
            inner,
            hasher: crc32fast::Hasher::new(),
            written: 0,
        }
    }

    fn write(&mut self, bytes: &[u8]) -> std::io::Result<()> {
        self.inner.write_all(bytes)?;
        self.hasher.update(bytes);
        self.written += bytes.len() as u64;
        Ok(())
    }

    fn pad_to(&mut self, offset: u64) -> std::io::Result<()> {
        debug_assert!(offset >= self.written);
        let pad = (offset - self.written) as usize;
        self.write(&[0u8; 8][..pad])
    }

    fn finish(mut self) -> std::io::Result<()> {
        let crc = self.hasher.finalize();
        self.inner.write_all(&crc.to_le_bytes())?;
        self.inner.flush()
    }
}

#[cfg(unix)]
fn sync_dir(dir: &Path) {
    if let Err(e) = File::open(dir).and_then(|d| d.sync_all()) {
        tracing::debug!("fsync of {} failed: {}", dir.display(), e);
    }
}

#[cfg(not(unix))]
fn sync_dir(_dir: &Path) {}

/// Read-only view of a published store. Cheap to share across threads; every
/// accessor borrows from the memory map.
#[derive(Debug)]
pub struct VectorStore {
    path: PathBuf,
    mmap: Mmap,
    header: StoreHeader,
    rows: usize,
    dim: usize,
    metadata: StoreMetadata,
    range_index: RangeIndex,
}

impl VectorStore {
    /// Opens and fully validates a store file.
    ///
    /// # Safety
    ///
    /// The file is memory-mapped. It must not be truncated or rewritten in place while
    /// open; stores are only ever replaced by rename, which leaves the mapping intact.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        let file = match File::open(path) {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StoreError::NotFound(path.to_path_buf()))
            }
            Err(e) => return Err(e.into()),
        };
        let len = file.metadata()?.len() as usize;
        if len < HEADER_SIZE + FOOTER_SIZE {
            return Err(FormatError::TooSmall(len).into());
        }
        let mmap = unsafe { Mmap::map(&file)? };

        let header = StoreHeader::from_bytes(&mmap, mmap.len())?;
        verify_checksum(&mmap)?;
        let rows = usize::try_from(header.rows)
            .map_err(|_| FormatError::Invalid(format!("row count {} too large", header.rows)))?;
        let dim = header.dimensions as usize;

        let metadata: StoreMetadata = serde_json::from_slice(section_bytes(&mmap, &header, Section::Metadata))
            .map_err(|e| FormatError::BadSection {
                section: Section::Metadata.name(),
                reason: e.to_string(),
            })?;
        if metadata.dimension != dim || metadata.row_count != rows {
            return Err(FormatError::Invalid(format!(
                "metadata says {} rows of dim {}, header says {} rows of dim {}",
                metadata.row_count, metadata.dimension, rows, dim
            ))
            .into());
        }

        let entries = decode_range_index(section_bytes(&mmap, &header, Section::RangeIndex))?;
        let range_index = RangeIndex::from_entries(entries)
            .and_then(|idx| idx.check_within(rows).map(|_| idx))
            .map_err(|e| FormatError::BadSection {
                section: Section::RangeIndex.name(),
                reason: e.to_string(),
            })?;

        check_text_offsets(&mmap, &header)?;

        tracing::debug!(
            "Opened store {} ({} rows, dim {}, {} documents)",
            path.display(),
            rows,
            dim,
            range_index.len()
        );
        Ok(Self {
            path: path.to_path_buf(),
            mmap,
            header,
            rows,
            dim,
            metadata,
            range_index,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// N.
    pub fn row_count(&self) -> usize {
        self.rows
    }

    /// D.
    pub fn dimension(&self) -> usize {
        self.dim
    }

    pub fn metadata(&self) -> &StoreMetadata {
        &self.metadata
    }

    pub fn range_index(&self) -> &RangeIndex {
        &self.range_index
    }

    pub fn file_size(&self) -> usize {
        self.mmap.len()
    }

    fn section(&self, section: Section) -> &[u8] {
        section_bytes(&self.mmap, &self.header, section)
    }

    /// `rows` must satisfy `start <= end <= N`.
    pub fn check_range(&self, rows: &Range<usize>) -> Result<(), StoreError> {
        if rows.start > rows.end || rows.end > self.rows {
            return Err(StoreError::OutOfBounds {
                start: rows.start,
                end: rows.end,
                count: self.rows,
            });
        }
        Ok(())
    }

    fn f32_rows(&self, section: Section, rows: Range<usize>) -> Result<&[f32], StoreError> {
        self.check_range(&rows)?;
        let width = self.dim * 4;
        let bytes = &self.section(section)[rows.start * width..rows.end * width];
        bytemuck::try_cast_slice(bytes).map_err(|_| {
            StoreError::Corrupt(FormatError::Invalid(format!(
                "{} is not f32-aligned",
                section.name()
            )))
        })
    }

    fn i32_rows(&self, section: Section, rows: Range<usize>) -> Result<Vec<i32>, StoreError> {
        self.check_range(&rows)?;
        let bytes = &self.section(section)[rows.start * 4..rows.end * 4];
        Ok(bytes.chunks_exact(4).map(read_i32).collect())
    }

    /// Raw embeddings for `rows`, row-major (`len = rows.len() * D`).
    pub fn slice_embeddings(&self, rows: Range<usize>) -> Result<&[f32], StoreError> {
        self.f32_rows(Section::Embeddings, rows)
    }

    /// Unit-normalized embeddings for `rows`, row-major (`len = rows.len() * D`).
    pub fn slice_embeddings_normed(&self, rows: Range<usize>) -> Result<&[f32], StoreError> {
        self.f32_rows(Section::EmbeddingsNormed, rows)
    }

    pub fn slice_document_ids(&self, rows: Range<usize>) -> Result<Vec<i32>, StoreError> {
        self.i32_rows(Section::DocumentIds, rows)
    }

    /// `(start_token, end_token)` per row.
    pub fn slice_token_spans(&self, rows: Range<usize>) -> Result<Vec<(usize, usize)>, StoreError> {
        let starts = self.i32_rows(Section::StartTokens, rows.clone())?;
        let ends = self.i32_rows(Section::EndTokens, rows)?;
        Ok(starts
            .into_iter()
            .zip(ends)
            .map(|(s, e)| (s.max(0) as usize, e.max(0) as usize))
            .collect())
    }

    pub fn slice_texts(&self, rows: Range<usize>) -> Result<Vec<&str>, StoreError> {
        self.check_range(&rows)?;
        rows.map(|row| self.text_unchecked(row)).collect()
    }

    pub fn text(&self, row: usize) -> Result<&str, StoreError> {
        let rows = self.single_row(row)?;
        self.text_unchecked(rows.start)
    }

    pub fn document_id(&self, row: usize) -> Result<i32, StoreError> {
        Ok(self.i32_rows(Section::DocumentIds, self.single_row(row)?)?[0])
    }

    fn single_row(&self, row: usize) -> Result<Range<usize>, StoreError> {
        let end = row.checked_add(1).ok_or(StoreError::OutOfBounds {
            start: row,
            end: row,
            count: self.rows,
        })?;
        self.check_range(&(row..end))?;
        Ok(row..end)
    }

    fn text_unchecked(&self, row: usize) -> Result<&str, StoreError> {
        let offsets = self.section(Section::TextOffsets);
        let start = read_u64(&offsets[row * 8..]) as usize;
        let end = read_u64(&offsets[(row + 1) * 8..]) as usize;
        std::str::from_utf8(&self.section(Section::TextPool)[start..end]).map_err(|e| {
            StoreError::Corrupt(FormatError::BadSection {
                section: Section::TextPool.name(),
                reason: format!("row {row} is not UTF-8: {e}"),
            })
        })
    }
}

fn section_bytes<'a>(mmap: &'a [u8], header: &StoreHeader, section: Section) -> &'a [u8] {
    let span = header.span(section);
    &mmap[span.offset as usize..span.end() as usize]
}

/// Offsets must start at 0, never decrease and end at the pool length, so that
/// every row's slice of the pool is in bounds.
fn check_text_offsets(mmap: &[u8], header: &StoreHeader) -> Result<(), FormatError> {
    let offsets = section_bytes(mmap, header, Section::TextOffsets);
    let pool_len = header.span(Section::TextPool).len;
    let mut prev = 0u64;
    for (i, chunk) in offsets.chunks_exact(8).enumerate() {
        let at = read_u64(chunk);
        if (i == 0 && at != 0) || at < prev || at > pool_len {
            return Err(FormatError::BadSection {
                section: Section::TextOffsets.name(),
                reason: format!("offset {i} = {at} is out of order or past the pool"),
            });
        }
        prev = at;
    }
    if prev != pool_len {
        return Err(FormatError::BadSection {
            section: Section::TextOffsets.name(),
            reason: format!("last offset {prev} != pool length {pool_len}"),
        });
    }
    Ok(())
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store not found: {0}")]
    NotFound(PathBuf),
    #[error("store file is corrupt: {0}")]
    Corrupt(#[from] FormatError),
    #[error("row range [{start}, {end}) is out of bounds for {count} rows")]
    OutOfBounds {
        start: usize,
        end: usize,
        count: usize,
    },
    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
    #[error("refusing to write a store with no rows")]
    EmptyStore,
    #[error("row {row} belongs to document {document_id}, which has no range covering it")]
    UncoveredRow { row: usize, document_id: i32 },
    #[error("invalid range index: {0}")]
    RangeIndex(#[from] RangeIndexError),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("failed to encode metadata: {0}")]
    Metadata(serde_json::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::range_index::RangeIndexBuilder;
    use tempfile::tempdir;

    fn metadata(rows: usize, dim: usize) -> StoreMetadata {
        StoreMetadata {
            embedding_model: "test-model".to_string(),
            dimension: dim,
            created_at: Utc::now(),
            max_tokens: 8,
            overlap: 2,
            row_count: rows,
            note: "test".to_string(),
            tokenizer: "words".to_string(),
            source: "memory".to_string(),
        }
    }

    fn row(doc: i32, text: &str, embedding: Vec<f32>) -> ChunkRow {
        ChunkRow {
            text: text.to_string(),
            document_id: doc,
            start_token: 0,
            end_token: 4,
            embedding,
        }
    }

    /// Two documents: doc 0 owns rows 0..2, doc 2 owns rows 2..4 (doc 1 was empty).
    fn sample() -> (Vec<ChunkRow>, RangeIndex) {
        let rows = vec![
            row(0, "when shall we three", vec![3.0, 4.0, 0.0]),
            row(0, "meet again", vec![0.0, 0.0, 0.0]),
            row(2, "to be or not", vec![1.0, 1.0, 1.0]),
            row(2, "héllo wörld", vec![-2.0, 0.0, 0.0]),
        ];
        let mut b = RangeIndexBuilder::new();
        b.push_document(0, "Macbeth", 2);
        b.push_document(1, "Empty", 0);
        b.push_document(2, "Hamlet", 2);
        (rows, b.finish().unwrap())
    }

    fn write_sample(dir: &Path) -> PathBuf {
        let (rows, index) = sample();
        let path = dir.join("sub").join("store.folio");
        write_store(&path, &rows, &index, &metadata(rows.len(), 3)).unwrap();
        path
    }

    #[test]
    fn test_write_and_open() {
        let dir = tempdir().unwrap();
        let path = write_sample(dir.path());
        let store = VectorStore::open(&path).unwrap();

        assert_eq!(store.row_count(), 4);
        assert_eq!(store.dimension(), 3);
        assert_eq!(store.metadata().embedding_model, "test-model");
        assert_eq!(store.metadata().row_count, 4);
        assert_eq!(store.range_index().len(), 2);
        assert_eq!(store.range_index().title_of(2), Some("Hamlet"));

        let all = 0..store.row_count();
        assert_eq!(store.slice_embeddings(all.clone()).unwrap().len(), 4 * 3);
        assert_eq!(store.slice_embeddings_normed(all.clone()).unwrap().len(), 4 * 3);
        assert_eq!(store.slice_texts(all.clone()).unwrap().len(), 4);
        assert_eq!(store.slice_document_ids(all.clone()).unwrap(), vec![0, 0, 2, 2]);
        assert_eq!(store.slice_token_spans(all).unwrap(), vec![(0, 4); 4]);

        assert_eq!(store.slice_embeddings(0..1).unwrap(), &[3.0, 4.0, 0.0]);
        assert_eq!(store.slice_texts(2..4).unwrap(), vec!["to be or not", "héllo wörld"]);
        assert_eq!(store.text(1).unwrap(), "meet again");
        assert_eq!(store.document_id(3).unwrap(), 2);
    }

    #[test]
    fn test_normed_rows_are_unit_or_zero() {
        let dir = tempdir().unwrap();
        let store = VectorStore::open(write_sample(dir.path())).unwrap();
        let normed = store.slice_embeddings_normed(0..4).unwrap();
        let norms: Vec<f32> = normed
            .chunks_exact(3)
            .map(|r| r.iter().map(|x| x * x).sum::<f32>().sqrt())
            .collect();
        assert!((norms[0] - 1.0).abs() < 1e-6);
        assert_eq!(norms[1], 0.0);
        assert!((norms[2] - 1.0).abs() < 1e-6);
        assert!((norms[3] - 1.0).abs() < 1e-6);
        assert_eq!(&normed[0..3], &[0.6, 0.8, 0.0]);
    }

    #[test]
    fn test_out_of_bounds() {
        let dir = tempdir().unwrap();
        let store = VectorStore::open(write_sample(dir.path())).unwrap();
        assert!(matches!(
            store.slice_texts(2..5),
            Err(StoreError::OutOfBounds { start: 2, end: 5, count: 4 })
        ));
        assert!(matches!(
            store.slice_embeddings_normed(3..2),
            Err(StoreError::OutOfBounds { .. })
        ));
        assert!(matches!(store.text(4), Err(StoreError::OutOfBounds { .. })));
        assert!(store.slice_document_ids(4..4).unwrap().is_empty());
    }

    #[test]
    fn test_row_accessors_reject_max_index() {
        let dir = tempdir().unwrap();
        let store = VectorStore::open(write_sample(dir.path())).unwrap();
        assert!(matches!(
            store.text(usize::MAX),
            Err(StoreError::OutOfBounds { count: 4, .. })
        ));
        assert!(matches!(
            store.document_id(usize::MAX),
            Err(StoreError::OutOfBounds { count: 4, .. })
        ));
        assert!(matches!(store.document_id(4), Err(StoreError::OutOfBounds { .. })));
        assert!(store.document_id(3).is_ok());
    }

    #[test]
    fn test_open_missing_is_not_found() {
        let dir = tempdir().unwrap();
        let err = VectorStore::open(dir.path().join("missing.folio")).unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[test]
    fn test_open_detects_corruption() {
        let dir = tempdir().unwrap();
        let path = write_sample(dir.path());
        let mut bytes = std::fs::read(&path).unwrap();

        let flipped = dir.path().join("flipped.folio");
        let mid = bytes.len() / 2;
        bytes[mid] ^= 0xFF;
        std::fs::write(&flipped, &bytes).unwrap();
        assert!(matches!(
            VectorStore::open(&flipped),
            Err(StoreError::Corrupt(FormatError::ChecksumMismatch { .. }))
        ));

        let truncated = dir.path().join("truncated.folio");
        std::fs::write(&truncated, &bytes[..bytes.len() - 9]).unwrap();
        assert!(matches!(VectorStore::open(&truncated), Err(StoreError::Corrupt(_))));

        let tiny = dir.path().join("tiny.folio");
        std::fs::write(&tiny, b"FOLIO001").unwrap();
        assert!(matches!(
            VectorStore::open(&tiny),
            Err(StoreError::Corrupt(FormatError::TooSmall(8)))
        ));
    }

    #[test]
    fn test_writer_rejects_bad_input() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bad.folio");
        let (rows, index) = sample();

        let err = write_store(&path, &[], &RangeIndex::default(), &metadata(0, 3)).unwrap_err();
        assert!(matches!(err, StoreError::EmptyStore));

        let mut ragged = rows.clone();
        ragged[2].embedding.push(1.0);
        let err = write_store(&path, &ragged, &index, &metadata(4, 3)).unwrap_err();
        assert!(matches!(err, StoreError::DimensionMismatch { expected: 3, actual: 4 }));

        let err = write_store(&path, &rows, &index, &metadata(4, 5)).unwrap_err();
        assert!(matches!(err, StoreError::DimensionMismatch { expected: 5, actual: 3 }));

        let mut orphan = rows.clone();
        orphan[1].document_id = 2;
        let err = write_store(&path, &orphan, &index, &metadata(4, 3)).unwrap_err();
        assert!(matches!(err, StoreError::UncoveredRow { row: 1, document_id: 2 }));

        let mut empty_span = rows.clone();
        empty_span[0].end_token = 0;
        let err = write_store(&path, &empty_span, &index, &metadata(4, 3)).unwrap_err();
        assert!(matches!(err, StoreError::InvalidInput(_)));

        let zero_dim: Vec<ChunkRow> = rows.iter().map(|r| ChunkRow { embedding: vec![], ..r.clone() }).collect();
        let err = write_store(&path, &zero_dim, &index, &metadata(4, 0)).unwrap_err();
        assert!(matches!(err, StoreError::InvalidInput(_)));

        let err = write_store(&path, &rows[..3], &index, &metadata(3, 3)).unwrap_err();
        assert!(matches!(err, StoreError::RangeIndex(_)));

        assert!(!path.exists());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_rewrite_replaces_whole_file() {
        let dir = tempdir().unwrap();
        let path = write_sample(dir.path());

        let mut b = RangeIndexBuilder::new();
        b.push_document(7, "Sonnet I", 1);
        let rows = vec![row(7, "from fairest creatures", vec![1.0, 0.0, 0.0])];
        write_store(&path, &rows, &b.finish().unwrap(), &metadata(1, 3)).unwrap();

        let store = VectorStore::open(&path).unwrap();
        assert_eq!(store.row_count(), 1);
        assert_eq!(store.range_index().title_of(7), Some("Sonnet I"));
        assert_eq!(std::fs::read_dir(path.parent().unwrap()).unwrap().count(), 1);
    }

    #[test]
    fn test_normalize_guards_zero() {
        assert_eq!(normalize(&[0.0, 0.0]), vec![0.0, 0.0]);
        let n = normalize(&[0.0, -5.0]);
        assert_eq!(n, vec![0.0, -1.0]);
    }

    #[test]
    fn test_store_is_shareable() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<VectorStore>();
    }
}
