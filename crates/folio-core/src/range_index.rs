//! Maps logical documents to the contiguous block of rows their chunks occupy.
//!
//! Rows are assigned in document processing order, so every document owns one
//! half-open range and ranges never overlap. Documents that produced no chunks get no
//! entry at all.

use std::collections::HashMap;
use std::ops::Range;

use serde::{Deserialize, Serialize};

/// One document's row range: `[start_row, end_row)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RangeEntry {
    pub document_id: i32,
    pub title: String,
    pub start_row: usize,
    pub end_row: usize,
}

impl RangeEntry {
    pub fn rows(&self) -> Range<usize> {
        self.start_row..self.end_row
    }

    pub fn len(&self) -> usize {
        self.end_row - self.start_row
    }

    pub fn is_empty(&self) -> bool {
        self.end_row == self.start_row
    }
}

/// Assigns rows to documents with a running cursor.
#[derive(Debug, Default)]
pub struct RangeIndexBuilder {
    cursor: usize,
    entries: Vec<RangeEntry>,
}

impl RangeIndexBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a document that produced `chunk_count` rows. Returns the assigned rows,
    /// or `None` when the document produced nothing (no entry, cursor unchanged).
    pub fn push_document(
        &mut self,
        document_id: i32,
        title: impl Into<String>,
        chunk_count: usize,
    ) -> Option<Range<usize>> {
        if chunk_count == 0 {
            return None;
        }
        let start_row = self.cursor;
        self.cursor += chunk_count;
        self.entries.push(RangeEntry {
            document_id,
            title: title.into(),
            start_row,
            end_row: self.cursor,
        });
        Some(start_row..self.cursor)
    }

    /// Rows assigned so far.
    pub fn row_count(&self) -> usize {
        self.cursor
    }

    /// Fails with [RangeIndexError::DuplicateDocument] if an id was pushed twice.
    pub fn finish(self) -> Result<RangeIndex, RangeIndexError> {
        RangeIndex::from_entries(self.entries)
    }
}

/// Validated range index with a `document_id` lookup built once.
#[derive(Debug, Clone, Default)]
pub struct RangeIndex {
    entries: Vec<RangeEntry>,
    by_id: HashMap<i32, usize>,
}

impl RangeIndex {
    /// Checks that entries are non-empty, sorted by `start_row`, pairwise
    /// non-overlapping and carry unique document ids.
    pub fn from_entries(entries: Vec<RangeEntry>) -> Result<Self, RangeIndexError> {
        let mut by_id = HashMap::with_capacity(entries.len());
        for (i, e) in entries.iter().enumerate() {
            if e.end_row <= e.start_row {
                return Err(RangeIndexError::EmptyRange {
                    document_id: e.document_id,
                    start_row: e.start_row,
                    end_row: e.end_row,
                });
            }
            if i > 0 && e.start_row < entries[i - 1].end_row {
                return Err(RangeIndexError::Overlap {
                    previous: entries[i - 1].document_id,
                    next: e.document_id,
                });
            }
            if by_id.insert(e.document_id, i).is_some() {
                return Err(RangeIndexError::DuplicateDocument(e.document_id));
            }
        }
        Ok(Self { entries, by_id })
    }

    /// Every range must end at or before `row_count`.
    pub fn check_within(&self, row_count: usize) -> Result<(), RangeIndexError> {
        match self.entries.last() {
            Some(last) if last.end_row > row_count => Err(RangeIndexError::PastEnd {
                document_id: last.document_id,
                end_row: last.end_row,
                row_count,
            }),
            _ => Ok(()),
        }
    }

    pub fn entries(&self) -> &[RangeEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, document_id: i32) -> Option<&RangeEntry> {
        self.by_id.get(&document_id).map(|&i| &self.entries[i])
    }

    pub fn title_of(&self, document_id: i32) -> Option<&str> {
        self.get(document_id).map(|e| e.title.as_str())
    }

    /// The entry whose range contains `row`, by binary search on `start_row`.
    pub fn entry_for_row(&self, row: usize) -> Option<&RangeEntry> {
        let i = self.entries.partition_point(|e| e.start_row <= row);
        let e = self.entries.get(i.checked_sub(1)?)?;
        (row < e.end_row).then_some(e)
    }

    /// First entry whose title contains `needle`, ignoring case.
    pub fn find_by_title(&self, needle: &str) -> Option<&RangeEntry> {
        let needle = needle.to_lowercase();
        self.entries
            .iter()
            .find(|e| e.title.to_lowercase().contains(&needle))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RangeIndexError {
    #[error("document {document_id} has an empty range [{start_row}, {end_row})")]
    EmptyRange {
        document_id: i32,
        start_row: usize,
        end_row: usize,
    },
    #[error("ranges of documents {previous} and {next} overlap or are out of order")]
    Overlap { previous: i32, next: i32 },
    #[error("document {0} appears more than once")]
    DuplicateDocument(i32),
    #[error("document {document_id} ends at row {end_row}, past the {row_count} stored rows")]
    PastEnd {
        document_id: i32,
        end_row: usize,
        row_count: usize,
    },
}
