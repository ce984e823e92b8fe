//! Exact cosine top-K over a [VectorStore].
//!
//! The candidate rows are scanned in fixed-size blocks of normalized embeddings, so
//! the vectors touched at any moment are bounded by the block size rather than the
//! store size. All scores are collected first, then the K best are selected and
//! sorted: descending score, ties broken by lower row, non-finite scores last.

use std::cmp::Ordering;
use std::ops::Range;
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};

use serde::Serialize;

use crate::embed::{Embedder, EmbedError};
use crate::range_index::{RangeEntry, RangeIndex};
use crate::store::{normalize, StoreError, VectorStore};

/// Rows scanned per block.
pub const DEFAULT_BLOCK_ROWS: usize = 4096;

/// One ranked result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryHit {
    /// 1-based.
    pub rank: usize,
    pub score: f32,
    pub row: usize,
    pub document_id: i32,
    pub document_title: String,
    pub text: String,
}

/// Query runner over a shared store. Many engines may query the same store at once.
#[derive(Debug, Clone, Copy)]
pub struct QueryEngine<'a> {
    store: &'a VectorStore,
    block_rows: usize,
    cancel: Option<&'a AtomicBool>,
}

impl<'a> QueryEngine<'a> {
    pub fn new(store: &'a VectorStore) -> Self {
        Self {
            store,
            block_rows: DEFAULT_BLOCK_ROWS,
            cancel: None,
        }
    }

    pub fn with_block_rows(mut self, block_rows: usize) -> Self {
        self.block_rows = block_rows.max(1);
        self
    }

    /// The scan stops with [QueryError::Cancelled] at the next block boundary once
    /// `flag` is set.
    pub fn with_cancel(mut self, flag: &'a AtomicBool) -> Self {
        self.cancel = Some(flag);
        self
    }

    /// Top `k` rows by cosine similarity to `query_embedding`, restricted to
    /// `row_filter` when given. Returns fewer than `k` hits when there are fewer
    /// candidates, and nothing for an empty candidate range.
    pub fn query(
        &self,
        query_embedding: &[f32],
        k: usize,
        row_filter: Option<Range<usize>>,
    ) -> Result<Vec<QueryHit>, QueryError> {
        let dim = self.store.dimension();
        if query_embedding.len() != dim {
            return Err(QueryError::DimensionMismatch {
                expected: dim,
                actual: query_embedding.len(),
            });
        }
        if k == 0 {
            return Err(QueryError::InvalidK);
        }
        let rows = row_filter.unwrap_or(0..self.store.row_count());
        self.store.check_range(&rows)?;

        let q = normalize(query_embedding);
        let scores = self.scan(&q, rows.clone())?;
        let best = top_k(&scores, k);

        let index = self.store.range_index();
        let mut hits = Vec::with_capacity(best.len());
        for (i, local) in best.into_iter().enumerate() {
            let row = rows.start + local;
            let document_id = self.store.document_id(row)?;
            hits.push(QueryHit {
                rank: i + 1,
                score: scores[local],
                row,
                document_id,
                document_title: document_title(index, document_id),
                text: self.store.text(row)?.to_string(),
            });
        }
        Ok(hits)
    }

    /// Dot product of `q` with every normalized row in `rows`, one block at a time.
    /// `scores[i]` belongs to row `rows.start + i`.
    pub fn scan(&self, q: &[f32], rows: Range<usize>) -> Result<Vec<f32>, QueryError> {
        let dim = self.store.dimension();
        let mut scores = Vec::with_capacity(rows.len());
        let mut blocks = 0usize;
        let mut start = rows.start;
        while start < rows.end {
            if self.cancel.is_some_and(|c| c.load(AtomicOrdering::Relaxed)) {
                return Err(QueryError::Cancelled);
            }
            let end = (start + self.block_rows).min(rows.end);
            let block = self.store.slice_embeddings_normed(start..end)?;
            scores.extend(block.chunks_exact(dim).map(|v| dot(v, q)));
            blocks += 1;
            start = end;
        }
        tracing::debug!(
            "Scanned {} rows in {} blocks of up to {}",
            scores.len(),
            blocks,
            self.block_rows
        );
        Ok(scores)
    }
}

/// Runs [QueryEngine::query] with the default block size.
pub fn query(
    store: &VectorStore,
    query_embedding: &[f32],
    k: usize,
    row_filter: Option<Range<usize>>,
) -> Result<Vec<QueryHit>, QueryError> {
    QueryEngine::new(store).query(query_embedding, k, row_filter)
}

/// Range entries in row order, as stored.
pub fn list_documents(store: &VectorStore) -> &[RangeEntry] {
    store.range_index().entries()
}

/// Rows of the first document whose title contains `needle` (case-insensitive).
pub fn resolve_document_filter(index: &RangeIndex, needle: &str) -> Result<Range<usize>, QueryError> {
    index
        .find_by_title(needle)
        .map(|e| e.rows())
        .ok_or_else(|| QueryError::NoMatchingDocument(needle.to_string()))
}

/// Embeds `text` and queries the store, optionally within the first document whose
/// title contains `title_filter`.
pub async fn search_text<E: Embedder>(
    engine: &QueryEngine<'_>,
    embedder: &E,
    text: &str,
    k: usize,
    title_filter: Option<&str>,
) -> Result<Vec<QueryHit>, QueryError> {
    let store = engine.store;
    let row_filter = title_filter
        .map(|needle| resolve_document_filter(store.range_index(), needle))
        .transpose()?;
    if embedder.model_name() != store.metadata().embedding_model {
        tracing::warn!(
            "Query model {} differs from store model {}; scores may be meaningless",
            embedder.model_name(),
            store.metadata().embedding_model
        );
    }
    let mut vectors = embedder.embed(&[text.to_string()]).await?;
    let q = vectors.pop().ok_or(EmbedError::CountMismatch {
        expected: 1,
        actual: 0,
    })?;
    engine.query(&q, k, row_filter)
}

fn document_title(index: &RangeIndex, document_id: i32) -> String {
    index
        .title_of(document_id)
        .map(str::to_string)
        .unwrap_or_else(|| format!("document_id={document_id}"))
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// Non-finite scores sort below everything; adding 0.0 folds -0.0 into +0.0 so the
/// two compare as a tie.
fn rank_key(score: f32) -> f32 {
    if score.is_finite() {
        score + 0.0
    } else {
        f32::NEG_INFINITY
    }
}

/// `Less` when row `a` ranks ahead of row `b`.
fn rank_order(scores: &[f32], a: usize, b: usize) -> Ordering {
    rank_key(scores[b])
        .total_cmp(&rank_key(scores[a]))
        .then(a.cmp(&b))
}

/// Indices of the `k` best scores, best first.
pub fn top_k(scores: &[f32], k: usize) -> Vec<usize> {
    let k = k.min(scores.len());
    if k == 0 {
        return Vec::new();
    }
    let mut idx: Vec<usize> = (0..scores.len()).collect();
    if k < idx.len() {
        idx.select_nth_unstable_by(k - 1, |&a, &b| rank_order(scores, a, b));
        idx.truncate(k);
    }
    idx.sort_unstable_by(|&a, &b| rank_order(scores, a, b));
    idx
}

#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    #[error("query has dimension {actual}, store has {expected}")]
    DimensionMismatch { expected: usize, actual: usize },
    #[error("k must be at least 1")]
    InvalidK,
    #[error("no document title contains \"{0}\"")]
    NoMatchingDocument(String),
    #[error("query cancelled")]
    Cancelled,
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("failed to embed query: {0}")]
    Embed(#[from] EmbedError),
}
