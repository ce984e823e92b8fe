//! Build pipeline: acquire → chunk → embed → store. Produces one `.folio` file.

use std::path::PathBuf;

use chrono::Utc;
use indicatif::{ProgressBar, ProgressStyle};

use crate::chunks::{chunk_document, ChunkError, ChunkParams};
use crate::corpus::{AcquisitionError, TextSource};
use crate::embed::{EmbedError, Embedder};
use crate::range_index::{RangeIndexBuilder, RangeIndexError};
use crate::store::{write_store, ChunkRow, StoreError, StoreMetadata};
use crate::tokenizer::Tokenizer;

/// Texts sent to the embedder per call.
pub const DEFAULT_BATCH_SIZE: usize = 64;

#[derive(Debug, Clone)]
pub struct BuildOptions {
    pub output: PathBuf,
    /// Rebuild even when `output` already exists.
    pub force_rebuild: bool,
    pub params: ChunkParams,
    pub batch_size: usize,
    /// Provenance / license note stored in metadata.
    pub note: String,
    /// Draw chunking and embedding progress bars on stderr.
    pub show_progress: bool,
}

impl BuildOptions {
    pub fn new(output: impl Into<PathBuf>) -> Self {
        Self {
            output: output.into(),
            force_rebuild: false,
            params: ChunkParams::default(),
            batch_size: DEFAULT_BATCH_SIZE,
            note: String::new(),
            show_progress: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildOutcome {
    /// The store already existed and no rebuild was requested.
    Skipped(PathBuf),
    Built {
        path: PathBuf,
        rows: usize,
        documents: usize,
    },
}

/// Runs the full pipeline. Documents get `document_id` = their position in the
/// corpus; documents that chunk to nothing are left out of the range index.
/// Any failure aborts before the store is published.
pub async fn build_store<S, T, E>(
    source: &S,
    tokenizer: &T,
    embedder: &E,
    options: &BuildOptions,
) -> Result<BuildOutcome, IndexError>
where
    S: TextSource,
    T: Tokenizer + ?Sized,
    E: Embedder,
{
    if options.output.exists() && !options.force_rebuild {
        tracing::info!("Store {} exists; skipping build", options.output.display());
        return Ok(BuildOutcome::Skipped(options.output.clone()));
    }
    options.params.validate()?;

    let corpus = source.load().await?;
    tracing::info!("Chunking {} documents", corpus.documents.len());

    let mut builder = RangeIndexBuilder::new();
    let mut pending = Vec::new();
    let bar = progress_bar(options.show_progress, corpus.documents.len(), "Chunking");
    for (position, doc) in corpus.documents.iter().enumerate() {
        let document_id = i32::try_from(position).map_err(|_| IndexError::TooManyDocuments)?;
        let chunks = chunk_document(tokenizer, &doc.body, options.params)?;
        if builder.push_document(document_id, doc.title.as_str(), chunks.len()).is_none() {
            tracing::debug!("Document {:?} produced no chunks", doc.title);
        }
        pending.extend(chunks.into_iter().map(|c| (document_id, c)));
        bar.inc(1);
    }
    bar.finish_and_clear();
    if pending.is_empty() {
        return Err(IndexError::EmptyInput);
    }
    let index = builder.finish()?;

    let batch_size = options.batch_size.max(1);
    let mut rows: Vec<ChunkRow> = Vec::with_capacity(pending.len());
    let mut dimension: Option<usize> = None;
    let bar = progress_bar(options.show_progress, pending.len(), "Embedding");
    for (b, batch) in pending.chunks(batch_size).enumerate() {
        let texts: Vec<String> = batch.iter().map(|(_, c)| c.text.clone()).collect();
        let vectors = embedder.embed(&texts).await?;
        if vectors.len() != texts.len() {
            return Err(EmbedError::CountMismatch {
                expected: texts.len(),
                actual: vectors.len(),
            }
            .into());
        }
        for ((document_id, chunk), embedding) in batch.iter().zip(vectors) {
            let expected = *dimension.get_or_insert(embedding.len());
            if embedding.len() != expected {
                return Err(IndexError::DimensionMismatch {
                    expected,
                    actual: embedding.len(),
                });
            }
            rows.push(ChunkRow {
                text: chunk.text.clone(),
                document_id: *document_id,
                start_token: chunk.start_token,
                end_token: chunk.end_token,
                embedding,
            });
        }
        bar.inc(batch.len() as u64);
        tracing::debug!("Embedded batch {} ({} rows so far)", b + 1, rows.len());
    }
    bar.finish_and_clear();
    let dimension = dimension.unwrap_or(0);

    let metadata = StoreMetadata {
        embedding_model: embedder.model_name().to_string(),
        dimension,
        created_at: Utc::now(),
        max_tokens: options.params.max_tokens,
        overlap: options.params.overlap,
        row_count: rows.len(),
        note: options.note.clone(),
        tokenizer: tokenizer.name().to_string(),
        source: corpus.provenance.clone(),
    };
    write_store(&options.output, &rows, &index, &metadata)?;
    tracing::info!(
        "Wrote {} rows ({} documents, dim {}) to {}",
        rows.len(),
        index.len(),
        dimension,
        options.output.display()
    );
    Ok(BuildOutcome::Built {
        path: options.output.clone(),
        rows: rows.len(),
        documents: index.len(),
    })
}

fn progress_bar(enabled: bool, len: usize, label: &'static str) -> ProgressBar {
    if !enabled {
        return ProgressBar::hidden();
    }
    let bar = ProgressBar::new(len as u64);
    if let Ok(style) = ProgressStyle::with_template("{msg:>9} [{bar:40}] {pos}/{len} ({eta})") {
        bar.set_style(style.progress_chars("=> "));
    }
    bar.set_message(label);
    bar
}

#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    #[error("acquisition error: {0}")]
    Acquisition(#[from] AcquisitionError),
    #[error("no chunks were produced from the corpus")]
    EmptyInput,
    #[error("too many documents for 32-bit document ids")]
    TooManyDocuments,
    #[error("embedding has dimension {actual}, expected {expected}")]
    DimensionMismatch { expected: usize, actual: usize },
    #[error("chunking error: {0}")]
    Chunk(#[from] ChunkError),
    #[error("range index error: {0}")]
    RangeIndex(#[from] RangeIndexError),
    #[error("embedding error: {0}")]
    Embed(#[from] EmbedError),
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}
