//! All store logic independent of how it is driven (CLI or tests).
//!
//! A build turns a text corpus into one immutable `.folio` file: token-window chunks,
//! their embeddings (raw and normalized) and a range index mapping each document to
//! its rows. Queries memory-map that file and run an exact blocked cosine scan.
//! Folio keeps only config and downloads in its own app data directory (see [app_data]).

pub mod app_data;
pub mod chunks;
pub mod config;
pub mod corpus;
pub mod embed;
pub mod format;
pub mod index;
pub mod ollama;
pub mod query;
pub mod range_index;
pub mod store;
pub mod tokenizer;

pub use app_data::app_data_dir;
pub use chunks::{chunk, chunk_document, Chunk, ChunkError, ChunkParams, TokenWindow};
pub use config::{load_config, save_config, set_store_path, Config, ConfigError};
pub use corpus::{
    AcquisitionError, Corpus, Document, GutenbergSource, LocalDirSource, SplitMode, TextSource,
};
pub use embed::{EmbedError, Embedder};
pub use index::{build_store, BuildOptions, BuildOutcome, IndexError};
pub use ollama::{OllamaClient, OllamaError};
pub use query::{
    list_documents, query, resolve_document_filter, search_text, QueryEngine, QueryError,
    QueryHit,
};
pub use range_index::{RangeEntry, RangeIndex, RangeIndexBuilder, RangeIndexError};
pub use store::{write_store, ChunkRow, StoreError, StoreMetadata, VectorStore};
pub use tokenizer::{ensure_tokenizer_file, HfTokenizer, Tokenizer, TokenizerError};
