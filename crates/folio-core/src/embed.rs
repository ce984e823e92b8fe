//! The embedding model as a collaborator: anything that turns a batch of texts into
//! one fixed-width vector per text.

use crate::ollama::OllamaError;

/// Batch text embedder. The vector width must be the same for every call made with
/// one model.
#[allow(async_fn_in_trait)]
pub trait Embedder {
    /// Model identifier recorded in store metadata.
    fn model_name(&self) -> &str;

    /// One vector per input, in input order.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError>;
}

#[derive(Debug, thiserror::Error)]
pub enum EmbedError {
    #[error(transparent)]
    Ollama(#[from] OllamaError),
    #[error("embedder returned {actual} vectors for {expected} inputs")]
    CountMismatch { expected: usize, actual: usize },
    #[error("embedder returned vectors of width {first} and {other} in one batch")]
    UnevenWidths { first: usize, other: usize },
}
