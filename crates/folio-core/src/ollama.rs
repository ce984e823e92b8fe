//! [Embedder] backed by a local Ollama server (`/api/embed`).

use ollama_rs::generation::embeddings::request::{EmbeddingsInput, GenerateEmbeddingsRequest};
use ollama_rs::Ollama;

use crate::embed::{EmbedError, Embedder};

pub const DEFAULT_EMBED_MODEL: &str = "nomic-embed-text";
pub const DEFAULT_BASE_URL: &str = "http://localhost:11434";

/// One model on one Ollama server. Each [Embedder::embed] call is a single request.
#[derive(Debug, Clone)]
pub struct OllamaClient {
    server: Ollama,
    model: String,
}

impl OllamaClient {
    /// No request is made until the first embed; a bad URL fails here.
    pub fn new(base_url: &str, model: impl Into<String>) -> Result<Self, OllamaError> {
        let server = Ollama::try_new(base_url)?;
        Ok(Self {
            server,
            model: model.into(),
        })
    }

    async fn request(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, OllamaError> {
        tracing::debug!("Ollama embed: {} texts with {}", texts.len(), self.model);
        let input = EmbeddingsInput::Multiple(texts.to_vec());
        let response = self
            .server
            .generate_embeddings(GenerateEmbeddingsRequest::new(self.model.clone(), input))
            .await?;
        Ok(response.embeddings)
    }
}

impl Embedder for OllamaClient {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let vectors = self.request(texts).await?;
        if vectors.len() != texts.len() {
            return Err(EmbedError::CountMismatch {
                expected: texts.len(),
                actual: vectors.len(),
            });
        }
        if let Some(first) = vectors.first() {
            if let Some(bad) = vectors.iter().find(|v| v.len() != first.len()) {
                return Err(EmbedError::UnevenWidths {
                    first: first.len(),
                    other: bad.len(),
                });
            }
        }
        Ok(vectors)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum OllamaError {
    #[error("invalid Ollama URL: {0}")]
    ParseUrl(#[from] url::ParseError),
    #[error("Ollama request failed: {0}")]
    Request(#[from] ollama_rs::error::OllamaError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_bad_url() {
        assert!(matches!(
            OllamaClient::new("not a url", DEFAULT_EMBED_MODEL),
            Err(OllamaError::ParseUrl(_))
        ));
    }

    #[test]
    fn model_name_is_recorded() {
        let client = OllamaClient::new(DEFAULT_BASE_URL, "all-minilm").unwrap();
        assert_eq!(client.model_name(), "all-minilm");
    }

    #[tokio::test]
    async fn empty_batch_skips_request() {
        // Nothing listens on port 9.
        let client = OllamaClient::new("http://127.0.0.1:9", DEFAULT_EMBED_MODEL).unwrap();
        assert!(client.embed(&[]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn unreachable_server_is_an_error() {
        let client = OllamaClient::new("http://127.0.0.1:9", DEFAULT_EMBED_MODEL).unwrap();
        let err = client.embed(&["hello".to_string()]).await.unwrap_err();
        assert!(matches!(err, EmbedError::Ollama(OllamaError::Request(_))));
    }
}
