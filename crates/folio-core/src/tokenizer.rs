//! Tokenizer used to window documents. The chunker only needs `encode` and `decode`;
//! [HfTokenizer] backs them with a HuggingFace `tokenizer.json`.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Tokenizer used when the config does not name one.
pub const DEFAULT_TOKENIZER_URL: &str =
    "https://huggingface.co/bert-base-uncased/resolve/main/tokenizer.json";

/// Text ↔ token id conversion. Must be deterministic: the same text always encodes
/// to the same ids.
pub trait Tokenizer {
    /// Identifier recorded in store metadata.
    fn name(&self) -> &str;

    fn encode(&self, text: &str) -> Result<Vec<u32>, TokenizerError>;

    fn decode(&self, ids: &[u32]) -> Result<String, TokenizerError>;
}

/// Tokenizer loaded from a HuggingFace `tokenizer.json`. Special tokens are neither
/// added on encode nor emitted on decode; truncation and padding are disabled so long
/// documents encode in full.
pub struct HfTokenizer {
    inner: tokenizers::Tokenizer,
    name: String,
}

impl HfTokenizer {
    pub fn from_file(path: &Path) -> Result<Self, TokenizerError> {
        let mut inner = tokenizers::Tokenizer::from_file(path).map_err(|e| TokenizerError::Load {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        inner
            .with_truncation(None)
            .map_err(|e| TokenizerError::Load {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;
        inner.with_padding(None);
        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "tokenizer".to_string());
        Ok(Self { inner, name })
    }

    /// Override the identifier recorded in store metadata (e.g. `bert-base-uncased`).
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

impl Tokenizer for HfTokenizer {
    fn name(&self) -> &str {
        &self.name
    }

    fn encode(&self, text: &str) -> Result<Vec<u32>, TokenizerError> {
        let encoding = self
            .inner
            .encode(text, false)
            .map_err(|e| TokenizerError::Encode(e.to_string()))?;
        Ok(encoding.get_ids().to_vec())
    }

    fn decode(&self, ids: &[u32]) -> Result<String, TokenizerError> {
        self.inner
            .decode(ids, true)
            .map_err(|e| TokenizerError::Decode(e.to_string()))
    }
}

/// Downloads `url` to `dest` unless `dest` already exists. The file is written to a
/// temporary sibling and renamed into place, so a failed download leaves nothing behind.
pub async fn ensure_tokenizer_file(url: &str, dest: &Path) -> Result<PathBuf, TokenizerError> {
    if dest.exists() {
        return Ok(dest.to_path_buf());
    }
    tracing::info!("Downloading tokenizer {} -> {}", url, dest.display());
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(60))
        .build()
        .map_err(|e| TokenizerError::Download(e.to_string()))?;
    let resp = client
        .get(url)
        .send()
        .await
        .and_then(|r| r.error_for_status())
        .map_err(|e| TokenizerError::Download(e.to_string()))?;
    let bytes = resp
        .bytes()
        .await
        .map_err(|e| TokenizerError::Download(e.to_string()))?;

    let parent = dest.parent().unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(parent).map_err(TokenizerError::Io)?;
    let mut tmp = tempfile::NamedTempFile::new_in(parent).map_err(TokenizerError::Io)?;
    tmp.write_all(&bytes).map_err(TokenizerError::Io)?;
    tmp.as_file().sync_all().map_err(TokenizerError::Io)?;
    tmp.persist(dest).map_err(|e| TokenizerError::Io(e.error))?;
    Ok(dest.to_path_buf())
}

#[derive(Debug, thiserror::Error)]
pub enum TokenizerError {
    #[error("failed to load tokenizer {path}: {reason}")]
    Load { path: PathBuf, reason: String },
    #[error("encode failed: {0}")]
    Encode(String),
    #[error("decode failed: {0}")]
    Decode(String),
    #[error("tokenizer download failed: {0}")]
    Download(String),
    #[error("io error: {0}")]
    Io(std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_is_a_load_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = HfTokenizer::from_file(&dir.path().join("nope.json")).err().unwrap();
        assert!(matches!(err, TokenizerError::Load { .. }));
    }

    #[tokio::test]
    async fn existing_file_is_not_downloaded() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("tokenizer.json");
        std::fs::write(&dest, b"{}").unwrap();
        // An unreachable URL proves no request is made.
        let got = ensure_tokenizer_file("http://127.0.0.1:9/tokenizer.json", &dest)
            .await
            .unwrap();
        assert_eq!(got, dest);
        assert_eq!(std::fs::read(&dest).unwrap(), b"{}");
    }
}
