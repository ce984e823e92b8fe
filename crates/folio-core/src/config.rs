//! Persisted settings in the app data directory (`config.toml`).
//!
//! Every field has a default, so a partial or missing file still yields a usable
//! config. CLI flags override these per invocation.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::app_data;
use crate::chunks::{DEFAULT_MAX_TOKENS, DEFAULT_OVERLAP};
use crate::index::DEFAULT_BATCH_SIZE;
use crate::ollama::{DEFAULT_BASE_URL, DEFAULT_EMBED_MODEL};
use crate::query::DEFAULT_BLOCK_ROWS;
use crate::tokenizer::DEFAULT_TOKENIZER_URL;

const CONFIG_FILENAME: &str = "config.toml";
const DEFAULT_STORE_FILENAME: &str = "shakespeare.folio";
const DEFAULT_TOKENIZER_FILENAME: &str = "tokenizer.json";

/// Project Gutenberg's Complete Works of William Shakespeare.
pub const DEFAULT_GUTENBERG_ID: u32 = 100;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Store file used when a command is not given one.
    pub store_path: Option<String>,
    pub ollama_url: String,
    pub embed_model: String,
    /// Local `tokenizer.json`; downloaded from `tokenizer_url` when absent.
    pub tokenizer_path: Option<String>,
    pub tokenizer_url: String,
    pub max_tokens: usize,
    pub overlap: usize,
    pub batch_size: usize,
    pub block_rows: usize,
    pub gutenberg_id: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            store_path: None,
            ollama_url: DEFAULT_BASE_URL.to_string(),
            embed_model: DEFAULT_EMBED_MODEL.to_string(),
            tokenizer_path: None,
            tokenizer_url: DEFAULT_TOKENIZER_URL.to_string(),
            max_tokens: DEFAULT_MAX_TOKENS,
            overlap: DEFAULT_OVERLAP,
            batch_size: DEFAULT_BATCH_SIZE,
            block_rows: DEFAULT_BLOCK_ROWS,
            gutenberg_id: DEFAULT_GUTENBERG_ID,
        }
    }
}

impl Config {
    /// Configured store path, or `shakespeare.folio` in the app data directory.
    pub fn resolved_store_path(&self) -> Option<PathBuf> {
        self.store_path
            .as_deref()
            .filter(|s| !s.is_empty())
            .map(PathBuf::from)
            .or_else(|| app_data::app_data_dir().map(|d| d.join(DEFAULT_STORE_FILENAME)))
    }

    /// Configured tokenizer path, or `tokenizer.json` in the app data directory.
    pub fn resolved_tokenizer_path(&self) -> Option<PathBuf> {
        self.tokenizer_path
            .as_deref()
            .filter(|s| !s.is_empty())
            .map(PathBuf::from)
            .or_else(|| app_data::app_data_dir().map(|d| d.join(DEFAULT_TOKENIZER_FILENAME)))
    }
}

/// Load config from the app data directory. Returns default config if missing or invalid.
pub fn load_config() -> Config {
    let Some(data_dir) = app_data::app_data_dir() else {
        return Config::default();
    };
    load_config_from(&data_dir.join(CONFIG_FILENAME))
}

pub fn load_config_from(path: &Path) -> Config {
    let Ok(s) = std::fs::read_to_string(path) else {
        return Config::default();
    };
    toml::from_str(&s).unwrap_or_else(|e| {
        tracing::warn!("Ignoring invalid config {}: {}", path.display(), e);
        Config::default()
    })
}

/// Save config to the app data directory.
pub fn save_config(config: &Config) -> Result<(), ConfigError> {
    let data_dir = app_data::app_data_dir().ok_or(ConfigError::NoDataDir)?;
    save_config_to(config, &data_dir.join(CONFIG_FILENAME))
}

pub fn save_config_to(config: &Config, path: &Path) -> Result<(), ConfigError> {
    let s = toml::to_string_pretty(config).map_err(ConfigError::Serialize)?;
    std::fs::write(path, s).map_err(ConfigError::Write)
}

/// Set and persist the default store path. The file need not exist yet, but its
/// directory must.
pub fn set_store_path(path: &Path) -> Result<(), ConfigError> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let parent = parent.canonicalize().map_err(ConfigError::Canonicalize)?;
    if !parent.is_dir() {
        return Err(ConfigError::NotADirectory(parent));
    }
    let file_name = path
        .file_name()
        .ok_or_else(|| ConfigError::NotAFile(path.to_path_buf()))?;
    let mut config = load_config();
    config.store_path = Some(parent.join(file_name).to_string_lossy().into_owned());
    save_config(&config)
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("could not determine app data directory")]
    NoDataDir,
    #[error("failed to serialize config: {0}")]
    Serialize(toml::ser::Error),
    #[error("failed to write config: {0}")]
    Write(std::io::Error),
    #[error("failed to resolve path: {0}")]
    Canonicalize(std::io::Error),
    #[error("not a directory: {0}")]
    NotADirectory(PathBuf),
    #[error("not a file path: {0}")]
    NotAFile(PathBuf),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILENAME);
        std::fs::write(&path, "max_tokens = 128\nembed_model = \"mxbai-embed-large\"\n").unwrap();
        let config = load_config_from(&path);
        assert_eq!(config.max_tokens, 128);
        assert_eq!(config.embed_model, "mxbai-embed-large");
        assert_eq!(config.overlap, DEFAULT_OVERLAP);
        assert_eq!(config.gutenberg_id, 100);
    }

    #[test]
    fn invalid_or_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILENAME);
        assert_eq!(load_config_from(&path), Config::default());
        std::fs::write(&path, "max_tokens = \"lots\"").unwrap();
        assert_eq!(load_config_from(&path), Config::default());
    }

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILENAME);
        let config = Config {
            store_path: Some("/tmp/works.folio".to_string()),
            block_rows: 512,
            ..Config::default()
        };
        save_config_to(&config, &path).unwrap();
        assert_eq!(load_config_from(&path), config);
    }

    #[test]
    fn explicit_store_path_wins() {
        let config = Config {
            store_path: Some("/data/a.folio".to_string()),
            ..Config::default()
        };
        assert_eq!(
            config.resolved_store_path(),
            Some(PathBuf::from("/data/a.folio"))
        );
    }
}
