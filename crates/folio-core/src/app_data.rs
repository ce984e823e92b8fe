//! Where Folio keeps its own data: config, the downloaded tokenizer and the default
//! store. `FOLIO_HOME` overrides the platform location.

use std::path::PathBuf;

/// Environment variable that replaces the platform data directory.
pub const HOME_ENV: &str = "FOLIO_HOME";

/// Returns the directory where Folio stores config, tokenizer and stores.
/// On macOS: `~/Library/Application Support/Folio/`.
/// Creates the directory if it doesn't exist; returns `None` if we can't determine the path.
pub fn app_data_dir() -> Option<PathBuf> {
    let dir = match std::env::var_os(HOME_ENV).filter(|v| !v.is_empty()) {
        Some(home) => PathBuf::from(home),
        None => directories::ProjectDirs::from("app", "Folio", "Folio")?
            .data_local_dir()
            .to_path_buf(),
    };
    std::fs::create_dir_all(&dir).ok()?;
    Some(dir)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn app_data_dir_is_some() {
        assert!(app_data_dir().is_some());
    }
}
