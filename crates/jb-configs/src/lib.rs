//! # jb-configs
//!
//! Layered settings for Jokebox. Later layers win:
//!
//! 1. built-in defaults
//! 2. `jokebox.toml` (or any file passed to [`load_from`])
//! 3. `.env`, loaded into the process environment by `dotenvy`
//! 4. `JOKEBOX__*` environment variables, `__` separating nested keys
//!    (e.g. `JOKEBOX__LOG__FILTER=debug`)

use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

const DEFAULT_FILE: &str = "jokebox";
const ENV_PREFIX: &str = "JOKEBOX";
const MAX_PAGE_SIZE: usize = 100;

#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Which `DocumentStore` the binary wires in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentBackend {
    Memory,
    Sqlite,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LogSettings {
    /// `EnvFilter` directive, e.g. `info` or `jb_sync=debug`.
    pub filter: String,
    pub json: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Settings {
    /// Jokes per remote page.
    pub page_size: usize,
    pub cache_dir: PathBuf,
    pub blob_root: PathBuf,
    pub documents: DocumentBackend,
    /// Used when `documents = "sqlite"`.
    pub database_url: String,
    pub log: LogSettings,
    /// Signs this user in after the feed sync (`JOKEBOX__USER_ID`).
    #[serde(default)]
    pub user_id: Option<String>,
}

impl Settings {
    fn validate(self) -> Result<Self, SettingsError> {
        if self.page_size == 0 || self.page_size > MAX_PAGE_SIZE {
            return Err(SettingsError::Invalid(format!(
                "page_size must be between 1 and {MAX_PAGE_SIZE}, got {}",
                self.page_size
            )));
        }
        if self.documents == DocumentBackend::Sqlite && self.database_url.trim().is_empty() {
            return Err(SettingsError::Invalid(
                "database_url is required for the sqlite backend".into(),
            ));
        }
        Ok(self)
    }
}

/// Loads settings from `jokebox.toml` (optional), `.env` and the environment.
pub fn load() -> Result<Settings, SettingsError> {
    if let Ok(path) = dotenvy::dotenv() {
        debug!(path = %path.display(), "loaded .env");
    }
    build(config::File::with_name(DEFAULT_FILE).required(false))
}

/// Like [`load`] but reads the given file instead of `jokebox.toml`.
pub fn load_from(path: &Path) -> Result<Settings, SettingsError> {
    if let Ok(path) = dotenvy::dotenv() {
        debug!(path = %path.display(), "loaded .env");
    }
    build(config::File::from(path).required(true))
}

fn build<S>(file: S) -> Result<Settings, SettingsError>
where
    S: config::Source + Send + Sync + 'static,
{
    let settings = config::Config::builder()
        .set_default("page_size", 20_i64)?
        .set_default("cache_dir", "./data/cache")?
        .set_default("blob_root", "./data/blobs")?
        .set_default("documents", "memory")?
        .set_default("database_url", "sqlite:jokebox.db")?
        .set_default("log.filter", "info")?
        .set_default("log.json", false)?
        .add_source(file)
        .add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .try_parsing(true),
        )
        .build()?;

    settings.try_deserialize::<Settings>()?.validate()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn file_overrides_defaults() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "page_size = 5\ndocuments = \"sqlite\"\ndatabase_url = \"sqlite::memory:\"\n[log]\njson = true"
        )
        .unwrap();

        let settings = load_from(file.path()).unwrap();
        assert_eq!(settings.page_size, 5);
        assert_eq!(settings.documents, DocumentBackend::Sqlite);
        assert_eq!(settings.database_url, "sqlite::memory:");
        assert!(settings.log.json);
        assert_eq!(settings.log.filter, "info");
        assert_eq!(settings.cache_dir, PathBuf::from("./data/cache"));
        assert_eq!(settings.user_id, None);
    }

    #[test]
    fn user_id_is_read_from_the_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "user_id = \"ana\"").unwrap();

        let settings = load_from(file.path()).unwrap();
        assert_eq!(settings.user_id.as_deref(), Some("ana"));
    }

    #[test]
    fn zero_page_size_is_rejected() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "page_size = 0").unwrap();

        let err = load_from(file.path()).unwrap_err();
        assert!(matches!(err, SettingsError::Invalid(_)));
    }
}
