use serde::Deserialize;
use std::{fs, path::Path};
use thiserror::Error;
use toml_edit::{DocumentMut, value};
use tracing::info;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to access config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Invalid config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Invalid config document: {0}")]
    Document(#[from] toml_edit::TomlError),
}

#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub export: ExportConfig,
}

/// Which table backs the record store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// Local SQLite file, for offline use.
    #[default]
    Sqlite,
    /// Hosted PostgREST-style table.
    Remote,
}

impl Backend {
    pub fn as_str(&self) -> &'static str {
        match self {
            Backend::Sqlite => "sqlite",
            Backend::Remote => "remote",
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub backend: Backend,
    #[serde(default = "default_db_path")]
    pub db_path: String,
    /// Base URL of the hosted project, e.g. `https://xyz.example.co`.
    pub url: Option<String>,
    #[serde(default = "default_table")]
    pub table: String,
    /// Environment variable holding the API key for the remote backend.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: Backend::default(),
            db_path: default_db_path(),
            url: None,
            table: default_table(),
            api_key_env: default_api_key_env(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExportConfig {
    #[serde(default = "default_title")]
    pub title: String,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            title: default_title(),
        }
    }
}

fn default_db_path() -> String {
    "pqstore/records.db".to_string()
}

fn default_table() -> String {
    "pq_records".to_string()
}

fn default_api_key_env() -> String {
    "PQ_API_KEY".to_string()
}

fn default_title() -> String {
    "PQ Certification Records".to_string()
}

impl Config {
    /// Load the config file. A missing file yields the defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            info!(path = %path.display(), "No config file, using defaults");
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path).map_err(|source| io_error(path, source))?;
        Ok(toml::from_str(&content)?)
    }

    /// Switch the store backend in place, preserving the rest of the file.
    pub fn set_backend(path: impl AsRef<Path>, backend: Backend) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let content = if path.exists() {
            fs::read_to_string(path).map_err(|source| io_error(path, source))?
        } else {
            String::new()
        };
        let mut doc = content.parse::<DocumentMut>()?;

        if !doc.contains_table("store") {
            doc["store"] = toml_edit::table();
        }
        doc["store"]["backend"] = value(backend.as_str());

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|source| io_error(parent, source))?;
        }
        fs::write(path, doc.to_string()).map_err(|source| io_error(path, source))?;
        info!(path = %path.display(), backend = backend.as_str(), "Store backend updated");
        Ok(())
    }
}

fn io_error(path: &Path, source: std::io::Error) -> ConfigError {
    ConfigError::Io {
        path: path.display().to_string(),
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = Config::load(dir.path().join("absent.toml")).unwrap();
        assert_eq!(cfg.store.backend, Backend::Sqlite);
        assert_eq!(cfg.store.table, "pq_records");
        assert_eq!(cfg.export.title, "PQ Certification Records");
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pq.toml");
        fs::write(
            &path,
            "[store]\nbackend = \"remote\"\nurl = \"https://pq.example.org\"\n",
        )
        .unwrap();

        let cfg = Config::load(&path).unwrap();
        assert_eq!(cfg.store.backend, Backend::Remote);
        assert_eq!(cfg.store.url.as_deref(), Some("https://pq.example.org"));
        assert_eq!(cfg.store.db_path, "pqstore/records.db");
        assert_eq!(cfg.store.api_key_env, "PQ_API_KEY");
    }

    #[test]
    fn test_set_backend_keeps_comments() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pq.toml");
        fs::write(
            &path,
            "# team config\n[store]\nbackend = \"sqlite\" # local for now\ntable = \"pq_2025\"\n",
        )
        .unwrap();

        Config::set_backend(&path, Backend::Remote).unwrap();

        let text = fs::read_to_string(&path).unwrap();
        assert!(text.contains("# team config"));
        let cfg = Config::load(&path).unwrap();
        assert_eq!(cfg.store.backend, Backend::Remote);
        assert_eq!(cfg.store.table, "pq_2025");
    }

    #[test]
    fn test_set_backend_creates_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".config").join("pq.toml");
        Config::set_backend(&path, Backend::Remote).unwrap();
        assert_eq!(Config::load(&path).unwrap().store.backend, Backend::Remote);
    }
}
