use std::path::PathBuf;

use anyhow::{Context, bail};
use parley_db::StorageBackend;

/// Runtime configuration, read once at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub storage: StorageBackend,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let host = var("PARLEY_HOST", "0.0.0.0");
        let port: u16 = var("PARLEY_PORT", "5000")
            .parse()
            .context("PARLEY_PORT must be a port number")?;

        let storage = match var("PARLEY_STORAGE", "json").to_ascii_lowercase().as_str() {
            "json" => StorageBackend::Json {
                data_dir: PathBuf::from(var("PARLEY_DATA_DIR", "data")),
            },
            "document" => StorageBackend::Document {
                path: PathBuf::from(var("PARLEY_DOCUMENT_DB_PATH", "data/parley.db")),
            },
            other => bail!("PARLEY_STORAGE must be 'json' or 'document', got '{}'", other),
        };

        Ok(Self { host, port, storage })
    }
}
