pub mod document;
pub mod json_file;
mod migrations;

use std::path::PathBuf;
use std::sync::Arc;

use parley_types::models::{Message, User};
use tracing::info;

pub use document::DocumentStore;
pub use json_file::JsonFileStore;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed JSON in {}: {source}", .path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("malformed document in collection '{collection}': {source}")]
    Document {
        collection: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("storage lock poisoned")]
    LockPoisoned,
}

pub type Result<T> = std::result::Result<T, StorageError>;

/// The two persisted collections.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Collection {
    Users,
    Messages,
}

impl Collection {
    pub fn name(self) -> &'static str {
        match self {
            Self::Users => "users",
            Self::Messages => "messages",
        }
    }

    /// File name used by the flat-file backend.
    pub fn file_name(self) -> &'static str {
        match self {
            Self::Users => "users_data.json",
            Self::Messages => "chats.json",
        }
    }
}

/// Persistence contract shared by every backend.
///
/// Saves replace the whole collection with the given snapshot; there is no
/// partial update. Loads never fail just because nothing has been saved yet.
pub trait Storage: Send + Sync {
    fn load_users(&self) -> Result<Vec<User>>;

    fn save_users(&self, users: &[User]) -> Result<()>;

    /// All messages in insertion order, soft-deleted ones included.
    fn load_messages(&self) -> Result<Vec<Message>>;

    fn save_messages(&self, messages: &[Message]) -> Result<()>;
}

/// Which backend to open at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageBackend {
    Json { data_dir: PathBuf },
    Document { path: PathBuf },
}

impl StorageBackend {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Json { .. } => "json",
            Self::Document { .. } => "document",
        }
    }
}

/// Open the configured backend behind the storage trait.
pub fn open(backend: &StorageBackend) -> Result<Arc<dyn Storage>> {
    let storage: Arc<dyn Storage> = match backend {
        StorageBackend::Json { data_dir } => Arc::new(JsonFileStore::open(data_dir.clone())?),
        StorageBackend::Document { path } => Arc::new(DocumentStore::open(path)?),
    };
    info!("Using {} storage backend", backend.kind());
    Ok(storage)
}
