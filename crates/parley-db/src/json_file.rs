use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use parley_types::models::{Message, User};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, info};

use crate::{Collection, Result, Storage, StorageError};

/// Flat-file backend: one JSON array per collection inside `dir`.
///
/// Each save serializes the full collection to a sibling temp file and renames
/// it into place, so readers see either the old or the new snapshot.
pub struct JsonFileStore {
    dir: PathBuf,
}

impl JsonFileStore {
    pub fn open(dir: PathBuf) -> Result<Self> {
        fs::create_dir_all(&dir).map_err(|source| StorageError::Io {
            path: dir.clone(),
            source,
        })?;
        info!("JSON data directory: {}", dir.display());
        Ok(Self { dir })
    }

    pub fn path(&self, collection: Collection) -> PathBuf {
        self.dir.join(collection.file_name())
    }

    fn read_collection<T: DeserializeOwned>(&self, collection: Collection) -> Result<Vec<T>> {
        let path = self.path(collection);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => return Err(StorageError::Io { path, source }),
        };

        // A freshly touched file counts as "no data yet"
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(Vec::new());
        }

        serde_json::from_slice(&bytes).map_err(|source| StorageError::Json { path, source })
    }

    fn write_collection<T: Serialize>(&self, collection: Collection, items: &[T]) -> Result<()> {
        let path = self.path(collection);
        let bytes = serde_json::to_vec(items).map_err(|source| StorageError::Json {
            path: path.clone(),
            source,
        })?;

        let tmp = path.with_extension("json.tmp");
        write_file(&tmp, &bytes)?;
        fs::rename(&tmp, &path).map_err(|source| StorageError::Io {
            path: path.clone(),
            source,
        })?;

        debug!("Wrote {} {} to {}", items.len(), collection.name(), path.display());
        Ok(())
    }
}

fn write_file(path: &Path, bytes: &[u8]) -> Result<()> {
    fs::write(path, bytes).map_err(|source| StorageError::Io {
        path: path.to_path_buf(),
        source,
    })
}

impl Storage for JsonFileStore {
    fn load_users(&self) -> Result<Vec<User>> {
        self.read_collection(Collection::Users)
    }

    fn save_users(&self, users: &[User]) -> Result<()> {
        self.write_collection(Collection::Users, users)
    }

    fn load_messages(&self) -> Result<Vec<Message>> {
        self.read_collection(Collection::Messages)
    }

    fn save_messages(&self, messages: &[Message]) -> Result<()> {
        self.write_collection(Collection::Messages, messages)
    }
}
