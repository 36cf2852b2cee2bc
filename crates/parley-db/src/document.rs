use std::path::Path;
use std::sync::Mutex;

use parley_types::models::{Message, User};
use rusqlite::Connection;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, info};

use crate::{Collection, Result, Storage, StorageError, migrations};

/// Embedded document store: named collections of JSON documents kept in a
/// single SQLite file.
///
/// Saving a collection deletes every document in it and inserts the new
/// snapshot inside one transaction.
pub struct DocumentStore {
    conn: Mutex<Connection>,
}

impl DocumentStore {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| StorageError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        migrations::run(&conn)?;

        info!("Document store opened at {}", path.display());
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T>,
    {
        let mut conn = self.conn.lock().map_err(|_| StorageError::LockPoisoned)?;
        f(&mut conn)
    }

    fn find_all<T: DeserializeOwned>(&self, collection: Collection) -> Result<Vec<T>> {
        let bodies = self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT body FROM documents WHERE collection = ?1 ORDER BY position",
            )?;
            let bodies = stmt
                .query_map([collection.name()], |row| row.get::<_, String>(0))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(bodies)
        })?;

        bodies
            .iter()
            .map(|body| {
                serde_json::from_str(body).map_err(|source| StorageError::Document {
                    collection: collection.name(),
                    source,
                })
            })
            .collect()
    }

    fn replace_all<T: Serialize>(&self, collection: Collection, items: &[T]) -> Result<()> {
        let bodies = items
            .iter()
            .map(|item| {
                serde_json::to_string(item).map_err(|source| StorageError::Document {
                    collection: collection.name(),
                    source,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        self.with_conn(|conn| {
            let tx = conn.transaction()?;
            tx.execute("DELETE FROM documents WHERE collection = ?1", [collection.name()])?;
            {
                let mut insert = tx.prepare(
                    "INSERT INTO documents (collection, position, body) VALUES (?1, ?2, ?3)",
                )?;
                for (position, body) in bodies.iter().enumerate() {
                    insert.execute(rusqlite::params![collection.name(), position as i64, body])?;
                }
            }
            tx.commit()?;
            Ok(())
        })?;

        debug!("Replaced {} collection with {} documents", collection.name(), items.len());
        Ok(())
    }
}

impl Storage for DocumentStore {
    fn load_users(&self) -> Result<Vec<User>> {
        self.find_all(Collection::Users)
    }

    fn save_users(&self, users: &[User]) -> Result<()> {
        self.replace_all(Collection::Users, users)
    }

    fn load_messages(&self) -> Result<Vec<Message>> {
        self.find_all(Collection::Messages)
    }

    fn save_messages(&self, messages: &[Message]) -> Result<()> {
        self.replace_all(Collection::Messages, messages)
    }
}
