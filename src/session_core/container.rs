//! SQLite session container
//!
//! One database file per recording session. Namespaces are rows in the
//! `namespaces` table; each named array lives in `arrays` as a little-endian
//! f64 BLOB with a JSON-encoded shape column. Raw recording data and derived
//! stage outputs share the same tables, distinguished by the `kind` column.

use super::error::ContainerError;
use super::types::Array;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};

/// Namespace kind: raw recording data seeded at ingest, or a stage's outputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NamespaceKind {
    Raw,
    Stage,
}

impl NamespaceKind {
    fn as_str(&self) -> &'static str {
        match self {
            NamespaceKind::Raw => "raw",
            NamespaceKind::Stage => "stage",
        }
    }
}

/// Persistent session container over one SQLite database.
pub struct Container {
    conn: Connection,
    path: Option<PathBuf>,
}

impl Container {
    /// Open (or create) a container at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, ContainerError> {
        let conn = Connection::open(path.as_ref())?;
        let container = Self {
            conn,
            path: Some(path.as_ref().to_path_buf()),
        };
        container.init_schema()?;
        Ok(container)
    }

    /// Open an in-memory container (tests, throwaway sessions).
    pub fn open_in_memory() -> Result<Self, ContainerError> {
        let conn = Connection::open_in_memory()?;
        let container = Self { conn, path: None };
        container.init_schema()?;
        Ok(container)
    }

    fn init_schema(&self) -> Result<(), ContainerError> {
        self.conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS namespaces (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT UNIQUE NOT NULL,
                kind TEXT NOT NULL,
                description TEXT NOT NULL,
                created_at INTEGER NOT NULL
            );
            CREATE TABLE IF NOT EXISTS arrays (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                namespace_id INTEGER NOT NULL REFERENCES namespaces(id),
                key TEXT NOT NULL,
                unit TEXT NOT NULL,
                shape TEXT NOT NULL,
                data BLOB NOT NULL,
                UNIQUE(namespace_id, key)
            );",
        )?;
        Ok(())
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Names of all namespaces of the given kind, ordered by creation.
    pub fn namespace_names(&self, kind: NamespaceKind) -> Result<Vec<String>, ContainerError> {
        let mut stmt = self
            .conn
            .prepare("SELECT name FROM namespaces WHERE kind = ?1 ORDER BY id ASC")?;
        let names = stmt
            .query_map([kind.as_str()], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(names)
    }

    pub fn has_namespace(&self, name: &str) -> Result<bool, ContainerError> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM namespaces WHERE name = ?1",
            [name],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// Create a namespace and write all of its arrays in one transaction.
    ///
    /// Either the namespace registers with every entry present, or the
    /// transaction rolls back and the container is unchanged. This is the
    /// no-partial-namespace invariant the session relies on.
    pub fn write_namespace(
        &mut self,
        name: &str,
        kind: NamespaceKind,
        description: &str,
        entries: &[(String, String, Array)],
    ) -> Result<(), ContainerError> {
        if self.has_namespace(name)? {
            return Err(ContainerError::NamespaceExists(name.to_string()));
        }

        let tx = self.conn.transaction()?;
        tx.execute(
            "INSERT INTO namespaces (name, kind, description, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![
                name,
                kind.as_str(),
                description,
                chrono::Utc::now().timestamp()
            ],
        )?;
        let namespace_id = tx.last_insert_rowid();

        for (key, unit, array) in entries {
            let shape_json = serde_json::to_string(array.shape())
                .map_err(|e| ContainerError::Io(std::io::Error::other(e)))?;
            let blob = encode_samples(array.data());
            tx.execute(
                "INSERT INTO arrays (namespace_id, key, unit, shape, data)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![namespace_id, key, unit, shape_json, blob],
            )?;
        }

        tx.commit()?;
        log::debug!(
            "Wrote namespace '{}' ({} arrays, kind: {})",
            name,
            entries.len(),
            kind.as_str()
        );
        Ok(())
    }

    /// Read one array back by namespace and key.
    pub fn read_array(&self, namespace: &str, key: &str) -> Result<Array, ContainerError> {
        let namespace_id = self.namespace_id(namespace)?;

        let row: Option<(String, Vec<u8>)> = self
            .conn
            .query_row(
                "SELECT shape, data FROM arrays WHERE namespace_id = ?1 AND key = ?2",
                params![namespace_id, key],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        let (shape_json, blob) = match row {
            Some(r) => r,
            None => {
                return Err(ContainerError::KeyNotFound {
                    namespace: namespace.to_string(),
                    key: key.to_string(),
                    available: self.keys(namespace)?,
                })
            }
        };

        let shape: Vec<usize> = serde_json::from_str(&shape_json)
            .map_err(|e| ContainerError::Io(std::io::Error::other(e)))?;
        let data = decode_samples(&blob);
        Ok(Array::from_parts(shape, data)?)
    }

    /// Keys present in a namespace, ordered by insertion.
    pub fn keys(&self, namespace: &str) -> Result<Vec<String>, ContainerError> {
        let namespace_id = self.namespace_id(namespace)?;
        let mut stmt = self
            .conn
            .prepare("SELECT key FROM arrays WHERE namespace_id = ?1 ORDER BY id ASC")?;
        let keys = stmt
            .query_map([namespace_id], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(keys)
    }

    /// Export the full container to a new path (checkpoint/save).
    ///
    /// The target must not already exist; callers that intend to overwrite
    /// remove the stale file first.
    pub fn export(&self, path: impl AsRef<Path>) -> Result<(), ContainerError> {
        let target = path.as_ref();
        if target.exists() {
            return Err(ContainerError::Io(std::io::Error::new(
                std::io::ErrorKind::AlreadyExists,
                format!("export target already exists: {}", target.display()),
            )));
        }
        let target_str = target.to_string_lossy().into_owned();
        self.conn.execute("VACUUM INTO ?1", [target_str])?;
        log::debug!("Exported container to {}", target.display());
        Ok(())
    }

    fn namespace_id(&self, name: &str) -> Result<i64, ContainerError> {
        self.conn
            .query_row(
                "SELECT id FROM namespaces WHERE name = ?1",
                [name],
                |row| row.get(0),
            )
            .optional()?
            .ok_or_else(|| ContainerError::NamespaceNotFound(name.to_string()))
    }
}

fn encode_samples(data: &[f64]) -> Vec<u8> {
    let mut blob = Vec::with_capacity(data.len() * 8);
    for value in data {
        blob.extend_from_slice(&value.to_le_bytes());
    }
    blob
}

fn decode_samples(blob: &[u8]) -> Vec<f64> {
    blob.chunks_exact(8)
        .map(|chunk| {
            let mut bytes = [0u8; 8];
            bytes.copy_from_slice(chunk);
            f64::from_le_bytes(bytes)
        })
        .collect()
}
