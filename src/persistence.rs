//! Durable storage for the ledger.
//!
//! The whole chain is written as one snapshot document on every commit and
//! read back in one piece at startup. A missing record and a record that
//! fails to parse are reported differently: the first yields `Ok(None)`, the
//! second [`LedgerError::LoadCorruption`].

use crate::blockchain::HashedBlock;
use crate::config::{StorageBackend, StorageConfig};
use crate::error::{LedgerError, Result};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Abstraction for persistence backends. `save_chain` must replace the prior
/// snapshot atomically: a reader sees the old document or the new one, never
/// a partial write.
pub trait Persistence: Send + Sync {
    fn load_chain(&self) -> Result<Option<Vec<HashedBlock>>>;
    fn save_chain(&self, chain: &[HashedBlock]) -> Result<()>;
    /// Human-readable location, for logs.
    fn describe(&self) -> String;
}

/// Snapshot as written. Aggregates are stored for outside inspection only
/// and are never trusted on load.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SnapshotRef<'a> {
    chain: &'a [HashedBlock],
    last_updated: DateTime<Utc>,
    total_blocks: usize,
    total_transactions: usize,
}

impl<'a> SnapshotRef<'a> {
    fn new(chain: &'a [HashedBlock]) -> Self {
        Self {
            chain,
            last_updated: Utc::now(),
            total_blocks: chain.len(),
            total_transactions: chain.iter().map(|b| b.transactions.len()).sum(),
        }
    }
}

/// Snapshot as read back.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainDocument {
    pub chain: Vec<HashedBlock>,
    pub last_updated: DateTime<Utc>,
    pub total_blocks: usize,
    pub total_transactions: usize,
}

fn parse_document(raw: &str, origin: &str) -> Result<Vec<HashedBlock>> {
    let doc: ChainDocument = serde_json::from_str(raw)
        .map_err(|e| LedgerError::LoadCorruption(format!("{}: {}", origin, e)))?;

    if doc.chain.is_empty() {
        return Err(LedgerError::LoadCorruption(format!(
            "{}: document holds no blocks",
            origin
        )));
    }
    if doc.total_blocks != doc.chain.len() {
        tracing::warn!(
            origin,
            recorded = doc.total_blocks,
            actual = doc.chain.len(),
            "persistence.block_count_mismatch"
        );
    }
    Ok(doc.chain)
}

fn render_document(snapshot: &SnapshotRef<'_>) -> Result<String> {
    serde_json::to_string_pretty(snapshot)
        .map_err(|e| LedgerError::PersistenceFailure(format!("Failed to serialize chain: {}", e)))
}

/// Open the backend named by `config`.
pub fn open_store(config: &StorageConfig) -> Result<Box<dyn Persistence>> {
    match config.backend {
        StorageBackend::Json => Ok(Box::new(JsonFileStore::new(&config.path))),
        StorageBackend::Sqlite => Ok(Box::new(Database::open(&config.path)?)),
    }
}

// ============================================================================
// JSON file
// ============================================================================

/// One pretty-printed JSON document on disk. Writes go to a sibling temp
/// file that is fsynced and then renamed over the target.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn parent_dir(&self) -> PathBuf {
        match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        }
    }
}

impl Persistence for JsonFileStore {
    fn load_chain(&self) -> Result<Option<Vec<HashedBlock>>> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        parse_document(&raw, &self.describe()).map(Some)
    }

    fn save_chain(&self, chain: &[HashedBlock]) -> Result<()> {
        let failure = |what: &str, e: &dyn std::fmt::Display| {
            LedgerError::PersistenceFailure(format!("{} {}: {}", what, self.path.display(), e))
        };

        let document = render_document(&SnapshotRef::new(chain))?;
        let dir = self.parent_dir();
        fs::create_dir_all(&dir).map_err(|e| failure("Failed to create directory for", &e))?;

        let tmp = tempfile::NamedTempFile::new_in(&dir)
            .map_err(|e| failure("Failed to create temp file for", &e))?;
        {
            let mut writer = BufWriter::new(tmp.as_file());
            writer
                .write_all(document.as_bytes())
                .and_then(|_| writer.flush())
                .map_err(|e| failure("Failed to write", &e))?;
        }
        tmp.as_file()
            .sync_all()
            .map_err(|e| failure("Failed to sync", &e))?;
        tmp.persist(&self.path)
            .map_err(|e| failure("Failed to replace", &e.error))?;

        Ok(())
    }

    fn describe(&self) -> String {
        format!("json:{}", self.path.display())
    }
}

// ============================================================================
// SQLite
// ============================================================================

/// SQLite-backed store keeping the snapshot in a single row.
pub struct Database {
    conn: Mutex<Connection>,
    location: String,
}

impl Database {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path).map_err(|e| {
            LedgerError::PersistenceFailure(format!("Failed to open database: {}", e))
        })?;
        Self::init(conn, path.display().to_string())
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|e| {
            LedgerError::PersistenceFailure(format!("Failed to open database: {}", e))
        })?;
        Self::init(conn, ":memory:".to_string())
    }

    fn init(conn: Connection, location: String) -> Result<Self> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS ledger_snapshot (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                document TEXT NOT NULL,
                last_updated TEXT NOT NULL,
                total_blocks INTEGER NOT NULL,
                total_transactions INTEGER NOT NULL
            )",
            [],
        )
        .map_err(|e| {
            LedgerError::PersistenceFailure(format!(
                "Failed to create ledger_snapshot table: {}",
                e
            ))
        })?;

        Ok(Database {
            conn: Mutex::new(conn),
            location,
        })
    }
}

impl Persistence for Database {
    fn load_chain(&self) -> Result<Option<Vec<HashedBlock>>> {
        let conn = self.conn.lock();
        let raw: Option<String> = conn
            .query_row(
                "SELECT document FROM ledger_snapshot WHERE id = 1",
                [],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| LedgerError::LoadCorruption(format!("Failed to read snapshot: {}", e)))?;

        match raw {
            Some(raw) => parse_document(&raw, &self.describe()).map(Some),
            None => Ok(None),
        }
    }

    fn save_chain(&self, chain: &[HashedBlock]) -> Result<()> {
        let snapshot = SnapshotRef::new(chain);
        let document = render_document(&snapshot)?;

        let conn = self.conn.lock();
        let tx = conn.unchecked_transaction().map_err(|e| {
            LedgerError::PersistenceFailure(format!("Failed to start transaction: {}", e))
        })?;

        tx.execute(
            "INSERT OR REPLACE INTO ledger_snapshot
                (id, document, last_updated, total_blocks, total_transactions)
             VALUES (1, ?1, ?2, ?3, ?4)",
            params![
                document,
                snapshot.last_updated.to_rfc3339(),
                snapshot.total_blocks as i64,
                snapshot.total_transactions as i64,
            ],
        )
        .map_err(|e| LedgerError::PersistenceFailure(format!("Failed to save snapshot: {}", e)))?;

        tx.commit().map_err(|e| {
            LedgerError::PersistenceFailure(format!("Failed to commit transaction: {}", e))
        })?;

        Ok(())
    }

    fn describe(&self) -> String {
        format!("sqlite:{}", self.location)
    }
}

// ============================================================================
// In-memory
// ============================================================================

/// Simple in-memory persistence useful for tests and ephemeral runs. Holds
/// the serialized document so loads go through the same parser as disk.
#[derive(Clone, Default)]
pub struct InMemoryPersistence {
    document: Arc<Mutex<Option<String>>>,
}

impl InMemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }

    /// The stored document, as last written.
    pub fn document(&self) -> Option<String> {
        self.document.lock().clone()
    }

    /// Overwrite the stored document verbatim.
    pub fn replace_document(&self, raw: impl Into<String>) {
        *self.document.lock() = Some(raw.into());
    }
}

impl Persistence for InMemoryPersistence {
    fn load_chain(&self) -> Result<Option<Vec<HashedBlock>>> {
        match self.document.lock().as_deref() {
            Some(raw) => parse_document(raw, "memory").map(Some),
            None => Ok(None),
        }
    }

    fn save_chain(&self, chain: &[HashedBlock]) -> Result<()> {
        let document = render_document(&SnapshotRef::new(chain))?;
        *self.document.lock() = Some(document);
        Ok(())
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}
