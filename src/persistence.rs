//! Snapshot persistence for WIPcoin
//!
//! A snapshot holds the whole node state: the chain, both pending pools and
//! the peer set. Every save rewrites it in full.

use crate::blockchain::{Block, Blockchain};
use crate::config::{DatabaseConfig, StorageBackend};
use crate::error::ChainError;
use crate::mempool::Mempool;
use crate::transaction::{Endorsement, Transfer};
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub chain: Vec<Block>,
    pub pending_transfers: Vec<Transfer>,
    pub pending_endorsements: Vec<Endorsement>,
    pub peers: BTreeSet<String>,
}

impl Snapshot {
    pub fn capture(chain: &Blockchain, peers: &BTreeSet<String>) -> Self {
        Snapshot {
            chain: chain.blocks.clone(),
            pending_transfers: chain.mempool.transfers().to_vec(),
            pending_endorsements: chain.mempool.endorsements().to_vec(),
            peers: peers.clone(),
        }
    }

    pub fn into_parts(self) -> (Blockchain, BTreeSet<String>) {
        let mempool = Mempool::from_records(self.pending_transfers, self.pending_endorsements);
        (Blockchain::from_parts(self.chain, mempool), self.peers)
    }
}

/// Abstraction for snapshot backends. A save replaces the previous snapshot
/// as a unit; a load returns `None` when nothing was ever saved.
pub trait Persistence: Send + Sync {
    fn save_snapshot(&self, snapshot: &Snapshot) -> Result<(), ChainError>;
    fn load_snapshot(&self) -> Result<Option<Snapshot>, ChainError>;
}

/// Opens the backend selected in `config`, creating the data directory when
/// a file-backed store is used.
pub fn open_store(config: &DatabaseConfig, node_id: &str) -> Result<Arc<dyn Persistence>, ChainError> {
    let store: Arc<dyn Persistence> = match config.backend {
        StorageBackend::Memory => Arc::new(InMemoryPersistence::new()),
        StorageBackend::Sqlite => {
            fs::create_dir_all(&config.path)?;
            let path = config.snapshot_path(node_id);
            let path = path.to_str().ok_or_else(|| {
                ChainError::ConfigError(format!("Database path is not valid UTF-8: {}", path.display()))
            })?;
            Arc::new(Database::open(path)?)
        }
        StorageBackend::Json => {
            fs::create_dir_all(&config.path)?;
            Arc::new(JsonFileStore::new(config.snapshot_path(node_id)))
        }
    };
    Ok(store)
}

const TRANSFER_KIND: &str = "transfer";
const ENDORSEMENT_KIND: &str = "endorsement";

/// SQLite-backed store.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    pub fn open(path: &str) -> Result<Self, ChainError> {
        let conn = Connection::open(path)
            .map_err(|e| ChainError::DatabaseError(format!("Failed to open database: {}", e)))?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS blocks (
                position INTEGER PRIMARY KEY,
                block_index INTEGER NOT NULL,
                previous_hash TEXT NOT NULL,
                proof INTEGER NOT NULL,
                timestamp INTEGER NOT NULL,
                transfers TEXT NOT NULL,
                endorsements TEXT NOT NULL
            )",
            [],
        )
        .map_err(|e| ChainError::DatabaseError(format!("Failed to create blocks table: {}", e)))?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS pending_records (
                position INTEGER PRIMARY KEY,
                kind TEXT NOT NULL,
                record TEXT NOT NULL
            )",
            [],
        )
        .map_err(|e| {
            ChainError::DatabaseError(format!("Failed to create pending_records table: {}", e))
        })?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS peers (
                address TEXT PRIMARY KEY
            )",
            [],
        )
        .map_err(|e| ChainError::DatabaseError(format!("Failed to create peers table: {}", e)))?;

        Ok(Database { conn: Mutex::new(conn) })
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>, ChainError> {
        self.conn
            .lock()
            .map_err(|_| ChainError::DatabaseError("Mutex poisoned".to_string()))
    }

    /// Rewrites all three tables inside a single SQL transaction.
    pub fn save_snapshot(&self, snapshot: &Snapshot) -> Result<(), ChainError> {
        let conn_guard = self.lock()?;
        let tx = conn_guard.unchecked_transaction().map_err(|e| {
            ChainError::DatabaseError(format!("Failed to start transaction: {}", e))
        })?;

        tx.execute("DELETE FROM blocks", [])
            .map_err(|e| ChainError::DatabaseError(format!("Failed to clear blocks: {}", e)))?;
        tx.execute("DELETE FROM pending_records", [])
            .map_err(|e| ChainError::DatabaseError(format!("Failed to clear pending_records: {}", e)))?;
        tx.execute("DELETE FROM peers", [])
            .map_err(|e| ChainError::DatabaseError(format!("Failed to clear peers: {}", e)))?;

        // Rows are keyed by chain position; a block's own index is not unique.
        for (position, block) in snapshot.chain.iter().enumerate() {
            tx.execute(
                "INSERT INTO blocks (position, block_index, previous_hash, proof, timestamp, transfers, endorsements)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    position as i64,
                    to_sql_int(block.index, "index")?,
                    block.previous_hash,
                    to_sql_int(block.proof, "proof")?,
                    to_sql_int(block.timestamp, "timestamp")?,
                    serde_json::to_string(&block.transfers)?,
                    serde_json::to_string(&block.endorsements)?,
                ],
            )
            .map_err(|e| ChainError::DatabaseError(format!("Failed to save block: {}", e)))?;
        }

        let transfers = snapshot
            .pending_transfers
            .iter()
            .map(|t| serde_json::to_string(t).map(|json| (TRANSFER_KIND, json)));
        let endorsements = snapshot
            .pending_endorsements
            .iter()
            .map(|e| serde_json::to_string(e).map(|json| (ENDORSEMENT_KIND, json)));
        for (position, record) in transfers.chain(endorsements).enumerate() {
            let (kind, json) = record?;
            tx.execute(
                "INSERT INTO pending_records (position, kind, record) VALUES (?1, ?2, ?3)",
                params![position as i64, kind, json],
            )
            .map_err(|e| ChainError::DatabaseError(format!("Failed to save pending record: {}", e)))?;
        }

        for address in &snapshot.peers {
            tx.execute("INSERT INTO peers (address) VALUES (?1)", params![address])
                .map_err(|e| ChainError::DatabaseError(format!("Failed to save peer: {}", e)))?;
        }

        tx.commit().map_err(|e| {
            ChainError::DatabaseError(format!("Failed to commit transaction: {}", e))
        })?;

        Ok(())
    }

    pub fn load_snapshot(&self) -> Result<Option<Snapshot>, ChainError> {
        let conn_guard = self.lock()?;

        let mut stmt = conn_guard
            .prepare(
                "SELECT block_index, previous_hash, proof, timestamp, transfers, endorsements
                 FROM blocks ORDER BY position ASC",
            )
            .map_err(|e| ChainError::DatabaseError(format!("Failed to prepare query: {}", e)))?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, i64>(2)?,
                    row.get::<_, i64>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, String>(5)?,
                ))
            })
            .map_err(|e| ChainError::DatabaseError(format!("Failed to query blocks: {}", e)))?;

        let mut chain = Vec::new();
        for row in rows {
            let (index, previous_hash, proof, timestamp, transfers, endorsements) =
                row.map_err(|e| ChainError::DatabaseError(format!("Failed to load block: {}", e)))?;
            chain.push(Block {
                index: index as u64,
                previous_hash,
                transfers: serde_json::from_str(&transfers)?,
                endorsements: serde_json::from_str(&endorsements)?,
                proof: proof as u64,
                timestamp: timestamp as u64,
            });
        }

        if chain.is_empty() {
            return Ok(None);
        }

        let mut snapshot = Snapshot {
            chain,
            ..Snapshot::default()
        };

        let mut stmt = conn_guard
            .prepare("SELECT kind, record FROM pending_records ORDER BY position ASC")
            .map_err(|e| ChainError::DatabaseError(format!("Failed to prepare query: {}", e)))?;
        let rows = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))
            .map_err(|e| ChainError::DatabaseError(format!("Failed to query pending records: {}", e)))?;
        for row in rows {
            let (kind, json) = row
                .map_err(|e| ChainError::DatabaseError(format!("Failed to load pending record: {}", e)))?;
            match kind.as_str() {
                TRANSFER_KIND => snapshot.pending_transfers.push(serde_json::from_str(&json)?),
                ENDORSEMENT_KIND => snapshot.pending_endorsements.push(serde_json::from_str(&json)?),
                other => {
                    return Err(ChainError::DatabaseError(format!(
                        "Unknown pending record kind: {}",
                        other
                    )))
                }
            }
        }

        let mut stmt = conn_guard
            .prepare("SELECT address FROM peers")
            .map_err(|e| ChainError::DatabaseError(format!("Failed to prepare query: {}", e)))?;
        let rows = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .map_err(|e| ChainError::DatabaseError(format!("Failed to query peers: {}", e)))?;
        for row in rows {
            snapshot
                .peers
                .insert(row.map_err(|e| ChainError::DatabaseError(format!("Failed to load peer: {}", e)))?);
        }

        Ok(Some(snapshot))
    }
}

fn to_sql_int(value: u64, field: &str) -> Result<i64, ChainError> {
    i64::try_from(value)
        .map_err(|_| ChainError::DatabaseError(format!("Block {} {} does not fit in SQLite", field, value)))
}

impl Persistence for Database {
    fn save_snapshot(&self, snapshot: &Snapshot) -> Result<(), ChainError> {
        Database::save_snapshot(self, snapshot)
    }

    fn load_snapshot(&self) -> Result<Option<Snapshot>, ChainError> {
        Database::load_snapshot(self)
    }
}

/// Plain-text store: four JSON lines holding the chain, pending transfers,
/// pending endorsements and peers, in that order.
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        JsonFileStore { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Persistence for JsonFileStore {
    fn save_snapshot(&self, snapshot: &Snapshot) -> Result<(), ChainError> {
        let contents = [
            serde_json::to_string(&snapshot.chain)?,
            serde_json::to_string(&snapshot.pending_transfers)?,
            serde_json::to_string(&snapshot.pending_endorsements)?,
            serde_json::to_string(&snapshot.peers)?,
        ]
        .join("\n");

        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let mut temp = tempfile::NamedTempFile::new_in(dir)?;
        temp.write_all(contents.as_bytes())?;
        temp.as_file().sync_all()?;
        temp.persist(&self.path).map_err(|e| ChainError::IoError(e.error.to_string()))?;
        Ok(())
    }

    fn load_snapshot(&self) -> Result<Option<Snapshot>, ChainError> {
        if !self.path.exists() {
            return Ok(None);
        }
        let contents = fs::read_to_string(&self.path)?;
        let lines: Vec<&str> = contents.lines().collect();
        let [chain, transfers, endorsements, peers] = lines.as_slice() else {
            return Err(ChainError::SerializationError(format!(
                "Expected 4 snapshot lines in {}, found {}",
                self.path.display(),
                lines.len()
            )));
        };

        Ok(Some(Snapshot {
            chain: serde_json::from_str(chain)?,
            pending_transfers: serde_json::from_str(transfers)?,
            pending_endorsements: serde_json::from_str(endorsements)?,
            peers: serde_json::from_str(peers)?,
        }))
    }
}

/// Simple in-memory persistence implementation useful for tests and ephemeral runs.
#[derive(Clone, Default)]
pub struct InMemoryPersistence {
    snapshot: Arc<parking_lot::Mutex<Option<Snapshot>>>,
}

impl InMemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Persistence for InMemoryPersistence {
    fn save_snapshot(&self, snapshot: &Snapshot) -> Result<(), ChainError> {
        *self.snapshot.lock() = Some(snapshot.clone());
        Ok(())
    }

    fn load_snapshot(&self) -> Result<Option<Snapshot>, ChainError> {
        Ok(self.snapshot.lock().clone())
    }
}
