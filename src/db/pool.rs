//! Process-wide registry of named databases, lazily loaded on first use.
//!
//! The pool and the journal handles it hands out are owned, explicitly
//! lifecycled state: constructed at startup, dropped at shutdown, never
//! reached through globals.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use tracing::info;

use crate::db::Database;
use crate::error::{Result, StoreError};

/// Pool-wide settings fixed at process start.
#[derive(Clone, Debug)]
pub struct PoolConfig {
    /// Directory holding one journal file per database.
    pub data_dir: PathBuf,
    /// Suppress all journal appends (existing journals still replay).
    pub volatile: bool,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("."),
            volatile: false,
        }
    }
}

impl PoolConfig {
    /// Journal file path for `name`.
    pub fn journal_path(&self, name: &str) -> PathBuf {
        self.data_dir.join(format!("jrnl_{name}.txt"))
    }
}

/// Whether `use_database` loaded the database or found it resident.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum UseOutcome {
    /// First reference: the journal was just replayed.
    FirstLoad,
    /// Already loaded by an earlier reference.
    Available,
}

impl UseOutcome {
    /// Wire code for the `USE` response.
    pub fn code(self) -> i64 {
        match self {
            UseOutcome::FirstLoad => 0,
            UseOutcome::Available => 1,
        }
    }
}

/// Shared handle to one database, locked per dispatched command.
pub type DatabaseHandle = Arc<Mutex<Database>>;

/// Registry of loaded databases.
#[derive(Debug)]
pub struct DatabasePool {
    config: PoolConfig,
    databases: Mutex<FxHashMap<String, DatabaseHandle>>,
}

impl DatabasePool {
    /// An empty pool over `config`.
    pub fn new(config: PoolConfig) -> Self {
        Self {
            config,
            databases: Mutex::new(FxHashMap::default()),
        }
    }

    /// The pool's settings.
    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Resolve `name`, loading it on first reference. The full journal
    /// replay runs while the pool lock is held, so first use of a large
    /// database stalls concurrent `use` calls.
    pub fn use_database(&self, name: &str) -> Result<(DatabaseHandle, UseOutcome)> {
        if !is_canonical_name(name) {
            return Err(StoreError::IllegalName(name.to_string()));
        }
        let mut databases = self.databases.lock();
        if let Some(handle) = databases.get(name) {
            return Ok((Arc::clone(handle), UseOutcome::Available));
        }
        let (database, stats) = Database::open(name, &self.config)?;
        info!(
            name,
            records = stats.records,
            nodes = stats.nodes,
            edges = stats.edges,
            "loaded database"
        );
        let handle = Arc::new(Mutex::new(database));
        databases.insert(name.to_string(), Arc::clone(&handle));
        Ok((handle, UseOutcome::FirstLoad))
    }

    /// Names of currently loaded databases, sorted.
    pub fn list_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.databases.lock().keys().cloned().collect();
        names.sort();
        names
    }
}

/// Database names may hold only alphanumerics and underscores.
fn is_canonical_name(name: &str) -> bool {
    name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Convenience constructor rooted at `data_dir`.
pub fn pool_at(data_dir: impl AsRef<Path>, volatile: bool) -> DatabasePool {
    DatabasePool::new(PoolConfig {
        data_dir: data_dir.as_ref().to_path_buf(),
        volatile,
    })
}
