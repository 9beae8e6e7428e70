//! Persistence for batches that are not fully linked yet.
//!
//! A store keeps two things per slot: the batch itself, and a small metadata
//! record saying which strategies had already been applied and when. The
//! metadata lives in its own mapping that is only made durable by an explicit
//! [`UnlinkedDataStore::flush`].

pub mod fs;
pub mod in_memory;

pub use fs::FsUnlinkedStore;
pub use in_memory::InMemoryUnlinkedStore;

use chrono::Local;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::constants::UNLINKED_KIND_DATABASE;
use crate::types::Batch;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("slot already registered: {0}")]
    AlreadyRegistered(String),

    #[error("slot not registered: {0}")]
    NotRegistered(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Provenance written alongside an unlinked batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnlinkedMetadata {
    /// Strategies applied to the batch, in order
    #[serde(default)]
    pub strategies: Vec<String>,
    /// ISO-8601 modification time
    pub modified: String,
    /// Shape of the stored data
    pub kind: String,
    /// Same steps as `strategies`, with bound arguments, e.g.
    /// `migrate_exchanges(unit-aliases)`
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub applied: Vec<String>,
}

impl UnlinkedMetadata {
    pub fn now(strategies: Vec<String>) -> Self {
        Self {
            strategies,
            modified: Local::now().to_rfc3339(),
            kind: UNLINKED_KIND_DATABASE.to_string(),
            applied: Vec::new(),
        }
    }

    pub fn with_applied(mut self, applied: Vec<String>) -> Self {
        self.applied = applied;
        self
    }
}

/// A slot loaded back from a store
#[derive(Debug, Clone, PartialEq)]
pub struct UnlinkedSnapshot {
    pub metadata: UnlinkedMetadata,
    pub data: Batch,
}

/// Storage boundary for unlinked data
pub trait UnlinkedDataStore: Send + Sync {
    /// Whether `slot` has been registered
    fn contains(&self, slot: &str) -> bool;

    /// Register a new slot. Registering twice is an error the caller may
    /// choose to ignore.
    fn register(&self, slot: &str) -> StoreResult<()>;

    /// Assign the metadata record for a registered slot
    fn set_metadata(&self, slot: &str, metadata: UnlinkedMetadata) -> StoreResult<()>;

    fn metadata(&self, slot: &str) -> Option<UnlinkedMetadata>;

    /// Make metadata assignments durable
    fn flush(&self) -> StoreResult<()>;

    /// Persist the batch content for a registered slot
    fn write(&self, slot: &str, data: &Batch) -> StoreResult<()>;

    /// Load metadata and content of a slot, if both exist
    fn load(&self, slot: &str) -> StoreResult<Option<UnlinkedSnapshot>>;

    /// Registered slot names, sorted
    fn list(&self) -> Vec<String>;
}
