//! Persisted host-component records and the store backends for Lifeline.
//!
//! This crate provides the storage side of the persistence bridge: the
//! record types mirrored from a running host component (current-state record,
//! desired-state record, and per-config-type mapping records), the
//! `ComponentStore` trait the engine writes through, an in-memory
//! `MemoryStore`, and a file-backed `FileStore` with checksummed atomic writes
//! laid out by `StoreLayout`.

pub mod file;
pub mod layout;
pub mod memory;
pub mod records;

pub use file::FileStore;
pub use layout::{StoreLayout, STORE_FORMAT_VERSION};
pub use memory::MemoryStore;
pub use records::{
    ConfigMappingRecord, HostComponentDesiredStateRecord, HostComponentKey,
    HostComponentStateRecord, MappingKind,
};

use std::path::Path;
use thiserror::Error;

/// Fsync a directory to ensure that a preceding `rename()` is durable.
///
/// On Linux with ext4 `data=ordered` (the default), renames are usually
/// durable without an explicit dir fsync, but POSIX does not guarantee this.
pub(crate) fn fsync_dir(dir: &Path) -> Result<(), std::io::Error> {
    let f = std::fs::File::open(dir)?;
    f.sync_all()
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("integrity check failed for record '{id}': expected {expected}, got {actual}")]
    IntegrityFailure {
        id: String,
        expected: String,
        actual: String,
    },
    #[error("record not found: {0}")]
    NotFound(String),
    #[error("record already exists: {0}")]
    AlreadyExists(String),
    #[error("store format version mismatch: expected {expected}, found {found}")]
    VersionMismatch { expected: u32, found: u32 },
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Opaque keyed store for host-component records.
///
/// `create` fails when the record exists, `merge` inserts or replaces,
/// `remove` is idempotent, and `refresh` re-reads a record that must exist.
pub trait ComponentStore: Send + Sync {
    fn create_state(&self, record: &HostComponentStateRecord) -> Result<(), StoreError>;

    fn merge_state(&self, record: &HostComponentStateRecord) -> Result<(), StoreError>;

    fn find_state(
        &self,
        key: &HostComponentKey,
    ) -> Result<Option<HostComponentStateRecord>, StoreError>;

    fn remove_state(&self, key: &HostComponentKey) -> Result<(), StoreError>;

    fn refresh_state(&self, key: &HostComponentKey) -> Result<HostComponentStateRecord, StoreError> {
        self.find_state(key)?
            .ok_or_else(|| StoreError::NotFound(format!("state record {key}")))
    }

    /// Every current-state record of a cluster, ordered by key.
    fn list_states(&self, cluster_id: i64) -> Result<Vec<HostComponentStateRecord>, StoreError>;

    fn create_desired(&self, record: &HostComponentDesiredStateRecord) -> Result<(), StoreError>;

    fn merge_desired(&self, record: &HostComponentDesiredStateRecord) -> Result<(), StoreError>;

    fn find_desired(
        &self,
        key: &HostComponentKey,
    ) -> Result<Option<HostComponentDesiredStateRecord>, StoreError>;

    fn remove_desired(&self, key: &HostComponentKey) -> Result<(), StoreError>;

    fn refresh_desired(
        &self,
        key: &HostComponentKey,
    ) -> Result<HostComponentDesiredStateRecord, StoreError> {
        self.find_desired(key)?
            .ok_or_else(|| StoreError::NotFound(format!("desired state record {key}")))
    }

    fn create_mapping(
        &self,
        kind: MappingKind,
        record: &ConfigMappingRecord,
    ) -> Result<(), StoreError>;

    fn merge_mapping(&self, kind: MappingKind, record: &ConfigMappingRecord)
        -> Result<(), StoreError>;

    /// Every mapping of a host component, ordered by config type.
    fn find_mappings(
        &self,
        kind: MappingKind,
        key: &HostComponentKey,
    ) -> Result<Vec<ConfigMappingRecord>, StoreError>;

    fn remove_mapping(
        &self,
        kind: MappingKind,
        key: &HostComponentKey,
        config_type: &str,
    ) -> Result<(), StoreError>;

    fn remove_mappings_by_type(
        &self,
        kind: MappingKind,
        key: &HostComponentKey,
        config_types: &[String],
    ) -> Result<(), StoreError> {
        for config_type in config_types {
            self.remove_mapping(kind, key, config_type)?;
        }
        Ok(())
    }
}
