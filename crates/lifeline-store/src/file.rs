use crate::layout::StoreLayout;
use crate::records::{
    ConfigMappingRecord, HostComponentDesiredStateRecord, HostComponentKey,
    HostComponentStateRecord, MappingKind,
};
use crate::{fsync_dir, ComponentStore, StoreError};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// On-disk wrapper: the record plus a blake3 checksum over its JSON form.
#[derive(Serialize, Deserialize)]
struct Envelope<T> {
    /// `None` for records written by hand or by older tooling.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    checksum: Option<String>,
    record: T,
}

fn compute_checksum<T: Serialize>(record: &T) -> Result<String, StoreError> {
    let json = serde_json::to_string(record)?;
    Ok(blake3::hash(json.as_bytes()).to_hex().to_string())
}

/// All mappings of one host component in one table.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct MappingFile {
    key: HostComponentKey,
    entries: BTreeMap<String, ConfigMappingRecord>,
}

/// File-backed store: one checksummed JSON file per record, written atomically.
///
/// Files are named by [`HostComponentKey::storage_id`]. Writers inside this
/// process are serialized by an internal mutex; cross-process exclusion is the
/// caller's job (see the store lock in the core crate).
pub struct FileStore {
    layout: StoreLayout,
    write_guard: Mutex<()>,
}

impl FileStore {
    pub fn new(layout: StoreLayout) -> Self {
        Self {
            layout,
            write_guard: Mutex::new(()),
        }
    }

    /// Initialize (or verify) the layout under `root` and open a store on it.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let layout = StoreLayout::new(root);
        layout.initialize()?;
        Ok(Self::new(layout))
    }

    pub fn layout(&self) -> &StoreLayout {
        &self.layout
    }

    fn put<T: Serialize>(&self, dir: &Path, id: &str, record: &T) -> Result<(), StoreError> {
        let envelope = Envelope {
            checksum: Some(compute_checksum(record)?),
            record,
        };
        let content = serde_json::to_string_pretty(&envelope)?;

        let mut tmp = NamedTempFile::new_in(dir)?;
        tmp.write_all(content.as_bytes())?;
        tmp.as_file().sync_all()?;
        tmp.persist(dir.join(id)).map_err(|e| StoreError::Io(e.error))?;
        fsync_dir(dir)?;
        Ok(())
    }

    fn get<T: Serialize + DeserializeOwned>(
        &self,
        dir: &Path,
        id: &str,
    ) -> Result<Option<T>, StoreError> {
        let path = dir.join(id);
        if !path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(&path)?;
        let envelope: Envelope<T> = serde_json::from_str(&content)?;

        if let Some(ref expected) = envelope.checksum {
            let actual = compute_checksum(&envelope.record)?;
            if actual != *expected {
                return Err(StoreError::IntegrityFailure {
                    id: id.to_owned(),
                    expected: expected.clone(),
                    actual,
                });
            }
        }
        Ok(Some(envelope.record))
    }

    fn delete(&self, dir: &Path, id: &str) -> Result<(), StoreError> {
        let path = dir.join(id);
        if path.exists() {
            fs::remove_file(path)?;
            fsync_dir(dir)?;
        }
        Ok(())
    }

    fn read_mappings(
        &self,
        kind: MappingKind,
        key: &HostComponentKey,
    ) -> Result<BTreeMap<String, ConfigMappingRecord>, StoreError> {
        let file: Option<MappingFile> =
            self.get(&self.layout.mappings_dir(kind), &key.storage_id())?;
        Ok(file.map(|f| f.entries).unwrap_or_default())
    }

    fn write_mappings(
        &self,
        kind: MappingKind,
        key: &HostComponentKey,
        entries: BTreeMap<String, ConfigMappingRecord>,
    ) -> Result<(), StoreError> {
        let dir = self.layout.mappings_dir(kind);
        let id = key.storage_id();
        if entries.is_empty() {
            return self.delete(&dir, &id);
        }
        let file = MappingFile {
            key: key.clone(),
            entries,
        };
        self.put(&dir, &id, &file)
    }
}

impl ComponentStore for FileStore {
    fn create_state(&self, record: &HostComponentStateRecord) -> Result<(), StoreError> {
        let _guard = self.write_guard.lock();
        let dir = self.layout.state_dir();
        let id = record.key.storage_id();
        if dir.join(&id).exists() {
            return Err(StoreError::AlreadyExists(format!(
                "state record {}",
                record.key
            )));
        }
        self.put(&dir, &id, record)
    }

    fn merge_state(&self, record: &HostComponentStateRecord) -> Result<(), StoreError> {
        let _guard = self.write_guard.lock();
        self.put(&self.layout.state_dir(), &record.key.storage_id(), record)
    }

    fn find_state(
        &self,
        key: &HostComponentKey,
    ) -> Result<Option<HostComponentStateRecord>, StoreError> {
        self.get(&self.layout.state_dir(), &key.storage_id())
    }

    fn remove_state(&self, key: &HostComponentKey) -> Result<(), StoreError> {
        let _guard = self.write_guard.lock();
        self.delete(&self.layout.state_dir(), &key.storage_id())
    }

    fn list_states(&self, cluster_id: i64) -> Result<Vec<HostComponentStateRecord>, StoreError> {
        let dir = self.layout.state_dir();
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let mut results = Vec::new();
        for entry in fs::read_dir(&dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let name = entry.file_name();
            let name_str = name.to_str().unwrap_or("");
            // tempfile leftovers start with a dot
            if name_str.is_empty() || name_str.starts_with('.') {
                continue;
            }
            match self.get::<HostComponentStateRecord>(&dir, name_str) {
                Ok(Some(record)) if record.key.cluster_id == cluster_id => results.push(record),
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!("skipping corrupted state record '{name_str}': {e}");
                }
            }
        }
        results.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(results)
    }

    fn create_desired(&self, record: &HostComponentDesiredStateRecord) -> Result<(), StoreError> {
        let _guard = self.write_guard.lock();
        let dir = self.layout.desired_dir();
        let id = record.key.storage_id();
        if dir.join(&id).exists() {
            return Err(StoreError::AlreadyExists(format!(
                "desired state record {}",
                record.key
            )));
        }
        self.put(&dir, &id, record)
    }

    fn merge_desired(&self, record: &HostComponentDesiredStateRecord) -> Result<(), StoreError> {
        let _guard = self.write_guard.lock();
        self.put(&self.layout.desired_dir(), &record.key.storage_id(), record)
    }

    fn find_desired(
        &self,
        key: &HostComponentKey,
    ) -> Result<Option<HostComponentDesiredStateRecord>, StoreError> {
        self.get(&self.layout.desired_dir(), &key.storage_id())
    }

    fn remove_desired(&self, key: &HostComponentKey) -> Result<(), StoreError> {
        let _guard = self.write_guard.lock();
        self.delete(&self.layout.desired_dir(), &key.storage_id())
    }

    fn create_mapping(
        &self,
        kind: MappingKind,
        record: &ConfigMappingRecord,
    ) -> Result<(), StoreError> {
        let _guard = self.write_guard.lock();
        let mut entries = self.read_mappings(kind, &record.key)?;
        if entries.contains_key(&record.config_type) {
            return Err(StoreError::AlreadyExists(format!(
                "{kind} config mapping '{}' of {}",
                record.config_type, record.key
            )));
        }
        entries.insert(record.config_type.clone(), record.clone());
        self.write_mappings(kind, &record.key, entries)
    }

    fn merge_mapping(
        &self,
        kind: MappingKind,
        record: &ConfigMappingRecord,
    ) -> Result<(), StoreError> {
        let _guard = self.write_guard.lock();
        let mut entries = self.read_mappings(kind, &record.key)?;
        entries.insert(record.config_type.clone(), record.clone());
        self.write_mappings(kind, &record.key, entries)
    }

    fn find_mappings(
        &self,
        kind: MappingKind,
        key: &HostComponentKey,
    ) -> Result<Vec<ConfigMappingRecord>, StoreError> {
        Ok(self.read_mappings(kind, key)?.into_values().collect())
    }

    fn remove_mapping(
        &self,
        kind: MappingKind,
        key: &HostComponentKey,
        config_type: &str,
    ) -> Result<(), StoreError> {
        let _guard = self.write_guard.lock();
        let mut entries = self.read_mappings(kind, key)?;
        if entries.remove(config_type).is_none() {
            return Ok(());
        }
        self.write_mappings(kind, key, entries)
    }

    fn remove_mappings_by_type(
        &self,
        kind: MappingKind,
        key: &HostComponentKey,
        config_types: &[String],
    ) -> Result<(), StoreError> {
        let _guard = self.write_guard.lock();
        let mut entries = self.read_mappings(kind, key)?;
        let before = entries.len();
        for config_type in config_types {
            entries.remove(config_type);
        }
        if entries.len() == before {
            return Ok(());
        }
        self.write_mappings(kind, key, entries)
    }
}
