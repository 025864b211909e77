use crate::records::{
    ConfigMappingRecord, HostComponentDesiredStateRecord, HostComponentKey,
    HostComponentStateRecord, MappingKind,
};
use crate::{ComponentStore, StoreError};
use parking_lot::Mutex;
use std::collections::BTreeMap;

type MappingTable = BTreeMap<HostComponentKey, BTreeMap<String, ConfigMappingRecord>>;

#[derive(Default)]
struct Tables {
    states: BTreeMap<HostComponentKey, HostComponentStateRecord>,
    desired: BTreeMap<HostComponentKey, HostComponentDesiredStateRecord>,
    live_mappings: MappingTable,
    desired_mappings: MappingTable,
}

impl Tables {
    fn mappings(&mut self, kind: MappingKind) -> &mut MappingTable {
        match kind {
            MappingKind::Live => &mut self.live_mappings,
            MappingKind::Desired => &mut self.desired_mappings,
        }
    }
}

/// Volatile store keeping every record in process memory.
///
/// Used by tests and by embedders that own durability elsewhere.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of current-state records held.
    pub fn state_count(&self) -> usize {
        self.tables.lock().states.len()
    }
}

impl ComponentStore for MemoryStore {
    fn create_state(&self, record: &HostComponentStateRecord) -> Result<(), StoreError> {
        let mut tables = self.tables.lock();
        if tables.states.contains_key(&record.key) {
            return Err(StoreError::AlreadyExists(format!(
                "state record {}",
                record.key
            )));
        }
        tables.states.insert(record.key.clone(), record.clone());
        Ok(())
    }

    fn merge_state(&self, record: &HostComponentStateRecord) -> Result<(), StoreError> {
        self.tables
            .lock()
            .states
            .insert(record.key.clone(), record.clone());
        Ok(())
    }

    fn find_state(
        &self,
        key: &HostComponentKey,
    ) -> Result<Option<HostComponentStateRecord>, StoreError> {
        Ok(self.tables.lock().states.get(key).cloned())
    }

    fn remove_state(&self, key: &HostComponentKey) -> Result<(), StoreError> {
        self.tables.lock().states.remove(key);
        Ok(())
    }

    fn list_states(&self, cluster_id: i64) -> Result<Vec<HostComponentStateRecord>, StoreError> {
        Ok(self
            .tables
            .lock()
            .states
            .values()
            .filter(|r| r.key.cluster_id == cluster_id)
            .cloned()
            .collect())
    }

    fn create_desired(&self, record: &HostComponentDesiredStateRecord) -> Result<(), StoreError> {
        let mut tables = self.tables.lock();
        if tables.desired.contains_key(&record.key) {
            return Err(StoreError::AlreadyExists(format!(
                "desired state record {}",
                record.key
            )));
        }
        tables.desired.insert(record.key.clone(), record.clone());
        Ok(())
    }

    fn merge_desired(&self, record: &HostComponentDesiredStateRecord) -> Result<(), StoreError> {
        self.tables
            .lock()
            .desired
            .insert(record.key.clone(), record.clone());
        Ok(())
    }

    fn find_desired(
        &self,
        key: &HostComponentKey,
    ) -> Result<Option<HostComponentDesiredStateRecord>, StoreError> {
        Ok(self.tables.lock().desired.get(key).cloned())
    }

    fn remove_desired(&self, key: &HostComponentKey) -> Result<(), StoreError> {
        self.tables.lock().desired.remove(key);
        Ok(())
    }

    fn create_mapping(
        &self,
        kind: MappingKind,
        record: &ConfigMappingRecord,
    ) -> Result<(), StoreError> {
        let mut tables = self.tables.lock();
        let entries = tables.mappings(kind).entry(record.key.clone()).or_default();
        if entries.contains_key(&record.config_type) {
            return Err(StoreError::AlreadyExists(format!(
                "{kind} config mapping '{}' of {}",
                record.config_type, record.key
            )));
        }
        entries.insert(record.config_type.clone(), record.clone());
        Ok(())
    }

    fn merge_mapping(
        &self,
        kind: MappingKind,
        record: &ConfigMappingRecord,
    ) -> Result<(), StoreError> {
        self.tables
            .lock()
            .mappings(kind)
            .entry(record.key.clone())
            .or_default()
            .insert(record.config_type.clone(), record.clone());
        Ok(())
    }

    fn find_mappings(
        &self,
        kind: MappingKind,
        key: &HostComponentKey,
    ) -> Result<Vec<ConfigMappingRecord>, StoreError> {
        Ok(self
            .tables
            .lock()
            .mappings(kind)
            .get(key)
            .map(|entries| entries.values().cloned().collect())
            .unwrap_or_default())
    }

    fn remove_mapping(
        &self,
        kind: MappingKind,
        key: &HostComponentKey,
        config_type: &str,
    ) -> Result<(), StoreError> {
        let mut tables = self.tables.lock();
        let table = tables.mappings(kind);
        if let Some(entries) = table.get_mut(key) {
            entries.remove(config_type);
            if entries.is_empty() {
                table.remove(key);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lifeline_schema::State;

    fn key(host: &str) -> HostComponentKey {
        HostComponentKey::new(1, "HDFS", "DATANODE", host)
    }

    #[test]
    fn create_then_find_state() {
        let store = MemoryStore::new();
        let rec = HostComponentStateRecord::new(key("h1"), State::Init);
        store.create_state(&rec).unwrap();
        assert_eq!(store.find_state(&key("h1")).unwrap(), Some(rec));
        assert_eq!(store.state_count(), 1);
    }

    #[test]
    fn create_twice_fails() {
        let store = MemoryStore::new();
        let rec = HostComponentStateRecord::new(key("h1"), State::Init);
        store.create_state(&rec).unwrap();
        assert!(matches!(
            store.create_state(&rec),
            Err(StoreError::AlreadyExists(_))
        ));
    }

    #[test]
    fn merge_replaces_state() {
        let store = MemoryStore::new();
        let mut rec = HostComponentStateRecord::new(key("h1"), State::Init);
        store.create_state(&rec).unwrap();
        rec.current_state = State::Installing;
        store.merge_state(&rec).unwrap();
        assert_eq!(
            store.refresh_state(&key("h1")).unwrap().current_state,
            State::Installing
        );
    }

    #[test]
    fn refresh_missing_is_not_found() {
        let store = MemoryStore::new();
        assert!(matches!(
            store.refresh_desired(&key("h1")),
            Err(StoreError::NotFound(_))
        ));
    }

    #[test]
    fn list_states_filters_by_cluster() {
        let store = MemoryStore::new();
        store
            .merge_state(&HostComponentStateRecord::new(key("h1"), State::Init))
            .unwrap();
        store
            .merge_state(&HostComponentStateRecord::new(
                HostComponentKey::new(2, "HDFS", "DATANODE", "h1"),
                State::Init,
            ))
            .unwrap();
        assert_eq!(store.list_states(1).unwrap().len(), 1);
        assert_eq!(store.list_states(3).unwrap().len(), 0);
    }

    #[test]
    fn mappings_are_separated_by_kind() {
        let store = MemoryStore::new();
        let rec = ConfigMappingRecord::new(key("h1"), "core-site", "v1", 10);
        store.create_mapping(MappingKind::Live, &rec).unwrap();
        assert_eq!(store.find_mappings(MappingKind::Live, &key("h1")).unwrap().len(), 1);
        assert!(store
            .find_mappings(MappingKind::Desired, &key("h1"))
            .unwrap()
            .is_empty());
    }

    #[test]
    fn remove_mappings_by_type() {
        let store = MemoryStore::new();
        for t in ["core-site", "hdfs-site", "mapred-site"] {
            store
                .merge_mapping(
                    MappingKind::Desired,
                    &ConfigMappingRecord::new(key("h1"), t, "v1", 1),
                )
                .unwrap();
        }
        store
            .remove_mappings_by_type(
                MappingKind::Desired,
                &key("h1"),
                &["core-site".to_owned(), "mapred-site".to_owned()],
            )
            .unwrap();
        let left = store.find_mappings(MappingKind::Desired, &key("h1")).unwrap();
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].config_type, "hdfs-site");
    }

    #[test]
    fn remove_is_idempotent() {
        let store = MemoryStore::new();
        store.remove_state(&key("h1")).unwrap();
        store.remove_desired(&key("h1")).unwrap();
        store
            .remove_mapping(MappingKind::Live, &key("h1"), "core-site")
            .unwrap();
    }
}
