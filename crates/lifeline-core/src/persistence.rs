use crate::CoreError;
use lifeline_schema::ConfigVersions;
use lifeline_store::{
    ComponentStore, ConfigMappingRecord, HostComponentDesiredStateRecord, HostComponentKey,
    HostComponentStateRecord, MappingKind,
};
use std::sync::Arc;
use tracing::debug;

/// Everything persisted about one host component.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistedHostComponent {
    pub state: HostComponentStateRecord,
    pub desired: HostComponentDesiredStateRecord,
    pub live_configs: ConfigVersions,
    pub desired_configs: ConfigVersions,
}

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

fn to_versions(records: Vec<ConfigMappingRecord>) -> ConfigVersions {
    records
        .into_iter()
        .map(|r| (r.config_type, r.version_tag))
        .collect()
}

/// Mirrors host-component mutations into a [`ComponentStore`].
///
/// The bridge holds no state of its own; the caller decides whether an
/// entity is persisted and calls in while holding the entity's write lock.
#[derive(Clone)]
pub struct PersistenceBridge {
    store: Arc<dyn ComponentStore>,
}

impl PersistenceBridge {
    pub fn new(store: Arc<dyn ComponentStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn ComponentStore> {
        &self.store
    }

    /// First persist: create both state records and every config mapping.
    pub fn create(&self, entity: &PersistedHostComponent) -> Result<(), CoreError> {
        let key = &entity.state.key;
        debug!("creating records for {key}");
        self.store.create_desired(&entity.desired)?;
        self.store.create_state(&entity.state)?;

        let ts = now_millis();
        for (kind, configs) in [
            (MappingKind::Live, &entity.live_configs),
            (MappingKind::Desired, &entity.desired_configs),
        ] {
            for (config_type, tag) in configs {
                self.store.create_mapping(
                    kind,
                    &ConfigMappingRecord::new(key.clone(), config_type, tag, ts),
                )?;
            }
        }
        Ok(())
    }

    pub fn sync_state(&self, record: &HostComponentStateRecord) -> Result<(), CoreError> {
        let mut record = record.clone();
        record.touch();
        self.store.merge_state(&record)?;
        Ok(())
    }

    pub fn sync_desired(&self, record: &HostComponentDesiredStateRecord) -> Result<(), CoreError> {
        let mut record = record.clone();
        record.touch();
        self.store.merge_desired(&record)?;
        Ok(())
    }

    /// Reconcile the stored mappings of `kind` from `old` to `new`.
    ///
    /// Entries in both are rewritten with a fresh timestamp, entries only in
    /// `new` are inserted, entries only in `old` are removed.
    pub fn replace_configs(
        &self,
        kind: MappingKind,
        key: &HostComponentKey,
        old: &ConfigVersions,
        new: &ConfigVersions,
    ) -> Result<(), CoreError> {
        self.upsert_configs(kind, key, new)?;
        let removed: Vec<String> = old
            .keys()
            .filter(|config_type| !new.contains_key(*config_type))
            .cloned()
            .collect();
        if !removed.is_empty() {
            debug!("removing {kind} config mappings {removed:?} of {key}");
            self.store.remove_mappings_by_type(kind, key, &removed)?;
        }
        Ok(())
    }

    /// Insert or update every entry of `configs`; nothing is removed.
    pub fn upsert_configs(
        &self,
        kind: MappingKind,
        key: &HostComponentKey,
        configs: &ConfigVersions,
    ) -> Result<(), CoreError> {
        let ts = now_millis();
        for (config_type, tag) in configs {
            self.store.merge_mapping(
                kind,
                &ConfigMappingRecord::new(key.clone(), config_type, tag, ts),
            )?;
        }
        Ok(())
    }

    pub fn remove_configs(
        &self,
        kind: MappingKind,
        key: &HostComponentKey,
        config_types: &[String],
    ) -> Result<(), CoreError> {
        self.store.remove_mappings_by_type(kind, key, config_types)?;
        Ok(())
    }

    /// Drop both state records and all mappings of `key`.
    pub fn remove(&self, key: &HostComponentKey) -> Result<(), CoreError> {
        debug!("removing records for {key}");
        for kind in [MappingKind::Live, MappingKind::Desired] {
            let types: Vec<String> = self
                .store
                .find_mappings(kind, key)?
                .into_iter()
                .map(|r| r.config_type)
                .collect();
            self.store.remove_mappings_by_type(kind, key, &types)?;
        }
        self.store.remove_state(key)?;
        self.store.remove_desired(key)?;
        Ok(())
    }

    /// Re-read both state records of a persisted entity.
    pub fn refresh(
        &self,
        key: &HostComponentKey,
    ) -> Result<(HostComponentStateRecord, HostComponentDesiredStateRecord), CoreError> {
        Ok((self.store.refresh_state(key)?, self.store.refresh_desired(key)?))
    }

    /// Complete a state record found by a listing with the rest of its data.
    ///
    /// A missing desired record is rebuilt from the state's key with the
    /// default desired state.
    pub fn load_from_state(
        &self,
        state: HostComponentStateRecord,
    ) -> Result<PersistedHostComponent, CoreError> {
        let key = state.key.clone();
        let desired = self.store.find_desired(&key)?.unwrap_or_else(|| {
            HostComponentDesiredStateRecord::new(key.clone(), lifeline_schema::State::Init)
        });
        Ok(PersistedHostComponent {
            live_configs: to_versions(self.store.find_mappings(MappingKind::Live, &key)?),
            desired_configs: to_versions(self.store.find_mappings(MappingKind::Desired, &key)?),
            state,
            desired,
        })
    }

    pub fn list_states(&self, cluster_id: i64) -> Result<Vec<HostComponentStateRecord>, CoreError> {
        Ok(self.store.list_states(cluster_id)?)
    }
}
