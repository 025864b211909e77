//! The per-(component, host) runtime entity.
//!
//! Every operation takes the cluster lock shared and then the entity's own
//! lock (read for queries, write for mutations); [`ServiceComponentHost::delete`]
//! takes the cluster lock exclusive instead. The entity lock is always
//! released before the cluster lock. When the entity is persisted, each
//! mutation writes through the persistence bridge inside the same critical
//! section, and a failed write leaves the in-memory state untouched.

use crate::cluster::{ClusterContext, HostDirectory, ServiceComponent};
use crate::lifecycle::{check_config_update, ConfigUpdateCheck};
use crate::persistence::{PersistedHostComponent, PersistenceBridge};
use crate::response::{ConfigSnapshot, HostComponentResponse};
use crate::topology::{topology_for, HostComponentData, LifecycleMachine, OpTimes};
use crate::CoreError;
use lifeline_schema::{
    validate_config_versions, AppliedConfig, ComponentName, ConfigVersions, EventPayload,
    HostComponentEvent, HostName, ServiceName, StackId, State,
};
use lifeline_store::{
    HostComponentDesiredStateRecord, HostComponentKey, HostComponentStateRecord, MappingKind,
};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::sync::{Arc, Weak};
use tracing::{debug, error, info, warn};

struct Inner {
    machine: LifecycleMachine,
    data: HostComponentData,
    desired_state: State,
    desired_stack_version: StackId,
    desired_configs: ConfigVersions,
    actual_configs: BTreeMap<String, AppliedConfig>,
    persisted: bool,
}

/// One component of one service placed on one host.
pub struct ServiceComponentHost {
    ctx: Arc<ClusterContext>,
    key: HostComponentKey,
    client_only: bool,
    component: Weak<ServiceComponent>,
    inner: RwLock<Inner>,
}

impl ServiceComponentHost {
    /// Fresh entity in INIT with empty configuration and reset timestamps.
    pub(crate) fn new(
        component: &Arc<ServiceComponent>,
        host_name: HostName,
        desired_stack_version: StackId,
    ) -> Result<Self, CoreError> {
        let ctx = Arc::clone(component.context());
        if !ctx.has_host(&host_name) {
            error!("host '{host_name}' was not found");
            return Err(CoreError::HostNotFound(host_name.into_inner()));
        }
        let client_only = component.is_client_component();
        let key = HostComponentKey::new(
            ctx.id(),
            component.service_name().clone(),
            component.name().clone(),
            host_name,
        );
        Ok(Self {
            ctx,
            key,
            client_only,
            component: Arc::downgrade(component),
            inner: RwLock::new(Inner {
                machine: LifecycleMachine::new(topology_for(client_only)),
                data: HostComponentData::default(),
                desired_state: State::Init,
                desired_stack_version,
                desired_configs: ConfigVersions::new(),
                actual_configs: BTreeMap::new(),
                persisted: false,
            }),
        })
    }

    /// Entity rebuilt from stored records. The stored current state is
    /// trusted and seeded into the machine without validation.
    pub(crate) fn from_persisted(
        component: &Arc<ServiceComponent>,
        persisted: PersistedHostComponent,
    ) -> Result<Self, CoreError> {
        let ctx = Arc::clone(component.context());
        let key = persisted.state.key;
        if !ctx.has_host(&key.host_name) {
            error!("host '{}' was not found", key.host_name);
            return Err(CoreError::HostNotFound(key.host_name.to_string()));
        }
        let client_only = component.is_client_component();
        let machine =
            LifecycleMachine::with_state(topology_for(client_only), persisted.state.current_state);
        Ok(Self {
            ctx,
            key,
            client_only,
            component: Arc::downgrade(component),
            inner: RwLock::new(Inner {
                machine,
                data: HostComponentData {
                    op_times: OpTimes::default(),
                    stack_version: persisted.state.current_stack_version,
                    live_configs: persisted.live_configs,
                },
                desired_state: persisted.desired.desired_state,
                desired_stack_version: persisted.desired.desired_stack_version,
                desired_configs: persisted.desired_configs,
                actual_configs: BTreeMap::new(),
                persisted: true,
            }),
        })
    }

    fn read<R>(&self, f: impl FnOnce(&Inner) -> R) -> R {
        let _cluster = self.ctx.lock().shared();
        let inner = self.inner.read();
        f(&inner)
    }

    fn write<R>(&self, f: impl FnOnce(&mut Inner) -> R) -> R {
        let _cluster = self.ctx.lock().shared();
        let mut inner = self.inner.write();
        f(&mut inner)
    }

    fn bridge(&self) -> &PersistenceBridge {
        self.ctx.bridge()
    }

    fn state_record(&self, state: State, stack_version: &StackId) -> HostComponentStateRecord {
        let mut record = HostComponentStateRecord::new(self.key.clone(), state);
        record.current_stack_version = stack_version.clone();
        record
    }

    fn desired_record(
        &self,
        desired_state: State,
        desired_stack_version: &StackId,
    ) -> HostComponentDesiredStateRecord {
        let mut record = HostComponentDesiredStateRecord::new(self.key.clone(), desired_state);
        record.desired_stack_version = desired_stack_version.clone();
        record
    }

    pub fn key(&self) -> &HostComponentKey {
        &self.key
    }

    pub fn cluster_id(&self) -> i64 {
        self.key.cluster_id
    }

    pub fn cluster_name(&self) -> &str {
        self.ctx.name()
    }

    pub fn service_name(&self) -> &ServiceName {
        &self.key.service_name
    }

    pub fn component_name(&self) -> &ComponentName {
        &self.key.component_name
    }

    pub fn host_name(&self) -> &HostName {
        &self.key.host_name
    }

    pub fn is_client_component(&self) -> bool {
        self.client_only
    }

    pub fn state(&self) -> State {
        self.read(|inner| inner.machine.current_state())
    }

    /// Overwrite the current state without consulting the event machine.
    pub fn set_state(&self, state: State) -> Result<(), CoreError> {
        self.write(|inner| {
            if inner.persisted {
                self.bridge()
                    .sync_state(&self.state_record(state, &inner.data.stack_version))?;
            }
            inner.machine.set_current_state(state);
            Ok(())
        })
    }

    /// Run `event` through the lifecycle machine and return the new state.
    ///
    /// An undefined `(state, event)` pair fails with
    /// [`CoreError::InvalidTransition`] and changes nothing.
    pub fn handle_event(&self, event: &HostComponentEvent) -> Result<State, CoreError> {
        let kind = event.kind();
        debug!("handling {event} for {}", self.key);
        if let EventPayload::Start { configs } = &event.payload {
            validate_config_versions(configs)?;
        }

        self.write(|inner| {
            let old_state = inner.machine.current_state();
            let old_data = inner.data.clone();

            if let Err(e) = inner.machine.do_transition(&mut inner.data, kind, event) {
                error!(
                    "can't handle event at current state: {}, currentState={old_state}, \
                     eventType={kind}, event={event}: {e}",
                    self.key
                );
                inner.data = old_data;
                return Err(e);
            }
            let new_state = inner.machine.current_state();

            if inner.persisted {
                if let Err(e) = self.sync_after_event(inner, &old_data) {
                    inner.machine.set_current_state(old_state);
                    inner.data = old_data;
                    return Err(e);
                }
            }

            if new_state != old_state {
                debug!(
                    "{} transitioned {old_state} -> {new_state} on {kind}",
                    self.key
                );
            }
            Ok(new_state)
        })
    }

    fn sync_after_event(&self, inner: &Inner, old_data: &HostComponentData) -> Result<(), CoreError> {
        if inner.data.live_configs != old_data.live_configs {
            self.bridge().replace_configs(
                MappingKind::Live,
                &self.key,
                &old_data.live_configs,
                &inner.data.live_configs,
            )?;
        }
        self.bridge().sync_state(
            &self.state_record(inner.machine.current_state(), &inner.data.stack_version),
        )
    }

    pub fn desired_state(&self) -> State {
        self.read(|inner| inner.desired_state)
    }

    /// Set the target state; only INIT, INSTALLED, STARTED, UNINSTALLED and
    /// MAINTENANCE are accepted.
    pub fn set_desired_state(&self, state: State) -> Result<(), CoreError> {
        if !state.is_valid_desired_state() {
            return Err(CoreError::InvalidDesiredState(state));
        }
        self.write(|inner| {
            if inner.persisted {
                self.bridge()
                    .sync_desired(&self.desired_record(state, &inner.desired_stack_version))?;
            }
            inner.desired_state = state;
            Ok(())
        })
    }

    pub fn stack_version(&self) -> StackId {
        self.read(|inner| inner.data.stack_version.clone())
    }

    pub fn set_stack_version(&self, stack: StackId) -> Result<(), CoreError> {
        self.write(|inner| {
            if inner.persisted {
                self.bridge()
                    .sync_state(&self.state_record(inner.machine.current_state(), &stack))?;
            }
            inner.data.stack_version = stack;
            Ok(())
        })
    }

    pub fn desired_stack_version(&self) -> StackId {
        self.read(|inner| inner.desired_stack_version.clone())
    }

    pub fn set_desired_stack_version(&self, stack: StackId) -> Result<(), CoreError> {
        self.write(|inner| {
            if inner.persisted {
                self.bridge()
                    .sync_desired(&self.desired_record(inner.desired_state, &stack))?;
            }
            inner.desired_stack_version = stack;
            Ok(())
        })
    }

    /// Live configuration versions.
    pub fn configs(&self) -> ConfigVersions {
        self.read(|inner| inner.data.live_configs.clone())
    }

    /// Replace the live configuration versions. Types absent from `configs`
    /// are dropped from memory and, when persisted, from the store.
    pub fn set_configs(&self, configs: ConfigVersions) -> Result<(), CoreError> {
        validate_config_versions(&configs)?;
        self.write(|inner| {
            if inner.persisted {
                self.bridge().replace_configs(
                    MappingKind::Live,
                    &self.key,
                    &inner.data.live_configs,
                    &configs,
                )?;
            }
            inner.data.live_configs = configs;
            Ok(())
        })
    }

    /// Effective desired versions: the component's, overridden by this
    /// entity's own entries.
    pub fn desired_configs(&self) -> ConfigVersions {
        let _cluster = self.ctx.lock().shared();
        let own = self.inner.read().desired_configs.clone();
        self.merge_component_desired(own)
    }

    fn merge_component_desired(&self, own: ConfigVersions) -> ConfigVersions {
        let mut merged = self
            .component
            .upgrade()
            .map(|c| c.desired_configs_unlocked())
            .unwrap_or_default();
        merged.extend(own);
        merged
    }

    /// Insert or update entity-level desired versions; nothing is removed.
    pub fn update_desired_configs(&self, configs: &ConfigVersions) -> Result<(), CoreError> {
        validate_config_versions(configs)?;
        self.write(|inner| {
            if inner.persisted {
                self.bridge()
                    .upsert_configs(MappingKind::Desired, &self.key, configs)?;
            }
            inner
                .desired_configs
                .extend(configs.iter().map(|(t, v)| (t.clone(), v.clone())));
            Ok(())
        })
    }

    pub fn delete_desired_configs(&self, config_types: &[String]) -> Result<(), CoreError> {
        self.write(|inner| {
            if inner.persisted {
                self.bridge()
                    .remove_configs(MappingKind::Desired, &self.key, config_types)?;
            }
            for config_type in config_types {
                inner.desired_configs.remove(config_type);
            }
            Ok(())
        })
    }

    /// Replace the applied-configuration report with the agent's tags,
    /// keyed by config type.
    pub fn update_actual_configs(&self, tags: &BTreeMap<String, BTreeMap<String, String>>) {
        let host = self.key.host_name.as_str();
        self.write(|inner| {
            inner.actual_configs = tags
                .iter()
                .map(|(config_type, values)| {
                    (
                        config_type.clone(),
                        AppliedConfig::from_reported_tags(host, values),
                    )
                })
                .collect();
        });
    }

    pub fn actual_configs(&self) -> BTreeMap<String, AppliedConfig> {
        self.read(|inner| inner.actual_configs.clone())
    }

    /// Live, desired, and actual maps captured together.
    pub fn config_snapshot(&self) -> ConfigSnapshot {
        let _cluster = self.ctx.lock().shared();
        let mut snapshot = {
            let inner = self.inner.read();
            ConfigSnapshot {
                host_name: self.key.host_name.to_string(),
                live: inner.data.live_configs.clone(),
                desired: inner.desired_configs.clone(),
                effective_desired: ConfigVersions::new(),
                actual: inner.actual_configs.clone(),
            }
        };
        snapshot.effective_desired = self.merge_component_desired(snapshot.desired.clone());
        snapshot
    }

    pub fn last_op_times(&self) -> OpTimes {
        self.read(|inner| inner.data.op_times)
    }

    pub fn can_be_removed(&self) -> bool {
        self.read(|inner| inner.machine.current_state().is_removable_state())
    }

    pub fn is_persisted(&self) -> bool {
        self.read(|inner| inner.persisted)
    }

    /// Create the backing records on first call; afterwards re-sync them.
    pub fn persist(&self) -> Result<(), CoreError> {
        self.write(|inner| {
            let state = self.state_record(inner.machine.current_state(), &inner.data.stack_version);
            let desired = self.desired_record(inner.desired_state, &inner.desired_stack_version);
            if inner.persisted {
                self.bridge().sync_state(&state)?;
                self.bridge().sync_desired(&desired)?;
            } else {
                self.bridge().create(&PersistedHostComponent {
                    state,
                    desired,
                    live_configs: inner.data.live_configs.clone(),
                    desired_configs: inner.desired_configs.clone(),
                })?;
                inner.persisted = true;
                info!("persisted {}", self.key);
            }
            Ok(())
        })
    }

    /// Re-read both state records from the store. No-op when not persisted.
    pub fn refresh(&self) -> Result<(), CoreError> {
        self.write(|inner| {
            if !inner.persisted {
                return Ok(());
            }
            let (state, desired) = self.bridge().refresh(&self.key)?;
            inner.machine.set_current_state(state.current_state);
            inner.data.stack_version = state.current_stack_version;
            inner.desired_state = desired.desired_state;
            inner.desired_stack_version = desired.desired_stack_version;
            Ok(())
        })
    }

    /// Remove the backing records, clear desired configs, and detach from
    /// the owning component.
    ///
    /// Callers check [`can_be_removed`](Self::can_be_removed) first; this
    /// method does not. Failing to find the owning component is logged and
    /// does not stop the cleanup.
    pub fn delete(&self) -> Result<(), CoreError> {
        let _cluster = self.ctx.lock().exclusive();
        self.delete_locked()
    }

    /// Check removability and delete in one critical section, so no event
    /// can move the entity out of a removable state in between.
    pub(crate) fn delete_if_removable(&self) -> Result<(), CoreError> {
        let _cluster = self.ctx.lock().exclusive();
        let state = self.inner.read().machine.current_state();
        if !state.is_removable_state() {
            return Err(CoreError::NotRemovable {
                target: self.config_target(),
                state,
            });
        }
        self.delete_locked()
    }

    /// Caller holds the cluster lock exclusively.
    fn delete_locked(&self) -> Result<(), CoreError> {
        {
            let mut inner = self.inner.write();
            if inner.persisted {
                self.bridge().remove(&self.key)?;
                inner.persisted = false;
            }
            inner.desired_configs.clear();
        }

        let detached = self
            .component
            .upgrade()
            .and_then(|component| component.detach(&self.key.host_name));
        if detached.is_none() {
            warn!("could not detach {} from its component", self.key);
        }
        info!("deleted {}", self.key);
        Ok(())
    }

    /// Flattened view including the staleness verdict. A failing staleness
    /// check is logged and reported as not stale.
    pub fn to_response(&self) -> HostComponentResponse {
        let _cluster = self.ctx.lock().shared();
        let (mut response, own_desired) = {
            let inner = self.inner.read();
            let response = HostComponentResponse {
                cluster_name: self.ctx.name().to_owned(),
                service_name: self.key.service_name.to_string(),
                component_name: self.key.component_name.to_string(),
                host_name: self.key.host_name.to_string(),
                live_configs: inner.data.live_configs.clone(),
                desired_configs: inner.desired_configs.clone(),
                live_state: inner.machine.current_state().to_string(),
                stack_version: inner.data.stack_version.stack_id(),
                desired_state: inner.desired_state.to_string(),
                desired_stack_version: inner.desired_stack_version.stack_id(),
                actual_configs: inner.actual_configs.clone(),
                stale_configs: false,
            };
            (response, inner.desired_configs.clone())
        };

        let snapshot = ConfigSnapshot {
            host_name: response.host_name.clone(),
            live: response.live_configs.clone(),
            effective_desired: self.merge_component_desired(own_desired.clone()),
            desired: own_desired,
            actual: response.actual_configs.clone(),
        };
        match self.ctx.staleness().is_stale(&snapshot) {
            Ok(stale) => response.stale_configs = stale,
            Err(e) => error!("could not determine stale config for {}: {e}", self.key),
        }
        response
    }

    /// Append a one-line human-readable summary to `out`.
    pub fn debug_dump(&self, out: &mut String) {
        self.read(|inner| {
            let _ = write!(
                out,
                "ServiceComponentHost={{ hostname={}, serviceComponentName={}, clusterName={}, \
                 serviceName={}, desiredStackVersion={}, desiredState={}, stackVersion={}, \
                 state={} }}",
                self.key.host_name,
                self.key.component_name,
                self.ctx.name(),
                self.key.service_name,
                inner.desired_stack_version,
                inner.desired_state,
                inner.data.stack_version,
                inner.machine.current_state()
            );
        });
    }
}

impl ConfigUpdateCheck for ServiceComponentHost {
    fn config_target(&self) -> String {
        format!(
            "{}/{} on host {}",
            self.key.service_name, self.key.component_name, self.key.host_name
        )
    }

    fn check_update_configuration(&self, desired: State) -> Result<(), CoreError> {
        check_config_update(self, desired)
    }
}
