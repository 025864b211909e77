//! Cluster, service, and component containers that own host components.
//!
//! Structural changes (adding or removing children) hold the cluster lock
//! exclusive; container reads take only the container's own lock and hand out
//! cloned `Arc`s so no container lock is ever held while a host-component
//! operation runs.

use crate::concurrency::ClusterLock;
use crate::host_component::ServiceComponentHost;
use crate::lifecycle::{check_config_update, ConfigUpdateCheck};
use crate::persistence::{PersistedHostComponent, PersistenceBridge};
use crate::staleness::StalenessHelper;
use crate::CoreError;
use lifeline_schema::{
    validate_config_versions, validate_name, ClusterManifest, ComponentName, ConfigVersions,
    HostName, ServiceName, StackId, State,
};
use lifeline_store::ComponentStore;
use parking_lot::RwLock;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write as _;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Lookup of the hosts registered in a cluster.
pub trait HostDirectory: Send + Sync {
    fn has_host(&self, host_name: &str) -> bool;
}

/// State shared by everything inside one cluster: identity, the cluster-wide
/// lock, and the injected store and staleness collaborators.
pub struct ClusterContext {
    id: i64,
    name: String,
    lock: ClusterLock,
    bridge: PersistenceBridge,
    staleness: Arc<dyn StalenessHelper>,
    hosts: RwLock<BTreeSet<HostName>>,
}

impl ClusterContext {
    pub fn id(&self) -> i64 {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn lock(&self) -> &ClusterLock {
        &self.lock
    }

    pub fn bridge(&self) -> &PersistenceBridge {
        &self.bridge
    }

    pub fn staleness(&self) -> &dyn StalenessHelper {
        self.staleness.as_ref()
    }
}

impl HostDirectory for ClusterContext {
    fn has_host(&self, host_name: &str) -> bool {
        self.hosts.read().contains(&HostName::from(host_name))
    }
}

struct ComponentInner {
    desired_configs: ConfigVersions,
    desired_stack_version: StackId,
    host_components: BTreeMap<HostName, Arc<ServiceComponentHost>>,
}

/// One component of a service, holding its host components.
pub struct ServiceComponent {
    ctx: Arc<ClusterContext>,
    service_name: ServiceName,
    name: ComponentName,
    client_only: bool,
    inner: RwLock<ComponentInner>,
}

impl ServiceComponent {
    pub fn context(&self) -> &Arc<ClusterContext> {
        &self.ctx
    }

    pub fn service_name(&self) -> &ServiceName {
        &self.service_name
    }

    pub fn name(&self) -> &ComponentName {
        &self.name
    }

    pub fn is_client_component(&self) -> bool {
        self.client_only
    }

    /// Create a fresh, unpersisted host component on `host_name`.
    pub fn add_host_component(
        self: &Arc<Self>,
        host_name: &str,
    ) -> Result<Arc<ServiceComponentHost>, CoreError> {
        let _cluster = self.ctx.lock().exclusive();
        let mut inner = self.inner.write();
        let host = HostName::from(host_name);
        if inner.host_components.contains_key(&host) {
            return Err(CoreError::AlreadyExists(format!(
                "{}/{} on host {host_name}",
                self.service_name, self.name
            )));
        }
        let sch = Arc::new(ServiceComponentHost::new(
            self,
            host.clone(),
            inner.desired_stack_version.clone(),
        )?);
        inner.host_components.insert(host, Arc::clone(&sch));
        info!("added {}/{} on host {host_name}", self.service_name, self.name);
        Ok(sch)
    }

    /// Rebuild a host component from its stored records.
    pub fn attach_persisted(
        self: &Arc<Self>,
        persisted: PersistedHostComponent,
    ) -> Result<Arc<ServiceComponentHost>, CoreError> {
        let _cluster = self.ctx.lock().exclusive();
        let mut inner = self.inner.write();
        let host = persisted.state.key.host_name.clone();
        if inner.host_components.contains_key(&host) {
            return Err(CoreError::AlreadyExists(format!(
                "{}/{} on host {host}",
                self.service_name, self.name
            )));
        }
        let sch = Arc::new(ServiceComponentHost::from_persisted(self, persisted)?);
        inner.host_components.insert(host, Arc::clone(&sch));
        Ok(sch)
    }

    pub fn host_component(&self, host_name: &str) -> Option<Arc<ServiceComponentHost>> {
        self.inner
            .read()
            .host_components
            .get(&HostName::from(host_name))
            .cloned()
    }

    pub fn host_components(&self) -> Vec<Arc<ServiceComponentHost>> {
        self.inner.read().host_components.values().cloned().collect()
    }

    /// Remove the host component from this component's map. Callers hold
    /// the cluster lock exclusive.
    pub(crate) fn detach(&self, host_name: &HostName) -> Option<Arc<ServiceComponentHost>> {
        self.inner.write().host_components.remove(host_name)
    }

    pub fn desired_configs(&self) -> ConfigVersions {
        let _cluster = self.ctx.lock().shared();
        self.desired_configs_unlocked()
    }

    /// Component-level desired configs for callers already holding the
    /// cluster lock.
    pub(crate) fn desired_configs_unlocked(&self) -> ConfigVersions {
        self.inner.read().desired_configs.clone()
    }

    pub fn desired_stack_version(&self) -> StackId {
        let _cluster = self.ctx.lock().shared();
        self.inner.read().desired_stack_version.clone()
    }

    pub fn set_desired_stack_version(&self, stack: StackId) {
        let _cluster = self.ctx.lock().shared();
        self.inner.write().desired_stack_version = stack;
    }

    /// Merge `configs` into the component-level desired configs after
    /// checking that this component and all its host components accept a
    /// configuration update toward `desired`.
    pub fn update_desired_configs(
        &self,
        desired: State,
        configs: &ConfigVersions,
    ) -> Result<(), CoreError> {
        self.check_update_configuration(desired)?;
        validate_config_versions(configs)?;
        self.apply_desired_configs(configs);
        Ok(())
    }

    fn apply_desired_configs(&self, configs: &ConfigVersions) {
        let _cluster = self.ctx.lock().shared();
        let mut inner = self.inner.write();
        inner
            .desired_configs
            .extend(configs.iter().map(|(t, v)| (t.clone(), v.clone())));
        debug!(
            "{}/{} desired configs now {:?}",
            self.service_name, self.name, inner.desired_configs
        );
    }
}

impl ConfigUpdateCheck for ServiceComponent {
    fn config_target(&self) -> String {
        format!("{}/{}", self.service_name, self.name)
    }

    fn check_update_configuration(&self, desired: State) -> Result<(), CoreError> {
        check_config_update(self, desired)?;
        for sch in self.host_components() {
            sch.check_update_configuration(desired)?;
        }
        Ok(())
    }
}

/// A service and its components.
pub struct Service {
    ctx: Arc<ClusterContext>,
    name: ServiceName,
    components: RwLock<BTreeMap<ComponentName, Arc<ServiceComponent>>>,
}

impl Service {
    pub fn name(&self) -> &ServiceName {
        &self.name
    }

    pub fn add_component(
        &self,
        name: &str,
        client_only: bool,
    ) -> Result<Arc<ServiceComponent>, CoreError> {
        validate_name("component", name)?;
        let _cluster = self.ctx.lock().exclusive();
        let mut components = self.components.write();
        let key = ComponentName::from(name);
        if components.contains_key(&key) {
            return Err(CoreError::AlreadyExists(format!(
                "component {}/{name}",
                self.name
            )));
        }
        let component = Arc::new(ServiceComponent {
            ctx: Arc::clone(&self.ctx),
            service_name: self.name.clone(),
            name: key.clone(),
            client_only,
            inner: RwLock::new(ComponentInner {
                desired_configs: ConfigVersions::new(),
                desired_stack_version: StackId::default(),
                host_components: BTreeMap::new(),
            }),
        });
        components.insert(key, Arc::clone(&component));
        Ok(component)
    }

    pub fn component(&self, name: &str) -> Option<Arc<ServiceComponent>> {
        self.components
            .read()
            .get(&ComponentName::from(name))
            .cloned()
    }

    pub fn components(&self) -> Vec<Arc<ServiceComponent>> {
        self.components.read().values().cloned().collect()
    }

    /// Apply `configs` to every component, after the whole service has
    /// accepted a configuration update toward `desired`.
    pub fn update_desired_configs(
        &self,
        desired: State,
        configs: &ConfigVersions,
    ) -> Result<(), CoreError> {
        self.check_update_configuration(desired)?;
        validate_config_versions(configs)?;
        for component in self.components() {
            component.apply_desired_configs(configs);
        }
        Ok(())
    }
}

impl ConfigUpdateCheck for Service {
    fn config_target(&self) -> String {
        self.name.to_string()
    }

    fn check_update_configuration(&self, desired: State) -> Result<(), CoreError> {
        check_config_update(self, desired)?;
        for component in self.components() {
            component.check_update_configuration(desired)?;
        }
        Ok(())
    }
}

/// A managed cluster: hosts, services, and the shared context.
pub struct Cluster {
    ctx: Arc<ClusterContext>,
    services: RwLock<BTreeMap<ServiceName, Arc<Service>>>,
}

impl Cluster {
    pub fn new(
        id: i64,
        name: impl Into<String>,
        store: Arc<dyn ComponentStore>,
        staleness: Arc<dyn StalenessHelper>,
    ) -> Self {
        Self {
            ctx: Arc::new(ClusterContext {
                id,
                name: name.into(),
                lock: ClusterLock::new(),
                bridge: PersistenceBridge::new(store),
                staleness,
                hosts: RwLock::new(BTreeSet::new()),
            }),
            services: RwLock::new(BTreeMap::new()),
        }
    }

    /// Build a cluster from a manifest, rehydrating every host component
    /// found in the store and creating the remaining placements fresh.
    pub fn from_manifest(
        manifest: &ClusterManifest,
        store: Arc<dyn ComponentStore>,
        staleness: Arc<dyn StalenessHelper>,
    ) -> Result<Self, CoreError> {
        manifest.validate()?;
        let cluster = Self::new(
            manifest.cluster.id,
            manifest.cluster.name.clone(),
            store,
            staleness,
        );
        for host in &manifest.cluster.hosts {
            cluster.add_host(host)?;
        }

        let desired_stack = manifest.desired_stack()?;
        for (service_name, section) in &manifest.services {
            let service = cluster.add_service(service_name)?;
            for (component_name, comp) in &section.components {
                let component = service.add_component(component_name, comp.client)?;
                component.set_desired_stack_version(desired_stack.clone());
                component.apply_desired_configs(&comp.desired_configs);
            }
        }

        let restored = cluster.rehydrate()?;

        let mut created = 0usize;
        for (service_name, section) in &manifest.services {
            for (component_name, comp) in &section.components {
                let component = cluster
                    .service(service_name)
                    .and_then(|s| s.component(component_name))
                    .ok_or_else(|| {
                        CoreError::NotFound(format!("component {service_name}/{component_name}"))
                    })?;
                for host in &comp.hosts {
                    if component.host_component(host).is_none() {
                        component.add_host_component(host)?;
                        created += 1;
                    }
                }
            }
        }
        info!(
            "loaded cluster '{}' ({} restored, {created} new host components)",
            manifest.cluster.name, restored
        );
        Ok(cluster)
    }

    pub fn id(&self) -> i64 {
        self.ctx.id
    }

    pub fn name(&self) -> &str {
        &self.ctx.name
    }

    pub fn context(&self) -> &Arc<ClusterContext> {
        &self.ctx
    }

    pub fn add_host(&self, host_name: &str) -> Result<(), CoreError> {
        validate_name("host", host_name)?;
        let _cluster = self.ctx.lock().exclusive();
        if !self.ctx.hosts.write().insert(HostName::from(host_name)) {
            return Err(CoreError::AlreadyExists(format!("host {host_name}")));
        }
        Ok(())
    }

    pub fn hosts(&self) -> Vec<HostName> {
        self.ctx.hosts.read().iter().cloned().collect()
    }

    pub fn add_service(&self, name: &str) -> Result<Arc<Service>, CoreError> {
        validate_name("service", name)?;
        let _cluster = self.ctx.lock().exclusive();
        let mut services = self.services.write();
        let key = ServiceName::from(name);
        if services.contains_key(&key) {
            return Err(CoreError::AlreadyExists(format!("service {name}")));
        }
        let service = Arc::new(Service {
            ctx: Arc::clone(&self.ctx),
            name: key.clone(),
            components: RwLock::new(BTreeMap::new()),
        });
        services.insert(key, Arc::clone(&service));
        Ok(service)
    }

    pub fn service(&self, name: &str) -> Option<Arc<Service>> {
        self.services.read().get(&ServiceName::from(name)).cloned()
    }

    pub fn services(&self) -> Vec<Arc<Service>> {
        self.services.read().values().cloned().collect()
    }

    pub fn host_component(
        &self,
        service: &str,
        component: &str,
        host: &str,
    ) -> Result<Arc<ServiceComponentHost>, CoreError> {
        self.service(service)
            .and_then(|s| s.component(component))
            .and_then(|c| c.host_component(host))
            .ok_or_else(|| CoreError::NotFound(format!("{service}/{component} on host {host}")))
    }

    /// Every host component, ordered by service, component, then host.
    pub fn host_components(&self) -> Vec<Arc<ServiceComponentHost>> {
        self.services()
            .iter()
            .flat_map(|s| s.components())
            .flat_map(|c| c.host_components())
            .collect()
    }

    /// Delete a host component whose current state allows removal.
    pub fn remove_host_component(
        &self,
        service: &str,
        component: &str,
        host: &str,
    ) -> Result<(), CoreError> {
        self.host_component(service, component, host)?
            .delete_if_removable()
    }

    /// Persist every host component; returns how many were newly created.
    pub fn persist_all(&self) -> Result<usize, CoreError> {
        let mut created = 0;
        for sch in self.host_components() {
            if !sch.is_persisted() {
                created += 1;
            }
            sch.persist()?;
        }
        Ok(created)
    }

    /// Rebuild every stored host component of this cluster that is not
    /// already in memory. Unknown services and components are created as
    /// daemon components.
    pub fn rehydrate(&self) -> Result<usize, CoreError> {
        let bridge = self.ctx.bridge();
        let mut restored = 0;
        for state in bridge.list_states(self.ctx.id)? {
            let key = state.key.clone();
            let service = match self.service(&key.service_name) {
                Some(s) => s,
                None => {
                    debug!("restoring unknown service {}", key.service_name);
                    self.add_service(&key.service_name)?
                }
            };
            let component = match service.component(&key.component_name) {
                Some(c) => c,
                None => {
                    warn!(
                        "component {}/{} is not declared, restoring it as a daemon",
                        key.service_name, key.component_name
                    );
                    service.add_component(&key.component_name, false)?
                }
            };
            if component.host_component(&key.host_name).is_some() {
                continue;
            }
            component.attach_persisted(bridge.load_from_state(state)?)?;
            restored += 1;
        }
        Ok(restored)
    }

    pub fn debug_dump(&self, out: &mut String) {
        let _ = write!(
            out,
            "Cluster={{ clusterName={}, clusterId={}, hosts={} }}",
            self.ctx.name,
            self.ctx.id,
            self.ctx.hosts.read().len()
        );
        for sch in self.host_components() {
            out.push('\n');
            sch.debug_dump(out);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::staleness::TagStalenessHelper;
    use lifeline_schema::parse_manifest_str;
    use lifeline_store::MemoryStore;

    const MANIFEST: &str = r#"
manifest_version = 1

[cluster]
id = 1
name = "c1"
desired_stack = "HDP-1.3.0"
hosts = ["h1", "h2"]

[services.HDFS.components.DATANODE]
hosts = ["h1", "h2"]

[services.HDFS.components.DATANODE.desired_configs]
hdfs-site = "v1"

[services.HDFS.components.HDFS_CLIENT]
client = true
hosts = ["h2"]
"#;

    fn cluster_with(store: Arc<dyn ComponentStore>) -> Cluster {
        let manifest = parse_manifest_str(MANIFEST).unwrap();
        Cluster::from_manifest(&manifest, store, Arc::new(TagStalenessHelper)).unwrap()
    }

    #[test]
    fn manifest_builds_tree() {
        let cluster = cluster_with(Arc::new(MemoryStore::new()));
        assert_eq!(cluster.name(), "c1");
        assert_eq!(cluster.hosts().len(), 2);
        assert_eq!(cluster.host_components().len(), 3);

        let client = cluster.service("HDFS").unwrap().component("HDFS_CLIENT").unwrap();
        assert!(client.is_client_component());
        let dn = cluster.host_component("HDFS", "DATANODE", "h1").unwrap();
        assert_eq!(dn.desired_stack_version(), StackId::new("HDP", "1.3.0"));
        assert_eq!(dn.desired_configs()["hdfs-site"], "v1");
        assert!(!dn.is_persisted());
    }

    #[test]
    fn unknown_host_is_lookup_failure() {
        let cluster = cluster_with(Arc::new(MemoryStore::new()));
        let dn = cluster.service("HDFS").unwrap().component("DATANODE").unwrap();
        assert!(matches!(
            dn.add_host_component("h9"),
            Err(CoreError::HostNotFound(_))
        ));
    }

    #[test]
    fn duplicate_host_component_rejected() {
        let cluster = cluster_with(Arc::new(MemoryStore::new()));
        let dn = cluster.service("HDFS").unwrap().component("DATANODE").unwrap();
        assert!(matches!(
            dn.add_host_component("h1"),
            Err(CoreError::AlreadyExists(_))
        ));
    }

    #[test]
    fn missing_host_component_is_not_found() {
        let cluster = cluster_with(Arc::new(MemoryStore::new()));
        assert!(matches!(
            cluster.host_component("HDFS", "NAMENODE", "h1"),
            Err(CoreError::NotFound(_))
        ));
    }

    #[test]
    fn persisted_components_are_rehydrated() {
        let store: Arc<dyn ComponentStore> = Arc::new(MemoryStore::new());
        {
            let cluster = cluster_with(Arc::clone(&store));
            assert_eq!(cluster.persist_all().unwrap(), 3);
            let dn = cluster.host_component("HDFS", "DATANODE", "h1").unwrap();
            dn.set_state(State::Installed).unwrap();
        }
        let cluster = cluster_with(store);
        let dn = cluster.host_component("HDFS", "DATANODE", "h1").unwrap();
        assert!(dn.is_persisted());
        assert_eq!(dn.state(), State::Installed);
        assert_eq!(cluster.persist_all().unwrap(), 0);
    }

    #[test]
    fn remove_refuses_running_component() {
        let cluster = cluster_with(Arc::new(MemoryStore::new()));
        let dn = cluster.host_component("HDFS", "DATANODE", "h1").unwrap();
        dn.set_state(State::Started).unwrap();
        assert!(matches!(
            cluster.remove_host_component("HDFS", "DATANODE", "h1"),
            Err(CoreError::NotRemovable {
                state: State::Started,
                ..
            })
        ));
        dn.set_state(State::Installed).unwrap();
        cluster
            .remove_host_component("HDFS", "DATANODE", "h1")
            .unwrap();
        assert!(cluster.host_component("HDFS", "DATANODE", "h1").is_err());
    }

    #[test]
    fn service_config_update_checks_every_level() {
        let cluster = cluster_with(Arc::new(MemoryStore::new()));
        let hdfs = cluster.service("HDFS").unwrap();
        let configs = ConfigVersions::from([("core-site".to_owned(), "v2".to_owned())]);

        let err = hdfs
            .update_desired_configs(State::Uninstalled, &configs)
            .unwrap_err();
        assert!(matches!(err, CoreError::UnsupportedConfigUpdate { .. }));
        let dn = hdfs.component("DATANODE").unwrap();
        assert!(!dn.desired_configs().contains_key("core-site"));

        hdfs.update_desired_configs(State::Started, &configs).unwrap();
        for component in hdfs.components() {
            assert_eq!(component.desired_configs()["core-site"], "v2");
        }
    }

    #[test]
    fn debug_dump_lists_every_host_component() {
        let cluster = cluster_with(Arc::new(MemoryStore::new()));
        let mut out = String::new();
        cluster.debug_dump(&mut out);
        assert!(out.starts_with("Cluster={ clusterName=c1"));
        assert_eq!(out.matches("ServiceComponentHost=").count(), 3);
    }
}
