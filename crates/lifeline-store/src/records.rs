use lifeline_schema::{ComponentName, HostName, ServiceName, StackId, State};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity of a host component: one component of one service on one host.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct HostComponentKey {
    pub cluster_id: i64,
    pub service_name: ServiceName,
    pub component_name: ComponentName,
    pub host_name: HostName,
}

impl HostComponentKey {
    pub fn new(
        cluster_id: i64,
        service_name: impl Into<ServiceName>,
        component_name: impl Into<ComponentName>,
        host_name: impl Into<HostName>,
    ) -> Self {
        Self {
            cluster_id,
            service_name: service_name.into(),
            component_name: component_name.into(),
            host_name: host_name.into(),
        }
    }

    /// Stable storage identifier: blake3 over the canonical key.
    ///
    /// Names may contain characters that are awkward in file names, so
    /// backends address records by this digest instead.
    pub fn storage_id(&self) -> String {
        let canonical = format!(
            "{}\0{}\0{}\0{}",
            self.cluster_id, self.service_name, self.component_name, self.host_name
        );
        blake3::hash(canonical.as_bytes()).to_hex().to_string()
    }
}

impl fmt::Display for HostComponentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "clusterId={}, serviceName={}, componentName={}, hostname={}",
            self.cluster_id, self.service_name, self.component_name, self.host_name
        )
    }
}

/// Persisted current (observed) state of a host component.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostComponentStateRecord {
    pub key: HostComponentKey,
    pub current_state: State,
    #[serde(default)]
    pub current_stack_version: StackId,
    pub updated_at: String,
}

impl HostComponentStateRecord {
    pub fn new(key: HostComponentKey, current_state: State) -> Self {
        Self {
            key,
            current_state,
            current_stack_version: StackId::default(),
            updated_at: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub fn touch(&mut self) {
        self.updated_at = chrono::Utc::now().to_rfc3339();
    }
}

/// Persisted desired (target) state of a host component.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostComponentDesiredStateRecord {
    pub key: HostComponentKey,
    pub desired_state: State,
    #[serde(default)]
    pub desired_stack_version: StackId,
    pub updated_at: String,
}

impl HostComponentDesiredStateRecord {
    pub fn new(key: HostComponentKey, desired_state: State) -> Self {
        Self {
            key,
            desired_state,
            desired_stack_version: StackId::default(),
            updated_at: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub fn touch(&mut self) {
        self.updated_at = chrono::Utc::now().to_rfc3339();
    }
}

/// Which configuration-mapping table a record belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MappingKind {
    /// Versions currently live on the host.
    Live,
    /// Host-level desired versions.
    Desired,
}

impl fmt::Display for MappingKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MappingKind::Live => write!(f, "live"),
            MappingKind::Desired => write!(f, "desired"),
        }
    }
}

/// One config type mapped to a version tag for a host component.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigMappingRecord {
    pub key: HostComponentKey,
    pub config_type: String,
    pub version_tag: String,
    /// Milliseconds since the Unix epoch of the last write.
    pub timestamp: i64,
}

impl ConfigMappingRecord {
    pub fn new(
        key: HostComponentKey,
        config_type: impl Into<String>,
        version_tag: impl Into<String>,
        timestamp: i64,
    ) -> Self {
        Self {
            key,
            config_type: config_type.into(),
            version_tag: version_tag.into(),
            timestamp,
        }
    }
}
