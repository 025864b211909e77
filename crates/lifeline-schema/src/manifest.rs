use crate::configs::{validate_config_versions, ConfigVersions};
use crate::types::{validate_name, StackId};
use crate::SchemaError;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("failed to read manifest file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse manifest: {0}")]
    ParseToml(#[from] toml::de::Error),
    #[error("unsupported manifest_version: {0}, expected 1")]
    UnsupportedVersion(u32),
    #[error("manifest error: {0}")]
    Schema(#[from] SchemaError),
    #[error("host '{0}' is declared more than once")]
    DuplicateHost(String),
    #[error("component '{service}/{component}' is placed on undeclared host '{host}'")]
    UnknownHost {
        service: String,
        component: String,
        host: String,
    },
}

/// Cluster topology: which components of which services live on which hosts.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ClusterManifest {
    pub manifest_version: u32,
    pub cluster: ClusterSection,
    #[serde(default)]
    pub services: BTreeMap<String, ServiceSection>,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ClusterSection {
    pub id: i64,
    pub name: String,
    /// Desired stack of every component, as `<name>-<version>`.
    #[serde(default)]
    pub desired_stack: String,
    #[serde(default)]
    pub hosts: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ServiceSection {
    #[serde(default)]
    pub components: BTreeMap<String, ComponentSection>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ComponentSection {
    /// Client-only components never run as daemons.
    #[serde(default)]
    pub client: bool,
    #[serde(default)]
    pub hosts: Vec<String>,
    /// Component-level desired config versions, inherited by every host.
    #[serde(default)]
    pub desired_configs: ConfigVersions,
}

impl ClusterManifest {
    pub fn desired_stack(&self) -> Result<StackId, ManifestError> {
        Ok(self.cluster.desired_stack.parse()?)
    }

    /// Check version, names, stack id, config maps, and host placement.
    pub fn validate(&self) -> Result<(), ManifestError> {
        if self.manifest_version != 1 {
            return Err(ManifestError::UnsupportedVersion(self.manifest_version));
        }
        validate_name("cluster", &self.cluster.name)?;
        self.desired_stack()?;

        let mut hosts = BTreeSet::new();
        for host in &self.cluster.hosts {
            validate_name("host", host)?;
            if !hosts.insert(host.as_str()) {
                return Err(ManifestError::DuplicateHost(host.clone()));
            }
        }

        for (service_name, service) in &self.services {
            validate_name("service", service_name)?;
            for (component_name, component) in &service.components {
                validate_name("component", component_name)?;
                validate_config_versions(&component.desired_configs)?;
                for host in &component.hosts {
                    if !hosts.contains(host.as_str()) {
                        return Err(ManifestError::UnknownHost {
                            service: service_name.clone(),
                            component: component_name.clone(),
                            host: host.clone(),
                        });
                    }
                }
            }
        }
        Ok(())
    }
}

pub fn parse_manifest_str(input: &str) -> Result<ClusterManifest, ManifestError> {
    let manifest: ClusterManifest = toml::from_str(input)?;
    manifest.validate()?;
    Ok(manifest)
}

pub fn parse_manifest_file(path: impl AsRef<Path>) -> Result<ClusterManifest, ManifestError> {
    let content = fs::read_to_string(path)?;
    parse_manifest_str(&content)
}
