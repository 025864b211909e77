//! Configuration-version bookkeeping: which version tag of each config type
//! is live, desired, or actually applied on a host.

use crate::SchemaError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Config type (e.g. `hdfs-site`) to version tag.
pub type ConfigVersions = BTreeMap<String, String>;

/// Key of the applied version tag in an agent's reported tag map.
pub const TAG_KEY: &str = "tag";
/// Key of a host-specific override tag in an agent's reported tag map.
pub const HOST_OVERRIDE_TAG_KEY: &str = "host_override_tag";
/// Key of a service-level override tag in an agent's reported tag map.
pub const SERVICE_OVERRIDE_TAG_KEY: &str = "service_override_tag";

/// Reject maps containing an empty config type or an empty version tag.
pub fn validate_config_versions(configs: &ConfigVersions) -> Result<(), SchemaError> {
    for (config_type, tag) in configs {
        if config_type.trim().is_empty() {
            return Err(SchemaError::EmptyConfigType);
        }
        if tag.trim().is_empty() {
            return Err(SchemaError::EmptyConfigVersion {
                config_type: config_type.clone(),
            });
        }
    }
    Ok(())
}

/// Parse `type=tag` pairs, e.g. from command-line arguments.
pub fn parse_config_pairs<I, S>(pairs: I) -> Result<ConfigVersions, SchemaError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut configs = ConfigVersions::new();
    for pair in pairs {
        let pair = pair.as_ref();
        let (config_type, tag) = pair
            .split_once('=')
            .ok_or_else(|| SchemaError::InvalidConfigPair(pair.to_owned()))?;
        configs.insert(config_type.trim().to_owned(), tag.trim().to_owned());
    }
    validate_config_versions(&configs)?;
    Ok(configs)
}

/// A host-specific override of a config version.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HostOverride {
    pub host_name: String,
    pub version_tag: String,
}

/// The configuration version an agent reported as actually applied.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct AppliedConfig {
    /// Applied version tag; `None` when the agent reported no tag.
    pub version: Option<String>,
    /// Service-level override tag, if the agent reported one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_name: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub host_overrides: Vec<HostOverride>,
}

impl AppliedConfig {
    /// Build from an agent's reported tag map for a host.
    pub fn from_reported_tags(host_name: &str, values: &BTreeMap<String, String>) -> Self {
        let mut applied = AppliedConfig {
            version: values.get(TAG_KEY).cloned(),
            service_name: values.get(SERVICE_OVERRIDE_TAG_KEY).cloned(),
            host_overrides: Vec::new(),
        };
        if let Some(host_tag) = values.get(HOST_OVERRIDE_TAG_KEY) {
            applied.host_overrides.push(HostOverride {
                host_name: host_name.to_owned(),
                version_tag: host_tag.clone(),
            });
        }
        applied
    }

    /// The tag in effect on `host_name`: its override if any, else the base tag.
    pub fn effective_tag(&self, host_name: &str) -> Option<&str> {
        self.host_overrides
            .iter()
            .find(|o| o.host_name == host_name)
            .map(|o| o.version_tag.as_str())
            .or(self.version.as_deref())
    }
}
