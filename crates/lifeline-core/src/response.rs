use lifeline_schema::{AppliedConfig, ConfigVersions};
use serde::Serialize;
use std::collections::BTreeMap;

/// Configuration maps of one host component, captured together.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ConfigSnapshot {
    pub host_name: String,
    pub live: ConfigVersions,
    /// Entity-level desired versions only.
    pub desired: ConfigVersions,
    /// Entity-level desired versions over the component's defaults.
    pub effective_desired: ConfigVersions,
    pub actual: BTreeMap<String, AppliedConfig>,
}

/// Flattened read-only view of a host component for reporting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HostComponentResponse {
    pub cluster_name: String,
    pub service_name: String,
    pub component_name: String,
    pub host_name: String,
    pub live_configs: ConfigVersions,
    pub desired_configs: ConfigVersions,
    pub live_state: String,
    pub stack_version: String,
    pub desired_state: String,
    pub desired_stack_version: String,
    pub actual_configs: BTreeMap<String, AppliedConfig>,
    pub stale_configs: bool,
}
