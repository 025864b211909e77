//! Lifecycle states, events, identity types, and cluster manifest for Lifeline.
//!
//! This crate defines the value layer shared by the store and the engine: the
//! closed `State` set with its classification predicates and transition
//! tables, the `HostComponentEvent` model, string newtypes for cluster
//! identity, configuration-version maps, and the TOML `ClusterManifest`
//! describing which components run on which hosts.

pub mod configs;
pub mod event;
pub mod manifest;
pub mod state;
pub mod types;

pub use configs::{
    parse_config_pairs, validate_config_versions, AppliedConfig, ConfigVersions, HostOverride,
};
pub use event::{EventKind, EventPayload, HostComponentEvent};
pub use manifest::{
    parse_manifest_file, parse_manifest_str, ClusterManifest, ClusterSection, ComponentSection,
    ManifestError, ServiceSection,
};
pub use state::{
    is_config_update_allowed, is_valid_desired_state_transition, is_valid_state_transition, State,
};
pub use types::{validate_name, ComponentName, HostName, ServiceName, StackId};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("invalid state: {0}")]
    InvalidState(String),
    #[error("invalid event kind: {0}")]
    InvalidEventKind(String),
    #[error("{0} events carry a payload and cannot be built bare")]
    MissingPayload(EventKind),
    #[error("invalid stack id '{0}', expected '<name>-<version>'")]
    InvalidStackId(String),
    #[error("invalid name: {0}")]
    InvalidName(String),
    #[error("config type must not be empty")]
    EmptyConfigType,
    #[error("config type '{config_type}' has an empty version tag")]
    EmptyConfigVersion { config_type: String },
    #[error("invalid config pair '{0}', expected '<type>=<tag>'")]
    InvalidConfigPair(String),
}
