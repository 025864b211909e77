//! Host-component lifecycle engine for Lifeline.
//!
//! This crate ties the schema value types and the record store together into
//! the runtime: a generic table-driven state machine, the daemon and client
//! lifecycle topologies, the `ServiceComponentHost` entity with its two-tier
//! locking discipline, the persistence bridge that mirrors every mutation into
//! a `ComponentStore`, configuration staleness detection, and the
//! `Cluster` / `Service` / `ServiceComponent` containers.

pub mod cluster;
pub mod concurrency;
pub mod fsm;
pub mod host_component;
pub mod lifecycle;
pub mod persistence;
pub mod response;
pub mod staleness;
pub mod topology;

pub use cluster::{Cluster, ClusterContext, HostDirectory, Service, ServiceComponent};
pub use concurrency::{ClusterLock, StoreLock};
pub use fsm::{InvalidTransition, StateMachine, Topology};
pub use host_component::ServiceComponentHost;
pub use lifecycle::{validate_desired_transition, validate_transition, ConfigUpdateCheck};
pub use persistence::PersistenceBridge;
pub use response::{ConfigSnapshot, HostComponentResponse};
pub use staleness::{StalenessHelper, TagStalenessHelper};
pub use topology::{OpTimes, CLIENT_TOPOLOGY, DAEMON_TOPOLOGY, NEVER};

use lifeline_schema::{EventKind, State};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid event {event} at state {state}")]
    InvalidTransition { state: State, event: EventKind },
    #[error("illegal state change: {from} -> {to}")]
    IllegalStateChange { from: State, to: State },
    #[error("{0} is not a valid desired state")]
    InvalidDesiredState(State),
    #[error("unsupported config update for {target}: desired state {state}")]
    UnsupportedConfigUpdate { target: String, state: State },
    #[error("{target} cannot be removed in state {state}")]
    NotRemovable { target: String, state: State },
    #[error("host not found: {0}")]
    HostNotFound(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("already exists: {0}")]
    AlreadyExists(String),
    #[error("staleness check failed: {0}")]
    Staleness(String),
    #[error("schema error: {0}")]
    Schema(#[from] lifeline_schema::SchemaError),
    #[error("manifest error: {0}")]
    Manifest(#[from] lifeline_schema::ManifestError),
    #[error("store error: {0}")]
    Store(#[from] lifeline_store::StoreError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<InvalidTransition<State, EventKind>> for CoreError {
    fn from(e: InvalidTransition<State, EventKind>) -> Self {
        CoreError::InvalidTransition {
            state: e.state,
            event: e.event,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_transition_converts() {
        let err: CoreError = InvalidTransition {
            state: State::Init,
            event: EventKind::Start,
        }
        .into();
        assert_eq!(err.to_string(), "invalid event START at state INIT");
    }

    #[test]
    fn unsupported_config_update_names_target() {
        let err = CoreError::UnsupportedConfigUpdate {
            target: "HDFS/DATANODE@h1".to_owned(),
            state: State::Uninstalled,
        };
        let msg = err.to_string();
        assert!(msg.contains("HDFS/DATANODE@h1"));
        assert!(msg.contains("UNINSTALLED"));
    }

    #[test]
    fn store_error_wraps() {
        let err: CoreError = lifeline_store::StoreError::NotFound("x".to_owned()).into();
        assert!(err.to_string().starts_with("store error"));
    }
}
