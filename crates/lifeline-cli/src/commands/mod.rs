pub mod completions;
pub mod dump;
pub mod event;
pub mod init;
pub mod inspect;
pub mod list;
pub mod remove;
pub mod set_desired;
pub mod set_state;

use lifeline_core::{Cluster, ServiceComponentHost, StoreLock, TagStalenessHelper};
use lifeline_schema::parse_manifest_file;
use lifeline_store::{FileStore, StoreLayout};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub const EXIT_SUCCESS: u8 = 0;
pub const EXIT_FAILURE: u8 = 1;
pub const EXIT_MANIFEST_ERROR: u8 = 2;
pub const EXIT_STORE_ERROR: u8 = 3;

/// Where the store lives and which manifest describes the cluster.
pub struct Session {
    store_path: PathBuf,
    manifest_path: PathBuf,
}

impl Session {
    pub fn new(store_path: PathBuf, manifest_path: PathBuf) -> Self {
        Self {
            store_path,
            manifest_path,
        }
    }

    pub fn store_path(&self) -> &Path {
        &self.store_path
    }

    /// Serialize mutating invocations against the same store.
    pub fn lock(&self) -> Result<StoreLock, String> {
        let layout = StoreLayout::new(&self.store_path);
        StoreLock::acquire(&layout.lock_file()).map_err(|e| format!("store lock: {e}"))
    }

    /// Parse the manifest, open the store and rebuild the cluster from both.
    pub fn load(&self) -> Result<Cluster, String> {
        let manifest = parse_manifest_file(&self.manifest_path).map_err(|e| {
            let msg = e.to_string();
            if msg.starts_with("manifest error:") {
                msg
            } else {
                format!("manifest error: {msg}")
            }
        })?;
        let store = FileStore::open(&self.store_path).map_err(|e| format!("store error: {e}"))?;
        Cluster::from_manifest(&manifest, Arc::new(store), Arc::new(TagStalenessHelper))
            .map_err(|e| e.to_string())
    }
}

/// A host component addressed as `SERVICE/COMPONENT@HOST`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub service: String,
    pub component: String,
    pub host: String,
}

impl Target {
    pub fn parse(input: &str) -> Result<Self, String> {
        let invalid = || format!("invalid target '{input}', expected SERVICE/COMPONENT@HOST");
        let (path, host) = input.split_once('@').ok_or_else(invalid)?;
        let (service, component) = path.split_once('/').ok_or_else(invalid)?;
        if service.is_empty() || component.is_empty() || host.is_empty() {
            return Err(invalid());
        }
        Ok(Self {
            service: service.to_owned(),
            component: component.to_owned(),
            host: host.to_owned(),
        })
    }

    pub fn resolve(&self, cluster: &Cluster) -> Result<Arc<ServiceComponentHost>, String> {
        cluster
            .host_component(&self.service, &self.component, &self.host)
            .map_err(|e| e.to_string())
    }

    /// Resolve and refuse host components that `init` has not persisted yet.
    pub fn resolve_persisted(&self, cluster: &Cluster) -> Result<Arc<ServiceComponentHost>, String> {
        let sch = self.resolve(cluster)?;
        if !sch.is_persisted() {
            return Err(format!(
                "{self} is not initialized in the store; run 'lifeline init' first"
            ));
        }
        Ok(sch)
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}@{}", self.service, self.component, self.host)
    }
}

pub fn json_pretty(value: &impl serde::Serialize) -> Result<String, String> {
    serde_json::to_string_pretty(value).map_err(|e| format!("JSON serialization failed: {e}"))
}

pub fn colorize_state(state: &str) -> String {
    use console::Style;
    match state {
        "STARTED" => Style::new().green().bold().apply_to(state).to_string(),
        "INSTALLED" => Style::new().green().apply_to(state).to_string(),
        "INSTALLING" | "STARTING" | "STOPPING" | "UPGRADING" | "UNINSTALLING" | "WIPING_OUT" => {
            Style::new().cyan().apply_to(state).to_string()
        }
        "INSTALL_FAILED" => Style::new().red().bold().apply_to(state).to_string(),
        "MAINTENANCE" => Style::new().blue().apply_to(state).to_string(),
        "INIT" | "UNINSTALLED" | "UNKNOWN" => Style::new().dim().apply_to(state).to_string(),
        other => other.to_owned(),
    }
}
