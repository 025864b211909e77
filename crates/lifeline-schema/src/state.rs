//! Lifecycle states of a host component and the pure predicates over them.

use crate::SchemaError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum State {
    Init,
    Installing,
    InstallFailed,
    Installed,
    Starting,
    Started,
    Stopping,
    Uninstalling,
    Uninstalled,
    WipingOut,
    Upgrading,
    Maintenance,
    Unknown,
}

impl State {
    pub const ALL: [State; 13] = [
        State::Init,
        State::Installing,
        State::InstallFailed,
        State::Installed,
        State::Starting,
        State::Started,
        State::Stopping,
        State::Uninstalling,
        State::Uninstalled,
        State::WipingOut,
        State::Upgrading,
        State::Maintenance,
        State::Unknown,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            State::Init => "INIT",
            State::Installing => "INSTALLING",
            State::InstallFailed => "INSTALL_FAILED",
            State::Installed => "INSTALLED",
            State::Starting => "STARTING",
            State::Started => "STARTED",
            State::Stopping => "STOPPING",
            State::Uninstalling => "UNINSTALLING",
            State::Uninstalled => "UNINSTALLED",
            State::WipingOut => "WIPING_OUT",
            State::Upgrading => "UPGRADING",
            State::Maintenance => "MAINTENANCE",
            State::Unknown => "UNKNOWN",
        }
    }

    /// Whether an orchestrator may ask for this state as a target.
    pub fn is_valid_desired_state(self) -> bool {
        matches!(
            self,
            State::Init
                | State::Installed
                | State::Started
                | State::Uninstalled
                | State::Maintenance
        )
    }

    /// Client-only components never run, so they never start or stop.
    pub fn is_valid_client_component_state(self) -> bool {
        !matches!(self, State::Starting | State::Started | State::Stopping)
    }

    /// Whether a host component in this state may be deleted.
    pub fn is_removable_state(self) -> bool {
        matches!(
            self,
            State::Init
                | State::Installing
                | State::Installed
                | State::InstallFailed
                | State::Uninstalled
                | State::Unknown
                | State::Maintenance
        )
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for State {
    type Err = SchemaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_uppercase().replace('-', "_");
        State::ALL
            .into_iter()
            .find(|state| state.as_str() == wanted)
            .ok_or_else(|| SchemaError::InvalidState(s.to_owned()))
    }
}

/// Whether `current` may directly precede `desired` when a caller assigns
/// state without going through the event machine.
///
/// The UNINSTALLED and INIT targets accumulate the predecessor sets of the
/// targets listed after them (UNINSTALLED also admits INIT's and
/// MAINTENANCE's predecessors, INIT also admits MAINTENANCE's). This is the
/// long-standing table and is kept as is.
pub fn is_valid_state_transition(desired: State, current: State) -> bool {
    let init_predecessors = || {
        matches!(
            current,
            State::Uninstalled | State::Init | State::WipingOut
        )
    };
    let maintenance_predecessors = || matches!(current, State::Installed | State::Unknown);

    match desired {
        State::Installed => matches!(
            current,
            State::Init
                | State::Uninstalled
                | State::Installed
                | State::Installing
                | State::Started
                | State::InstallFailed
                | State::Upgrading
                | State::Stopping
                | State::Unknown
                | State::Maintenance
        ),
        State::Started => matches!(
            current,
            State::Installed | State::Starting | State::Started
        ),
        State::Uninstalled => {
            matches!(
                current,
                State::Installed | State::Uninstalled | State::Uninstalling
            ) || init_predecessors()
                || maintenance_predecessors()
        }
        State::Init => init_predecessors() || maintenance_predecessors(),
        State::Maintenance => maintenance_predecessors(),
        _ => false,
    }
}

/// Stricter table deciding whether a change of desired state is sanctioned
/// given the current state. Only INSTALLED and STARTED are ever accepted.
pub fn is_valid_desired_state_transition(desired: State, current: State) -> bool {
    match desired {
        State::Installed => matches!(
            current,
            State::Init | State::Uninstalled | State::Installed | State::Started | State::Stopping
        ),
        State::Started => matches!(current, State::Installed | State::Started),
        _ => false,
    }
}

/// Desired states under which configuration may be changed.
pub fn is_config_update_allowed(desired: State) -> bool {
    matches!(desired, State::Init | State::Installed | State::Started)
}
