//! Lifecycle events delivered to a host component.

use crate::configs::ConfigVersions;
use crate::types::{ComponentName, HostName, StackId};
use crate::SchemaError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventKind {
    Install,
    Start,
    Stop,
    Uninstall,
    Wipeout,
    Upgrade,
    OpInProgress,
    OpSucceeded,
    OpFailed,
    OpRestart,
    Started,
    Stopped,
    Maintenance,
    Restore,
}

impl EventKind {
    pub const ALL: [EventKind; 14] = [
        EventKind::Install,
        EventKind::Start,
        EventKind::Stop,
        EventKind::Uninstall,
        EventKind::Wipeout,
        EventKind::Upgrade,
        EventKind::OpInProgress,
        EventKind::OpSucceeded,
        EventKind::OpFailed,
        EventKind::OpRestart,
        EventKind::Started,
        EventKind::Stopped,
        EventKind::Maintenance,
        EventKind::Restore,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::Install => "INSTALL",
            EventKind::Start => "START",
            EventKind::Stop => "STOP",
            EventKind::Uninstall => "UNINSTALL",
            EventKind::Wipeout => "WIPEOUT",
            EventKind::Upgrade => "UPGRADE",
            EventKind::OpInProgress => "OP_IN_PROGRESS",
            EventKind::OpSucceeded => "OP_SUCCEEDED",
            EventKind::OpFailed => "OP_FAILED",
            EventKind::OpRestart => "OP_RESTART",
            EventKind::Started => "STARTED",
            EventKind::Stopped => "STOPPED",
            EventKind::Maintenance => "MAINTENANCE",
            EventKind::Restore => "RESTORE",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventKind {
    type Err = SchemaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_uppercase().replace('-', "_");
        EventKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == wanted)
            .ok_or_else(|| SchemaError::InvalidEventKind(s.to_owned()))
    }
}

/// Kind-specific event payload. Only INSTALL and START carry data.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventPayload {
    /// Install toward the given stack version.
    Install { stack_id: StackId },
    /// Start with the live configuration versions to apply.
    Start { configs: ConfigVersions },
    Stop,
    Uninstall,
    Wipeout,
    Upgrade,
    OpInProgress,
    OpSucceeded,
    OpFailed,
    OpRestart,
    Started,
    Stopped,
    Maintenance,
    Restore,
}

impl EventPayload {
    pub fn kind(&self) -> EventKind {
        match self {
            EventPayload::Install { .. } => EventKind::Install,
            EventPayload::Start { .. } => EventKind::Start,
            EventPayload::Stop => EventKind::Stop,
            EventPayload::Uninstall => EventKind::Uninstall,
            EventPayload::Wipeout => EventKind::Wipeout,
            EventPayload::Upgrade => EventKind::Upgrade,
            EventPayload::OpInProgress => EventKind::OpInProgress,
            EventPayload::OpSucceeded => EventKind::OpSucceeded,
            EventPayload::OpFailed => EventKind::OpFailed,
            EventPayload::OpRestart => EventKind::OpRestart,
            EventPayload::Started => EventKind::Started,
            EventPayload::Stopped => EventKind::Stopped,
            EventPayload::Maintenance => EventKind::Maintenance,
            EventPayload::Restore => EventKind::Restore,
        }
    }

    /// Payload for a kind that carries no data.
    ///
    /// INSTALL and START need their data and are built with
    /// [`EventPayload::Install`] / [`EventPayload::Start`] directly.
    pub fn bare(kind: EventKind) -> Result<Self, SchemaError> {
        Ok(match kind {
            EventKind::Install | EventKind::Start => {
                return Err(SchemaError::MissingPayload(kind));
            }
            EventKind::Stop => EventPayload::Stop,
            EventKind::Uninstall => EventPayload::Uninstall,
            EventKind::Wipeout => EventPayload::Wipeout,
            EventKind::Upgrade => EventPayload::Upgrade,
            EventKind::OpInProgress => EventPayload::OpInProgress,
            EventKind::OpSucceeded => EventPayload::OpSucceeded,
            EventKind::OpFailed => EventPayload::OpFailed,
            EventKind::OpRestart => EventPayload::OpRestart,
            EventKind::Started => EventPayload::Started,
            EventKind::Stopped => EventPayload::Stopped,
            EventKind::Maintenance => EventPayload::Maintenance,
            EventKind::Restore => EventPayload::Restore,
        })
    }
}

/// An immutable lifecycle trigger addressed to one (component, host) pair.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HostComponentEvent {
    pub component_name: ComponentName,
    pub host_name: HostName,
    /// Operation timestamp in milliseconds since the Unix epoch.
    pub op_timestamp: i64,
    pub payload: EventPayload,
}

impl HostComponentEvent {
    pub fn new(
        component_name: impl Into<ComponentName>,
        host_name: impl Into<HostName>,
        op_timestamp: i64,
        payload: EventPayload,
    ) -> Self {
        Self {
            component_name: component_name.into(),
            host_name: host_name.into(),
            op_timestamp,
            payload,
        }
    }

    pub fn install(
        component_name: impl Into<ComponentName>,
        host_name: impl Into<HostName>,
        op_timestamp: i64,
        stack_id: StackId,
    ) -> Self {
        Self::new(
            component_name,
            host_name,
            op_timestamp,
            EventPayload::Install { stack_id },
        )
    }

    pub fn start(
        component_name: impl Into<ComponentName>,
        host_name: impl Into<HostName>,
        op_timestamp: i64,
        configs: ConfigVersions,
    ) -> Self {
        Self::new(
            component_name,
            host_name,
            op_timestamp,
            EventPayload::Start { configs },
        )
    }

    /// Event of a kind that carries no payload.
    pub fn of_kind(
        kind: EventKind,
        component_name: impl Into<ComponentName>,
        host_name: impl Into<HostName>,
        op_timestamp: i64,
    ) -> Result<Self, SchemaError> {
        Ok(Self::new(
            component_name,
            host_name,
            op_timestamp,
            EventPayload::bare(kind)?,
        ))
    }

    pub fn kind(&self) -> EventKind {
        self.payload.kind()
    }
}

impl fmt::Display for HostComponentEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} component={} host={} ts={}",
            self.kind(),
            self.component_name,
            self.host_name,
            self.op_timestamp
        )?;
        match &self.payload {
            EventPayload::Install { stack_id } => write!(f, " stack={stack_id}"),
            EventPayload::Start { configs } => write!(f, " configs={}", configs.len()),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_kind_matches() {
        let ev = HostComponentEvent::install("NAMENODE", "h1", 10, StackId::new("HDP", "1.3.0"));
        assert_eq!(ev.kind(), EventKind::Install);
        let ev = HostComponentEvent::start("NAMENODE", "h1", 11, ConfigVersions::new());
        assert_eq!(ev.kind(), EventKind::Start);
    }

    #[test]
    fn bare_payload_for_every_dataless_kind() {
        for kind in EventKind::ALL {
            match EventPayload::bare(kind) {
                Ok(payload) => assert_eq!(payload.kind(), kind),
                Err(SchemaError::MissingPayload(k)) => {
                    assert!(matches!(k, EventKind::Install | EventKind::Start));
                }
                Err(e) => panic!("unexpected error: {e}"),
            }
        }
    }

    #[test]
    fn of_kind_rejects_install_without_stack() {
        assert!(HostComponentEvent::of_kind(EventKind::Install, "DATANODE", "h1", 1).is_err());
        let ev = HostComponentEvent::of_kind(EventKind::OpSucceeded, "DATANODE", "h1", 1).unwrap();
        assert_eq!(ev.kind(), EventKind::OpSucceeded);
        assert_eq!(ev.host_name, "h1");
    }

    #[test]
    fn event_kind_parses_loosely() {
        assert_eq!("op_succeeded".parse::<EventKind>().unwrap(), EventKind::OpSucceeded);
        assert_eq!("OP-IN-PROGRESS".parse::<EventKind>().unwrap(), EventKind::OpInProgress);
        assert!("BOOT".parse::<EventKind>().is_err());
    }

    #[test]
    fn display_includes_payload_summary() {
        let ev = HostComponentEvent::install("NAMENODE", "h1", 5, StackId::new("HDP", "1.3.0"));
        let text = ev.to_string();
        assert!(text.starts_with("INSTALL"));
        assert!(text.contains("stack=HDP-1.3.0"));
    }

    #[test]
    fn payload_serializes_with_kind_tag() {
        let mut configs = ConfigVersions::new();
        configs.insert("hdfs-site".to_owned(), "v1".to_owned());
        let payload = EventPayload::Start { configs };
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["kind"], "START");
        assert_eq!(json["configs"]["hdfs-site"], "v1");
    }
}
