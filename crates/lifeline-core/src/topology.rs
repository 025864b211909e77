//! The two host-component lifecycle topologies and their transition actions.
//!
//! Both tables are built once per process and shared read-only by every
//! host component. Daemon components use [`DAEMON_TOPOLOGY`]; client-only
//! components use [`CLIENT_TOPOLOGY`], which has no STARTING, STARTED, or
//! STOPPING states.

use crate::fsm::{StateMachine, Topology};
use crate::CoreError;
use lifeline_schema::{ConfigVersions, EventKind, EventPayload, HostComponentEvent, StackId, State};
use std::sync::LazyLock;

/// Value of an operation timestamp that was never recorded.
pub const NEVER: i64 = -1;

/// Start, end, and last-update times of the most recent operation, in
/// milliseconds since the Unix epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct OpTimes {
    pub last_op_start: i64,
    pub last_op_end: i64,
    pub last_op_last_update: i64,
}

impl Default for OpTimes {
    fn default() -> Self {
        Self {
            last_op_start: NEVER,
            last_op_end: NEVER,
            last_op_last_update: NEVER,
        }
    }
}

impl OpTimes {
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// The part of a host component that transition actions may mutate.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HostComponentData {
    pub op_times: OpTimes,
    pub stack_version: StackId,
    pub live_configs: ConfigVersions,
}

pub type LifecycleTopology =
    Topology<State, EventKind, HostComponentData, HostComponentEvent, CoreError>;
pub type LifecycleMachine =
    StateMachine<State, EventKind, HostComponentData, HostComponentEvent, CoreError>;

/// An operation began: reset the timestamps, record the start, and adopt
/// the stack version (INSTALL) or live configs (START) the event carries.
#[allow(clippy::unnecessary_wraps)]
fn op_started(data: &mut HostComponentData, event: &HostComponentEvent) -> Result<(), CoreError> {
    data.op_times.reset();
    data.op_times.last_op_start = event.op_timestamp;
    match &event.payload {
        EventPayload::Install { stack_id } => data.stack_version = stack_id.clone(),
        EventPayload::Start { configs } => data.live_configs = configs.clone(),
        _ => {}
    }
    Ok(())
}

#[allow(clippy::unnecessary_wraps)]
fn op_in_progress(
    data: &mut HostComponentData,
    event: &HostComponentEvent,
) -> Result<(), CoreError> {
    data.op_times.last_op_last_update = event.op_timestamp;
    Ok(())
}

#[allow(clippy::unnecessary_wraps)]
fn op_completed(data: &mut HostComponentData, event: &HostComponentEvent) -> Result<(), CoreError> {
    data.op_times.last_op_end = event.op_timestamp;
    data.op_times.last_op_last_update = event.op_timestamp;
    data.op_times.last_op_start = NEVER;
    Ok(())
}

pub static DAEMON_TOPOLOGY: LazyLock<LifecycleTopology> = LazyLock::new(|| {
    use EventKind as K;
    use State as S;

    Topology::builder("daemon", S::Init)
        .add_transition(S::Init, S::Installing, K::Install, op_started)
        .add_transition(S::Installing, S::Installed, K::OpSucceeded, op_completed)
        .add_transition(S::Installed, S::Installed, K::OpSucceeded, op_completed)
        .add_transition(S::Installing, S::Installing, K::OpInProgress, op_in_progress)
        .add_transition(S::Installing, S::Installing, K::Install, op_started)
        .add_transition(S::Installing, S::InstallFailed, K::OpFailed, op_completed)
        .add_transition(S::InstallFailed, S::Installing, K::OpRestart, op_started)
        .add_transition(S::InstallFailed, S::Installing, K::Install, op_started)
        .add_transition(S::Installed, S::Starting, K::Start, op_started)
        .add_transition(S::Installed, S::Uninstalling, K::Uninstall, op_started)
        .add_transition(S::Installed, S::Installing, K::Install, op_started)
        .add_transition(S::Installed, S::Stopping, K::Stop, op_started)
        .add_transition(S::Installed, S::Upgrading, K::Upgrade, op_started)
        .add_transition(S::Installed, S::Installed, K::OpInProgress, op_in_progress)
        .add_transition(S::Installed, S::Started, K::Started, op_completed)
        .add_transition(S::Installed, S::Installed, K::Stopped, op_completed)
        .add_transition(S::Starting, S::Starting, K::OpInProgress, op_in_progress)
        .add_transition(S::Starting, S::Starting, K::Start, op_started)
        .add_transition(S::Starting, S::Started, K::Started, op_completed)
        .add_transition(S::Starting, S::Installed, K::OpFailed, op_completed)
        // restart shortcut
        .add_transition(S::Installed, S::Starting, K::OpRestart, op_started)
        .add_transition(S::Started, S::Started, K::Started, op_completed)
        .add_transition(S::Started, S::Stopping, K::Stop, op_started)
        .add_transition(S::Started, S::Started, K::OpInProgress, op_in_progress)
        .add_transition(S::Started, S::Installed, K::Stopped, op_completed)
        .add_transition(S::Stopping, S::Stopping, K::OpInProgress, op_in_progress)
        .add_transition(S::Stopping, S::Installed, K::Stopped, op_completed)
        .add_transition(S::Stopping, S::Started, K::OpFailed, op_completed)
        .add_transition(S::Started, S::Stopping, K::OpRestart, op_started)
        .add_transition(S::Uninstalling, S::Uninstalling, K::OpInProgress, op_in_progress)
        .add_transition(S::Uninstalling, S::Uninstalled, K::OpSucceeded, op_completed)
        .add_transition(S::Uninstalling, S::Uninstalling, K::OpFailed, op_completed)
        .add_transition(S::Upgrading, S::Upgrading, K::OpInProgress, op_in_progress)
        .add_transition(S::Upgrading, S::Installed, K::OpSucceeded, op_completed)
        .add_transition(S::Upgrading, S::Upgrading, K::OpFailed, op_completed)
        .add_transition(S::Upgrading, S::Upgrading, K::Upgrade, op_started)
        // replaces the rule above
        .add_transition(S::Upgrading, S::Upgrading, K::Upgrade, op_in_progress)
        .add_transition(S::Uninstalling, S::Uninstalling, K::OpRestart, op_started)
        .add_transition(S::Uninstalling, S::Uninstalling, K::Uninstall, op_started)
        .add_transition(S::Uninstalled, S::Installing, K::Install, op_started)
        .add_transition(S::Uninstalled, S::WipingOut, K::Wipeout, op_started)
        .add_transition(S::WipingOut, S::WipingOut, K::OpInProgress, op_in_progress)
        .add_transition(S::WipingOut, S::Init, K::OpSucceeded, op_completed)
        .add_transition(S::WipingOut, S::WipingOut, K::OpFailed, op_completed)
        .add_transition(S::WipingOut, S::WipingOut, K::OpRestart, op_started)
        .add_transition(S::WipingOut, S::WipingOut, K::Wipeout, op_started)
        .add_transition(S::Installed, S::Maintenance, K::Maintenance, op_completed)
        .add_transition(S::Maintenance, S::Maintenance, K::Maintenance, op_completed)
        .add_transition(S::Maintenance, S::Installed, K::Restore, op_completed)
        .add_transition(S::Unknown, S::Maintenance, K::Maintenance, op_completed)
        .build()
});

pub static CLIENT_TOPOLOGY: LazyLock<LifecycleTopology> = LazyLock::new(|| {
    use EventKind as K;
    use State as S;

    Topology::builder("client", S::Init)
        .add_transition(S::Init, S::Installing, K::Install, op_started)
        .add_transition(S::Installing, S::Installed, K::OpSucceeded, op_completed)
        .add_transition(S::Installing, S::Installing, K::Install, op_started)
        .add_transition(S::Installing, S::Installing, K::OpInProgress, op_in_progress)
        .add_transition(S::Installing, S::InstallFailed, K::OpFailed, op_completed)
        .add_transition(S::InstallFailed, S::Installing, K::OpRestart, op_started)
        .add_transition(S::InstallFailed, S::Installing, K::Install, op_started)
        .add_transition(S::Installed, S::Installed, K::OpSucceeded, op_completed)
        .add_transition(S::Installed, S::Uninstalling, K::Uninstall, op_started)
        .add_transition(S::Installed, S::Installing, K::Install, op_started)
        .add_transition(S::Installed, S::Upgrading, K::Upgrade, op_started)
        .add_transition(S::Upgrading, S::Upgrading, K::OpInProgress, op_in_progress)
        .add_transition(S::Upgrading, S::Installed, K::OpSucceeded, op_completed)
        .add_transition(S::Upgrading, S::Upgrading, K::OpFailed, op_completed)
        .add_transition(S::Upgrading, S::Upgrading, K::Upgrade, op_started)
        .add_transition(S::Upgrading, S::Upgrading, K::Upgrade, op_in_progress)
        .add_transition(S::Uninstalling, S::Uninstalling, K::OpInProgress, op_in_progress)
        .add_transition(S::Uninstalling, S::Uninstalled, K::OpSucceeded, op_completed)
        .add_transition(S::Uninstalling, S::Uninstalling, K::OpFailed, op_completed)
        .add_transition(S::Uninstalling, S::Uninstalling, K::OpRestart, op_started)
        .add_transition(S::Uninstalling, S::Uninstalling, K::Uninstall, op_started)
        .add_transition(S::Uninstalled, S::Installing, K::Install, op_started)
        .add_transition(S::Uninstalled, S::WipingOut, K::Wipeout, op_started)
        .add_transition(S::WipingOut, S::WipingOut, K::OpInProgress, op_in_progress)
        .add_transition(S::WipingOut, S::Init, K::OpSucceeded, op_completed)
        .add_transition(S::WipingOut, S::WipingOut, K::OpFailed, op_completed)
        .add_transition(S::WipingOut, S::WipingOut, K::OpRestart, op_started)
        .add_transition(S::WipingOut, S::WipingOut, K::Wipeout, op_started)
        .build()
});

/// Topology for a component, chosen once by its client-only flag.
pub fn topology_for(client_only: bool) -> &'static LifecycleTopology {
    if client_only {
        &CLIENT_TOPOLOGY
    } else {
        &DAEMON_TOPOLOGY
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(kind: EventKind, ts: i64) -> HostComponentEvent {
        match kind {
            EventKind::Install => {
                HostComponentEvent::install("DATANODE", "h1", ts, StackId::new("HDP", "1.3.0"))
            }
            EventKind::Start => {
                let configs = ConfigVersions::from([("hdfs-site".to_owned(), "v1".to_owned())]);
                HostComponentEvent::start("DATANODE", "h1", ts, configs)
            }
            _ => HostComponentEvent::of_kind(kind, "DATANODE", "h1", ts).unwrap(),
        }
    }

    #[test]
    fn daemon_rule_count() {
        // 50 registrations, one of which replaces another
        assert_eq!(DAEMON_TOPOLOGY.len(), 49);
    }

    #[test]
    fn client_rule_count() {
        assert_eq!(CLIENT_TOPOLOGY.len(), 27);
    }

    #[test]
    fn client_topology_never_runs() {
        for state in CLIENT_TOPOLOGY.states() {
            assert!(
                state.is_valid_client_component_state(),
                "client topology reaches {state}"
            );
        }
    }

    #[test]
    fn client_rules_are_a_subset_of_daemon_rules() {
        for state in State::ALL {
            for kind in EventKind::ALL {
                if let Some(to) = CLIENT_TOPOLOGY.target(state, kind) {
                    assert_eq!(DAEMON_TOPOLOGY.target(state, kind), Some(to));
                }
            }
        }
    }

    #[test]
    fn restart_shortcut_exists_only_for_daemons() {
        assert_eq!(
            DAEMON_TOPOLOGY.target(State::Installed, EventKind::OpRestart),
            Some(State::Starting)
        );
        assert_eq!(
            CLIENT_TOPOLOGY.target(State::Installed, EventKind::OpRestart),
            None
        );
    }

    #[test]
    fn install_adopts_stack_version() {
        let mut machine = LifecycleMachine::new(&DAEMON_TOPOLOGY);
        let mut data = HostComponentData::default();
        machine
            .do_transition(&mut data, EventKind::Install, &event(EventKind::Install, 10))
            .unwrap();
        assert_eq!(machine.current_state(), State::Installing);
        assert_eq!(data.stack_version, StackId::new("HDP", "1.3.0"));
        assert_eq!(
            data.op_times,
            OpTimes {
                last_op_start: 10,
                last_op_end: NEVER,
                last_op_last_update: NEVER,
            }
        );
    }

    #[test]
    fn start_adopts_live_configs() {
        let mut machine = LifecycleMachine::with_state(&DAEMON_TOPOLOGY, State::Installed);
        let mut data = HostComponentData::default();
        machine
            .do_transition(&mut data, EventKind::Start, &event(EventKind::Start, 20))
            .unwrap();
        assert_eq!(machine.current_state(), State::Starting);
        assert_eq!(data.live_configs["hdfs-site"], "v1");
    }

    #[test]
    fn completion_resets_start_time() {
        let mut machine = LifecycleMachine::new(&DAEMON_TOPOLOGY);
        let mut data = HostComponentData::default();
        machine
            .do_transition(&mut data, EventKind::Install, &event(EventKind::Install, 10))
            .unwrap();
        machine
            .do_transition(
                &mut data,
                EventKind::OpSucceeded,
                &event(EventKind::OpSucceeded, 30),
            )
            .unwrap();
        assert_eq!(machine.current_state(), State::Installed);
        assert_eq!(data.op_times.last_op_start, NEVER);
        assert_eq!(data.op_times.last_op_end, 30);
        assert_eq!(data.op_times.last_op_last_update, 30);
    }

    #[test]
    fn progress_touches_only_last_update() {
        let mut machine = LifecycleMachine::new(&DAEMON_TOPOLOGY);
        let mut data = HostComponentData::default();
        machine
            .do_transition(&mut data, EventKind::Install, &event(EventKind::Install, 10))
            .unwrap();
        machine
            .do_transition(
                &mut data,
                EventKind::OpInProgress,
                &event(EventKind::OpInProgress, 15),
            )
            .unwrap();
        assert_eq!(data.op_times.last_op_start, 10);
        assert_eq!(data.op_times.last_op_end, NEVER);
        assert_eq!(data.op_times.last_op_last_update, 15);
    }

    #[test]
    fn repeated_upgrade_only_updates_progress() {
        let mut machine = LifecycleMachine::with_state(&DAEMON_TOPOLOGY, State::Upgrading);
        let mut data = HostComponentData::default();
        data.op_times.last_op_start = 5;
        machine
            .do_transition(&mut data, EventKind::Upgrade, &event(EventKind::Upgrade, 40))
            .unwrap();
        assert_eq!(data.op_times.last_op_start, 5);
        assert_eq!(data.op_times.last_op_last_update, 40);
    }

    #[test]
    fn wipeout_returns_to_init() {
        let mut machine = LifecycleMachine::with_state(&CLIENT_TOPOLOGY, State::Uninstalled);
        let mut data = HostComponentData::default();
        for kind in [EventKind::Wipeout, EventKind::OpSucceeded] {
            machine
                .do_transition(&mut data, kind, &event(kind, 1))
                .unwrap();
        }
        assert_eq!(machine.current_state(), State::Init);
    }

    #[test]
    fn topology_for_picks_by_flag() {
        assert_eq!(topology_for(true).name(), "client");
        assert_eq!(topology_for(false).name(), "daemon");
    }
}
