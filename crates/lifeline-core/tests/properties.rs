//! Property tests: random event sequences against the lifecycle entity.

use lifeline_core::{Cluster, ServiceComponentHost, TagStalenessHelper, CLIENT_TOPOLOGY, DAEMON_TOPOLOGY};
use lifeline_schema::{ConfigVersions, EventKind, HostComponentEvent, StackId, State};
use lifeline_store::{ComponentStore, MemoryStore};
use proptest::prelude::*;
use std::sync::Arc;

fn event_for(kind: EventKind, ts: i64) -> HostComponentEvent {
    match kind {
        EventKind::Install => {
            HostComponentEvent::install("COMP", "h1", ts, StackId::new("HDP", "2.0"))
        }
        EventKind::Start => HostComponentEvent::start(
            "COMP",
            "h1",
            ts,
            ConfigVersions::from([("core-site".to_owned(), format!("v{ts}"))]),
        ),
        other => HostComponentEvent::of_kind(other, "COMP", "h1", ts).unwrap(),
    }
}

fn arb_kind() -> impl Strategy<Value = EventKind> {
    prop::sample::select(EventKind::ALL.to_vec())
}

fn arb_state() -> impl Strategy<Value = State> {
    prop::sample::select(State::ALL.to_vec())
}

fn entity(client: bool, store: Arc<MemoryStore>) -> (Cluster, Arc<ServiceComponentHost>) {
    let cluster = Cluster::new(1, "c1", store, Arc::new(TagStalenessHelper));
    cluster.add_host("h1").unwrap();
    let component = cluster
        .add_service("SVC")
        .unwrap()
        .add_component("COMP", client)
        .unwrap();
    let sch = component.add_host_component("h1").unwrap();
    (cluster, sch)
}

proptest! {
    /// Every outcome matches the daemon table; rejected events change nothing.
    #[test]
    fn daemon_follows_its_table(
        start in arb_state(),
        kinds in prop::collection::vec(arb_kind(), 1..40),
    ) {
        let (_cluster, sch) = entity(false, Arc::new(MemoryStore::new()));
        sch.set_state(start).unwrap();

        for (i, kind) in kinds.into_iter().enumerate() {
            let before = sch.state();
            let times_before = sch.last_op_times();
            let expected = DAEMON_TOPOLOGY.target(before, kind);
            match sch.handle_event(&event_for(kind, i as i64 + 1)) {
                Ok(after) => {
                    prop_assert_eq!(Some(after), expected);
                    prop_assert_eq!(sch.state(), after);
                }
                Err(_) => {
                    prop_assert!(expected.is_none());
                    prop_assert_eq!(sch.state(), before);
                    prop_assert_eq!(sch.last_op_times(), times_before);
                }
            }
        }
    }

    /// A client component never reaches a running state through events.
    #[test]
    fn client_never_runs(kinds in prop::collection::vec(arb_kind(), 1..60)) {
        let (_cluster, sch) = entity(true, Arc::new(MemoryStore::new()));
        for (i, kind) in kinds.into_iter().enumerate() {
            let before = sch.state();
            let result = sch.handle_event(&event_for(kind, i as i64 + 1));
            prop_assert_eq!(result.is_ok(), CLIENT_TOPOLOGY.target(before, kind).is_some());
            prop_assert!(sch.state().is_valid_client_component_state());
        }
    }

    /// The stored state record always mirrors the in-memory state.
    #[test]
    fn persisted_state_tracks_memory(kinds in prop::collection::vec(arb_kind(), 1..30)) {
        let store = Arc::new(MemoryStore::new());
        let (_cluster, sch) = entity(false, store.clone());
        sch.persist().unwrap();

        for (i, kind) in kinds.into_iter().enumerate() {
            let _ = sch.handle_event(&event_for(kind, i as i64 + 1));
            let record = store.refresh_state(sch.key()).unwrap();
            prop_assert_eq!(record.current_state, sch.state());
            prop_assert_eq!(record.current_stack_version, sch.stack_version());
        }
    }
}
