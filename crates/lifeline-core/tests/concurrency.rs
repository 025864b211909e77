use lifeline_core::{Cluster, CoreError, ServiceComponentHost, TagStalenessHelper};
use lifeline_schema::{ConfigVersions, EventKind, HostComponentEvent, StackId, State};
use lifeline_store::{
    ComponentStore, ConfigMappingRecord, HostComponentDesiredStateRecord, HostComponentKey,
    HostComponentStateRecord, MappingKind, MemoryStore, StoreError,
};
use parking_lot::Mutex;
use std::sync::{Arc, Barrier};
use std::thread;

fn cluster_with_hosts(store: Arc<MemoryStore>, hosts: usize) -> Cluster {
    let cluster = Cluster::new(1, "c1", store, Arc::new(TagStalenessHelper));
    let component = cluster
        .add_service("HDFS")
        .unwrap()
        .add_component("DATANODE", false)
        .unwrap();
    for i in 0..hosts {
        let host = format!("h{i}");
        cluster.add_host(&host).unwrap();
        component.add_host_component(&host).unwrap();
    }
    cluster
}

fn bare(sch: &ServiceComponentHost, kind: EventKind, ts: i64) -> HostComponentEvent {
    HostComponentEvent::of_kind(kind, sch.component_name().as_str(), sch.host_name().as_str(), ts)
        .unwrap()
}

#[test]
fn racing_progress_and_completion_land_in_a_table_state() {
    for round in 0..50 {
        let cluster = cluster_with_hosts(Arc::new(MemoryStore::new()), 1);
        let sch = cluster.host_component("HDFS", "DATANODE", "h0").unwrap();
        sch.persist().unwrap();
        sch.handle_event(&HostComponentEvent::install(
            "DATANODE",
            "h0",
            1,
            StackId::new("HDP", "2.0"),
        ))
        .unwrap();

        let barrier = Arc::new(Barrier::new(2));
        let handles: Vec<_> = [EventKind::OpInProgress, EventKind::OpSucceeded]
            .into_iter()
            .map(|kind| {
                let sch = Arc::clone(&sch);
                let b = Arc::clone(&barrier);
                thread::spawn(move || {
                    let event = bare(&sch, kind, 10);
                    b.wait();
                    sch.handle_event(&event)
                })
            })
            .collect();
        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        // INSTALLED accepts OP_IN_PROGRESS too, so either order succeeds.
        assert!(results.iter().all(Result::is_ok), "round {round}");
        assert_eq!(sch.state(), State::Installed, "round {round}");
        let stored = cluster
            .context()
            .bridge()
            .store()
            .refresh_state(sch.key())
            .unwrap();
        assert_eq!(stored.current_state, State::Installed);
    }
}

#[test]
fn parallel_hosts_progress_independently() {
    let store = Arc::new(MemoryStore::new());
    let cluster = Arc::new(cluster_with_hosts(store.clone(), 8));
    cluster.persist_all().unwrap();

    let barrier = Arc::new(Barrier::new(8));
    let handles: Vec<_> = cluster
        .host_components()
        .into_iter()
        .map(|sch| {
            let b = Arc::clone(&barrier);
            thread::spawn(move || {
                b.wait();
                let install = HostComponentEvent::install(
                    "DATANODE",
                    sch.host_name().as_str(),
                    1,
                    StackId::new("HDP", "2.0"),
                );
                sch.handle_event(&install).unwrap();
                for ts in 2..20 {
                    sch.handle_event(&bare(&sch, EventKind::OpInProgress, ts)).unwrap();
                }
                sch.handle_event(&bare(&sch, EventKind::OpSucceeded, 20)).unwrap();
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    for sch in cluster.host_components() {
        assert_eq!(sch.state(), State::Installed);
        assert_eq!(sch.last_op_times().last_op_end, 20);
    }
    let stored = store.list_states(1).unwrap();
    assert_eq!(stored.len(), 8);
    assert!(stored.iter().all(|r| r.current_state == State::Installed));
}

#[test]
fn delete_while_readers_are_active() {
    let store = Arc::new(MemoryStore::new());
    let cluster = Arc::new(cluster_with_hosts(store.clone(), 4));
    cluster.persist_all().unwrap();

    let barrier = Arc::new(Barrier::new(5));
    let mut handles = Vec::new();
    for sch in cluster.host_components() {
        let b = Arc::clone(&barrier);
        handles.push(thread::spawn(move || {
            b.wait();
            for _ in 0..200 {
                let _ = sch.to_response();
                let _ = sch.desired_configs();
            }
        }));
    }
    let deleter = {
        let cluster = Arc::clone(&cluster);
        let b = Arc::clone(&barrier);
        thread::spawn(move || {
            b.wait();
            for i in 0..4 {
                cluster
                    .remove_host_component("HDFS", "DATANODE", &format!("h{i}"))
                    .unwrap();
            }
        })
    };
    deleter.join().unwrap();
    for h in handles {
        h.join().unwrap();
    }

    assert!(cluster.host_components().is_empty());
    assert_eq!(store.state_count(), 0);
}

/// Memory store that notes the stored state of every record it deletes.
#[derive(Default)]
struct RemovalWitness {
    inner: MemoryStore,
    removed_in: Mutex<Vec<State>>,
}

impl ComponentStore for RemovalWitness {
    fn create_state(&self, record: &HostComponentStateRecord) -> Result<(), StoreError> {
        self.inner.create_state(record)
    }

    fn merge_state(&self, record: &HostComponentStateRecord) -> Result<(), StoreError> {
        self.inner.merge_state(record)
    }

    fn find_state(
        &self,
        key: &HostComponentKey,
    ) -> Result<Option<HostComponentStateRecord>, StoreError> {
        self.inner.find_state(key)
    }

    fn remove_state(&self, key: &HostComponentKey) -> Result<(), StoreError> {
        if let Some(record) = self.inner.find_state(key)? {
            self.removed_in.lock().push(record.current_state);
        }
        self.inner.remove_state(key)
    }

    fn list_states(&self, cluster_id: i64) -> Result<Vec<HostComponentStateRecord>, StoreError> {
        self.inner.list_states(cluster_id)
    }

    fn create_desired(&self, record: &HostComponentDesiredStateRecord) -> Result<(), StoreError> {
        self.inner.create_desired(record)
    }

    fn merge_desired(&self, record: &HostComponentDesiredStateRecord) -> Result<(), StoreError> {
        self.inner.merge_desired(record)
    }

    fn find_desired(
        &self,
        key: &HostComponentKey,
    ) -> Result<Option<HostComponentDesiredStateRecord>, StoreError> {
        self.inner.find_desired(key)
    }

    fn remove_desired(&self, key: &HostComponentKey) -> Result<(), StoreError> {
        self.inner.remove_desired(key)
    }

    fn create_mapping(
        &self,
        kind: MappingKind,
        record: &ConfigMappingRecord,
    ) -> Result<(), StoreError> {
        self.inner.create_mapping(kind, record)
    }

    fn merge_mapping(
        &self,
        kind: MappingKind,
        record: &ConfigMappingRecord,
    ) -> Result<(), StoreError> {
        self.inner.merge_mapping(kind, record)
    }

    fn find_mappings(
        &self,
        kind: MappingKind,
        key: &HostComponentKey,
    ) -> Result<Vec<ConfigMappingRecord>, StoreError> {
        self.inner.find_mappings(kind, key)
    }

    fn remove_mapping(
        &self,
        kind: MappingKind,
        key: &HostComponentKey,
        config_type: &str,
    ) -> Result<(), StoreError> {
        self.inner.remove_mapping(kind, key, config_type)
    }
}

#[test]
fn removal_never_deletes_an_entity_started_concurrently() {
    for round in 0..200 {
        let store = Arc::new(RemovalWitness::default());
        let cluster = Arc::new(Cluster::new(
            1,
            "c1",
            store.clone(),
            Arc::new(TagStalenessHelper),
        ));
        cluster.add_host("h0").unwrap();
        let sch = cluster
            .add_service("HDFS")
            .unwrap()
            .add_component("DATANODE", false)
            .unwrap()
            .add_host_component("h0")
            .unwrap();
        sch.set_state(State::Installed).unwrap();
        sch.persist().unwrap();

        let barrier = Arc::new(Barrier::new(2));
        let remover = {
            let cluster = Arc::clone(&cluster);
            let b = Arc::clone(&barrier);
            thread::spawn(move || {
                b.wait();
                cluster.remove_host_component("HDFS", "DATANODE", "h0")
            })
        };
        let starter = {
            let sch = Arc::clone(&sch);
            let b = Arc::clone(&barrier);
            thread::spawn(move || {
                let start = HostComponentEvent::start(
                    "DATANODE",
                    "h0",
                    5,
                    ConfigVersions::from([("core-site".to_owned(), "v1".to_owned())]),
                );
                b.wait();
                sch.handle_event(&start)
            })
        };
        let removed = remover.join().unwrap();
        assert_eq!(starter.join().unwrap().unwrap(), State::Starting);

        let seen = store.removed_in.lock().clone();
        assert!(
            seen.iter().all(|s| s.is_removable_state()),
            "round {round}: removed a record in {seen:?}"
        );
        match removed {
            Ok(()) => assert!(store.find_state(sch.key()).unwrap().is_none()),
            Err(err) => {
                assert!(
                    matches!(err, CoreError::NotRemovable { state: State::Starting, .. }),
                    "round {round}: {err}"
                );
                assert_eq!(
                    store.refresh_state(sch.key()).unwrap().current_state,
                    State::Starting
                );
            }
        }
    }
}
