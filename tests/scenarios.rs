//! End-to-end scenario tests for `MultiServerCluster`, exercising it purely through its public
//! API with a `TestServerFactory` standing in for a real heartbeat source.

use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use cluster_monitor::{
    description::{
        cluster::ClusterType,
        server::{ServerMetadata, ServerType},
    },
    factory::TestServerFactory,
    ChangeEvent, ChangeListener, ClusterSettings, MultiServerCluster, ServerAddress, ServerDescription,
};

fn addr(host: &str) -> ServerAddress {
    ServerAddress::new(host, None)
}

fn seeded(hosts: &[&str]) -> (MultiServerCluster, Arc<TestServerFactory>) {
    let factory = Arc::new(TestServerFactory::new());
    let settings = ClusterSettings::new(hosts.iter().map(|h| addr(h)).collect()).unwrap();
    (MultiServerCluster::new(settings, factory.clone()), factory)
}

fn notify(cluster: &MultiServerCluster, host: &str, server_type: ServerType, set_name: Option<&str>, hosts: &[&str]) {
    let address = addr(host);
    let server = cluster.get_server(&address).unwrap();
    let description = ServerDescription::new(
        address,
        server_type,
        set_name.map(str::to_string),
        hosts.iter().map(|h| addr(h)).collect(),
        ServerMetadata::default(),
    );
    server.send_notification(description);
}

#[derive(Default)]
struct RecordingListener {
    events: Mutex<Vec<ChangeEvent>>,
}

impl ChangeListener for RecordingListener {
    fn on_change(&self, event: &ChangeEvent) {
        self.events.lock().unwrap().push(event.clone());
    }
}

#[test]
fn unknown_member_notifications_leave_description_unchanged() {
    let (cluster, _factory) = seeded(&["h1"]);
    let before = cluster.description();

    // h2 was never a seed or discovered peer, so the cluster holds no `Server` for it; there is
    // no way to route a notification to an address outside `members` at all, which is exactly
    // the guarantee this test is pinning down.
    assert!(cluster.get_server(&addr("h2")).is_err());
    assert_eq!(cluster.description(), before);
}

#[test]
fn required_cluster_type_stays_pinned_across_incompatible_reports() {
    let factory = Arc::new(TestServerFactory::new());
    let settings = ClusterSettings::new(vec![addr("h1")])
        .unwrap()
        .requiring_cluster_type(ClusterType::ReplicaSet);
    let cluster = MultiServerCluster::new(settings, factory);

    notify(&cluster, "h1", ServerType::StandAlone, None, &[]);

    let description = cluster.description();
    assert!(description.cluster_type == ClusterType::ReplicaSet || description.servers.is_empty());
    assert!(description.server(&addr("h1")).is_none());
}

#[test]
fn at_most_one_primary_survives_concurrent_claims() {
    let (cluster, _factory) = seeded(&["h1", "h2", "h3"]);

    notify(&cluster, "h1", ServerType::ReplicaSetPrimary, Some("rs0"), &["h1", "h2", "h3"]);
    notify(&cluster, "h2", ServerType::ReplicaSetPrimary, Some("rs0"), &["h1", "h2", "h3"]);
    notify(&cluster, "h3", ServerType::ReplicaSetSecondary, Some("rs0"), &["h1", "h2", "h3"]);

    let description = cluster.description();
    let primaries = description
        .servers
        .iter()
        .filter(|server| server.server_type == ServerType::ReplicaSetPrimary)
        .count();
    assert_eq!(primaries, 1);
    assert_eq!(
        description.server(&addr("h2")).unwrap().server_type,
        ServerType::ReplicaSetPrimary
    );
}

#[test]
fn change_events_fire_once_per_listener_and_stop_after_removal() {
    let (cluster, _factory) = seeded(&["h1", "h2"]);

    let first = Arc::new(RecordingListener::default());
    let second = Arc::new(RecordingListener::default());
    let first_trait: Arc<dyn ChangeListener> = first.clone();
    let second_trait: Arc<dyn ChangeListener> = second.clone();
    cluster.add_change_listener(first_trait.clone());
    cluster.add_change_listener(second_trait.clone());

    notify(&cluster, "h1", ServerType::ReplicaSetPrimary, Some("rs0"), &["h1", "h2"]);
    cluster.remove_change_listener(&second_trait);
    notify(&cluster, "h2", ServerType::ReplicaSetSecondary, Some("rs0"), &["h1", "h2"]);

    assert_eq!(first.events.lock().unwrap().len(), 2);
    assert_eq!(second.events.lock().unwrap().len(), 1);
}

#[test]
fn closing_the_cluster_wakes_a_blocked_select_server() {
    let (cluster, _factory) = seeded(&["h1"]);

    let blocked = cluster.clone();
    let handle = std::thread::spawn(move || {
        blocked.select_server(&cluster_monitor::selection::AnyServerSelector, Duration::from_secs(5))
    });

    std::thread::sleep(Duration::from_millis(50));
    cluster.close();

    let result = handle.join().unwrap();
    assert!(result.is_err());
}
