//! [`MultiServerCluster`]: the state machine that merges server notifications into a topology.

use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, Condvar, Mutex, MutexGuard, Weak},
    time::{Duration, Instant},
};

use crate::{
    address::ServerAddress,
    description::{
        cluster::{ClusterDescription, ClusterType, ConnectionMode},
        server::{ServerDescription, ServerType},
    },
    error::{ErrorKind, Result},
    factory::ServerFactory,
    listener::{ChangeEvent, ChangeListener, ListenerRegistry},
    selection::ServerSelector,
    server::{NotificationSink, Server},
    settings::ClusterSettings,
};

/// What a description implies about the deployment's overall type, used by the required-type
/// filter (§4.2 step 5) and the type-adoption step (§4.2 step 6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Implication {
    /// The description carries no information about cluster type (an `Unknown` server).
    None,
    /// The description implies a specific cluster type.
    Type(ClusterType),
    /// The description is internally inconsistent with the cluster it would imply, a
    /// `StandAlone` report arriving while more than one member is already tracked.
    WrongType,
}

fn implied_cluster_type(description: &ServerDescription, member_count: usize) -> Implication {
    match description.server_type {
        ServerType::ShardRouter => Implication::Type(ClusterType::Sharded),
        ServerType::StandAlone => {
            if member_count == 1 {
                Implication::Type(ClusterType::StandAlone)
            } else {
                Implication::WrongType
            }
        }
        ServerType::Unknown => Implication::None,
        other if other.is_replica_set_member() => Implication::Type(ClusterType::ReplicaSet),
        _ => Implication::None,
    }
}

/// Whether `description` contradicts an already-established `cluster_type` (§4.2 step 7).
fn established_type_mismatch(
    cluster_type: ClusterType,
    description: &ServerDescription,
    replica_set_name: Option<&str>,
) -> bool {
    match cluster_type {
        ClusterType::ReplicaSet => {
            matches!(description.server_type, ServerType::StandAlone | ServerType::ShardRouter)
                || (description.server_type.is_replica_set_member()
                    && description.set_name.as_deref() != replica_set_name)
        }
        ClusterType::Sharded => {
            description.server_type != ServerType::ShardRouter
                && description.server_type != ServerType::Unknown
        }
        ClusterType::StandAlone => {
            description.server_type != ServerType::StandAlone
                && description.server_type != ServerType::Unknown
        }
        ClusterType::Unknown => false,
    }
}

struct ClusterState {
    members: HashMap<ServerAddress, Arc<Server>>,
    description: Arc<ClusterDescription>,
    cluster_type: ClusterType,
    replica_set_name: Option<String>,
    closed: bool,
    listeners: ListenerRegistry,
}

struct Inner {
    settings: ClusterSettings,
    factory: Arc<dyn ServerFactory>,
    state: Mutex<ClusterState>,
    condvar: Condvar,
}

/// Delivers a [`Server`]'s notifications back into the cluster that created it, without the
/// cluster itself being kept alive solely by its members (see §9, "Cyclic ownership").
struct ClusterCallback(Weak<Inner>);

impl NotificationSink for ClusterCallback {
    fn notify(&self, description: ServerDescription) {
        if let Some(inner) = self.0.upgrade() {
            inner.handle_notification(description);
        }
    }
}

impl Inner {
    fn create_member(self: &Arc<Self>, address: ServerAddress) -> Result<Arc<Server>> {
        let sink: Arc<dyn NotificationSink> = Arc::new(ClusterCallback(Arc::downgrade(self)));
        self.factory.create(address, sink)
    }

    fn remove_member(&self, state: &mut ClusterState, address: &ServerAddress) {
        if let Some(server) = state.members.remove(address) {
            tracing::info!(%address, "removing cluster member");
            self.factory.close(&server);
        }
    }

    fn demote_other_primaries(&self, state: &mut ClusterState, new_primary: &ServerAddress) {
        for (address, server) in state.members.iter() {
            if address == new_primary {
                continue;
            }
            if server.description().server_type == ServerType::ReplicaSetPrimary {
                tracing::info!(%address, "demoting superseded primary");
                server.force_description(ServerDescription::unknown(address.clone()));
            }
        }
    }

    fn reconcile_peers(self: &Arc<Self>, state: &mut ClusterState, source: &ServerAddress, hosts: &HashSet<ServerAddress>) {
        for host in hosts {
            if state.members.contains_key(host) {
                continue;
            }
            match self.create_member(host.clone()) {
                Ok(server) => {
                    state.members.insert(host.clone(), server);
                }
                Err(error) => {
                    tracing::warn!(address = %host, %error, "failed to create server for discovered peer");
                }
            }
        }

        // Deliberately does not exempt `source` itself: a seed that reports its peers under a
        // different address (a DNS alias) and omits its own address from that list must be
        // removed the same as any other non-authoritative member, which is what lets alias
        // resolution fall out of this same reconciliation pass instead of needing special-casing.
        let stale: Vec<ServerAddress> = state
            .members
            .keys()
            .filter(|address| !hosts.contains(*address))
            .cloned()
            .collect();
        for address in stale {
            self.remove_member(state, &address);
        }
    }

    fn enforce_standalone_size_rule(&self, state: &mut ClusterState) {
        if state.members.len() <= 1 {
            return;
        }
        let strays: Vec<ServerAddress> = state
            .members
            .iter()
            .filter(|(_, server)| server.description().server_type == ServerType::StandAlone)
            .map(|(address, _)| address.clone())
            .collect();
        for address in strays {
            tracing::info!(%address, "removing standalone member from a multi-member cluster");
            self.remove_member(state, &address);
        }
    }

    fn recompute_and_publish(&self, state: &mut MutexGuard<'_, ClusterState>) {
        let servers: Vec<ServerDescription> = state.members.values().map(|server| server.description()).collect();
        let new_description = Arc::new(ClusterDescription::new(self.settings.mode, state.cluster_type, servers));

        if *state.description != *new_description {
            tracing::info!(
                cluster_type = %new_description.cluster_type,
                members = new_description.servers.len(),
                "cluster description changed"
            );
            let old = std::mem::replace(&mut state.description, new_description.clone());
            let event = ChangeEvent { old, new: new_description };
            state.listeners.publish(&event);
            self.condvar.notify_all();
        }
    }

    fn handle_notification(self: &Arc<Self>, description: ServerDescription) {
        let mut state = self.state.lock().unwrap();
        if state.closed {
            return;
        }

        let address = description.address.clone();
        if !state.members.contains_key(&address) {
            return;
        }

        'reconcile: {
            if !description.ok {
                break 'reconcile;
            }

            if let Some(required) = self.settings.required_replica_set_name.as_deref() {
                if description.set_name.as_deref() != Some(required) {
                    self.remove_member(&mut state, &address);
                    break 'reconcile;
                }
            }

            let implication = implied_cluster_type(&description, state.members.len());

            if let Some(required) = self.settings.required_cluster_type {
                let incompatible = match implication {
                    Implication::Type(implied) => implied != required,
                    Implication::WrongType => true,
                    Implication::None => false,
                };
                if incompatible {
                    self.remove_member(&mut state, &address);
                    break 'reconcile;
                }
            }

            if state.cluster_type == ClusterType::Unknown {
                if let Implication::Type(implied) = implication {
                    tracing::info!(cluster_type = %implied, "cluster type established");
                    state.cluster_type = implied;
                    if implied == ClusterType::ReplicaSet {
                        state.replica_set_name = description.set_name.clone();
                    }
                }
            } else if self.settings.mode == ConnectionMode::Multiple
                && established_type_mismatch(state.cluster_type, &description, state.replica_set_name.as_deref())
            {
                self.remove_member(&mut state, &address);
                break 'reconcile;
            }

            if self.settings.mode != ConnectionMode::Multiple {
                break 'reconcile;
            }

            if description.server_type == ServerType::ReplicaSetPrimary {
                self.demote_other_primaries(&mut state, &address);
            }

            if description.server_type == ServerType::ShardRouter || description.server_type.is_replica_set_member() {
                self.reconcile_peers(&mut state, &address, &description.hosts);
            }

            self.enforce_standalone_size_rule(&mut state);
        }

        self.recompute_and_publish(&mut state);
    }
}

/// The multi-server cluster state machine.
///
/// Cheaply cloneable; every clone shares the same underlying state and the same set of `Server`
/// handles.
#[derive(Clone)]
pub struct MultiServerCluster {
    inner: Arc<Inner>,
}

impl MultiServerCluster {
    /// Builds a cluster from `settings`, immediately instantiating one [`Server`] per seed
    /// address via `factory` and publishing the initial, all-`Connecting` description.
    pub fn new(settings: ClusterSettings, factory: Arc<dyn ServerFactory>) -> Self {
        // A required replica set name only makes sense for a replica set, so it pins the type
        // the same way `required_cluster_type` does (§4.2 tie-breaks, "required set, empty
        // result"): the type stays ReplicaSet even while every member is being rejected for a
        // set name mismatch, rather than sitting at Unknown until one finally matches.
        let cluster_type = settings.required_cluster_type.unwrap_or(if settings.required_replica_set_name.is_some() {
            ClusterType::ReplicaSet
        } else {
            ClusterType::default()
        });
        let mode = settings.mode;
        let replica_set_name = settings.required_replica_set_name.clone();
        let seeds = settings.hosts.clone();

        let inner = Arc::new(Inner {
            settings,
            factory,
            state: Mutex::new(ClusterState {
                members: HashMap::new(),
                description: Arc::new(ClusterDescription::new(mode, cluster_type, Vec::new())),
                cluster_type,
                replica_set_name,
                closed: false,
                listeners: ListenerRegistry::default(),
            }),
            condvar: Condvar::new(),
        });

        {
            let mut state = inner.state.lock().unwrap();
            for address in seeds {
                match inner.create_member(address.clone()) {
                    Ok(server) => {
                        state.members.insert(address, server);
                    }
                    Err(error) => {
                        tracing::warn!(%address, %error, "failed to create server for seed address");
                    }
                }
            }
            inner.recompute_and_publish(&mut state);
        }

        Self { inner }
    }

    /// Returns the monitor handle for `address`.
    ///
    /// Fails with [`ErrorKind::Closed`] if the cluster is closed, [`ErrorKind::NotFound`]
    /// otherwise. Never blocks.
    pub fn get_server(&self, address: &ServerAddress) -> Result<Arc<Server>> {
        let state = self.inner.state.lock().unwrap();
        if state.closed {
            return Err(ErrorKind::Closed.into());
        }
        state
            .members
            .get(address)
            .cloned()
            .ok_or_else(|| ErrorKind::NotFound { address: address.clone() }.into())
    }

    /// The current aggregate description. Never blocks.
    pub fn description(&self) -> Arc<ClusterDescription> {
        self.inner.state.lock().unwrap().description.clone()
    }

    /// Applies `selector` to the current description, blocking until the cluster has at least
    /// settled out of the initial "connecting" state and `selector` has a candidate, or until
    /// `timeout` elapses.
    ///
    /// Fails with [`ErrorKind::Closed`] if the cluster is closed, [`ErrorKind::Timeout`] if
    /// `timeout` elapses first, or [`ErrorKind::NoMatchingServer`] if the cluster has finished
    /// connecting but `selector` still has no candidates.
    pub fn select_server(&self, selector: &dyn ServerSelector, timeout: Duration) -> Result<ServerDescription> {
        let deadline = Instant::now() + timeout;
        let mut state = self.inner.state.lock().unwrap();

        loop {
            if state.closed {
                return Err(ErrorKind::Closed.into());
            }

            if !state.description.is_connecting() {
                let mut candidates = selector.select(&state.description);
                return match candidates.pop() {
                    Some(candidate) => Ok(candidate),
                    None => Err(ErrorKind::NoMatchingServer.into()),
                };
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(ErrorKind::Timeout { timeout_ms: timeout.as_millis() as u64 }.into());
            }

            let (guard, result) = self.inner.condvar.wait_timeout(state, remaining).unwrap();
            state = guard;
            if result.timed_out() && state.description.is_connecting() {
                return Err(ErrorKind::Timeout { timeout_ms: timeout.as_millis() as u64 }.into());
            }
        }
    }

    /// Registers a listener for future description changes.
    pub fn add_change_listener(&self, listener: Arc<dyn ChangeListener>) {
        self.inner.state.lock().unwrap().listeners.add(listener);
    }

    /// Deregisters a previously registered listener. Idempotent.
    pub fn remove_change_listener(&self, listener: &Arc<dyn ChangeListener>) {
        self.inner.state.lock().unwrap().listeners.remove(listener);
    }

    /// Tears down every member and marks the cluster closed. Idempotent; the second and later
    /// calls are no-ops.
    pub fn close(&self) {
        let mut state = self.inner.state.lock().unwrap();
        if state.closed {
            return;
        }

        tracing::info!("closing cluster");
        state.closed = true;
        for (_, server) in state.members.drain() {
            self.inner.factory.close(&server);
        }
        self.inner.condvar.notify_all();
    }
}

impl std::fmt::Debug for MultiServerCluster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.state.lock().unwrap();
        f.debug_struct("MultiServerCluster")
            .field("cluster_type", &state.cluster_type)
            .field("members", &state.members.len())
            .field("closed", &state.closed)
            .finish()
    }
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::{description::server::ServerMetadata, factory::TestServerFactory, selection::AnyServerSelector};

    fn settings(hosts: &[&str]) -> ClusterSettings {
        ClusterSettings::new(hosts.iter().map(|host| ServerAddress::new(*host, None)).collect()).unwrap()
    }

    fn notify(cluster: &MultiServerCluster, host: &str, server_type: ServerType, set_name: Option<&str>, hosts: &[&str]) {
        let address = ServerAddress::new(host, None);
        let server = cluster.get_server(&address).unwrap();
        let description = ServerDescription::new(
            address,
            server_type,
            set_name.map(str::to_string),
            hosts.iter().map(|h| ServerAddress::new(*h, None)).collect(),
            ServerMetadata::default(),
        );
        server.send_notification(description);
    }

    #[test]
    fn s1_initial_description_is_connecting() {
        let factory = Arc::new(TestServerFactory::new());
        let cluster = MultiServerCluster::new(settings(&["h1"]), factory);

        let description = cluster.description();
        assert_eq!(description.cluster_type, ClusterType::Unknown);
        assert!(description.is_connecting());
        assert_eq!(description.servers.len(), 1);
    }

    #[test]
    fn s2_replica_set_discovery() {
        let factory = Arc::new(TestServerFactory::new());
        let cluster = MultiServerCluster::new(settings(&["h1"]), factory);

        notify(&cluster, "h1", ServerType::ReplicaSetPrimary, Some("rs0"), &["h1", "h2", "h3"]);

        let description = cluster.description();
        assert_eq!(description.cluster_type, ClusterType::ReplicaSet);
        let mut addresses: Vec<String> = description.servers.iter().map(|s| s.address.to_string()).collect();
        addresses.sort();
        assert_eq!(addresses, vec!["h1:27017", "h2:27017", "h3:27017"]);
    }

    #[test]
    fn s3_primary_failover() {
        let factory = Arc::new(TestServerFactory::new());
        let cluster = MultiServerCluster::new(settings(&["h1", "h2"]), factory);

        notify(&cluster, "h1", ServerType::ReplicaSetPrimary, Some("rs0"), &["h1", "h2"]);
        notify(&cluster, "h2", ServerType::ReplicaSetPrimary, Some("rs0"), &["h1", "h2"]);

        let description = cluster.description();
        let h1 = description.server(&ServerAddress::new("h1", None)).unwrap();
        let h2 = description.server(&ServerAddress::new("h2", None)).unwrap();
        assert_eq!(h1.state, crate::description::server::ServerState::Connecting);
        assert_eq!(h1.server_type, ServerType::Unknown);
        assert_eq!(h2.server_type, ServerType::ReplicaSetPrimary);
    }

    #[test]
    fn s4_standalone_with_many_hosts_is_pruned() {
        let factory = Arc::new(TestServerFactory::new());
        let cluster = MultiServerCluster::new(settings(&["h1", "h2"]), factory);

        notify(&cluster, "h1", ServerType::StandAlone, None, &[]);
        notify(&cluster, "h2", ServerType::ReplicaSetPrimary, Some("rs0"), &["h2", "h3"]);

        let description = cluster.description();
        assert!(description.server(&ServerAddress::new("h1", None)).is_none());
        assert_eq!(description.cluster_type, ClusterType::ReplicaSet);
        let mut addresses: Vec<String> = description.servers.iter().map(|s| s.address.to_string()).collect();
        addresses.sort();
        assert_eq!(addresses, vec!["h2:27017", "h3:27017"]);
    }

    #[test]
    fn s5_required_set_name_rejects_mismatched_member() {
        let factory = Arc::new(TestServerFactory::new());
        let cluster = MultiServerCluster::new(
            settings(&["h2"]).requiring_replica_set_name("test1"),
            factory,
        );

        notify(&cluster, "h2", ServerType::ReplicaSetPrimary, Some("test2"), &["h1", "h2", "h3"]);

        let description = cluster.description();
        assert_eq!(description.cluster_type, ClusterType::ReplicaSet);
        assert!(description.servers.is_empty());
    }

    #[test]
    fn s6_alias_resolution() {
        let factory = Arc::new(TestServerFactory::new());
        let cluster = MultiServerCluster::new(settings(&["alias"]), factory);

        notify(&cluster, "alias", ServerType::ReplicaSetPrimary, Some("rs0"), &["h1", "h2", "h3"]);

        let description = cluster.description();
        assert!(description.server(&ServerAddress::new("alias", None)).is_none());
        let mut addresses: Vec<String> = description.servers.iter().map(|s| s.address.to_string()).collect();
        addresses.sort();
        assert_eq!(addresses, vec!["h1:27017", "h2:27017", "h3:27017"]);
    }

    #[test]
    fn s7_not_ok_notification_is_ignored_for_membership() {
        let factory = Arc::new(TestServerFactory::new());
        let cluster = MultiServerCluster::new(settings(&["h1", "h2"]), factory);

        notify(&cluster, "h1", ServerType::ReplicaSetPrimary, Some("rs0"), &["h1", "h2", "h3"]);

        let address = ServerAddress::new("h2", None);
        let server = cluster.get_server(&address).unwrap();
        server.send_notification(ServerDescription::not_ok(address));

        let description = cluster.description();
        let mut addresses: Vec<String> = description.servers.iter().map(|s| s.address.to_string()).collect();
        addresses.sort();
        assert_eq!(addresses, vec!["h1:27017", "h2:27017", "h3:27017"]);
        assert!(!description.server(&ServerAddress::new("h2", None)).unwrap().ok);
    }

    #[test]
    fn s8_standalone_seed_retained_at_size_one() {
        let factory = Arc::new(TestServerFactory::new());
        let cluster = MultiServerCluster::new(settings(&["h1"]), factory);

        notify(&cluster, "h1", ServerType::StandAlone, None, &[]);

        let description = cluster.description();
        assert_eq!(description.cluster_type, ClusterType::StandAlone);
        assert_eq!(description.servers.len(), 1);
    }

    #[test]
    fn closed_cluster_rejects_get_server() {
        let factory = Arc::new(TestServerFactory::new());
        let cluster = MultiServerCluster::new(settings(&["h1"]), factory);

        cluster.close();
        cluster.close();

        assert!(cluster.get_server(&ServerAddress::new("h1", None)).is_err());
    }

    #[test]
    fn select_server_times_out_while_connecting() {
        let factory = Arc::new(TestServerFactory::new());
        let cluster = MultiServerCluster::new(settings(&["h1"]), factory);

        let result = cluster.select_server(&AnyServerSelector, Duration::from_millis(20));
        assert!(result.is_err());
    }

    #[test]
    fn select_server_returns_candidate_once_connected() {
        let factory = Arc::new(TestServerFactory::new());
        let cluster = MultiServerCluster::new(settings(&["h1"]), factory);

        notify(&cluster, "h1", ServerType::StandAlone, None, &[]);

        let result = cluster.select_server(&AnyServerSelector, Duration::from_millis(50)).unwrap();
        assert_eq!(result.address, ServerAddress::new("h1", None));
    }
}
