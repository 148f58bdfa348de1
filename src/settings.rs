//! [`ClusterSettings`]: immutable configuration a [`MultiServerCluster`](crate::cluster::MultiServerCluster) is built from.

use crate::{
    address::ServerAddress,
    description::cluster::{ClusterType, ConnectionMode},
    error::{ErrorKind, Result},
};

/// Configuration used to construct a [`MultiServerCluster`](crate::cluster::MultiServerCluster).
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct ClusterSettings {
    /// How the cluster connects to its members.
    pub mode: ConnectionMode,

    /// The initial set of addresses to monitor.
    pub hosts: Vec<ServerAddress>,

    /// If set, notifications implying an incompatible cluster type cause their sender to be
    /// removed rather than changing the cluster's type.
    pub required_cluster_type: Option<ClusterType>,

    /// If set, members reporting a different replica set name are removed rather than accepted.
    pub required_replica_set_name: Option<String>,
}

impl ClusterSettings {
    /// Creates settings for a [`ConnectionMode::Multiple`] cluster from a non-empty seed list.
    ///
    /// Returns [`ErrorKind::InvalidArgument`] if `hosts` is empty.
    pub fn new(hosts: Vec<ServerAddress>) -> Result<Self> {
        Self::with_mode(hosts, ConnectionMode::Multiple)
    }

    /// Creates settings for a single-server cluster with exactly one seed address.
    pub fn single(host: ServerAddress) -> Self {
        Self {
            mode: ConnectionMode::Single,
            hosts: vec![host],
            required_cluster_type: None,
            required_replica_set_name: None,
        }
    }

    /// Creates settings with an explicit [`ConnectionMode`].
    ///
    /// Returns [`ErrorKind::InvalidArgument`] if `hosts` is empty.
    pub fn with_mode(hosts: Vec<ServerAddress>, mode: ConnectionMode) -> Result<Self> {
        if hosts.is_empty() {
            return Err(ErrorKind::InvalidArgument {
                message: "ClusterSettings requires a non-empty seed list".to_string(),
            }
            .into());
        }

        Ok(Self {
            mode,
            hosts,
            required_cluster_type: None,
            required_replica_set_name: None,
        })
    }

    /// Pins the cluster to a required type, as described in §4.2 step 5.
    pub fn requiring_cluster_type(mut self, cluster_type: ClusterType) -> Self {
        self.required_cluster_type = Some(cluster_type);
        self
    }

    /// Rejects members that don't report this replica set name, as described in §4.2 step 4.
    pub fn requiring_replica_set_name(mut self, set_name: impl Into<String>) -> Self {
        self.required_replica_set_name = Some(set_name.into());
        self
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn empty_seed_list_is_rejected() {
        assert!(ClusterSettings::new(Vec::new()).is_err());
    }

    #[test]
    fn single_mode_has_exactly_one_seed() {
        let settings = ClusterSettings::single(ServerAddress::new("h1", None));
        assert_eq!(settings.hosts.len(), 1);
        assert_eq!(settings.mode, ConnectionMode::Single);
    }
}
