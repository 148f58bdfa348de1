//! [`ClusterDescription`]: the aggregate, current view of the whole deployment.

use derive_more::Display;

use super::server::{ServerDescription, ServerState};

/// How the cluster connects to its members.
#[derive(Debug, Display, Clone, Copy, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[non_exhaustive]
pub enum ConnectionMode {
    /// Exactly one server is ever a member, for the cluster's whole lifetime.
    Single,

    /// Membership is derived from server reports and may change over time.
    Multiple,
}

/// The classification of the deployment as a whole.
#[derive(Debug, Display, Clone, Copy, Eq, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[non_exhaustive]
pub enum ClusterType {
    /// Not yet classified.
    #[default]
    Unknown,

    /// A replica set (primary plus zero or more secondaries sharing a set name).
    ReplicaSet,

    /// A sharded deployment, accessed via one or more shard routers.
    Sharded,

    /// A single server with no replication.
    StandAlone,
}

/// An immutable snapshot of the whole topology.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[non_exhaustive]
pub struct ClusterDescription {
    /// How the cluster connects to its members.
    pub connection_mode: ConnectionMode,

    /// The classification of the deployment.
    pub cluster_type: ClusterType,

    /// One description per live member. Order carries no meaning; use
    /// [`ClusterDescription::server`] or iterate for lookups.
    pub servers: Vec<ServerDescription>,
}

impl ClusterDescription {
    pub(crate) fn new(
        connection_mode: ConnectionMode,
        cluster_type: ClusterType,
        servers: Vec<ServerDescription>,
    ) -> Self {
        Self {
            connection_mode,
            cluster_type,
            servers,
        }
    }

    /// True iff any member is still `Connecting`, or there are no members at all.
    pub fn is_connecting(&self) -> bool {
        self.servers.is_empty()
            || self
                .servers
                .iter()
                .any(|server| server.state == ServerState::Connecting)
    }

    /// The description for the member at `address`, if it is currently a member.
    pub fn server(&self, address: &crate::address::ServerAddress) -> Option<&ServerDescription> {
        self.servers.iter().find(|server| &server.address == address)
    }
}

// Two descriptions are equal iff their type, mode, and member sets (compared as bags, not
// sequences; member order reflects `HashMap` iteration order internally and carries no meaning)
// all match. This is exactly the equality the cluster uses to decide whether a recomputed
// description is worth publishing and firing a change event for.
impl PartialEq for ClusterDescription {
    fn eq(&self, other: &Self) -> bool {
        self.cluster_type == other.cluster_type
            && self.connection_mode == other.connection_mode
            && self.servers.len() == other.servers.len()
            && self
                .servers
                .iter()
                .all(|server| other.servers.iter().any(|o| o == server))
    }
}
