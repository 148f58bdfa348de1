//! [`ServerDescription`]: the most up-to-date information known about a single server.

use std::{collections::HashSet, time::Duration};

use derive_more::Display;

use crate::address::ServerAddress;

/// The type of server a [`ServerDescription`] describes, inferred from the last successful
/// heartbeat reply.
#[derive(Debug, Display, Clone, Copy, Eq, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[non_exhaustive]
pub enum ServerType {
    /// A server that hasn't been checked yet, or whose last check failed.
    #[default]
    Unknown,

    /// A single, non-replica-set server.
    StandAlone,

    /// The primary node of a replica set.
    ReplicaSetPrimary,

    /// A secondary node of a replica set.
    ReplicaSetSecondary,

    /// A non-data-bearing node of a replica set that can participate in elections.
    ReplicaSetArbiter,

    /// A hidden, starting up, or recovering member of a replica set.
    ReplicaSetOther,

    /// A member of an uninitialized replica set, or one removed from the replica set config.
    ReplicaSetGhost,

    /// A router in a sharded deployment.
    ShardRouter,
}

impl ServerType {
    /// Whether this type is any of the `ReplicaSet*` variants.
    pub fn is_replica_set_member(self) -> bool {
        matches!(
            self,
            ServerType::ReplicaSetPrimary
                | ServerType::ReplicaSetSecondary
                | ServerType::ReplicaSetArbiter
                | ServerType::ReplicaSetOther
                | ServerType::ReplicaSetGhost
        )
    }
}

/// The connectivity state of a single server.
#[derive(Debug, Display, Clone, Copy, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[non_exhaustive]
pub enum ServerState {
    /// The server has not yet been confirmed reachable with a known type.
    Connecting,

    /// The server has a known, non-[`Unknown`](ServerType::Unknown) type.
    Connected,
}

/// Metadata that the cluster passes through without interpreting.
///
/// None of these fields participate in [`ServerDescription`] equality, matching the way round
/// trip time jitter alone should never be treated as a topology change.
#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[non_exhaustive]
pub struct ServerMetadata {
    /// The duration of the heartbeat that produced this description, if any.
    pub round_trip_time: Option<Duration>,

    /// The maximum wire protocol version the server reported supporting.
    pub max_wire_version: Option<i32>,

    /// Free-form tags the server reported, used by selectors.
    pub tags: Vec<(String, String)>,
}

/// An immutable snapshot of the most recently observed state of one server.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[non_exhaustive]
pub struct ServerDescription {
    /// The address of the server this description is about.
    pub address: ServerAddress,

    /// The server's type, as inferred from its last heartbeat reply.
    pub server_type: ServerType,

    /// Whether the server is confirmed reachable with a known type.
    pub state: ServerState,

    /// Whether the last heartbeat to this server succeeded.
    pub ok: bool,

    /// The peer addresses this server advertised, if any.
    pub hosts: HashSet<ServerAddress>,

    /// The replica set name this server reported, if any.
    pub set_name: Option<String>,

    /// Metadata the cluster passes through without interpretation.
    pub metadata: ServerMetadata,
}

impl ServerDescription {
    /// Builds a description from a successful heartbeat reply.
    ///
    /// Enforces the invariant that a `ReplicaSet*` type requires a `set_name`: a reply that
    /// violates it is not a valid server description, so it is downgraded to the same
    /// not-ok/Unknown/Connecting description that [`ServerDescription::not_ok`] produces, rather
    /// than being rejected with an error. This is what lets step 3 of the cluster's notification
    /// algorithm treat "impossible" replies exactly like a failed heartbeat.
    pub fn new(
        address: ServerAddress,
        server_type: ServerType,
        set_name: Option<String>,
        hosts: HashSet<ServerAddress>,
        metadata: ServerMetadata,
    ) -> Self {
        if server_type.is_replica_set_member() && set_name.is_none() {
            return Self::not_ok(address);
        }

        let state = if server_type == ServerType::Unknown {
            ServerState::Connecting
        } else {
            ServerState::Connected
        };

        Self {
            address,
            server_type,
            state,
            ok: true,
            hosts,
            set_name,
            metadata,
        }
    }

    /// Builds the initial, pre-heartbeat description for a newly added server.
    pub fn unknown(address: ServerAddress) -> Self {
        Self {
            address,
            server_type: ServerType::Unknown,
            state: ServerState::Connecting,
            ok: true,
            hosts: HashSet::new(),
            set_name: None,
            metadata: ServerMetadata::default(),
        }
    }

    /// Builds the description produced by a failed heartbeat (or an otherwise-invalid reply).
    pub fn not_ok(address: ServerAddress) -> Self {
        Self {
            address,
            server_type: ServerType::Unknown,
            state: ServerState::Connecting,
            ok: false,
            hosts: HashSet::new(),
            set_name: None,
            metadata: ServerMetadata::default(),
        }
    }

    /// Whether this server is available to be selected, i.e. has a known, non-`Unknown` type.
    pub fn is_available(&self) -> bool {
        self.server_type != ServerType::Unknown
    }
}

// Equality mirrors the driver's server-description equality: the metadata bag (round trip time,
// wire version, tags) is deliberately excluded so that RTT jitter alone never looks like a
// topology change.
impl PartialEq for ServerDescription {
    fn eq(&self, other: &Self) -> bool {
        self.address == other.address
            && self.server_type == other.server_type
            && self.state == other.state
            && self.ok == other.ok
            && self.hosts == other.hosts
            && self.set_name == other.set_name
    }
}
