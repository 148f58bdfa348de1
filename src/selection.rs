//! [`ServerSelector`]: predicates over a [`ClusterDescription`] used by `select_server`.

use crate::description::{
    cluster::ClusterDescription,
    server::{ServerDescription, ServerType},
};

/// Chooses candidate servers out of a cluster description.
///
/// `MultiServerCluster::select_server` calls a selector repeatedly (once per wake-up) until it
/// returns a non-empty list or the caller's timeout elapses, so a selector should be cheap and
/// side-effect free.
pub trait ServerSelector: Send + Sync {
    /// Returns every member of `description` this selector considers acceptable. An empty
    /// result means "keep waiting," not "fail": the cluster distinguishes "no acceptable server
    /// yet" from "the requested criteria can never be met" only by timeout, per §4.3.
    fn select(&self, description: &ClusterDescription) -> Vec<ServerDescription>;
}

/// Selects every member with a known, non-[`Unknown`](ServerType::Unknown) type.
///
/// The default selector used when a caller has no preference beyond "any server that is up."
#[derive(Debug, Default, Clone, Copy)]
pub struct AnyServerSelector;

impl ServerSelector for AnyServerSelector {
    fn select(&self, description: &ClusterDescription) -> Vec<ServerDescription> {
        description
            .servers
            .iter()
            .filter(|server| server.is_available())
            .cloned()
            .collect()
    }
}

/// Selects only servers whose type is [`ServerType::ReplicaSetPrimary`] or
/// [`ServerType::StandAlone`], the members writes can be sent to.
#[derive(Debug, Default, Clone, Copy)]
pub struct WritableServerSelector;

impl ServerSelector for WritableServerSelector {
    fn select(&self, description: &ClusterDescription) -> Vec<ServerDescription> {
        description
            .servers
            .iter()
            .filter(|server| {
                matches!(
                    server.server_type,
                    ServerType::ReplicaSetPrimary | ServerType::StandAlone
                )
            })
            .cloned()
            .collect()
    }
}

/// Adapts a plain predicate closure into a [`ServerSelector`].
impl<F> ServerSelector for F
where
    F: Fn(&ClusterDescription) -> Vec<ServerDescription> + Send + Sync,
{
    fn select(&self, description: &ClusterDescription) -> Vec<ServerDescription> {
        self(description)
    }
}
