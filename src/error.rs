//! Contains the `Error` and `Result` types that `cluster_monitor` uses.

use std::sync::Arc;

use thiserror::Error;

use crate::address::ServerAddress;

/// The result type for all methods that can return an error in the `cluster_monitor` crate.
pub type Result<T> = std::result::Result<T, Error>;

/// An error that can occur in the `cluster_monitor` crate. The inner
/// [`ErrorKind`] is wrapped in an `Arc` to allow the error to be cloned, since a single
/// notification failure may need to be reported to several waiters at once.
#[derive(Clone, Debug, Error)]
#[error("{kind}")]
pub struct Error {
    /// The type of error that occurred.
    pub kind: Arc<ErrorKind>,
}

impl Error {
    pub(crate) fn new(kind: ErrorKind) -> Self {
        Self {
            kind: Arc::new(kind),
        }
    }

    /// Whether this is a [`ErrorKind::Closed`] error.
    pub fn is_closed(&self) -> bool {
        matches!(*self.kind, ErrorKind::Closed)
    }
}

impl From<ErrorKind> for Error {
    fn from(kind: ErrorKind) -> Self {
        Self::new(kind)
    }
}

/// The particular kind of error that occurred.
#[derive(Clone, Debug, Error)]
#[non_exhaustive]
pub enum ErrorKind {
    /// The cluster has been closed and can no longer service requests.
    #[error("the cluster has been closed")]
    Closed,

    /// `get_server` was called with an address that is not currently a member of the cluster.
    #[error("no server is currently known at {address}")]
    NotFound {
        /// The address that was looked up.
        address: ServerAddress,
    },

    /// `select_server` did not find a matching server before its timeout elapsed.
    #[error("timed out after {timeout_ms}ms waiting for a server matching the selector")]
    Timeout {
        /// The timeout that was requested, in milliseconds.
        timeout_ms: u64,
    },

    /// `select_server`'s selector returned no candidates even though the cluster has finished
    /// connecting.
    #[error("no server in the cluster matches the selection criteria")]
    NoMatchingServer,

    /// A [`ServerFactory`](crate::factory::ServerFactory) failed to construct a
    /// [`Server`](crate::server::Server) for a newly discovered address.
    #[error("failed to create a server monitor for {address}: {message}")]
    Factory {
        /// The address the factory was asked to create a monitor for.
        address: ServerAddress,
        /// A description of the failure.
        message: String,
    },

    /// A [`ClusterSettings`](crate::settings::ClusterSettings) value failed validation.
    #[error("invalid argument: {message}")]
    InvalidArgument {
        /// A description of the problem.
        message: String,
    },
}
