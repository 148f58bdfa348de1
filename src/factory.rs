//! [`ServerFactory`]: pluggable construction of [`Server`] handles.

use std::sync::{Arc, Mutex};

use crate::{
    address::ServerAddress,
    error::Result,
    server::{NotificationSink, Server},
};

/// Builds and tears down [`Server`] handles on behalf of a cluster.
///
/// The cluster never constructs a `Server` directly; it goes through a factory so that callers
/// can substitute a test double (see [`TestServerFactory`]) or, in a full deployment, a factory
/// that also spins up the heartbeat source responsible for calling
/// [`Server::send_notification`]. Driving those heartbeats is outside this crate's scope (see the
/// crate's top-level Non-goals); a `ServerFactory` implementation is expected to own that part.
pub trait ServerFactory: Send + Sync {
    /// Creates a new monitor handle for `address`, wired to deliver notifications to `sink`.
    fn create(&self, address: ServerAddress, sink: Arc<dyn NotificationSink>) -> Result<Arc<Server>>;

    /// Tears down a previously created handle. Called exactly once per `Arc<Server>` returned
    /// from [`ServerFactory::create`], when the cluster removes that server from its membership
    /// or is itself closed.
    fn close(&self, server: &Arc<Server>);
}

/// A [`ServerFactory`] that creates bare handles with no attached heartbeat source.
///
/// Notifications must be delivered to the returned handles externally, by calling
/// [`Server::send_notification`] directly. This is the factory a caller reaches for when it
/// already owns its own heartbeat mechanism and only wants this crate's membership and type
/// aggregation.
#[derive(Debug, Default)]
pub struct BasicServerFactory;

impl ServerFactory for BasicServerFactory {
    fn create(&self, address: ServerAddress, sink: Arc<dyn NotificationSink>) -> Result<Arc<Server>> {
        Ok(Server::new(address, sink))
    }

    fn close(&self, server: &Arc<Server>) {
        server.close();
    }
}

/// A [`ServerFactory`] for tests: behaves like [`BasicServerFactory`] but records every address
/// it has been asked to create or close, so scenario tests can assert on factory traffic without
/// a real heartbeat source.
#[derive(Debug, Default)]
pub struct TestServerFactory {
    inner: BasicServerFactory,
    created: Mutex<Vec<ServerAddress>>,
    closed: Mutex<Vec<ServerAddress>>,
}

impl TestServerFactory {
    /// Creates an empty factory with no recorded calls yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// Addresses passed to [`ServerFactory::create`], in call order.
    pub fn created(&self) -> Vec<ServerAddress> {
        self.created.lock().unwrap().clone()
    }

    /// Addresses passed to [`ServerFactory::close`], in call order.
    pub fn closed(&self) -> Vec<ServerAddress> {
        self.closed.lock().unwrap().clone()
    }
}

impl ServerFactory for TestServerFactory {
    fn create(&self, address: ServerAddress, sink: Arc<dyn NotificationSink>) -> Result<Arc<Server>> {
        self.created.lock().unwrap().push(address.clone());
        self.inner.create(address, sink)
    }

    fn close(&self, server: &Arc<Server>) {
        self.closed.lock().unwrap().push(server.address().clone());
        self.inner.close(server);
    }
}
