//! [`Server`]: the per-address monitor handle the cluster owns.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex,
};

use crate::{address::ServerAddress, description::server::ServerDescription};

/// Delivers a notification from a [`Server`] back to the cluster that owns it.
///
/// Implemented by the cluster itself (see `crate::cluster`) rather than by `Server` holding a
/// direct reference to its owner, so that the cluster remains the sole strong owner of its
/// `Server` handles; a `Server` only ever holds a weak path back to its cluster through this
/// trait object, never an `Arc` to the cluster.
pub trait NotificationSink: Send + Sync {
    /// Called with the address and description exactly as submitted to
    /// [`Server::send_notification`]. A sink whose cluster no longer recognizes the address is
    /// expected to be a silent no-op (the cluster's own membership check handles that).
    fn notify(&self, description: ServerDescription);
}

/// A passive, per-address monitor handle.
///
/// `Server` holds the latest description observed for one address and forwards new descriptions
/// to its owning cluster. It performs no I/O and schedules no heartbeats itself; an external
/// heartbeat source is expected to call [`Server::send_notification`] as new replies arrive.
#[derive(Debug)]
pub struct Server {
    address: ServerAddress,
    description: Mutex<ServerDescription>,
    closed: AtomicBool,
    sink: Arc<dyn NotificationSink>,
}

impl std::fmt::Debug for dyn NotificationSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("NotificationSink")
    }
}

impl Server {
    /// Creates a new monitor handle, initially holding an
    /// [`unknown`](ServerDescription::unknown) description for `address`.
    pub(crate) fn new(address: ServerAddress, sink: Arc<dyn NotificationSink>) -> Arc<Self> {
        let description = ServerDescription::unknown(address.clone());
        Arc::new(Self {
            address,
            description: Mutex::new(description),
            closed: AtomicBool::new(false),
            sink,
        })
    }

    /// The address this handle monitors.
    pub fn address(&self) -> &ServerAddress {
        &self.address
    }

    /// The most recently observed description for this server. Never fails.
    pub fn description(&self) -> ServerDescription {
        self.description.lock().unwrap().clone()
    }

    /// Records `description` as this server's latest state and forwards it to the owning
    /// cluster. `description.address` must equal [`Server::address`]; violating this is a
    /// programmer error in the heartbeat source, not a recoverable condition.
    ///
    /// A no-op once [`Server::close`] has been called.
    pub fn send_notification(&self, description: ServerDescription) {
        debug_assert_eq!(
            description.address, self.address,
            "notification address must match the server it was sent to"
        );

        if self.closed.load(Ordering::SeqCst) {
            return;
        }

        *self.description.lock().unwrap() = description.clone();
        self.sink.notify(description);
    }

    /// Overwrites the stored description without forwarding it to the cluster.
    ///
    /// Used internally by the cluster's own state machine (primary demotion, §4.2 step 8) to
    /// make a change observable through [`Server::description`] without re-entering the
    /// notification pipeline it is already executing inside of.
    pub(crate) fn force_description(&self, description: ServerDescription) {
        *self.description.lock().unwrap() = description;
    }

    /// Stops accepting further notifications. Idempotent.
    pub(crate) fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod test {
    use std::sync::Mutex as StdMutex;

    use super::*;

    struct RecordingSink {
        received: StdMutex<Vec<ServerDescription>>,
    }

    impl NotificationSink for RecordingSink {
        fn notify(&self, description: ServerDescription) {
            self.received.lock().unwrap().push(description);
        }
    }

    #[test]
    fn send_notification_updates_description_and_forwards() {
        let sink = Arc::new(RecordingSink {
            received: StdMutex::new(Vec::new()),
        });
        let address = ServerAddress::new("h1", None);
        let server = Server::new(address.clone(), sink.clone());

        assert!(!server.description().is_available());

        let desc = ServerDescription::new(
            address,
            crate::description::server::ServerType::StandAlone,
            None,
            Default::default(),
            Default::default(),
        );
        server.send_notification(desc.clone());

        assert_eq!(server.description(), desc);
        assert_eq!(sink.received.lock().unwrap().len(), 1);
    }

    #[test]
    fn closed_server_ignores_notifications() {
        let sink = Arc::new(RecordingSink {
            received: StdMutex::new(Vec::new()),
        });
        let address = ServerAddress::new("h1", None);
        let server = Server::new(address.clone(), sink.clone());
        server.close();

        server.send_notification(ServerDescription::not_ok(address));
        assert!(sink.received.lock().unwrap().is_empty());
    }
}
