//! Change notification: [`ChangeListener`], [`ChangeEvent`], and the cluster's listener registry.

use std::sync::{Arc, Mutex};

use crate::description::cluster::ClusterDescription;

/// Describes a single published transition of a cluster's aggregate description.
///
/// Fired only when the recomputed [`ClusterDescription`] is unequal to the previous one (see
/// `ClusterDescription`'s `PartialEq`), so a listener never sees two consecutive identical
/// events.
#[derive(Debug, Clone)]
pub struct ChangeEvent {
    /// The description immediately before this change.
    pub old: Arc<ClusterDescription>,

    /// The description immediately after this change.
    pub new: Arc<ClusterDescription>,
}

/// Receives notification of cluster description changes.
///
/// Invoked synchronously, from within the same critical section that computed the new
/// description, in the order listeners were added. A listener must not call back into the
/// cluster that invoked it; doing so deadlocks against the cluster's own state lock.
pub trait ChangeListener: Send + Sync {
    fn on_change(&self, event: &ChangeEvent);
}

/// The cluster's set of registered listeners, keyed by `Arc` identity rather than by value so
/// that two distinct listener instances with coincidentally equal behavior are never conflated.
#[derive(Default)]
pub(crate) struct ListenerRegistry {
    listeners: Mutex<Vec<Arc<dyn ChangeListener>>>,
}

impl ListenerRegistry {
    pub(crate) fn add(&self, listener: Arc<dyn ChangeListener>) {
        self.listeners.lock().unwrap().push(listener);
    }

    /// Removes a previously registered listener. A no-op if `listener` was never added, or was
    /// already removed.
    pub(crate) fn remove(&self, listener: &Arc<dyn ChangeListener>) {
        self.listeners
            .lock()
            .unwrap()
            .retain(|candidate| !Arc::ptr_eq(candidate, listener));
    }

    /// Invokes every registered listener with `event`, in registration order.
    ///
    /// A listener that panics is caught and logged rather than allowed to unwind through the
    /// cluster's critical section; the remaining listeners still run.
    pub(crate) fn publish(&self, event: &ChangeEvent) {
        for listener in self.listeners.lock().unwrap().iter() {
            let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                listener.on_change(event);
            }));
            if outcome.is_err() {
                tracing::error!("change listener panicked while handling a cluster description change");
            }
        }
    }
}
