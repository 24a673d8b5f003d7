//! Mutation listener.
//!
//! Turns local mutation events into queue entries on the regular partition.

use crate::clock::Clock;
use crate::config::EventCatalog;
use crate::error::SyncError;
use crate::fabric::{MutationEvent, MutationFabric};
use edgesync_protocol::Partition;
use edgesync_store::{NewEntry, SyncQueues};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Captures mutations into the action queue.
///
/// One listener exists per invocation. [`Listener::start`] subscribes at most
/// once; calling it again is a no-op.
pub struct Listener {
    queues: Arc<SyncQueues>,
    catalog: EventCatalog,
    clock: Arc<dyn Clock>,
    started: AtomicBool,
}

impl Listener {
    /// Creates a listener for the given catalog.
    pub fn new(queues: Arc<SyncQueues>, catalog: EventCatalog, clock: Arc<dyn Clock>) -> Self {
        Self {
            queues,
            catalog,
            clock,
            started: AtomicBool::new(false),
        }
    }

    /// Subscribes to every catalog event. Returns false if already started.
    pub fn start(&self, fabric: &dyn MutationFabric) -> bool {
        if self.started.swap(true, Ordering::SeqCst) {
            return false;
        }

        for mapping in self.catalog.mappings() {
            let queues = Arc::clone(&self.queues);
            let clock = Arc::clone(&self.clock);
            let action = mapping.action.clone();

            fabric.subscribe(
                &mapping.event,
                Arc::new(move |event: &MutationEvent| {
                    let entry =
                        NewEntry::new(action.as_str(), event.args.clone(), event.actor, clock.now());
                    match queues.enqueue(Partition::Regular, entry) {
                        Ok(id) => {
                            tracing::debug!(event = %event.name, action = %action, id, "captured mutation");
                            Ok(())
                        }
                        Err(e) => {
                            tracing::error!(event = %event.name, action = %action, error = %e, "failed to queue mutation");
                            Err(SyncError::QueuePersistence(e))
                        }
                    }
                }),
            );
        }

        tracing::debug!(events = self.catalog.len(), "listener started");
        true
    }

    /// Returns true once [`Listener::start`] has run.
    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }
}

impl std::fmt::Debug for Listener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Listener")
            .field("events", &self.catalog.len())
            .field("started", &self.is_started())
            .finish()
    }
}
