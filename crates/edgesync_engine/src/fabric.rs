//! Mutation notification fabric.
//!
//! The host emits an event whenever local state changes. Handlers run
//! synchronously inside the emitting call, so a handler error reaches the
//! code that caused the mutation.

use crate::error::SyncResult;
use edgesync_codec::Value;
use edgesync_protocol::Actor;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// A local mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutationEvent {
    /// Event name, e.g. `option.updated`.
    pub name: String,
    /// Event arguments.
    pub args: Vec<Value>,
    /// Who caused it.
    pub actor: Actor,
}

impl MutationEvent {
    /// Creates an event.
    pub fn new(name: impl Into<String>, args: Vec<Value>, actor: Actor) -> Self {
        Self {
            name: name.into(),
            args,
            actor,
        }
    }
}

/// Callback invoked for each matching event.
pub type MutationHandler = Arc<dyn Fn(&MutationEvent) -> SyncResult<()> + Send + Sync>;

/// Something handlers can subscribe to.
pub trait MutationFabric: Send + Sync {
    /// Registers `handler` for `event`.
    fn subscribe(&self, event: &str, handler: MutationHandler);
}

/// An in-process fabric that dispatches synchronously.
#[derive(Default)]
pub struct LocalFabric {
    handlers: RwLock<HashMap<String, Vec<MutationHandler>>>,
}

impl LocalFabric {
    /// Creates a fabric with no subscribers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs every handler for the event.
    ///
    /// All handlers run; the first error is returned.
    pub fn emit(&self, event: &MutationEvent) -> SyncResult<()> {
        let handlers = self
            .handlers
            .read()
            .get(&event.name)
            .cloned()
            .unwrap_or_default();

        let mut first_error = None;
        for handler in handlers {
            if let Err(e) = handler(event) {
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Number of handlers registered for `event`.
    pub fn subscriber_count(&self, event: &str) -> usize {
        self.handlers.read().get(event).map_or(0, Vec::len)
    }

    /// Total handlers over all events.
    pub fn total_subscribers(&self) -> usize {
        self.handlers.read().values().map(Vec::len).sum()
    }
}

impl MutationFabric for LocalFabric {
    fn subscribe(&self, event: &str, handler: MutationHandler) {
        self.handlers
            .write()
            .entry(event.to_string())
            .or_default()
            .push(handler);
    }
}

impl std::fmt::Debug for LocalFabric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalFabric")
            .field("subscribers", &self.total_subscribers())
            .finish()
    }
}
