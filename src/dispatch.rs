use crate::event::{DeviceEvent, EventTag};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, PoisonError, Weak};
use tracing::{error, trace};

type Handler = Arc<dyn Fn(&DeviceEvent) + Send + Sync>;

#[derive(Default)]
struct Registry {
    next_id: u64,
    handlers: Vec<(u64, EventTag, Handler)>,
}

/// Synchronous pub/sub between transports and renderers.
///
/// Cloning yields another handle to the same subscriber set.
#[derive(Clone, Default)]
pub struct Dispatcher {
    registry: Arc<Mutex<Registry>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for events tagged `tag`.
    pub fn subscribe<F>(&self, tag: EventTag, handler: F) -> Subscription
    where
        F: Fn(&DeviceEvent) + Send + Sync + 'static,
    {
        let mut registry = self.registry.lock().unwrap_or_else(PoisonError::into_inner);
        let id = registry.next_id;
        registry.next_id += 1;
        registry.handlers.push((id, tag, Arc::new(handler)));
        trace!(%tag, id, "subscribed");

        Subscription {
            id,
            registry: Arc::downgrade(&self.registry),
        }
    }

    /// Deliver `event` to every handler currently subscribed to its tag, in
    /// registration order. A panicking handler is logged and skipped.
    pub fn publish(&self, event: DeviceEvent) {
        let tag = event.tag();
        let handlers: Vec<(u64, Handler)> = {
            let registry = self.registry.lock().unwrap_or_else(PoisonError::into_inner);
            registry
                .handlers
                .iter()
                .filter(|(_, t, _)| *t == tag)
                .map(|(id, _, h)| (*id, Arc::clone(h)))
                .collect()
        };

        for (id, handler) in handlers {
            if catch_unwind(AssertUnwindSafe(|| handler(&event))).is_err() {
                error!(%tag, subscriber = id, "subscriber panicked while handling event");
            }
        }
    }

    pub fn subscriber_count(&self, tag: EventTag) -> usize {
        let registry = self.registry.lock().unwrap_or_else(PoisonError::into_inner);
        registry.handlers.iter().filter(|(_, t, _)| *t == tag).count()
    }
}

/// Token returned by [`Dispatcher::subscribe`]. Dropping it keeps the
/// subscription alive; call [`unsubscribe`](Self::unsubscribe) to remove it.
#[derive(Debug)]
pub struct Subscription {
    id: u64,
    registry: Weak<Mutex<Registry>>,
}

impl Subscription {
    pub fn unsubscribe(self) {
        if let Some(registry) = self.registry.upgrade() {
            let mut registry = registry.lock().unwrap_or_else(PoisonError::into_inner);
            registry.handlers.retain(|(id, _, _)| *id != self.id);
            trace!(id = self.id, "unsubscribed");
        }
    }
}
