//! In-process publish/subscribe for node messages and status changes.

use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard};

use hydra_core::{ConnectionStatus, ProtocolMessage};
use tokio::sync::oneshot;
use tracing::warn;
use uuid::Uuid;

/// Identifies one subscription on a channel.
pub type SubscriptionId = Uuid;

/// What a handler wants after seeing an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Stay subscribed.
    Keep,
    /// Remove this subscription.
    Done,
}

type Handler<T> = Arc<dyn Fn(&T) -> Delivery + Send + Sync>;

/// A typed event channel.
///
/// Handlers run synchronously on the publishing task, in publish order, and
/// must not block.
pub struct Channel<T> {
    name: &'static str,
    handlers: Mutex<Vec<(SubscriptionId, Handler<T>)>>,
}

impl<T> Channel<T> {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            handlers: Mutex::new(Vec::new()),
        }
    }

    /// Register a handler for every event.
    pub fn subscribe<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        self.subscribe_until(move |event| {
            handler(event);
            Delivery::Keep
        })
    }

    /// Register a handler that decides per event whether to stay subscribed.
    pub fn subscribe_until<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(&T) -> Delivery + Send + Sync + 'static,
    {
        let id = Uuid::new_v4();
        self.lock().push((id, Arc::new(handler)));
        id
    }

    /// Remove a subscription. Returns false if it was already gone.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut handlers = self.lock();
        let before = handlers.len();
        handlers.retain(|(existing, _)| *existing != id);
        handlers.len() != before
    }

    pub fn subscriber_count(&self) -> usize {
        self.lock().len()
    }

    /// Deliver `event` to the handlers registered right now.
    pub fn publish(&self, event: &T) {
        let snapshot: Vec<_> = self.lock().clone();
        let mut finished = Vec::new();

        for (id, handler) in snapshot {
            match panic::catch_unwind(AssertUnwindSafe(|| handler(event))) {
                Ok(Delivery::Keep) => {}
                Ok(Delivery::Done) => finished.push(id),
                Err(_) => warn!(channel = self.name, subscription = %id, "Subscriber panicked"),
            }
        }

        if !finished.is_empty() {
            self.lock().retain(|(id, _)| !finished.contains(id));
        }
    }

    fn lock(&self) -> MutexGuard<'_, Vec<(SubscriptionId, Handler<T>)>> {
        // Handlers never run under the lock, so a poisoned list is still consistent.
        self.handlers.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl<T: Clone + Send + 'static> Channel<T> {
    /// Resolve with the first event that satisfies `matcher`, then deregister.
    ///
    /// Dropping the receiver does not deregister; call [`Channel::unsubscribe`].
    pub fn once<M>(&self, matcher: M) -> (SubscriptionId, oneshot::Receiver<T>)
    where
        M: Fn(&T) -> bool + Send + Sync + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let slot = Mutex::new(Some(tx));
        let id = self.subscribe_until(move |event| {
            if !matcher(event) {
                return Delivery::Keep;
            }
            let sender = slot.lock().ok().and_then(|mut slot| slot.take());
            if let Some(sender) = sender {
                let _ = sender.send(event.clone());
            }
            Delivery::Done
        });
        (id, rx)
    }
}

/// The client's two event channels.
pub struct EventBus {
    pub messages: Channel<ProtocolMessage>,
    pub status: Channel<ConnectionStatus>,
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            messages: Channel::new("message"),
            status: Channel::new("statusChange"),
        }
    }

    /// Total subscriptions across both channels.
    pub fn subscriber_count(&self) -> usize {
        self.messages.subscriber_count() + self.status.subscriber_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
