//! Message bus seam between the engine and the transport.
//!
//! The engine never touches sockets. It sends through a [`MessageBus`] and
//! registers interest in inbound message kinds; whatever owns the link
//! (serial, UDP, a simulator) delivers parsed messages back.

use missionlink_protocol::{Envelope, Message, MessageKind, Target};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;

/// Sending failed at the transport boundary.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("transport error: {message}")]
pub struct TransportError {
    /// Error message.
    pub message: String,
}

impl TransportError {
    /// Creates a transport error.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Handle returned by [`MessageBus::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(pub u64);

/// Predicate selecting which inbound messages reach a handler.
pub type Filter = Box<dyn Fn(&Envelope) -> bool + Send + Sync>;

/// Receives matching inbound messages.
pub type Handler = Arc<dyn Fn(&Envelope) + Send + Sync>;

/// The transport as seen by the engine.
///
/// Implementations must not call handlers from inside `send`: inbound
/// traffic is delivered from the transport's own context, never
/// re-entrantly from an outbound call.
pub trait MessageBus: Send + Sync {
    /// Queues a message for the target. Fire-and-forget.
    fn send(&self, target: Target, message: Message) -> Result<(), TransportError>;

    /// Registers a handler for inbound messages of `kind` accepted by `filter`.
    fn subscribe(&self, kind: MessageKind, filter: Filter, handler: Handler) -> SubscriptionId;

    /// Removes a handler. Unknown ids are ignored.
    fn unsubscribe(&self, id: SubscriptionId);
}

/// Outbound half of a link, used by [`LocalBus`].
pub trait Outbound: Send + Sync {
    /// Hands a message to the link.
    fn transmit(&self, target: Target, message: Message) -> Result<(), TransportError>;
}

struct Subscription {
    id: SubscriptionId,
    kind: MessageKind,
    filter: Filter,
    handler: Handler,
}

/// In-process dispatcher implementing [`MessageBus`].
///
/// Outbound messages go to an [`Outbound`] sink; the link owner calls
/// [`LocalBus::deliver`] for every parsed inbound message.
pub struct LocalBus {
    outbound: Arc<dyn Outbound>,
    subscriptions: RwLock<Vec<Subscription>>,
    next_id: AtomicU64,
}

impl LocalBus {
    /// Creates a bus sending through `outbound`.
    pub fn new(outbound: Arc<dyn Outbound>) -> Self {
        Self {
            outbound,
            subscriptions: RwLock::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Delivers an inbound message to every matching handler.
    ///
    /// Handlers run on the caller's thread after the subscription table
    /// lock has been released, so they may subscribe or unsubscribe.
    /// Returns the number of handlers invoked.
    pub fn deliver(&self, envelope: &Envelope) -> usize {
        let kind = envelope.kind();
        let handlers: Vec<Handler> = self
            .subscriptions
            .read()
            .iter()
            .filter(|sub| sub.kind == kind && (sub.filter)(envelope))
            .map(|sub| Arc::clone(&sub.handler))
            .collect();

        for handler in &handlers {
            handler(envelope);
        }
        handlers.len()
    }

    /// Returns the number of active subscriptions.
    pub fn subscription_count(&self) -> usize {
        self.subscriptions.read().len()
    }
}

impl MessageBus for LocalBus {
    fn send(&self, target: Target, message: Message) -> Result<(), TransportError> {
        self.outbound.transmit(target, message)
    }

    fn subscribe(&self, kind: MessageKind, filter: Filter, handler: Handler) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.subscriptions.write().push(Subscription {
            id,
            kind,
            filter,
            handler,
        });
        id
    }

    fn unsubscribe(&self, id: SubscriptionId) {
        self.subscriptions.write().retain(|sub| sub.id != id);
    }
}
