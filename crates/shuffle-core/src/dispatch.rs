//! Typed, synchronous event dispatch.
//!
//! Each [`CommChannel`](crate::CommChannel) owns one [`EventDispatcher`].
//! There is no process-wide bus: consumers subscribe on the channel they
//! care about.
//!
//! Dispatch is synchronous. `publish` runs every matching handler, in
//! subscription order, before it returns, so the order in which consumers
//! observe events is exactly the order in which the channel processed them.
//! Channel-backed subscriptions ([`EventDispatcher::subscribe_channel`]) push
//! into an unbounded queue at publish time and therefore keep that order as
//! well.

use std::fmt;

use tokio::sync::mpsc;

use crate::event::{ChannelEvent, EventKind};

/// Handle returned by `subscribe*`, used to unsubscribe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Boxed event handler
pub type EventHandler = Box<dyn FnMut(&ChannelEvent) + Send>;

enum Sink {
    Handler(EventHandler),
    Queue(mpsc::UnboundedSender<ChannelEvent>),
}

struct Subscription {
    id: SubscriptionId,
    /// Empty means every kind
    kinds: Vec<EventKind>,
    sink: Sink,
}

impl Subscription {
    fn wants(&self, kind: EventKind) -> bool {
        self.kinds.is_empty() || self.kinds.contains(&kind)
    }
}

/// Publish/subscribe surface of a channel
#[derive(Default)]
pub struct EventDispatcher {
    subscriptions: Vec<Subscription>,
    next_id: u64,
}

impl EventDispatcher {
    /// Dispatcher with no subscribers
    pub fn new() -> Self {
        Self::default()
    }

    /// Call `handler` for every event of `kind`.
    pub fn subscribe(
        &mut self,
        kind: EventKind,
        handler: impl FnMut(&ChannelEvent) + Send + 'static,
    ) -> SubscriptionId {
        self.insert(vec![kind], Sink::Handler(Box::new(handler)))
    }

    /// Call `handler` for every event.
    pub fn subscribe_all(
        &mut self,
        handler: impl FnMut(&ChannelEvent) + Send + 'static,
    ) -> SubscriptionId {
        self.insert(Vec::new(), Sink::Handler(Box::new(handler)))
    }

    /// Queue events of the given kinds (all kinds if empty) for an async
    /// consumer.
    ///
    /// The subscription is dropped automatically once the receiver is.
    ///
    /// The queue is unbounded: events a consumer never drains stay buffered
    /// for the life of the channel. Drop the receiver when no longer
    /// reading.
    pub fn subscribe_channel(
        &mut self,
        kinds: &[EventKind],
    ) -> mpsc::UnboundedReceiver<ChannelEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.insert(kinds.to_vec(), Sink::Queue(tx));
        rx
    }

    /// Remove a subscription. Returns false if it was already gone.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.subscriptions.len();
        self.subscriptions.retain(|s| s.id != id);
        self.subscriptions.len() != before
    }

    /// Number of live subscriptions
    pub fn subscriber_count(&self) -> usize {
        self.subscriptions.len()
    }

    /// Deliver `event` to every matching subscriber.
    ///
    /// Returns the number of subscribers that received it.
    pub fn publish(&mut self, event: &ChannelEvent) -> usize {
        let kind = event.kind();
        let mut delivered = 0;

        self.subscriptions.retain_mut(|subscription| {
            if !subscription.wants(kind) {
                return true;
            }
            match &mut subscription.sink {
                Sink::Handler(handler) => {
                    handler(event);
                    delivered += 1;
                    true
                },
                Sink::Queue(tx) => {
                    if tx.send(event.clone()).is_ok() {
                        delivered += 1;
                        true
                    } else {
                        tracing::debug!(id = subscription.id.0, "Dropping closed event queue");
                        false
                    }
                },
            }
        });

        tracing::trace!(?kind, delivered, "Published channel event");
        delivered
    }

    fn insert(&mut self, kinds: Vec<EventKind>, sink: Sink) -> SubscriptionId {
        let id = SubscriptionId(self.next_id);
        self.next_id += 1;
        self.subscriptions.push(Subscription { id, kinds, sink });
        id
    }
}

impl fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventDispatcher")
            .field("subscriptions", &self.subscriptions.len())
            .field("next_id", &self.next_id)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;

    fn disconnected(reason: &str) -> ChannelEvent {
        ChannelEvent::Disconnected { reason: reason.into() }
    }

    #[test]
    fn handlers_only_see_their_kind() {
        let mut dispatcher = EventDispatcher::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let sink = seen.clone();
        dispatcher.subscribe(EventKind::Disconnected, move |e| sink.lock().unwrap().push(e.kind()));

        dispatcher.publish(&ChannelEvent::ConnectionError {
            kind: crate::ConnectionErrorKind::TransportError,
            detail: "boom".into(),
        });
        dispatcher.publish(&disconnected("bye"));

        assert_eq!(*seen.lock().unwrap(), vec![EventKind::Disconnected]);
    }

    #[test]
    fn delivery_follows_subscription_order() {
        let mut dispatcher = EventDispatcher::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        for tag in ["first", "second", "third"] {
            let order = order.clone();
            dispatcher.subscribe_all(move |_| order.lock().unwrap().push(tag));
        }

        assert_eq!(dispatcher.publish(&disconnected("x")), 3);
        assert_eq!(*order.lock().unwrap(), vec!["first", "second", "third"]);
    }

    #[test]
    fn unsubscribe_stops_delivery() {
        let mut dispatcher = EventDispatcher::new();
        let id = dispatcher.subscribe_all(|_| {});

        assert!(dispatcher.unsubscribe(id));
        assert!(!dispatcher.unsubscribe(id));
        assert_eq!(dispatcher.publish(&disconnected("x")), 0);
    }

    #[test]
    fn queue_subscription_preserves_order_and_drops_with_receiver() {
        let mut dispatcher = EventDispatcher::new();
        let mut rx = dispatcher.subscribe_channel(&[]);

        dispatcher.publish(&disconnected("one"));
        dispatcher.publish(&disconnected("two"));

        assert_eq!(rx.try_recv().unwrap(), disconnected("one"));
        assert_eq!(rx.try_recv().unwrap(), disconnected("two"));

        drop(rx);
        assert_eq!(dispatcher.publish(&disconnected("three")), 0);
        assert_eq!(dispatcher.subscriber_count(), 0);
    }
}
