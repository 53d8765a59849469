//! Ordered, synchronous event bus
//!
//! Events published during a tick are queued and delivered at the end of the
//! tick, in publish order, to every subscriber in subscription order.
//! Subscribers only receive `&E`; they cannot reach back into the state
//! machine that produced the event.

use std::collections::VecDeque;

/// Handle returned by [`EventBus::subscribe`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Subscriber<E> = Box<dyn FnMut(&E)>;

pub struct EventBus<E> {
    queue: VecDeque<E>,
    subscribers: Vec<(SubscriptionId, Subscriber<E>)>,
    next_id: u64,
}

impl<E> EventBus<E> {
    pub fn new() -> Self {
        Self {
            queue: VecDeque::new(),
            subscribers: Vec::new(),
            next_id: 1,
        }
    }

    /// Add a subscriber to the end of the delivery order.
    pub fn subscribe<F: FnMut(&E) + 'static>(&mut self, subscriber: F) -> SubscriptionId {
        let id = SubscriptionId(self.next_id);
        self.next_id += 1;
        self.subscribers.push((id, Box::new(subscriber)));
        id
    }

    /// Remove a subscriber. Returns `true` if it was registered.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.subscribers.len();
        self.subscribers.retain(|(sid, _)| *sid != id);
        self.subscribers.len() != before
    }

    /// Queue an event for the next dispatch.
    pub fn publish(&mut self, event: E) {
        self.queue.push_back(event);
    }

    pub fn publish_all<I: IntoIterator<Item = E>>(&mut self, events: I) {
        self.queue.extend(events);
    }

    /// Deliver every queued event and return them in order.
    pub fn dispatch(&mut self) -> Vec<E> {
        let events: Vec<E> = self.queue.drain(..).collect();
        for event in &events {
            for (_, subscriber) in &mut self.subscribers {
                subscriber(event);
            }
        }
        events
    }

    /// Number of events waiting for dispatch
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }
}

impl<E> Default for EventBus<E> {
    fn default() -> Self {
        Self::new()
    }
}
