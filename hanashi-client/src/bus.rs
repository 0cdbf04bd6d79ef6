use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::api::{BusEvent, NodePath};

/// In-process broadcast of confirmed mutations.
///
/// Every subscriber registers the address it displays, and only receives
/// events whose target lies on the same branch of the tree. Delivery is
/// FIFO per subscriber; an inbox is drained by its owner.
#[derive(Clone, Debug, Default)]
pub struct EventBus(Arc<Mutex<Subscribers>>);

#[derive(Debug, Default)]
struct Subscribers {
    next_id: u64,
    published: u64,
    list: Vec<Subscriber>,
}

#[derive(Debug)]
struct Subscriber {
    id: u64,
    address: NodePath,
    // Note: this must stay unbounded, publishing never waits on a slow view
    sender: mpsc::UnboundedSender<Arc<BusEvent>>,
}

/// Inbox of one subscriber. Dropping it unsubscribes.
#[derive(Debug)]
pub struct Subscription {
    id: u64,
    address: NodePath,
    receiver: mpsc::UnboundedReceiver<Arc<BusEvent>>,
    bus: Weak<Mutex<Subscribers>>,
}

impl EventBus {
    pub fn new() -> EventBus {
        EventBus::default()
    }

    pub fn subscribe(&self, address: NodePath) -> Subscription {
        let (sender, receiver) = mpsc::unbounded_channel();
        let mut subs = self.0.lock();
        let id = subs.next_id;
        subs.next_id += 1;
        subs.list.push(Subscriber {
            id,
            address: address.clone(),
            sender,
        });
        tracing::trace!(id, %address, "new bus subscriber");
        Subscription {
            id,
            address,
            receiver,
            bus: Arc::downgrade(&self.0),
        }
    }

    /// Returns the number of subscribers the event was delivered to
    pub fn publish(&self, event: BusEvent) -> usize {
        let target = event.target();
        let event = Arc::new(event);
        let mut subs = self.0.lock();
        subs.published += 1;
        let mut delivered = 0;
        subs.list.retain(|s| {
            if !s.address.is_related_to(&target) {
                return true;
            }
            match s.sender.send(event.clone()) {
                Ok(()) => {
                    delivered += 1;
                    true
                }
                // receiver is gone without having unsubscribed
                Err(_) => false,
            }
        });
        tracing::trace!(kind = event.kind(), %target, delivered, "published bus event");
        delivered
    }

    pub fn subscriber_count(&self) -> usize {
        self.0.lock().list.len()
    }

    /// Number of events published since creation
    pub fn published_count(&self) -> u64 {
        self.0.lock().published
    }
}

impl Subscription {
    pub fn address(&self) -> &NodePath {
        &self.address
    }

    /// Next undelivered event, without waiting
    pub fn try_next(&mut self) -> Option<Arc<BusEvent>> {
        self.receiver.try_recv().ok()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(bus) = self.bus.upgrade() {
            bus.lock().list.retain(|s| s.id != self.id);
        }
    }
}
