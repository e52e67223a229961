// Confirmation Bus
// Process-wide fan-out channel decoupling the scheduler from whatever
// approves actions

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::mpsc;
use tracing::debug;

use warden_protocol::ConfirmationMessage;

/// Bus topics used by this core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    /// Confirmation requests, consumed by whichever approver is attached.
    Requests,
    /// Confirmation responses, consumed by coordinators.
    Responses,
}

struct BusSubscriber {
    id: u64,
    tx: mpsc::UnboundedSender<ConfirmationMessage>,
}

#[derive(Default)]
struct BusState {
    subscribers: HashMap<Topic, Vec<BusSubscriber>>,
}

/// Cheaply cloneable pub/sub bus shared by every scheduler in the process.
///
/// Delivery is simple fan-out to all current subscribers of a topic; a
/// message published with no subscriber attached is dropped, so callers
/// must subscribe before publishing anything they intend to receive.
#[derive(Clone, Default)]
pub struct ConfirmationBus {
    state: Arc<Mutex<BusState>>,
    next_id: Arc<AtomicU64>,
}

impl ConfirmationBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, topic: Topic) -> Subscription {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.lock_state()
            .subscribers
            .entry(topic)
            .or_default()
            .push(BusSubscriber { id, tx });
        Subscription {
            bus: self.clone(),
            topic,
            id,
            rx,
            closed: false,
        }
    }

    /// Deliver to every current subscriber of the topic. Returns the
    /// delivered count; zero means the message went nowhere.
    pub fn publish(&self, topic: Topic, message: ConfirmationMessage) -> usize {
        let mut state = self.lock_state();
        let Some(subscribers) = state.subscribers.get_mut(&topic) else {
            debug!(?topic, "dropping message: no subscriber");
            return 0;
        };
        // Prune subscribers whose receiving half is gone while delivering.
        subscribers.retain(|subscriber| subscriber.tx.send(message.clone()).is_ok());
        let delivered = subscribers.len();
        if delivered == 0 {
            debug!(?topic, "dropping message: no subscriber");
        }
        delivered
    }

    pub fn subscriber_count(&self, topic: Topic) -> usize {
        self.lock_state()
            .subscribers
            .get(&topic)
            .map_or(0, Vec::len)
    }

    fn unsubscribe(&self, topic: Topic, id: u64) {
        let mut state = self.lock_state();
        if let Some(subscribers) = state.subscribers.get_mut(&topic) {
            subscribers.retain(|subscriber| subscriber.id != id);
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, BusState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

/// Receiving end of one topic subscription. Unsubscribing is explicit and
/// also runs on drop; both are idempotent.
pub struct Subscription {
    bus: ConfirmationBus,
    topic: Topic,
    id: u64,
    rx: mpsc::UnboundedReceiver<ConfirmationMessage>,
    closed: bool,
}

impl Subscription {
    pub async fn recv(&mut self) -> Option<ConfirmationMessage> {
        self.rx.recv().await
    }

    pub fn unsubscribe(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.bus.unsubscribe(self.topic, self.id);
        self.rx.close();
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}
