//! Fan-out of samples to live subscribers.
//!
//! Every subscriber owns a bounded queue. Publishing never waits on a
//! consumer: a full queue drops the new sample for that subscriber only, and
//! a queue whose receiver is gone counts as a delivery failure and is removed
//! from the registry.

use crate::sample::Sample;
use crate::shutdown::Shutdown;
use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::mpsc::{
    self,
    error::{TryRecvError, TrySendError},
};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriberId(u64);

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// Receiving end handed to a consumer on subscribe.
#[derive(Debug)]
pub struct Subscription {
    id: SubscriberId,
    rx: mpsc::Receiver<Sample>,
}

impl Subscription {
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// Blocks the calling thread until a sample arrives or the broadcaster
    /// closes / unregisters this subscriber. Must not be called from async code.
    pub fn recv_blocking(&mut self) -> Option<Sample> {
        self.rx.blocking_recv()
    }

    /// Like `recv_blocking`, but ends once `shutdown` has fired and the
    /// queue is drained. The queue is checked every `poll` while empty.
    pub fn recv_until(&mut self, shutdown: &Shutdown, poll: Duration) -> Option<Sample> {
        loop {
            match self.rx.try_recv() {
                Ok(sample) => return Some(sample),
                Err(TryRecvError::Disconnected) => return None,
                Err(TryRecvError::Empty) => {
                    if shutdown.wait_timeout(poll) {
                        return self.rx.try_recv().ok();
                    }
                }
            }
        }
    }

    /// Everything currently queued, oldest first.
    pub fn drain(&mut self) -> Vec<Sample> {
        let mut out = Vec::new();
        while let Ok(sample) = self.rx.try_recv() {
            out.push(sample);
        }
        out
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PublishOutcome {
    pub delivered: usize,
    pub dropped: usize,
    pub removed: usize,
}

struct Entry {
    id: SubscriberId,
    tx: mpsc::Sender<Sample>,
    dropped: u64,
}

#[derive(Default)]
struct Registry {
    next_id: u64,
    entries: Vec<Entry>,
    closed: bool,
}

pub struct Broadcaster {
    registry: Mutex<Registry>,
    capacity: usize,
}

impl Broadcaster {
    pub fn new(capacity: usize) -> Self {
        Self {
            registry: Mutex::new(Registry::default()),
            capacity: capacity.max(1),
        }
    }

    fn registry(&self) -> MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn subscribe(&self) -> Subscription {
        let (tx, rx) = mpsc::channel(self.capacity);
        let mut registry = self.registry();
        let id = SubscriberId(registry.next_id);
        registry.next_id += 1;

        if registry.closed {
            // Sender dropped here, so the subscription reads end-of-stream.
            debug!(subscriber = %id, "Subscribe after close");
        } else {
            registry.entries.push(Entry { id, tx, dropped: 0 });
            info!(subscriber = %id, total = registry.entries.len(), "Subscriber registered");
        }
        Subscription { id, rx }
    }

    pub fn unsubscribe(&self, id: SubscriberId) -> bool {
        let mut registry = self.registry();
        let before = registry.entries.len();
        registry.entries.retain(|entry| entry.id != id);
        let removed = registry.entries.len() != before;
        if removed {
            info!(subscriber = %id, total = registry.entries.len(), "Subscriber removed");
        }
        removed
    }

    /// One non-blocking delivery attempt per registered subscriber.
    pub fn publish(&self, sample: &Sample) -> PublishOutcome {
        let mut outcome = PublishOutcome::default();
        let mut registry = self.registry();

        registry.entries.retain_mut(|entry| match entry.tx.try_send(*sample) {
            Ok(()) => {
                outcome.delivered += 1;
                true
            }
            Err(TrySendError::Full(_)) => {
                entry.dropped += 1;
                outcome.dropped += 1;
                debug!(subscriber = %entry.id, dropped = entry.dropped, "Subscriber queue full, sample dropped");
                true
            }
            Err(TrySendError::Closed(_)) => {
                outcome.removed += 1;
                warn!(subscriber = %entry.id, "Delivery failed, removing subscriber");
                false
            }
        });

        outcome
    }

    pub fn subscriber_count(&self) -> usize {
        self.registry().entries.len()
    }

    /// Drops every queue; blocked receivers observe end-of-stream.
    pub fn close(&self) {
        let mut registry = self.registry();
        registry.closed = true;
        let count = registry.entries.len();
        registry.entries.clear();
        debug!(subscribers = count, "Broadcaster closed");
    }

    pub fn is_closed(&self) -> bool {
        self.registry().closed
    }
}
