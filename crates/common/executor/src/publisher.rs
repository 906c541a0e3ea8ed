use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::warn;

/// A publish-only fan-out stream.
///
/// Each subscriber gets its own bounded channel. A subscriber whose channel is full when a value
/// is published is disconnected instead of being buffered for, and subscribers that dropped their
/// receiver are pruned on the next publish. A replaying publisher hands the most recent value to
/// every new subscriber first.
pub struct Publisher<T> {
    name: &'static str,
    capacity: usize,
    replay_last: bool,
    inner: Arc<Mutex<Inner<T>>>,
}

struct Inner<T> {
    last: Option<T>,
    subscribers: Vec<mpsc::Sender<T>>,
}

impl<T> Clone for Publisher<T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name,
            capacity: self.capacity,
            replay_last: self.replay_last,
            inner: self.inner.clone(),
        }
    }
}

impl<T: Clone> Publisher<T> {
    pub fn new(name: &'static str, capacity: usize) -> Self {
        Self::build(name, capacity, false)
    }

    /// Publisher that keeps the last value and replays it on subscribe.
    pub fn replay_last(name: &'static str, capacity: usize) -> Self {
        Self::build(name, capacity, true)
    }

    fn build(name: &'static str, capacity: usize, replay_last: bool) -> Self {
        Self {
            name,
            capacity: capacity.max(1),
            replay_last,
            inner: Arc::new(Mutex::new(Inner {
                last: None,
                subscribers: vec![],
            })),
        }
    }

    pub fn publish(&self, value: T) {
        let mut inner = self.inner.lock();
        let name = self.name;
        inner
            .subscribers
            .retain(|subscriber| match subscriber.try_send(value.clone()) {
                Ok(()) => true,
                Err(TrySendError::Full(_)) => {
                    warn!(stream = name, "Subscriber can not keep up, disconnecting");
                    false
                }
                Err(TrySendError::Closed(_)) => false,
            });
        if self.replay_last {
            inner.last = Some(value);
        }
    }

    pub fn subscribe(&self) -> mpsc::Receiver<T> {
        let (sender, receiver) = mpsc::channel(self.capacity);
        let mut inner = self.inner.lock();
        if let Some(last) = &inner.last {
            // fresh channel with capacity >= 1
            let _ = sender.try_send(last.clone());
        }
        inner.subscribers.push(sender);
        receiver
    }

    /// The last published value, if this publisher replays.
    pub fn latest(&self) -> Option<T> {
        self.inner.lock().last.clone()
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.lock().subscribers.len()
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}
