//! Typed message queues shared between the receive task and consumers
//!
//! A queue is either unbounded (chat, identity, game traffic: nothing may be
//! lost) or bounded with a drop-oldest policy (video frames: the newest frame
//! always wins).

use std::collections::VecDeque;
use std::pin::pin;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::Notify;
use tokio::time::Instant;

#[derive(Debug)]
struct QueueState<T> {
    items: VecDeque<T>,
    dropped: u64,
}

/// FIFO queue with an async pop-with-timeout
#[derive(Debug)]
pub struct MessageQueue<T> {
    state: Mutex<QueueState<T>>,
    notify: Notify,
    capacity: Option<usize>,
}

impl<T> MessageQueue<T> {
    /// Queue that never discards
    pub fn unbounded() -> Self {
        Self::with_capacity(None)
    }

    /// Queue holding at most `capacity` items, evicting the oldest on overflow
    pub fn bounded(capacity: usize) -> Self {
        Self::with_capacity(Some(capacity.max(1)))
    }

    fn with_capacity(capacity: Option<usize>) -> Self {
        Self {
            state: Mutex::new(QueueState {
                items: VecDeque::with_capacity(capacity.unwrap_or(0)),
                dropped: 0,
            }),
            notify: Notify::new(),
            capacity,
        }
    }

    fn lock(&self) -> MutexGuard<'_, QueueState<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Enqueue an item, returning the item evicted to make room, if any
    pub fn push(&self, item: T) -> Option<T> {
        let evicted = {
            let mut state = self.lock();
            let evicted = match self.capacity {
                Some(capacity) if state.items.len() >= capacity => state.items.pop_front(),
                _ => None,
            };
            if evicted.is_some() {
                state.dropped += 1;
            }
            state.items.push_back(item);
            evicted
        };
        self.notify.notify_waiters();
        evicted
    }

    /// Pop the oldest item without waiting
    pub fn try_pop(&self) -> Option<T> {
        self.lock().items.pop_front()
    }

    /// Pop the oldest item, waiting up to `timeout` for one to arrive
    pub async fn pop(&self, timeout: Duration) -> Option<T> {
        let deadline = Instant::now() + timeout;
        loop {
            let mut notified = pin!(self.notify.notified());
            notified.as_mut().enable();

            if let Some(item) = self.try_pop() {
                return Some(item);
            }

            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return self.try_pop();
            }
        }
    }

    /// Remove and return everything queued, oldest first
    pub fn drain(&self) -> Vec<T> {
        self.lock().items.drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().items.is_empty()
    }

    /// Items discarded by the drop-oldest policy so far
    pub fn dropped(&self) -> u64 {
        self.lock().dropped
    }

    pub fn capacity(&self) -> Option<usize> {
        self.capacity
    }
}
