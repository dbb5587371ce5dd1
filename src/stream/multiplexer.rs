// src/stream/multiplexer.rs

//! Keyed fan-out of events to push-channel subscribers.
//!
//! The multiplexer is owned by the engine's runtime loop, which is the only
//! publisher, so it needs no locking. Each subscriber gets its own unbounded
//! channel: publishing never blocks the loop, and per-key order is exactly
//! publish order.

use std::collections::{HashMap, HashSet};
use std::fmt::Debug;
use std::hash::Hash;

use futures::Stream;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, trace};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum StreamError {
    #[error("no push channel registered for this id")]
    UnknownChannel,
    #[error("push channel already closed")]
    Closed,
}

#[derive(Debug)]
struct Topic<T> {
    subscribers: Vec<mpsc::UnboundedSender<T>>,
    published: u64,
}

impl<T> Default for Topic<T> {
    fn default() -> Self {
        Self {
            subscribers: Vec::new(),
            published: 0,
        }
    }
}

/// Receiving half handed to a subscriber.
///
/// Yields events in publish order and ends when the channel is closed.
#[derive(Debug)]
pub struct Subscription<T> {
    rx: mpsc::UnboundedReceiver<T>,
}

impl<T> Subscription<T> {
    pub async fn recv(&mut self) -> Option<T> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<T> {
        self.rx.try_recv().ok()
    }

    pub fn into_stream(self) -> impl Stream<Item = T> {
        futures::stream::unfold(self.rx, |mut rx| async move {
            rx.recv().await.map(|item| (item, rx))
        })
    }
}

#[derive(Debug)]
pub struct Multiplexer<K, T> {
    topics: HashMap<K, Topic<T>>,
    closed: HashSet<K>,
}

impl<K, T> Default for Multiplexer<K, T> {
    fn default() -> Self {
        Self {
            topics: HashMap::new(),
            closed: HashSet::new(),
        }
    }
}

impl<K, T> Multiplexer<K, T>
where
    K: Eq + Hash + Copy + Debug,
    T: Clone,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a channel. Returns `false` if it is already open or was
    /// closed before (closed channels are never reopened).
    pub fn open(&mut self, key: K) -> bool {
        if self.closed.contains(&key) || self.topics.contains_key(&key) {
            return false;
        }
        self.topics.insert(key, Topic::default());
        trace!(?key, "push channel opened");
        true
    }

    pub fn is_open(&self, key: &K) -> bool {
        self.topics.contains_key(key)
    }

    /// Attach a subscriber. No backlog is replayed.
    pub fn subscribe(&mut self, key: K) -> Result<Subscription<T>, StreamError> {
        self.subscribe_inner(key, None)
    }

    /// Attach a subscriber and deliver `greeting` to it alone before any
    /// later publish.
    pub fn subscribe_with_greeting(
        &mut self,
        key: K,
        greeting: T,
    ) -> Result<Subscription<T>, StreamError> {
        self.subscribe_inner(key, Some(greeting))
    }

    fn subscribe_inner(&mut self, key: K, greeting: Option<T>) -> Result<Subscription<T>, StreamError> {
        let topic = match self.topics.get_mut(&key) {
            Some(topic) => topic,
            None if self.closed.contains(&key) => return Err(StreamError::Closed),
            None => return Err(StreamError::UnknownChannel),
        };

        let (tx, rx) = mpsc::unbounded_channel();
        if let Some(greeting) = greeting {
            // Cannot fail: we still hold `rx`.
            let _ = tx.send(greeting);
        }
        topic.subscribers.push(tx);
        debug!(?key, subscribers = topic.subscribers.len(), "subscriber attached");

        Ok(Subscription { rx })
    }

    /// Deliver `event` to every live subscriber of `key`.
    ///
    /// Returns the number of subscribers it reached. Publishing to an
    /// unknown or closed channel is a no-op.
    pub fn publish(&mut self, key: K, event: T) -> usize {
        let Some(topic) = self.topics.get_mut(&key) else {
            trace!(?key, "publish to unregistered channel dropped");
            return 0;
        };

        topic.published += 1;
        topic.subscribers.retain(|tx| tx.send(event.clone()).is_ok());
        topic.subscribers.len()
    }

    /// Number of events published on an open channel.
    pub fn published(&self, key: &K) -> Option<u64> {
        self.topics.get(key).map(|t| t.published)
    }

    pub fn subscriber_count(&self, key: &K) -> usize {
        self.topics.get(key).map_or(0, |t| t.subscribers.len())
    }

    /// Close a channel; subscribers observe end-of-stream after the events
    /// already delivered. Idempotent: returns `true` only the first time.
    pub fn close(&mut self, key: K) -> bool {
        match self.topics.remove(&key) {
            Some(topic) => {
                debug!(?key, published = topic.published, "push channel closed");
                self.closed.insert(key);
                true
            }
            None => false,
        }
    }

    /// Forget a key entirely, open or closed. Later subscribes see
    /// `UnknownChannel` and the key may be opened again.
    pub fn forget(&mut self, key: &K) {
        if self.topics.remove(key).is_some() {
            trace!(?key, "open push channel forgotten");
        }
        self.closed.remove(key);
    }

    /// Number of closed keys still remembered.
    pub fn closed_count(&self) -> usize {
        self.closed.len()
    }

    /// Close every open channel (shutdown).
    pub fn close_all(&mut self) {
        let keys: Vec<K> = self.topics.keys().copied().collect();
        for key in keys {
            self.close(key);
        }
    }
}
