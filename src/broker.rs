//! Topic-based publish/subscribe contract used for live delivery, and an
//! in-process implementation over `tokio::sync::broadcast`.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::broadcast;
use tracing::{debug, warn};

#[derive(Debug, thiserror::Error)]
pub enum BrokerError {
    #[error("broker is shut down")]
    Closed,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

#[async_trait]
pub trait Broker: Send + Sync {
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), BrokerError>;

    /// Completes the subscription handshake; payloads published after this
    /// returns are observable through the handle.
    async fn subscribe(&self, topic: &str) -> Result<Box<dyn Subscription>, BrokerError>;
}

#[async_trait]
pub trait Subscription: Send {
    /// Next raw payload, or `None` once the broker closed the topic.
    /// Must be cancel safe.
    async fn next_payload(&mut self) -> Option<Vec<u8>>;

    async fn close(self: Box<Self>);
}

type Topics = Arc<DashMap<String, broadcast::Sender<Vec<u8>>>>;

/// Topics exist while they have subscribers.
pub struct LocalBroker {
    topics: Topics,
    capacity: usize,
    closed: AtomicBool,
}

impl LocalBroker {
    pub fn new(capacity: usize) -> Self {
        Self {
            topics: Arc::default(),
            capacity: capacity.max(1),
            closed: AtomicBool::new(false),
        }
    }

    /// Closes every topic. Live subscriptions drain what they already
    /// received and then end; later publish/subscribe calls fail.
    pub fn shutdown(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.topics.clear();
    }

    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.topics.get(topic).map_or(0, |tx| tx.receiver_count())
    }

    fn ensure_open(&self) -> Result<(), BrokerError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(BrokerError::Closed);
        }
        Ok(())
    }

    fn attach(&self, topic: &str) -> Result<broadcast::Receiver<Vec<u8>>, BrokerError> {
        let rx = self
            .topics
            .entry(topic.to_owned())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe();

        // a shutdown that cleared the map before our insert would never close it
        if self.closed.load(Ordering::SeqCst) {
            drop(rx);
            release(&self.topics, topic);
            return Err(BrokerError::Closed);
        }
        Ok(rx)
    }
}

#[async_trait]
impl Broker for LocalBroker {
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), BrokerError> {
        self.ensure_open()?;

        let Some(tx) = self.topics.get(topic) else {
            debug!(topic, "publish without subscribers");
            return Ok(());
        };

        // nobody listening is not an error
        let receivers = tx.send(payload).unwrap_or(0);
        debug!(topic, receivers, "published");
        Ok(())
    }

    async fn subscribe(&self, topic: &str) -> Result<Box<dyn Subscription>, BrokerError> {
        self.ensure_open()?;
        let rx = self.attach(topic)?;

        Ok(Box::new(LocalSubscription {
            topic: topic.to_owned(),
            rx,
            topics: self.topics.clone(),
        }))
    }
}

fn release(topics: &Topics, topic: &str) {
    topics.remove_if(topic, |_, tx| tx.receiver_count() == 0);
}

struct LocalSubscription {
    topic: String,
    rx: broadcast::Receiver<Vec<u8>>,
    topics: Topics,
}

#[async_trait]
impl Subscription for LocalSubscription {
    async fn next_payload(&mut self) -> Option<Vec<u8>> {
        loop {
            match self.rx.recv().await {
                Ok(payload) => return Some(payload),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(topic = %self.topic, "subscription lagged {} payloads", n);
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    async fn close(self: Box<Self>) {
        let LocalSubscription { topic, rx, topics } = *self;
        drop(rx);
        release(&topics, &topic);
        debug!(%topic, "subscription released");
    }
}
