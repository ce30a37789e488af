//! In-process `ReplicatedLog` implementation
//!
//! Uses `tokio::sync::broadcast` per topic. A shared `LocalLogNetwork`
//! connects every `LocalLog` that joined the same topic, which is enough to
//! run a whole cluster of workers inside one process.

use super::{Delivery, PositionMessage, ReplicatedLog};
use crate::error::{Error, Result};
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, Mutex, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

/// Messages buffered per topic before slow subscribers start lagging
const DEFAULT_TOPIC_CAPACITY: usize = 1024;

/// Deliveries buffered between the topic and the consumer
const DELIVERY_BUFFER: usize = 256;

/// Shared broadcast network routing encoded messages between `LocalLog` instances.
#[derive(Clone, Debug)]
pub struct LocalLogNetwork {
    topics: Arc<RwLock<HashMap<String, broadcast::Sender<Bytes>>>>,
    capacity: usize,
}

impl LocalLogNetwork {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_TOPIC_CAPACITY)
    }

    /// Create a network whose topics buffer `capacity` messages
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            topics: Arc::new(RwLock::new(HashMap::new())),
            capacity: capacity.max(1),
        }
    }

    /// Join a topic as the given worker.
    pub async fn join(&self, topic: impl Into<String>, worker_id: impl Into<String>) -> LocalLog {
        let topic = topic.into();
        let sender = self.get_or_create(&topic).await;
        LocalLog {
            worker_id: worker_id.into(),
            topic,
            sender,
            token: Mutex::new(None),
        }
    }

    /// Get or create the broadcast channel for a topic.
    async fn get_or_create(&self, topic: &str) -> broadcast::Sender<Bytes> {
        let mut topics = self.topics.write().await;
        topics
            .entry(topic.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .clone()
    }
}

impl Default for LocalLogNetwork {
    fn default() -> Self {
        Self::new()
    }
}

/// One worker's handle on a topic of a [`LocalLogNetwork`]
pub struct LocalLog {
    worker_id: String,
    topic: String,
    sender: broadcast::Sender<Bytes>,
    token: Mutex<Option<CancellationToken>>,
}

impl LocalLog {
    /// Worker that owns this handle
    pub fn worker_id(&self) -> &str {
        &self.worker_id
    }

    /// Topic this handle publishes to
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Publish an already encoded payload as is.
    pub fn publish_raw(&self, payload: Bytes) {
        if self.sender.send(payload).is_err() {
            debug!(topic = %self.topic, "No subscribers on topic, message dropped");
        }
    }
}

#[async_trait]
impl ReplicatedLog for LocalLog {
    async fn subscribe(&self) -> Result<mpsc::Receiver<Delivery>> {
        // Tear down existing subscription if any
        self.unsubscribe().await;

        let mut receiver = self.sender.subscribe();
        let (delivery_tx, delivery_rx) = mpsc::channel(DELIVERY_BUFFER);

        let token = CancellationToken::new();
        *self.token.lock().await = Some(token.clone());

        let worker_id = self.worker_id.clone();
        let topic = self.topic.clone();
        tokio::spawn(async move {
            loop {
                let delivery = tokio::select! {
                    _ = token.cancelled() => break,
                    result = receiver.recv() => match result {
                        Ok(payload) => PositionMessage::decode(&payload),
                        Err(broadcast::error::RecvError::Lagged(n)) => {
                            warn!(worker_id = %worker_id, topic = %topic, lagged = n, "Local log receiver lagged");
                            Err(Error::delivery(format!("{n} messages skipped on topic '{topic}'")))
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                };

                if delivery_tx.send(delivery).await.is_err() {
                    break;
                }
            }
            trace!(worker_id = %worker_id, topic = %topic, "Local log consumer exited");
        });

        debug!(worker_id = %self.worker_id, topic = %self.topic, "LocalLog subscribed");
        Ok(delivery_rx)
    }

    fn send(&self, message: PositionMessage) {
        match message.encode() {
            Ok(payload) => {
                trace!(
                    worker_id = %self.worker_id,
                    kind = %message.kind(),
                    positions = message.positions().len(),
                    "Publishing position message"
                );
                self.publish_raw(payload);
            }
            Err(e) => warn!(worker_id = %self.worker_id, error = %e, "Failed to encode position message"),
        }
    }

    async fn unsubscribe(&self) {
        if let Some(token) = self.token.lock().await.take() {
            token.cancel();
        }
    }
}

impl std::fmt::Debug for LocalLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalLog")
            .field("worker_id", &self.worker_id)
            .field("topic", &self.topic)
            .finish()
    }
}
