//! Replication module
//!
//! Boundary to the replicated log that carries position messages between
//! workers, plus an in-process implementation of it.
//!
//! # Delivery Semantics
//!
//! Logs deliver at least once, in no particular order, possibly duplicated,
//! and to the sender itself. A failed delivery surfaces as an `Err` item on
//! the delivery channel and affects that message only.

mod local;
mod message;

pub use local::{LocalLog, LocalLogNetwork};
pub use message::{MessageKind, PositionMessage};

use crate::error::Result;
use async_trait::async_trait;
use tokio::sync::mpsc;

/// One inbound message, or the reason it could not be received
pub type Delivery = Result<PositionMessage>;

/// Broadcast channel shared by all workers of a cluster
#[async_trait]
pub trait ReplicatedLog: Send + Sync {
    /// Start consuming; every delivered message is pushed to the returned channel
    async fn subscribe(&self) -> Result<mpsc::Receiver<Delivery>>;

    /// Broadcast a message to all live workers without waiting for acknowledgement
    fn send(&self, message: PositionMessage);

    /// Stop consuming
    async fn unsubscribe(&self);
}

#[cfg(test)]
mod tests;
