// Allow common clippy pedantic lints that aren't critical for this codebase
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_lossless)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::unused_self)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::items_after_statements)]
#![allow(clippy::unnecessary_wraps)]
#![allow(clippy::match_same_arms)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::unused_async)]

//! # Solidafy Positions
//!
//! Distributed position management for connector workers. Every worker keeps
//! a local, durable table of how far it has read each source partition and
//! shares changes with its peers over a replicated log, so any worker can
//! resume any partition after a restart or rebalance.
//!
//! ## Features
//!
//! - **Durable table**: Atomic file persistence, reloaded on start
//! - **Batched broadcast**: Local changes are collected and flushed together
//! - **Convergence**: Inbound changes merge idempotently; new workers announce
//!   themselves and receive the full table
//! - **Listeners**: Callbacks fire whenever a merge changes the table
//! - **File source**: Resumable line reader built on the service
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use solidafy_positions::{LocalLogNetwork, Offset, Partition, PositionService, PositionStore};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> solidafy_positions::Result<()> {
//!     let network = LocalLogNetwork::new();
//!     let log = network.join("position-topic", "worker-1").await;
//!     let service = PositionService::new(PositionStore::new("./store/position.json"), Arc::new(log));
//!     service.start().await?;
//!
//!     let partition = Partition::new().with("path", "/data/a.log");
//!     service.put_position(partition, Offset::new().with("next", "120")).await;
//!     service.synchronize().await;
//!
//!     service.stop().await
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────┐
//! │                       PositionService                          │
//! │  put/get/remove    synchronize    start/stop    listeners      │
//! └───────────────────────────────────────────────────────────────┘
//!          │                    │                      │
//! ┌────────┴───────┬────────────┴─────────┬────────────┴─────────┐
//! │     Store      │         Sync         │        Source        │
//! ├────────────────┼──────────────────────┼──────────────────────┤
//! │ PositionStore  │ ReplicatedLog        │ FileLineSource       │
//! │ PendingSet     │ PositionMessage      │ RetryPolicy          │
//! │                │ LocalLog             │                      │
//! └────────────────┴──────────────────────┴──────────────────────┘
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::doc_markdown)]
#![allow(missing_docs)] // TODO: Add docs before 1.0 release

// ============================================================================
// Module declarations
// ============================================================================

/// Error types
pub mod error;

/// Common types and type aliases
pub mod types;

/// Persistent position table and pending set
pub mod store;

/// Replicated log boundary and wire messages
pub mod sync;

/// Position management service
pub mod service;

/// Sources that record progress in the service
pub mod source;

/// Worker configuration
pub mod config;

/// Command-line interface
pub mod cli;

// ============================================================================
// Re-exports
// ============================================================================

pub use error::{Error, Result};
pub use types::*;

pub use config::WorkerConfig;
pub use service::{ListenerId, PositionService, PositionUpdateListener, ServiceConfig, ServiceState};
pub use store::PositionStore;
pub use sync::{LocalLog, LocalLogNetwork, MessageKind, PositionMessage, ReplicatedLog};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name
pub const NAME: &str = env!("CARGO_PKG_NAME");
