//! Position store module
//!
//! Durable local cache of partition offsets plus the set of partitions
//! changed since they were last broadcast.
//!
//! # Overview
//!
//! The store module provides:
//! - `PositionStore` - File-based table persistence with atomic writes
//! - `PendingSet` - Dirty partitions with a race-free swap-for-empty

mod pending;
mod table;

pub use pending::PendingSet;
pub use table::PositionStore;
