//! Source module
//!
//! Readers that consume external data and keep their progress in the
//! position service.
//!
//! # Overview
//!
//! - `FileLineSource` - Tails a text file line by line, resuming from the
//!   stored `next_position`
//! - `RetryPolicy` - Backoff used while waiting for a missing resource

mod file;
mod retry;

pub use file::{
    file_offset, file_partition, split_line, FileLineSource, FileSourceConfig, SourceRecord,
    FILENAME_KEY, NEXT_POSITION_KEY,
};
pub use retry::RetryPolicy;
