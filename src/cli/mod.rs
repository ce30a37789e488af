//! CLI module
//!
//! Command-line interface for inspecting and driving a worker.
//!
//! # Commands
//!
//! - `show` - Print the persisted position table
//! - `tail` - Follow a file, recording progress in the position service
//! - `forget` - Remove stored positions for files

mod commands;
mod runner;

pub use commands::{Cli, Commands, OutputFormat};
pub use runner::Runner;
