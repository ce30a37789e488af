//! Error types for Solidafy positions
//!
//! This module defines the error hierarchy for the entire crate.
//! All public APIs return `Result<T, Error>` where Error is defined here.

use thiserror::Error;

/// The main error type for Solidafy positions
#[derive(Error, Debug)]
pub enum Error {
    // ============================================================================
    // Configuration Errors
    // ============================================================================
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Missing required config field: {field}")]
    MissingConfigField { field: String },

    #[error("Invalid config value for '{field}': {message}")]
    InvalidConfigValue { field: String, message: String },

    // ============================================================================
    // Position Store Errors
    // ============================================================================
    #[error("State error: {message}")]
    State { message: String },

    #[error("Persist failed: {message}")]
    Persist { message: String },

    // ============================================================================
    // Replication Errors
    // ============================================================================
    #[error("Delivery failed: {message}")]
    Delivery { message: String },

    #[error("Invalid message kind: {kind}")]
    UnknownMessageKind { kind: String },

    // ============================================================================
    // Service Errors
    // ============================================================================
    #[error("Cannot {operation} while service is {state}")]
    Lifecycle {
        operation: &'static str,
        state: String,
    },

    // ============================================================================
    // Source Errors
    // ============================================================================
    #[error("Source error: {message}")]
    Source { message: String },

    #[error("Operation cancelled")]
    Cancelled,

    // ============================================================================
    // I/O and Serialization Errors
    // ============================================================================
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("File not found: {path}")]
    FileNotFound { path: String },
}

impl Error {
    /// Create a config error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a missing field error
    pub fn missing_field(field: impl Into<String>) -> Self {
        Self::MissingConfigField {
            field: field.into(),
        }
    }

    /// Create an invalid config value error
    pub fn invalid_value(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidConfigValue {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create a state error
    pub fn state(message: impl Into<String>) -> Self {
        Self::State {
            message: message.into(),
        }
    }

    /// Create a persist error
    pub fn persist(message: impl Into<String>) -> Self {
        Self::Persist {
            message: message.into(),
        }
    }

    /// Create a delivery error
    pub fn delivery(message: impl Into<String>) -> Self {
        Self::Delivery {
            message: message.into(),
        }
    }

    /// Create a lifecycle error
    pub fn lifecycle(operation: &'static str, state: impl ToString) -> Self {
        Self::Lifecycle {
            operation,
            state: state.to_string(),
        }
    }

    /// Create a source error
    pub fn source_error(message: impl Into<String>) -> Self {
        Self::Source {
            message: message.into(),
        }
    }

    /// Create a file not found error
    pub fn file_not_found(path: impl Into<String>) -> Self {
        Self::FileNotFound { path: path.into() }
    }
}

/// Result type alias for Solidafy positions
pub type Result<T> = std::result::Result<T, Error>;
