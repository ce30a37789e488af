//! Worker configuration
//!
//! Settings a worker needs to run the position service, loaded from a
//! YAML (or JSON) file.
//!
//! ```yaml
//! worker_id: worker-1
//! store_dir: /var/lib/solidafy
//! position_topic: position-topic
//! sync_interval_ms: 5000
//! persist_interval_ms: 20000
//! ```

use crate::error::{Error, Result};
use crate::service::ServiceConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Name of the position file inside the store directory
pub const POSITION_FILE_NAME: &str = "position.json";

// ============================================================================
// Worker Config
// ============================================================================

/// Complete worker configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Unique id of this worker within the cluster
    pub worker_id: String,

    /// Directory holding local durable state
    #[serde(default = "default_store_dir")]
    pub store_dir: PathBuf,

    /// Replicated log topic shared by all workers
    #[serde(default = "default_position_topic")]
    pub position_topic: String,

    /// Broadcast pending positions every N milliseconds
    #[serde(default)]
    pub sync_interval_ms: Option<u64>,

    /// Persist the position table every N milliseconds
    #[serde(default)]
    pub persist_interval_ms: Option<u64>,
}

fn default_store_dir() -> PathBuf {
    PathBuf::from("./store")
}

fn default_position_topic() -> String {
    "position-topic".to_string()
}

impl WorkerConfig {
    /// Create a config with defaults for everything but the worker id
    pub fn new(worker_id: impl Into<String>) -> Self {
        Self {
            worker_id: worker_id.into(),
            store_dir: default_store_dir(),
            position_topic: default_position_topic(),
            sync_interval_ms: None,
            persist_interval_ms: None,
        }
    }

    /// Load and validate a config file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::config(format!("Config file '{}' not found", path.display()))
            } else {
                Error::config(format!(
                    "Failed to read config file '{}': {}",
                    path.display(),
                    e
                ))
            }
        })?;
        Self::from_str(&content)
    }

    /// Parse and validate a YAML or JSON string
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(content: &str) -> Result<Self> {
        let config: WorkerConfig = serde_yaml::from_str(content)
            .map_err(|e| Error::config(format!("Failed to parse worker config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate field values
    pub fn validate(&self) -> Result<()> {
        if self.worker_id.trim().is_empty() {
            return Err(Error::missing_field("worker_id"));
        }

        if self.position_topic.trim().is_empty() {
            return Err(Error::invalid_value(
                "position_topic",
                "topic cannot be empty",
            ));
        }

        for (field, value) in [
            ("sync_interval_ms", self.sync_interval_ms),
            ("persist_interval_ms", self.persist_interval_ms),
        ] {
            if value == Some(0) {
                return Err(Error::invalid_value(field, "interval must be positive"));
            }
        }

        Ok(())
    }

    /// Path of the position file
    pub fn position_path(&self) -> PathBuf {
        self.store_dir.join(POSITION_FILE_NAME)
    }

    /// Background flush settings for the position service
    pub fn service_config(&self) -> ServiceConfig {
        ServiceConfig {
            sync_interval: self.sync_interval_ms.map(Duration::from_millis),
            persist_interval: self.persist_interval_ms.map(Duration::from_millis),
        }
    }
}
