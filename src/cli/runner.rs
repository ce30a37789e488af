//! CLI runner - executes commands

use crate::cli::commands::{Cli, Commands, OutputFormat};
use crate::config::WorkerConfig;
use crate::error::{Error, Result};
use crate::service::PositionService;
use crate::source::{file_partition, FileLineSource, FileSourceConfig, NEXT_POSITION_KEY};
use crate::store::PositionStore;
use crate::sync::LocalLogNetwork;
use crate::types::PositionTable;
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Worker id used when neither a config file nor `--worker-id` names one
const DEFAULT_WORKER_ID: &str = "worker-1";

/// CLI runner
pub struct Runner {
    cli: Cli,
}

impl Runner {
    /// Create a new runner
    pub fn new(cli: Cli) -> Self {
        Self { cli }
    }

    /// Run the CLI command
    pub async fn run(&self) -> Result<()> {
        let config = self.load_config()?;
        match &self.cli.command {
            Commands::Show => self.show(&config).await,
            Commands::Tail { file, batch_size } => self.tail(&config, file, *batch_size).await,
            Commands::Forget { files } => self.forget(&config, files).await,
        }
    }

    /// Resolve the worker config from file and flag overrides
    fn load_config(&self) -> Result<WorkerConfig> {
        let mut config = match &self.cli.config {
            Some(path) => WorkerConfig::load(path)?,
            None => WorkerConfig::new(DEFAULT_WORKER_ID),
        };

        if let Some(worker_id) = &self.cli.worker_id {
            config.worker_id.clone_from(worker_id);
        }
        if let Some(store_dir) = &self.cli.store_dir {
            config.store_dir.clone_from(store_dir);
        }

        config.validate()?;
        Ok(config)
    }

    /// Print the persisted table
    async fn show(&self, config: &WorkerConfig) -> Result<()> {
        let store = PositionStore::new(config.position_path());
        store.load().await?;

        let table = store.snapshot().await;
        self.output_message(&json!({
            "type": "POSITIONS",
            "worker_id": config.worker_id,
            "path": config.position_path(),
            "positions": positions_json(&table)
        }));
        Ok(())
    }

    /// Follow a file until Ctrl-C
    async fn tail(&self, config: &WorkerConfig, file: &Path, batch_size: usize) -> Result<()> {
        let network = LocalLogNetwork::new();
        let log = network
            .join(config.position_topic.clone(), config.worker_id.clone())
            .await;
        let service = PositionService::with_config(
            PositionStore::new(config.position_path()),
            Arc::new(log),
            config.service_config(),
        );
        service.start().await?;

        let cancel = CancellationToken::new();
        let signal_token = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Interrupt received, shutting down");
            }
            signal_token.cancel();
        });

        let source_config = FileSourceConfig::new(file).batch_size(batch_size);
        let mut source = FileLineSource::new(source_config, service.clone(), cancel);

        let outcome = loop {
            match source.poll().await {
                Ok(records) => {
                    for record in &records {
                        self.output_message(&json!({
                            "type": "RECORD",
                            "record": {
                                "filename": file,
                                "line": record.line,
                                "next_position": record.offset.get(NEXT_POSITION_KEY),
                                "emitted_at": record.emitted_at.to_rfc3339()
                            }
                        }));
                    }
                    source.commit(&records).await;
                }
                Err(Error::Cancelled) => break Ok(()),
                Err(e) => break Err(e),
            }
        };
        source.close();

        let stopped = service.stop().await;
        if let Err(e) = &stopped {
            warn!(error = %e, "Failed to stop position service cleanly");
        }

        self.output_message(&json!({
            "type": "STATE",
            "worker_id": config.worker_id,
            "positions": positions_json(&service.get_position_table().await)
        }));

        outcome.and(stopped)
    }

    /// Remove stored positions for the given files
    async fn forget(&self, config: &WorkerConfig, files: &[PathBuf]) -> Result<()> {
        let store = PositionStore::new(config.position_path());
        store.load().await?;

        let mut removed = Vec::new();
        for file in files {
            if store.remove(&file_partition(file)).await.is_some() {
                removed.push(file.to_string_lossy().to_string());
            } else {
                warn!(file = %file.display(), "No stored position for file");
            }
        }

        if !removed.is_empty() {
            store.persist().await?;
        }

        self.output_message(&json!({
            "type": "FORGOTTEN",
            "removed": removed
        }));
        Ok(())
    }

    /// Output a message
    fn output_message(&self, msg: &Value) {
        match self.cli.format {
            OutputFormat::Json => {
                println!("{}", serde_json::to_string(msg).unwrap_or_default());
            }
            OutputFormat::Pretty => {
                println!("{}", serde_json::to_string_pretty(msg).unwrap_or_default());
            }
        }
    }
}

/// Table as a list of `{partition, offset}` objects, sorted for stable output
fn positions_json(table: &PositionTable) -> Vec<Value> {
    let mut entries: Vec<_> = table.iter().collect();
    entries.sort();
    entries
        .into_iter()
        .map(|(partition, offset)| {
            json!({
                "partition": partition,
                "offset": offset
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Offset, Partition};
    use clap::Parser;

    fn runner(args: &[&str]) -> Runner {
        let mut argv = vec!["solidafy-positions"];
        argv.extend_from_slice(args);
        Runner::new(Cli::try_parse_from(argv).unwrap())
    }

    #[test]
    fn test_config_from_flags() {
        let config = runner(&["--worker-id", "w9", "--store-dir", "/tmp/s", "show"])
            .load_config()
            .unwrap();

        assert_eq!(config.worker_id, "w9");
        assert_eq!(config.position_path(), PathBuf::from("/tmp/s/position.json"));
    }

    #[test]
    fn test_flags_override_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("worker.yaml");
        std::fs::write(&path, "worker_id: from-file\nstore_dir: /var/a\n").unwrap();

        let config = runner(&["--config", path.to_str().unwrap(), "--store-dir", "/var/b", "show"])
            .load_config()
            .unwrap();

        assert_eq!(config.worker_id, "from-file");
        assert_eq!(config.store_dir, PathBuf::from("/var/b"));
    }

    #[test]
    fn test_blank_worker_id_rejected() {
        assert!(runner(&["--worker-id", " ", "show"]).load_config().is_err());
    }

    #[tokio::test]
    async fn test_forget_removes_and_persists() {
        let dir = tempfile::tempdir().unwrap();
        let store_dir = dir.path().to_str().unwrap();

        let store = PositionStore::new(dir.path().join("position.json"));
        store
            .put(file_partition(Path::new("a.log")), Offset::new().with(NEXT_POSITION_KEY, "3"))
            .await;
        store
            .put(file_partition(Path::new("b.log")), Offset::new().with(NEXT_POSITION_KEY, "7"))
            .await;
        store.persist().await.unwrap();

        runner(&["--store-dir", store_dir, "forget", "a.log", "missing.log"])
            .run()
            .await
            .unwrap();

        let reloaded = PositionStore::new(dir.path().join("position.json"));
        reloaded.load().await.unwrap();
        assert_eq!(reloaded.len().await, 1);
        assert!(reloaded.get(&file_partition(Path::new("b.log"))).await.is_some());
    }

    #[test]
    fn test_positions_json_sorted() {
        let mut table = PositionTable::new();
        table.insert(Partition::new().with("f", "b"), Offset::new().with("n", "2"));
        table.insert(Partition::new().with("f", "a"), Offset::new().with("n", "1"));

        let entries = positions_json(&table);
        assert_eq!(entries[0]["partition"]["f"], "a");
        assert_eq!(entries[1]["offset"]["n"], "2");
    }
}
