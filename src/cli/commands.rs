//! CLI commands and argument parsing

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Solidafy position service CLI
#[derive(Parser, Debug)]
#[command(name = "solidafy-positions")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Worker configuration file (YAML or JSON)
    #[arg(short = 'C', long, global = true)]
    pub config: Option<PathBuf>,

    /// Directory holding the position file (overrides the config file)
    #[arg(short, long, global = true)]
    pub store_dir: Option<PathBuf>,

    /// Worker id (overrides the config file)
    #[arg(short, long, global = true)]
    pub worker_id: Option<String>,

    /// Output format
    #[arg(short, long, global = true, default_value = "json")]
    pub format: OutputFormat,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// CLI subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Print the persisted position table
    Show,

    /// Follow a file from its stored position, printing each line
    Tail {
        /// File to read
        file: PathBuf,

        /// Maximum lines read per batch
        #[arg(long, default_value = "100")]
        batch_size: usize,
    },

    /// Drop the stored positions of files
    Forget {
        /// Files whose positions should be removed
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
}

/// Output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// JSON output (one message per line)
    Json,
    /// Human-readable output
    Pretty,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_tail() {
        let cli = Cli::try_parse_from([
            "solidafy-positions",
            "--worker-id",
            "w1",
            "tail",
            "/data/a.log",
            "--batch-size",
            "10",
        ])
        .unwrap();

        assert_eq!(cli.worker_id.as_deref(), Some("w1"));
        assert_eq!(cli.format, OutputFormat::Json);
        match cli.command {
            Commands::Tail { file, batch_size } => {
                assert_eq!(file, PathBuf::from("/data/a.log"));
                assert_eq!(batch_size, 10);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "solidafy-positions",
            "show",
            "--store-dir",
            "/tmp/store",
            "--format",
            "pretty",
        ])
        .unwrap();

        assert_eq!(cli.store_dir, Some(PathBuf::from("/tmp/store")));
        assert_eq!(cli.format, OutputFormat::Pretty);
        assert!(matches!(cli.command, Commands::Show));
    }

    #[test]
    fn test_forget_requires_files() {
        assert!(Cli::try_parse_from(["solidafy-positions", "forget"]).is_err());

        let cli = Cli::try_parse_from(["solidafy-positions", "forget", "a.log", "b.log"]).unwrap();
        match cli.command {
            Commands::Forget { files } => assert_eq!(files.len(), 2),
            other => panic!("unexpected command: {other:?}"),
        }
    }
}
