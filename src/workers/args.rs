//! Command-line argument parsing and configuration.
//!
//! Supports:
//! - CLI arguments via clap
//! - TOML configuration file (`peerdrop.toml` in the working directory)
//! - Merging CLI with file config (CLI takes precedence)

use crate::core::config::{CHUNK_SIZE, DEFAULT_STUN_SERVER, PARTITION_SIZE, POLL_INTERVAL};
use crate::core::transfer::TransferConfig;
use anyhow::{Context, Result};
use clap::Parser;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const CONFIG_FILE: &str = "peerdrop.toml";

/// Peerdrop - direct peer-to-peer file and text exchange.
#[derive(Parser, Deserialize, Clone, Debug, Default)]
#[command(author, version, about)]
#[command(propagate_version = true)]
#[serde(default, rename_all = "kebab-case")]
pub struct Args {
    /// Base URL of the discovery relay.
    #[clap(long)]
    pub server: Option<String>,

    /// Seconds between two roster polls.
    #[clap(long)]
    pub poll_interval: Option<u64>,

    /// Directory received files are written to.
    /// Defaults to the user's download directory.
    #[clap(long)]
    pub download_dir: Option<PathBuf>,

    /// Chunk size in bytes.
    #[clap(long)]
    pub chunk_size: Option<usize>,

    /// Partition size in bytes (data sent before waiting for an ack).
    #[clap(long)]
    pub partition_size: Option<u64>,

    /// STUN server URL. May be repeated.
    #[clap(long = "stun")]
    pub stun: Vec<String>,

    /// Verbosity level (-v, -vv, -vvv).
    #[clap(short = 'v', long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

impl Args {
    /// Load Args from CLI + TOML file (if it exists).
    /// CLI values override those from the file.
    ///
    /// An unreadable or malformed file is ignored; its error is returned so
    /// the caller can report it once logging is up.
    pub fn load() -> (Self, Option<anyhow::Error>) {
        let cli_args = Args::parse();
        match Self::from_file(Path::new(CONFIG_FILE)) {
            Ok(Some(file_args)) => (Self::merge(file_args, cli_args), None),
            Ok(None) => (cli_args, None),
            Err(e) => (cli_args, Some(e)),
        }
    }

    /// Load args from a TOML file. `None` when the file does not exist.
    fn from_file(path: &Path) -> Result<Option<Self>> {
        if !path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let args = toml::from_str::<Args>(&content)
            .with_context(|| format!("parsing {}", path.display()))?;
        Ok(Some(args))
    }

    /// Merge file args with CLI args (CLI takes precedence).
    fn merge(mut file: Args, cli: Args) -> Args {
        if cli.server.is_some() {
            file.server = cli.server;
        }
        if cli.poll_interval.is_some() {
            file.poll_interval = cli.poll_interval;
        }
        if cli.download_dir.is_some() {
            file.download_dir = cli.download_dir;
        }
        if cli.chunk_size.is_some() {
            file.chunk_size = cli.chunk_size;
        }
        if cli.partition_size.is_some() {
            file.partition_size = cli.partition_size;
        }
        if !cli.stun.is_empty() {
            file.stun = cli.stun;
        }
        if cli.verbose > 0 {
            file.verbose = cli.verbose;
        }
        file
    }

    // ── Resolved values ──────────────────────────────────────────────────

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
            .filter(|s| *s > 0)
            .map(Duration::from_secs)
            .unwrap_or(POLL_INTERVAL)
    }

    pub fn download_dir(&self) -> PathBuf {
        self.download_dir
            .clone()
            .or_else(dirs::download_dir)
            .or_else(|| dirs::home_dir().map(|h| h.join("Downloads")))
            .unwrap_or_else(|| PathBuf::from("."))
    }

    pub fn transfer_config(&self) -> TransferConfig {
        TransferConfig {
            chunk_size: self.chunk_size.unwrap_or(CHUNK_SIZE),
            partition_size: self.partition_size.unwrap_or(PARTITION_SIZE),
        }
    }

    pub fn stun_servers(&self) -> Vec<String> {
        if self.stun.is_empty() {
            vec![DEFAULT_STUN_SERVER.to_string()]
        } else {
            self.stun.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses() {
        let args = Args::parse_from([
            "peerdrop",
            "--server",
            "https://relay.example",
            "--chunk-size",
            "16000",
            "--stun",
            "stun:a:3478",
            "--stun",
            "stun:b:3478",
            "-vv",
        ]);
        assert_eq!(args.server.as_deref(), Some("https://relay.example"));
        assert_eq!(args.transfer_config().chunk_size, 16_000);
        assert_eq!(args.transfer_config().partition_size, PARTITION_SIZE);
        assert_eq!(args.stun_servers(), vec!["stun:a:3478", "stun:b:3478"]);
        assert_eq!(args.verbose, 2);
    }

    #[test]
    fn test_defaults() {
        let args = Args::parse_from(["peerdrop"]);
        assert_eq!(args.poll_interval(), POLL_INTERVAL);
        assert_eq!(args.transfer_config(), TransferConfig::default());
        assert_eq!(args.stun_servers(), vec![DEFAULT_STUN_SERVER]);
    }

    #[test]
    fn test_file_then_cli_precedence() {
        let file: Args = toml::from_str(
            r#"
                server = "http://file.example"
                poll-interval = 9
                partition-size = 500000
                stun = ["stun:file:3478"]
            "#,
        )
        .unwrap();
        let cli = Args::parse_from(["peerdrop", "--server", "http://cli.example"]);

        let merged = Args::merge(file, cli);
        assert_eq!(merged.server.as_deref(), Some("http://cli.example"));
        assert_eq!(merged.poll_interval(), Duration::from_secs(9));
        assert_eq!(merged.transfer_config().partition_size, 500_000);
        assert_eq!(merged.stun_servers(), vec!["stun:file:3478"]);
    }

    #[test]
    fn test_config_file_errors_are_returned() {
        let dir = std::env::temp_dir().join("peerdrop_test").join("args");
        fs::create_dir_all(&dir).unwrap();

        assert!(Args::from_file(&dir.join("absent.toml")).unwrap().is_none());

        let good = dir.join("good.toml");
        fs::write(&good, "server = \"http://file.example\"\n").unwrap();
        let args = Args::from_file(&good).unwrap().unwrap();
        assert_eq!(args.server.as_deref(), Some("http://file.example"));

        let bad = dir.join("bad.toml");
        fs::write(&bad, "poll-interval = \"soon\"\n").unwrap();
        let err = Args::from_file(&bad).unwrap_err();
        assert!(err.to_string().contains("bad.toml"));
    }

    #[test]
    fn test_zero_poll_interval_falls_back() {
        let args = Args::parse_from(["peerdrop", "--poll-interval", "0"]);
        assert_eq!(args.poll_interval(), POLL_INTERVAL);
    }
}
