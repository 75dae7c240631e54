//! Command-line arguments and logging setup

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use relink::ConnectorConfig;
use tracing::Level;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

/// relink-demo - talk to a line-protocol device over a reconnecting TCP link
///
/// Each command is sent as one line. Lines ending in `?` wait for a reply.
/// `read NAME` and `write NAME v1,v2` address named channels.
#[derive(Parser, Debug)]
#[command(name = "relink-demo", version, about)]
pub struct Cli {
    /// Device address, `host` or `host:port`
    pub address: Option<String>,

    /// Load connector settings from a TOML, YAML or JSON file
    #[arg(short, long, env = "RELINK_CONFIG")]
    pub config: Option<PathBuf>,

    /// Port used when the address has none
    #[arg(short, long, default_value_t = 5025)]
    pub port: u16,

    /// Give up after the first failure instead of reconnecting
    #[arg(long)]
    pub once: bool,

    /// Seconds to wait before retrying a failed connect
    #[arg(long, value_name = "SECS")]
    pub retry_delay: Option<u64>,

    /// Command to send; may be repeated. Commands are read from stdin when none are given
    #[arg(short = 'e', long = "exec", value_name = "LINE")]
    pub exec: Vec<String>,

    /// Enable verbose logging (-v, -vv, -vvv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Emit logs as JSON
    #[arg(long)]
    pub json: bool,
}

impl Cli {
    /// Merge the config file (if any) with command-line overrides
    pub fn connector_config(&self) -> anyhow::Result<ConnectorConfig> {
        let mut config = match &self.config {
            Some(path) => ConnectorConfig::from_file(path)
                .with_context(|| format!("loading {}", path.display()))?,
            None => ConnectorConfig::default(),
        };

        if let Some(address) = &self.address {
            config.address = Some(address.clone());
        }
        if self.once {
            config.persistent = false;
        }
        if let Some(secs) = self.retry_delay {
            config.retry_delay_ms = secs.saturating_mul(1000);
        }
        if config.address.is_none() {
            anyhow::bail!("no device address given on the command line or in the config file");
        }
        Ok(config)
    }

    /// Log to stderr; stdout carries device replies
    pub fn init_tracing(&self) -> anyhow::Result<()> {
        let level = match self.verbose {
            0 => Level::WARN,
            1 => Level::INFO,
            2 => Level::DEBUG,
            _ => Level::TRACE,
        };
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_str()));
        let registry = tracing_subscriber::registry().with(filter);

        let result = if self.json {
            registry
                .with(fmt::layer().json().with_writer(std::io::stderr))
                .try_init()
        } else {
            registry
                .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
                .try_init()
        };
        result.map_err(|e| anyhow::anyhow!("failed to initialise logging: {e}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_overrides_apply_on_top_of_defaults() {
        let cli = Cli::try_parse_from([
            "relink-demo",
            "psu-1",
            "--once",
            "--retry-delay",
            "5",
            "-e",
            "*IDN?",
            "-e",
            "read VOLT",
        ])
        .unwrap();

        let config = cli.connector_config().unwrap();
        assert_eq!(config.address.as_deref(), Some("psu-1"));
        assert!(!config.persistent);
        assert_eq!(config.retry_delay_ms, 5000);
        assert_eq!(cli.exec, vec!["*IDN?".to_string(), "read VOLT".to_string()]);
        assert_eq!(cli.port, 5025);
    }

    #[test]
    fn test_address_is_required() {
        let cli = Cli::try_parse_from(["relink-demo"]).unwrap();
        assert!(cli.connector_config().is_err());
    }

    #[test]
    fn test_verbosity() {
        let cli = Cli::try_parse_from(["relink-demo", "-vv", "dev1"]).unwrap();
        assert_eq!(cli.verbose, 2);
    }
}
