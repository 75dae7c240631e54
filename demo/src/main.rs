//! relink-demo: send commands to a line-protocol device over a reconnecting link
//!
//! ```text
//! relink-demo psu-1 -e '*IDN?' -e 'read VOLT'
//! relink-demo --config connector.toml -v      # commands from stdin
//! ```

mod cli;
mod device;

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use relink::{Connector, StopOutcome};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

use crate::cli::Cli;
use crate::device::{Console, LineQuery, parse_command};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    cli.init_tracing()?;
    let config = cli.connector_config()?;

    let console = Arc::new(Console::default());
    let connector = Connector::tcp(LineQuery::new(cli.port), config);
    connector.set_listener(console.clone());
    connector.start()?;
    info!(
        "Talking to {}",
        connector.address().unwrap_or_default()
    );

    if cli.exec.is_empty() {
        interactive(&connector).await?;
    } else {
        for (id, line) in (1..).zip(&cli.exec) {
            connector.enqueue(parse_command(id, line));
        }
        tokio::select! {
            () = console.wait_completed(cli.exec.len()) => {}
            () = gave_up(&connector) => warn!("Connector gave up"),
            _ = tokio::signal::ctrl_c() => warn!("Interrupted"),
        }
    }

    if connector.stop().await == StopOutcome::TimedOut {
        warn!("Worker still busy at exit");
    }
    let metrics = connector.metrics();
    info!(
        "{} connect attempts, {} failures, {} sessions",
        metrics.connect_attempts, metrics.connect_failures, metrics.sessions
    );
    Ok(())
}

/// Forward stdin lines until EOF or Ctrl-C
async fn interactive(connector: &Connector<LineQuery>) -> anyhow::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut next_id = 1;
    loop {
        tokio::select! {
            line = lines.next_line() => match line? {
                Some(line) if line.trim().is_empty() => {}
                Some(line) => {
                    connector.enqueue(parse_command(next_id, &line));
                    next_id += 1;
                }
                None => return Ok(()),
            },
            _ = tokio::signal::ctrl_c() => return Ok(()),
            () = gave_up(connector) => {
                warn!("Connector gave up");
                return Ok(());
            }
        }
    }
}

/// Resolves once a non-persistent connector has stopped on its own
async fn gave_up(connector: &Connector<LineQuery>) {
    while connector.is_running() {
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
}
