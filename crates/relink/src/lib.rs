//! # Relink
//!
//! Lifecycle management for one persistent connection to a remote instrument,
//! device or server.
//!
//! ## Overview
//!
//! A [`Connector`] owns a background worker that repeatedly
//!
//! 1. creates a stream for the configured address, opens it and binds it into a link,
//! 2. runs the endpoint-specific [`Session`] until it ends, fails or is cancelled,
//! 3. cleans up and, when `persistent`, reconnects (after a fixed delay if the
//!    connect itself failed).
//!
//! Outbound commands are queued on a [`Mailbox`] that the session consumes.
//! Lifecycle events and command completions are reported to a weakly held
//! [`ConnectorListener`].
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use async_trait::async_trait;
//! use relink::prelude::*;
//! use relink_tcp::LineLink;
//!
//! struct Echo;
//!
//! #[async_trait]
//! impl Session for Echo {
//!     type Command = Command;
//!     type Link = LineLink;
//!
//!     fn default_port(&self) -> u16 {
//!         4000
//!     }
//!
//!     async fn run_session(&self, ctx: &mut SessionContext<'_, Self>) -> SessionResult<()> {
//!         while let Command::Exec { id, line } = ctx.next_command().await? {
//!             ctx.link().send_line(&line).await?;
//!             ctx.link().recv_line().await?;
//!             ctx.exec_done(id);
//!         }
//!         Ok(())
//!     }
//! }
//!
//! struct Log;
//!
//! impl ConnectorListener for Log {
//!     fn connected(&self) { println!("up"); }
//!     fn disconnected(&self) { println!("down"); }
//!     fn exception(&self, error: &ConnectorError) { println!("error: {error}"); }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), ConnectorError> {
//!     let listener = Arc::new(Log);
//!     let connector = Connector::tcp(Echo, ConnectorConfig::default());
//!     connector.set_address("dev1");
//!     connector.set_listener(listener.clone());
//!     connector.start()?;
//!
//!     connector.enqueue(Command::exec(1, "*IDN?"));
//!     tokio::signal::ctrl_c().await.ok();
//!     connector.stop().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Cancellation
//!
//! `stop()` cancels the worker's [`CancellationToken`](tokio_util::sync::CancellationToken).
//! Whatever the worker is waiting on (stream open, mailbox, retry delay, the
//! session itself) is abandoned at its next await point and the attempt ends
//! without an `exception` notification. `stop()` then waits at most the
//! configured shutdown timeout for the worker to exit.

#![warn(
    missing_docs,
    missing_debug_implementations,
    rust_2018_idioms,
    unreachable_pub,
    clippy::all
)]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![allow(
    clippy::module_name_repetitions,
    clippy::missing_errors_doc,
    clippy::must_use_candidate
)]

pub mod command;
pub mod config;
pub mod connector;
pub mod error;
pub mod listener;
pub mod mailbox;
pub mod metrics;
pub mod session;
mod worker;

pub use command::{ChannelData, Command};
pub use config::{ConfigError, ConnectorConfig, ConnectorConfigBuilder};
pub use connector::{
    Connector, ConnectorBuilder, ConnectorState, StartOutcome, StopOutcome, normalize_address,
};
pub use error::{ConnectorError, ConnectorResult, SessionError, SessionResult};
pub use listener::ConnectorListener;
pub use mailbox::Mailbox;
pub use metrics::ConnectorMetrics;
pub use session::{Session, SessionContext};

// Re-export transport traits for convenience
pub use relink_transport_traits::{
    Link, LinkState, Stream, StreamFactory, StreamTimeouts, TransportError, TransportResult,
};

/// Default TCP collaborators
#[cfg(feature = "tcp")]
#[cfg_attr(docsrs, doc(cfg(feature = "tcp")))]
pub use relink_tcp as tcp;

/// Convenience re-exports for implementing sessions and listeners
pub mod prelude {
    pub use crate::{
        ChannelData, Command, Connector, ConnectorConfig, ConnectorError, ConnectorListener,
        Session, SessionContext, SessionError, SessionResult, StartOutcome, StopOutcome,
    };
    pub use async_trait::async_trait;
}
