//! # Relink TCP Transport
//!
//! Default collaborators for the relink connector core.
//! This crate provides a TCP [`Stream`] and a newline-framed [`Link`] that
//! works over any stream.
//!
//! ## Features
//!
//! - **Address based**: Streams are created from `host:port` strings
//! - **Bounded connect**: Connection establishment is capped by a timeout
//! - **Inter-character timeout**: Reads fail fast when the peer goes quiet
//! - **Line framing**: Uses `LinesCodec` for newline-delimited frames
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use relink_tcp::{LineLink, TcpStreamFactory};
//! use relink_transport_traits::{Link, StreamFactory};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let factory = TcpStreamFactory::builder().connect_timeout_ms(2000).build();
//!     let mut stream = factory.create("127.0.0.1:4000")?;
//!     stream.open().await?;
//!
//!     let mut link = LineLink::new();
//!     link.set_io(stream);
//!     link.open().await?;
//!     link.send_line("*IDN?").await?;
//!     println!("{:?}", link.recv_line().await?);
//!     Ok(())
//! }
//! ```

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

mod link;
mod stream;

pub use link::LineLink;
pub use stream::{TcpConfig, TcpStreamFactory, TcpStreamFactoryBuilder, TcpStreamTransport};

// Re-export transport traits for convenience
pub use relink_transport_traits::{
    Link, LinkState, Stream, StreamFactory, TransportError, TransportResult,
};
