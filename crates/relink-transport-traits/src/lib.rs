//! # Relink Transport Traits
//!
//! Collaborator contracts for the relink connector core.
//! This crate provides the abstractions the connector drives while it
//! establishes, uses and tears down a connection.
//!
//! ## Overview
//!
//! This crate defines:
//! - **Traits**: [`Stream`] (raw byte transport), [`StreamFactory`] (creates a
//!   stream from an address string) and [`Link`] (the framing layer that wraps a stream)
//! - **Types**: [`LinkState`]
//! - **Errors**: [`TransportError`], [`TransportResult`]
//! - **Config**: [`StreamTimeouts`]
//!
//! ## Usage
//!
//! Transport implementations depend on this crate and implement [`Stream`]
//! and [`StreamFactory`]; framing layers implement [`Link`]:
//!
//! ```rust,ignore
//! use relink_transport_traits::{Stream, StreamFactory, TransportResult};
//!
//! #[derive(Debug)]
//! struct SerialFactory;
//!
//! impl StreamFactory for SerialFactory {
//!     fn create(&self, address: &str) -> TransportResult<Box<dyn Stream>> {
//!         /* ... */
//!     }
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

mod config;
mod error;
mod traits;
mod types;

// Re-export all public items
pub use config::StreamTimeouts;
pub use error::{TransportError, TransportResult};
pub use traits::{Link, Stream, StreamFactory};
pub use types::LinkState;
