//! Core collaborator traits.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::TransportResult;
use crate::types::LinkState;

/// A raw, byte-level connection to an address.
///
/// Streams are created unopened by a [`StreamFactory`]; the connector
/// configures the inter-character timeout, opens and flushes the stream and
/// then hands it to a [`Link`].
#[async_trait]
pub trait Stream: Send + Sync + std::fmt::Debug {
    /// Returns the address this stream was created for.
    fn address(&self) -> &str;

    /// Sets the maximum gap allowed between two received bytes.
    fn set_char_timeout(&mut self, timeout: Duration);

    /// Opens the underlying connection.
    async fn open(&mut self) -> TransportResult<()>;

    /// Flushes pending output.
    async fn flush(&mut self) -> TransportResult<()>;

    /// Reads available bytes into `buf`. `Ok(0)` means the peer closed the stream.
    async fn read(&mut self, buf: &mut [u8]) -> TransportResult<usize>;

    /// Writes the whole buffer.
    async fn write_all(&mut self, data: &[u8]) -> TransportResult<()>;

    /// Closes the connection. Closing a closed stream is a no-op.
    async fn close(&mut self) -> TransportResult<()>;

    /// Returns `true` while the stream is open.
    fn is_open(&self) -> bool;
}

/// A factory that turns an address string into an unopened [`Stream`].
pub trait StreamFactory: Send + Sync + std::fmt::Debug {
    /// Creates a stream for `address`.
    fn create(&self, address: &str) -> TransportResult<Box<dyn Stream>>;

    /// Returns `true` if this kind of stream is available on the current system.
    fn is_available(&self) -> bool {
        true
    }
}

/// The framing/session layer that sits on top of a [`Stream`].
///
/// A link is created once and reused across reconnects; its stream is
/// replaced through [`Link::set_io`] after every successful stream open.
#[async_trait]
pub trait Link: Send + Sync + std::fmt::Debug {
    /// Binds a freshly opened stream, replacing any previous one.
    fn set_io(&mut self, io: Box<dyn Stream>);

    /// Opens the link. A negative status is a failure.
    async fn open(&mut self) -> TransportResult<i32>;

    /// Closes the link and its stream. Closing a closed link is a no-op.
    async fn close(&mut self);

    /// Returns the current state of the link.
    fn state(&self) -> LinkState;

    /// Returns `true` if the link is open.
    fn is_connected(&self) -> bool {
        self.state().is_open()
    }

    /// Returns the address of the bound stream, if any.
    fn endpoint(&self) -> Option<String> {
        None
    }
}
