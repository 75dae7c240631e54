//! Connector and session error types.

use relink_transport_traits::TransportError;
use thiserror::Error;

/// A specialized `Result` type for session (protocol loop) operations.
pub type SessionResult<T> = std::result::Result<T, SessionError>;

/// A specialized `Result` type for connector operations.
pub type ConnectorResult<T> = std::result::Result<T, ConnectorError>;

/// Ways a session can end other than returning normally.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum SessionError {
    /// The connector was stopped while the session was waiting.
    ///
    /// This is the expected way for a session to end on `stop()` and is never
    /// reported to the listener as an exception.
    #[error("Session cancelled")]
    Cancelled,

    /// The link or its stream failed.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The remote endpoint violated the protocol.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// A fault outside the normal error hierarchy, including a panic in the session.
    ///
    /// Fatal faults are logged and signalled through
    /// [`ConnectorListener::fault`](crate::ConnectorListener::fault) but never
    /// through `exception`.
    #[error("Fatal fault: {0}")]
    Fatal(String),
}

impl SessionError {
    /// Create a protocol error
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol(message.into())
    }

    /// Returns `true` for the cancellation outcome
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

/// Errors reported by the connector, either to the listener or to the caller.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ConnectorError {
    /// `start()` ran before an address was configured.
    #[error("No address configured")]
    NoAddress,

    /// Creating, opening or flushing the stream failed.
    #[error("Connect failed: {0}")]
    Connect(#[source] TransportError),

    /// The link refused to open.
    #[error("link.open = {0}")]
    LinkOpen(i32),

    /// The session ended with an error.
    #[error("Session failed: {0}")]
    Session(#[from] SessionError),

    /// The worker could not be spawned because no Tokio runtime is running.
    #[error("No Tokio runtime available to spawn the connector worker")]
    NoRuntime,
}

impl ConnectorError {
    /// Returns `true` for failures of the connect phase.
    ///
    /// These are always retried by a persistent connector after the retry delay.
    pub fn is_connect_failure(&self) -> bool {
        matches!(self, Self::NoAddress | Self::Connect(_) | Self::LinkOpen(_))
    }
}
