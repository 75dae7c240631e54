//! Stream timeout configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Timeouts applied to a stream before it is opened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamTimeouts {
    /// Connection establishment timeout.
    pub connect: Duration,

    /// Maximum gap between two received bytes.
    /// `None` = wait indefinitely
    pub char_timeout: Option<Duration>,

    /// Write timeout.
    /// `None` = no timeout
    pub write: Option<Duration>,
}

impl Default for StreamTimeouts {
    fn default() -> Self {
        Self {
            connect: Duration::from_secs(5),
            char_timeout: Some(Duration::from_millis(500)),
            write: Some(Duration::from_secs(5)),
        }
    }
}

impl StreamTimeouts {
    /// Create a configuration that never times out reads or writes.
    #[must_use]
    pub const fn unlimited() -> Self {
        Self {
            connect: Duration::from_secs(30),
            char_timeout: None,
            write: None,
        }
    }

    /// Replace the inter-character read timeout.
    #[must_use]
    pub const fn with_char_timeout(mut self, timeout: Duration) -> Self {
        self.char_timeout = Some(timeout);
        self
    }
}
