//! Command and channel value types for device-style sessions
//!
//! A session chooses its own command type through
//! [`Session::Command`](crate::Session::Command). [`Command`] is the shape the
//! listener completion callbacks are built around: execute a text command,
//! read a named channel, write a named channel.

use serde::{Deserialize, Serialize};

/// An outbound request queued on the connector's mailbox.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Command {
    /// Execute a raw command line; completion is reported via `exec_done(id)`
    Exec {
        /// Caller-chosen correlation id
        id: i32,
        /// Command text without terminator
        line: String,
    },
    /// Read a named channel; completion is reported via `read_done`
    Read {
        /// Channel name
        name: String,
    },
    /// Write values to a named channel; completion is reported via `write_done`
    Write {
        /// Channel name
        name: String,
        /// Values to write
        values: Vec<f32>,
    },
}

impl Command {
    /// Create an exec command
    pub fn exec(id: i32, line: impl Into<String>) -> Self {
        Self::Exec {
            id,
            line: line.into(),
        }
    }

    /// Create a channel read
    pub fn read(name: impl Into<String>) -> Self {
        Self::Read { name: name.into() }
    }

    /// Create a channel write
    pub fn write(name: impl Into<String>, values: impl Into<Vec<f32>>) -> Self {
        Self::Write {
            name: name.into(),
            values: values.into(),
        }
    }

    /// Channel name for reads and writes
    pub fn channel(&self) -> Option<&str> {
        match self {
            Self::Exec { .. } => None,
            Self::Read { name } | Self::Write { name, .. } => Some(name),
        }
    }
}

/// A named channel and its current values.
///
/// Passed to [`Session::read_channel`](crate::Session::read_channel) and
/// [`Session::write_channel`](crate::Session::write_channel) for synchronous
/// cached access outside the protocol loop.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChannelData {
    /// Channel name
    pub name: String,
    /// Channel values
    pub values: Vec<f32>,
}

impl ChannelData {
    /// Create a channel with no values
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            values: Vec::new(),
        }
    }

    /// Create a channel with values
    pub fn with_values(name: impl Into<String>, values: impl Into<Vec<f32>>) -> Self {
        Self {
            name: name.into(),
            values: values.into(),
        }
    }
}
