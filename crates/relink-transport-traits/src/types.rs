//! Core link types.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Represents the current state of a link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LinkState {
    /// No stream is bound, or the link was closed.
    Closed,
    /// A stream is bound but the link has not been opened.
    Bound,
    /// The link is open and ready to exchange frames.
    Open,
    /// The link was opened but the peer went away.
    Failed {
        /// A description of the failure reason.
        reason: String,
    },
}

impl LinkState {
    /// Returns `true` if frames can be exchanged.
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Open)
    }
}

impl fmt::Display for LinkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Closed => write!(f, "closed"),
            Self::Bound => write!(f, "bound"),
            Self::Open => write!(f, "open"),
            Self::Failed { reason } => write!(f, "failed: {reason}"),
        }
    }
}
