//! Lock-free connector counters

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Point-in-time copy of a connector's counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectorMetrics {
    /// Connect attempts started
    pub connect_attempts: u64,
    /// Connect attempts that failed
    pub connect_failures: u64,
    /// Sessions established
    pub sessions: u64,
    /// Sessions that ended with an error
    pub session_errors: u64,
    /// Fatal faults, including session panics
    pub faults: u64,
    /// Commands accepted by `enqueue`
    pub commands_enqueued: u64,
    /// Queued commands discarded by clears
    pub commands_discarded: u64,
}

#[derive(Debug, Default)]
pub(crate) struct AtomicMetrics {
    pub(crate) connect_attempts: AtomicU64,
    pub(crate) connect_failures: AtomicU64,
    pub(crate) sessions: AtomicU64,
    pub(crate) session_errors: AtomicU64,
    pub(crate) faults: AtomicU64,
    pub(crate) commands_enqueued: AtomicU64,
    pub(crate) commands_discarded: AtomicU64,
}

impl AtomicMetrics {
    pub(crate) fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_discarded(&self, count: usize) {
        if count > 0 {
            self.commands_discarded
                .fetch_add(count as u64, Ordering::Relaxed);
        }
    }

    pub(crate) fn snapshot(&self) -> ConnectorMetrics {
        ConnectorMetrics {
            connect_attempts: self.connect_attempts.load(Ordering::Relaxed),
            connect_failures: self.connect_failures.load(Ordering::Relaxed),
            sessions: self.sessions.load(Ordering::Relaxed),
            session_errors: self.session_errors.load(Ordering::Relaxed),
            faults: self.faults.load(Ordering::Relaxed),
            commands_enqueued: self.commands_enqueued.load(Ordering::Relaxed),
            commands_discarded: self.commands_discarded.load(Ordering::Relaxed),
        }
    }
}
