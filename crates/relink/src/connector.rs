//! Connector lifecycle controller
//!
//! [`Connector`] owns one background worker at a time. `start()` spawns it,
//! `stop()` cancels it and waits a bounded time for it to exit. The worker
//! itself lives in [`crate::worker`].

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicU64, Ordering};

use parking_lot::{Mutex, RwLock};
use relink_transport_traits::StreamFactory;
use serde::{Deserialize, Serialize};
use tokio::runtime::Handle;
use tokio::sync::{Mutex as AsyncMutex, MutexGuard, watch};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, Span, debug, info, warn};

use crate::command::ChannelData;
use crate::config::ConnectorConfig;
use crate::error::{ConnectorError, ConnectorResult};
use crate::listener::{ConnectorListener, ListenerSlot};
use crate::mailbox::Mailbox;
use crate::metrics::{AtomicMetrics, ConnectorMetrics};
use crate::session::Session;
use crate::worker;

/// Where the connector is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum ConnectorState {
    /// No worker
    Idle = 0,
    /// Worker alive and not connected: connecting or waiting to retry
    Connecting = 1,
    /// A session is running
    Connected = 2,
}

impl ConnectorState {
    const fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Connecting,
            2 => Self::Connected,
            _ => Self::Idle,
        }
    }
}

impl std::fmt::Display for ConnectorState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Connecting => write!(f, "connecting"),
            Self::Connected => write!(f, "connected"),
        }
    }
}

/// Result of [`Connector::start`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    /// A new worker was spawned
    Started,
    /// A worker already existed; nothing changed
    AlreadyRunning,
}

/// Result of [`Connector::stop`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    /// The worker exited within the shutdown window
    Stopped,
    /// The worker was cancelled but had not exited when the window closed
    TimedOut,
    /// There was no worker
    NotRunning,
}

struct WorkerSlot {
    generation: u64,
    cancel: CancellationToken,
    done: watch::Receiver<()>,
}

/// State shared between a [`Connector`] handle and its worker
pub(crate) struct Shared<S: Session> {
    pub(crate) session: S,
    pub(crate) config: ConnectorConfig,
    pub(crate) factory: Arc<dyn StreamFactory>,
    pub(crate) link: AsyncMutex<S::Link>,
    pub(crate) mailbox: Mailbox<S::Command>,
    pub(crate) listener: ListenerSlot,
    pub(crate) metrics: AtomicMetrics,
    address: RwLock<Option<String>>,
    stopped: AtomicBool,
    connected: AtomicBool,
    state: AtomicU8,
    worker: Mutex<Option<WorkerSlot>>,
    generation: AtomicU64,
    span: Span,
}

impl<S: Session> Shared<S> {
    pub(crate) fn address(&self) -> Option<String> {
        self.address.read().clone()
    }

    pub(crate) fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    pub(crate) fn mark_stopped(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }

    pub(crate) fn set_state(&self, state: ConnectorState) {
        self.state.store(state as u8, Ordering::SeqCst);
        self.connected
            .store(state == ConnectorState::Connected, Ordering::SeqCst);
    }

    pub(crate) fn clear_queue(&self) -> usize {
        let discarded = self.mailbox.clear();
        self.metrics.record_discarded(discarded);
        discarded
    }

    /// Mark the connector idle and release the worker slot if it still
    /// belongs to `generation`
    pub(crate) fn release_worker(&self, generation: u64) {
        let mut slot = self.worker.lock();
        if slot.as_ref().is_some_and(|w| w.generation == generation) {
            self.mark_stopped();
            self.set_state(ConnectorState::Idle);
            *slot = None;
        }
    }
}

/// Append `:default_port` to addresses that carry no port
pub fn normalize_address(address: &str, default_port: u16) -> String {
    if address.contains(':') {
        address.to_string()
    } else {
        format!("{address}:{default_port}")
    }
}

/// A reconnecting connection to one remote endpoint.
///
/// The endpoint-specific protocol is supplied by a [`Session`]; the connector
/// runs it on a background task, reconnecting after failures when
/// `persistent` is set.
///
/// # Example
///
/// ```rust,no_run
/// # use async_trait::async_trait;
/// # use relink::{Command, Session, SessionContext, SessionResult};
/// # use relink_tcp::LineLink;
/// # struct Scpi;
/// # #[async_trait]
/// # impl Session for Scpi {
/// #     type Command = Command;
/// #     type Link = LineLink;
/// #     fn default_port(&self) -> u16 { 5025 }
/// #     async fn run_session(&self, ctx: &mut SessionContext<'_, Self>) -> SessionResult<()> {
/// #         ctx.cancelled().await;
/// #         Ok(())
/// #     }
/// # }
/// use relink::{Connector, ConnectorConfig};
///
/// # async fn run() -> Result<(), relink::ConnectorError> {
/// let connector = Connector::tcp(Scpi, ConnectorConfig::default());
/// connector.set_address("psu-1");
/// connector.start()?;
/// connector.enqueue(Command::exec(1, "*RST"));
/// connector.stop().await;
/// # Ok(())
/// # }
/// ```
pub struct Connector<S: Session> {
    shared: Arc<Shared<S>>,
}

impl<S: Session> Connector<S> {
    /// Create a connector from its parts
    pub fn new(
        session: S,
        link: S::Link,
        factory: Arc<dyn StreamFactory>,
        config: ConnectorConfig,
    ) -> Self {
        Self::builder(session, link, factory).config(config).build()
    }

    /// Create a connector builder
    #[must_use]
    pub fn builder(
        session: S,
        link: S::Link,
        factory: Arc<dyn StreamFactory>,
    ) -> ConnectorBuilder<S> {
        ConnectorBuilder::new(session, link, factory)
    }

    /// Set the remote address; `:default_port` is appended when no port is given
    pub fn set_address(&self, address: impl AsRef<str>) {
        let normalized = normalize_address(address.as_ref(), self.shared.session.default_port());
        self.shared.span.record("address", normalized.as_str());
        debug!(parent: &self.shared.span, "Address set to {}", normalized);
        *self.shared.address.write() = Some(normalized);
    }

    /// The normalized remote address
    pub fn address(&self) -> Option<String> {
        self.shared.address()
    }

    /// Register the listener.
    ///
    /// Only a weak reference is kept; the caller keeps the listener alive.
    pub fn set_listener(&self, listener: Arc<dyn ConnectorListener>) {
        self.shared.listener.set(&listener);
    }

    /// Unregister the listener
    pub fn clear_listener(&self) {
        self.shared.listener.clear();
    }

    /// Spawn the worker on the current Tokio runtime.
    ///
    /// Calling this while a worker exists is logged and otherwise ignored.
    pub fn start(&self) -> ConnectorResult<StartOutcome> {
        let runtime = Handle::try_current().map_err(|_| ConnectorError::NoRuntime)?;
        let shared = &self.shared;

        let mut slot = shared.worker.lock();
        if slot.is_some() {
            info!(parent: &shared.span, "Connector {} already started", shared.session.name());
            return Ok(StartOutcome::AlreadyRunning);
        }

        shared.clear_queue();
        shared.stopped.store(false, Ordering::SeqCst);
        shared.set_state(ConnectorState::Connecting);

        let generation = shared.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let cancel = CancellationToken::new();
        let (done_tx, done_rx) = watch::channel(());
        *slot = Some(WorkerSlot {
            generation,
            cancel: cancel.clone(),
            done: done_rx,
        });
        drop(slot);

        info!(
            parent: &shared.span,
            "Starting connector {} (address={:?}, persistent={})",
            shared.session.name(),
            shared.address(),
            shared.config.persistent
        );
        runtime.spawn(
            worker::run(Arc::clone(shared), generation, cancel, done_tx)
                .instrument(shared.span.clone()),
        );
        Ok(StartOutcome::Started)
    }

    /// Cancel the worker and wait up to the shutdown timeout for it to exit.
    ///
    /// Safe to call when not running.
    pub async fn stop(&self) -> StopOutcome {
        let shared = &self.shared;
        shared.mark_stopped();

        let worker = shared
            .worker
            .lock()
            .as_ref()
            .map(|w| (w.cancel.clone(), w.done.clone()));
        let Some((cancel, mut done)) = worker else {
            shared.clear_queue();
            debug!(parent: &shared.span, "Stop requested but connector not running");
            return StopOutcome::NotRunning;
        };

        cancel.cancel();
        shared.clear_queue();

        let budget = shared.config.shutdown_timeout();
        // The worker never sends; changed() fails once it drops the sender on exit
        let exited = tokio::time::timeout(budget, async {
            while done.changed().await.is_ok() {}
        })
        .await;

        match exited {
            Ok(()) => {
                info!(parent: &shared.span, "Connector {} stopped", shared.session.name());
                StopOutcome::Stopped
            }
            Err(_) => {
                warn!(
                    parent: &shared.span,
                    "Connector {} worker still running {:?} after stop",
                    shared.session.name(),
                    budget
                );
                StopOutcome::TimedOut
            }
        }
    }

    /// Queue a command for the session
    pub fn enqueue(&self, command: S::Command) {
        AtomicMetrics::incr(&self.shared.metrics.commands_enqueued);
        self.shared.mailbox.put(command);
    }

    /// Discard queued commands without touching the run state
    pub fn clear_queue(&self) -> usize {
        let discarded = self.shared.clear_queue();
        debug!(parent: &self.shared.span, "Cleared {} queued commands", discarded);
        discarded
    }

    /// Number of queued commands
    pub fn pending_commands(&self) -> usize {
        self.shared.mailbox.len()
    }

    /// Returns `true` when no worker is meant to be running
    pub fn is_stopped(&self) -> bool {
        self.shared.is_stopped()
    }

    /// Returns `true` while a worker exists, including one that was asked to stop
    pub fn is_running(&self) -> bool {
        self.shared.worker.lock().is_some()
    }

    /// Returns `true` while a session is running
    pub fn is_connected(&self) -> bool {
        self.shared.connected.load(Ordering::SeqCst)
    }

    /// Current lifecycle state
    pub fn state(&self) -> ConnectorState {
        ConnectorState::from_u8(self.shared.state.load(Ordering::SeqCst))
    }

    /// The link.
    ///
    /// The worker holds the lock from the start of each connect attempt until
    /// its session has been cleaned up, so `link().lock().await` waits out a
    /// running session. Use [`Connector::is_connected`] to observe the
    /// connection while a session runs, or [`Connector::try_link`] to inspect
    /// the link without waiting.
    pub fn link(&self) -> &AsyncMutex<S::Link> {
        &self.shared.link
    }

    /// Lock the link if the worker is not using it
    pub fn try_link(&self) -> Option<MutexGuard<'_, S::Link>> {
        self.shared.link.try_lock().ok()
    }

    /// The session strategy
    pub fn session(&self) -> &S {
        &self.shared.session
    }

    /// Name of the connector, taken from the session
    pub fn name(&self) -> &str {
        self.shared.session.name()
    }

    /// The configuration the connector was built with
    pub fn config(&self) -> &ConnectorConfig {
        &self.shared.config
    }

    /// Snapshot of the connector's counters
    pub fn metrics(&self) -> ConnectorMetrics {
        self.shared.metrics.snapshot()
    }

    /// Fill `data` from the session's cached channel values
    pub fn read_channel(&self, data: &mut ChannelData) {
        self.shared.session.read_channel(data);
    }

    /// Hand `data` to the session for writing
    pub fn write_channel(&self, data: &ChannelData) {
        self.shared.session.write_channel(data);
    }
}

#[cfg(feature = "tcp")]
impl<S: Session<Link = relink_tcp::LineLink>> Connector<S> {
    /// Create a connector that talks newline-delimited text over TCP
    pub fn tcp(session: S, config: ConnectorConfig) -> Self {
        let factory = relink_tcp::TcpStreamFactory::new(relink_tcp::TcpConfig::from_timeouts(
            &config.stream_timeouts(),
        ));
        Self::new(session, relink_tcp::LineLink::new(), Arc::new(factory), config)
    }
}

impl<S: Session> Drop for Connector<S> {
    fn drop(&mut self) {
        self.shared.mark_stopped();
        if let Some(worker) = self.shared.worker.lock().as_ref() {
            worker.cancel.cancel();
        }
    }
}

impl<S: Session> std::fmt::Debug for Connector<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connector")
            .field("name", &self.name())
            .field("address", &self.address())
            .field("state", &self.state())
            .field("stopped", &self.is_stopped())
            .field("pending_commands", &self.pending_commands())
            .finish()
    }
}

/// Builder for [`Connector`]
pub struct ConnectorBuilder<S: Session> {
    session: S,
    link: S::Link,
    factory: Arc<dyn StreamFactory>,
    config: ConnectorConfig,
    span: Option<Span>,
}

impl<S: Session> ConnectorBuilder<S> {
    /// Create a builder with default configuration
    #[must_use]
    pub fn new(session: S, link: S::Link, factory: Arc<dyn StreamFactory>) -> Self {
        Self {
            session,
            link,
            factory,
            config: ConnectorConfig::default(),
            span: None,
        }
    }

    /// Replace the whole configuration
    #[must_use]
    pub fn config(mut self, config: ConnectorConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the remote address
    #[must_use]
    pub fn address(mut self, address: impl Into<String>) -> Self {
        self.config.address = Some(address.into());
        self
    }

    /// Enable or disable reconnection
    #[must_use]
    pub const fn persistent(mut self, persistent: bool) -> Self {
        self.config.persistent = persistent;
        self
    }

    /// Set the pause between failed connect attempts
    #[must_use]
    pub const fn retry_delay(mut self, delay: std::time::Duration) -> Self {
        self.config.retry_delay_ms = delay.as_millis() as u64;
        self
    }

    /// Log through `span` instead of a fresh `connector` span
    #[must_use]
    pub fn span(mut self, span: Span) -> Self {
        self.span = Some(span);
        self
    }

    /// Build the connector
    #[must_use]
    pub fn build(self) -> Connector<S> {
        let span = self.span.unwrap_or_else(|| {
            tracing::info_span!(
                "connector",
                name = self.session.name(),
                address = tracing::field::Empty
            )
        });
        let address = self.config.address.clone();

        let connector = Connector {
            shared: Arc::new(Shared {
                session: self.session,
                config: self.config,
                factory: self.factory,
                link: AsyncMutex::new(self.link),
                mailbox: Mailbox::new(),
                listener: ListenerSlot::default(),
                metrics: AtomicMetrics::default(),
                address: RwLock::new(None),
                stopped: AtomicBool::new(true),
                connected: AtomicBool::new(false),
                state: AtomicU8::new(ConnectorState::Idle as u8),
                worker: Mutex::new(None),
                generation: AtomicU64::new(0),
                span,
            }),
        };
        if let Some(address) = address {
            connector.set_address(address);
        }
        connector
    }
}

impl<S: Session> std::fmt::Debug for ConnectorBuilder<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectorBuilder")
            .field("name", &self.session.name())
            .field("config", &self.config)
            .finish()
    }
}
