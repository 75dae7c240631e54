//! Connector state machine
//!
//! One worker runs per started connector. Each pass of the loop is one
//! attempt: connect, run the session, clean up. Attempts are strictly
//! sequential and every listener callback is made from here.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use relink_transport_traits::{Link, StreamFactory};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::connector::{ConnectorState, Shared};
use crate::error::{ConnectorError, ConnectorResult, SessionError, SessionResult};
use crate::metrics::AtomicMetrics;
use crate::session::{Session, SessionContext};

/// What the outer loop does after an attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Terminate,
}

/// Releases the worker slot however the worker ends, including by panic
struct WorkerExit<S: Session> {
    shared: Arc<Shared<S>>,
    generation: u64,
}

impl<S: Session> Drop for WorkerExit<S> {
    fn drop(&mut self) {
        self.shared.release_worker(self.generation);
    }
}

/// Worker body. `done` is dropped last, after the slot has been released.
pub(crate) async fn run<S: Session>(
    shared: Arc<Shared<S>>,
    generation: u64,
    cancel: CancellationToken,
    done: watch::Sender<()>,
) {
    let _done = done;
    let _exit = WorkerExit {
        shared: Arc::clone(&shared),
        generation,
    };

    debug!("Worker {} started", generation);
    while !shared.is_stopped() {
        if attempt(&shared, &cancel).await == Flow::Terminate {
            break;
        }
    }
    debug!("Worker {} exiting", generation);
}

async fn attempt<S: Session>(shared: &Shared<S>, cancel: &CancellationToken) -> Flow {
    let persistent = shared.config.persistent;
    shared.set_state(ConnectorState::Connecting);

    let mut link = tokio::select! {
        biased;
        () = cancel.cancelled() => return Flow::Terminate,
        link = shared.link.lock() => link,
    };

    AtomicMetrics::incr(&shared.metrics.connect_attempts);
    let target = shared.address();
    let connected = tokio::select! {
        biased;
        () = cancel.cancelled() => None,
        result = connect(
            shared.factory.as_ref(),
            &mut *link,
            target.as_deref(),
            shared.config.char_timeout(),
        ) => Some(result),
    };

    let address = match connected {
        None => {
            debug!("Connect attempt interrupted by stop");
            link.close().await;
            drop(link);
            notify_disconnected(shared);
            return Flow::Terminate;
        }
        Some(Err(err)) => {
            AtomicMetrics::incr(&shared.metrics.connect_failures);
            link.close().await;
            drop(link);

            warn!(
                "Connect to {} failed: {}",
                target.as_deref().unwrap_or("<unset>"),
                err
            );
            notify_disconnected(shared);
            shared.listener.notify(|l| l.exception(&err));

            if !persistent {
                info!("Not persistent, giving up after failed connect");
                return Flow::Terminate;
            }
            let delay = shared.config.retry_delay();
            debug!("Retrying in {:?}", delay);
            return tokio::select! {
                biased;
                () = cancel.cancelled() => Flow::Terminate,
                () = tokio::time::sleep(delay) => Flow::Continue,
            };
        }
        Some(Ok(address)) => address,
    };

    AtomicMetrics::incr(&shared.metrics.sessions);
    shared.set_state(ConnectorState::Connected);
    info!("Connected to {}", address);
    shared.session.on_connected();
    shared.listener.notify(|l| l.connected());

    let outcome = {
        let mut ctx = SessionContext::<S>::new(
            &mut *link,
            &shared.mailbox,
            &shared.listener,
            cancel,
            &address,
        );
        run_guarded(&shared.session, &mut ctx, cancel).await
    };

    match outcome {
        Ok(()) => debug!("Session with {} ended", address),
        Err(SessionError::Cancelled) => debug!("Session with {} cancelled", address),
        Err(SessionError::Fatal(reason)) => {
            AtomicMetrics::incr(&shared.metrics.faults);
            error!("Fatal fault in session with {}: {}", address, reason);
            shared.listener.notify(|l| l.fault(&reason));
        }
        Err(err) => {
            AtomicMetrics::incr(&shared.metrics.session_errors);
            error!("Session with {} failed: {}", address, err);
            if !shared.is_stopped() {
                let err = ConnectorError::Session(err);
                shared.listener.notify(|l| l.exception(&err));
            }
        }
    }

    if !persistent {
        shared.mark_stopped();
    }
    shared.clear_queue();
    link.close().await;
    drop(link);
    shared.set_state(ConnectorState::Connecting);
    info!("Disconnected from {}", address);
    notify_disconnected(shared);
    Flow::Continue
}

/// Run the session until it returns, panics or the connector is stopped
async fn run_guarded<S: Session>(
    session: &S,
    ctx: &mut SessionContext<'_, S>,
    cancel: &CancellationToken,
) -> SessionResult<()> {
    tokio::select! {
        biased;
        () = cancel.cancelled() => Err(SessionError::Cancelled),
        result = AssertUnwindSafe(session.run_session(ctx)).catch_unwind() => {
            result.unwrap_or_else(|panic| Err(SessionError::Fatal(panic_message(panic.as_ref()))))
        }
    }
}

/// Create, open and flush a stream, bind it into `link` and open the link
async fn connect<L: Link>(
    factory: &dyn StreamFactory,
    link: &mut L,
    address: Option<&str>,
    char_timeout: Duration,
) -> ConnectorResult<String> {
    let address = address.ok_or(ConnectorError::NoAddress)?;

    let mut io = factory.create(address).map_err(ConnectorError::Connect)?;
    io.set_char_timeout(char_timeout);
    io.open().await.map_err(ConnectorError::Connect)?;
    if let Err(e) = io.flush().await {
        let _ = io.close().await;
        return Err(ConnectorError::Connect(e));
    }
    link.set_io(io);

    let status = link.open().await.map_err(ConnectorError::Connect)?;
    if status < 0 {
        return Err(ConnectorError::LinkOpen(status));
    }
    Ok(address.to_string())
}

fn notify_disconnected<S: Session>(shared: &Shared<S>) {
    shared.session.on_disconnected();
    shared.listener.notify(|l| l.disconnected());
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        format!("session panicked: {message}")
    } else if let Some(message) = payload.downcast_ref::<String>() {
        format!("session panicked: {message}")
    } else {
        "session panicked".to_string()
    }
}
