//! The protocol strategy a connector drives
//!
//! A [`Session`] supplies the parts of a connector that depend on the remote
//! endpoint: its default port, its link type, and the protocol loop that runs
//! for as long as a connection is up. Everything else (connecting, retrying,
//! stopping, notifying the listener) belongs to [`Connector`](crate::Connector).

use std::time::Duration;

use async_trait::async_trait;
use relink_transport_traits::Link;
use tokio_util::sync::CancellationToken;

use crate::command::ChannelData;
use crate::error::SessionResult;
use crate::listener::{ConnectorListener, ListenerSlot};
use crate::mailbox::Mailbox;

/// Endpoint-specific behaviour of a connector.
///
/// # Example
///
/// ```rust
/// use async_trait::async_trait;
/// use relink::{Command, Session, SessionContext, SessionResult};
/// use relink_tcp::LineLink;
///
/// struct Scpi;
///
/// #[async_trait]
/// impl Session for Scpi {
///     type Command = Command;
///     type Link = LineLink;
///
///     fn default_port(&self) -> u16 {
///         5025
///     }
///
///     async fn run_session(&self, ctx: &mut SessionContext<'_, Self>) -> SessionResult<()> {
///         loop {
///             if let Command::Exec { id, line } = ctx.next_command().await? {
///                 ctx.link().send_line(&line).await?;
///                 ctx.exec_done(id);
///             }
///         }
///     }
/// }
/// ```
#[async_trait]
pub trait Session: Send + Sync + 'static {
    /// Items queued through [`Connector::enqueue`](crate::Connector::enqueue)
    type Command: Send + 'static;

    /// The link the session talks through
    type Link: Link + 'static;

    /// Port appended to addresses given without one
    fn default_port(&self) -> u16;

    /// Name used in log output
    fn name(&self) -> &str {
        "connector"
    }

    /// The protocol loop for one established connection.
    ///
    /// Returning `Ok(())` ends the session normally; a persistent connector
    /// then reconnects immediately. Errors are reported to the listener unless
    /// the connector is being stopped. When the connector is stopped the
    /// future is dropped at its next await point.
    async fn run_session(&self, ctx: &mut SessionContext<'_, Self>) -> SessionResult<()>;

    /// Hook invoked after the link opened, before the listener hears `connected`
    fn on_connected(&self) {}

    /// Hook invoked whenever a session ends or a connect attempt fails
    fn on_disconnected(&self) {}

    /// Fill `data` from cached values, outside the protocol loop
    fn read_channel(&self, _data: &mut ChannelData) {}

    /// Accept `data` for writing, outside the protocol loop
    fn write_channel(&self, _data: &ChannelData) {}
}

/// Everything a running session may touch
pub struct SessionContext<'a, S: Session + ?Sized> {
    link: &'a mut S::Link,
    mailbox: &'a Mailbox<S::Command>,
    listener: &'a ListenerSlot,
    cancel: &'a CancellationToken,
    address: &'a str,
}

impl<'a, S: Session + ?Sized> SessionContext<'a, S> {
    pub(crate) fn new(
        link: &'a mut S::Link,
        mailbox: &'a Mailbox<S::Command>,
        listener: &'a ListenerSlot,
        cancel: &'a CancellationToken,
        address: &'a str,
    ) -> Self {
        Self {
            link,
            mailbox,
            listener,
            cancel,
            address,
        }
    }

    /// The open link
    pub fn link(&mut self) -> &mut S::Link {
        self.link
    }

    /// Address of the connected endpoint
    pub fn address(&self) -> &str {
        self.address
    }

    /// Wait for the next queued command; fails with `Cancelled` on stop
    pub async fn next_command(&self) -> SessionResult<S::Command> {
        self.mailbox.take(self.cancel).await
    }

    /// Wait up to `timeout` for the next queued command
    pub async fn next_command_timeout(
        &self,
        timeout: Duration,
    ) -> SessionResult<Option<S::Command>> {
        self.mailbox.take_timeout(timeout, self.cancel).await
    }

    /// Take a queued command without waiting
    pub fn try_next_command(&self) -> Option<S::Command> {
        self.mailbox.try_take()
    }

    /// Number of commands waiting
    pub fn pending_commands(&self) -> usize {
        self.mailbox.len()
    }

    /// Returns `true` once the connector has been asked to stop
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Resolves once the connector has been asked to stop
    pub async fn cancelled(&self) {
        self.cancel.cancelled().await;
    }

    /// Report an exec completion to the listener
    pub fn exec_done(&self, id: i32) {
        self.listener.notify(|l| l.exec_done(id));
    }

    /// Report a channel read completion to the listener
    pub fn read_done(&self, result: i32, name: &str, values: &[f32]) {
        self.listener.notify(|l| l.read_done(result, name, values));
    }

    /// Report a channel write completion to the listener
    pub fn write_done(&self, result: i32, name: &str) {
        self.listener.notify(|l| l.write_done(result, name));
    }

    /// The registered listener, if still alive
    pub fn listener(&self) -> Option<std::sync::Arc<dyn ConnectorListener>> {
        self.listener.get()
    }
}

impl<S: Session + ?Sized> std::fmt::Debug for SessionContext<'_, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionContext")
            .field("address", &self.address)
            .field("pending_commands", &self.mailbox.len())
            .field("cancelled", &self.cancel.is_cancelled())
            .finish()
    }
}
