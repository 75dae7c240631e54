//! Shared fixtures: scripted stream factory, in-memory link, recording
//! listener and a configurable session.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use relink::prelude::*;
use relink::{Link, LinkState, Stream, StreamFactory, TransportError, TransportResult};
use tokio::time::Instant;

pub const DEFAULT_PORT: u16 = 4000;

/// Outcome of one `StreamFactory::create` + `Stream::open`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Attempt {
    /// `create` fails with a connection failure
    Refuse,
    /// `create` succeeds, `open` fails
    FailOpen,
    /// `open` never completes
    Hang,
    /// The stream opens
    Succeed,
}

#[derive(Debug)]
pub struct MockFactory {
    script: Mutex<VecDeque<Attempt>>,
    fallback: Attempt,
    addresses: Mutex<Vec<String>>,
}

impl MockFactory {
    pub fn always(outcome: Attempt) -> Arc<Self> {
        Self::scripted([], outcome)
    }

    pub fn scripted(script: impl IntoIterator<Item = Attempt>, then: Attempt) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into_iter().collect()),
            fallback: then,
            addresses: Mutex::new(Vec::new()),
        })
    }

    pub fn attempts(&self) -> usize {
        self.addresses.lock().len()
    }

    pub fn addresses(&self) -> Vec<String> {
        self.addresses.lock().clone()
    }
}

impl StreamFactory for MockFactory {
    fn create(&self, address: &str) -> TransportResult<Box<dyn Stream>> {
        self.addresses.lock().push(address.to_string());
        let outcome = self
            .script
            .lock()
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone());

        if outcome == Attempt::Refuse {
            return Err(TransportError::ConnectionFailed(format!(
                "{address}: connection refused"
            )));
        }
        Ok(Box::new(MockStream {
            address: address.to_string(),
            outcome,
            char_timeout: None,
            open: false,
        }))
    }
}

#[derive(Debug)]
pub struct MockStream {
    address: String,
    outcome: Attempt,
    char_timeout: Option<Duration>,
    open: bool,
}

#[async_trait]
impl Stream for MockStream {
    fn address(&self) -> &str {
        &self.address
    }

    fn set_char_timeout(&mut self, timeout: Duration) {
        self.char_timeout = Some(timeout);
    }

    async fn open(&mut self) -> TransportResult<()> {
        match self.outcome {
            Attempt::FailOpen => Err(TransportError::ConnectionTimeout {
                operation: format!("connect {}", self.address),
                timeout: Duration::from_secs(5),
            }),
            Attempt::Hang => std::future::pending().await,
            _ => {
                assert_eq!(self.char_timeout, Some(Duration::from_millis(500)));
                self.open = true;
                Ok(())
            }
        }
    }

    async fn flush(&mut self) -> TransportResult<()> {
        Ok(())
    }

    async fn read(&mut self, _buf: &mut [u8]) -> TransportResult<usize> {
        Ok(0)
    }

    async fn write_all(&mut self, _data: &[u8]) -> TransportResult<()> {
        Ok(())
    }

    async fn close(&mut self) -> TransportResult<()> {
        self.open = false;
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open
    }
}

/// In-memory link that records sent lines
#[derive(Debug)]
pub struct MockLink {
    io: Option<Box<dyn Stream>>,
    state: LinkState,
    open_status: i32,
    transcript: Arc<Mutex<Vec<String>>>,
    closes: Arc<AtomicUsize>,
}

impl MockLink {
    pub fn new() -> Self {
        Self {
            io: None,
            state: LinkState::Closed,
            open_status: 0,
            transcript: Arc::default(),
            closes: Arc::default(),
        }
    }

    /// A link whose `open` always reports `status`
    pub fn refusing(status: i32) -> Self {
        Self {
            open_status: status,
            ..Self::new()
        }
    }

    pub fn transcript(&self) -> Arc<Mutex<Vec<String>>> {
        Arc::clone(&self.transcript)
    }

    pub fn closes(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.closes)
    }

    pub fn send(&mut self, line: &str) -> TransportResult<()> {
        if !self.state.is_open() {
            return Err(TransportError::NotConnected);
        }
        self.transcript.lock().push(line.to_string());
        Ok(())
    }
}

#[async_trait]
impl Link for MockLink {
    fn set_io(&mut self, io: Box<dyn Stream>) {
        self.io = Some(io);
        self.state = LinkState::Bound;
    }

    async fn open(&mut self) -> TransportResult<i32> {
        if self.open_status < 0 {
            return Ok(self.open_status);
        }
        match self.io.as_ref() {
            Some(io) if io.is_open() => {
                self.state = LinkState::Open;
                Ok(0)
            }
            _ => Ok(-1),
        }
    }

    async fn close(&mut self) {
        if let Some(mut io) = self.io.take() {
            let _ = io.close().await;
        }
        self.state = LinkState::Closed;
        self.closes.fetch_add(1, Ordering::SeqCst);
    }

    fn state(&self) -> LinkState {
        self.state.clone()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Connected,
    Disconnected,
    Exception(String),
    ExecDone(i32),
    ReadDone(i32, String, Vec<f32>),
    WriteDone(i32, String),
    Fault(String),
}

/// Listener that records every callback with the (possibly paused) Tokio clock
#[derive(Debug, Default)]
pub struct Recorder {
    events: Mutex<Vec<(Instant, Event)>>,
}

impl Recorder {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn push(&self, event: Event) {
        self.events.lock().push((Instant::now(), event));
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().iter().map(|(_, e)| e.clone()).collect()
    }

    pub fn timed(&self) -> Vec<(Instant, Event)> {
        self.events.lock().clone()
    }

    pub fn count(&self, event: &Event) -> usize {
        self.events.lock().iter().filter(|(_, e)| e == event).count()
    }

    pub fn exceptions(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::Exception(message) => Some(message),
                _ => None,
            })
            .collect()
    }

    /// Poll until `done` holds for the recorded events
    pub async fn wait_for(&self, done: impl Fn(&[Event]) -> bool) {
        let waited = tokio::time::timeout(Duration::from_secs(900), async {
            while !done(&self.events()) {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await;
        assert!(waited.is_ok(), "timed out; events so far: {:?}", self.events());
    }

    pub async fn wait_for_count(&self, event: Event, count: usize) {
        self.wait_for(|events| events.iter().filter(|e| **e == event).count() >= count)
            .await;
    }
}

impl ConnectorListener for Recorder {
    fn connected(&self) {
        self.push(Event::Connected);
    }

    fn disconnected(&self) {
        self.push(Event::Disconnected);
    }

    fn exception(&self, error: &ConnectorError) {
        self.push(Event::Exception(error.to_string()));
    }

    fn exec_done(&self, id: i32) {
        self.push(Event::ExecDone(id));
    }

    fn read_done(&self, result: i32, name: &str, values: &[f32]) {
        self.push(Event::ReadDone(result, name.to_string(), values.to_vec()));
    }

    fn write_done(&self, result: i32, name: &str) {
        self.push(Event::WriteDone(result, name.to_string()));
    }

    fn fault(&self, description: &str) {
        self.push(Event::Fault(description.to_string()));
    }
}

/// What one session run does
#[derive(Debug, Clone)]
pub enum Behavior {
    /// Serve queued commands until cancelled
    Serve,
    /// Return normally straight away
    Return,
    /// Return the error straight away
    Fail(SessionError),
    /// Panic with the message
    Panic(&'static str),
    /// Block the thread, ignoring cancellation, then fail with a protocol error
    BlockThenFail(Duration),
}

#[derive(Debug)]
pub struct TestSession {
    script: Mutex<VecDeque<Behavior>>,
    runs: AtomicUsize,
    connected_hooks: AtomicUsize,
    disconnected_hooks: AtomicUsize,
    channels: Mutex<HashMap<String, Vec<f32>>>,
}

impl TestSession {
    /// Runs `script` in order, then serves commands on every later session
    pub fn scripted(script: impl IntoIterator<Item = Behavior>) -> Self {
        Self {
            script: Mutex::new(script.into_iter().collect()),
            runs: AtomicUsize::new(0),
            connected_hooks: AtomicUsize::new(0),
            disconnected_hooks: AtomicUsize::new(0),
            channels: Mutex::new(HashMap::new()),
        }
    }

    pub fn serving() -> Self {
        Self::scripted([])
    }

    pub fn runs(&self) -> usize {
        self.runs.load(Ordering::SeqCst)
    }

    pub fn connected_hooks(&self) -> usize {
        self.connected_hooks.load(Ordering::SeqCst)
    }

    pub fn disconnected_hooks(&self) -> usize {
        self.disconnected_hooks.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Session for TestSession {
    type Command = Command;
    type Link = MockLink;

    fn default_port(&self) -> u16 {
        DEFAULT_PORT
    }

    fn name(&self) -> &str {
        "test-device"
    }

    async fn run_session(&self, ctx: &mut SessionContext<'_, Self>) -> SessionResult<()> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        let behavior = self.script.lock().pop_front().unwrap_or(Behavior::Serve);

        match behavior {
            Behavior::Serve => loop {
                match ctx.next_command().await? {
                    Command::Exec { id, line } => {
                        ctx.link().send(&line)?;
                        ctx.exec_done(id);
                    }
                    Command::Read { name } => {
                        let values = self.channels.lock().get(&name).cloned().unwrap_or_default();
                        ctx.read_done(0, &name, &values);
                    }
                    Command::Write { name, values } => {
                        self.channels.lock().insert(name.clone(), values);
                        ctx.write_done(0, &name);
                    }
                }
            },
            Behavior::Return => Ok(()),
            Behavior::Fail(err) => Err(err),
            Behavior::Panic(message) => panic!("{}", message),
            Behavior::BlockThenFail(duration) => {
                std::thread::sleep(duration);
                Err(SessionError::protocol("device went silent"))
            }
        }
    }

    fn on_connected(&self) {
        self.connected_hooks.fetch_add(1, Ordering::SeqCst);
    }

    fn on_disconnected(&self) {
        self.disconnected_hooks.fetch_add(1, Ordering::SeqCst);
    }

    fn read_channel(&self, data: &mut ChannelData) {
        if let Some(values) = self.channels.lock().get(&data.name) {
            data.values.clone_from(values);
        }
    }

    fn write_channel(&self, data: &ChannelData) {
        self.channels
            .lock()
            .insert(data.name.clone(), data.values.clone());
    }
}

/// Config with the default 60 s retry delay and the given persistence
pub fn config(persistent: bool) -> ConnectorConfig {
    ConnectorConfig::builder()
        .address("dev1")
        .persistent(persistent)
        .build()
}

pub fn connector(
    session: TestSession,
    factory: &Arc<MockFactory>,
    config: ConnectorConfig,
) -> Connector<TestSession> {
    Connector::new(session, MockLink::new(), factory.clone(), config)
}

/// Build, attach `recorder` and start
pub fn started(
    session: TestSession,
    factory: &Arc<MockFactory>,
    config: ConnectorConfig,
    recorder: &Arc<Recorder>,
) -> Connector<TestSession> {
    let connector = connector(session, factory, config);
    connector.set_listener(recorder.clone());
    assert_eq!(connector.start().unwrap(), StartOutcome::Started);
    connector
}

/// Poll until `condition` holds
pub async fn eventually(condition: impl Fn() -> bool) {
    let waited = tokio::time::timeout(Duration::from_secs(900), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    assert!(waited.is_ok(), "condition never held");
}
