//! Line-protocol session and console listener

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use relink::prelude::*;
use relink::TransportError;
use relink_tcp::LineLink;
use tokio::sync::Notify;
use tracing::{debug, error, info, warn};

/// Talks to devices that answer `NAME?` queries with comma-separated values
#[derive(Debug)]
pub struct LineQuery {
    port: u16,
    channels: Mutex<HashMap<String, Vec<f32>>>,
}

impl LineQuery {
    pub fn new(port: u16) -> Self {
        Self {
            port,
            channels: Mutex::new(HashMap::new()),
        }
    }
}

async fn query(ctx: &mut SessionContext<'_, LineQuery>, line: &str) -> SessionResult<String> {
    ctx.link().send_line(line).await?;
    match ctx.link().recv_line().await? {
        Some(reply) => Ok(reply),
        None => Err(TransportError::ConnectionLost("device closed the connection".into()).into()),
    }
}

#[async_trait]
impl Session for LineQuery {
    type Command = Command;
    type Link = LineLink;

    fn default_port(&self) -> u16 {
        self.port
    }

    fn name(&self) -> &str {
        "line-query"
    }

    async fn run_session(&self, ctx: &mut SessionContext<'_, Self>) -> SessionResult<()> {
        loop {
            match ctx.next_command().await? {
                Command::Exec { id, line } => {
                    if line.trim_end().ends_with('?') {
                        let reply = query(ctx, &line).await?;
                        println!("{reply}");
                    } else {
                        ctx.link().send_line(&line).await?;
                    }
                    ctx.exec_done(id);
                }
                Command::Read { name } => {
                    let reply = query(ctx, &format!("{name}?")).await?;
                    match parse_values(&reply) {
                        Some(values) => {
                            self.channels.lock().insert(name.clone(), values.clone());
                            ctx.read_done(0, &name, &values);
                        }
                        None => {
                            warn!("Unparseable reply to {}?: {:?}", name, reply);
                            ctx.read_done(-1, &name, &[]);
                        }
                    }
                }
                Command::Write { name, values } => {
                    let rendered: Vec<String> = values.iter().map(f32::to_string).collect();
                    ctx.link()
                        .send_line(&format!("{name} {}", rendered.join(",")))
                        .await?;
                    self.channels.lock().insert(name.clone(), values);
                    ctx.write_done(0, &name);
                }
            }
        }
    }

    fn on_connected(&self) {
        debug!("Discarding {} cached channels", self.channels.lock().len());
        self.channels.lock().clear();
    }

    fn read_channel(&self, data: &mut ChannelData) {
        if let Some(values) = self.channels.lock().get(&data.name) {
            data.values.clone_from(values);
        }
    }
}

/// Turn an input line into a command: `read NAME`, `write NAME v1,v2`, or raw text
pub fn parse_command(id: i32, line: &str) -> Command {
    let line = line.trim();
    if let Some(name) = line.strip_prefix("read ") {
        return Command::read(name.trim());
    }
    if let Some((name, values)) = line
        .strip_prefix("write ")
        .and_then(|rest| rest.trim().split_once(' '))
        && let Some(values) = parse_values(values)
    {
        return Command::write(name, values);
    }
    Command::exec(id, line)
}

fn parse_values(text: &str) -> Option<Vec<f32>> {
    text.split(',')
        .map(|v| v.trim().parse::<f32>().ok())
        .collect()
}

/// Prints completions and logs lifecycle events
#[derive(Debug, Default)]
pub struct Console {
    completed: AtomicUsize,
    notify: Notify,
}

impl Console {
    fn complete(&self) {
        self.completed.fetch_add(1, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    /// Resolves once `count` commands have completed
    pub async fn wait_completed(&self, count: usize) {
        loop {
            let notified = self.notify.notified();
            if self.completed.load(Ordering::SeqCst) >= count {
                return;
            }
            notified.await;
        }
    }
}

impl ConnectorListener for Console {
    fn connected(&self) {
        info!("Connected");
    }

    fn disconnected(&self) {
        info!("Disconnected");
    }

    fn exception(&self, error: &ConnectorError) {
        error!("{}", error);
    }

    fn exec_done(&self, id: i32) {
        debug!("Command {} done", id);
        self.complete();
    }

    fn read_done(&self, result: i32, name: &str, values: &[f32]) {
        if result == 0 {
            println!("{name} = {values:?}");
        }
        self.complete();
    }

    fn write_done(&self, _result: i32, name: &str) {
        debug!("Wrote {}", name);
        self.complete();
    }

    fn fault(&self, description: &str) {
        error!("Session fault: {}", description);
    }
}
