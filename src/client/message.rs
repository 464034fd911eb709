//! Client session: decodes relay messages and feeds the reconciler.

use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde_json::Value;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};

use super::console::{Console, ConsoleFn, default_console};
use super::reconcile::{ReconcileOptions, Reconciler};
use super::runtime::{HotError, HotRuntime, Page};
use super::stream::FrameDecoder;
use crate::relay::payload::{BundleSnapshot, HEARTBEAT};

/// Default inactivity limit; the server heartbeats twice within it.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(20_000);

/// Handler for payloads with an unknown `action`.
pub type CustomHandler = Box<dyn Fn(&Value) + Send + Sync>;

/// A decoded relay frame.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerMessage {
    Heartbeat,
    Building { name: Option<String> },
    Built(BundleSnapshot),
    Sync(BundleSnapshot),
    /// Anything published by the host
    Custom(Value),
}

impl ServerMessage {
    pub fn parse(frame: &str) -> serde_json::Result<Self> {
        if frame == HEARTBEAT {
            return Ok(Self::Heartbeat);
        }

        let value: Value = serde_json::from_str(frame)?;
        let message = match value.get("action").and_then(Value::as_str) {
            Some("building") => Self::Building {
                name: value.get("name").and_then(Value::as_str).map(str::to_string),
            },
            Some("built") => Self::Built(serde_json::from_value(value)?),
            Some("sync") => Self::Sync(serde_json::from_value(value)?),
            _ => Self::Custom(value),
        };
        Ok(message)
    }
}

#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Only react to bundles with this name
    pub name: Option<String>,
    pub reload: bool,
    pub log: bool,
    pub warn: bool,
    pub timeout: Duration,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            name: None,
            reload: false,
            log: true,
            warn: true,
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

pub struct ClientSession<R, P> {
    reconciler: Reconciler<R, P>,
    console: Console,
    name: Option<String>,
    timeout: Duration,
    last_activity: Mutex<Instant>,
    custom: Option<CustomHandler>,
}

impl<R: HotRuntime, P: Page> ClientSession<R, P> {
    pub fn new(runtime: R, page: P, options: ClientOptions) -> Self {
        Self::with_console(runtime, page, options, default_console())
    }

    pub fn with_console(runtime: R, page: P, options: ClientOptions, sink: ConsoleFn) -> Self {
        let console = Console::new(sink, options.log, options.warn);
        let reconciler = Reconciler::new(
            runtime,
            page,
            ReconcileOptions {
                reload: options.reload,
                console: console.clone(),
            },
        );

        Self {
            reconciler,
            console,
            name: options.name,
            timeout: options.timeout,
            last_activity: Mutex::new(Instant::now()),
            custom: None,
        }
    }

    pub fn with_custom_handler(mut self, handler: CustomHandler) -> Self {
        self.custom = Some(handler);
        self
    }

    pub fn reconciler(&self) -> &Reconciler<R, P> {
        &self.reconciler
    }

    /// Nothing, not even a heartbeat, arrived within the timeout.
    pub fn is_stale(&self, now: Instant) -> bool {
        now.saturating_duration_since(*self.last_activity.lock()) > self.timeout
    }

    fn touch(&self) {
        *self.last_activity.lock() = Instant::now();
    }

    /// Handle one raw frame.
    pub async fn on_frame(&self, frame: &str) {
        self.touch();
        match ServerMessage::parse(frame) {
            Ok(message) => self.process(message).await,
            Err(e) => self
                .console
                .warn(&format!("[HMR] Invalid HMR message: {frame}\n{e}")),
        }
    }

    pub async fn process(&self, message: ServerMessage) {
        match message {
            ServerMessage::Heartbeat => {}
            ServerMessage::Building { name } => {
                self.console
                    .info(&format!("[HMR] bundle {}rebuilding", quoted(name.as_deref())));
            }
            ServerMessage::Built(snapshot) => {
                self.console.info(&format!(
                    "[HMR] bundle {}rebuilt in {}ms",
                    quoted(Some(&snapshot.name)),
                    snapshot.time.unwrap_or_default()
                ));
                self.sync(snapshot).await;
            }
            ServerMessage::Sync(snapshot) => self.sync(snapshot).await,
            ServerMessage::Custom(value) => {
                if let Some(handler) = &self.custom {
                    handler(&value);
                }
            }
        }
    }

    async fn sync(&self, snapshot: BundleSnapshot) {
        if let Some(name) = &self.name
            && !snapshot.name.is_empty()
            && snapshot.name != *name
        {
            return;
        }

        if !snapshot.errors.is_empty() {
            self.report("errors", &snapshot.name, &snapshot.errors);
            return;
        }
        if !snapshot.warnings.is_empty() {
            self.report("warnings", &snapshot.name, &snapshot.warnings);
        }

        let hash = snapshot.hash.as_deref().unwrap_or_default();
        self.reconciler.on_built(hash, &snapshot.modules).await;
    }

    fn report(&self, kind: &str, name: &str, problems: &[String]) {
        self.console.warn(&format!(
            "[HMR] bundle {}has {} {}",
            quoted(Some(name)),
            problems.len(),
            kind
        ));
        for problem in problems {
            self.console.warn(&format!("[HMR] {problem}"));
        }
    }

    /// Consume an event stream until it ends.
    ///
    /// Fails when the stream errors or stays silent longer than the timeout.
    pub async fn run<S: AsyncBufRead + Unpin>(&self, stream: S) -> Result<(), HotError> {
        let mut lines = stream.lines();
        let mut decoder = FrameDecoder::new();

        loop {
            let line = tokio::time::timeout(self.timeout, lines.next_line())
                .await
                .map_err(|_| HotError::Timeout(self.timeout))??;
            let Some(line) = line else {
                return Ok(());
            };

            self.touch();
            if let Some(frame) = decoder.push_line(&line) {
                self.on_frame(&frame).await;
            }
        }
    }
}

/// `'name' ` or nothing.
fn quoted(name: Option<&str>) -> String {
    match name {
        Some(name) if !name.is_empty() => format!("'{name}' "),
        _ => String::new(),
    }
}
