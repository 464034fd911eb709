//! Broadcast Channel - push-stream fan-out
//!
//! This channel is responsible for:
//! - Opening push streams and registering them under fresh ids
//! - Writing every published frame to every open stream, in order
//! - Heartbeating open streams so idle-timeout proxies keep them open
//! - Reclaiming streams whose peer went away
//!
//! # Architecture
//!
//! ```text
//! Publisher --[frame]--> BroadcastChannel --[queue]--> writer thread --[data: ...]--> client
//!                              ^                (one per connection)
//!                  heartbeat --+ (background thread, every N ms)
//! ```
//!
//! A connection whose queue fills up is dropped instead of waited on.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::thread;
use std::time::Duration;

use crossbeam::channel::{self, Receiver, Sender, TrySendError};
use parking_lot::Mutex;
use serde::Serialize;

use super::payload::{heartbeat_frame, json_frame};
use super::transport::{EventSink, PushTransport, ResponseHead};

/// Default heartbeat interval
pub const DEFAULT_HEARTBEAT: Duration = Duration::from_millis(10_000);

/// Frames a connection may have queued before it counts as stalled
pub const QUEUE_CAPACITY: usize = 64;

/// Unique id of a registered connection
pub type ConnectionId = u64;

/// One serialized frame, shared by every queue it is pushed to
type Frame = Arc<[u8]>;

/// Push stream opened on a transport but not registered yet.
pub struct OpenStream {
    sink: Box<dyn EventSink>,
}

/// A registered push stream.
///
/// The registry only ever enqueues; the socket is written by the
/// connection's own writer thread, so a peer that stops reading stalls
/// nobody but itself.
struct Connection {
    queue: Sender<Frame>,
    /// Cleared by the writer on the first failed write
    alive: Arc<AtomicBool>,
}

impl Connection {
    /// Start the writer thread for `sink`.
    fn spawn(id: ConnectionId, sink: Box<dyn EventSink>, capacity: usize) -> Option<Self> {
        let (queue, frames) = channel::bounded(capacity);
        let alive = Arc::new(AtomicBool::new(true));

        let flag = Arc::clone(&alive);
        let spawned = thread::Builder::new()
            .name(format!("hmr-client-{id}"))
            .spawn(move || write_loop(id, sink, frames, flag));
        if let Err(e) = spawned {
            crate::log!("hmr"; "failed to start writer for client {}: {}", id, e);
            return None;
        }

        Some(Self { queue, alive })
    }

    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    /// Queue one frame without blocking. `false` when the writer failed or
    /// fell `QUEUE_CAPACITY` frames behind.
    fn enqueue(&self, id: ConnectionId, frame: &Frame) -> bool {
        if !self.is_alive() {
            return false;
        }
        match self.queue.try_send(Arc::clone(frame)) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                crate::debug!("hmr"; "client {} is not reading, dropping it", id);
                false
            }
            Err(TrySendError::Disconnected(_)) => false,
        }
    }
}

/// Drain `frames` into `sink` until the queue is dropped or a write fails,
/// then end the stream.
fn write_loop(
    id: ConnectionId,
    mut sink: Box<dyn EventSink>,
    frames: Receiver<Frame>,
    alive: Arc<AtomicBool>,
) {
    for frame in frames.iter() {
        if let Err(e) = sink.write_frame(&frame) {
            crate::debug!("hmr"; "write to client {} failed: {}", id, e);
            alive.store(false, Ordering::SeqCst);
            break;
        }
    }
    if !sink.is_finished() {
        sink.end();
    }
}

/// Connection registry, owned exclusively by the channel
#[derive(Default)]
struct Registry {
    clients: BTreeMap<ConnectionId, Connection>,
    next_id: ConnectionId,
    closed: bool,
}

impl Registry {
    /// Queue `frame` for every client. Clients whose writer failed or
    /// stalled are treated as closed by their peer and reclaimed after the
    /// fan-out completes.
    fn broadcast(&mut self, frame: &Frame) {
        let gone: Vec<ConnectionId> = self
            .clients
            .iter()
            .filter(|(id, client)| !client.enqueue(**id, frame))
            .map(|(id, _)| *id)
            .collect();
        for id in gone {
            self.disconnect(id);
        }
    }

    /// Dropping the queue lets the writer flush what is left and end the
    /// stream.
    fn disconnect(&mut self, id: ConnectionId) -> bool {
        if self.clients.remove(&id).is_none() {
            return false;
        }
        crate::debug!("hmr"; "client {} disconnected (total: {})", id, self.clients.len());
        true
    }
}

/// Fan-out of event-stream frames to every open push stream.
///
/// All public operations are no-ops once [`close`](Self::close) has run.
/// Nothing here writes to a socket while holding the registry lock.
pub struct BroadcastChannel {
    registry: Arc<Mutex<Registry>>,
    /// Dropping the sender stops the heartbeat thread
    heartbeat_stop: Mutex<Option<Sender<()>>>,
}

impl BroadcastChannel {
    /// Create a channel and start its heartbeat.
    pub fn new(heartbeat: Duration) -> Self {
        let registry = Arc::new(Mutex::new(Registry::default()));
        let (stop_tx, stop_rx) = channel::bounded::<()>(0);

        let weak = Arc::downgrade(&registry);
        let spawned = thread::Builder::new()
            .name("hmr-heartbeat".into())
            .spawn(move || heartbeat_loop(weak, heartbeat, stop_rx));
        if let Err(e) = spawned {
            crate::log!("hmr"; "failed to start heartbeat: {}", e);
        }

        Self {
            registry,
            heartbeat_stop: Mutex::new(Some(stop_tx)),
        }
    }

    /// Open a push stream on `transport` and register it.
    ///
    /// Returns `None` when the channel is closed or the stream could not be
    /// opened.
    pub fn subscribe<T: PushTransport>(&self, transport: T) -> Option<ConnectionId> {
        self.subscribe_with(transport, &[])
    }

    /// Like [`subscribe`](Self::subscribe), then queues `greeting` frames
    /// for the new connection only.
    pub fn subscribe_with<T: PushTransport>(
        &self,
        transport: T,
        greeting: &[String],
    ) -> Option<ConnectionId> {
        let stream = self.open(transport)?;
        self.register(stream, greeting)
    }

    /// Send the event-stream head on `transport`. Runs outside every lock.
    pub fn open<T: PushTransport>(&self, transport: T) -> Option<OpenStream> {
        if self.is_closed() {
            return None;
        }

        let head = ResponseHead::event_stream(transport.version());
        match transport.open(&head) {
            Ok(sink) => Some(OpenStream { sink }),
            Err(e) => {
                crate::debug!("hmr"; "failed to open event stream: {}", e);
                None
            }
        }
    }

    /// Register an opened stream.
    ///
    /// The handshake `"\n"` and `greeting` are queued under the registry
    /// lock, so no published frame can overtake them.
    pub fn register(&self, stream: OpenStream, greeting: &[String]) -> Option<ConnectionId> {
        let mut registry = self.registry.lock();
        let mut sink = stream.sink;
        if registry.closed {
            sink.end();
            return None;
        }

        let id = registry.next_id;
        registry.next_id += 1;

        let client = Connection::spawn(id, sink, QUEUE_CAPACITY.max(greeting.len() + 1))?;
        // Flush headers right away
        let handshake: Frame = Arc::from(&b"\n"[..]);
        let queued = client.enqueue(id, &handshake)
            && greeting
                .iter()
                .all(|frame| client.enqueue(id, &Arc::from(frame.as_bytes())));
        if !queued {
            return None;
        }

        registry.clients.insert(id, client);
        crate::debug!("hmr"; "client {} connected (total: {})", id, registry.clients.len());
        Some(id)
    }

    /// Serialize `payload` once and queue it for every connection.
    pub fn publish<T: Serialize + ?Sized>(&self, payload: &T) {
        match json_frame(payload) {
            Ok(frame) => self.publish_frame(&frame),
            Err(e) => crate::log!("hmr"; "failed to serialize payload: {}", e),
        }
    }

    /// Queue an already framed payload for every connection.
    pub fn publish_frame(&self, frame: &str) {
        let frame: Frame = Arc::from(frame.as_bytes());
        let mut registry = self.registry.lock();
        if registry.closed {
            return;
        }
        registry.broadcast(&frame);
    }

    /// Transport-close handler: forget `id` and end its stream once the
    /// frames already queued are written.
    ///
    /// Returns `false` if the connection was already gone.
    pub fn disconnect(&self, id: ConnectionId) -> bool {
        self.registry.lock().disconnect(id)
    }

    /// Stop the heartbeat, end every stream and clear the registry.
    ///
    /// Idempotent; there is no way to reopen a closed channel.
    pub fn close(&self) {
        let mut registry = self.registry.lock();
        if registry.closed {
            return;
        }
        registry.closed = true;
        self.heartbeat_stop.lock().take();
        registry.clients.clear();
        crate::debug!("hmr"; "event stream closed");
    }

    pub fn is_closed(&self) -> bool {
        self.registry.lock().closed
    }

    /// Number of registered connections
    pub fn connection_count(&self) -> usize {
        self.registry.lock().clients.len()
    }

    /// Whether `id` is registered and no write to it has failed yet.
    ///
    /// A failed connection stays registered until the next fan-out
    /// reclaims it.
    pub fn is_alive(&self, id: ConnectionId) -> bool {
        self.registry
            .lock()
            .clients
            .get(&id)
            .is_some_and(Connection::is_alive)
    }
}

impl Drop for BroadcastChannel {
    fn drop(&mut self) {
        self.close();
    }
}

/// Queue the heartbeat frame every `interval` until stopped.
///
/// Holds only a weak reference, so a dropped channel also ends the loop.
/// The thread is detached and never delays process exit.
fn heartbeat_loop(registry: Weak<Mutex<Registry>>, interval: Duration, stop: Receiver<()>) {
    let ticker = channel::tick(interval);
    let frame: Frame = Arc::from(heartbeat_frame().as_bytes());

    loop {
        crossbeam::select! {
            recv(stop) -> _ => break,
            recv(ticker) -> _ => {
                let Some(registry) = registry.upgrade() else { break };
                let mut registry = registry.lock();
                if registry.closed {
                    break;
                }
                registry.broadcast(&frame);
            }
        }
    }
}
