//! Server half of the relay: event-stream fan-out of compiler status.

pub mod channel;
pub mod client_events;
pub mod middleware;
pub mod payload;
pub mod publisher;
pub mod stats;
pub mod transport;

pub use channel::{BroadcastChannel, ConnectionId, OpenStream};
pub use client_events::{ClientEventsHandler, EventResponse, ReloadCallback};
pub use middleware::{CompilerHooks, DoneHook, HotMiddleware, InvalidHook, RelayOptions, Route};
pub use payload::{BroadcastPayload, BundleSnapshot, ModuleMap};
pub use publisher::{BuildPublisher, LogFn};
pub use stats::{BuildResult, BuildStats, JsonStats, StatsOptions};
