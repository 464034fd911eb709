//! hotrelay - build-status relay for hot module replacement.
//!
//! The server half ([`relay`]) taps a compiler's lifecycle and pushes
//! `building` / `built` / `sync` payloads to every browser subscribed to its
//! event stream. The client half ([`client`]) consumes that stream and drives
//! a module-patching runtime, reloading the page when an update cannot be
//! applied in place.
//!
//! ```ignore
//! let mut compiler = StatsWatcher::new("dist/stats.json", Duration::from_millis(200));
//! let hot = HotMiddleware::new(&mut compiler, RelayOptions::default());
//!
//! for request in server.incoming_requests() {
//!     if let Some(request) = hot.handle(request) {
//!         // not a relay endpoint
//!     }
//! }
//! ```

pub mod cli;
pub mod client;
pub mod config;
pub mod core;
pub mod logger;
pub mod relay;
