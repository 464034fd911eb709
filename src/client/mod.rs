//! Client half of the relay: consumes the event stream and keeps the running
//! code in step with the latest build.

pub mod console;
pub mod message;
pub mod reconcile;
pub mod runtime;
pub mod stream;

pub use console::{Console, ConsoleFn, Severity};
pub use message::{ClientOptions, ClientSession, ServerMessage};
pub use reconcile::{ReconcileOptions, Reconciler};
pub use runtime::{HotError, HotRuntime, HotStatus, Page, RuntimeStatus, UpdateOutcome};
pub use stream::FrameDecoder;
