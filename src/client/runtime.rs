//! Collaborators of the client: the module-patching runtime and the page.

use std::fmt;
use std::future::Future;

use thiserror::Error;

/// Status reported by a hot-module runtime.
///
/// Opaque to the reconciler apart from these two questions.
pub trait RuntimeStatus: Copy + fmt::Debug {
    /// No check or apply in flight
    fn is_idle(&self) -> bool;
    /// The runtime gave up on the last update
    fn is_terminal_failure(&self) -> bool;
}

/// Stock status vocabulary of a webpack-style runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HotStatus {
    #[default]
    Idle,
    Check,
    Prepare,
    Ready,
    Dispose,
    Apply,
    Abort,
    Fail,
}

impl RuntimeStatus for HotStatus {
    fn is_idle(&self) -> bool {
        matches!(self, Self::Idle)
    }

    fn is_terminal_failure(&self) -> bool {
        matches!(self, Self::Abort | Self::Fail)
    }
}

impl fmt::Display for HotStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Check => "check",
            Self::Prepare => "prepare",
            Self::Ready => "ready",
            Self::Dispose => "dispose",
            Self::Apply => "apply",
            Self::Abort => "abort",
            Self::Fail => "fail",
        };
        f.write_str(name)
    }
}

/// Result of a successful update check.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdateOutcome {
    /// Modules the server reported as changed
    pub updated: Vec<String>,
    /// Modules that were actually replaced in place
    pub renewed: Vec<String>,
}

impl UpdateOutcome {
    /// Changed modules that could not be replaced, in report order.
    pub fn unaccepted(&self) -> Vec<&str> {
        self.updated
            .iter()
            .filter(|id| !self.renewed.contains(id))
            .map(String::as_str)
            .collect()
    }
}

/// Client-side failures.
#[derive(Debug, Error)]
pub enum HotError {
    #[error("update check failed: {0}")]
    Check(String),

    #[error("update could not be applied: {0}")]
    Apply(String),

    #[error("event stream error: {0}")]
    Stream(#[from] std::io::Error),

    #[error("no activity on the event stream for {0:?}")]
    Timeout(std::time::Duration),
}

/// Module-patching runtime driven by the reconciler.
pub trait HotRuntime {
    type Status: RuntimeStatus;

    fn status(&self) -> Self::Status;

    /// Hash of the code currently running, if known
    fn current_hash(&self) -> Option<String>;

    /// Ask the server for an update and apply it.
    ///
    /// `Ok(None)` means the server had no update for the running hash.
    fn check(&self) -> impl Future<Output = Result<Option<UpdateOutcome>, HotError>>;
}

/// The page hosting the running code.
pub trait Page {
    /// Full reload; the reconciler never calls this twice.
    fn reload(&self);
}
