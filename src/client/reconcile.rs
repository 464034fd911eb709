//! Client Update Reconciler
//!
//! Reacts to `built` notifications by asking the runtime to hot-apply the
//! new build, falling back to a full page reload when that is impossible.
//!
//! # State
//!
//! ```text
//! last_hash == current_hash ──> up to date, nothing to do
//!        │ no
//!        ▼
//! runtime idle? ──no──> drop (a check is already running)
//!        │ yes
//!        ▼
//! check ──None──────────────> reload
//!   │ ──Some(unaccepted)────> reload
//!   │ ──Some(ok)──> still behind? ──yes──> check again
//!   │ ──Err──> terminal status? ──yes──> reload
//! ```

use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;

use super::console::Console;
use super::runtime::{HotRuntime, Page, RuntimeStatus, UpdateOutcome};
use crate::relay::ModuleMap;

#[derive(Clone, Default)]
pub struct ReconcileOptions {
    /// Whether a failed update may reload the page
    pub reload: bool,
    pub console: Console,
}

pub struct Reconciler<R, P> {
    runtime: R,
    page: P,
    options: ReconcileOptions,
    /// Most recent hash announced by the server
    last_hash: Mutex<Option<String>>,
    /// Set once the page reload was requested
    reloaded: AtomicBool,
}

impl<R: HotRuntime, P: Page> Reconciler<R, P> {
    pub fn new(runtime: R, page: P, options: ReconcileOptions) -> Self {
        Self {
            runtime,
            page,
            options,
            last_hash: Mutex::new(None),
            reloaded: AtomicBool::new(false),
        }
    }

    /// Handle a `built`/`sync` notification for `hash`.
    pub async fn on_built(&self, hash: &str, modules: &ModuleMap) {
        if self.has_reloaded() {
            return;
        }

        if !hash.is_empty() {
            *self.last_hash.lock() = Some(hash.to_string());
        }

        if self.is_up_to_date() || !self.runtime.status().is_idle() {
            return;
        }

        self.options.console.info("[HMR] Checking for updates on the server...");
        self.check(modules).await;
    }

    /// Whether the last announced hash is the one running.
    pub fn is_up_to_date(&self) -> bool {
        *self.last_hash.lock() == self.runtime.current_hash()
    }

    pub fn last_hash(&self) -> Option<String> {
        self.last_hash.lock().clone()
    }

    pub fn has_reloaded(&self) -> bool {
        self.reloaded.load(Ordering::SeqCst)
    }

    pub fn runtime(&self) -> &R {
        &self.runtime
    }

    /// Run checks one after another until current, failed, or stalled.
    async fn check(&self, modules: &ModuleMap) {
        loop {
            let before = self.progress_marker();

            match self.runtime.check().await {
                Ok(None) => {
                    let console = &self.options.console;
                    console.warn("[HMR] Cannot find update (Full reload needed)");
                    console.warn("[HMR] (Probably because of restarting the server)");
                    self.perform_reload();
                    return;
                }
                Ok(Some(outcome)) => {
                    if !self.apply_outcome(&outcome, modules) {
                        return;
                    }
                }
                Err(err) => {
                    let status = self.runtime.status();
                    if status.is_terminal_failure() {
                        self.options.console.warn("[HMR] Cannot apply update. (Full reload needed)");
                        self.options.console.warn(&format!("[HMR] {err}"));
                        self.perform_reload();
                    } else {
                        self.options.console.warn(&format!("[HMR] Update check failed: {err}"));
                    }
                    return;
                }
            }

            if self.is_up_to_date() || self.has_reloaded() {
                return;
            }
            // A check that moved neither hash would repeat forever
            if self.progress_marker() == before {
                crate::debug!("hmr"; "update check made no progress, waiting for the next build");
                return;
            }
        }
    }

    /// Report a successful check. Returns `false` if it forced a reload.
    fn apply_outcome(&self, outcome: &UpdateOutcome, modules: &ModuleMap) -> bool {
        let console = &self.options.console;
        let display = |id: &str| modules.get(id).cloned().unwrap_or_else(|| id.to_string());

        let unaccepted = outcome.unaccepted();
        if !unaccepted.is_empty() {
            console.warn("[HMR] The following modules couldn't be hot updated: (They would need a full reload!)");
            for id in unaccepted {
                console.warn(&format!("[HMR]  - {}", display(id)));
            }
            self.perform_reload();
            return false;
        }

        if outcome.renewed.is_empty() {
            console.info("[HMR] Nothing hot updated.");
        } else {
            console.info("[HMR] Updated modules:");
            for id in &outcome.renewed {
                console.info(&format!("[HMR]  - {}", display(id)));
            }
        }

        if self.is_up_to_date() {
            console.info("[HMR] App is up to date.");
        }
        true
    }

    fn perform_reload(&self) {
        if !self.options.reload {
            return;
        }
        if self.reloaded.swap(true, Ordering::SeqCst) {
            return;
        }
        self.options.console.warn("[HMR] Reloading page");
        self.page.reload();
    }

    fn progress_marker(&self) -> (Option<String>, Option<String>) {
        (self.runtime.current_hash(), self.last_hash())
    }
}
