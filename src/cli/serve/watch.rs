//! Stats file compiler.
//!
//! Drives the relay from a bundler running in watch mode with JSON stats
//! output (`webpack --watch --json=dist/stats.json`).
//!
//! ```text
//! notify → Debouncer → first event of a burst  → invalid hooks
//!                    → burst quiet for window → read + parse → done hooks
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use crossbeam::channel::{self, Receiver};
use notify::{RecommendedWatcher, RecursiveMode, Watcher};

use super::debouncer::{Burst, Debouncer};
use crate::relay::{BuildResult, CompilerHooks, DoneHook, InvalidHook};
use crate::{debug, log};

/// Compiler backed by a watched stats file
pub struct StatsWatcher {
    path: PathBuf,
    window: Duration,
    invalid: Vec<InvalidHook>,
    done: Vec<DoneHook>,
}

impl CompilerHooks for StatsWatcher {
    fn on_invalid(&mut self, hook: InvalidHook) {
        self.invalid.push(hook);
    }

    fn on_done(&mut self, hook: DoneHook) {
        self.done.push(hook);
    }
}

impl StatsWatcher {
    pub fn new(path: impl Into<PathBuf>, window: Duration) -> Self {
        Self {
            path: path.into(),
            window,
            invalid: Vec::new(),
            done: Vec::new(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn invalidate(&self) {
        debug!("watch"; "{} changing", self.path.display());
        self.invalid.iter().for_each(|hook| hook());
    }

    /// Read the stats file and fire the done hooks.
    ///
    /// Unreadable or malformed files are logged and skipped.
    fn finish(&self) -> bool {
        match load_stats(&self.path) {
            Ok(result) => {
                self.done.iter().for_each(|hook| hook(&result));
                true
            }
            Err(e) => {
                log!("watch"; "{:#}", e);
                false
            }
        }
    }

    /// Start watching on a background thread.
    ///
    /// The watcher starts before the existing file is read, so no write is
    /// lost in between. Returns when `shutdown` fires or disconnects.
    pub fn spawn(self, shutdown: Receiver<()>) -> Result<JoinHandle<()>> {
        let (notify_tx, notify_rx) = channel::unbounded();
        let mut watcher = notify::recommended_watcher(move |res| {
            let _ = notify_tx.send(res);
        })
        .context("Failed to create file watcher")?;

        let dir = watch_dir(&self.path);
        watcher
            .watch(&dir, RecursiveMode::NonRecursive)
            .with_context(|| format!("Failed to watch {}", dir.display()))?;
        log!("watch"; "{}", self.path.display());

        thread::Builder::new()
            .name("stats-watcher".into())
            .spawn(move || self.run(watcher, notify_rx, shutdown))
            .context("Failed to spawn stats watcher")
    }

    fn run(
        self,
        _watcher: RecommendedWatcher,
        events: Receiver<notify::Result<notify::Event>>,
        shutdown: Receiver<()>,
    ) {
        if self.path.is_file() {
            self.finish();
        }

        let mut debouncer = Debouncer::new(self.window);
        loop {
            crossbeam::select! {
                recv(shutdown) -> _ => break,
                recv(events) -> msg => match msg {
                    Ok(Ok(event)) => {
                        if debouncer.add_event(&event, &self.path, Instant::now()) == Burst::Started {
                            self.invalidate();
                        }
                    }
                    Ok(Err(e)) => log!("watch"; "notify error: {}", e),
                    Err(_) => break,
                },
                default(debouncer.sleep_duration(Instant::now())) => {
                    if debouncer.take_if_ready(Instant::now()) {
                        self.finish();
                    }
                }
            }
        }
        debug!("watch"; "stopped");
    }
}

/// Directory to watch: the file may not exist yet or be replaced on write.
fn watch_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

/// Parse a stats file: an object is one compiler, an array a multi-compiler.
pub fn load_stats(path: &Path) -> Result<BuildResult> {
    let content =
        fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let value: serde_json::Value = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse {} as JSON stats", path.display()))?;
    Ok(BuildResult::from_json(value))
}
