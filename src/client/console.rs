//! Where client notices go.

use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Info,
    Warn,
}

/// Injectable notice sink.
pub type ConsoleFn = Arc<dyn Fn(Severity, &str) + Send + Sync>;

/// Notices through the crate logger, `[hmr]` for info and `[warn]` for
/// warnings.
pub fn default_console() -> ConsoleFn {
    Arc::new(|severity, line: &str| match severity {
        Severity::Info => crate::log!("hmr"; "{}", line),
        Severity::Warn => crate::log!("warn"; "{}", line),
    })
}

/// Gates notices on the `log`/`warn` switches.
#[derive(Clone)]
pub struct Console {
    sink: ConsoleFn,
    log: bool,
    warn: bool,
}

impl Console {
    pub fn new(sink: ConsoleFn, log: bool, warn: bool) -> Self {
        Self { sink, log, warn }
    }

    pub fn info(&self, line: &str) {
        if self.log {
            (self.sink)(Severity::Info, line);
        }
    }

    pub fn warn(&self, line: &str) {
        if self.warn {
            (self.sink)(Severity::Warn, line);
        }
    }

    pub fn logs(&self) -> bool {
        self.log
    }

    pub fn warns(&self) -> bool {
        self.warn
    }
}

impl Default for Console {
    fn default() -> Self {
        Self::new(default_console(), true, true)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use parking_lot::Mutex;

    use super::*;

    /// Console capturing every notice.
    pub(crate) fn recording(log: bool, warn: bool) -> (Console, Arc<Mutex<Vec<(Severity, String)>>>) {
        let lines = Arc::new(Mutex::new(Vec::new()));
        let sink = lines.clone();
        let console = Console::new(
            Arc::new(move |severity, line: &str| sink.lock().push((severity, line.to_string()))),
            log,
            warn,
        );
        (console, lines)
    }

    #[test]
    fn test_switches_gate_notices() {
        let (console, lines) = recording(false, true);
        console.info("quiet");
        console.warn("loud");
        assert_eq!(*lines.lock(), vec![(Severity::Warn, "loud".to_string())]);
    }
}
