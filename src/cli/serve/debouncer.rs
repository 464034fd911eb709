//! Pure debouncer for stats file events: timing only, no I/O.

use std::path::Path;
use std::time::{Duration, Instant};

/// Outcome of feeding one notify event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum Burst {
    /// Event ignored (other file or metadata noise)
    Ignored,
    /// First event of a new burst: the compiler is writing
    Started,
    /// Event extends the running burst
    Extended,
}

pub(super) struct Debouncer {
    window: Duration,
    last_event: Option<Instant>,
}

impl Debouncer {
    pub(super) fn new(window: Duration) -> Self {
        Self {
            window,
            last_event: None,
        }
    }

    /// Feed a notify event for the watched `target` file.
    pub(super) fn add_event(&mut self, event: &notify::Event, target: &Path, now: Instant) -> Burst {
        use notify::EventKind;
        use notify::event::ModifyKind;

        match event.kind {
            EventKind::Create(_) => {}
            // Ignore metadata-only changes (mtime/atime/chmod noise)
            EventKind::Modify(ModifyKind::Metadata(_)) => return Burst::Ignored,
            EventKind::Modify(_) => {}
            _ => return Burst::Ignored,
        }

        if !event.paths.iter().any(|path| is_target(path, target)) {
            return Burst::Ignored;
        }

        crate::debug!("watch"; "raw notify: {:?} {:?}", event.kind, event.paths);
        match self.last_event.replace(now) {
            None => Burst::Started,
            Some(_) => Burst::Extended,
        }
    }

    /// End the burst if it has been quiet for the whole window.
    pub(super) fn take_if_ready(&mut self, now: Instant) -> bool {
        if !self.is_ready(now) {
            return false;
        }
        self.last_event = None;
        true
    }

    pub(super) fn is_ready(&self, now: Instant) -> bool {
        self.last_event
            .is_some_and(|last| now.saturating_duration_since(last) >= self.window)
    }

    /// Precise sleep duration until the burst can end.
    pub(super) fn sleep_duration(&self, now: Instant) -> Duration {
        let Some(last) = self.last_event else {
            return Duration::from_secs(86400);
        };
        self.window
            .saturating_sub(now.saturating_duration_since(last))
            .max(Duration::from_millis(1))
    }
}

/// Editors and bundlers may write through a temp file and rename, so match
/// by file name within the watched directory.
fn is_target(path: &Path, target: &Path) -> bool {
    path == target || (path.file_name().is_some() && path.file_name() == target.file_name())
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    const WINDOW: Duration = Duration::from_millis(100);

    fn make_event(path: &str, kind: notify::EventKind) -> notify::Event {
        notify::Event {
            kind,
            paths: vec![PathBuf::from(path)],
            attrs: Default::default(),
        }
    }

    fn modify_kind() -> notify::EventKind {
        notify::EventKind::Modify(notify::event::ModifyKind::Data(
            notify::event::DataChange::Any,
        ))
    }

    fn metadata_kind() -> notify::EventKind {
        notify::EventKind::Modify(notify::event::ModifyKind::Metadata(
            notify::event::MetadataKind::WriteTime,
        ))
    }

    fn create_kind() -> notify::EventKind {
        notify::EventKind::Create(notify::event::CreateKind::File)
    }

    fn target() -> &'static Path {
        Path::new("/app/dist/stats.json")
    }

    #[test]
    fn test_debouncer_empty() {
        let debouncer = Debouncer::new(WINDOW);
        assert!(!debouncer.is_ready(Instant::now()));
    }

    #[test]
    fn test_burst_lifecycle() {
        let mut debouncer = Debouncer::new(WINDOW);
        let start = Instant::now();

        assert_eq!(
            debouncer.add_event(&make_event("/app/dist/stats.json", create_kind()), target(), start),
            Burst::Started
        );
        let later = start + Duration::from_millis(50);
        assert_eq!(
            debouncer.add_event(&make_event("/app/dist/stats.json", modify_kind()), target(), later),
            Burst::Extended
        );

        // Window restarts at the last event
        assert!(!debouncer.take_if_ready(start + WINDOW));
        assert_eq!(debouncer.sleep_duration(start + WINDOW), Duration::from_millis(50));
        assert!(debouncer.take_if_ready(later + WINDOW));
        assert!(!debouncer.is_ready(later + WINDOW * 2));
    }

    #[test]
    fn test_other_files_and_metadata_ignored() {
        let mut debouncer = Debouncer::new(WINDOW);
        let now = Instant::now();

        assert_eq!(
            debouncer.add_event(&make_event("/app/dist/main.js", modify_kind()), target(), now),
            Burst::Ignored
        );
        assert_eq!(
            debouncer.add_event(&make_event("/app/dist/stats.json", metadata_kind()), target(), now),
            Burst::Ignored
        );
        assert!(!debouncer.is_ready(now + WINDOW));
    }

    #[test]
    fn test_sleep_when_idle() {
        let debouncer = Debouncer::new(WINDOW);
        assert!(debouncer.sleep_duration(Instant::now()) > Duration::from_secs(3600));
    }
}
