//! Terminal output: prefixed log lines and the serve-mode build status block.
//!
//! ```ignore
//! log!("hmr"; "webpack built {} in {}ms", hash, time);
//! debug!("hmr"; "client {} connected", id);
//! ```

use crossterm::{
    cursor, execute,
    terminal::{Clear, ClearType},
};
use owo_colors::OwoColorize;
use parking_lot::Mutex;
use std::{
    io::{Write, stdout},
    sync::LazyLock,
    sync::atomic::{AtomicBool, Ordering},
    time::{SystemTime, UNIX_EPOCH},
};

/// Set by `serve --verbose`
static VERBOSE: AtomicBool = AtomicBool::new(false);

pub fn set_verbose(v: bool) {
    VERBOSE.store(v, Ordering::SeqCst);
}

pub fn is_verbose() -> bool {
    VERBOSE.load(Ordering::SeqCst)
}

/// Print a line under a colored `[module]` tag.
///
/// ```ignore
/// log!("watch"; "{} changed", path.display());
/// ```
#[macro_export]
macro_rules! log {
    ($module:expr; $($arg:tt)*) => {{
        $crate::logger::log($module, &format!($($arg)*))
    }};
}

/// Like [`log!`], but only with `--verbose`.
#[macro_export]
macro_rules! debug {
    ($module:expr; $($arg:tt)*) => {{
        if $crate::logger::is_verbose() {
            $crate::logger::log($module, &format!($($arg)*))
        }
    }};
}

pub fn log(module: &str, message: &str) {
    let tag = paint_tag(module);

    let mut out = stdout().lock();
    // A status block may still own the rest of the line
    execute!(out, Clear(ClearType::UntilNewLine)).ok();
    writeln!(out, "{tag} {message}").ok();
    out.flush().ok();
}

/// `serve` blue, `hmr` magenta, `watch` green, `error` red, the rest yellow.
fn paint_tag(module: &str) -> String {
    let tag = format!("[{module}]");
    let tag = tag.bold();
    match module.to_ascii_lowercase().as_str() {
        "serve" => tag.bright_blue().to_string(),
        "hmr" => tag.bright_magenta().to_string(),
        "watch" => tag.bright_green().to_string(),
        "error" => tag.bright_red().to_string(),
        _ => tag.bright_yellow().to_string(),
    }
}

// ============================================================================
// build status block
// ============================================================================

/// Leading mark of a status block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mark {
    Ok,
    Warn,
    Fail,
}

impl Mark {
    fn render(self) -> String {
        match self {
            Self::Ok => "✓".green().to_string(),
            Self::Warn => "⚠".yellow().to_string(),
            Self::Fail => "✗".red().to_string(),
        }
    }
}

/// Status of the latest build, redrawn in place after every build.
#[derive(Debug, Default)]
pub struct StatusBlock {
    /// Terminal lines taken by the block currently on screen
    height: usize,
}

static STATUS: LazyLock<Mutex<StatusBlock>> = LazyLock::new(|| Mutex::new(StatusBlock::new()));

impl StatusBlock {
    pub const fn new() -> Self {
        Self { height: 0 }
    }

    /// Replace the block on screen with `message`.
    pub fn show(&mut self, mark: Mark, message: &str) {
        let mut out = stdout().lock();

        if let Ok(height) = u16::try_from(self.height)
            && height > 0
        {
            execute!(out, cursor::MoveUp(height), Clear(ClearType::FromCursorDown)).ok();
        }

        let stamp = format!("[{}]", clock()).dimmed().to_string();
        writeln!(out, "{stamp} {} {message}", mark.render()).ok();
        out.flush().ok();

        self.height = block_height(message);
    }

    /// Keep the block on screen; the next one is printed below it.
    pub fn detach(&mut self) {
        self.height = 0;
    }
}

fn block_height(message: &str) -> usize {
    message.lines().count().max(1)
}

/// UTC wall clock as `HH:MM:SS`.
fn clock() -> String {
    let secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| elapsed.as_secs());
    format!("{:02}:{:02}:{:02}", secs / 3600 % 24, secs / 60 % 60, secs % 60)
}

/// Show `message` in the global status block.
pub fn status(mark: Mark, message: &str) {
    STATUS.lock().show(mark, message);
}

/// Detach the global status block.
pub fn status_detach() {
    STATUS.lock().detach();
}
