//! Serve-side hooks: the reload-needed command and the build status line.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use std::sync::Arc;
use std::thread;

use anyhow::{Context, Result, bail};

use crate::logger::{Mark, status};
use crate::relay::stats::collect_bundles;
use crate::relay::{BuildResult, ReloadCallback};
use crate::{debug, log};

// ============================================================================
// reload-needed command
// ============================================================================

/// External command run when a client reports it needs a full reload.
#[derive(Debug, Clone)]
pub struct ReloadCommand {
    program: PathBuf,
    args: Vec<OsString>,
    cwd: PathBuf,
}

impl ReloadCommand {
    /// Resolve `argv[0]` on `PATH`. Empty `argv` means no command.
    pub fn resolve(argv: &[String], cwd: &Path) -> Result<Option<Self>> {
        let Some((program, args)) = argv.split_first() else {
            return Ok(None);
        };

        let program = which::which(program)
            .with_context(|| format!("`{program}` not found in PATH"))?;

        Ok(Some(Self {
            program,
            args: args.iter().map(OsString::from).collect(),
            cwd: cwd.to_path_buf(),
        }))
    }

    fn name(&self) -> String {
        self.program
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// Run to completion, failing on a non-zero exit.
    pub fn run(&self) -> Result<Output> {
        let name = self.name();
        let output = Command::new(&self.program)
            .args(&self.args)
            .current_dir(&self.cwd)
            .output()
            .with_context(|| format!("Failed to execute `{name}`"))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!("Command `{name}` failed with {}\n{}", output.status, stderr.trim());
        }
        Ok(output)
    }

    /// Callback running the command off the request thread.
    pub fn into_callback(self) -> ReloadCallback {
        let command = Arc::new(self);
        Arc::new(move || {
            let command = Arc::clone(&command);
            let spawned = thread::Builder::new()
                .name("reload-hook".into())
                .spawn(move || {
                    log!("hook"; "`{}` running", command.name());
                    if let Err(e) = command.run() {
                        log!("hook"; "failed: {:#}", e);
                    }
                });
            if let Err(e) = spawned {
                log!("hook"; "failed to start: {}", e);
            }
        })
    }
}

/// Callback for the configured command, or a plain log line without one.
pub fn reload_needed_callback(argv: &[String], cwd: &Path) -> ReloadCallback {
    match ReloadCommand::resolve(argv, cwd) {
        Ok(Some(command)) => command.into_callback(),
        Ok(None) => Arc::new(|| log!("hmr"; "client requested a full reload")),
        Err(e) => {
            log!("hmr"; "reload hook disabled: {:#}", e);
            Arc::new(|| debug!("hmr"; "client requested a full reload"))
        }
    }
}

// ============================================================================
// build status
// ============================================================================

/// Summary of one finished build for the status line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildStatus {
    Success(String),
    Warnings(String),
    Errors { summary: String, detail: String },
}

impl BuildStatus {
    pub fn from_result(result: &BuildResult) -> Self {
        let bundles = collect_bundles(result);
        let errors: Vec<&String> = bundles.iter().flat_map(|b| &b.errors).collect();
        let warnings: Vec<&String> = bundles.iter().flat_map(|b| &b.warnings).collect();

        if let Some(first) = errors.first() {
            return Self::Errors {
                summary: format!("{} {}", errors.len(), plural(errors.len(), "error")),
                detail: (*first).clone(),
            };
        }

        let built = bundles
            .iter()
            .map(|b| format!("{}{}", b.label(), b.hash.as_deref().unwrap_or_default()))
            .collect::<Vec<_>>()
            .join(", ");

        if warnings.is_empty() {
            Self::Success(format!("built {built}"))
        } else {
            Self::Warnings(format!(
                "built {built} with {} {}",
                warnings.len(),
                plural(warnings.len(), "warning")
            ))
        }
    }

    pub fn display(&self) {
        match self {
            Self::Success(message) => status(Mark::Ok, message),
            Self::Warnings(message) => status(Mark::Warn, message),
            Self::Errors { summary, detail } => status(Mark::Fail, &format!("{summary}\n{detail}")),
        }
    }
}

fn plural(count: usize, word: &str) -> String {
    if count == 1 {
        word.to_string()
    } else {
        format!("{word}s")
    }
}

/// Done hook updating the status line.
pub fn report_build(result: &BuildResult) {
    BuildStatus::from_result(result).display();
}
