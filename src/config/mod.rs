//! Relay configuration management for `hotrelay.toml`.
//!
//! # Module Structure
//!
//! ```text
//! config/
//! ├── section/       # Configuration section definitions
//! │   ├── hmr        # [hmr]
//! │   ├── serve      # [serve]
//! │   └── watch      # [watch]
//! ├── types/         # Utility types
//! │   ├── error      # ConfigError, ConfigDiagnostics
//! │   ├── field      # FieldPath
//! │   └── handle     # Global config handle
//! └── mod.rs         # RelayConfig (this file)
//! ```
//!
//! # Sections
//!
//! | Section   | Purpose                                          |
//! |-----------|--------------------------------------------------|
//! | `[serve]` | HTTP listener (interface, port)                  |
//! | `[hmr]`   | Relay endpoints, heartbeat, logging, reload hook |
//! | `[watch]` | Compiler stats file and debounce                 |

pub mod section;
pub mod types;
mod util;

use util::find_config_file;

pub use section::{HmrConfig, ServeConfig, WatchConfig};
pub use types::{ConfigDiagnostics, ConfigError, FieldPath, cfg, init_config};

use crate::{
    cli::{Cli, Commands, ServeArgs},
    log,
};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
};

// ============================================================================
// root configuration
// ============================================================================

/// Root configuration structure representing hotrelay.toml
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RelayConfig {
    /// Absolute path to the config file (internal use only)
    #[serde(skip)]
    pub config_path: PathBuf,

    /// Project root directory - parent of config file (internal use only)
    #[serde(skip)]
    pub root: PathBuf,

    /// HTTP listener settings
    #[serde(default)]
    pub serve: ServeConfig,

    /// Relay settings
    #[serde(default)]
    pub hmr: HmrConfig,

    /// Stats file watching
    #[serde(default)]
    pub watch: WatchConfig,
}

impl RelayConfig {
    /// Load configuration from CLI arguments.
    ///
    /// Searches upward from cwd for the config file. Without one, defaults
    /// apply and the cwd is the project root.
    pub fn load(cli: &Cli) -> Result<Self> {
        let cwd = std::env::current_dir().context("Failed to get current working directory")?;

        let mut config = match find_config_file(&cli.config) {
            Some(path) => {
                let mut config = Self::from_path(&path)?;
                config.config_path = path;
                config
            }
            None => {
                crate::debug!("config"; "no {} found, using defaults", cli.config.display());
                Self {
                    config_path: cwd.join(&cli.config),
                    ..Self::default()
                }
            }
        };

        let root = config
            .config_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| cwd.clone());
        config.set_root(&root);
        config.normalize_paths();
        config.apply_command_options(cli, &cwd);

        let mut diag = config.validate();
        if cli.is_serve() {
            config.validate_serve(&mut diag);
        }
        diag.print_hints();
        diag.into_result().map_err(ConfigError::Diagnostics)?;

        Ok(config)
    }

    /// Parse configuration from TOML string
    pub fn from_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        Ok(config)
    }

    /// Load configuration from file path with unknown field detection.
    fn from_path(path: &Path) -> Result<Self> {
        let content =
            fs::read_to_string(path).map_err(|err| ConfigError::Io(path.to_path_buf(), err))?;

        let (config, ignored) = Self::parse_with_ignored(&content)?;
        if !ignored.is_empty() {
            Self::print_unknown_fields_warning(&ignored, path);
        }

        Ok(config)
    }

    /// Parse TOML content, collecting any unknown fields.
    fn parse_with_ignored(content: &str) -> Result<(Self, Vec<String>), ConfigError> {
        let mut ignored = Vec::new();
        let deserializer = toml::Deserializer::new(content);
        let config = serde_ignored::deserialize(deserializer, |path: serde_ignored::Path| {
            ignored.push(path.to_string());
        })?;
        Ok((config, ignored))
    }

    /// Print warning about unknown fields.
    fn print_unknown_fields_warning(fields: &[String], path: &Path) {
        let display_path = path
            .file_name()
            .map(|n| n.to_string_lossy())
            .unwrap_or_else(|| path.to_string_lossy());
        log!("warning"; "unknown fields in {}, ignoring:", display_path);
        for field in fields {
            eprintln!("- {}", field);
        }
    }

    /// Get the root directory path
    pub fn get_root(&self) -> &Path {
        &self.root
    }

    /// Set the root directory path
    pub fn set_root(&mut self, path: &Path) {
        self.root = path.to_path_buf();
    }

    // ========================================================================
    // cli configuration updates
    // ========================================================================

    /// Apply command-specific configuration options.
    fn apply_command_options(&mut self, cli: &Cli, cwd: &Path) {
        match &cli.command {
            Commands::Serve { args } => self.apply_serve_args(args, cwd),
        }
    }

    /// Apply serve arguments. CLI paths are relative to the cwd, not the
    /// project root.
    fn apply_serve_args(&mut self, args: &ServeArgs, cwd: &Path) {
        crate::logger::set_verbose(args.verbose);

        Self::update_option(&mut self.serve.interface, args.interface.as_ref());
        Self::update_option(&mut self.serve.port, args.port.as_ref());
        Self::update_option(&mut self.hmr.path, args.path.as_ref());
        Self::update_option(&mut self.hmr.heartbeat, args.heartbeat.as_ref());

        if let Some(stats) = &args.stats {
            self.watch.stats = Some(cwd.join(stats));
        }
        if args.quiet {
            self.hmr.log = false;
        }
    }

    /// Update config option if CLI value is provided.
    fn update_option<T: Clone>(config_option: &mut T, cli_option: Option<&T>) {
        if let Some(option) = cli_option {
            *config_option = option.clone();
        }
    }

    /// Resolve file paths against the project root.
    fn normalize_paths(&mut self) {
        if let Some(stats) = self.watch.stats.take() {
            self.watch.stats = Some(self.root.join(stats));
        }
    }

    // ========================================================================
    // validation
    // ========================================================================

    /// Validate the configuration, collecting every problem.
    pub fn validate(&self) -> ConfigDiagnostics {
        let mut diag = ConfigDiagnostics::new();
        self.hmr.validate(&mut diag);
        self.watch.validate(&mut diag);
        diag
    }

    /// `serve` needs something to watch.
    fn validate_serve(&self, diag: &mut ConfigDiagnostics) {
        match &self.watch.stats {
            None => diag.error_with_hint(
                FieldPath::new("watch.stats"),
                "no compiler stats file to watch",
                "set `stats` under [watch] or pass --stats",
            ),
            Some(path) if !path.exists() => diag.hint(
                FieldPath::new("watch.stats"),
                format!("{} does not exist yet, waiting for the first build", path.display()),
            ),
            Some(_) => {}
        }
    }
}

// ============================================================================
// Test Helpers (available to all modules via `use crate::config::test_*`)
// ============================================================================

/// Parse a config snippet.
/// Panics if there are unknown fields (to catch config typos in tests).
#[cfg(test)]
pub fn test_parse_config(content: &str) -> RelayConfig {
    let (parsed, ignored) = RelayConfig::parse_with_ignored(content).unwrap();
    assert!(
        ignored.is_empty(),
        "test config has unknown fields: {:?}",
        ignored
    );
    parsed
}

// ============================================================================
// tests
// ============================================================================
