//! hotrelay - push bundler build status to the browser.

use anyhow::Result;
use clap::{ColorChoice, Parser};
use hotrelay::cli::{self, Cli, Commands};
use hotrelay::config::{RelayConfig, init_config};
use hotrelay::core;

fn main() -> Result<()> {
    // Setup global Ctrl+C handler (before any blocking operations)
    core::setup_shutdown_handler()?;

    let cli = Cli::parse();

    // Set global color override based on CLI option
    match cli.color {
        ColorChoice::Always => owo_colors::set_override(true),
        ColorChoice::Never => owo_colors::set_override(false),
        ColorChoice::Auto => {} // owo-colors auto-detects TTY
    }

    init_config(RelayConfig::load(&cli)?);

    match &cli.command {
        Commands::Serve { .. } => cli::serve::bind_server()?.run(),
    }
}
