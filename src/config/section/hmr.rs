//! `[hmr]` section configuration.
//!
//! # Example
//!
//! ```toml
//! [hmr]
//! path = "/__webpack_hmr"                              # Event stream endpoint
//! client_events_path = "/__webpack_hmr_client_events"  # Client event POST endpoint
//! heartbeat = 10000                                    # Heartbeat interval (ms)
//! log = true                                           # Log build events
//! on_reload_needed = ["notify-send", "reload needed"]  # Run when a client gives up
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::{ConfigDiagnostics, FieldPath};
use crate::relay::middleware::{DEFAULT_CLIENT_EVENTS_PATH, DEFAULT_PATH};

/// Relay settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HmrConfig {
    /// Event stream endpoint.
    pub path: String,

    /// Endpoint receiving client events.
    pub client_events_path: String,

    /// Heartbeat interval in milliseconds.
    pub heartbeat: u64,

    /// Log build events.
    pub log: bool,

    /// Command (program and arguments) run when a client reports it needs a
    /// full reload. Empty disables it.
    pub on_reload_needed: Vec<String>,
}

impl Default for HmrConfig {
    fn default() -> Self {
        Self {
            path: DEFAULT_PATH.to_string(),
            client_events_path: DEFAULT_CLIENT_EVENTS_PATH.to_string(),
            heartbeat: 10_000,
            log: true,
            on_reload_needed: Vec::new(),
        }
    }
}

impl HmrConfig {
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat)
    }

    pub fn validate(&self, diag: &mut ConfigDiagnostics) {
        const PATH: FieldPath = FieldPath::new("hmr.path");
        const EVENTS: FieldPath = FieldPath::new("hmr.client_events_path");

        for (field, value) in [(PATH, &self.path), (EVENTS, &self.client_events_path)] {
            if !value.starts_with('/') {
                diag.error_with_hint(
                    field,
                    format!("`{value}` is not an absolute URL path"),
                    format!("use `/{}`", value.trim_start_matches('/')),
                );
            }
        }

        if self.path == self.client_events_path {
            diag.error(EVENTS, "must differ from `hmr.path`");
        }

        if self.heartbeat == 0 {
            diag.error(FieldPath::new("hmr.heartbeat"), "must be greater than 0");
        }

        if let Some(program) = self.on_reload_needed.first()
            && program.trim().is_empty()
        {
            diag.error(FieldPath::new("hmr.on_reload_needed"), "program name is empty");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::test_parse_config;

    #[test]
    fn test_hmr_config() {
        let config = test_parse_config(
            "[hmr]\npath = \"/hmr\"\nclient_events_path = \"/hmr-events\"\nheartbeat = 2500\nlog = false\non_reload_needed = [\"echo\", \"hi\"]",
        );

        assert_eq!(config.hmr.path, "/hmr");
        assert_eq!(config.hmr.client_events_path, "/hmr-events");
        assert_eq!(config.hmr.heartbeat_interval(), Duration::from_millis(2500));
        assert!(!config.hmr.log);
        assert_eq!(config.hmr.on_reload_needed, vec!["echo", "hi"]);
    }

    #[test]
    fn test_defaults_are_valid() {
        let mut diag = ConfigDiagnostics::new();
        HmrConfig::default().validate(&mut diag);
        assert!(diag.is_empty());
    }

    #[test]
    fn test_invalid_values() {
        let config = test_parse_config(
            "[hmr]\npath = \"hmr\"\nclient_events_path = \"hmr\"\nheartbeat = 0\non_reload_needed = [\"\"]",
        );
        let mut diag = ConfigDiagnostics::new();
        config.hmr.validate(&mut diag);

        let fields: Vec<_> = diag.errors().iter().map(|e| e.field.as_str()).collect();
        assert_eq!(
            fields,
            vec![
                "hmr.path",
                "hmr.client_events_path",
                "hmr.client_events_path",
                "hmr.heartbeat",
                "hmr.on_reload_needed",
            ]
        );
        assert_eq!(diag.errors()[0].hint.as_deref(), Some("use `/hmr`"));
    }
}
