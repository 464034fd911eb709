//! Push-stream payloads and event-stream framing.
//!
//! Every frame on the wire is `data: <payload>\n\n`. Build payloads are
//! JSON objects tagged by `action`; the heartbeat is a bare emoji so it can
//! never be mistaken for a build payload.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Module identifier → module display name.
pub type ModuleMap = BTreeMap<String, String>;

/// Heartbeat payload (not JSON).
pub const HEARTBEAT: &str = "\u{1F493}";

/// Normalized description of one bundle of a finished build.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundleSnapshot {
    /// Bundle name, empty for unnamed single-bundle builds
    #[serde(default)]
    pub name: String,
    /// Build duration in milliseconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<u64>,
    /// Compilation hash
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
    #[serde(default)]
    pub warnings: Vec<String>,
    #[serde(default)]
    pub errors: Vec<String>,
    #[serde(default)]
    pub modules: ModuleMap,
}

impl BundleSnapshot {
    /// `"<name> "` or nothing, for log lines.
    pub fn label(&self) -> String {
        if self.name.is_empty() {
            String::new()
        } else {
            format!("{} ", self.name)
        }
    }
}

/// Payload broadcast to every subscribed client.
///
/// `Built` and `Sync` carry the same shape: `Built` means "this just
/// happened", `Sync` means "you just joined, here is the current state".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum BroadcastPayload {
    Building,
    Built(BundleSnapshot),
    Sync(BundleSnapshot),
}

impl BroadcastPayload {
    /// Snapshot carried by `Built`/`Sync`.
    pub fn snapshot(&self) -> Option<&BundleSnapshot> {
        match self {
            Self::Building => None,
            Self::Built(snapshot) | Self::Sync(snapshot) => Some(snapshot),
        }
    }
}

/// Wrap a serialized payload into one event-stream frame.
pub fn data_frame(payload: &str) -> String {
    format!("data: {payload}\n\n")
}

/// Serialize `payload` as JSON and frame it.
pub fn json_frame<T: Serialize + ?Sized>(payload: &T) -> serde_json::Result<String> {
    serde_json::to_string(payload).map(|json| data_frame(&json))
}

/// The heartbeat frame.
pub fn heartbeat_frame() -> String {
    data_frame(HEARTBEAT)
}
