//! Build Event Publisher
//!
//! Turns compiler lifecycle events into broadcast payloads and keeps the
//! latest build around so late subscribers can catch up.

use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;

use super::channel::{BroadcastChannel, ConnectionId};
use super::payload::{BroadcastPayload, BundleSnapshot, json_frame};
use super::stats::{BuildResult, collect_bundles};
use super::transport::PushTransport;

/// Injectable log sink.
pub type LogFn = Arc<dyn Fn(&str) + Send + Sync>;

/// Sink forwarding to the crate logger under the `hmr` prefix.
pub fn default_log() -> LogFn {
    Arc::new(|line: &str| crate::log!("hmr"; "{}", line))
}

/// Lock order: `latest` before the channel registry.
pub struct BuildPublisher {
    channel: BroadcastChannel,
    /// Snapshot of the most recent successful build, `None` while building
    latest: Mutex<Option<Vec<BundleSnapshot>>>,
    log: Option<LogFn>,
}

impl BuildPublisher {
    pub fn new(channel: BroadcastChannel, log: Option<LogFn>) -> Self {
        Self {
            channel,
            latest: Mutex::new(None),
            log,
        }
    }

    /// Compiler `invalid` hook.
    pub fn on_invalidated(&self) {
        if self.channel.is_closed() {
            return;
        }

        let mut latest = self.latest.lock();
        *latest = None;
        self.emit("webpack building...");
        self.channel.publish(&BroadcastPayload::Building);
    }

    /// Compiler `done` hook.
    pub fn on_done(&self, result: &BuildResult) {
        if self.channel.is_closed() {
            return;
        }

        let bundles = collect_bundles(result);
        let mut latest = self.latest.lock();
        for bundle in &bundles {
            self.emit(&format!(
                "webpack built {}{} in {}ms",
                bundle.label(),
                bundle.hash.as_deref().unwrap_or_default(),
                bundle.time.unwrap_or_default(),
            ));
            self.channel.publish(&BroadcastPayload::Built(bundle.clone()));
        }
        *latest = Some(bundles);
    }

    /// Open a push stream and replay the latest build to it as `sync`.
    ///
    /// Nothing is logged for the replay.
    pub fn subscribe<T: PushTransport>(&self, transport: T) -> Option<ConnectionId> {
        let stream = self.channel.open(transport)?;

        let latest = self.latest.lock();
        let greeting: Vec<String> = latest
            .iter()
            .flatten()
            .filter_map(|bundle| json_frame(&BroadcastPayload::Sync(bundle.clone())).ok())
            .collect();
        self.channel.register(stream, &greeting)
    }

    /// Host passthrough.
    pub fn publish<T: Serialize + ?Sized>(&self, payload: &T) {
        self.channel.publish(payload);
    }

    pub fn close(&self) {
        self.channel.close();
    }

    pub fn is_closed(&self) -> bool {
        self.channel.is_closed()
    }

    /// Clone of the retained snapshot list.
    pub fn latest(&self) -> Option<Vec<BundleSnapshot>> {
        self.latest.lock().clone()
    }

    pub fn channel(&self) -> &BroadcastChannel {
        &self.channel
    }

    fn emit(&self, line: &str) {
        if let Some(log) = &self.log {
            log(line);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;

    use super::*;
    use crate::relay::channel::tests::MemoryStream;

    fn recording() -> (LogFn, Arc<Mutex<Vec<String>>>) {
        let lines = Arc::new(Mutex::new(Vec::new()));
        let sink = lines.clone();
        let log: LogFn = Arc::new(move |line: &str| sink.lock().push(line.to_string()));
        (log, lines)
    }

    fn publisher(log: Option<LogFn>) -> BuildPublisher {
        BuildPublisher::new(BroadcastChannel::new(Duration::from_secs(3600)), log)
    }

    fn build(hash: &str) -> BuildResult {
        BuildResult::from_json(json!({
            "name": "main",
            "hash": hash,
            "time": 7,
            "modules": [{ "id": 0, "name": "./index.js" }]
        }))
    }

    #[test]
    fn test_building_then_built() {
        let (log, lines) = recording();
        let publisher = publisher(Some(log));
        let stream = MemoryStream::http11();
        publisher.subscribe(stream.clone());

        publisher.on_invalidated();
        publisher.on_done(&build("h1"));

        let frames = stream.wait_frames(2);
        assert_eq!(frames[0], r#"{"action":"building"}"#);
        let built: serde_json::Value = serde_json::from_str(&frames[1]).unwrap();
        assert_eq!(built["action"], "built");
        assert_eq!(built["hash"], "h1");
        assert_eq!(built["modules"]["0"], "./index.js");

        assert_eq!(
            *lines.lock(),
            vec!["webpack building...".to_string(), "webpack built main h1 in 7ms".to_string()]
        );
    }

    #[test]
    fn test_late_subscriber_gets_sync_without_logging() {
        let (log, lines) = recording();
        let publisher = publisher(Some(log));
        publisher.on_done(&build("h2"));
        let logged = lines.lock().len();

        let stream = MemoryStream::http11();
        publisher.subscribe(stream.clone());

        let frames = stream.wait_frames(1);
        assert_eq!(frames.len(), 1);
        let sync: serde_json::Value = serde_json::from_str(&frames[0]).unwrap();
        assert_eq!(sync["action"], "sync");
        assert_eq!(sync["hash"], "h2");
        assert_eq!(lines.lock().len(), logged);
    }

    #[test]
    fn test_sync_matches_last_built() {
        let publisher = publisher(None);
        let early = MemoryStream::http11();
        publisher.subscribe(early.clone());
        publisher.on_done(&build("h3"));

        let late = MemoryStream::http11();
        publisher.subscribe(late.clone());

        let mut built: serde_json::Value = serde_json::from_str(&early.wait_frames(1)[0]).unwrap();
        let mut sync: serde_json::Value = serde_json::from_str(&late.wait_frames(1)[0]).unwrap();
        built.as_object_mut().unwrap().remove("action");
        sync.as_object_mut().unwrap().remove("action");
        assert_eq!(built, sync);
    }

    #[test]
    fn test_invalidation_clears_snapshot() {
        let publisher = publisher(None);
        publisher.on_done(&build("h4"));
        assert!(publisher.latest().is_some());

        publisher.on_invalidated();
        assert!(publisher.latest().is_none());

        let stream = MemoryStream::http11();
        publisher.subscribe(stream.clone());
        stream.wait_open();
        assert!(stream.frames().is_empty());
    }

    #[test]
    fn test_closed_publisher_ignores_hooks() {
        let (log, lines) = recording();
        let publisher = publisher(Some(log));
        publisher.close();

        publisher.on_invalidated();
        publisher.on_done(&build("h5"));
        assert!(lines.lock().is_empty());
        assert!(publisher.latest().is_none());
    }

    #[test]
    fn test_multi_compiler_publishes_each_bundle() {
        let publisher = publisher(None);
        let stream = MemoryStream::http11();
        publisher.subscribe(stream.clone());

        publisher.on_done(&BuildResult::from_json(json!([
            { "name": "client", "hash": "c", "modules": [] },
            { "name": "server", "hash": "s", "modules": [] }
        ])));

        let names: Vec<String> = stream
            .wait_frames(2)
            .iter()
            .map(|frame| serde_json::from_str::<serde_json::Value>(frame).unwrap()["name"].to_string())
            .collect();
        assert_eq!(names, vec!["\"client\"", "\"server\""]);
        assert_eq!(publisher.latest().unwrap().len(), 2);
    }
}
