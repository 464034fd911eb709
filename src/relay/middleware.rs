//! Hot middleware: routes the push and client-event endpoints and wires the
//! compiler lifecycle into the publisher.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tiny_http::{Method, Request};
use url::Url;

use super::channel::{BroadcastChannel, ConnectionId, DEFAULT_HEARTBEAT};
use super::client_events::{ClientEventsHandler, ReloadCallback};
use super::publisher::{BuildPublisher, LogFn, default_log};
use super::stats::BuildResult;
use super::transport::PushTransport;

pub const DEFAULT_PATH: &str = "/__webpack_hmr";
pub const DEFAULT_CLIENT_EVENTS_PATH: &str = "/__webpack_hmr_client_events";

/// Hook for the compiler's `invalid` event
pub type InvalidHook = Box<dyn Fn() + Send + Sync>;
/// Hook for the compiler's `done` event
pub type DoneHook = Box<dyn Fn(&BuildResult) + Send + Sync>;

/// Lifecycle taps offered by a compiler.
///
/// Taps are append-only: once registered they cannot be removed, so the
/// middleware turns them into no-ops on close instead.
pub trait CompilerHooks {
    fn on_invalid(&mut self, hook: InvalidHook);
    fn on_done(&mut self, hook: DoneHook);
}

#[derive(Clone)]
pub struct RelayOptions {
    /// Push endpoint
    pub path: String,
    /// Ancillary POST endpoint
    pub client_events_path: String,
    pub heartbeat: Duration,
    /// `None` silences build logging
    pub log: Option<LogFn>,
    pub on_reload_needed: Option<ReloadCallback>,
}

impl Default for RelayOptions {
    fn default() -> Self {
        Self {
            path: DEFAULT_PATH.to_string(),
            client_events_path: DEFAULT_CLIENT_EVENTS_PATH.to_string(),
            heartbeat: DEFAULT_HEARTBEAT,
            log: Some(default_log()),
            on_reload_needed: None,
        }
    }
}

/// Where a request goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Subscribe,
    ClientEvent,
    /// Not ours, hand it back to the host
    Pass,
}

pub struct HotMiddleware {
    publisher: Arc<BuildPublisher>,
    client_events: ClientEventsHandler,
    path: String,
    client_events_path: String,
}

impl HotMiddleware {
    /// Create the relay and tap `compiler`'s lifecycle.
    pub fn new<C: CompilerHooks + ?Sized>(compiler: &mut C, options: RelayOptions) -> Self {
        let channel = BroadcastChannel::new(options.heartbeat);
        let publisher = Arc::new(BuildPublisher::new(channel, options.log));

        let invalid = Arc::clone(&publisher);
        compiler.on_invalid(Box::new(move || invalid.on_invalidated()));
        let done = Arc::clone(&publisher);
        compiler.on_done(Box::new(move |result| done.on_done(result)));

        Self {
            publisher,
            client_events: ClientEventsHandler::new(options.on_reload_needed),
            path: options.path,
            client_events_path: options.client_events_path,
        }
    }

    /// Classify a request by URL path (query ignored) and method.
    pub fn route(&self, url: &str, method: &Method) -> Route {
        if self.publisher.is_closed() {
            return Route::Pass;
        }
        let Some(path) = pathname(url) else {
            return Route::Pass;
        };

        if path == self.path {
            Route::Subscribe
        } else if path == self.client_events_path && *method == Method::Post {
            Route::ClientEvent
        } else {
            Route::Pass
        }
    }

    /// Serve `request` if it targets one of the relay endpoints.
    ///
    /// Returns the request untouched when it is not ours (or the relay is
    /// closed) so the host can continue with it.
    pub fn handle(&self, request: Request) -> Option<Request> {
        match self.route(request.url(), request.method()) {
            Route::Subscribe => {
                self.subscribe(request);
                None
            }
            Route::ClientEvent => {
                let response = self.client_events.respond(request);
                crate::debug!("hmr"; "client event answered with {}", response.status);
                None
            }
            Route::Pass => Some(request),
        }
    }

    /// Open a push stream on `transport`, replaying the latest build.
    pub fn subscribe<T: PushTransport>(&self, transport: T) -> Option<ConnectionId> {
        self.publisher.subscribe(transport)
    }

    /// Broadcast a host payload. No-op once closed.
    pub fn publish<T: Serialize + ?Sized>(&self, payload: &T) {
        self.publisher.publish(payload);
    }

    /// Stop the relay. Idempotent; compiler taps become no-ops.
    pub fn close(&self) {
        self.publisher.close();
    }

    pub fn is_closed(&self) -> bool {
        self.publisher.is_closed()
    }

    pub fn connection_count(&self) -> usize {
        self.publisher.channel().connection_count()
    }

    pub fn client_events(&self) -> &ClientEventsHandler {
        &self.client_events
    }
}

/// Path component of a request target, relative or absolute.
fn pathname(url: &str) -> Option<String> {
    let base = Url::parse("http://localhost/").ok()?;
    base.join(url).ok().map(|url| url.path().to_string())
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use serde_json::json;
    use tiny_http::TestRequest;

    use super::*;
    use crate::relay::channel::tests::MemoryStream;

    /// Compiler double that keeps its taps so tests can fire them.
    #[derive(Default)]
    struct FakeCompiler {
        invalid: Vec<InvalidHook>,
        done: Vec<DoneHook>,
    }

    impl FakeCompiler {
        fn invalidate(&self) {
            self.invalid.iter().for_each(|hook| hook());
        }

        fn finish(&self, stats: serde_json::Value) {
            let result = BuildResult::from_json(stats);
            self.done.iter().for_each(|hook| hook(&result));
        }
    }

    impl CompilerHooks for FakeCompiler {
        fn on_invalid(&mut self, hook: InvalidHook) {
            self.invalid.push(hook);
        }

        fn on_done(&mut self, hook: DoneHook) {
            self.done.push(hook);
        }
    }

    fn quiet_options() -> RelayOptions {
        RelayOptions {
            heartbeat: Duration::from_secs(3600),
            log: None,
            ..RelayOptions::default()
        }
    }

    #[test]
    fn test_taps_both_hooks() {
        let mut compiler = FakeCompiler::default();
        let _middleware = HotMiddleware::new(&mut compiler, quiet_options());
        assert_eq!(compiler.invalid.len(), 1);
        assert_eq!(compiler.done.len(), 1);
    }

    #[test]
    fn test_route_matching() {
        let mut compiler = FakeCompiler::default();
        let middleware = HotMiddleware::new(&mut compiler, quiet_options());

        assert_eq!(middleware.route("/__webpack_hmr", &Method::Get), Route::Subscribe);
        assert_eq!(middleware.route("/__webpack_hmr?x=1", &Method::Get), Route::Subscribe);
        assert_eq!(middleware.route("/__webpack_hmr", &Method::Post), Route::Subscribe);
        assert_eq!(
            middleware.route("/__webpack_hmr_client_events", &Method::Post),
            Route::ClientEvent
        );
        assert_eq!(middleware.route("/__webpack_hmr_client_events", &Method::Get), Route::Pass);
        assert_eq!(middleware.route("/__webpack_hmr/extra", &Method::Get), Route::Pass);
        assert_eq!(middleware.route("/index.html", &Method::Get), Route::Pass);
    }

    #[test]
    fn test_custom_paths() {
        let mut compiler = FakeCompiler::default();
        let options = RelayOptions {
            path: "/hmr".into(),
            client_events_path: "/hmr/events".into(),
            ..quiet_options()
        };
        let middleware = HotMiddleware::new(&mut compiler, options);
        assert_eq!(middleware.route("/hmr", &Method::Get), Route::Subscribe);
        assert_eq!(middleware.route("/hmr/events", &Method::Post), Route::ClientEvent);
        assert_eq!(middleware.route("/__webpack_hmr", &Method::Get), Route::Pass);
    }

    #[test]
    fn test_compiler_events_reach_subscribers() {
        let mut compiler = FakeCompiler::default();
        let middleware = HotMiddleware::new(&mut compiler, quiet_options());
        let stream = MemoryStream::http11();
        middleware.subscribe(stream.clone()).unwrap();

        compiler.invalidate();
        compiler.finish(json!({ "hash": "abc", "time": 3, "modules": [] }));
        middleware.publish(&json!({ "action": "custom" }));

        let frames = stream.wait_frames(3);
        assert_eq!(frames.len(), 3);
        assert_eq!(frames[0], r#"{"action":"building"}"#);
        assert!(frames[1].contains(r#""action":"built""#));
        assert_eq!(frames[2], r#"{"action":"custom"}"#);
    }

    #[test]
    fn test_close_passes_everything_through() {
        let mut compiler = FakeCompiler::default();
        let middleware = HotMiddleware::new(&mut compiler, quiet_options());
        let stream = MemoryStream::http11();
        middleware.subscribe(stream.clone());

        middleware.close();
        middleware.close();
        stream.wait_ended();
        assert_eq!(middleware.connection_count(), 0);
        assert_eq!(middleware.route("/__webpack_hmr", &Method::Get), Route::Pass);

        // Taps stay registered but do nothing
        compiler.invalidate();
        middleware.publish(&json!({ "action": "custom" }));
        assert_eq!(stream.text(), "\n");
    }

    fn counting_options() -> (RelayOptions, Arc<AtomicUsize>) {
        let count = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&count);
        let options = RelayOptions {
            on_reload_needed: Some(Arc::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            })),
            ..quiet_options()
        };
        (options, count)
    }

    #[test]
    fn test_handle_client_events() {
        let mut compiler = FakeCompiler::default();
        let (options, reloads) = counting_options();
        let middleware = HotMiddleware::new(&mut compiler, options);

        let accepted = TestRequest::new()
            .with_method(Method::Post)
            .with_path("/__webpack_hmr_client_events")
            .with_body(r#"{"event":"ReloadNeeded"}"#);
        assert!(middleware.handle(accepted.into()).is_none());
        assert_eq!(reloads.load(Ordering::SeqCst), 1);

        let garbage = TestRequest::new()
            .with_method(Method::Post)
            .with_path("/__webpack_hmr_client_events")
            .with_body("not json");
        assert!(middleware.handle(garbage.into()).is_none());
        assert_eq!(reloads.load(Ordering::SeqCst), 1);

        let get = TestRequest::new()
            .with_method(Method::Get)
            .with_path("/__webpack_hmr_client_events");
        let passed = middleware.handle(get.into()).unwrap();
        assert_eq!(passed.url(), "/__webpack_hmr_client_events");
        assert_eq!(reloads.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_handle_subscribes_and_passes_the_rest() {
        let mut compiler = FakeCompiler::default();
        let middleware = HotMiddleware::new(&mut compiler, quiet_options());

        let stream = TestRequest::new()
            .with_method(Method::Get)
            .with_path("/__webpack_hmr?reconnect=1");
        assert!(middleware.handle(stream.into()).is_none());
        assert_eq!(middleware.connection_count(), 1);

        let page = TestRequest::new().with_method(Method::Get).with_path("/index.html");
        assert!(middleware.handle(page.into()).is_some());

        middleware.close();
        let late = TestRequest::new().with_method(Method::Get).with_path("/__webpack_hmr");
        assert!(middleware.handle(late.into()).is_some());
        assert_eq!(middleware.connection_count(), 0);
    }

    #[test]
    fn test_pathname() {
        assert_eq!(pathname("/a/b?c=d#e").as_deref(), Some("/a/b"));
        assert_eq!(pathname("http://example.com/x").as_deref(), Some("/x"));
    }
}
