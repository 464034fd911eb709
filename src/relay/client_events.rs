//! Ancillary event receiver.
//!
//! Clients POST `{"event":"ReloadNeeded"}` when they gave up on a hot update.
//! The only recognized event; anything else is a bad request.

use std::sync::Arc;

use tiny_http::Request;

use super::transport::respond;

/// Callback fired after a `ReloadNeeded` event was acknowledged.
pub type ReloadCallback = Arc<dyn Fn() + Send + Sync>;

const RELOAD_NEEDED: &str = "ReloadNeeded";
const INVALID_JSON: &str = "Bad request: body is not a valid json";
const INVALID_EVENT: &str = "Bad request: invalid event data";

/// Status and optional JSON body of a handled event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventResponse {
    pub status: u16,
    pub body: Option<String>,
}

impl EventResponse {
    fn ok() -> Self {
        Self {
            status: 200,
            body: None,
        }
    }

    fn bad_request(message: &str) -> Self {
        Self {
            status: 400,
            body: Some(serde_json::json!({ "error": message }).to_string()),
        }
    }

    /// Response headers: CORS always, content type only for error bodies.
    pub fn headers(&self) -> Vec<(&'static str, &'static str)> {
        let mut headers = vec![("Access-Control-Allow-Origin", "*")];
        if self.body.is_some() {
            headers.push(("Content-Type", "application/json"));
        }
        headers
    }
}

#[derive(Clone, Default)]
pub struct ClientEventsHandler {
    on_reload_needed: Option<ReloadCallback>,
}

impl ClientEventsHandler {
    pub fn new(on_reload_needed: Option<ReloadCallback>) -> Self {
        Self { on_reload_needed }
    }

    /// Classify a complete request body, hand the response to `send`, then
    /// fire the callback for an accepted event.
    pub fn handle(&self, body: &[u8], send: impl FnOnce(&EventResponse)) -> EventResponse {
        let response = classify(body);
        send(&response);
        if response.status == 200
            && let Some(callback) = &self.on_reload_needed
        {
            callback();
        }
        response
    }

    /// Read the full body of `request` and answer it.
    pub fn respond(&self, mut request: Request) -> EventResponse {
        let mut body = Vec::new();
        if let Err(e) = request.as_reader().read_to_end(&mut body) {
            crate::debug!("hmr"; "failed to read client event: {}", e);
        }

        self.handle(&body, move |response| {
            let sent = respond(
                request,
                response.status,
                &response.headers(),
                response.body.clone(),
            );
            if let Err(e) = sent {
                crate::debug!("hmr"; "failed to answer client event: {}", e);
            }
        })
    }
}

fn classify(body: &[u8]) -> EventResponse {
    let Ok(data) = serde_json::from_slice::<serde_json::Value>(body) else {
        return EventResponse::bad_request(INVALID_JSON);
    };

    match data.get("event").and_then(serde_json::Value::as_str) {
        Some(RELOAD_NEEDED) => EventResponse::ok(),
        _ => EventResponse::bad_request(INVALID_EVENT),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use tiny_http::{Method, TestRequest};

    use super::*;

    fn counting() -> (ClientEventsHandler, Arc<AtomicUsize>) {
        let count = Arc::new(AtomicUsize::new(0));
        let counter = count.clone();
        let handler = ClientEventsHandler::new(Some(Arc::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        })));
        (handler, count)
    }

    #[test]
    fn test_reload_needed_accepted() {
        let (handler, count) = counting();
        let response = handler.handle(br#"{"event":"ReloadNeeded"}"#, |_| {});
        assert_eq!(response, EventResponse { status: 200, body: None });
        assert_eq!(response.headers(), vec![("Access-Control-Allow-Origin", "*")]);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_other_event_rejected() {
        let (handler, count) = counting();
        let response = handler.handle(br#"{"event":"Other"}"#, |_| {});
        assert_eq!(response.status, 400);
        assert_eq!(
            response.body.as_deref(),
            Some(r#"{"error":"Bad request: invalid event data"}"#)
        );
        assert!(response.headers().contains(&("Content-Type", "application/json")));
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_invalid_json_rejected() {
        let (handler, count) = counting();
        let response = handler.handle(b"not json", |_| {});
        assert_eq!(response.status, 400);
        assert_eq!(
            response.body.as_deref(),
            Some(r#"{"error":"Bad request: body is not a valid json"}"#)
        );
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_valid_json_without_event() {
        let handler = ClientEventsHandler::default();
        for body in [&b"[]"[..], b"42", b"{}", br#"{"event":1}"#] {
            let response = handler.handle(body, |_| {});
            assert_eq!(response.status, 400);
            assert!(response.body.unwrap().contains("invalid event data"));
        }
    }

    #[test]
    fn test_no_callback_configured() {
        let response = ClientEventsHandler::default().handle(br#"{"event":"ReloadNeeded"}"#, |_| {});
        assert_eq!(response.status, 200);
    }

    #[test]
    fn test_callback_fires_after_response_is_sent() {
        let order = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let events = order.clone();
        let handler = ClientEventsHandler::new(Some(Arc::new(move || events.lock().push("callback"))));

        handler.handle(br#"{"event":"ReloadNeeded"}"#, |response| {
            assert_eq!(response.status, 200);
            order.lock().push("sent");
        });
        assert_eq!(*order.lock(), vec!["sent", "callback"]);
    }

    #[test]
    fn test_respond_reads_request_body() {
        let (handler, count) = counting();

        let accepted = TestRequest::new()
            .with_method(Method::Post)
            .with_path("/__webpack_hmr_client_events")
            .with_body(r#"{"event":"ReloadNeeded"}"#);
        assert_eq!(handler.respond(accepted.into()).status, 200);
        assert_eq!(count.load(Ordering::SeqCst), 1);

        let garbage = TestRequest::new()
            .with_method(Method::Post)
            .with_path("/__webpack_hmr_client_events")
            .with_body("not json");
        let response = handler.respond(garbage.into());
        assert_eq!(response.status, 400);
        assert!(response.body.unwrap().contains("not a valid json"));
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}
