//! Push-stream transports.
//!
//! The broadcast channel only needs two things from a transport: its HTTP
//! version (to decide on keep-alive) and a way to send the response head and
//! then stream frames. `tiny_http::Request` implements both by taking over
//! the raw response writer.

use std::io::{self, Write};

use tiny_http::{Header, Request, Response, StatusCode};

/// Status line and headers of a push-stream response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseHead {
    pub status: u16,
    pub headers: Vec<(&'static str, &'static str)>,
}

impl ResponseHead {
    /// Event-stream head: no caching, no proxy buffering, readable cross-origin.
    ///
    /// HTTP/1.x connections are additionally marked keep-alive; HTTP/2 and
    /// later manage connection liveness themselves.
    pub fn event_stream(version: (u8, u8)) -> Self {
        let mut headers = vec![
            ("Access-Control-Allow-Origin", "*"),
            ("Content-Type", "text/event-stream;charset=utf-8"),
            ("Cache-Control", "no-cache, no-transform"),
            // nginx buffers proxied responses unless told otherwise
            ("X-Accel-Buffering", "no"),
        ];
        if version.0 < 2 {
            headers.push(("Connection", "keep-alive"));
        }
        Self {
            status: 200,
            headers,
        }
    }

    pub fn header(&self, name: &str) -> Option<&'static str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| *value)
    }
}

/// Open outbound stream of event-stream frames.
pub trait EventSink: Send {
    /// Write one complete frame and flush it.
    fn write_frame(&mut self, frame: &[u8]) -> io::Result<()>;
    /// End the stream. Errors are ignored: the peer may already be gone.
    fn end(&mut self);
    fn is_finished(&self) -> bool;
}

/// Inbound request that can be turned into a push stream.
pub trait PushTransport {
    /// `(major, minor)` HTTP version of the request.
    fn version(&self) -> (u8, u8);
    /// Send `head` and hand back the stream for frames.
    fn open(self, head: &ResponseHead) -> io::Result<Box<dyn EventSink>>;
}

// =============================================================================
// tiny_http
// =============================================================================

impl PushTransport for Request {
    fn version(&self) -> (u8, u8) {
        let version = self.http_version();
        (version.0, version.1)
    }

    fn open(self, head: &ResponseHead) -> io::Result<Box<dyn EventSink>> {
        let (major, minor) = PushTransport::version(&self);
        let chunked = (major, minor) >= (1, 1);

        let mut writer = self.into_writer();
        let reason = StatusCode(head.status).default_reason_phrase();
        write!(writer, "HTTP/{major}.{minor} {} {reason}\r\n", head.status)?;
        for (name, value) in &head.headers {
            write!(writer, "{name}: {value}\r\n")?;
        }
        if chunked {
            write!(writer, "Transfer-Encoding: chunked\r\n")?;
        }
        write!(writer, "\r\n")?;
        writer.flush()?;

        Ok(Box::new(HttpSink {
            writer,
            chunked,
            finished: false,
        }))
    }
}

/// Raw response writer of a tiny_http request.
///
/// HTTP/1.1 streams use chunked encoding so that ending the stream is
/// visible to the client without closing the socket; HTTP/1.0 streams end
/// when tiny_http drops the connection.
struct HttpSink {
    writer: Box<dyn Write + Send>,
    chunked: bool,
    finished: bool,
}

impl EventSink for HttpSink {
    fn write_frame(&mut self, frame: &[u8]) -> io::Result<()> {
        if self.finished {
            return Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "stream already ended",
            ));
        }
        if self.chunked {
            write!(self.writer, "{:x}\r\n", frame.len())?;
            self.writer.write_all(frame)?;
            self.writer.write_all(b"\r\n")?;
        } else {
            self.writer.write_all(frame)?;
        }
        self.writer.flush()
    }

    fn end(&mut self) {
        if self.finished {
            return;
        }
        self.finished = true;
        if self.chunked {
            let _ = self.writer.write_all(b"0\r\n\r\n");
        }
        let _ = self.writer.flush();
    }

    fn is_finished(&self) -> bool {
        self.finished
    }
}

/// Send a small non-streaming response.
pub fn respond(
    request: Request,
    status: u16,
    headers: &[(&str, &str)],
    body: Option<String>,
) -> io::Result<()> {
    let mut response = Response::from_string(body.unwrap_or_default())
        .with_status_code(StatusCode(status));
    for (name, value) in headers {
        if let Ok(header) = Header::from_bytes(name.as_bytes(), value.as_bytes()) {
            response.add_header(header);
        }
    }
    request.respond(response)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_stream_head_http1_keep_alive() {
        let head = ResponseHead::event_stream((1, 1));
        assert_eq!(head.status, 200);
        assert_eq!(head.header("connection"), Some("keep-alive"));
        assert_eq!(head.header("Access-Control-Allow-Origin"), Some("*"));
        assert_eq!(
            head.header("Content-Type"),
            Some("text/event-stream;charset=utf-8")
        );
        assert_eq!(head.header("Cache-Control"), Some("no-cache, no-transform"));
        assert_eq!(head.header("X-Accel-Buffering"), Some("no"));
    }

    #[test]
    fn test_event_stream_head_http2_no_keep_alive() {
        let head = ResponseHead::event_stream((2, 0));
        assert_eq!(head.header("Connection"), None);
        assert_eq!(head.header("X-Accel-Buffering"), Some("no"));
    }

    #[test]
    fn test_http_sink_chunked_framing() {
        use std::sync::Arc;

        use parking_lot::Mutex;

        #[derive(Clone, Default)]
        struct Shared(Arc<Mutex<Vec<u8>>>);
        impl Write for Shared {
            fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
                self.0.lock().extend_from_slice(buf);
                Ok(buf.len())
            }
            fn flush(&mut self) -> io::Result<()> {
                Ok(())
            }
        }

        let buffer = Shared::default();
        let mut sink = HttpSink {
            writer: Box::new(buffer.clone()),
            chunked: true,
            finished: false,
        };
        sink.write_frame(b"data: x\n\n").unwrap();
        sink.end();
        sink.end();
        assert!(sink.is_finished());
        assert!(sink.write_frame(b"late").is_err());

        let written = String::from_utf8(buffer.0.lock().clone()).unwrap();
        assert_eq!(written, "9\r\ndata: x\n\n\r\n0\r\n\r\n");
    }

    /// Serve one request on a loopback tiny_http server as a push stream,
    /// writing `frames` then ending it. Returns everything the client read.
    fn stream_over_loopback(request_line: &str, frames: &[&'static [u8]]) -> String {
        use std::io::Read;
        use std::net::TcpStream;
        use std::time::Duration;

        let server = tiny_http::Server::http("127.0.0.1:0").unwrap();
        let addr = server.server_addr().to_ip().unwrap();
        let frames = frames.to_vec();
        let handle = std::thread::spawn(move || {
            let request = server.recv().unwrap();
            let head = ResponseHead::event_stream(PushTransport::version(&request));
            let mut sink = request.open(&head).unwrap();
            for frame in frames {
                sink.write_frame(frame).unwrap();
            }
            sink.end();
        });

        let mut client = TcpStream::connect(addr).unwrap();
        client.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
        write!(client, "{request_line}\r\nHost: localhost\r\n\r\n").unwrap();
        handle.join().unwrap();

        let mut received = Vec::new();
        let mut buf = [0u8; 1024];
        loop {
            match client.read(&mut buf) {
                Ok(0) | Err(_) => break,
                Ok(n) => {
                    received.extend_from_slice(&buf[..n]);
                    if received.ends_with(b"0\r\n\r\n") {
                        break;
                    }
                }
            }
        }
        String::from_utf8(received).unwrap()
    }

    #[test]
    fn test_tiny_http_stream_http11_is_chunked() {
        let text = stream_over_loopback(
            "GET /__webpack_hmr HTTP/1.1",
            &[b"\n", b"data: {\"action\":\"building\"}\n\n"],
        );

        let (head, body) = text.split_once("\r\n\r\n").unwrap();
        assert!(head.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(head.contains("Content-Type: text/event-stream;charset=utf-8"));
        assert!(head.contains("Cache-Control: no-cache, no-transform"));
        assert!(head.contains("X-Accel-Buffering: no"));
        assert!(head.contains("Access-Control-Allow-Origin: *"));
        assert!(head.contains("Connection: keep-alive"));
        assert!(head.contains("Transfer-Encoding: chunked"));
        assert_eq!(
            body,
            "1\r\n\n\r\n1d\r\ndata: {\"action\":\"building\"}\n\n\r\n0\r\n\r\n"
        );
    }

    #[test]
    fn test_tiny_http_stream_http10_is_raw() {
        let text = stream_over_loopback("GET /__webpack_hmr HTTP/1.0", &[b"\n", b"data: x\n\n"]);

        let (head, body) = text.split_once("\r\n\r\n").unwrap();
        assert!(head.starts_with("HTTP/1.0 200 OK\r\n"));
        assert!(head.contains("Connection: keep-alive"));
        assert!(!head.contains("Transfer-Encoding"));
        assert_eq!(body, "\ndata: x\n\n");
    }

}
