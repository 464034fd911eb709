//! HTTP response handlers for requests the relay does not own.

use anyhow::Result;
use tiny_http::{Header, Request, Response, StatusCode};

/// Respond with 404 Not Found.
pub fn respond_not_found(request: Request) -> Result<()> {
    send_text(request, 404, "Not Found")
}

/// Respond with 503 Service Unavailable (shutting down).
pub fn respond_unavailable(request: Request) -> Result<()> {
    send_text(request, 503, "Service Unavailable")
}

fn send_text(request: Request, status: u16, body: &str) -> Result<()> {
    let mut response = Response::from_string(body).with_status_code(StatusCode(status));
    if let Ok(header) = Header::from_bytes("Content-Type", "text/plain; charset=utf-8") {
        response.add_header(header);
    }
    request.respond(response)?;
    Ok(())
}
