//! The response-writer contract and the recorder that backs the wire response.
//!
//! Handlers never build a response value. They write into a
//! [`ResponseWriter`]: set headers, set a status, append body bytes, in any
//! order. What that writer does with the calls is the writer's business. The
//! [`ResponseRecorder`] turns them into an `http::Response`; a
//! [`ResponseCapture`](crate::ResponseCapture) holds them back until told to
//! release them.

use bytes::{Bytes, BytesMut};
use http::{HeaderMap, StatusCode};
use http_body_util::Full;
use tracing::warn;

// ── ResponseWriter ────────────────────────────────────────────────────────────

/// The writer a [`Handler`](crate::Handler) produces its response through.
///
/// ```rust
/// use holdfast::{Request, ResponseWriter};
/// use http::{StatusCode, header};
///
/// fn create_user(_req: Request, w: &mut dyn ResponseWriter) {
///     w.headers_mut().insert(header::LOCATION, "/users/99".parse().unwrap());
///     w.set_status(StatusCode::CREATED);
///     w.write(br#"{"id":"99"}"#);
/// }
/// ```
pub trait ResponseWriter {
    /// The response header map. Changes made here may reach the client
    /// before the status and body do; writers never buffer headers.
    fn headers_mut(&mut self) -> &mut HeaderMap;

    /// Records the response status.
    fn set_status(&mut self, status: StatusCode);

    /// Appends bytes to the response body. If no status has been set yet,
    /// `200 OK` is implied.
    fn write(&mut self, buf: &[u8]);
}

// ── ResponseRecorder ──────────────────────────────────────────────────────────

/// An in-memory [`ResponseWriter`] with standard HTTP semantics: the first
/// status wins and the first body write implies `200 OK`.
///
/// The server writes every handler's output into a recorder and sends the
/// result with [`into_response`](Self::into_response). Tests use it to
/// observe exactly what a client would receive.
#[derive(Debug, Default)]
pub struct ResponseRecorder {
    status: Option<StatusCode>,
    headers: HeaderMap,
    body: BytesMut,
}

impl ResponseRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// The status the client receives. A handler that wrote nothing yields
    /// `200 OK`.
    pub fn status(&self) -> StatusCode {
        self.status.unwrap_or(StatusCode::OK)
    }

    pub fn headers(&self) -> &HeaderMap { &self.headers }
    pub fn body(&self) -> &[u8] { &self.body }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)?.to_str().ok()
    }

    pub fn into_response(self) -> http::Response<Full<Bytes>> {
        let mut response = http::Response::new(Full::new(self.body.freeze()));
        *response.status_mut() = self.status.unwrap_or(StatusCode::OK);
        *response.headers_mut() = self.headers;
        response
    }
}

impl ResponseWriter for ResponseRecorder {
    fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    fn set_status(&mut self, status: StatusCode) {
        match self.status {
            None => self.status = Some(status),
            Some(current) => warn!(
                current = current.as_u16(),
                ignored = status.as_u16(),
                "superfluous set_status call",
            ),
        }
    }

    fn write(&mut self, buf: &[u8]) {
        if self.status.is_none() {
            self.status = Some(StatusCode::OK);
        }
        self.body.extend_from_slice(buf);
    }
}
