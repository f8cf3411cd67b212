//! Response buffering.
//!
//! A [`ResponseCapture`] sits between a handler and the real writer. Headers
//! go straight through; status and body are held back until
//! [`flush`](ResponseCapture::flush). Until then the middleware that owns the
//! capture may override the status or throw the body away.

use bytes::BytesMut;
use http::{HeaderMap, StatusCode};

use crate::response::ResponseWriter;

/// A [`ResponseWriter`] decorator that buffers status and body.
///
/// Status semantics differ from a plain writer on purpose: every
/// `set_status` call overwrites the previous one, so the owner can replace a
/// handler's status after the fact. Only the status recorded at flush time
/// reaches the inner writer.
pub struct ResponseCapture<'w> {
    inner: &'w mut dyn ResponseWriter,
    status: Option<StatusCode>,
    body: BytesMut,
}

impl<'w> ResponseCapture<'w> {
    pub fn new(inner: &'w mut dyn ResponseWriter) -> Self {
        Self { inner, status: None, body: BytesMut::new() }
    }

    /// The status recorded so far, if any.
    pub fn status(&self) -> Option<StatusCode> {
        self.status
    }

    /// The body buffered so far.
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Drops the buffered body. The recorded status is kept.
    pub fn discard_body(&mut self) {
        self.body.clear();
    }

    /// Releases the captured response to the inner writer: status first, then
    /// body. If no status was ever recorded nothing is written at all.
    ///
    /// Consuming `self` makes a second flush impossible.
    pub fn flush(self) {
        let Some(status) = self.status else { return };
        self.inner.set_status(status);
        if !self.body.is_empty() {
            self.inner.write(&self.body);
        }
    }
}

impl ResponseWriter for ResponseCapture<'_> {
    fn headers_mut(&mut self) -> &mut HeaderMap {
        self.inner.headers_mut()
    }

    fn set_status(&mut self, status: StatusCode) {
        self.status = Some(status);
    }

    fn write(&mut self, buf: &[u8]) {
        if self.status.is_none() {
            self.status = Some(StatusCode::OK);
        }
        self.body.extend_from_slice(buf);
    }
}
