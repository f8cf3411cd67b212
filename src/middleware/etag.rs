//! Conditional caching with content fingerprints.

use std::marker::PhantomData;
use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use digest::Digest;
use http::{HeaderValue, StatusCode, header};
use tracing::debug;

pub use md5::Md5;
pub use sha1::Sha1;

use crate::capture::ResponseCapture;
use crate::handler::{BoxedHandler, Handler};
use crate::middleware::Middleware;
use crate::request::Request;
use crate::response::ResponseWriter;

/// Tags `200 OK` responses with a weak `ETag` derived from the body and
/// answers `304 Not Modified` when the client already holds that version.
///
/// The tag is `W/"{body length}-{base64(digest(body))}"`. The digest defaults
/// to MD5; any RustCrypto [`Digest`] works:
///
/// ```rust
/// use holdfast::middleware::{ETag, Sha1};
///
/// let md5 = ETag::new();
/// let sha1 = ETag::<Sha1>::with_digest();
/// ```
///
/// The whole response is buffered to compute the tag. Responses with any
/// other status are passed through untouched.
pub struct ETag<D = Md5> {
    digest: PhantomData<fn() -> D>,
}

impl ETag<Md5> {
    pub fn new() -> Self {
        Self::with_digest()
    }
}

impl Default for ETag<Md5> {
    fn default() -> Self {
        Self::new()
    }
}

impl<D> ETag<D> {
    pub fn with_digest() -> Self {
        Self { digest: PhantomData }
    }
}

impl<D: Digest + 'static> Middleware for ETag<D> {
    fn wrap(&self, next: BoxedHandler) -> BoxedHandler {
        Arc::new(Fingerprint::<D> { next, digest: PhantomData })
    }
}

struct Fingerprint<D> {
    next: BoxedHandler,
    digest: PhantomData<fn() -> D>,
}

impl<D: Digest + 'static> Handler for Fingerprint<D> {
    fn serve(&self, req: Request, w: &mut dyn ResponseWriter) {
        let if_none_match = req.header("if-none-match").map(str::to_owned);

        let mut capture = ResponseCapture::new(w);
        self.next.serve(req, &mut capture);

        if capture.status() == Some(StatusCode::OK) {
            let tag = weak_tag::<D>(capture.body());
            if if_none_match.as_deref() == Some(tag.as_str()) {
                debug!(etag = %tag, "client copy is current");
                capture.discard_body();
                capture.set_status(StatusCode::NOT_MODIFIED);
            }
            if let Ok(value) = HeaderValue::try_from(tag) {
                capture.headers_mut().insert(header::ETAG, value);
            }
        }

        capture.flush();
    }
}

fn weak_tag<D: Digest>(body: &[u8]) -> String {
    format!("W/\"{}-{}\"", body.len(), STANDARD.encode(D::digest(body)))
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::*;
    use crate::handler::handler_fn;
    use crate::middleware::compose;
    use crate::response::ResponseRecorder;

    const TEST_MD5: &str = "W/\"4-DLxmEfVUC9CAmjiNyVphWw==\"";

    fn request(if_none_match: Option<&str>) -> Request {
        let mut builder = http::Request::builder().uri("/test");
        if let Some(tag) = if_none_match {
            builder = builder.header("if-none-match", tag);
        }
        builder.body(Bytes::new()).unwrap().into()
    }

    fn respond(status: StatusCode) -> impl Handler {
        handler_fn(move |_req, w| {
            w.set_status(status);
            w.write(b"Test");
        })
    }

    #[test]
    fn ok_response_is_tagged() {
        let app = compose(respond(StatusCode::OK), &[&ETag::new()]);
        let mut rec = ResponseRecorder::new();
        app.serve(request(None), &mut rec);

        assert_eq!(rec.status(), StatusCode::OK);
        assert_eq!(rec.header("etag"), Some(TEST_MD5));
        assert_eq!(rec.body(), b"Test");
    }

    #[test]
    fn matching_tag_gives_not_modified() {
        let app = compose(respond(StatusCode::OK), &[&ETag::new()]);
        let mut rec = ResponseRecorder::new();
        app.serve(request(Some(TEST_MD5)), &mut rec);

        assert_eq!(rec.status(), StatusCode::NOT_MODIFIED);
        assert!(rec.body().is_empty());
        assert_eq!(rec.header("etag"), Some(TEST_MD5));
    }

    #[test]
    fn stale_tag_gets_full_response() {
        let app = compose(respond(StatusCode::OK), &[&ETag::new()]);
        let mut rec = ResponseRecorder::new();
        app.serve(request(Some("W/\"4-stale\"")), &mut rec);

        assert_eq!(rec.status(), StatusCode::OK);
        assert_eq!(rec.body(), b"Test");
    }

    #[test]
    fn error_response_is_not_tagged() {
        let app = compose(respond(StatusCode::INTERNAL_SERVER_ERROR), &[&ETag::new()]);
        let mut rec = ResponseRecorder::new();
        app.serve(request(None), &mut rec);

        assert_eq!(rec.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(rec.header("etag"), None);
        assert_eq!(rec.body(), b"Test");
    }

    #[test]
    fn returned_tag_validates_the_next_request() {
        let app = compose(respond(StatusCode::OK), &[&ETag::new()]);

        let mut first = ResponseRecorder::new();
        app.serve(request(None), &mut first);
        assert_eq!(first.status(), StatusCode::OK);
        let tag = first.header("etag").unwrap().to_owned();

        let mut second = ResponseRecorder::new();
        app.serve(request(Some(&tag)), &mut second);
        assert_eq!(second.status(), StatusCode::NOT_MODIFIED);
    }

    #[test]
    fn digest_is_pluggable() {
        let app = compose(respond(StatusCode::OK), &[&ETag::<Sha1>::with_digest()]);
        let mut rec = ResponseRecorder::new();
        app.serve(request(None), &mut rec);

        assert_eq!(rec.header("etag"), Some("W/\"4-ZAqyuuB77cTBY/Z5p0b3q3+10fo=\""));
    }
}
