//! Scheme enforcement behind a TLS-terminating proxy.

use std::sync::Arc;

use http::{HeaderValue, StatusCode, header};
use tracing::debug;

use crate::handler::{BoxedHandler, Handler};
use crate::middleware::Middleware;
use crate::request::Request;
use crate::response::ResponseWriter;

/// Redirects requests the proxy received over plain HTTP.
///
/// When `x-forwarded-proto` is `http`, answers `308 Permanent Redirect` to
/// `https://{host}{path}` and does not call the next handler. Any other value,
/// or no header at all, passes the request through.
///
/// A plain-HTTP request with no usable host cannot be redirected and gets
/// `400 Bad Request`.
#[derive(Clone, Copy, Debug, Default)]
pub struct Https;

impl Middleware for Https {
    fn wrap(&self, next: BoxedHandler) -> BoxedHandler {
        Arc::new(HttpsRedirect { next })
    }
}

struct HttpsRedirect {
    next: BoxedHandler,
}

impl Handler for HttpsRedirect {
    fn serve(&self, req: Request, w: &mut dyn ResponseWriter) {
        if req.header("x-forwarded-proto") != Some("http") {
            return self.next.serve(req, w);
        }

        let Some(host) = req.host() else {
            debug!(path = req.path(), "no host to redirect to");
            return w.set_status(StatusCode::BAD_REQUEST);
        };
        let location = format!("https://{host}{}", req.path());
        debug!(%location, "redirecting to https");
        match HeaderValue::try_from(location) {
            Ok(value) => {
                w.headers_mut().insert(header::LOCATION, value);
                w.set_status(StatusCode::PERMANENT_REDIRECT);
            }
            Err(_) => w.set_status(StatusCode::BAD_REQUEST),
        }
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::*;
    use crate::handler::handler_fn;
    use crate::middleware::compose;
    use crate::response::ResponseRecorder;

    fn request(proto: &str) -> Request {
        http::Request::builder()
            .uri("/test")
            .header("host", "example.com")
            .header("x-forwarded-proto", proto)
            .body(Bytes::new())
            .unwrap()
            .into()
    }

    #[test]
    fn plain_http_is_redirected() {
        let app = compose(
            handler_fn(|_req, _w| panic!("next handler must not run")),
            &[&Https],
        );
        let mut rec = ResponseRecorder::new();
        app.serve(request("http"), &mut rec);

        assert_eq!(rec.status(), StatusCode::PERMANENT_REDIRECT);
        assert_eq!(rec.header("location"), Some("https://example.com/test"));
    }

    #[test]
    fn https_passes_through() {
        let app = compose(
            handler_fn(|_req, w| w.set_status(StatusCode::OK)),
            &[&Https],
        );
        let mut rec = ResponseRecorder::new();
        app.serve(request("https"), &mut rec);

        assert_eq!(rec.status(), StatusCode::OK);
        assert_eq!(rec.header("location"), None);
    }

    #[test]
    fn unusable_host_is_a_bad_request() {
        let app = compose(
            handler_fn(|_req, _w| panic!("next handler must not run")),
            &[&Https],
        );
        let missing = http::Request::builder().uri("/menu");
        // obs-text is a legal header byte but not a host we can echo back.
        let opaque = http::Request::builder()
            .uri("/menu")
            .header("host", HeaderValue::from_bytes(b"caf\xe9.example").unwrap());

        for builder in [missing, opaque] {
            let req: Request = builder
                .header("x-forwarded-proto", "http")
                .body(Bytes::new())
                .unwrap()
                .into();
            let mut rec = ResponseRecorder::new();
            app.serve(req, &mut rec);

            assert_eq!(rec.status(), StatusCode::BAD_REQUEST);
            assert_eq!(rec.header("location"), None);
        }
    }
}
