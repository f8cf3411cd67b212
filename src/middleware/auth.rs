//! Pluggable authentication.
//!
//! Neither middleware knows how to verify anything. [`Auth`] hands the raw
//! `Authorization` header to an application function; [`BearerAuth`] is
//! `Auth` with the token extraction and claims plumbing already done, leaving
//! only the verifier (a JWT library or an introspection call) to the
//! application.

use std::sync::Arc;

use http::{Extensions, StatusCode};
use tracing::debug;

use crate::error::BoxError;
use crate::handler::{BoxedHandler, Handler};
use crate::middleware::Middleware;
use crate::request::Request;
use crate::response::ResponseWriter;

type CheckFn = dyn Fn(&str, &mut Extensions) -> Result<(), BoxError> + Send + Sync;
type ExtractFn = dyn Fn(&str) -> Result<String, BoxError> + Send + Sync;
type VerifyFn<C> = dyn Fn(&str) -> Result<C, BoxError> + Send + Sync;
type AuthorizeFn<C> = dyn Fn(&C, &mut Extensions) -> Result<(), BoxError> + Send + Sync;

// ── Auth ──────────────────────────────────────────────────────────────────────

/// Authenticates requests with an application-supplied function.
///
/// The function receives the `Authorization` header value and the request
/// extensions. Returning `Ok` lets the request through with whatever the
/// function inserted into the extensions (a user id, a session). Returning
/// `Err`, or a request with a missing or empty header, gets
/// `401 Unauthorized` and the next handler never runs.
///
/// ```rust
/// use holdfast::middleware::Auth;
///
/// #[derive(Clone)]
/// struct User(String);
///
/// let auth = Auth::new(|header, ext| {
///     if header != "magic_password" {
///         return Err("unknown credentials".into());
///     }
///     ext.insert(User("test@test.com".to_owned()));
///     Ok(())
/// });
/// ```
#[derive(Clone)]
pub struct Auth {
    check: Arc<CheckFn>,
}

impl Auth {
    pub fn new<F>(check: F) -> Self
    where
        F: Fn(&str, &mut Extensions) -> Result<(), BoxError> + Send + Sync + 'static,
    {
        Self { check: Arc::new(check) }
    }
}

impl Middleware for Auth {
    fn wrap(&self, next: BoxedHandler) -> BoxedHandler {
        Arc::new(Authenticate { check: Arc::clone(&self.check), next })
    }
}

struct Authenticate {
    check: Arc<CheckFn>,
    next: BoxedHandler,
}

impl Handler for Authenticate {
    fn serve(&self, mut req: Request, w: &mut dyn ResponseWriter) {
        let credentials = req
            .header("authorization")
            .filter(|value| !value.is_empty())
            .map(str::to_owned);
        let Some(credentials) = credentials else {
            debug!(path = req.path(), "no credentials provided");
            return w.set_status(StatusCode::UNAUTHORIZED);
        };

        if let Err(e) = (self.check)(&credentials, req.extensions_mut()) {
            debug!(path = req.path(), error = %e, "credentials rejected");
            return w.set_status(StatusCode::UNAUTHORIZED);
        }

        self.next.serve(req, w);
    }
}

// ── BearerAuth ────────────────────────────────────────────────────────────────

/// Claims verified by [`BearerAuth`], available to downstream handlers
/// through the request extensions.
///
/// ```rust,ignore
/// let Claims(user) = req.extensions().get::<Claims<UserClaims>>().unwrap();
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Claims<C>(pub C);

/// Bearer-token authentication with a pluggable claims verifier.
///
/// 1. The extractor pulls a token out of the `Authorization` header. The
///    default accepts `Bearer <token>` with the scheme in any case.
/// 2. `verify` turns the token into claims `C`, or rejects it.
/// 3. The optional `authorize` hook inspects the claims and may reject the
///    request or add more to the extensions.
/// 4. The claims are inserted into the extensions as [`Claims<C>`].
///
/// Any failure answers `401 Unauthorized`.
///
/// ```rust,ignore
/// let auth = BearerAuth::new(move |token| jwt::decode::<UserClaims>(token, &key))
///     .authorize(|claims, _ext| {
///         if claims.admin { Ok(()) } else { Err("admin only".into()) }
///     });
/// ```
pub struct BearerAuth<C> {
    extract: Arc<ExtractFn>,
    verify: Arc<VerifyFn<C>>,
    authorize: Option<Arc<AuthorizeFn<C>>>,
}

impl<C> Clone for BearerAuth<C> {
    fn clone(&self) -> Self {
        Self {
            extract: Arc::clone(&self.extract),
            verify: Arc::clone(&self.verify),
            authorize: self.authorize.clone(),
        }
    }
}

impl<C: Clone + Send + Sync + 'static> BearerAuth<C> {
    pub fn new<F>(verify: F) -> Self
    where
        F: Fn(&str) -> Result<C, BoxError> + Send + Sync + 'static,
    {
        Self {
            extract: Arc::new(bearer_token),
            verify: Arc::new(verify),
            authorize: None,
        }
    }

    /// Replaces the default `Bearer <token>` extractor.
    pub fn extractor<F>(mut self, extract: F) -> Self
    where
        F: Fn(&str) -> Result<String, BoxError> + Send + Sync + 'static,
    {
        self.extract = Arc::new(extract);
        self
    }

    /// Adds a check that runs on verified claims.
    pub fn authorize<F>(mut self, authorize: F) -> Self
    where
        F: Fn(&C, &mut Extensions) -> Result<(), BoxError> + Send + Sync + 'static,
    {
        self.authorize = Some(Arc::new(authorize));
        self
    }

    fn into_auth(self) -> Auth {
        Auth::new(move |header, ext| {
            let token = (self.extract)(header)?;
            let claims = (self.verify)(&token)?;
            if let Some(authorize) = &self.authorize {
                authorize(&claims, ext)?;
            }
            ext.insert(Claims(claims));
            Ok(())
        })
    }
}

impl<C: Clone + Send + Sync + 'static> Middleware for BearerAuth<C> {
    fn wrap(&self, next: BoxedHandler) -> BoxedHandler {
        self.clone().into_auth().wrap(next)
    }
}

fn bearer_token(header: &str) -> Result<String, BoxError> {
    match header.split_once(' ') {
        Some((scheme, token))
            if scheme.eq_ignore_ascii_case("bearer") && !token.trim().is_empty() =>
        {
            Ok(token.trim().to_owned())
        }
        _ => Err("authorization header format must be `Bearer {token}`".into()),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use bytes::Bytes;

    use super::*;
    use crate::handler::handler_fn;
    use crate::middleware::compose;
    use crate::response::ResponseRecorder;

    #[derive(Clone, Debug, PartialEq, Eq)]
    struct User(&'static str);

    fn request(authorization: Option<&str>) -> Request {
        let mut builder = http::Request::builder().uri("/");
        if let Some(value) = authorization {
            builder = builder.header("authorization", value);
        }
        builder.body(Bytes::new()).unwrap().into()
    }

    fn ok_handler() -> impl Handler {
        handler_fn(|_req, w| w.set_status(StatusCode::OK))
    }

    fn must_not_run() -> impl Handler {
        handler_fn(|_req, _w| panic!("next handler must not run"))
    }

    #[test]
    fn missing_header_is_unauthorized() {
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&calls);
        let auth = Auth::new(move |_header, _ext| {
            seen.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        let app = compose(must_not_run(), &[&auth]);
        let mut rec = ResponseRecorder::new();
        app.serve(request(None), &mut rec);

        assert_eq!(rec.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn empty_header_is_unauthorized() {
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&calls);
        let auth = Auth::new(move |_header, _ext| {
            seen.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        let app = compose(must_not_run(), &[&auth]);
        let mut rec = ResponseRecorder::new();
        app.serve(request(Some("")), &mut rec);

        assert_eq!(rec.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn rejected_credentials_are_unauthorized() {
        let app = compose(must_not_run(), &[&Auth::new(|_header, _ext| Err("nope".into()))]);
        let mut rec = ResponseRecorder::new();
        app.serve(request(Some("magic_password")), &mut rec);
        assert_eq!(rec.status(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn accepted_credentials_reach_the_handler() {
        let auth = Auth::new(|header, _ext| {
            assert_eq!(header, "magic_password");
            Ok(())
        });
        let app = compose(ok_handler(), &[&auth]);
        let mut rec = ResponseRecorder::new();
        app.serve(request(Some("magic_password")), &mut rec);
        assert_eq!(rec.status(), StatusCode::OK);
    }

    #[test]
    fn auth_fn_can_populate_extensions() {
        let auth = Auth::new(|_header, ext| {
            ext.insert(User("test@test.com"));
            Ok(())
        });
        let app = compose(
            handler_fn(|req, w| {
                assert_eq!(req.extensions().get::<User>(), Some(&User("test@test.com")));
                w.set_status(StatusCode::OK);
            }),
            &[&auth],
        );
        let mut rec = ResponseRecorder::new();
        app.serve(request(Some("magic_password")), &mut rec);
        assert_eq!(rec.status(), StatusCode::OK);
    }

    fn verify(token: &str) -> Result<User, BoxError> {
        match token {
            "valid" => Ok(User("alice")),
            "expired" => Err("token is expired".into()),
            _ => Err("malformed token".into()),
        }
    }

    #[test]
    fn bearer_without_header_is_unauthorized() {
        let app = compose(must_not_run(), &[&BearerAuth::new(verify)]);
        let mut rec = ResponseRecorder::new();
        app.serve(request(None), &mut rec);
        assert_eq!(rec.status(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn bearer_bad_and_expired_tokens_are_unauthorized() {
        let app = compose(must_not_run(), &[&BearerAuth::new(verify)]);
        for header in ["bearer garbage", "Bearer expired", "valid", "Basic valid"] {
            let mut rec = ResponseRecorder::new();
            app.serve(request(Some(header)), &mut rec);
            assert_eq!(rec.status(), StatusCode::UNAUTHORIZED, "{header}");
        }
    }

    #[test]
    fn bearer_valid_token_exposes_claims() {
        let app = compose(
            handler_fn(|req, w| {
                assert_eq!(req.extensions().get::<Claims<User>>(), Some(&Claims(User("alice"))));
                w.set_status(StatusCode::OK);
            }),
            &[&BearerAuth::new(verify)],
        );
        let mut rec = ResponseRecorder::new();
        app.serve(request(Some("bearer valid")), &mut rec);
        assert_eq!(rec.status(), StatusCode::OK);
    }

    #[test]
    fn bearer_authorize_hook_can_reject() {
        let auth = BearerAuth::new(verify)
            .authorize(|_claims, _ext| Err("claims aren't good".into()));
        let app = compose(must_not_run(), &[&auth]);
        let mut rec = ResponseRecorder::new();
        app.serve(request(Some("Bearer valid")), &mut rec);
        assert_eq!(rec.status(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn bearer_custom_extractor() {
        let auth = BearerAuth::new(verify).extractor(|header| Ok(header.to_owned()));
        let app = compose(ok_handler(), &[&auth]);
        let mut rec = ResponseRecorder::new();
        app.serve(request(Some("valid")), &mut rec);
        assert_eq!(rec.status(), StatusCode::OK);
    }

    #[test]
    fn bearer_extractor_error_is_unauthorized() {
        let auth = BearerAuth::new(verify)
            .extractor(|_header| Err("no token in header".into()));
        let app = compose(must_not_run(), &[&auth]);
        let mut rec = ResponseRecorder::new();
        app.serve(request(Some("Bearer valid")), &mut rec);
        assert_eq!(rec.status(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn bearer_token_parsing() {
        assert_eq!(bearer_token("Bearer abc").unwrap(), "abc");
        assert_eq!(bearer_token("BEARER abc").unwrap(), "abc");
        assert!(bearer_token("Bearer ").is_err());
        assert!(bearer_token("abc").is_err());
        assert!(bearer_token("Token abc").is_err());
    }
}
