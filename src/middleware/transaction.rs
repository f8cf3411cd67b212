//! Transactional response coordination.
//!
//! [`Transaction`] wraps a handler so that a unit of work is committed or
//! rolled back based on how the handler finished, and the client only ever
//! sees a response that agrees with that outcome.
//!
//! Per request:
//!
//! ```text
//! begin ──fail──▶ 500, handler never runs
//!   │
//!   ▼
//! handler(req + unit of work, capture)
//!   │
//!   ├─ panicked ───────────▶ rollback, 500, body dropped
//!   ├─ status outside 2xx ─▶ rollback, response as written
//!   └─ 2xx / nothing set ──▶ commit ──fail──▶ rollback, 500, body dropped
//!                              │
//!                              └─ ok ──▶ response as written
//! ```
//!
//! Nothing reaches the real writer until the decision is made: the handler
//! writes into a [`ResponseCapture`] that is flushed last. Headers are the
//! exception; they are not part of the atomicity guarantee.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use http::StatusCode;
use tracing::{debug, error, warn};

use crate::capture::ResponseCapture;
use crate::error::{BoxError, TransactionError};
use crate::handler::{BoxedHandler, Handler};
use crate::middleware::Middleware;
use crate::request::Request;
use crate::response::ResponseWriter;

// ── Collaborator contracts ────────────────────────────────────────────────────

/// A transactional resource handle: exactly one request's database
/// transaction, or anything else with commit/rollback semantics.
pub trait UnitOfWork: Send + Sync + 'static {
    fn commit(&self) -> Result<(), BoxError>;
    fn rollback(&self) -> Result<(), BoxError>;
}

/// Hands out one [`UnitOfWork`] per request.
///
/// Shared by every in-flight request, so it must be safe for concurrent use.
/// Its calls may block.
pub trait TransactionProvider: Send + Sync + 'static {
    type Unit: UnitOfWork;

    fn begin(&self, req: &Request) -> Result<Self::Unit, BoxError>;
}

// ── Request-scoped slot ───────────────────────────────────────────────────────

/// The extension slot the unit of work travels in. The type is private, so
/// its `TypeId` is a key no other module can produce.
struct Slot<U>(Arc<U>);

impl<U> Clone for Slot<U> {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

/// Returns the unit of work [`Transaction`] attached to this request.
///
/// ```rust,ignore
/// fn create_user(req: Request, w: &mut dyn ResponseWriter) {
///     let tx = transaction::unit_of_work::<PgTransaction>(&req);
///     tx.execute("INSERT INTO users …");
///     w.set_status(StatusCode::CREATED);
/// }
/// ```
///
/// # Panics
///
/// Panics if no unit of work of type `U` is attached: the handler is not
/// running behind a `Transaction` for that provider. That is a wiring
/// mistake, not a runtime condition.
pub fn unit_of_work<U: UnitOfWork>(req: &Request) -> Arc<U> {
    match req.extensions().get::<Slot<U>>() {
        Some(slot) => Arc::clone(&slot.0),
        None => panic!(
            "no unit of work of type `{}` attached to this request; \
             is the handler wrapped in `Transaction`?",
            std::any::type_name::<U>(),
        ),
    }
}

// ── Middleware ────────────────────────────────────────────────────────────────

/// Runs the wrapped handler inside a unit of work from `P`.
///
/// ```rust,ignore
/// let app = compose(handler_fn(create_user), &[&Transaction::new(pool)]);
/// ```
pub struct Transaction<P> {
    provider: Arc<P>,
}

impl<P: TransactionProvider> Transaction<P> {
    pub fn new(provider: P) -> Self {
        Self { provider: Arc::new(provider) }
    }

    /// Shares a provider that the application also holds elsewhere.
    pub fn from_shared(provider: Arc<P>) -> Self {
        Self { provider }
    }
}

impl<P> Clone for Transaction<P> {
    fn clone(&self) -> Self {
        Self { provider: Arc::clone(&self.provider) }
    }
}

impl<P: TransactionProvider> Middleware for Transaction<P> {
    fn wrap(&self, next: BoxedHandler) -> BoxedHandler {
        Arc::new(Coordinator { provider: Arc::clone(&self.provider), next })
    }
}

struct Coordinator<P> {
    provider: Arc<P>,
    next: BoxedHandler,
}

/// How the wrapped handler finished.
enum Outcome {
    Panicked(Box<dyn Any + Send>),
    Returned(Option<StatusCode>),
}

impl<P: TransactionProvider> Handler for Coordinator<P> {
    fn serve(&self, mut req: Request, w: &mut dyn ResponseWriter) {
        let mut capture = ResponseCapture::new(w);

        let unit = match self.provider.begin(&req) {
            Ok(unit) => Arc::new(unit),
            Err(e) => {
                let e = TransactionError::Begin(e);
                error!(
                    error = %e,
                    cause = %display_source(&e),
                    path = req.path(),
                    "request aborted"
                );
                capture.set_status(StatusCode::INTERNAL_SERVER_ERROR);
                capture.flush();
                return;
            }
        };
        let path = req.path().to_owned();
        req.extensions_mut().insert(Slot(Arc::clone(&unit)));

        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            self.next.serve(req, &mut capture);
        }));
        let outcome = match result {
            Ok(()) => Outcome::Returned(capture.status()),
            Err(payload) => Outcome::Panicked(payload),
        };

        settle(&*unit, outcome, &mut capture, &path);
        capture.flush();
    }
}

/// Commits or rolls back `unit` and shapes the captured response to match.
fn settle(unit: &dyn UnitOfWork, outcome: Outcome, capture: &mut ResponseCapture<'_>, path: &str) {
    match outcome {
        Outcome::Panicked(payload) => {
            error!(panic = panic_message(&*payload), path, "handler panicked, rolling back");
            rollback(unit, path);
            replace_with_error(capture);
        }
        Outcome::Returned(Some(status)) if !status.is_success() => {
            warn!(status = status.as_u16(), path, "handler failed, rolling back");
            rollback(unit, path);
        }
        Outcome::Returned(_) => match unit.commit() {
            Ok(()) => debug!(path, "unit of work committed"),
            Err(e) => {
                let e = TransactionError::Commit(e);
                error!(
                    error = %e,
                    cause = %display_source(&e),
                    path,
                    "replacing response with 500"
                );
                rollback(unit, path);
                replace_with_error(capture);
            }
        },
    }
}

/// Best effort: the response already reflects the failure that triggered the
/// rollback, so a rollback error has nowhere better to go than the log.
fn rollback(unit: &dyn UnitOfWork, path: &str) {
    if let Err(e) = unit.rollback() {
        let e = TransactionError::Rollback(e);
        error!(error = %e, cause = %display_source(&e), path, "rollback failed");
    }
}

fn replace_with_error(capture: &mut ResponseCapture<'_>) {
    capture.discard_body();
    capture.set_status(StatusCode::INTERNAL_SERVER_ERROR);
}

fn display_source(e: &TransactionError) -> String {
    std::error::Error::source(e).map(ToString::to_string).unwrap_or_default()
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        *s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "<non-string panic payload>"
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::*;
    use crate::handler::handler_fn;
    use crate::middleware::compose;
    use crate::response::ResponseRecorder;

    struct Noop;

    impl UnitOfWork for Noop {
        fn commit(&self) -> Result<(), BoxError> { Ok(()) }
        fn rollback(&self) -> Result<(), BoxError> { Ok(()) }
    }

    struct NoopProvider;

    impl TransactionProvider for NoopProvider {
        type Unit = Noop;

        fn begin(&self, _req: &Request) -> Result<Noop, BoxError> {
            Ok(Noop)
        }
    }

    fn request() -> Request {
        http::Request::builder().uri("/").body(Bytes::new()).unwrap().into()
    }

    #[test]
    fn slot_is_visible_to_the_handler() {
        let app = compose(
            handler_fn(|req, w| {
                let _unit: Arc<Noop> = unit_of_work(&req);
                w.write(b"found");
            }),
            &[&Transaction::new(NoopProvider)],
        );
        let mut rec = ResponseRecorder::new();
        app.serve(request(), &mut rec);
        assert_eq!(rec.status(), StatusCode::OK);
        assert_eq!(rec.body(), b"found");
    }

    #[test]
    #[should_panic(expected = "no unit of work")]
    fn accessor_outside_a_transaction_panics() {
        let _ = unit_of_work::<Noop>(&request());
    }

    #[test]
    fn panic_message_reads_common_payloads() {
        let payload: Box<dyn Any + Send> = Box::new("static");
        assert_eq!(panic_message(&*payload), "static");
        let payload: Box<dyn Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(&*payload), "owned");
        let payload: Box<dyn Any + Send> = Box::new(42_u8);
        assert_eq!(panic_message(&*payload), "<non-string panic payload>");
    }
}
