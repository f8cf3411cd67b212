//! Middleware layer.
//!
//! A middleware turns a handler into a handler: `BoxedHandler -> BoxedHandler`.
//! That one contract is shared by every middleware in this crate, so they
//! chain in any order the application chooses:
//!
//! ```rust
//! use holdfast::middleware::{compose, ETag, Https};
//! use holdfast::handler_fn;
//!
//! let app = compose(
//!     handler_fn(|_req, w| w.write(b"hello")),
//!     &[&Https, &ETag::new()],
//! );
//! ```
//!
//! Built-in middleware:
//! - [`Transaction`]: commit or roll back a unit of work based on the response
//! - [`Https`]: redirect proxied plain-HTTP requests to `https://`
//! - [`ETag`]: content-fingerprint conditional caching
//! - [`Auth`] and [`BearerAuth`]: pluggable authentication

mod auth;
mod etag;
mod https;
pub mod transaction;

pub use auth::{Auth, BearerAuth, Claims};
pub use etag::{ETag, Md5, Sha1};
pub use https::Https;
pub use transaction::{Transaction, TransactionProvider, UnitOfWork};

use std::sync::Arc;

use crate::handler::{BoxedHandler, Handler};

/// Wraps a handler with extra behaviour.
///
/// Any `Fn(BoxedHandler) -> BoxedHandler` closure is a middleware:
///
/// ```rust
/// use std::sync::Arc;
/// use holdfast::{BoxedHandler, Handler, handler_fn};
/// use holdfast::middleware::compose;
///
/// let no_store = |next: BoxedHandler| -> BoxedHandler {
///     Arc::new(handler_fn(move |req, w| {
///         w.headers_mut().insert("cache-control", "no-store".parse().unwrap());
///         next.serve(req, w);
///     }))
/// };
/// let app = compose(handler_fn(|_req, w| w.write(b"hi")), &[&no_store]);
/// ```
pub trait Middleware: Send + Sync {
    fn wrap(&self, next: BoxedHandler) -> BoxedHandler;
}

impl<F> Middleware for F
where
    F: Fn(BoxedHandler) -> BoxedHandler + Send + Sync,
{
    fn wrap(&self, next: BoxedHandler) -> BoxedHandler {
        self(next)
    }
}

/// Builds a handler chain. The first middleware is outermost: it sees the
/// request first and the response last.
///
/// `compose(h, &[&a, &b])` runs as a-enter, b-enter, h, b-exit, a-exit.
pub fn compose(handler: impl Handler, middlewares: &[&dyn Middleware]) -> BoxedHandler {
    middlewares
        .iter()
        .rev()
        .fold(Arc::new(handler) as BoxedHandler, |next, middleware| middleware.wrap(next))
}
