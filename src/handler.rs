//! Handler trait and type erasure.
//!
//! # How handlers are stored
//!
//! A middleware chain holds handlers of *different* concrete types: closures,
//! the coordinator wrapping a closure, an ETag layer wrapping that. The chain
//! stores every link as a trait object behind an `Arc` so each one can hold
//! "the rest of the chain" without knowing its type:
//!
//! ```text
//! fn create_user(req, w) { … }              ← user writes this
//!        ↓ handler_fn(create_user)
//! HandlerFn(create_user)                    ← implements Handler
//!        ↓ compose(h, &[&Transaction::new(db)])
//! Arc<dyn Handler>  = BoxedHandler          ← what a middleware wraps
//!        ↓
//! next.serve(req, w)  at request time       ← one virtual call per link
//! ```
//!
//! Handlers are synchronous. The server runs the whole chain on tokio's
//! blocking pool, so a handler (or a transaction provider) may block.

use std::sync::Arc;

use crate::request::Request;
use crate::response::ResponseWriter;

/// A type-erased handler shared across concurrent requests.
pub type BoxedHandler = Arc<dyn Handler>;

/// Serves one request by writing to a [`ResponseWriter`].
///
/// Implemented by middleware-produced handlers and, through [`handler_fn`],
/// by any function with the signature
///
/// ```text
/// fn name(req: Request, w: &mut dyn ResponseWriter)
/// ```
///
/// A handler may write headers, status and body in any order and any number
/// of times. It may also panic; what happens then depends on the middlewares
/// around it.
pub trait Handler: Send + Sync + 'static {
    fn serve(&self, req: Request, w: &mut dyn ResponseWriter);
}

impl<H: Handler + ?Sized> Handler for Arc<H> {
    fn serve(&self, req: Request, w: &mut dyn ResponseWriter) {
        (**self).serve(req, w)
    }
}

impl<H: Handler + ?Sized> Handler for Box<H> {
    fn serve(&self, req: Request, w: &mut dyn ResponseWriter) {
        (**self).serve(req, w)
    }
}

/// Adapts a plain function into a [`Handler`].
///
/// The `Fn` bound lives on this function rather than on a blanket impl so
/// that closures get their higher-ranked `&mut dyn ResponseWriter` signature
/// inferred without annotations:
///
/// ```rust
/// use holdfast::handler_fn;
///
/// let hello = handler_fn(|_req, w| w.write(b"hello"));
/// ```
pub fn handler_fn<F>(f: F) -> HandlerFn<F>
where
    F: Fn(Request, &mut dyn ResponseWriter) + Send + Sync + 'static,
{
    HandlerFn(f)
}

/// A [`Handler`] built from a function. See [`handler_fn`].
#[derive(Clone, Copy)]
pub struct HandlerFn<F>(F);

impl<F> Handler for HandlerFn<F>
where
    F: Fn(Request, &mut dyn ResponseWriter) + Send + Sync + 'static,
{
    fn serve(&self, req: Request, w: &mut dyn ResponseWriter) {
        (self.0)(req, w)
    }
}
