//! # holdfast
//!
//! HTTP middleware that holds the response until the transaction decides.
//!
//! ## The contract
//!
//! A handler running inside [`middleware::Transaction`] gets a unit of work
//! (a database transaction) on its request and a response writer that looks
//! like any other. What the handler does not see is that nothing it writes
//! leaves the process until the unit of work has been settled:
//!
//! - **2xx, or nothing written**: commit, then send the response as written.
//! - **Any other status**: roll back, then send the response as written.
//! - **Panic**: roll back, send `500`.
//! - **Commit fails**: roll back, send `500` in place of the success response.
//!
//! A client never receives a success status for work that was rolled back,
//! and never receives half a body.
//!
//! Everything else in the crate is ordinary request/response decoration that
//! shares the same `BoxedHandler -> BoxedHandler` contract and composes on
//! either side of the transaction: [`middleware::Https`],
//! [`middleware::ETag`], [`middleware::Auth`], [`middleware::BearerAuth`].
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use holdfast::middleware::{compose, transaction, ETag, Https, Transaction};
//! use holdfast::{handler_fn, Request, ResponseWriter, Server};
//! use http::StatusCode;
//!
//! #[tokio::main]
//! async fn main() {
//!     let app = compose(
//!         handler_fn(create_user),
//!         &[&Https, &ETag::new(), &Transaction::new(Pool::connect("…"))],
//!     );
//!
//!     Server::bind("0.0.0.0:3000").serve(app).await.unwrap();
//! }
//!
//! fn create_user(req: Request, w: &mut dyn ResponseWriter) {
//!     let tx = transaction::unit_of_work::<PgTransaction>(&req);
//!     if tx.insert_user(req.body()).is_err() {
//!         // 4xx/5xx: rolled back, sent as-is
//!         return w.set_status(StatusCode::UNPROCESSABLE_ENTITY);
//!     }
//!     w.set_status(StatusCode::CREATED);
//!     w.write(br#"{"id":"99"}"#);
//! }
//! ```

mod capture;
mod error;
mod handler;
mod request;
mod response;
mod server;

pub mod middleware;

pub use capture::ResponseCapture;
pub use error::{BoxError, Error, TransactionError};
pub use handler::{BoxedHandler, Handler, HandlerFn, handler_fn};
pub use request::Request;
pub use response::{ResponseRecorder, ResponseWriter};
pub use server::Server;
