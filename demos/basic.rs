//! Minimal holdfast example: an in-memory "database" behind the transaction
//! middleware, plus the HTTPS and ETag layers.
//!
//! Run with:
//!   RUST_LOG=debug cargo run --example basic
//!
//! Try:
//!   curl -i -X POST http://localhost:3000/users -d 'alice'   # 201, committed
//!   curl -i -X POST http://localhost:3000/users -d ''        # 400, rolled back
//!   curl -i -X POST http://localhost:3000/users -d 'panic'   # 500, rolled back
//!   curl -i http://localhost:3000/users                      # 200 + ETag
//!   curl -i -H 'x-forwarded-proto: http' http://localhost:3000/users   # 308

use std::sync::{Arc, Mutex};

use holdfast::middleware::{
    ETag, Https, Transaction, TransactionProvider, UnitOfWork, compose, transaction,
};
use holdfast::{BoxError, Request, ResponseWriter, Server, handler_fn};
use http::{Method, StatusCode, header};

/// The committed state, shared by every request.
#[derive(Clone, Default)]
struct Users(Arc<Mutex<Vec<String>>>);

/// Writes staged against one request. Applied on commit, dropped on rollback.
struct Staged {
    users: Users,
    pending: Mutex<Vec<String>>,
}

impl Staged {
    fn insert(&self, name: String) {
        self.pending.lock().unwrap_or_else(|e| e.into_inner()).push(name);
    }
}

impl UnitOfWork for Staged {
    fn commit(&self) -> Result<(), BoxError> {
        let mut pending = self.pending.lock().map_err(|_| "staged writes poisoned")?;
        let mut users = self.users.0.lock().map_err(|_| "user table poisoned")?;
        users.append(&mut pending);
        Ok(())
    }

    fn rollback(&self) -> Result<(), BoxError> {
        self.pending.lock().map_err(|_| "staged writes poisoned")?.clear();
        Ok(())
    }
}

impl TransactionProvider for Users {
    type Unit = Staged;

    fn begin(&self, _req: &Request) -> Result<Staged, BoxError> {
        Ok(Staged { users: self.clone(), pending: Mutex::default() })
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let db = Users::default();
    let reader = db.clone();

    let app = compose(
        handler_fn(move |req, w| {
            if *req.method() == Method::POST {
                create_user(req, w);
            } else if *req.method() == Method::GET {
                list_users(&reader, w);
            } else {
                w.set_status(StatusCode::METHOD_NOT_ALLOWED);
            }
        }),
        &[&Https, &ETag::new(), &Transaction::new(db)],
    );

    Server::bind("0.0.0.0:3000")
        .serve(app)
        .await
        .expect("server error");
}

// POST /users
fn create_user(req: Request, w: &mut dyn ResponseWriter) {
    let name = String::from_utf8_lossy(req.body()).trim().to_owned();
    if name.is_empty() {
        return w.set_status(StatusCode::BAD_REQUEST);
    }

    let tx = transaction::unit_of_work::<Staged>(&req);
    tx.insert(name.clone());
    if name == "panic" {
        panic!("simulated failure after a write");
    }

    w.headers_mut().insert(header::CONTENT_TYPE, "text/plain".parse().unwrap());
    w.set_status(StatusCode::CREATED);
    w.write(name.as_bytes());
}

// GET /users
fn list_users(users: &Users, w: &mut dyn ResponseWriter) {
    let body = users.0.lock().unwrap_or_else(|e| e.into_inner()).join("\n");
    w.headers_mut().insert(header::CONTENT_TYPE, "text/plain".parse().unwrap());
    w.write(body.as_bytes());
}
