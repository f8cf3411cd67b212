//! Unified error types.

/// A type-erased error from a collaborator: a transaction provider, a unit of
/// work, or a pluggable authentication function.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// The error type returned by holdfast's fallible infrastructure operations.
///
/// Application-level failures (401, 404, 422, etc.) are expressed as HTTP
/// responses written by handlers, not as `Error`s. This type surfaces
/// infrastructure failures: binding to a port or accepting a connection.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

/// A failure reported by the transaction provider or its unit of work.
///
/// None of these reach the client as-is. The coordinator logs them and
/// answers with the response that matches the final disposition.
#[derive(Debug, thiserror::Error)]
pub enum TransactionError {
    #[error("failed to begin unit of work")]
    Begin(#[source] BoxError),

    #[error("failed to commit unit of work")]
    Commit(#[source] BoxError),

    #[error("failed to roll back unit of work")]
    Rollback(#[source] BoxError),
}
