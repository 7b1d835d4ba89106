use std::fmt;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Migration error: {0}")]
    Migration(String),

    #[error("Invalid range: {0}")]
    InvalidRange(String),

    #[error("Invalid order: {0}")]
    InvalidOrder(String),

    /// The input to a pure operation broke one of its stated preconditions.
    /// Nothing was produced and nothing was written.
    #[error("Precondition violated: {0}")]
    Precondition(String),

    /// A boundary manifest changed in storage after the order was derived.
    #[error("Stale order for {kind}: {message}")]
    StaleOrder { kind: String, message: String },

    #[error("Fetch error for {kind}: {message}")]
    Fetch { kind: String, message: String },

    #[error("Unknown item kind: {0}")]
    UnknownKind(String),

    #[error("Invalid window format: {0}")]
    WindowParse(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Manifest not found: {0}")]
    NotFound(String),

    #[error("{0}")]
    Other(String),
}

impl From<rusqlite::Error> for Error {
    fn from(e: rusqlite::Error) -> Self {
        Error::Database(e.to_string())
    }
}

impl From<rusqlite_migration::Error> for Error {
    fn from(e: rusqlite_migration::Error) -> Self {
        Error::Migration(e.to_string())
    }
}

impl<E: fmt::Display> From<tokio_rusqlite::Error<E>> for Error {
    fn from(e: tokio_rusqlite::Error<E>) -> Self {
        Error::Database(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
