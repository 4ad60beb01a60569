//! Error types for quarry.
//!
//! Every fallible operation in the crate returns [`Result`]. The variants
//! mirror the failure classes a search engine exposes to its callers: open
//! and create failures, generic database failures, missing documents, bad
//! arguments, capability mismatches on iterators and query syntax errors.
//!
//! Errors raised by user-supplied callbacks (deciders, posting sources,
//! stoppers, field processors) travel through the engine untouched as
//! [`QuarryError::Callback`].

use std::error::Error as StdError;

use thiserror::Error;

use crate::DocId;

/// Result type alias used throughout the crate.
pub type Result<T> = std::result::Result<T, QuarryError>;

/// The main error type for quarry operations.
#[derive(Error, Debug)]
pub enum QuarryError {
    /// The database could not be opened (missing path, bad manifest).
    #[error("Database opening error: {0}")]
    DatabaseOpening(String),

    /// The database could not be created (exists already, parent missing).
    #[error("Database create error: {0}")]
    DatabaseCreate(String),

    /// Another writer holds the database.
    #[error("Database lock error: {0}")]
    DatabaseLock(String),

    /// Generic read/write failure, including use after close.
    #[error("Database error: {0}")]
    Database(String),

    /// Stored data failed a checksum or structural check.
    #[error("Database corrupt: {0}")]
    DatabaseCorrupt(String),

    /// A document id was not present.
    #[error("Document {0} not found")]
    DocNotFound(DocId),

    /// Malformed caller input.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The requested operation is not supported in the current state.
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    /// The query string could not be parsed.
    #[error("Query parser error: {0}")]
    QueryParser(String),

    /// A serialised query or document could not be decoded.
    #[error("Serialisation error: {0}")]
    Serialisation(String),

    /// A wildcard expanded to more terms than allowed.
    #[error("Wildcard error: {0}")]
    Wildcard(String),

    /// A value range could not be interpreted.
    #[error("Range error: {0}")]
    Range(String),

    /// The feature is not implemented for this combination of inputs.
    #[error("Unimplemented: {0}")]
    Unimplemented(String),

    /// Error raised by a user-supplied callback, passed through unchanged.
    #[error(transparent)]
    Callback(Box<dyn StdError + Send + Sync>),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Coarse classification of a [`QuarryError`], convenient for matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    DatabaseOpening,
    DatabaseCreate,
    DatabaseLock,
    Database,
    DatabaseCorrupt,
    DocNotFound,
    InvalidArgument,
    InvalidOperation,
    QueryParser,
    Serialisation,
    Wildcard,
    Range,
    Unimplemented,
    Callback,
    Io,
}

impl QuarryError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            QuarryError::DatabaseOpening(_) => ErrorKind::DatabaseOpening,
            QuarryError::DatabaseCreate(_) => ErrorKind::DatabaseCreate,
            QuarryError::DatabaseLock(_) => ErrorKind::DatabaseLock,
            QuarryError::Database(_) => ErrorKind::Database,
            QuarryError::DatabaseCorrupt(_) => ErrorKind::DatabaseCorrupt,
            QuarryError::DocNotFound(_) => ErrorKind::DocNotFound,
            QuarryError::InvalidArgument(_) => ErrorKind::InvalidArgument,
            QuarryError::InvalidOperation(_) => ErrorKind::InvalidOperation,
            QuarryError::QueryParser(_) => ErrorKind::QueryParser,
            QuarryError::Serialisation(_) | QuarryError::Json(_) => ErrorKind::Serialisation,
            QuarryError::Wildcard(_) => ErrorKind::Wildcard,
            QuarryError::Range(_) => ErrorKind::Range,
            QuarryError::Unimplemented(_) => ErrorKind::Unimplemented,
            QuarryError::Callback(_) => ErrorKind::Callback,
            QuarryError::Io(_) => ErrorKind::Io,
        }
    }

    pub fn database_opening<S: Into<String>>(msg: S) -> Self {
        QuarryError::DatabaseOpening(msg.into())
    }

    pub fn database_create<S: Into<String>>(msg: S) -> Self {
        QuarryError::DatabaseCreate(msg.into())
    }

    pub fn database_lock<S: Into<String>>(msg: S) -> Self {
        QuarryError::DatabaseLock(msg.into())
    }

    pub fn database<S: Into<String>>(msg: S) -> Self {
        QuarryError::Database(msg.into())
    }

    pub fn corrupt<S: Into<String>>(msg: S) -> Self {
        QuarryError::DatabaseCorrupt(msg.into())
    }

    pub fn invalid_argument<S: Into<String>>(msg: S) -> Self {
        QuarryError::InvalidArgument(msg.into())
    }

    pub fn invalid_operation<S: Into<String>>(msg: S) -> Self {
        QuarryError::InvalidOperation(msg.into())
    }

    pub fn query_parser<S: Into<String>>(msg: S) -> Self {
        QuarryError::QueryParser(msg.into())
    }

    pub fn serialisation<S: Into<String>>(msg: S) -> Self {
        QuarryError::Serialisation(msg.into())
    }

    pub fn wildcard<S: Into<String>>(msg: S) -> Self {
        QuarryError::Wildcard(msg.into())
    }

    pub fn range<S: Into<String>>(msg: S) -> Self {
        QuarryError::Range(msg.into())
    }

    pub fn unimplemented<S: Into<String>>(msg: S) -> Self {
        QuarryError::Unimplemented(msg.into())
    }

    /// Wrap an error raised inside a user callback.
    pub fn callback<E>(err: E) -> Self
    where
        E: Into<Box<dyn StdError + Send + Sync>>,
    {
        QuarryError::Callback(err.into())
    }

    /// The error used for every operation on a closed database.
    pub(crate) fn closed() -> Self {
        QuarryError::Database("Database has been closed".to_string())
    }

    /// Borrow the inner callback error, if this is one.
    pub fn callback_error(&self) -> Option<&(dyn StdError + Send + Sync + 'static)> {
        match self {
            QuarryError::Callback(inner) => Some(inner.as_ref()),
            _ => None,
        }
    }
}
