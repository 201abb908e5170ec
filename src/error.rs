use std::{error::Error, fmt};

use backtrace::Backtrace;
use log::error;

/// Coarse classification of a database failure. The kind is what callers
/// dispatch on; the details are for humans.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// A lock acquisition timed out. Fatal for the requesting transaction,
    /// which is expected to unwind and abort.
    TransactionAborted,

    /// Generic database-layer failure: cache full of dirty pages, schema
    /// mismatch, structural violation.
    Database,

    /// Underlying file read/write failure.
    Io,

    /// Iterator exhaustion, or an access to an empty slot.
    NoSuchElement,

    /// The caller asked for something the component cannot do, e.g. a
    /// string aggregation other than COUNT.
    InvalidArgument,
}

#[derive(Debug, Clone)]
pub struct DbError {
    kind: ErrorKind,
    details: String,
}

impl DbError {
    pub fn new(kind: ErrorKind, msg: &str) -> DbError {
        DbError {
            kind,
            details: msg.to_string(),
        }
    }

    pub fn aborted(msg: &str) -> DbError {
        Self::new(ErrorKind::TransactionAborted, msg)
    }

    pub fn database(msg: &str) -> DbError {
        Self::new(ErrorKind::Database, msg)
    }

    pub fn io(msg: &str) -> DbError {
        Self::new(ErrorKind::Io, msg)
    }

    pub fn no_such_element(msg: &str) -> DbError {
        Self::new(ErrorKind::NoSuchElement, msg)
    }

    pub fn invalid_argument(msg: &str) -> DbError {
        Self::new(ErrorKind::InvalidArgument, msg)
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn show_backtrace(&self) {
        error!("{}\n{:?}", self, Backtrace::new());
    }
}

impl fmt::Display for DbError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.details)
    }
}

impl Error for DbError {}
