//! Error types shared by every persistence operation.
//!
//! Each variant is a concrete failure; [`PersistenceError::kind`] folds them
//! into the coarse [`ErrorKind`] taxonomy that callers branch on.

use std::io;
use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, PersistenceError>;

/// Boxed backend cause, attached for diagnostics.
pub type Cause = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Coarse classification of a [`PersistenceError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// An entity is absent. Expected outcome, not logged as an error.
    NotFound,
    /// A business invariant or uniqueness rule was violated.
    Invariant,
    /// Beginning, committing, rolling back or closing a transaction failed.
    TransactionLifecycle,
    /// The backing store is unreachable or refused our credentials.
    BackendUnavailable,
    /// Mapping between entities and graph properties failed.
    ModelConversion,
    /// Caller-supplied input is malformed.
    Validation,
    /// Any other backend read/write failure.
    Internal,
}

impl ErrorKind {
    /// Whether the failure is the caller's to fix (reported as a client error).
    pub fn is_client_error(self) -> bool {
        matches!(
            self,
            ErrorKind::NotFound | ErrorKind::Invariant | ErrorKind::Validation
        )
    }
}

/// Every failure a persistence operation can report.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("node not found")]
    NodeNotFound,
    #[error("user not found")]
    UserNotFound,
    #[error("session not found")]
    SessionNotFound,
    #[error("session expired")]
    SessionExpired,
    #[error("node contains other shares")]
    ShareContainsOtherShares,
    #[error("node is inside an existing share")]
    ShareIsInsideShare,
    #[error("email '{0}' is already registered")]
    EmailAlreadyRegistered(String),
    #[error("constraint violated: {source}")]
    ConstraintViolation { source: Cause },

    #[error("failed to begin transaction: {source}")]
    TransactionCreation { source: Cause },
    #[error("failed to commit transaction: {source}")]
    Commit { source: Cause },
    #[error("failed to close session: {source}")]
    CloseSession { source: Cause },
    #[error("transaction aborted by the backend: {source}")]
    TransactionAborted { source: Cause },
    #[error("transaction exceeded its {timeout_ms}ms timeout")]
    TransactionTimeout { timeout_ms: u64 },
    #[error("transaction is no longer active")]
    TransactionClosed,

    #[error("backend unavailable: {source}")]
    Unavailable { source: Cause },
    #[error("backend refused access: {source}")]
    Authentication { source: Cause },

    #[error("cannot convert field '{field}' of {model}: {reason}")]
    ModelConversion {
        model: &'static str,
        field: String,
        reason: String,
    },

    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("node is not a folder")]
    NotAFolder,

    #[error("read failed: {source}")]
    Read { source: Cause },
    #[error("write failed: {source}")]
    Write { source: Cause },

    #[error("no persistence backend registered under '{0}'")]
    UnknownBackend(String),
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl PersistenceError {
    /// Maps the concrete failure onto the error taxonomy.
    pub fn kind(&self) -> ErrorKind {
        use PersistenceError::*;
        match self {
            NodeNotFound | UserNotFound | SessionNotFound | SessionExpired => ErrorKind::NotFound,
            ShareContainsOtherShares
            | ShareIsInsideShare
            | EmailAlreadyRegistered(_)
            | ConstraintViolation { .. } => ErrorKind::Invariant,
            TransactionCreation { .. }
            | Commit { .. }
            | CloseSession { .. }
            | TransactionAborted { .. }
            | TransactionTimeout { .. }
            | TransactionClosed => ErrorKind::TransactionLifecycle,
            Unavailable { .. } | Authentication { .. } => ErrorKind::BackendUnavailable,
            ModelConversion { .. } => ErrorKind::ModelConversion,
            InvalidInput(_) | NotAFolder | UnknownBackend(_) => ErrorKind::Validation,
            Read { .. } | Write { .. } | Io(_) => ErrorKind::Internal,
        }
    }

    /// Shorthand for `self.kind() == ErrorKind::NotFound`.
    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }

    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        PersistenceError::InvalidInput(msg.into())
    }
}
