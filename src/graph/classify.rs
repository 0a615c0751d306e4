//! Maps SQLite failures onto [`PersistenceError`].

use crate::error::{PersistenceError, Result};
use rusqlite::ErrorCode;

/// Whether the failing statement was reading or writing. Selects the
/// fallback variant for unclassified failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Access {
    Read,
    Write,
}

/// Classifies `err`. An empty result becomes `not_found`.
pub(crate) fn classify(
    err: rusqlite::Error,
    not_found: PersistenceError,
    access: Access,
) -> PersistenceError {
    if matches!(err, rusqlite::Error::QueryReturnedNoRows) {
        return not_found;
    }
    let code = match &err {
        rusqlite::Error::SqliteFailure(failure, _) => Some(failure.code),
        _ => None,
    };
    let source = Box::new(err);
    match code {
        Some(
            ErrorCode::CannotOpen
            | ErrorCode::NotADatabase
            | ErrorCode::SystemIoFailure
            | ErrorCode::DatabaseBusy
            | ErrorCode::DatabaseLocked,
        ) => PersistenceError::Unavailable { source },
        Some(
            ErrorCode::PermissionDenied
            | ErrorCode::AuthorizationForStatementDenied
            | ErrorCode::ReadOnly,
        ) => PersistenceError::Authentication { source },
        Some(ErrorCode::ConstraintViolation) => PersistenceError::ConstraintViolation { source },
        Some(ErrorCode::OperationInterrupted) => PersistenceError::TransactionAborted { source },
        _ => match access {
            Access::Read => PersistenceError::Read { source },
            Access::Write => PersistenceError::Write { source },
        },
    }
}

/// Classification helpers for `rusqlite::Result`.
pub(crate) trait SqliteResultExt<T> {
    /// Classifies a failed read; no rows means `not_found`.
    fn read_or(self, not_found: PersistenceError) -> Result<T>;
    /// Classifies a failed write; no rows means `not_found`.
    fn write_or(self, not_found: PersistenceError) -> Result<T>;
    /// Classifies a failed read where an empty result is itself unexpected.
    fn read(self) -> Result<T>;
    /// Classifies a failed write where an empty result is itself unexpected.
    fn write(self) -> Result<T>;
}

impl<T> SqliteResultExt<T> for rusqlite::Result<T> {
    fn read_or(self, not_found: PersistenceError) -> Result<T> {
        self.map_err(|err| classify(err, not_found, Access::Read))
    }

    fn write_or(self, not_found: PersistenceError) -> Result<T> {
        self.map_err(|err| classify(err, not_found, Access::Write))
    }

    fn read(self) -> Result<T> {
        self.map_err(|err| fallback(err, Access::Read))
    }

    fn write(self) -> Result<T> {
        self.map_err(|err| fallback(err, Access::Write))
    }
}

fn fallback(err: rusqlite::Error, access: Access) -> PersistenceError {
    let empty = match access {
        Access::Read => PersistenceError::Read {
            source: "query returned no rows".into(),
        },
        Access::Write => PersistenceError::Write {
            source: "statement returned no rows".into(),
        },
    };
    classify(err, empty, access)
}
