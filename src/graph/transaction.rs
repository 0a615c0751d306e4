//! Transaction handles over a dedicated SQLite session.
//!
//! A handle owns its connection for its whole life: `BEGIN` on creation,
//! `COMMIT`/`ROLLBACK` and connection close when finished. The access mode
//! is a type parameter, so a [`GraphTx<Read>`] has no way to reach the write
//! operations.

use super::classify::{classify, Access};
use crate::error::{PersistenceError, Result};
use crate::persistence::{ReadTransaction, ReadWriteTransaction};
use rusqlite::{Connection, ErrorCode};
use std::marker::PhantomData;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

mod sealed {
    pub trait Sealed {}
}

/// Access mode marker.
pub trait AccessMode: sealed::Sealed + Send + 'static {
    /// `BEGIN` statement opening the transaction.
    const BEGIN: &'static str;
    /// Label used in logs.
    const NAME: &'static str;
}

/// Read-only access.
#[derive(Debug)]
pub enum Read {}

/// Read-write access.
#[derive(Debug)]
pub enum ReadWrite {}

impl sealed::Sealed for Read {}
impl sealed::Sealed for ReadWrite {}

impl AccessMode for Read {
    const BEGIN: &'static str = "BEGIN DEFERRED";
    const NAME: &'static str = "read";
}

impl AccessMode for ReadWrite {
    const BEGIN: &'static str = "BEGIN IMMEDIATE";
    const NAME: &'static str = "read_write";
}

/// The state of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxState {
    /// Accepting operations.
    Active,
    /// Changes persisted (or, for reads, closed normally).
    Committed,
    /// Changes discarded.
    RolledBack,
}

/// Settings copied into each transaction.
#[derive(Debug, Clone, Copy)]
pub(crate) struct TxLimits {
    pub timeout: Duration,
    pub max_depth: u32,
}

/// A transaction bound to its own session.
#[derive(Debug)]
pub struct GraphTx<M: AccessMode> {
    conn: Option<Connection>,
    id: u64,
    state: TxState,
    started: Instant,
    limits: TxLimits,
    _mode: PhantomData<M>,
}

impl<M: AccessMode> GraphTx<M> {
    /// Starts a transaction on `conn`, which the handle now owns.
    ///
    /// Statements running past the timeout are interrupted by SQLite and
    /// surface as [`PersistenceError::TransactionAborted`]. Lock contention
    /// outlasting the busy timeout is a creation failure; an unreachable
    /// database file is reported as unavailable.
    pub(crate) fn begin(conn: Connection, id: u64, limits: TxLimits) -> Result<Self> {
        let started = Instant::now();
        let deadline = started + limits.timeout;
        conn.progress_handler(1_000, Some(move || Instant::now() > deadline));
        if let Err(err) = conn.execute_batch(M::BEGIN) {
            let contended = matches!(
                &err,
                rusqlite::Error::SqliteFailure(failure, _)
                    if matches!(failure.code, ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked)
            );
            let source = match classify(err, PersistenceError::TransactionClosed, Access::Write) {
                unavailable @ PersistenceError::Unavailable { .. } if !contended => {
                    return Err(unavailable)
                }
                other => Box::new(other),
            };
            return Err(PersistenceError::TransactionCreation { source });
        }
        debug!(tx_id = id, mode = M::NAME, "transaction started");
        Ok(Self {
            conn: Some(conn),
            id,
            state: TxState::Active,
            started,
            limits,
            _mode: PhantomData,
        })
    }

    /// Identifier used in logs.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Current lifecycle state.
    pub fn state(&self) -> TxState {
        self.state
    }

    /// Bound on variable-length traversals.
    pub(crate) fn max_depth(&self) -> u32 {
        self.limits.max_depth
    }

    /// The session, if the transaction is still usable.
    pub(crate) fn conn(&self) -> Result<&Connection> {
        if self.state != TxState::Active {
            return Err(PersistenceError::TransactionClosed);
        }
        self.check_deadline()?;
        self.conn.as_ref().ok_or(PersistenceError::TransactionClosed)
    }

    fn check_deadline(&self) -> Result<()> {
        let elapsed = self.started.elapsed();
        if elapsed <= self.limits.timeout {
            return Ok(());
        }
        let timeout_ms = self.limits.timeout.as_millis() as u64;
        warn!(
            tx_id = self.id,
            elapsed_ms = elapsed.as_millis() as u64,
            timeout_ms,
            "transaction timeout exceeded"
        );
        Err(PersistenceError::TransactionTimeout { timeout_ms })
    }

    /// Rolls back an expired transaction instead of ending it normally.
    fn expire_if_overdue(&mut self) -> Result<()> {
        if let Err(err) = self.check_deadline() {
            self.rollback_in_place();
            return Err(err);
        }
        Ok(())
    }

    fn close_session(&mut self) -> Result<()> {
        match self.conn.take() {
            Some(conn) => conn
                .close()
                .map_err(|(_, err)| PersistenceError::CloseSession {
                    source: Box::new(err),
                }),
            None => Ok(()),
        }
    }

    fn rollback_in_place(&mut self) {
        if let Some(conn) = self.conn.as_ref() {
            if let Err(err) = conn.execute_batch("ROLLBACK") {
                error!(tx_id = self.id, error = %err, "rollback failed");
            }
        }
        self.state = TxState::RolledBack;
        if let Err(err) = self.close_session() {
            error!(tx_id = self.id, error = %err, "failed to close session after rollback");
        }
    }
}

impl ReadTransaction for GraphTx<Read> {
    fn close(mut self: Box<Self>) -> Result<()> {
        if self.state != TxState::Active {
            return Err(PersistenceError::TransactionClosed);
        }
        self.expire_if_overdue()?;
        let ended = match self.conn.as_ref() {
            Some(conn) => conn.execute_batch("COMMIT"),
            None => Ok(()),
        };
        self.state = TxState::Committed;
        let closed = self.close_session();
        ended.map_err(|err| PersistenceError::CloseSession {
            source: Box::new(err),
        })?;
        closed?;
        debug!(tx_id = self.id, "read transaction closed");
        Ok(())
    }
}

impl ReadWriteTransaction for GraphTx<ReadWrite> {
    fn commit(mut self: Box<Self>) -> Result<()> {
        if self.state != TxState::Active {
            return Err(PersistenceError::TransactionClosed);
        }
        self.expire_if_overdue()?;
        let committed = match self.conn.as_ref() {
            Some(conn) => conn.execute_batch("COMMIT"),
            None => return Err(PersistenceError::TransactionClosed),
        };
        if let Err(err) = committed {
            error!(tx_id = self.id, error = %err, "commit failed");
            self.rollback_in_place();
            return Err(PersistenceError::Commit {
                source: Box::new(err),
            });
        }
        self.state = TxState::Committed;
        if let Err(err) = self.close_session() {
            error!(tx_id = self.id, error = %err, "failed to close session after commit");
            return Err(PersistenceError::Commit {
                source: Box::new(err),
            });
        }
        info!(
            tx_id = self.id,
            duration_ms = self.started.elapsed().as_millis() as u64,
            "transaction committed"
        );
        Ok(())
    }

    fn rollback(mut self: Box<Self>) {
        if self.state != TxState::Active {
            return;
        }
        self.rollback_in_place();
        warn!(tx_id = self.id, "transaction rolled back");
    }
}

impl<M: AccessMode> Drop for GraphTx<M> {
    fn drop(&mut self) {
        if self.state == TxState::Active && self.conn.is_some() {
            warn!(
                tx_id = self.id,
                mode = M::NAME,
                "transaction dropped while active; rolling back"
            );
            self.rollback_in_place();
        }
    }
}
