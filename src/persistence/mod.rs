//! Backend-neutral persistence contracts.
//!
//! Managers only see these traits. A backend provides one controller per
//! concern; each controller hands out boxed transactions whose operations
//! are grouped into small `*Ops` traits so read handles never expose writes.

pub mod registry;

use crate::error::{PersistenceError, Result};
use crate::model::{Node, NodeId, NodeType, Session, Share, Token, User, UserId};
use std::sync::Arc;
use time::OffsetDateTime;
use tracing::error;

pub use registry::{PluginLifecycle, PluginRegistry};

/// Which edges a traversal may cross besides the user's own tree.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ShareScope {
    /// Own tree only.
    #[default]
    None,
    /// Own tree plus every share.
    Read,
    /// Own tree plus read-write shares.
    ReadWrite,
}

impl ShareScope {
    /// Numeric form bound into traversal queries.
    pub fn code(self) -> i64 {
        match self {
            ShareScope::None => 0,
            ShareScope::Read => 1,
            ShareScope::ReadWrite => 2,
        }
    }
}

/// Handle of a read-only transaction.
pub trait ReadTransaction: Send {
    /// Ends the transaction and releases its session.
    fn close(self: Box<Self>) -> Result<()>;
}

/// Handle of a read-write transaction.
pub trait ReadWriteTransaction: Send {
    /// Persists all changes and releases the session.
    ///
    /// Any failure, including one while releasing the session after a
    /// successful write, is reported as [`PersistenceError::Commit`].
    fn commit(self: Box<Self>) -> Result<()>;

    /// Discards all changes. Secondary failures are logged, never returned.
    fn rollback(self: Box<Self>);

    /// Rolls back and returns `prior` when set, commits otherwise.
    fn finish(self: Box<Self>, prior: Option<PersistenceError>) -> Result<()> {
        match prior {
            Some(err) => {
                self.rollback();
                Err(err)
            }
            None => self.commit(),
        }
    }
}

/// `finish` for operation results.
pub trait FinishExt {
    /// Commits and yields the value on `Ok`, rolls back and returns the error
    /// unchanged on `Err`.
    fn finish_with<T>(self, result: Result<T>) -> Result<T>;
}

impl<Tx: ReadWriteTransaction + ?Sized> FinishExt for Box<Tx> {
    fn finish_with<T>(self, result: Result<T>) -> Result<T> {
        match result {
            Ok(value) => self.finish(None).map(|()| value),
            Err(err) => {
                self.rollback();
                Err(err)
            }
        }
    }
}

/// `close` for operation results.
pub trait CloseExt {
    /// Closes the handle. A close failure only surfaces when `result` is `Ok`.
    fn close_with<T>(self, result: Result<T>) -> Result<T>;
}

impl<Tx: ReadTransaction + ?Sized> CloseExt for Box<Tx> {
    fn close_with<T>(self, result: Result<T>) -> Result<T> {
        match (result, self.close()) {
            (Ok(value), Ok(())) => Ok(value),
            (Ok(_), Err(close_err)) => Err(close_err),
            (Err(err), Ok(())) => Err(err),
            (Err(err), Err(close_err)) => {
                error!(error = %close_err, "failed to close read transaction");
                Err(err)
            }
        }
    }
}

/// Node lookups.
pub trait NodeReadOps {
    /// Resolves `path` from `user`'s root. The empty path is the root folder.
    fn get_by_path(&self, user: &UserId, path: &str, scope: ShareScope) -> Result<Node>;
    /// Resolves `node` as reachable from `user`, reconstructing its path.
    fn get_by_id(&self, user: &UserId, node: &NodeId, scope: ShareScope) -> Result<Node>;
    /// Children of the folder `node`, ordered by name. Files have none.
    fn list_by_id(&self, user: &UserId, node: &NodeId, scope: ShareScope) -> Result<Vec<Node>>;
}

/// Idempotent node creation.
pub trait NodeWriteOps {
    /// Creates `user`'s root folder unless it exists. Returns whether it was created.
    fn create_user_root_folder(&mut self, user: &UserId) -> Result<bool>;
    /// Creates `name` under `parent` unless an entry of that name exists.
    fn create_node_by_id(
        &mut self,
        user: &UserId,
        node_type: NodeType,
        parent: &NodeId,
        name: &str,
    ) -> Result<(Node, bool)>;
}

/// Share-nesting checks.
pub trait ShareReadOps {
    /// True when sharing `node` would nest shares: its subtree already holds
    /// share edges or a strict descendant is shared.
    fn node_contains_nested_shares(&self, node: &NodeId) -> Result<bool>;
    /// True when a strict ancestor of `node` is shared.
    fn node_is_inside_share(&self, node: &NodeId) -> Result<bool>;
}

/// Share creation.
pub trait ShareWriteOps {
    /// Links `share.node_id` into the recipient's root under `display_name`.
    /// Returns `false` if that share already exists; existing shares are
    /// never modified.
    fn create_share(&mut self, user: &UserId, share: &Share, display_name: &str) -> Result<bool>;
}

/// User lookups.
pub trait UserReadOps {
    /// Number of registered users.
    fn count_users(&self) -> Result<u64>;
    /// User by id.
    fn get_user_by_id(&self, user: &UserId) -> Result<User>;
    /// User by email.
    fn get_user_by_email(&self, email: &str) -> Result<User>;
}

/// User writes.
pub trait UserWriteOps {
    /// Stores a new user, assigning id and timestamps.
    fn save_user(&mut self, user: &mut User) -> Result<()>;
    /// Overwrites the stored properties of an existing user.
    fn update_user(&mut self, user: &mut User) -> Result<()>;
}

/// Session lookups.
pub trait AuthReadOps {
    /// Session by token, expired or not.
    fn get_session_by_token(&self, token: &Token) -> Result<Session>;
}

/// Session writes.
pub trait AuthWriteOps {
    /// Stores a session and links it to its user.
    fn save_session(&mut self, session: &Session) -> Result<()>;
    /// Removes one session.
    fn delete_session_by_token(&mut self, token: &Token) -> Result<()>;
    /// Removes sessions that expired before `now`. Returns how many.
    fn delete_expired_sessions(&mut self, now: OffsetDateTime) -> Result<usize>;
}

macro_rules! transaction_trait {
    ($(#[$meta:meta])* $name:ident: $base:ident $(+ $ops:ident)+) => {
        $(#[$meta])*
        pub trait $name: $base $(+ $ops)+ {}
        impl<T: $base $(+ $ops)+ + ?Sized> $name for T {}
    };
}

transaction_trait!(
    /// Read transaction over nodes.
    NodeReadTransaction: ReadTransaction + NodeReadOps
);
transaction_trait!(
    /// Read-write transaction over nodes.
    NodeReadWriteTransaction: ReadWriteTransaction + NodeReadOps + NodeWriteOps
);
transaction_trait!(
    /// Read transaction over shares.
    ShareReadTransaction: ReadTransaction + ShareReadOps
);
transaction_trait!(
    /// Read-write transaction over shares.
    ShareReadWriteTransaction: ReadWriteTransaction + ShareReadOps + ShareWriteOps
);
transaction_trait!(
    /// Read transaction over users.
    UserReadTransaction: ReadTransaction + UserReadOps
);
transaction_trait!(
    /// Read-write transaction over users.
    UserReadWriteTransaction: ReadWriteTransaction + UserReadOps + UserWriteOps
);
transaction_trait!(
    /// Read transaction over sessions.
    AuthReadTransaction: ReadTransaction + AuthReadOps
);
transaction_trait!(
    /// Read-write transaction over sessions.
    AuthReadWriteTransaction: ReadWriteTransaction + AuthReadOps + AuthWriteOps
);

macro_rules! controller_trait {
    ($(#[$meta:meta])* $name:ident => $read:ident, $write:ident) => {
        $(#[$meta])*
        pub trait $name: Send + Sync {
            /// Opens a read transaction.
            fn start_read(&self) -> Result<Box<dyn $read>>;
            /// Opens a read-write transaction.
            fn start_read_write(&self) -> Result<Box<dyn $write>>;
        }
    };
}

controller_trait!(
    /// Entry point for node transactions.
    NodePersistenceController => NodeReadTransaction, NodeReadWriteTransaction
);
controller_trait!(
    /// Entry point for share transactions.
    SharePersistenceController => ShareReadTransaction, ShareReadWriteTransaction
);
controller_trait!(
    /// Entry point for user transactions.
    UserPersistenceController => UserReadTransaction, UserReadWriteTransaction
);
controller_trait!(
    /// Entry point for session transactions.
    AuthPersistenceController => AuthReadTransaction, AuthReadWriteTransaction
);

/// An initialised backend.
pub trait PersistenceBackend: Send + Sync {
    /// Registry key the backend was created under.
    fn name(&self) -> &str;
    /// Node controller.
    fn nodes(&self) -> Arc<dyn NodePersistenceController>;
    /// Share controller.
    fn shares(&self) -> Arc<dyn SharePersistenceController>;
    /// User controller.
    fn users(&self) -> Arc<dyn UserPersistenceController>;
    /// Session controller.
    fn auth(&self) -> Arc<dyn AuthPersistenceController>;
    /// Releases the backend. Later transactions fail as unavailable.
    fn close(&self) -> Result<()>;
}
