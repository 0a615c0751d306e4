//! Orchestration on top of the persistence controllers.
//!
//! Each manager operation runs its own transaction(s) and always ends them:
//! reads through [`CloseExt::close_with`](crate::persistence::CloseExt), writes
//! through [`FinishExt::finish_with`](crate::persistence::FinishExt).

mod auth;
mod cleanup;
mod node;
mod share;

pub use auth::AuthManager;
pub use cleanup::{run_session_cleanup, spawn_session_cleanup};
pub use node::NodeManager;
pub use share::ShareManager;

use crate::config::AuthConfig;
use crate::persistence::PersistenceBackend;
use std::sync::Arc;

/// All managers over one backend.
#[derive(Clone)]
pub struct Managers {
    /// File tree operations.
    pub nodes: NodeManager,
    /// Share creation.
    pub shares: ShareManager,
    /// Accounts and sessions, shared with the cleanup task.
    pub auth: Arc<AuthManager>,
}

impl Managers {
    /// Wires every manager to the controllers of `backend`.
    pub fn new(backend: &dyn PersistenceBackend, auth: AuthConfig) -> Self {
        Self {
            nodes: NodeManager::new(backend.nodes()),
            shares: ShareManager::new(backend.nodes(), backend.shares()),
            auth: Arc::new(AuthManager::new(
                backend.users(),
                backend.auth(),
                backend.nodes(),
                auth,
            )),
        }
    }
}
