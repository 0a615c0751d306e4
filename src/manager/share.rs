use crate::error::{PersistenceError, Result};
use crate::model::{Share, UserId};
use crate::persistence::{
    CloseExt, FinishExt, NodePersistenceController, SharePersistenceController, ShareScope,
};
use std::sync::Arc;
use tracing::{debug, error};

/// Creates shares while keeping them un-nested.
#[derive(Clone)]
pub struct ShareManager {
    nodes: Arc<dyn NodePersistenceController>,
    shares: Arc<dyn SharePersistenceController>,
}

impl ShareManager {
    /// Manager over the node and share controllers of one backend.
    pub fn new(
        nodes: Arc<dyn NodePersistenceController>,
        shares: Arc<dyn SharePersistenceController>,
    ) -> Self {
        Self { nodes, shares }
    }

    /// Shares `share.node_id` (owned by `user`) with `share.shared_with_id`
    /// under the node's current name.
    ///
    /// The target is resolved in a short read transaction that is closed
    /// before the write transaction starts; a change to the target between
    /// the two is not detected.
    ///
    /// # Errors
    /// * `NodeNotFound` - `user` does not own the node
    /// * `ShareContainsOtherShares` / `ShareIsInsideShare` - the share would nest
    /// * `UserNotFound` - the recipient has no root folder
    pub fn create_share(&self, user: &UserId, share: &Share) -> Result<bool> {
        let tx = self.nodes.start_read()?;
        let result = tx.get_by_id(user, &share.node_id, ShareScope::None);
        let node = tx.close_with(result)?;

        let mut tx = self.shares.start_read_write()?;
        let result = (|| {
            if tx.node_contains_nested_shares(&share.node_id)? {
                debug!(node_id = %share.node_id, "subtree already holds shares");
                return Err(PersistenceError::ShareContainsOtherShares);
            }
            if tx.node_is_inside_share(&share.node_id)? {
                debug!(node_id = %share.node_id, "ancestor already shared");
                return Err(PersistenceError::ShareIsInsideShare);
            }
            tx.create_share(user, share, &node.name)
        })();
        if let Err(err) = &result {
            if !err.kind().is_client_error() {
                error!(node_id = %share.node_id, error = %err, "failed to create share");
            }
        }
        tx.finish_with(result)
    }
}
