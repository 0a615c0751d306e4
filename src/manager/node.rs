use crate::error::Result;
use crate::model::{Node, NodeId, NodeType, UserId};
use crate::path;
use crate::persistence::{CloseExt, FinishExt, NodePersistenceController, ShareScope};
use std::sync::Arc;
use tracing::error;

/// File tree operations on behalf of a user. Reads see shares.
#[derive(Clone)]
pub struct NodeManager {
    nodes: Arc<dyn NodePersistenceController>,
}

impl NodeManager {
    /// Manager over `nodes`.
    pub fn new(nodes: Arc<dyn NodePersistenceController>) -> Self {
        Self { nodes }
    }

    /// Creates `user`'s root folder if missing.
    pub fn create_user_root_folder(&self, user: &UserId) -> Result<bool> {
        let mut tx = self.nodes.start_read_write()?;
        let result = tx.create_user_root_folder(user);
        if let Err(err) = &result {
            error!(user_id = %user, error = %err, "failed to create root folder");
        }
        tx.finish_with(result)
    }

    /// Node at `path`, including shared entries.
    pub fn get_by_path(&self, user: &UserId, node_path: &str) -> Result<Node> {
        let tx = self.nodes.start_read()?;
        let result = tx.get_by_path(user, node_path, ShareScope::Read);
        tx.close_with(result)
    }

    /// Node by id, including nodes reached through shares.
    pub fn get_by_id(&self, user: &UserId, node: &NodeId) -> Result<Node> {
        let tx = self.nodes.start_read()?;
        let result = tx.get_by_id(user, node, ShareScope::Read);
        tx.close_with(result)
    }

    /// Children of `node`.
    pub fn list_by_id(&self, user: &UserId, node: &NodeId) -> Result<Vec<Node>> {
        let tx = self.nodes.start_read()?;
        let result = tx.list_by_id(user, node, ShareScope::Read);
        tx.close_with(result)
    }

    /// Creates `name` under the folder `parent`.
    pub fn create_node(
        &self,
        user: &UserId,
        node_type: NodeType,
        parent: &NodeId,
        name: &str,
    ) -> Result<(Node, bool)> {
        let mut tx = self.nodes.start_read_write()?;
        let result = tx.create_node_by_id(user, node_type, parent, name);
        tx.finish_with(result)
    }

    /// Creates the last segment of `node_path` inside its (existing) parent
    /// folder, in one transaction.
    pub fn create_node_by_path(
        &self,
        user: &UserId,
        node_type: NodeType,
        node_path: &str,
    ) -> Result<(Node, bool)> {
        let normalized = path::normalize(node_path);
        let (parent_path, name) = path::split(&normalized);
        let mut tx = self.nodes.start_read_write()?;
        let result = tx
            .get_by_path(user, parent_path, ShareScope::ReadWrite)
            .and_then(|parent| tx.create_node_by_id(user, node_type, &parent.id, name));
        tx.finish_with(result)
    }
}
