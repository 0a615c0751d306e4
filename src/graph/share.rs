//! Share edges and the no-nesting rule.
//!
//! A share is a `CONTAINS_SHARED` edge from the recipient's root folder to
//! the shared node, carrying the display name and the share itself. Shares
//! never nest: a shared subtree may neither contain another shared node nor
//! sit below one.

use super::classify::SqliteResultExt;
use super::node::owner_of;
use super::transaction::{AccessMode, GraphTx, ReadWrite};
use super::{find_node_row, insert_edge};
use crate::error::{PersistenceError, Result};
use crate::mapping::to_storage_map;
use crate::model::{
    ContainsRelation, NodeId, Share, ShareMode, UserId, EDGE_CONTAINS_SHARED, LABEL_NODE,
};
use crate::path;
use crate::persistence::{ShareReadOps, ShareWriteOps};
use rusqlite::{named_params, params, Connection, OptionalExtension};
use tracing::{debug, info};

fn node_row(conn: &Connection, node: &NodeId) -> Result<i64> {
    find_node_row(conn, LABEL_NODE, node.as_str())?.ok_or(PersistenceError::NodeNotFound)
}

impl<M: AccessMode> ShareReadOps for GraphTx<M> {
    fn node_contains_nested_shares(&self, node: &NodeId) -> Result<bool> {
        let conn = self.conn()?;
        let row = node_row(conn, node)?;
        let nested: bool = conn
            .query_row(
                "WITH RECURSIVE sub(node, depth) AS (
                     SELECT :row, 0
                     UNION ALL
                     SELECT e.target_id, sub.depth + 1
                     FROM sub JOIN edges e ON e.source_id = sub.node
                     WHERE e.type_name = 'CONTAINS' AND sub.depth < :max_depth
                 )
                 SELECT EXISTS (
                     SELECT 1 FROM sub JOIN edges e ON e.source_id = sub.node
                     WHERE e.type_name = 'CONTAINS_SHARED'
                 ) OR EXISTS (
                     SELECT 1 FROM sub JOIN edges e ON e.target_id = sub.node
                     WHERE e.type_name = 'CONTAINS_SHARED' AND sub.depth > 0
                 )",
                named_params! { ":row": row, ":max_depth": self.max_depth() as i64 },
                |r| r.get(0),
            )
            .read()?;
        debug!(node_id = %node, nested, "checked subtree for shares");
        Ok(nested)
    }

    fn node_is_inside_share(&self, node: &NodeId) -> Result<bool> {
        let conn = self.conn()?;
        let row = node_row(conn, node)?;
        let inside: bool = conn
            .query_row(
                "WITH RECURSIVE up(node, depth) AS (
                     SELECT :row, 0
                     UNION ALL
                     SELECT e.source_id, up.depth + 1
                     FROM up JOIN edges e ON e.target_id = up.node
                     WHERE e.type_name = 'CONTAINS' AND up.depth < :max_depth
                 )
                 SELECT EXISTS (
                     SELECT 1 FROM up JOIN edges e ON e.target_id = up.node
                     WHERE e.type_name = 'CONTAINS_SHARED' AND up.depth > 0
                 )",
                named_params! { ":row": row, ":max_depth": self.max_depth() as i64 },
                |r| r.get(0),
            )
            .read()?;
        debug!(node_id = %node, inside, "checked ancestors for shares");
        Ok(inside)
    }
}

impl ShareWriteOps for GraphTx<ReadWrite> {
    fn create_share(&mut self, user: &UserId, share: &Share, display_name: &str) -> Result<bool> {
        if !path::is_valid_name(display_name) {
            return Err(PersistenceError::invalid(format!(
                "'{display_name}' is not a valid share name"
            )));
        }
        if share.mode == ShareMode::None {
            return Err(PersistenceError::invalid("share mode must be read or read_write"));
        }
        if share.shared_with_id == *user {
            return Err(PersistenceError::invalid("cannot share a node with its owner"));
        }
        let conn = self.conn()?;
        let target = node_row(conn, &share.node_id)?;
        if owner_of(conn, target, self.max_depth())? != *user {
            debug!(user_id = %user, node_id = %share.node_id, "sharer does not own node");
            return Err(PersistenceError::NodeNotFound);
        }
        let recipient_root: i64 = conn
            .query_row(
                "SELECT e.target_id
                 FROM nodes u JOIN edges e ON e.source_id = u.id AND e.type_name = 'HAS_ROOT_FOLDER'
                 WHERE instr(u.labels, ':User:') > 0 AND json_extract(u.properties, '$.id') = ?1",
                [share.shared_with_id.as_str()],
                |r| r.get(0),
            )
            .read_or(PersistenceError::UserNotFound)?;
        let existing: Option<i64> = conn
            .query_row(
                "SELECT id FROM edges WHERE source_id = ?1 AND target_id = ?2 AND type_name = ?3",
                params![recipient_root, target, EDGE_CONTAINS_SHARED],
                |r| r.get(0),
            )
            .optional()
            .read()?;
        if existing.is_some() {
            debug!(node_id = %share.node_id, shared_with = %share.shared_with_id, "share exists");
            return Ok(false);
        }
        let stored = Share {
            owner_id: user.clone(),
            ..share.clone()
        };
        let mut props = to_storage_map(&ContainsRelation {
            name: display_name.trim().to_string(),
        });
        props.extend(to_storage_map(&stored));
        insert_edge(conn, recipient_root, target, EDGE_CONTAINS_SHARED, &props)?;
        info!(
            user_id = %user,
            node_id = %share.node_id,
            shared_with = %share.shared_with_id,
            mode = %share.mode,
            "share created"
        );
        Ok(true)
    }
}
