//! Node resolution and creation.
//!
//! Resolution walks the graph from the requesting user. Display names live on
//! the crossed edges, so the same stored node can show up under different
//! names and paths for different users. Ownership is always derived from the
//! non-share path back to a user, independent of how the node was reached.

use super::classify::SqliteResultExt;
use super::transaction::{AccessMode, GraphTx, ReadWrite};
use super::{find_node_row, has_label, insert_edge, insert_node, load_node_row};
use crate::error::{PersistenceError, Result};
use crate::mapping::{hydrate_new, to_storage_map, GraphModel};
use crate::model::{
    ContainsRelation, Node, NodeId, NodeType, ShareMode, UserId, EDGE_CONTAINS,
    EDGE_HAS_ROOT_FOLDER, LABEL_FOLDER, LABEL_NODE, LABEL_USER,
};
use crate::path;
use crate::persistence::{NodeReadOps, NodeWriteOps, ShareScope};
use rusqlite::{named_params, Connection, OptionalExtension};
use time::OffsetDateTime;
use tracing::{debug, info};

/// Edge filter shared by the scoped traversals. Share edges take part only
/// when `:scope` admits them; scope 2 only admits read-write shares.
/// Legacy edges store the mode as an integer, where 2 is read-write.
const SCOPED_EDGE: &str = "(e.type_name IN ('HAS_ROOT_FOLDER', 'CONTAINS')
      OR (e.type_name = 'CONTAINS_SHARED' AND :scope > 0
          AND (:scope = 1 OR json_extract(e.properties, '$.share_mode') IN ('read_write', 2))))";

/// Share mode of edge `e` as text, with legacy integer modes translated.
const EDGE_SHARE_MODE: &str = "CASE json_extract(e.properties, '$.share_mode')
          WHEN 2 THEN 'read_write' WHEN 1 THEN 'read' WHEN 0 THEN 'none'
          ELSE json_extract(e.properties, '$.share_mode') END";

/// Where a traversal ended and how it got there.
#[derive(Debug)]
pub(crate) struct Resolved {
    pub row: i64,
    pub name: String,
    pub parent_row: Option<i64>,
    pub full_path: String,
    pub share_mode: ShareMode,
}

fn share_mode(raw: Option<String>) -> Result<ShareMode> {
    match raw {
        None => Ok(ShareMode::None),
        Some(text) => text.parse().map_err(|err: crate::mapping::ConversionError| {
            PersistenceError::ModelConversion {
                model: "Share",
                field: "mode".to_string(),
                reason: err.to_string(),
            }
        }),
    }
}

/// Walks `segments` downward from `user`'s root, one edge per segment.
/// Share edges are only followed out of the root itself. Own-tree matches
/// win over matches through a share.
pub(crate) fn resolve_path(
    conn: &Connection,
    user: &UserId,
    segments: &[&str],
    scope: ShareScope,
) -> Result<Resolved> {
    let sql = format!(
        "WITH RECURSIVE walk(node, depth, share_mode, name, parent) AS (
             SELECT e.target_id, 0, NULL, '', NULL
             FROM nodes u JOIN edges e ON e.source_id = u.id AND e.type_name = 'HAS_ROOT_FOLDER'
             WHERE instr(u.labels, ':User:') > 0 AND json_extract(u.properties, '$.id') = :user
             UNION ALL
             SELECT e.target_id, w.depth + 1,
                    COALESCE(w.share_mode, CASE WHEN e.type_name = 'CONTAINS_SHARED'
                        THEN {EDGE_SHARE_MODE} END),
                    json_extract(e.properties, '$.name'), w.node
             FROM walk w JOIN edges e ON e.source_id = w.node
             WHERE w.depth < :depth
               AND e.type_name <> 'HAS_ROOT_FOLDER'
               AND (e.type_name = 'CONTAINS' OR w.depth = 0)
               AND {SCOPED_EDGE}
               AND json_extract(e.properties, '$.name') = json_extract(:segments, '$[' || w.depth || ']')
         )
         SELECT node, share_mode, name, parent FROM walk
         WHERE depth = :depth
         ORDER BY share_mode IS NOT NULL
         LIMIT 1"
    );
    let segments_json = serde_json::to_string(segments).map_err(|err| PersistenceError::Read {
        source: Box::new(err),
    })?;
    let (row, mode, name, parent_row): (i64, Option<String>, String, Option<i64>) = conn
        .query_row(
            &sql,
            named_params! {
                ":user": user.as_str(),
                ":depth": segments.len() as i64,
                ":segments": segments_json,
                ":scope": scope.code(),
            },
            |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?)),
        )
        .read_or(PersistenceError::NodeNotFound)?;
    Ok(Resolved {
        row,
        name,
        parent_row,
        full_path: format!("/{}", segments.join("/")),
        share_mode: share_mode(mode)?,
    })
}

/// Climbs from node `node_id` up to `user`, folding edge names into a path.
/// A share edge must be followed directly by the recipient's root-folder
/// edge. Own-tree paths win over paths through a share, then shorter paths.
pub(crate) fn resolve_id(
    conn: &Connection,
    user: &UserId,
    node_id: &NodeId,
    scope: ShareScope,
    max_depth: u32,
) -> Result<Resolved> {
    let sql = format!(
        "WITH RECURSIVE climb(node, depth, first_name, first_parent, path, share_mode, crossed, target) AS (
             SELECT e.source_id, 1,
                    COALESCE(json_extract(e.properties, '$.name'), ''),
                    e.source_id,
                    CASE WHEN e.type_name = 'HAS_ROOT_FOLDER' THEN ''
                         ELSE '/' || json_extract(e.properties, '$.name') END,
                    CASE WHEN e.type_name = 'CONTAINS_SHARED'
                         THEN {EDGE_SHARE_MODE} END,
                    e.type_name = 'CONTAINS_SHARED',
                    t.id
             FROM nodes t JOIN edges e ON e.target_id = t.id
             WHERE instr(t.labels, ':Node:') > 0 AND json_extract(t.properties, '$.id') = :node
               AND {SCOPED_EDGE}
             UNION ALL
             SELECT e.source_id, c.depth + 1, c.first_name, c.first_parent,
                    CASE WHEN e.type_name = 'HAS_ROOT_FOLDER' THEN c.path
                         ELSE '/' || json_extract(e.properties, '$.name') || c.path END,
                    COALESCE(c.share_mode, CASE WHEN e.type_name = 'CONTAINS_SHARED'
                        THEN {EDGE_SHARE_MODE} END),
                    c.crossed OR e.type_name = 'CONTAINS_SHARED',
                    c.target
             FROM climb c JOIN edges e ON e.target_id = c.node
             WHERE c.depth < :max_depth AND {SCOPED_EDGE}
               AND (NOT c.crossed OR e.type_name = 'HAS_ROOT_FOLDER')
         )
         SELECT c.target, c.share_mode, c.first_name, c.first_parent, c.path
         FROM climb c JOIN nodes u ON u.id = c.node
         WHERE instr(u.labels, ':User:') > 0 AND json_extract(u.properties, '$.id') = :user
         ORDER BY c.crossed, c.depth
         LIMIT 1"
    );
    let (row, mode, name, parent_row, full_path): (i64, Option<String>, String, i64, String) = conn
        .query_row(
            &sql,
            named_params! {
                ":user": user.as_str(),
                ":node": node_id.as_str(),
                ":scope": scope.code(),
                ":max_depth": max_depth as i64,
            },
            |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?, r.get(4)?)),
        )
        .read_or(PersistenceError::NodeNotFound)?;
    Ok(Resolved {
        row,
        name,
        parent_row: Some(parent_row),
        full_path: if full_path.is_empty() {
            "/".to_string()
        } else {
            full_path
        },
        share_mode: share_mode(mode)?,
    })
}

/// Creator of node `row`, found over root-folder and containment edges only.
pub(crate) fn owner_of(conn: &Connection, row: i64, max_depth: u32) -> Result<UserId> {
    let owner: String = conn
        .query_row(
            "WITH RECURSIVE up(node, depth) AS (
                 SELECT :row, 0
                 UNION ALL
                 SELECT e.source_id, up.depth + 1
                 FROM up JOIN edges e ON e.target_id = up.node
                 WHERE e.type_name IN ('HAS_ROOT_FOLDER', 'CONTAINS') AND up.depth < :max_depth
             )
             SELECT json_extract(u.properties, '$.id')
             FROM up JOIN nodes u ON u.id = up.node
             WHERE instr(u.labels, ':User:') > 0
             ORDER BY up.depth
             LIMIT 1",
            named_params! { ":row": row, ":max_depth": max_depth as i64 },
            |r| r.get(0),
        )
        .read_or(PersistenceError::NodeNotFound)?;
    Ok(UserId::new(owner))
}

/// Builds the user-facing view of a resolved node: stored properties plus
/// everything derived from the traversal.
pub(crate) fn fill_info(
    conn: &Connection,
    user: &UserId,
    resolved: Resolved,
    max_depth: u32,
) -> Result<Node> {
    let (labels, props) = load_node_row(conn, Node::MODEL, resolved.row)?;
    let mut node: Node = hydrate_new(&props)?;
    node.node_type = if has_label(&labels, LABEL_FOLDER) {
        NodeType::Folder
    } else {
        NodeType::File
    };
    node.name = resolved.name;
    node.path = path::split(&resolved.full_path).0.to_string();
    node.full_path = resolved.full_path;
    node.share_mode = resolved.share_mode;
    node.perspective_user_id = user.clone();
    node.parent_node_id = match resolved.parent_row {
        Some(parent) => folder_id(conn, parent)?,
        None => None,
    };
    node.owner_id = owner_of(conn, resolved.row, max_depth)?;
    Ok(node)
}

/// Domain id of `row` if it is a folder.
fn folder_id(conn: &Connection, row: i64) -> Result<Option<NodeId>> {
    let (labels, id): (String, Option<String>) = conn
        .query_row(
            "SELECT labels, json_extract(properties, '$.id') FROM nodes WHERE id = ?1",
            [row],
            |r| Ok((r.get(0)?, r.get(1)?)),
        )
        .read_or(PersistenceError::NodeNotFound)?;
    Ok(id
        .filter(|_| has_label(&labels, LABEL_FOLDER))
        .map(NodeId::new))
}

/// Resolves `node` and returns its row id along with the view.
fn resolve_node<M: AccessMode>(
    tx: &GraphTx<M>,
    user: &UserId,
    node: &NodeId,
    scope: ShareScope,
) -> Result<(i64, Node)> {
    let conn = tx.conn()?;
    let resolved = resolve_id(conn, user, node, scope, tx.max_depth())?;
    let row = resolved.row;
    Ok((row, fill_info(conn, user, resolved, tx.max_depth())?))
}

/// View of `child`, reached from `parent` over an edge named `name`.
fn child_view(
    conn: &Connection,
    user: &UserId,
    parent: &Node,
    child: i64,
    parent_row: i64,
    name: String,
    share_mode: ShareMode,
    max_depth: u32,
) -> Result<Node> {
    let resolved = Resolved {
        row: child,
        full_path: path::join(&parent.full_path, &name),
        name,
        parent_row: Some(parent_row),
        share_mode,
    };
    fill_info(conn, user, resolved, max_depth)
}

impl<M: AccessMode> NodeReadOps for GraphTx<M> {
    fn get_by_path(&self, user: &UserId, node_path: &str, scope: ShareScope) -> Result<Node> {
        let conn = self.conn()?;
        let segments = path::segments(node_path);
        let resolved = resolve_path(conn, user, &segments, scope).map_err(|err| {
            if err.is_not_found() {
                debug!(user_id = %user, path = node_path, "no node at path");
            }
            err
        })?;
        fill_info(conn, user, resolved, self.max_depth())
    }

    fn get_by_id(&self, user: &UserId, node: &NodeId, scope: ShareScope) -> Result<Node> {
        resolve_node(self, user, node, scope)
            .map(|(_, node)| node)
            .map_err(|err| {
                if err.is_not_found() {
                    debug!(user_id = %user, node_id = %node, "node not reachable");
                }
                err
            })
    }

    fn list_by_id(&self, user: &UserId, node: &NodeId, scope: ShareScope) -> Result<Vec<Node>> {
        let (row, folder) = resolve_node(self, user, node, scope)?;
        if !folder.is_folder() {
            return Ok(Vec::new());
        }
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT e.target_id, json_extract(e.properties, '$.name'),
                        CASE WHEN e.type_name = 'CONTAINS_SHARED'
                             THEN {EDGE_SHARE_MODE} END
                 FROM edges e
                 WHERE e.source_id = :row AND e.type_name <> 'HAS_ROOT_FOLDER'
                   AND (e.type_name = 'CONTAINS' OR :own_root) AND {SCOPED_EDGE}
                 ORDER BY json_extract(e.properties, '$.name'), e.id"
            ))
            .read()?;
        let children = stmt
            .query_map(
                named_params! {
                    ":row": row,
                    ":scope": scope.code(),
                    ":own_root": folder.full_path == "/",
                },
                |r| {
                    Ok((
                        r.get::<_, i64>(0)?,
                        r.get::<_, String>(1)?,
                        r.get::<_, Option<String>>(2)?,
                    ))
                },
            )
            .read()?
            .collect::<rusqlite::Result<Vec<_>>>()
            .read()?;
        let mut out = Vec::with_capacity(children.len());
        for (child, name, mode) in children {
            let mode = match share_mode(mode)? {
                ShareMode::None => folder.share_mode,
                crossed => crossed,
            };
            out.push(child_view(
                conn,
                user,
                &folder,
                child,
                row,
                name,
                mode,
                self.max_depth(),
            )?);
        }
        Ok(out)
    }
}

impl NodeWriteOps for GraphTx<ReadWrite> {
    fn create_user_root_folder(&mut self, user: &UserId) -> Result<bool> {
        let conn = self.conn()?;
        let user_row =
            find_node_row(conn, LABEL_USER, user.as_str())?.ok_or(PersistenceError::UserNotFound)?;
        let existing: Option<i64> = conn
            .query_row(
                "SELECT target_id FROM edges WHERE source_id = ?1 AND type_name = ?2",
                rusqlite::params![user_row, EDGE_HAS_ROOT_FOLDER],
                |r| r.get(0),
            )
            .optional()
            .read()?;
        if existing.is_some() {
            return Ok(false);
        }
        let root = Node::fresh(NodeType::Folder, "", OffsetDateTime::now_utc());
        let root_row = insert_node(conn, &[LABEL_NODE, LABEL_FOLDER], &to_storage_map(&root))?;
        insert_edge(
            conn,
            user_row,
            root_row,
            EDGE_HAS_ROOT_FOLDER,
            &Default::default(),
        )?;
        info!(user_id = %user, node_id = %root.id, "root folder created");
        Ok(true)
    }

    fn create_node_by_id(
        &mut self,
        user: &UserId,
        node_type: NodeType,
        parent: &NodeId,
        name: &str,
    ) -> Result<(Node, bool)> {
        if !path::is_valid_name(name) {
            return Err(PersistenceError::invalid(format!(
                "'{name}' is not a valid node name"
            )));
        }
        let name = name.trim();
        let (parent_row, parent_node) = resolve_node(&*self, user, parent, ShareScope::ReadWrite)?;
        if !parent_node.is_folder() {
            return Err(PersistenceError::NotAFolder);
        }
        let conn = self.conn()?;
        let existing: Option<i64> = conn
            .query_row(
                "SELECT target_id FROM edges
                 WHERE source_id = ?1 AND type_name = ?2
                   AND json_extract(properties, '$.name') = ?3",
                rusqlite::params![parent_row, EDGE_CONTAINS, name],
                |r| r.get(0),
            )
            .optional()
            .read()?;
        let (child_row, created) = match existing {
            Some(row) => (row, false),
            None => {
                let fresh = Node::fresh(node_type, name, OffsetDateTime::now_utc());
                let row = insert_node(
                    conn,
                    &[LABEL_NODE, node_type.label()],
                    &to_storage_map(&fresh),
                )?;
                let relation = ContainsRelation {
                    name: name.to_string(),
                };
                insert_edge(conn, parent_row, row, EDGE_CONTAINS, &to_storage_map(&relation))?;
                (row, true)
            }
        };
        let node = child_view(
            conn,
            user,
            &parent_node,
            child_row,
            parent_row,
            name.to_string(),
            parent_node.share_mode,
            self.max_depth(),
        )?;
        if created {
            info!(user_id = %user, node_id = %node.id, path = %node.full_path, "node created");
        }
        Ok((node, created))
    }
}
