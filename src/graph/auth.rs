//! Session nodes, linked from their user by `AUTHENTICATES_WITH`.

use super::classify::SqliteResultExt;
use super::transaction::{AccessMode, GraphTx, ReadWrite};
use super::{find_node_row, insert_edge, insert_node};
use crate::error::{PersistenceError, Result};
use crate::mapping::{decode_properties, hydrate_new, to_storage_map, unix_nanos, GraphModel};
use crate::model::{
    Session, Token, UserId, EDGE_AUTHENTICATES_WITH, LABEL_SESSION, LABEL_USER,
};
use crate::persistence::{AuthReadOps, AuthWriteOps};
use rusqlite::params;
use time::OffsetDateTime;
use tracing::{debug, info};

impl<M: AccessMode> AuthReadOps for GraphTx<M> {
    fn get_session_by_token(&self, token: &Token) -> Result<Session> {
        let (json, user): (String, String) = self
            .conn()?
            .query_row(
                "SELECT s.properties, json_extract(u.properties, '$.id')
                 FROM nodes s
                 JOIN edges e ON e.target_id = s.id AND e.type_name = 'AUTHENTICATES_WITH'
                 JOIN nodes u ON u.id = e.source_id
                 WHERE instr(s.labels, ':Session:') > 0
                   AND json_extract(s.properties, '$.token') = ?1",
                [token.as_str()],
                |r| Ok((r.get(0)?, r.get(1)?)),
            )
            .read_or(PersistenceError::SessionNotFound)?;
        let mut session: Session = hydrate_new(&decode_properties(Session::MODEL, &json)?)?;
        session.user_id = UserId::new(user);
        Ok(session)
    }
}

impl AuthWriteOps for GraphTx<ReadWrite> {
    fn save_session(&mut self, session: &Session) -> Result<()> {
        let conn = self.conn()?;
        let user_row = find_node_row(conn, LABEL_USER, session.user_id.as_str())?
            .ok_or(PersistenceError::UserNotFound)?;
        let session_row = insert_node(conn, &[LABEL_SESSION], &to_storage_map(session))?;
        insert_edge(
            conn,
            user_row,
            session_row,
            EDGE_AUTHENTICATES_WITH,
            &Default::default(),
        )?;
        conn.execute(
            "UPDATE nodes SET properties = json_set(properties, '$.last_session', ?1) WHERE id = ?2",
            params![unix_nanos(OffsetDateTime::now_utc()), user_row],
        )
        .write()?;
        debug!(user_id = %session.user_id, "session saved");
        Ok(())
    }

    fn delete_session_by_token(&mut self, token: &Token) -> Result<()> {
        let deleted = self
            .conn()?
            .execute(
                "DELETE FROM nodes
                 WHERE instr(labels, ':Session:') > 0 AND json_extract(properties, '$.token') = ?1",
                [token.as_str()],
            )
            .write()?;
        debug!(deleted, "session deleted");
        Ok(())
    }

    fn delete_expired_sessions(&mut self, now: OffsetDateTime) -> Result<usize> {
        let deleted = self
            .conn()?
            .execute(
                "DELETE FROM nodes
                 WHERE instr(labels, ':Session:') > 0
                   AND json_extract(properties, '$.valid_until') < ?1",
                [unix_nanos(now)],
            )
            .write()?;
        if deleted > 0 {
            info!(deleted, "expired sessions removed");
        }
        Ok(deleted)
    }
}
