//! User nodes.

use super::classify::SqliteResultExt;
use super::transaction::{AccessMode, GraphTx, ReadWrite};
use super::{find_node_row, insert_node};
use crate::error::{PersistenceError, Result};
use crate::mapping::{decode_properties, encode_properties, hydrate_new, to_storage_map, GraphModel};
use crate::model::{User, UserId, LABEL_USER};
use crate::persistence::{UserReadOps, UserWriteOps};
use rusqlite::{params, Connection, OptionalExtension};
use time::OffsetDateTime;
use tracing::info;

fn load_user(conn: &Connection, filter: &str, value: &str) -> Result<User> {
    let json: String = conn
        .query_row(
            &format!(
                "SELECT properties FROM nodes
                 WHERE instr(labels, ':User:') > 0 AND json_extract(properties, '$.{filter}') = ?1"
            ),
            [value],
            |r| r.get(0),
        )
        .read_or(PersistenceError::UserNotFound)?;
    hydrate_new(&decode_properties(User::MODEL, &json)?)
}

fn email_owner(conn: &Connection, email: &str) -> Result<Option<String>> {
    conn.query_row(
        "SELECT json_extract(properties, '$.id') FROM nodes
         WHERE instr(labels, ':User:') > 0 AND json_extract(properties, '$.email') = ?1",
        [email],
        |r| r.get(0),
    )
    .optional()
    .read()
}

impl<M: AccessMode> UserReadOps for GraphTx<M> {
    fn count_users(&self) -> Result<u64> {
        let count: i64 = self
            .conn()?
            .query_row(
                "SELECT COUNT(*) FROM nodes WHERE instr(labels, ':User:') > 0",
                [],
                |r| r.get(0),
            )
            .read()?;
        Ok(count.max(0) as u64)
    }

    fn get_user_by_id(&self, user: &UserId) -> Result<User> {
        load_user(self.conn()?, "id", user.as_str())
    }

    fn get_user_by_email(&self, email: &str) -> Result<User> {
        load_user(self.conn()?, "email", email)
    }
}

impl UserWriteOps for GraphTx<ReadWrite> {
    fn save_user(&mut self, user: &mut User) -> Result<()> {
        let conn = self.conn()?;
        if email_owner(conn, &user.email)?.is_some() {
            return Err(PersistenceError::EmailAlreadyRegistered(user.email.clone()));
        }
        let now = OffsetDateTime::now_utc();
        user.id = UserId::generate();
        user.created = now;
        user.updated = now;
        insert_node(conn, &[LABEL_USER], &to_storage_map(&*user))?;
        info!(user_id = %user.id, "user saved");
        Ok(())
    }

    fn update_user(&mut self, user: &mut User) -> Result<()> {
        let conn = self.conn()?;
        let row = find_node_row(conn, LABEL_USER, user.id.as_str())?
            .ok_or(PersistenceError::UserNotFound)?;
        if let Some(owner) = email_owner(conn, &user.email)? {
            if owner != user.id.as_str() {
                return Err(PersistenceError::EmailAlreadyRegistered(user.email.clone()));
            }
        }
        user.updated = OffsetDateTime::now_utc();
        conn.execute(
            "UPDATE nodes SET properties = json_patch(properties, ?1) WHERE id = ?2",
            params![encode_properties(&to_storage_map(&*user)), row],
        )
        .write()?;
        Ok(())
    }
}
