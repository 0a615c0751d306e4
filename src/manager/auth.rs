use crate::config::AuthConfig;
use crate::error::{PersistenceError, Result};
use crate::model::{Session, Token, User, UserId};
use crate::persistence::{
    AuthPersistenceController, CloseExt, FinishExt, NodePersistenceController,
    UserPersistenceController,
};
use rand::RngCore;
use std::sync::Arc;
use time::OffsetDateTime;
use tracing::{debug, error, info, warn};

/// Accounts and sessions.
///
/// Passwords arrive already hashed; this manager never inspects them.
pub struct AuthManager {
    users: Arc<dyn UserPersistenceController>,
    auth: Arc<dyn AuthPersistenceController>,
    nodes: Arc<dyn NodePersistenceController>,
    config: AuthConfig,
}

impl AuthManager {
    /// Manager over the user, session and node controllers of one backend.
    pub fn new(
        users: Arc<dyn UserPersistenceController>,
        auth: Arc<dyn AuthPersistenceController>,
        nodes: Arc<dyn NodePersistenceController>,
        config: AuthConfig,
    ) -> Self {
        Self {
            users,
            auth,
            nodes,
            config,
        }
    }

    /// Registers `user`, creates their root folder and opens a first session.
    ///
    /// The first account ever registered is promoted to admin. Two
    /// concurrent first registrations may both see a count of one.
    pub fn create_user(&self, mut user: User) -> Result<(User, Session)> {
        let mut tx = self.users.start_read_write()?;
        let result = match tx.get_user_by_email(&user.email) {
            Ok(_) => Err(PersistenceError::EmailAlreadyRegistered(user.email.clone())),
            Err(PersistenceError::UserNotFound) => {
                user.is_admin = false;
                tx.save_user(&mut user)
            }
            Err(err) => Err(err),
        };
        tx.finish_with(result)?;
        info!(user_id = %user.id, "user registered");

        let mut tx = self.nodes.start_read_write()?;
        let result = tx.create_user_root_folder(&user.id);
        tx.finish_with(result)?;

        if self.count_users()? == 1 {
            if let Err(err) = self.promote(&mut user) {
                error!(user_id = %user.id, error = %err, "failed to promote first user");
            }
        }

        let session = self.create_session(&user.id)?;
        user.password.clear();
        Ok((user, session))
    }

    fn promote(&self, user: &mut User) -> Result<()> {
        let mut tx = self.users.start_read_write()?;
        user.is_admin = true;
        let result = tx.update_user(user);
        tx.finish_with(result)?;
        info!(user_id = %user.id, "first user promoted to admin");
        Ok(())
    }

    /// Number of registered users.
    pub fn count_users(&self) -> Result<u64> {
        let tx = self.users.start_read()?;
        let result = tx.count_users();
        tx.close_with(result)
    }

    /// Account by id, without its password hash.
    pub fn get_user(&self, user: &UserId) -> Result<User> {
        let tx = self.users.start_read()?;
        let result = tx.get_user_by_id(user);
        let mut user = tx.close_with(result)?;
        user.password.clear();
        Ok(user)
    }

    /// Account by email, password hash included for verification.
    pub fn get_user_by_email(&self, email: &str) -> Result<User> {
        let tx = self.users.start_read()?;
        let result = tx.get_user_by_email(email);
        tx.close_with(result)
    }

    /// Opens a session for `user` with a fresh random token.
    pub fn create_session(&self, user: &UserId) -> Result<Session> {
        let session = Session {
            token: self.generate_token(),
            user_id: user.clone(),
            valid_until: OffsetDateTime::now_utc() + self.config.session_expiration(),
        };
        let mut tx = self.auth.start_read_write()?;
        let result = tx.save_session(&session);
        tx.finish_with(result)?;
        debug!(user_id = %user, "session created");
        Ok(session)
    }

    fn generate_token(&self) -> Token {
        let mut bytes = vec![0u8; self.config.session_token_length];
        rand::thread_rng().fill_bytes(&mut bytes);
        Token::new(hex::encode(bytes))
    }

    /// Owner of a live session.
    ///
    /// # Errors
    /// `SessionNotFound` for unknown tokens, `SessionExpired` once
    /// `valid_until` has passed.
    pub fn verify_token(&self, token: &Token) -> Result<User> {
        let tx = self.auth.start_read()?;
        let result = tx.get_session_by_token(token);
        let session = tx.close_with(result)?;
        if !session.is_valid_at(OffsetDateTime::now_utc()) {
            debug!(user_id = %session.user_id, "session expired");
            return Err(PersistenceError::SessionExpired);
        }
        self.get_user(&session.user_id)
    }

    /// Ends a session. Unknown tokens are ignored.
    pub fn logout(&self, token: &Token) -> Result<()> {
        let mut tx = self.auth.start_read_write()?;
        let result = tx.delete_session_by_token(token);
        tx.finish_with(result)
    }

    /// Deletes every session that has expired by now.
    pub fn cleanup_expired_sessions(&self) -> Result<usize> {
        let mut tx = self.auth.start_read_write()?;
        let result = tx.delete_expired_sessions(OffsetDateTime::now_utc());
        if let Err(err) = &result {
            warn!(error = %err, "expired session sweep failed");
        }
        tx.finish_with(result)
    }

    /// Auth settings in use.
    pub fn config(&self) -> &AuthConfig {
        &self.config
    }
}
