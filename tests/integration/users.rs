#![allow(missing_docs)]

mod common;

use common::Fixture;
use freecloud::model::{Session, Token, User};
use freecloud::persistence::FinishExt;
use freecloud::{ErrorKind, PersistenceError, Result};
use time::{Duration, OffsetDateTime};

#[test]
fn first_user_becomes_admin() -> Result<()> {
    let fx = Fixture::new()?;
    let (first, session) = fx
        .managers
        .auth
        .create_user(User::new("Alice", "A", "alice@example.com", "hash-a"))?;
    let (second, _) = fx
        .managers
        .auth
        .create_user(User::new("Bob", "B", "bob@example.com", "hash-b"))?;

    assert!(first.is_admin);
    assert!(!second.is_admin);
    assert!(first.password.is_empty(), "hash never leaves the manager");
    assert_eq!(session.user_id, first.id);
    assert_eq!(session.token.as_str().len(), 64);
    assert_eq!(fx.managers.auth.count_users()?, 2);

    let stored = fx.managers.auth.get_user(&first.id)?;
    assert!(stored.is_admin);
    assert!(stored.last_session.is_some());
    Ok(())
}

#[test]
fn duplicate_email_is_rejected() -> Result<()> {
    let fx = Fixture::new()?;
    fx.register("dup@example.com")?;
    let err = fx
        .managers
        .auth
        .create_user(User::new("Other", "Person", "dup@example.com", "hash"))
        .unwrap_err();
    assert!(matches!(err, PersistenceError::EmailAlreadyRegistered(ref email) if email == "dup@example.com"));
    assert_eq!(err.kind(), ErrorKind::Invariant);
    assert_eq!(fx.managers.auth.count_users()?, 1);
    Ok(())
}

#[test]
fn unique_email_is_enforced_by_the_store() -> Result<()> {
    let fx = Fixture::new()?;
    let alice = fx.register("alice@example.com")?;
    let users = fx.backend.users();

    let mut tx = users.start_read_write()?;
    let result = tx.get_user_by_id(&alice).and_then(|mut user| {
        user.email = "taken@example.com".into();
        tx.update_user(&mut user)
    });
    tx.finish_with(result)?;

    let mut tx = users.start_read_write()?;
    let mut clash = User::new("Eve", "E", "taken@example.com", "hash");
    let result = tx.save_user(&mut clash);
    let err = tx.finish_with(result).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Invariant);

    assert_eq!(
        fx.managers.auth.get_user_by_email("taken@example.com")?.id,
        alice
    );
    Ok(())
}

#[test]
fn tokens_verify_until_logout() -> Result<()> {
    let fx = Fixture::new()?;
    let alice = fx.register("alice@example.com")?;
    let session = fx.managers.auth.create_session(&alice)?;

    let user = fx.managers.auth.verify_token(&session.token)?;
    assert_eq!(user.id, alice);
    assert!(user.password.is_empty());

    fx.managers.auth.logout(&session.token)?;
    let err = fx.managers.auth.verify_token(&session.token).unwrap_err();
    assert!(matches!(err, PersistenceError::SessionNotFound));
    fx.managers.auth.logout(&session.token)?;
    Ok(())
}

#[test]
fn expired_sessions_are_refused_and_swept() -> Result<()> {
    let fx = Fixture::new()?;
    let alice = fx.register("alice@example.com")?;
    let live = fx.managers.auth.create_session(&alice)?;
    let stale = Session {
        token: Token::new("stale-token"),
        user_id: alice.clone(),
        valid_until: OffsetDateTime::now_utc() - Duration::hours(1),
    };
    let mut tx = fx.backend.auth().start_read_write()?;
    let result = tx.save_session(&stale);
    tx.finish_with(result)?;

    let err = fx.managers.auth.verify_token(&stale.token).unwrap_err();
    assert!(matches!(err, PersistenceError::SessionExpired));
    assert_eq!(err.kind(), ErrorKind::NotFound);

    assert_eq!(fx.managers.auth.cleanup_expired_sessions()?, 1);
    assert_eq!(fx.managers.auth.cleanup_expired_sessions()?, 0);
    assert!(matches!(
        fx.managers.auth.verify_token(&stale.token).unwrap_err(),
        PersistenceError::SessionNotFound
    ));
    assert_eq!(fx.managers.auth.verify_token(&live.token)?.id, alice);
    Ok(())
}

#[test]
fn sessions_need_a_user() -> Result<()> {
    let fx = Fixture::new()?;
    let err = fx
        .managers
        .auth
        .create_session(&"ghost".into())
        .unwrap_err();
    assert!(matches!(err, PersistenceError::UserNotFound));
    Ok(())
}
