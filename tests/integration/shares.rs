#![allow(missing_docs)]

mod common;

use common::Fixture;
use freecloud::model::{Node, NodeType, Share, ShareMode, UserId};
use freecloud::persistence::{CloseExt, FinishExt};
use freecloud::{ErrorKind, PersistenceError, Result};

fn share(node: &Node, owner: &UserId, with: &UserId, mode: ShareMode) -> Share {
    Share {
        node_id: node.id.clone(),
        owner_id: owner.clone(),
        shared_with_id: with.clone(),
        mode,
    }
}

fn folder(fx: &Fixture, user: &UserId, path: &str) -> Result<Node> {
    Ok(fx
        .managers
        .nodes
        .create_node_by_path(user, NodeType::Folder, path)?
        .0)
}

#[test]
fn sharing_is_idempotent_and_keeps_first_mode() -> Result<()> {
    let fx = Fixture::new()?;
    let alice = fx.register("alice@example.com")?;
    let bob = fx.register("bob@example.com")?;
    let photos = folder(&fx, &alice, "/photos")?;

    assert!(fx
        .managers
        .shares
        .create_share(&alice, &share(&photos, &alice, &bob, ShareMode::Read))?);
    assert!(!fx
        .managers
        .shares
        .create_share(&alice, &share(&photos, &alice, &bob, ShareMode::ReadWrite))?);

    let seen = fx.managers.nodes.get_by_path(&bob, "/photos")?;
    assert_eq!(seen.id, photos.id);
    assert_eq!(seen.share_mode, ShareMode::Read);
    assert_eq!(seen.owner_id, alice);
    assert_eq!(seen.perspective_user_id, bob);
    Ok(())
}

#[test]
fn owner_is_stable_across_shares() -> Result<()> {
    let fx = Fixture::new()?;
    let alice = fx.register("alice@example.com")?;
    let bob = fx.register("bob@example.com")?;
    let photos = folder(&fx, &alice, "/photos")?;
    let (pic, _) = fx
        .managers
        .nodes
        .create_node_by_path(&alice, NodeType::File, "/photos/cat.png")?;
    fx.managers
        .shares
        .create_share(&alice, &share(&photos, &alice, &bob, ShareMode::Read))?;

    let seen = fx.managers.nodes.get_by_id(&bob, &pic.id)?;
    assert_eq!(seen.owner_id, alice);
    assert_eq!(seen.full_path, "/photos/cat.png");
    assert_eq!(seen.share_mode, ShareMode::Read);
    assert_eq!(seen.parent_node_id.as_ref(), Some(&photos.id));

    let own = fx.managers.nodes.get_by_id(&alice, &pic.id)?;
    assert_eq!(own.owner_id, alice);
    assert_eq!(own.share_mode, ShareMode::None);
    Ok(())
}

#[test]
fn shared_entries_use_their_display_name() -> Result<()> {
    let fx = Fixture::new()?;
    let alice = fx.register("alice@example.com")?;
    let bob = fx.register("bob@example.com")?;
    let root = fx.managers.nodes.get_by_path(&alice, "/")?;
    let work = folder(&fx, &alice, "/work")?;
    let (report, _) = fx
        .managers
        .nodes
        .create_node(&alice, NodeType::File, &work.id, "q3.txt")?;

    let mut tx = fx.backend.shares().start_read_write()?;
    let result = tx.create_share(
        &alice,
        &share(&work, &alice, &bob, ShareMode::Read),
        "from-alice",
    );
    tx.finish_with(result)?;

    let renamed = fx.managers.nodes.get_by_path(&bob, "/from-alice/q3.txt")?;
    assert_eq!(renamed.id, report.id);
    assert!(fx.managers.nodes.get_by_path(&bob, "/work").is_err());
    assert_eq!(fx.managers.nodes.get_by_path(&alice, "/work/q3.txt")?.id, report.id);
    assert_eq!(
        fx.managers.nodes.get_by_id(&alice, &work.id)?.parent_node_id,
        Some(root.id)
    );
    Ok(())
}

#[test]
fn nesting_is_rejected_both_ways() -> Result<()> {
    let fx = Fixture::new()?;
    let alice = fx.register("alice@example.com")?;
    let bob = fx.register("bob@example.com")?;
    let carol = fx.register("carol@example.com")?;
    let outer = folder(&fx, &alice, "/outer")?;
    let inner = folder(&fx, &alice, "/outer/inner")?;
    let deep = folder(&fx, &alice, "/outer/inner/deep")?;

    fx.managers
        .shares
        .create_share(&alice, &share(&inner, &alice, &bob, ShareMode::ReadWrite))?;

    let err = fx
        .managers
        .shares
        .create_share(&alice, &share(&deep, &alice, &carol, ShareMode::Read))
        .unwrap_err();
    assert!(matches!(err, PersistenceError::ShareIsInsideShare));
    assert_eq!(err.kind(), ErrorKind::Invariant);

    let err = fx
        .managers
        .shares
        .create_share(&alice, &share(&outer, &alice, &carol, ShareMode::Read))
        .unwrap_err();
    assert!(matches!(err, PersistenceError::ShareContainsOtherShares));
    assert_eq!(err.kind(), ErrorKind::Invariant);

    let tx = fx.backend.shares().start_read()?;
    let result = tx.node_contains_nested_shares(&outer.id);
    assert!(tx.close_with(result)?);
    Ok(())
}

#[test]
fn same_node_can_be_shared_with_several_users() -> Result<()> {
    let fx = Fixture::new()?;
    let alice = fx.register("alice@example.com")?;
    let bob = fx.register("bob@example.com")?;
    let carol = fx.register("carol@example.com")?;
    let music = folder(&fx, &alice, "/music")?;

    assert!(fx
        .managers
        .shares
        .create_share(&alice, &share(&music, &alice, &bob, ShareMode::Read))?);
    assert!(fx
        .managers
        .shares
        .create_share(&alice, &share(&music, &alice, &carol, ShareMode::ReadWrite))?);

    assert_eq!(fx.managers.nodes.get_by_path(&bob, "/music")?.share_mode, ShareMode::Read);
    assert_eq!(
        fx.managers.nodes.get_by_path(&carol, "/music")?.share_mode,
        ShareMode::ReadWrite
    );
    Ok(())
}

#[test]
fn write_access_follows_the_share_mode() -> Result<()> {
    let fx = Fixture::new()?;
    let alice = fx.register("alice@example.com")?;
    let bob = fx.register("bob@example.com")?;
    let carol = fx.register("carol@example.com")?;
    let inbox = folder(&fx, &alice, "/inbox")?;
    let archive = folder(&fx, &alice, "/archive")?;
    fx.managers
        .shares
        .create_share(&alice, &share(&inbox, &alice, &bob, ShareMode::ReadWrite))?;
    fx.managers
        .shares
        .create_share(&alice, &share(&archive, &alice, &carol, ShareMode::Read))?;

    let (upload, created) = fx
        .managers
        .nodes
        .create_node(&bob, NodeType::File, &inbox.id, "from-bob.txt")?;
    assert!(created);
    assert_eq!(upload.owner_id, alice);
    assert_eq!(upload.share_mode, ShareMode::ReadWrite);
    assert_eq!(
        fx.managers.nodes.get_by_path(&alice, "/inbox/from-bob.txt")?.id,
        upload.id
    );

    let err = fx
        .managers
        .nodes
        .create_node(&carol, NodeType::File, &archive.id, "from-carol.txt")
        .unwrap_err();
    assert!(err.is_not_found());
    Ok(())
}

#[test]
fn integer_share_modes_grant_their_access() -> Result<()> {
    let fx = Fixture::new()?;
    let alice = fx.register("alice@example.com")?;
    let bob = fx.register("bob@example.com")?;
    let inbox = folder(&fx, &alice, "/inbox")?;
    fx.managers
        .shares
        .create_share(&alice, &share(&inbox, &alice, &bob, ShareMode::ReadWrite))?;

    let conn = rusqlite::Connection::open(fx.config.database_path().unwrap()).unwrap();
    let rewritten = conn
        .execute(
            "UPDATE edges SET properties = json_set(properties, '$.share_mode', 2)
             WHERE type_name = 'CONTAINS_SHARED'",
            [],
        )
        .unwrap();
    assert_eq!(rewritten, 1);
    drop(conn);

    let seen = fx.managers.nodes.get_by_path(&bob, "/inbox")?;
    assert_eq!(seen.share_mode, ShareMode::ReadWrite);
    let (upload, created) = fx
        .managers
        .nodes
        .create_node(&bob, NodeType::File, &inbox.id, "legacy.txt")?;
    assert!(created);
    assert_eq!(upload.owner_id, alice);
    assert_eq!(upload.share_mode, ShareMode::ReadWrite);
    Ok(())
}

#[test]
fn share_requests_are_validated() -> Result<()> {
    let fx = Fixture::new()?;
    let alice = fx.register("alice@example.com")?;
    let bob = fx.register("bob@example.com")?;
    let docs = folder(&fx, &alice, "/docs")?;
    let root = fx.managers.nodes.get_by_path(&alice, "/")?;

    let err = fx
        .managers
        .shares
        .create_share(&bob, &share(&docs, &bob, &alice, ShareMode::Read))
        .unwrap_err();
    assert!(matches!(err, PersistenceError::NodeNotFound), "only owners share");

    let err = fx
        .managers
        .shares
        .create_share(&alice, &share(&docs, &alice, &UserId::new("nobody"), ShareMode::Read))
        .unwrap_err();
    assert!(matches!(err, PersistenceError::UserNotFound));

    let err = fx
        .managers
        .shares
        .create_share(&alice, &share(&docs, &alice, &bob, ShareMode::None))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);

    let err = fx
        .managers
        .shares
        .create_share(&alice, &share(&docs, &alice, &alice, ShareMode::Read))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);

    let err = fx
        .managers
        .shares
        .create_share(&alice, &share(&root, &alice, &bob, ShareMode::Read))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation, "root has no display name");
    Ok(())
}

#[test]
fn received_shares_do_not_leak_to_third_parties() -> Result<()> {
    let fx = Fixture::new()?;
    let alice = fx.register("alice@example.com")?;
    let bob = fx.register("bob@example.com")?;
    let carol = fx.register("carol@example.com")?;
    let secret = folder(&fx, &alice, "/secret")?;
    fx.managers
        .shares
        .create_share(&alice, &share(&secret, &alice, &bob, ShareMode::ReadWrite))?;
    let bobs = folder(&fx, &bob, "/public")?;
    fx.managers
        .shares
        .create_share(&bob, &share(&bobs, &bob, &carol, ShareMode::Read))?;

    assert!(fx.managers.nodes.get_by_id(&carol, &secret.id).unwrap_err().is_not_found());
    let listing = fx.managers.nodes.list_by_id(
        &carol,
        &fx.managers.nodes.get_by_path(&carol, "/")?.id,
    )?;
    let names: Vec<&str> = listing.iter().map(|n| n.name.as_str()).collect();
    assert_eq!(names, ["public"]);
    Ok(())
}
