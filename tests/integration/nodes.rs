#![allow(missing_docs)]

mod common;

use common::Fixture;
use freecloud::model::{NodeId, NodeType, UserId};
use freecloud::persistence::{CloseExt, FinishExt, ShareScope};
use freecloud::{ErrorKind, PersistenceError, Result};

#[test]
fn root_folder_is_created_once() -> Result<()> {
    let fx = Fixture::new()?;
    let alice = fx.register("alice@example.com")?;
    let root = fx.managers.nodes.get_by_path(&alice, "/")?;

    assert!(!fx.managers.nodes.create_user_root_folder(&alice)?);
    assert!(!fx.managers.nodes.create_user_root_folder(&alice)?);

    let again = fx.managers.nodes.get_by_path(&alice, "")?;
    assert_eq!(again.id, root.id);
    assert_eq!(root.node_type, NodeType::Folder);
    assert_eq!(root.full_path, "/");
    assert_eq!(root.name, "");
    assert_eq!(root.parent_node_id, None);
    assert_eq!(root.owner_id, alice);
    Ok(())
}

#[test]
fn root_folder_for_unknown_user_is_not_found() -> Result<()> {
    let fx = Fixture::new()?;
    let err = fx
        .managers
        .nodes
        .create_user_root_folder(&UserId::new("ghost"))
        .unwrap_err();
    assert!(matches!(err, PersistenceError::UserNotFound));
    Ok(())
}

#[test]
fn create_node_is_idempotent() -> Result<()> {
    let fx = Fixture::new()?;
    let alice = fx.register("alice@example.com")?;
    let root = fx.managers.nodes.get_by_path(&alice, "/")?;

    let (docs, created) = fx
        .managers
        .nodes
        .create_node(&alice, NodeType::Folder, &root.id, "docs")?;
    assert!(created);
    assert_eq!(docs.node_type, NodeType::Folder);
    assert_eq!(docs.full_path, "/docs");
    assert_eq!(docs.path, "/");
    assert_eq!(docs.parent_node_id.as_ref(), Some(&root.id));

    let (again, created) = fx
        .managers
        .nodes
        .create_node(&alice, NodeType::File, &root.id, "docs")?;
    assert!(!created);
    assert_eq!(again, docs, "existing entry keeps its type and identity");
    Ok(())
}

#[test]
fn path_and_id_resolution_agree() -> Result<()> {
    let fx = Fixture::new()?;
    let alice = fx.register("alice@example.com")?;
    let (docs, _) = fx
        .managers
        .nodes
        .create_node_by_path(&alice, NodeType::Folder, "/docs")?;
    let (report, _) = fx
        .managers
        .nodes
        .create_node_by_path(&alice, NodeType::File, "/docs/report.pdf")?;

    let by_path = fx.managers.nodes.get_by_path(&alice, " /docs// report.pdf ")?;
    let by_id = fx.managers.nodes.get_by_id(&alice, &report.id)?;
    assert_eq!(by_path, by_id);
    assert_eq!(by_id.full_path, "/docs/report.pdf");
    assert_eq!(by_id.path, "/docs/");
    assert_eq!(by_id.name, "report.pdf");
    assert_eq!(by_id.parent_node_id.as_ref(), Some(&docs.id));
    assert_eq!(by_id.mime_type.as_deref(), Some("application/pdf"));
    assert_eq!(by_id.share_mode, freecloud::model::ShareMode::None);
    Ok(())
}

#[test]
fn listing_is_ordered_by_name() -> Result<()> {
    let fx = Fixture::new()?;
    let alice = fx.register("alice@example.com")?;
    let root = fx.managers.nodes.get_by_path(&alice, "/")?;
    for name in ["zeta", "alpha", "mid.txt"] {
        let kind = if name.contains('.') {
            NodeType::File
        } else {
            NodeType::Folder
        };
        fx.managers.nodes.create_node(&alice, kind, &root.id, name)?;
    }

    let children = fx.managers.nodes.list_by_id(&alice, &root.id)?;
    let names: Vec<&str> = children.iter().map(|n| n.name.as_str()).collect();
    assert_eq!(names, ["alpha", "mid.txt", "zeta"]);
    assert!(children
        .iter()
        .all(|c| c.parent_node_id.as_ref() == Some(&root.id) && c.owner_id == alice));

    let file = &children[1];
    assert!(fx.managers.nodes.list_by_id(&alice, &file.id)?.is_empty());
    Ok(())
}

#[test]
fn files_cannot_hold_children() -> Result<()> {
    let fx = Fixture::new()?;
    let alice = fx.register("alice@example.com")?;
    let (file, _) = fx
        .managers
        .nodes
        .create_node_by_path(&alice, NodeType::File, "/notes.txt")?;
    let err = fx
        .managers
        .nodes
        .create_node(&alice, NodeType::File, &file.id, "inner.txt")
        .unwrap_err();
    assert!(matches!(err, PersistenceError::NotAFolder));
    assert_eq!(err.kind(), ErrorKind::Validation);
    Ok(())
}

#[test]
fn invalid_names_are_rejected() -> Result<()> {
    let fx = Fixture::new()?;
    let alice = fx.register("alice@example.com")?;
    let root = fx.managers.nodes.get_by_path(&alice, "/")?;
    for name in ["", "   ", "a/b"] {
        let err = fx
            .managers
            .nodes
            .create_node(&alice, NodeType::Folder, &root.id, name)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation, "name {name:?}");
    }
    Ok(())
}

#[test]
fn other_users_trees_are_invisible() -> Result<()> {
    let fx = Fixture::new()?;
    let alice = fx.register("alice@example.com")?;
    let bob = fx.register("bob@example.com")?;
    let (docs, _) = fx
        .managers
        .nodes
        .create_node_by_path(&alice, NodeType::Folder, "/docs")?;

    assert!(fx.managers.nodes.get_by_path(&bob, "/docs").unwrap_err().is_not_found());
    assert!(fx.managers.nodes.get_by_id(&bob, &docs.id).unwrap_err().is_not_found());
    let err = fx
        .managers
        .nodes
        .create_node(&bob, NodeType::File, &docs.id, "intruder.txt")
        .unwrap_err();
    assert!(matches!(err, PersistenceError::NodeNotFound));
    assert!(fx.managers.nodes.list_by_id(&alice, &docs.id)?.is_empty());
    Ok(())
}

#[test]
fn unknown_paths_and_ids_are_not_found() -> Result<()> {
    let fx = Fixture::new()?;
    let alice = fx.register("alice@example.com")?;
    let err = fx.managers.nodes.get_by_path(&alice, "/missing/file").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    let err = fx
        .managers
        .nodes
        .get_by_id(&alice, &NodeId::new("00000000-0000-0000-0000-000000000000"))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    Ok(())
}

#[test]
fn rolled_back_creation_leaves_no_trace() -> Result<()> {
    let fx = Fixture::new()?;
    let alice = fx.register("alice@example.com")?;
    let nodes = fx.backend.nodes();

    let mut tx = nodes.start_read_write()?;
    let root = tx.get_by_path(&alice, "/", ShareScope::None)?;
    let result = tx
        .create_node_by_id(&alice, NodeType::Folder, &root.id, "scratch")
        .and_then(|_| Err::<(), _>(PersistenceError::InvalidInput("abandoned".into())));
    assert!(tx.finish_with(result).is_err());

    let tx = nodes.start_read()?;
    let result = tx.get_by_path(&alice, "/scratch", ShareScope::None);
    assert!(tx.close_with(result).unwrap_err().is_not_found());
    Ok(())
}
