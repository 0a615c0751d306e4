#![allow(missing_docs)]

use freecloud::mapping::{
    decode_properties, encode_properties, hydrate_new, to_storage_map, GraphModel,
};
use freecloud::model::{
    ContainsRelation, Node, NodeId, NodeType, Session, Share, ShareMode, Token, User, UserId,
};
use freecloud::path;
use proptest::prelude::*;
use time::OffsetDateTime;

fn arb_instant() -> impl Strategy<Value = OffsetDateTime> {
    (0i64..4_102_444_800_000_000_000)
        .prop_map(|nanos| OffsetDateTime::from_unix_timestamp_nanos(nanos as i128).unwrap())
}

fn arb_user() -> impl Strategy<Value = User> {
    (
        "[a-f0-9-]{0,36}",
        arb_instant(),
        arb_instant(),
        ".{0,16}",
        ".{0,16}",
        "[a-z]{1,8}@[a-z]{1,8}\\.org",
        ".{0,32}",
        any::<bool>(),
        proptest::option::of(arb_instant()),
    )
        .prop_map(
            |(id, created, updated, first_name, last_name, email, password, is_admin, last_session)| User {
                id: UserId::new(id),
                created,
                updated,
                first_name,
                last_name,
                email,
                password,
                is_admin,
                last_session,
            },
        )
}

fn arb_share() -> impl Strategy<Value = Share> {
    (
        "[a-z0-9]{1,12}",
        "[a-z0-9]{1,12}",
        "[a-z0-9]{1,12}",
        arb_share_mode(),
    )
        .prop_map(|(node, owner, with, mode)| Share {
            node_id: node.as_str().into(),
            owner_id: owner.as_str().into(),
            shared_with_id: with.as_str().into(),
            mode,
        })
}

fn arb_share_mode() -> impl Strategy<Value = ShareMode> {
    prop_oneof![
        Just(ShareMode::None),
        Just(ShareMode::Read),
        Just(ShareMode::ReadWrite)
    ]
}

fn arb_node() -> impl Strategy<Value = Node> {
    let stored = (
        "[a-f0-9-]{1,36}",
        arb_instant(),
        arb_instant(),
        any::<i64>(),
        proptest::option::of("[a-z]{1,8}/[a-z0-9.+-]{1,12}"),
    );
    let transient = (
        ".{0,16}",
        "[a-z0-9]{1,12}",
        prop_oneof![Just(NodeType::File), Just(NodeType::Folder)],
        arb_share_mode(),
        any::<bool>(),
        "(/[a-z]{1,6}){0,3}/",
        proptest::option::of("[a-z0-9]{1,12}"),
        "[a-z0-9]{1,12}",
    );
    (stored, transient).prop_map(
        |(
            (id, created, updated, size, mime_type),
            (name, owner, node_type, share_mode, is_starred, path, parent, perspective),
        )| Node {
            id: NodeId::new(id),
            created,
            updated,
            full_path: format!("{path}{name}"),
            name,
            size,
            mime_type,
            owner_id: owner.as_str().into(),
            node_type,
            share_mode,
            is_starred,
            path,
            parent_node_id: parent.map(NodeId::new),
            perspective_user_id: perspective.as_str().into(),
        },
    )
}

fn arb_session() -> impl Strategy<Value = Session> {
    ("[a-f0-9]{1,64}", "[a-z0-9]{1,12}", arb_instant()).prop_map(|(token, user, valid_until)| {
        Session {
            token: Token::new(token),
            user_id: user.as_str().into(),
            valid_until,
        }
    })
}

fn arb_contains() -> impl Strategy<Value = ContainsRelation> {
    ".{0,24}".prop_map(|name| ContainsRelation { name })
}

fn through_storage<M: GraphModel>(model: &M) -> M {
    let json = encode_properties(&to_storage_map(model));
    hydrate_new(&decode_properties(M::MODEL, &json).unwrap()).unwrap()
}

proptest! {
    #[test]
    fn prop_user_survives_storage(user in arb_user()) {
        prop_assert_eq!(hydrate_new::<User>(&to_storage_map(&user)).unwrap(), user.clone());
        prop_assert_eq!(through_storage(&user), user);
    }

    #[test]
    fn prop_share_survives_storage(share in arb_share()) {
        prop_assert_eq!(through_storage(&share), share);
    }

    #[test]
    fn prop_node_keeps_only_stored_fields(node in arb_node()) {
        let expected = Node {
            id: node.id.clone(),
            created: node.created,
            updated: node.updated,
            size: node.size,
            mime_type: node.mime_type.clone(),
            ..Node::default()
        };
        prop_assert_eq!(through_storage(&node), expected);
    }

    #[test]
    fn prop_session_keeps_only_stored_fields(session in arb_session()) {
        let back = through_storage(&session);
        prop_assert_eq!(&back.token, &session.token);
        prop_assert_eq!(back.valid_until, session.valid_until);
        prop_assert_eq!(back.user_id, UserId::default());
    }

    #[test]
    fn prop_contains_survives_storage(relation in arb_contains()) {
        prop_assert_eq!(through_storage(&relation), relation);
    }

    #[test]
    fn prop_normalize_is_idempotent(raw in "[ a-z/]{0,24}") {
        let once = path::normalize(&raw);
        prop_assert_eq!(path::normalize(&once), once.clone());
        prop_assert!(once.starts_with('/'));
        prop_assert!(once == "/" || !once.ends_with('/'));
    }

    #[test]
    fn prop_join_then_split(parent in "[a-z/]{0,16}", name in "[a-z][a-z.]{0,8}") {
        let joined = path::join(&parent, &name);
        let (dir, last) = path::split(&joined);
        prop_assert_eq!(last, name.as_str());
        prop_assert_eq!(path::segments(dir), path::segments(&parent));
    }
}
