//! Domain entities and the labels and edge types they are stored under.

use crate::graph_model;
use crate::mapping::{ConversionError, FromProperty, PropertyValue, ToProperty};
use serde::{Deserialize, Serialize};
use std::fmt;
use time::OffsetDateTime;

pub const LABEL_USER: &str = "User";
pub const LABEL_SESSION: &str = "Session";
pub const LABEL_NODE: &str = "Node";
pub const LABEL_FILE: &str = "File";
pub const LABEL_FOLDER: &str = "Folder";

/// User → their root folder.
pub const EDGE_HAS_ROOT_FOLDER: &str = "HAS_ROOT_FOLDER";
/// Folder → child node, named by the edge.
pub const EDGE_CONTAINS: &str = "CONTAINS";
/// Recipient's root folder → shared node, named by the edge.
pub const EDGE_CONTAINS_SHARED: &str = "CONTAINS_SHARED";
/// User → session.
pub const EDGE_AUTHENTICATES_WITH: &str = "AUTHENTICATES_WITH";

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Wraps an existing identifier.
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            /// Borrowed form.
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// True for the zero value.
            pub fn is_empty(&self) -> bool {
                self.0.is_empty()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }

        impl ToProperty for $name {
            fn to_property(&self) -> PropertyValue {
                PropertyValue::String(self.0.clone())
            }
        }

        impl FromProperty for $name {
            fn from_property(value: &PropertyValue) -> Result<Self, ConversionError> {
                String::from_property(value).map(Self)
            }
        }
    };
}

string_id!(
    /// Opaque user identifier.
    UserId
);
string_id!(
    /// Opaque node identifier.
    NodeId
);
string_id!(
    /// Session token.
    Token
);

impl UserId {
    /// Fresh random identifier.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

impl NodeId {
    /// Fresh random identifier.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

/// File or folder.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum NodeType {
    #[default]
    File,
    Folder,
}

impl NodeType {
    /// Wire and storage form.
    pub fn as_str(self) -> &'static str {
        match self {
            NodeType::File => "FILE",
            NodeType::Folder => "FOLDER",
        }
    }

    /// Structural label carried next to [`LABEL_NODE`].
    pub fn label(self) -> &'static str {
        match self {
            NodeType::File => LABEL_FILE,
            NodeType::Folder => LABEL_FOLDER,
        }
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for NodeType {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "FILE" => Ok(NodeType::File),
            "FOLDER" => Ok(NodeType::Folder),
            _ => Err(ConversionError::new(
                "node type",
                &PropertyValue::String(s.to_string()),
            )),
        }
    }
}

impl ToProperty for NodeType {
    fn to_property(&self) -> PropertyValue {
        PropertyValue::String(self.as_str().to_string())
    }
}

impl FromProperty for NodeType {
    fn from_property(value: &PropertyValue) -> Result<Self, ConversionError> {
        match value {
            PropertyValue::String(s) => s.parse(),
            other => Err(ConversionError::new("node type", other)),
        }
    }
}

/// Access granted through a share. `None` marks a node reached through the
/// requester's own tree.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShareMode {
    #[default]
    None,
    Read,
    ReadWrite,
}

impl ShareMode {
    /// Storage form.
    pub fn as_str(self) -> &'static str {
        match self {
            ShareMode::None => "none",
            ShareMode::Read => "read",
            ShareMode::ReadWrite => "read_write",
        }
    }
}

impl fmt::Display for ShareMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ShareMode {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" | "" => Ok(ShareMode::None),
            "read" => Ok(ShareMode::Read),
            "read_write" | "readwrite" | "read-write" => Ok(ShareMode::ReadWrite),
            _ => Err(ConversionError::new(
                "share mode",
                &PropertyValue::String(s.to_string()),
            )),
        }
    }
}

impl ToProperty for ShareMode {
    fn to_property(&self) -> PropertyValue {
        PropertyValue::String(self.as_str().to_string())
    }
}

impl FromProperty for ShareMode {
    fn from_property(value: &PropertyValue) -> Result<Self, ConversionError> {
        match value {
            PropertyValue::String(s) => s.parse(),
            PropertyValue::Int(0) => Ok(ShareMode::None),
            PropertyValue::Int(1) => Ok(ShareMode::Read),
            PropertyValue::Int(2) => Ok(ShareMode::ReadWrite),
            other => Err(ConversionError::new("share mode", other)),
        }
    }
}

/// A file or folder as seen by one user.
///
/// Only `id`, the timestamps, `size` and `mime_type` live on the stored node.
/// Everything else is filled in per resolution: the name comes from the edge
/// that was crossed, the owner from the non-share path back to a user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    #[serde(with = "time::serde::rfc3339")]
    pub created: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated: OffsetDateTime,
    pub name: String,
    pub size: i64,
    pub mime_type: Option<String>,
    pub owner_id: UserId,
    #[serde(rename = "type")]
    pub node_type: NodeType,
    pub share_mode: ShareMode,
    pub is_starred: bool,
    /// Containing folder path, with trailing separator.
    pub path: String,
    pub full_path: String,
    pub parent_node_id: Option<NodeId>,
    #[serde(skip)]
    pub perspective_user_id: UserId,
}

graph_model! {
    Node as "Node" {
        id [graph = ",id,unique"],
        created,
        updated,
        name [graph = "-"],
        size,
        mime_type [graph = ",optional"],
        owner_id [graph = "-"],
        node_type [serde = "type", graph = "-"],
        share_mode [graph = "-"],
        is_starred [graph = "-"],
        path [graph = "-"],
        full_path [graph = "-"],
        parent_node_id [graph = "-"],
        perspective_user_id [serde = "-"],
    }
}

impl Default for Node {
    fn default() -> Self {
        Self {
            id: NodeId::default(),
            created: OffsetDateTime::UNIX_EPOCH,
            updated: OffsetDateTime::UNIX_EPOCH,
            name: String::new(),
            size: 0,
            mime_type: None,
            owner_id: UserId::default(),
            node_type: NodeType::default(),
            share_mode: ShareMode::default(),
            is_starred: false,
            path: String::new(),
            full_path: String::new(),
            parent_node_id: None,
            perspective_user_id: UserId::default(),
        }
    }
}

impl Node {
    /// Fresh stored part of a node: new id, timestamps set to `now`.
    pub fn fresh(node_type: NodeType, name: &str, now: OffsetDateTime) -> Self {
        let mime_type = match node_type {
            NodeType::File => mime_guess::from_path(name)
                .first()
                .map(|mime| mime.essence_str().to_string()),
            NodeType::Folder => None,
        };
        Self {
            id: NodeId::generate(),
            created: now,
            updated: now,
            node_type,
            mime_type,
            ..Self::default()
        }
    }

    /// True for folders.
    pub fn is_folder(&self) -> bool {
        self.node_type == NodeType::Folder
    }
}

/// Share of a node with another user.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Share {
    pub node_id: NodeId,
    pub owner_id: UserId,
    pub shared_with_id: UserId,
    #[serde(rename = "share_mode")]
    pub mode: ShareMode,
}

graph_model! {
    Share as "Share" {
        node_id,
        owner_id,
        shared_with_id,
        mode [serde = "share_mode"],
    }
}

/// Properties of a containment edge.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContainsRelation {
    pub name: String,
}

graph_model! {
    ContainsRelation as "ContainsRelation" {
        name [graph = "name"],
    }
}

/// A registered account. `password` is stored pre-hashed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    #[serde(with = "time::serde::rfc3339")]
    pub created: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated: OffsetDateTime,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    #[serde(default, skip_serializing)]
    pub password: String,
    pub is_admin: bool,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub last_session: Option<OffsetDateTime>,
}

graph_model! {
    User as "User" {
        id [graph = ",id,unique"],
        created,
        updated,
        first_name,
        last_name,
        email [graph = ",unique"],
        password,
        is_admin,
        last_session [graph = ",optional"],
    }
}

impl Default for User {
    fn default() -> Self {
        Self {
            id: UserId::default(),
            created: OffsetDateTime::UNIX_EPOCH,
            updated: OffsetDateTime::UNIX_EPOCH,
            first_name: String::new(),
            last_name: String::new(),
            email: String::new(),
            password: String::new(),
            is_admin: false,
            last_session: None,
        }
    }
}

impl User {
    /// New, unsaved account.
    pub fn new(
        first_name: impl Into<String>,
        last_name: impl Into<String>,
        email: impl Into<String>,
        password_hash: impl Into<String>,
    ) -> Self {
        Self {
            first_name: first_name.into(),
            last_name: last_name.into(),
            email: email.into(),
            password: password_hash.into(),
            ..Self::default()
        }
    }
}

/// An authenticated session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub token: Token,
    pub user_id: UserId,
    #[serde(with = "time::serde::rfc3339")]
    pub valid_until: OffsetDateTime,
}

graph_model! {
    Session as "Session" {
        token [graph = ",index"],
        user_id [graph = "-"],
        valid_until,
    }
}

impl Default for Session {
    fn default() -> Self {
        Self {
            token: Token::default(),
            user_id: UserId::default(),
            valid_until: OffsetDateTime::UNIX_EPOCH,
        }
    }
}

impl Session {
    /// Whether the session is still usable at `now`.
    pub fn is_valid_at(&self, now: OffsetDateTime) -> bool {
        self.valid_until > now
    }
}
