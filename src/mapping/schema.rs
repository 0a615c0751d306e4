//! Schema registrations and the constraints derived from them.

use super::{FieldSpec, GraphModel};
use crate::config::Edition;
use std::fmt;
use std::sync::OnceLock;

/// What a registration describes: nodes carrying a label, or edges of a type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SchemaTarget {
    Node(&'static str),
    Edge(&'static str),
}

impl SchemaTarget {
    /// Label or relationship type.
    pub fn name(&self) -> &'static str {
        match self {
            SchemaTarget::Node(label) | SchemaTarget::Edge(label) => label,
        }
    }
}

/// One registered entity: a target plus the field tables persisted on it.
/// Edges that merge several models list each table.
#[derive(Debug, Clone)]
pub struct Registration {
    pub target: SchemaTarget,
    pub fields: Vec<&'static [FieldSpec]>,
}

impl Registration {
    /// Every field across all tables.
    pub fn all_fields(&self) -> impl Iterator<Item = &'static FieldSpec> + '_ {
        self.fields.iter().flat_map(|table| table.iter())
    }
}

/// Ordered list of registrations, read-only once built.
#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry {
    entries: Vec<Registration>,
}

impl SchemaRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers nodes labelled `label` persisted from `M`.
    pub fn node<M: GraphModel>(mut self, label: &'static str) -> Self {
        self.entries.push(Registration {
            target: SchemaTarget::Node(label),
            fields: vec![M::fields()],
        });
        self
    }

    /// Registers edges of `edge_type` whose properties merge `tables`.
    pub fn edge(mut self, edge_type: &'static str, tables: &[&'static [FieldSpec]]) -> Self {
        self.entries.push(Registration {
            target: SchemaTarget::Edge(edge_type),
            fields: tables.to_vec(),
        });
        self
    }

    /// Registrations in insertion order.
    pub fn entries(&self) -> &[Registration] {
        &self.entries
    }

    /// Derives the constraints the backend should install.
    ///
    /// Existence constraints are only emitted when `edition` supports them.
    pub fn constraints(&self, edition: Edition) -> Vec<Constraint> {
        let mut out = Vec::new();
        for entry in &self.entries {
            for field in entry.all_fields() {
                let Some(property) = field.storage_name() else {
                    continue;
                };
                if field.is_unique() {
                    out.push(Constraint::new(ConstraintKind::Unique, entry.target, property));
                }
                if field.is_indexed() {
                    out.push(Constraint::new(ConstraintKind::Index, entry.target, property));
                }
                if !field.is_optional() && edition.supports_existence_constraints() {
                    out.push(Constraint::new(
                        ConstraintKind::Existence,
                        entry.target,
                        property,
                    ));
                }
            }
        }
        out
    }
}

/// Kind of a derived constraint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConstraintKind {
    Unique,
    Index,
    Existence,
}

impl ConstraintKind {
    fn prefix(self) -> &'static str {
        match self {
            ConstraintKind::Unique => "unique",
            ConstraintKind::Index => "index",
            ConstraintKind::Existence => "property",
        }
    }
}

/// A constraint on one property of one target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Constraint {
    pub kind: ConstraintKind,
    pub target: SchemaTarget,
    pub property: &'static str,
}

impl Constraint {
    fn new(kind: ConstraintKind, target: SchemaTarget, property: &'static str) -> Self {
        Self {
            kind,
            target,
            property,
        }
    }

    /// Deterministic name, so re-installing is a no-op.
    pub fn name(&self) -> String {
        format!(
            "{}_{}_{}",
            self.kind.prefix(),
            self.target.name(),
            self.property
        )
    }
}

impl fmt::Display for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

/// Whether `name` is safe to splice into DDL as a label or property.
pub fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Registrations of every persisted entity, built on first use.
pub fn default_registry() -> &'static SchemaRegistry {
    use crate::model::{ContainsRelation, Node, Session, Share, User};
    use crate::model::{EDGE_CONTAINS, EDGE_CONTAINS_SHARED, LABEL_NODE, LABEL_SESSION, LABEL_USER};

    static REGISTRY: OnceLock<SchemaRegistry> = OnceLock::new();
    REGISTRY.get_or_init(|| {
        SchemaRegistry::new()
            .node::<User>(LABEL_USER)
            .node::<Session>(LABEL_SESSION)
            .node::<Node>(LABEL_NODE)
            .edge(EDGE_CONTAINS, &[ContainsRelation::fields()])
            .edge(
                EDGE_CONTAINS_SHARED,
                &[ContainsRelation::fields(), Share::fields()],
            )
    })
}
