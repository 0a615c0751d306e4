//! Entity ↔ graph-property mapping.
//!
//! Every persisted entity carries a static table of [`FieldSpec`]s produced by
//! the [`graph_model!`](crate::graph_model) macro. The table drives three
//! things: which properties are written ([`to_storage_map`]), how stored
//! properties flow back into a value ([`hydrate`]) and which constraints the
//! schema installer derives ([`schema`]).
//!
//! Storage names resolve in three tiers: the name segment of the `graph` tag,
//! then the name segment of the `serde` tag, then the Rust identifier. A `-`
//! name on either tag marks the field transient.

pub mod schema;

use crate::error::{PersistenceError, Result};
use serde_json::{Map, Number, Value};
use std::collections::BTreeMap;
use thiserror::Error;
use time::OffsetDateTime;

/// Name reserved for transient fields.
pub const TRANSIENT: &str = "-";

/// A single graph property.
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    DateTime(OffsetDateTime),
}

/// Property document of a node or edge, keyed by storage name.
pub type PropertyMap = BTreeMap<String, PropertyValue>;

impl PropertyValue {
    /// Short type name used in conversion errors.
    pub fn type_name(&self) -> &'static str {
        match self {
            PropertyValue::Null => "null",
            PropertyValue::Bool(_) => "bool",
            PropertyValue::Int(_) => "int",
            PropertyValue::Float(_) => "float",
            PropertyValue::String(_) => "string",
            PropertyValue::DateTime(_) => "datetime",
        }
    }

    /// JSON encoding used in the property columns. Timestamps become Unix
    /// nanoseconds so they compare numerically inside queries.
    pub fn to_json(&self) -> Value {
        match self {
            PropertyValue::Null => Value::Null,
            PropertyValue::Bool(b) => Value::Bool(*b),
            PropertyValue::Int(i) => Value::Number((*i).into()),
            PropertyValue::Float(f) => Number::from_f64(*f).map_or(Value::Null, Value::Number),
            PropertyValue::String(s) => Value::String(s.clone()),
            PropertyValue::DateTime(dt) => Value::Number(unix_nanos(*dt).into()),
        }
    }

    /// Reverse of [`PropertyValue::to_json`]. Nested documents are kept as
    /// their JSON text.
    pub fn from_json(value: &Value) -> PropertyValue {
        match value {
            Value::Null => PropertyValue::Null,
            Value::Bool(b) => PropertyValue::Bool(*b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => PropertyValue::Int(i),
                None => PropertyValue::Float(n.as_f64().unwrap_or_default()),
            },
            Value::String(s) => PropertyValue::String(s.clone()),
            other => PropertyValue::String(other.to_string()),
        }
    }
}

/// Clamped Unix timestamp in nanoseconds.
pub fn unix_nanos(dt: OffsetDateTime) -> i64 {
    dt.unix_timestamp_nanos()
        .clamp(i64::MIN as i128, i64::MAX as i128) as i64
}

/// Serializes a property map into the JSON text stored in the graph.
pub fn encode_properties(props: &PropertyMap) -> String {
    let object: Map<String, Value> = props
        .iter()
        .map(|(key, value)| (key.clone(), value.to_json()))
        .collect();
    Value::Object(object).to_string()
}

/// Parses a stored property document. Anything but a JSON object is a
/// conversion failure attributed to `model`.
pub fn decode_properties(model: &'static str, json: &str) -> Result<PropertyMap> {
    let value: Value =
        serde_json::from_str(json).map_err(|err| PersistenceError::ModelConversion {
            model,
            field: "<properties>".to_string(),
            reason: err.to_string(),
        })?;
    match value {
        Value::Object(object) => Ok(object
            .iter()
            .map(|(key, value)| (key.clone(), PropertyValue::from_json(value)))
            .collect()),
        other => Err(PersistenceError::ModelConversion {
            model,
            field: "<properties>".to_string(),
            reason: format!("expected object, found {other}"),
        }),
    }
}

/// A stored value could not be coerced into a field's type.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("expected {expected}, found {found}")]
pub struct ConversionError {
    /// Type the field wanted.
    pub expected: &'static str,
    /// What the store held.
    pub found: String,
}

impl ConversionError {
    /// Builds an error describing `value`.
    pub fn new(expected: &'static str, value: &PropertyValue) -> Self {
        let found = match value {
            PropertyValue::String(s) => format!("string {s:?}"),
            PropertyValue::Int(i) => format!("int {i}"),
            other => other.type_name().to_string(),
        };
        Self { expected, found }
    }
}

/// Conversion into a graph property.
pub trait ToProperty {
    /// Encodes the value.
    fn to_property(&self) -> PropertyValue;
}

/// Coercing conversion out of a graph property.
pub trait FromProperty: Sized {
    /// Decodes `value`, coercing where the representation allows it.
    fn from_property(value: &PropertyValue) -> std::result::Result<Self, ConversionError>;
}

impl ToProperty for String {
    fn to_property(&self) -> PropertyValue {
        PropertyValue::String(self.clone())
    }
}

impl FromProperty for String {
    fn from_property(value: &PropertyValue) -> std::result::Result<Self, ConversionError> {
        match value {
            PropertyValue::String(s) => Ok(s.clone()),
            PropertyValue::Int(i) => Ok(i.to_string()),
            other => Err(ConversionError::new("string", other)),
        }
    }
}

impl ToProperty for bool {
    fn to_property(&self) -> PropertyValue {
        PropertyValue::Bool(*self)
    }
}

impl FromProperty for bool {
    fn from_property(value: &PropertyValue) -> std::result::Result<Self, ConversionError> {
        match value {
            PropertyValue::Bool(b) => Ok(*b),
            PropertyValue::Int(0) => Ok(false),
            PropertyValue::Int(1) => Ok(true),
            other => Err(ConversionError::new("bool", other)),
        }
    }
}

impl ToProperty for i64 {
    fn to_property(&self) -> PropertyValue {
        PropertyValue::Int(*self)
    }
}

impl FromProperty for i64 {
    fn from_property(value: &PropertyValue) -> std::result::Result<Self, ConversionError> {
        match value {
            PropertyValue::Int(i) => Ok(*i),
            PropertyValue::Float(f) if f.fract() == 0.0 => Ok(*f as i64),
            other => Err(ConversionError::new("int", other)),
        }
    }
}

impl ToProperty for f64 {
    fn to_property(&self) -> PropertyValue {
        PropertyValue::Float(*self)
    }
}

impl FromProperty for f64 {
    fn from_property(value: &PropertyValue) -> std::result::Result<Self, ConversionError> {
        match value {
            PropertyValue::Float(f) => Ok(*f),
            PropertyValue::Int(i) => Ok(*i as f64),
            other => Err(ConversionError::new("float", other)),
        }
    }
}

impl ToProperty for OffsetDateTime {
    fn to_property(&self) -> PropertyValue {
        PropertyValue::DateTime(*self)
    }
}

impl FromProperty for OffsetDateTime {
    fn from_property(value: &PropertyValue) -> std::result::Result<Self, ConversionError> {
        match value {
            PropertyValue::DateTime(dt) => Ok(*dt),
            PropertyValue::Int(nanos) => OffsetDateTime::from_unix_timestamp_nanos(*nanos as i128)
                .map_err(|_| ConversionError::new("datetime", value)),
            PropertyValue::String(text) => {
                OffsetDateTime::parse(text, &time::format_description::well_known::Rfc3339)
                    .map_err(|_| ConversionError::new("datetime", value))
            }
            other => Err(ConversionError::new("datetime", other)),
        }
    }
}

impl<T: ToProperty> ToProperty for Option<T> {
    fn to_property(&self) -> PropertyValue {
        self.as_ref()
            .map_or(PropertyValue::Null, ToProperty::to_property)
    }
}

impl<T: FromProperty> FromProperty for Option<T> {
    fn from_property(value: &PropertyValue) -> std::result::Result<Self, ConversionError> {
        match value {
            PropertyValue::Null => Ok(None),
            other => T::from_property(other).map(Some),
        }
    }
}

/// Static persistence descriptor of one struct field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    /// Rust identifier.
    pub ident: &'static str,
    /// Serialization tag (`name[,...]`), mirroring `#[serde(rename)]`.
    pub serde: Option<&'static str>,
    /// Persistence tag (`name[,flag...]`).
    pub graph: Option<&'static str>,
}

fn tag_name(tag: &str) -> &str {
    tag.split(',').next().unwrap_or_default().trim()
}

impl FieldSpec {
    /// Descriptor with neither tag.
    pub const fn new(ident: &'static str) -> Self {
        Self {
            ident,
            serde: None,
            graph: None,
        }
    }

    /// Sets the serialization tag.
    pub const fn serde(self, tag: &'static str) -> Self {
        Self {
            serde: Some(tag),
            ..self
        }
    }

    /// Sets the persistence tag.
    pub const fn graph(self, tag: &'static str) -> Self {
        Self {
            graph: Some(tag),
            ..self
        }
    }

    /// Persisted property name, or `None` for transient fields.
    pub fn storage_name(&self) -> Option<&'static str> {
        let graph = self.graph.map(tag_name);
        let serde = self.serde.map(tag_name);
        if graph == Some(TRANSIENT) || serde == Some(TRANSIENT) {
            return None;
        }
        [graph, serde]
            .into_iter()
            .flatten()
            .find(|name| !name.is_empty())
            .or(Some(self.ident))
    }

    /// True when the field is never persisted.
    pub fn is_transient(&self) -> bool {
        self.storage_name().is_none()
    }

    fn has_flag(&self, flag: &str) -> bool {
        self.graph
            .map(|tag| tag.split(',').skip(1).any(|segment| segment.trim() == flag))
            .unwrap_or(false)
    }

    /// `unique` flag: install a uniqueness constraint.
    pub fn is_unique(&self) -> bool {
        self.has_flag("unique")
    }

    /// `index` flag: install a lookup index.
    pub fn is_indexed(&self) -> bool {
        self.has_flag("index")
    }

    /// `optional` flag. Fields without a persistence tag are optional.
    pub fn is_optional(&self) -> bool {
        self.graph.is_none() || self.has_flag("optional")
    }

    /// `id` flag: the entity's generated identifier.
    pub fn is_generated_key(&self) -> bool {
        self.has_flag("id")
    }
}

/// An entity with a static field table. Implement with
/// [`graph_model!`](crate::graph_model).
pub trait GraphModel: Default {
    /// Name used in conversion errors.
    const MODEL: &'static str;

    /// Field descriptors in declaration order.
    fn fields() -> &'static [FieldSpec];

    /// Current value of the field named `ident`.
    fn property(&self, ident: &str) -> Option<PropertyValue>;

    /// Coerces `value` into the field named `ident`. Unknown idents are ignored.
    fn assign(&mut self, ident: &str, value: &PropertyValue)
        -> std::result::Result<(), ConversionError>;
}

/// Implements [`GraphModel`] for a struct.
///
/// ```ignore
/// graph_model! {
///     User as "User" {
///         id [graph = "id,id,unique"],
///         first_name,
///         password [serde = "-"],
///     }
/// }
/// ```
///
/// Every listed field type must implement
/// [`ToProperty`](crate::mapping::ToProperty) and
/// [`FromProperty`](crate::mapping::FromProperty).
#[macro_export]
macro_rules! graph_model {
    ($ty:ty as $model:literal {
        $( $field:ident $( [ $( $key:ident = $tag:literal ),* $(,)? ] )? ),* $(,)?
    }) => {
        impl $crate::mapping::GraphModel for $ty {
            const MODEL: &'static str = $model;

            fn fields() -> &'static [$crate::mapping::FieldSpec] {
                const FIELDS: &[$crate::mapping::FieldSpec] = &[
                    $(
                        $crate::mapping::FieldSpec::new(stringify!($field))
                            $( $( .$key($tag) )* )?
                    ),*
                ];
                FIELDS
            }

            fn property(&self, ident: &str) -> Option<$crate::mapping::PropertyValue> {
                match ident {
                    $(
                        stringify!($field) => {
                            Some($crate::mapping::ToProperty::to_property(&self.$field))
                        }
                    )*
                    _ => None,
                }
            }

            fn assign(
                &mut self,
                ident: &str,
                value: &$crate::mapping::PropertyValue,
            ) -> ::std::result::Result<(), $crate::mapping::ConversionError> {
                match ident {
                    $(
                        stringify!($field) => {
                            self.$field = $crate::mapping::FromProperty::from_property(value)?;
                            Ok(())
                        }
                    )*
                    _ => Ok(()),
                }
            }
        }
    };
}

/// Property map of every persisted field of `model`.
pub fn to_storage_map<M: GraphModel>(model: &M) -> PropertyMap {
    M::fields()
        .iter()
        .filter_map(|field| {
            let name = field.storage_name()?;
            let value = model.property(field.ident)?;
            Some((name.to_string(), value))
        })
        .collect()
}

/// Copies every present, persisted property into `model`.
///
/// Missing properties leave their field untouched; transient fields are never
/// read.
pub fn hydrate<M: GraphModel>(props: &PropertyMap, model: &mut M) -> Result<()> {
    for field in M::fields() {
        let Some(name) = field.storage_name() else {
            continue;
        };
        let Some(value) = props.get(name) else {
            continue;
        };
        model
            .assign(field.ident, value)
            .map_err(|err| PersistenceError::ModelConversion {
                model: M::MODEL,
                field: field.ident.to_string(),
                reason: err.to_string(),
            })?;
    }
    Ok(())
}

/// Hydrates a fresh `M::default()`.
pub fn hydrate_new<M: GraphModel>(props: &PropertyMap) -> Result<M> {
    let mut model = M::default();
    hydrate(props, &mut model)?;
    Ok(model)
}
