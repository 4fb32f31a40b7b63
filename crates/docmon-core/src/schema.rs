//! Schema types: the installed schema and its flat set of element paths.
//!
//! A schema is immutable once installed. Each element declared in the schema
//! becomes one [`SchemaPath`], addressed by a slash-separated string such as
//! `/root/channel/name`.

use std::collections::HashSet;

use chrono::{DateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Error, Result, path_tree::PathTree};

// ─── Value types ─────────────────────────────────────────────────────────────

/// The type of an attribute value or leaf text, fixed when the path is
/// created.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
  #[default]
  String,
  Integer,
  Float,
  Time,
}

impl ValueType {
  /// Whether `raw` is a valid lexical value of this type.
  pub fn accepts(self, raw: &str) -> bool {
    match self {
      Self::String => true,
      Self::Integer => raw.trim().parse::<i64>().is_ok(),
      Self::Float => raw.trim().parse::<f64>().is_ok(),
      Self::Time => parse_time(raw.trim()).is_some(),
    }
  }
}

/// Parse an `xs:time` lexical value, ignoring any zone suffix.
fn parse_time(raw: &str) -> Option<NaiveTime> {
  let local = raw
    .strip_suffix('Z')
    .or_else(|| {
      raw
        .len()
        .checked_sub(6)
        .filter(|&i| matches!(raw.as_bytes().get(i), Some(b'+' | b'-')))
        .map(|i| &raw[..i])
    })
    .unwrap_or(raw);
  NaiveTime::parse_from_str(local, "%H:%M:%S%.f").ok()
}

// ─── Declarations ────────────────────────────────────────────────────────────

/// One declared attribute of a path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeDecl {
  pub name:       String,
  pub value_type: ValueType,
}

impl AttributeDecl {
  pub fn new(name: impl Into<String>, value_type: ValueType) -> Self {
    Self { name: name.into(), value_type }
  }
}

/// A path as produced by a schema-definition reader, before it is persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathDecl {
  pub path:       String,
  /// Name of the attribute that distinguishes sibling elements at this path.
  pub identity:   Option<String>,
  pub attributes: Vec<AttributeDecl>,
  /// Type of the leaf text; `None` when the element carries no text.
  pub value_type: Option<ValueType>,
}

impl PathDecl {
  /// A text-only leaf with no attributes.
  pub fn leaf(path: impl Into<String>, value_type: ValueType) -> Self {
    Self {
      path:       path.into(),
      identity:   None,
      attributes: vec![],
      value_type: Some(value_type),
    }
  }

  /// An element without text; attributes may be added with
  /// [`PathDecl::attribute`].
  pub fn container(path: impl Into<String>) -> Self {
    Self {
      path:       path.into(),
      identity:   None,
      attributes: vec![],
      value_type: None,
    }
  }

  pub fn attribute(mut self, name: &str, value_type: ValueType) -> Self {
    self.attributes.push(AttributeDecl::new(name, value_type));
    self
  }

  /// Declare `name` as a string attribute and make it the identity attribute.
  pub fn identified_by(mut self, name: &str) -> Self {
    if !self.attributes.iter().any(|a| a.name == name) {
      self.attributes.push(AttributeDecl::new(name, ValueType::String));
    }
    self.identity = Some(name.to_owned());
    self
  }

  pub fn to_path(&self, path_id: i64, schema_id: Uuid) -> SchemaPath {
    SchemaPath {
      path_id,
      schema_id,
      path: self.path.clone(),
      identity: self.identity.clone(),
      attributes: self.attributes.clone(),
      value_type: self.value_type,
    }
  }
}

/// Input to [`MonitorStore::add_schema`](crate::store::MonitorStore::add_schema).
#[derive(Debug, Clone)]
pub struct NewSchema {
  pub name:        String,
  pub description: String,
  /// The raw schema definition text, kept for reference.
  pub definition:  String,
  /// Paths in declaration order.
  pub paths:       Vec<PathDecl>,
}

impl NewSchema {
  /// Reject a schema that could never be committed against: no paths, an
  /// identity attribute that is not declared, repeated attribute names, or a
  /// path set that does not form a tree.
  pub fn validate(&self) -> Result<()> {
    if self.name.trim().is_empty() {
      return Err(Error::InvalidSchema("schema name is empty".into()));
    }
    if self.paths.is_empty() {
      return Err(Error::InvalidSchema(format!(
        "schema {:?} has no paths",
        self.name
      )));
    }

    for decl in &self.paths {
      let mut names = HashSet::new();
      if let Some(dup) = decl.attributes.iter().find(|a| !names.insert(&a.name)) {
        return Err(Error::InvalidSchema(format!(
          "attribute {:?} declared twice at {}",
          dup.name, decl.path
        )));
      }
      if let Some(identity) = &decl.identity
        && !names.contains(identity)
      {
        return Err(Error::InvalidSchema(format!(
          "identity attribute {identity:?} is not declared at {}",
          decl.path
        )));
      }
    }

    let provisional = self
      .paths
      .iter()
      .zip(1..)
      .map(|(decl, path_id)| decl.to_path(path_id, Uuid::nil()))
      .collect();
    PathTree::new(provisional).map(drop)
  }
}

// ─── Persisted records ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Schema {
  pub schema_id:   Uuid,
  pub name:        String,
  pub description: String,
  pub definition:  String,
  pub created_at:  DateTime<Utc>,
}

/// A persisted path. Ids are assigned in declaration order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaPath {
  pub path_id:    i64,
  pub schema_id:  Uuid,
  pub path:       String,
  pub identity:   Option<String>,
  pub attributes: Vec<AttributeDecl>,
  pub value_type: Option<ValueType>,
}

impl SchemaPath {
  pub fn attribute(&self, name: &str) -> Option<&AttributeDecl> {
    self.attributes.iter().find(|a| a.name == name)
  }

  /// The last path segment, i.e. the element tag.
  pub fn tag(&self) -> &str {
    self.path.rsplit('/').next().unwrap_or(&self.path)
  }
}
