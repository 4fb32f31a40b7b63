//! Encoding and decoding helpers between domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! Timestamps are stored as fixed-width RFC 3339 strings in UTC with
//! microsecond precision, so lexical order equals time order. Attribute maps
//! are stored as compact JSON objects. UUIDs are stored as hyphenated
//! lowercase strings.

use std::collections::BTreeMap;

use chrono::{DateTime, SecondsFormat, Utc};
use docmon_core::{
  document::Document,
  event::{Event, EventKind, PathEvent},
  schema::{AttributeDecl, Schema, SchemaPath, ValueType},
};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Uuid ────────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

// ─── DateTime<Utc> ───────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String {
  dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(format!("{s:?}: {e}")))
}

// ─── EventKind ───────────────────────────────────────────────────────────────

pub fn encode_kind(k: EventKind) -> &'static str {
  match k {
    EventKind::Snapshot => "snapshot",
    EventKind::Addition => "addition",
    EventKind::Change => "change",
    EventKind::Removal => "removal",
  }
}

pub fn decode_kind(s: &str) -> Result<EventKind> {
  match s {
    "snapshot" => Ok(EventKind::Snapshot),
    "addition" => Ok(EventKind::Addition),
    "change" => Ok(EventKind::Change),
    "removal" => Ok(EventKind::Removal),
    other => Err(docmon_core::Error::UnknownEventKind(other.to_owned()).into()),
  }
}

// ─── ValueType ───────────────────────────────────────────────────────────────

pub fn encode_value_type(t: ValueType) -> &'static str {
  match t {
    ValueType::String => "string",
    ValueType::Integer => "integer",
    ValueType::Float => "float",
    ValueType::Time => "time",
  }
}

pub fn decode_value_type(s: &str) -> Result<ValueType> {
  match s {
    "string" => Ok(ValueType::String),
    "integer" => Ok(ValueType::Integer),
    "float" => Ok(ValueType::Float),
    "time" => Ok(ValueType::Time),
    other => Err(
      docmon_core::Error::InvalidSchema(format!("unknown value type: {other:?}"))
        .into(),
    ),
  }
}

// ─── Attributes ──────────────────────────────────────────────────────────────

pub fn encode_attrs(attrs: &BTreeMap<String, String>) -> Result<String> {
  Ok(serde_json::to_string(attrs)?)
}

pub fn decode_attrs(s: &str) -> Result<BTreeMap<String, String>> {
  Ok(serde_json::from_str(s)?)
}

// ─── Row types ───────────────────────────────────────────────────────────────

pub struct RawSchema {
  pub schema_id:   String,
  pub name:        String,
  pub description: String,
  pub definition:  String,
  pub created_at:  String,
}

impl RawSchema {
  pub const COLUMNS: &'static str =
    "schema_id, name, description, definition, created_at";

  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      schema_id:   row.get(0)?,
      name:        row.get(1)?,
      description: row.get(2)?,
      definition:  row.get(3)?,
      created_at:  row.get(4)?,
    })
  }

  pub fn into_schema(self) -> Result<Schema> {
    Ok(Schema {
      schema_id:   decode_uuid(&self.schema_id)?,
      name:        self.name,
      description: self.description,
      definition:  self.definition,
      created_at:  decode_dt(&self.created_at)?,
    })
  }
}

/// A `paths` row; attributes are read separately from `path_attributes`.
pub struct RawPath {
  pub path_id:    i64,
  pub schema_id:  String,
  pub path:       String,
  pub identity:   Option<String>,
  pub value_type: Option<String>,
}

impl RawPath {
  pub fn into_path(self, attributes: Vec<AttributeDecl>) -> Result<SchemaPath> {
    Ok(SchemaPath {
      path_id: self.path_id,
      schema_id: decode_uuid(&self.schema_id)?,
      path: self.path,
      identity: self.identity,
      attributes,
      value_type: self
        .value_type
        .as_deref()
        .map(decode_value_type)
        .transpose()?,
    })
  }
}

/// A `documents` row joined with the owning schema's name.
pub struct RawDocument {
  pub document_id:     String,
  pub name:            String,
  pub schema:          String,
  pub url:             String,
  pub update_period:   u32,
  pub snapshot_period: u32,
  pub created_at:      String,
  pub last_update:     Option<String>,
}

impl RawDocument {
  pub const SELECT: &'static str = "SELECT d.document_id, d.name, s.name, \
     d.url, d.update_period, d.snapshot_period, d.created_at, d.last_update
     FROM documents d JOIN schemas s ON s.schema_id = d.schema_id";

  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      document_id:     row.get(0)?,
      name:            row.get(1)?,
      schema:          row.get(2)?,
      url:             row.get(3)?,
      update_period:   row.get(4)?,
      snapshot_period: row.get(5)?,
      created_at:      row.get(6)?,
      last_update:     row.get(7)?,
    })
  }

  pub fn into_document(self) -> Result<Document> {
    Ok(Document {
      document_id:     decode_uuid(&self.document_id)?,
      name:            self.name,
      schema:          self.schema,
      url:             self.url,
      update_period:   self.update_period,
      snapshot_period: self.snapshot_period,
      created_at:      decode_dt(&self.created_at)?,
      last_update:     self.last_update.as_deref().map(decode_dt).transpose()?,
    })
  }
}

/// An `events` row, read starting at column `offset`.
pub struct RawEvent {
  pub seq:         i64,
  pub document_id: String,
  pub recorded_at: String,
  pub kind:        String,
  pub parent:      String,
  pub value:       Option<String>,
  pub attrs:       String,
}

impl RawEvent {
  pub const COLUMNS: &'static str =
    "e.seq, e.document_id, e.recorded_at, e.kind, e.parent, e.value, e.attrs";

  pub fn from_row(row: &rusqlite::Row<'_>, offset: usize) -> rusqlite::Result<Self> {
    Ok(Self {
      seq:         row.get(offset)?,
      document_id: row.get(offset + 1)?,
      recorded_at: row.get(offset + 2)?,
      kind:        row.get(offset + 3)?,
      parent:      row.get(offset + 4)?,
      value:       row.get(offset + 5)?,
      attrs:       row.get(offset + 6)?,
    })
  }

  pub fn into_event(self) -> Result<Event> {
    Ok(Event {
      seq:         self.seq,
      document_id: decode_uuid(&self.document_id)?,
      recorded_at: decode_dt(&self.recorded_at)?,
      kind:        decode_kind(&self.kind)?,
      parent:      self.parent,
      value:       self.value,
      attrs:       decode_attrs(&self.attrs)?,
    })
  }

  pub fn into_path_event(self, path: String) -> Result<PathEvent> {
    Ok(PathEvent { path, event: self.into_event()? })
  }
}
