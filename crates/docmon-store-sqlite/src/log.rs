//! [`TxLog`] — the [`EventLog`] view of one open SQLite transaction.
//!
//! Besides the reads and appends the engines need, it carries the row-level
//! queries behind registration, listing and history, so every store
//! operation runs through the same transaction-bound handle.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rusqlite::{OptionalExtension as _, params};
use uuid::Uuid;

use docmon_core::{
  document::{Document, NewDocument},
  event::{Event, EventQuery, NewEvent, PathEvent},
  log::EventLog,
  schema::{AttributeDecl, NewSchema, Schema, SchemaPath},
};

use crate::{
  Error, Result,
  encode::{
    RawDocument, RawEvent, RawPath, RawSchema, decode_dt, decode_value_type,
    encode_attrs, encode_dt, encode_kind, encode_uuid, encode_value_type,
  },
};

pub struct TxLog<'c> {
  conn: &'c rusqlite::Connection,
}

impl<'c> TxLog<'c> {
  pub fn new(conn: &'c rusqlite::Connection) -> Self { Self { conn } }

  // ── Schemas ─────────────────────────────────────────────────────────────

  /// Insert a validated schema, its paths in declaration order, and their
  /// attributes.
  pub fn insert_schema(&self, input: NewSchema, now: DateTime<Utc>) -> Result<Schema> {
    if self.find_schema(&input.name)?.is_some() {
      return Err(
        docmon_core::Error::AlreadyExists {
          kind: "schema",
          name: input.name,
        }
        .into(),
      );
    }
    input.validate()?;

    let schema = Schema {
      schema_id:   Uuid::new_v4(),
      name:        input.name,
      description: input.description,
      definition:  input.definition,
      created_at:  now,
    };
    let schema_id = encode_uuid(schema.schema_id);

    self.conn.execute(
      "INSERT INTO schemas (schema_id, name, description, definition, created_at)
       VALUES (?1, ?2, ?3, ?4, ?5)",
      params![
        schema_id,
        schema.name,
        schema.description,
        schema.definition,
        encode_dt(now),
      ],
    )?;

    let mut insert_path = self.conn.prepare(
      "INSERT INTO paths (schema_id, path, identity, value_type)
       VALUES (?1, ?2, ?3, ?4)",
    )?;
    let mut insert_attr = self.conn.prepare(
      "INSERT INTO path_attributes (path_id, position, name, value_type)
       VALUES (?1, ?2, ?3, ?4)",
    )?;
    for decl in &input.paths {
      let path_id = insert_path.insert(params![
        schema_id,
        decl.path,
        decl.identity,
        decl.value_type.map(encode_value_type),
      ])?;
      for (position, attr) in decl.attributes.iter().enumerate() {
        insert_attr.execute(params![
          path_id,
          position as i64,
          attr.name,
          encode_value_type(attr.value_type),
        ])?;
      }
    }

    Ok(schema)
  }

  pub fn list_schemas(&self) -> Result<Vec<Schema>> {
    let mut stmt = self.conn.prepare(&format!(
      "SELECT {} FROM schemas ORDER BY name",
      RawSchema::COLUMNS
    ))?;
    let raws = stmt
      .query_map([], RawSchema::from_row)?
      .collect::<rusqlite::Result<Vec<_>>>()?;
    raws.into_iter().map(RawSchema::into_schema).collect()
  }

  /// Paths of the named schema, sorted by path string.
  pub fn paths_of(&self, schema: &str) -> Result<Vec<SchemaPath>> {
    let found = self
      .find_schema(schema)?
      .ok_or_else(|| docmon_core::Error::SchemaNotFound(schema.to_owned()))?;
    let mut paths = self.schema_paths(found.schema_id)?;
    paths.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(paths)
  }

  // ── Documents ───────────────────────────────────────────────────────────

  pub fn insert_document(
    &self,
    input: NewDocument,
    now: DateTime<Utc>,
  ) -> Result<Document> {
    let schema = self
      .find_schema(&input.schema)?
      .ok_or_else(|| docmon_core::Error::SchemaNotFound(input.schema.clone()))?;
    if self.find_document(&input.name)?.is_some() {
      return Err(
        docmon_core::Error::AlreadyExists {
          kind: "document",
          name: input.name,
        }
        .into(),
      );
    }

    let document = Document {
      document_id:     Uuid::new_v4(),
      name:            input.name,
      schema:          schema.name,
      url:             input.url,
      update_period:   input.update_period,
      snapshot_period: input.snapshot_period,
      created_at:      now,
      last_update:     None,
    };

    self.conn.execute(
      "INSERT INTO documents (
         document_id, name, schema_id, url,
         update_period, snapshot_period, created_at, last_update
       ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, NULL)",
      params![
        encode_uuid(document.document_id),
        document.name,
        encode_uuid(schema.schema_id),
        document.url,
        document.update_period,
        document.snapshot_period,
        encode_dt(now),
      ],
    )?;
    Ok(document)
  }

  pub fn list_documents(&self) -> Result<Vec<Document>> {
    let mut stmt = self
      .conn
      .prepare(&format!("{} ORDER BY d.name", RawDocument::SELECT))?;
    let raws = stmt
      .query_map([], RawDocument::from_row)?
      .collect::<rusqlite::Result<Vec<_>>>()?;
    raws.into_iter().map(RawDocument::into_document).collect()
  }

  // ── History ─────────────────────────────────────────────────────────────

  /// Events of one document with their paths, ascending by `(time, seq)`.
  /// A path filter matches the path itself and everything below it.
  pub fn history(&self, query: &EventQuery) -> Result<Vec<PathEvent>> {
    let document = self
      .find_document(&query.document)?
      .ok_or_else(|| docmon_core::Error::DocumentNotFound(query.document.clone()))?;

    let mut stmt = self.conn.prepare(&format!(
      "SELECT p.path, {}
       FROM events e JOIN paths p ON p.path_id = e.path_id
       WHERE e.document_id = ?1
         AND (?2 IS NULL OR p.path = ?2
              OR substr(p.path, 1, length(?2) + 1) = ?2 || '/')
         AND (?3 IS NULL OR e.recorded_at >= ?3)
         AND (?4 IS NULL OR e.recorded_at <= ?4)
       ORDER BY e.recorded_at, e.seq",
      RawEvent::COLUMNS
    ))?;
    let rows = stmt
      .query_map(
        params![
          encode_uuid(document.document_id),
          query.path,
          query.from.map(encode_dt),
          query.to.map(encode_dt),
        ],
        |row| Ok((row.get::<_, String>(0)?, RawEvent::from_row(row, 1)?)),
      )?
      .collect::<rusqlite::Result<Vec<_>>>()?;

    rows
      .into_iter()
      .map(|(path, raw)| raw.into_path_event(path))
      .collect()
  }

  fn attributes_of(&self, schema_id: &str) -> Result<HashMap<i64, Vec<AttributeDecl>>> {
    let mut stmt = self.conn.prepare(
      "SELECT a.path_id, a.name, a.value_type
       FROM path_attributes a JOIN paths p ON p.path_id = a.path_id
       WHERE p.schema_id = ?1
       ORDER BY a.path_id, a.position",
    )?;
    let rows = stmt
      .query_map(params![schema_id], |row| {
        Ok((
          row.get::<_, i64>(0)?,
          row.get::<_, String>(1)?,
          row.get::<_, String>(2)?,
        ))
      })?
      .collect::<rusqlite::Result<Vec<_>>>()?;

    let mut by_path: HashMap<i64, Vec<AttributeDecl>> = HashMap::new();
    for (path_id, name, value_type) in rows {
      by_path
        .entry(path_id)
        .or_default()
        .push(AttributeDecl::new(name, decode_value_type(&value_type)?));
    }
    Ok(by_path)
  }
}

// ─── EventLog impl ───────────────────────────────────────────────────────────

impl EventLog for TxLog<'_> {
  type Error = Error;

  fn find_schema(&self, name: &str) -> Result<Option<Schema>> {
    let raw = self
      .conn
      .query_row(
        &format!("SELECT {} FROM schemas WHERE name = ?1", RawSchema::COLUMNS),
        params![name],
        RawSchema::from_row,
      )
      .optional()?;
    raw.map(RawSchema::into_schema).transpose()
  }

  fn schema_paths(&self, schema_id: Uuid) -> Result<Vec<SchemaPath>> {
    let schema_id = encode_uuid(schema_id);
    let mut attributes = self.attributes_of(&schema_id)?;

    let mut stmt = self.conn.prepare(
      "SELECT path_id, schema_id, path, identity, value_type
       FROM paths WHERE schema_id = ?1 ORDER BY path_id",
    )?;
    let raws = stmt
      .query_map(params![schema_id], |row| {
        Ok(RawPath {
          path_id:    row.get(0)?,
          schema_id:  row.get(1)?,
          path:       row.get(2)?,
          identity:   row.get(3)?,
          value_type: row.get(4)?,
        })
      })?
      .collect::<rusqlite::Result<Vec<_>>>()?;

    raws
      .into_iter()
      .map(|raw| {
        let attrs = attributes.remove(&raw.path_id).unwrap_or_default();
        raw.into_path(attrs)
      })
      .collect()
  }

  fn find_document(&self, name: &str) -> Result<Option<Document>> {
    let raw = self
      .conn
      .query_row(
        &format!("{} WHERE d.name = ?1", RawDocument::SELECT),
        params![name],
        RawDocument::from_row,
      )
      .optional()?;
    raw.map(RawDocument::into_document).transpose()
  }

  fn append(&self, path_id: i64, event: &NewEvent) -> Result<i64> {
    let mut stmt = self.conn.prepare_cached(
      "INSERT INTO events (
         path_id, document_id, recorded_at, kind, parent, value, attrs
       ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
    )?;
    let seq = stmt.insert(params![
      path_id,
      encode_uuid(event.document_id),
      encode_dt(event.recorded_at),
      encode_kind(event.kind),
      event.parent,
      event.value,
      encode_attrs(&event.attrs)?,
    ])?;
    Ok(seq)
  }

  fn events(
    &self,
    path_id: i64,
    document_id: Uuid,
    from: Option<DateTime<Utc>>,
    to: DateTime<Utc>,
  ) -> Result<Vec<Event>> {
    let mut stmt = self.conn.prepare_cached(&format!(
      "SELECT {} FROM events e
       WHERE e.path_id = ?1 AND e.document_id = ?2
         AND (?3 IS NULL OR e.recorded_at >= ?3)
         AND e.recorded_at <= ?4
       ORDER BY e.recorded_at, e.seq",
      RawEvent::COLUMNS
    ))?;
    let raws = stmt
      .query_map(
        params![
          path_id,
          encode_uuid(document_id),
          from.map(encode_dt),
          encode_dt(to),
        ],
        |row| RawEvent::from_row(row, 0),
      )?
      .collect::<rusqlite::Result<Vec<_>>>()?;
    raws.into_iter().map(RawEvent::into_event).collect()
  }

  fn latest_snapshot(
    &self,
    path_id: i64,
    document_id: Uuid,
    at: DateTime<Utc>,
  ) -> Result<Option<DateTime<Utc>>> {
    let latest: Option<String> = self.conn.query_row(
      "SELECT MAX(recorded_at) FROM events
       WHERE path_id = ?1 AND document_id = ?2
         AND kind = 'snapshot' AND recorded_at <= ?3",
      params![path_id, encode_uuid(document_id), encode_dt(at)],
      |row| row.get(0),
    )?;
    latest.as_deref().map(decode_dt).transpose()
  }

  fn set_last_update(&self, document_id: Uuid, at: DateTime<Utc>) -> Result<()> {
    self.conn.execute(
      "UPDATE documents SET last_update = ?2 WHERE document_id = ?1",
      params![encode_uuid(document_id), encode_dt(at)],
    )?;
    Ok(())
  }
}
