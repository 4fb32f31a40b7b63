//! The [`EventLog`] trait — the engines' view of the backing row-store.
//!
//! An `EventLog` is bound to one open transaction. The commit and checkout
//! engines run synchronously against it; the enclosing store decides when
//! the transaction commits or rolls back.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{
  Error, Result,
  document::Document,
  event::{Event, NewEvent},
  path_tree::PathTree,
  schema::{Schema, SchemaPath},
};

/// Transaction-scoped access to schemas, documents and the append-only event
/// log. No operation updates or deletes an event.
pub trait EventLog {
  type Error: std::error::Error + Send + Sync + 'static;

  fn find_schema(&self, name: &str) -> Result<Option<Schema>, Self::Error>;

  /// All paths of a schema, in any order.
  fn schema_paths(
    &self,
    schema_id: Uuid,
  ) -> Result<Vec<SchemaPath>, Self::Error>;

  fn find_document(&self, name: &str)
  -> Result<Option<Document>, Self::Error>;

  /// Append one event to the log of `path_id` and return its sequence
  /// number.
  fn append(&self, path_id: i64, event: &NewEvent) -> Result<i64, Self::Error>;

  /// Events of one path and document with `from <= time <= to`, ascending by
  /// `(time, seq)`. `from = None` is unbounded.
  fn events(
    &self,
    path_id: i64,
    document_id: Uuid,
    from: Option<DateTime<Utc>>,
    to: DateTime<Utc>,
  ) -> Result<Vec<Event>, Self::Error>;

  /// Time of the latest `snapshot` event of one path and document at or
  /// before `at`.
  fn latest_snapshot(
    &self,
    path_id: i64,
    document_id: Uuid,
    at: DateTime<Utc>,
  ) -> Result<Option<DateTime<Utc>>, Self::Error>;

  fn set_last_update(
    &self,
    document_id: Uuid,
    at: DateTime<Utc>,
  ) -> Result<(), Self::Error>;
}

/// Look up a document and build the path tree of its schema.
pub fn resolve<L: EventLog>(
  log: &L,
  document: &str,
) -> Result<(Document, PathTree)> {
  let doc = log
    .find_document(document)
    .map_err(Error::persistence)?
    .ok_or_else(|| Error::DocumentNotFound(document.to_owned()))?;
  let schema = log
    .find_schema(&doc.schema)
    .map_err(Error::persistence)?
    .ok_or_else(|| Error::SchemaNotFound(doc.schema.clone()))?;
  let paths = log
    .schema_paths(schema.schema_id)
    .map_err(Error::persistence)?;
  let tree = PathTree::new(paths)?;
  if tree.is_empty() {
    return Err(Error::InvalidSchema(format!(
      "schema {:?} has no paths",
      schema.name
    )));
  }
  Ok((doc, tree))
}

/// The anchor time: the latest snapshot at or before `at`.
///
/// A snapshot commit writes an event for every element it visits, including
/// the root, so the top-level paths serve as sentinels for the whole
/// document.
pub fn find_anchor<L: EventLog>(
  log: &L,
  tree: &PathTree,
  document_id: Uuid,
  at: DateTime<Utc>,
) -> Result<Option<DateTime<Utc>>> {
  let mut anchor = None;
  for &root in tree.roots() {
    let found = log
      .latest_snapshot(tree.node(root).path.path_id, document_id, at)
      .map_err(Error::persistence)?;
    anchor = anchor.max(found);
  }
  Ok(anchor)
}
