//! The `MonitorStore` trait — the async facade over a storage backend.
//!
//! The trait is implemented by storage backends (e.g. `docmon-store-sqlite`).
//! Every method runs as one transaction: a failing commit leaves no events
//! behind, and a checkout reads one consistent view of the log.

use std::future::Future;

use chrono::{DateTime, Utc};

use crate::{
  commit::{CommitMode, CommitSummary},
  document::{Document, NewDocument},
  event::{EventQuery, PathEvent},
  schema::{NewSchema, Schema, SchemaPath},
  tree::{TreeSink, TreeSource},
};

/// Abstraction over a docmon store backend.
///
/// Commits to one store are serialized by the backend; callers do not need
/// their own per-document lock.
pub trait MonitorStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  // ── Schemas ───────────────────────────────────────────────────────────

  /// Install a schema and its paths. Fails if the name is taken.
  fn add_schema(
    &self,
    input: NewSchema,
  ) -> impl Future<Output = Result<Schema, Self::Error>> + Send + '_;

  fn get_schema<'a>(
    &'a self,
    name: &'a str,
  ) -> impl Future<Output = Result<Option<Schema>, Self::Error>> + Send + 'a;

  fn list_schemas(
    &self,
  ) -> impl Future<Output = Result<Vec<Schema>, Self::Error>> + Send + '_;

  /// The paths of a schema, sorted by path string.
  fn schema_paths<'a>(
    &'a self,
    schema: &'a str,
  ) -> impl Future<Output = Result<Vec<SchemaPath>, Self::Error>> + Send + 'a;

  // ── Documents ─────────────────────────────────────────────────────────

  /// Register a document against an installed schema.
  fn add_document(
    &self,
    input: NewDocument,
  ) -> impl Future<Output = Result<Document, Self::Error>> + Send + '_;

  fn get_document<'a>(
    &'a self,
    name: &'a str,
  ) -> impl Future<Output = Result<Option<Document>, Self::Error>> + Send + 'a;

  fn list_documents(
    &self,
  ) -> impl Future<Output = Result<Vec<Document>, Self::Error>> + Send + '_;

  // ── Commit / checkout ─────────────────────────────────────────────────

  /// Commit `source` as the current content of `document`, timestamped with
  /// the store's clock.
  fn commit<'a, S>(
    &'a self,
    document: &'a str,
    source: S,
    mode: CommitMode,
  ) -> impl Future<Output = Result<CommitSummary, Self::Error>> + Send + 'a
  where
    S: TreeSource + Send + 'static;

  /// Render `document` as of `at` into `sink` and hand the sink back.
  fn checkout<'a, K>(
    &'a self,
    document: &'a str,
    at: DateTime<Utc>,
    sink: K,
  ) -> impl Future<Output = Result<K, Self::Error>> + Send + 'a
  where
    K: TreeSink + Send + 'static;

  // ── Reads ─────────────────────────────────────────────────────────────

  /// Raw events of a document, ascending by time.
  fn history<'a>(
    &'a self,
    query: &'a EventQuery,
  ) -> impl Future<Output = Result<Vec<PathEvent>, Self::Error>> + Send + 'a;
}
