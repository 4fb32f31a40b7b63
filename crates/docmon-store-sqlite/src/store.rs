//! [`SqliteStore`] — the SQLite implementation of [`MonitorStore`].

use std::path::Path;

use chrono::{DateTime, SubsecRound as _, Utc};
use rusqlite::TransactionBehavior;

use docmon_core::{
  checkout::checkout,
  commit::{CommitMode, CommitSummary, commit},
  document::{Document, NewDocument},
  event::{EventQuery, PathEvent},
  log::EventLog as _,
  schema::{NewSchema, Schema, SchemaPath},
  store::MonitorStore,
  tree::{TreeSink, TreeSource},
};

use crate::{Result, log::TxLog, schema::SCHEMA};

// ─── Store ───────────────────────────────────────────────────────────────────

/// A docmon store backed by a single SQLite file.
///
/// Cloning is cheap; the inner connection is reference-counted. All clones
/// share one connection thread, so commits are serialized.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store — useful for testing.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  /// Run `f` inside one transaction on the connection thread. The
  /// transaction commits only if `f` succeeds; otherwise it is dropped and
  /// rolled back.
  async fn transact<T, F>(&self, behavior: TransactionBehavior, f: F) -> Result<T>
  where
    T: Send + 'static,
    F: FnOnce(&TxLog<'_>) -> Result<T> + Send + 'static,
  {
    self
      .conn
      .call(move |conn| {
        let tx = conn.transaction_with_behavior(behavior)?;
        let outcome = f(&TxLog::new(&tx));
        if outcome.is_ok() {
          tx.commit()?;
        }
        Ok(outcome)
      })
      .await?
  }

  /// Commit `source` with an explicit commit time instead of the wall
  /// clock. Used for backfilling and for deterministic tests.
  #[tracing::instrument(skip(self, source), err)]
  pub async fn commit_at<S>(
    &self,
    document: &str,
    source: S,
    mode: CommitMode,
    now: DateTime<Utc>,
  ) -> Result<CommitSummary>
  where
    S: TreeSource + Send + 'static,
  {
    self.commit_with(document, source, mode, move || now).await
  }

  /// Run the commit engine under the write lock. `clock` is read only once
  /// the lock is held, so commit times follow commit order.
  async fn commit_with<S, C>(
    &self,
    document: &str,
    source: S,
    mode: CommitMode,
    clock: C,
  ) -> Result<CommitSummary>
  where
    S: TreeSource + Send + 'static,
    C: FnOnce() -> DateTime<Utc> + Send + 'static,
  {
    let document = document.to_owned();
    self
      .transact(TransactionBehavior::Immediate, move |log| {
        let now = clock().trunc_subsecs(6);
        Ok(commit(log, &document, source, mode, now)?)
      })
      .await
  }
}

// ─── MonitorStore impl ───────────────────────────────────────────────────────

impl MonitorStore for SqliteStore {
  type Error = crate::Error;

  // ── Schemas ─────────────────────────────────────────────────────────────

  #[tracing::instrument(skip(self, input), fields(schema = %input.name), err)]
  async fn add_schema(&self, input: NewSchema) -> Result<Schema> {
    let now = Utc::now().trunc_subsecs(6);
    let schema = self
      .transact(TransactionBehavior::Immediate, move |log| {
        log.insert_schema(input, now)
      })
      .await?;
    tracing::info!(schema = %schema.name, id = %schema.schema_id, "schema installed");
    Ok(schema)
  }

  async fn get_schema<'a>(&'a self, name: &'a str) -> Result<Option<Schema>> {
    let name = name.to_owned();
    self
      .transact(TransactionBehavior::Deferred, move |log| log.find_schema(&name))
      .await
  }

  async fn list_schemas(&self) -> Result<Vec<Schema>> {
    self
      .transact(TransactionBehavior::Deferred, |log| log.list_schemas())
      .await
  }

  async fn schema_paths<'a>(&'a self, schema: &'a str) -> Result<Vec<SchemaPath>> {
    let schema = schema.to_owned();
    self
      .transact(TransactionBehavior::Deferred, move |log| log.paths_of(&schema))
      .await
  }

  // ── Documents ───────────────────────────────────────────────────────────

  #[tracing::instrument(skip(self, input), fields(document = %input.name), err)]
  async fn add_document(&self, input: NewDocument) -> Result<Document> {
    let now = Utc::now().trunc_subsecs(6);
    let document = self
      .transact(TransactionBehavior::Immediate, move |log| {
        log.insert_document(input, now)
      })
      .await?;
    tracing::info!(
      document = %document.name,
      schema = %document.schema,
      "document registered"
    );
    Ok(document)
  }

  async fn get_document<'a>(&'a self, name: &'a str) -> Result<Option<Document>> {
    let name = name.to_owned();
    self
      .transact(TransactionBehavior::Deferred, move |log| log.find_document(&name))
      .await
  }

  async fn list_documents(&self) -> Result<Vec<Document>> {
    self
      .transact(TransactionBehavior::Deferred, |log| log.list_documents())
      .await
  }

  // ── Commit / checkout ───────────────────────────────────────────────────

  #[tracing::instrument(skip(self, source), err)]
  async fn commit<'a, S>(
    &'a self,
    document: &'a str,
    source: S,
    mode: CommitMode,
  ) -> Result<CommitSummary>
  where
    S: TreeSource + Send + 'static,
  {
    self.commit_with(document, source, mode, Utc::now).await
  }

  #[tracing::instrument(skip(self, sink), err)]
  async fn checkout<'a, K>(
    &'a self,
    document: &'a str,
    at: DateTime<Utc>,
    sink: K,
  ) -> Result<K>
  where
    K: TreeSink + Send + 'static,
  {
    let document = document.to_owned();
    self
      .transact(TransactionBehavior::Deferred, move |log| {
        let mut sink = sink;
        checkout(log, &document, at, &mut sink)?;
        Ok(sink)
      })
      .await
  }

  // ── Reads ───────────────────────────────────────────────────────────────

  async fn history<'a>(&'a self, query: &'a EventQuery) -> Result<Vec<PathEvent>> {
    let query = query.clone();
    self
      .transact(TransactionBehavior::Deferred, move |log| log.history(&query))
      .await
  }
}
