//! Error types for `docmon-core`.

use chrono::{DateTime, Utc};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  /// An incoming element has no matching schema path, carries text where
  /// children are expected, or repeats at a path without identity.
  #[error("schema mismatch at {path}: {reason}")]
  SchemaMismatch { path: String, reason: String },

  #[error("identity attribute {attribute:?} missing or empty for element {path}")]
  MissingIdentity { path: String, attribute: String },

  #[error(
    "duplicate identity {identity:?} for element {path} under parent {parent:?}"
  )]
  DuplicateIdentity {
    path:     String,
    parent:   String,
    identity: String,
  },

  #[error("no snapshot found for document {document:?} at or before {at}")]
  NoSnapshotFound { document: String, at: DateTime<Utc> },

  #[error(
    "document {document:?} was last updated at {last_update}, not before commit time {now}"
  )]
  TimeOrderingViolation {
    document:    String,
    last_update: DateTime<Utc>,
    now:         DateTime<Utc>,
  },

  #[error("schema not found: {0}")]
  SchemaNotFound(String),

  #[error("document not found: {0}")]
  DocumentNotFound(String),

  #[error("{kind} already exists: {name}")]
  AlreadyExists { kind: &'static str, name: String },

  #[error("invalid schema: {0}")]
  InvalidSchema(String),

  /// The incoming element stream is not a well-formed single-rooted tree.
  #[error("malformed document: {0}")]
  Malformed(String),

  #[error("unknown event kind discriminant: {0:?}")]
  UnknownEventKind(String),

  #[error("output error: {0}")]
  Output(#[from] std::io::Error),

  #[error("persistence error: {0}")]
  Persistence(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl Error {
  /// Wrap a storage backend failure.
  pub fn persistence<E>(err: E) -> Self
  where
    E: std::error::Error + Send + Sync + 'static,
  {
    Self::Persistence(Box::new(err))
  }

  pub(crate) fn mismatch(
    path: impl Into<String>,
    reason: impl Into<String>,
  ) -> Self {
    Self::SchemaMismatch {
      path:   path.into(),
      reason: reason.into(),
    }
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
