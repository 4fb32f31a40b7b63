//! Events — the immutable facts from which all document state is derived.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
  /// Full state of an element, recorded unconditionally. Replay anchor.
  Snapshot,
  Addition,
  Change,
  Removal,
}

/// An event about to be appended. The store assigns the sequence number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewEvent {
  pub document_id: Uuid,
  pub recorded_at: DateTime<Utc>,
  pub kind:        EventKind,
  /// Parent key; empty at the root or when no ancestor carries an identity.
  pub parent:      String,
  pub value:       Option<String>,
  /// Attribute values, including the path's own identity attribute.
  pub attrs:       BTreeMap<String, String>,
}

/// A persisted event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
  /// Store-assigned insertion sequence; breaks ties between equal times.
  pub seq:         i64,
  pub document_id: Uuid,
  pub recorded_at: DateTime<Utc>,
  pub kind:        EventKind,
  pub parent:      String,
  pub value:       Option<String>,
  pub attrs:       BTreeMap<String, String>,
}

impl Event {
  /// The identity of the element this event is about.
  pub fn identity(&self, identity_attr: Option<&str>) -> &str {
    identity_attr
      .and_then(|name| self.attrs.get(name))
      .map_or("", String::as_str)
  }
}

/// An event together with the path it was recorded under, as returned by
/// history queries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathEvent {
  pub path:  String,
  #[serde(flatten)]
  pub event: Event,
}

/// Parameters for [`MonitorStore::history`](crate::store::MonitorStore::history).
#[derive(Debug, Clone, Default)]
pub struct EventQuery {
  pub document: String,
  /// Restrict to one path, or to the subtree below it.
  pub path:     Option<String>,
  pub from:     Option<DateTime<Utc>>,
  pub to:       Option<DateTime<Utc>>,
}
