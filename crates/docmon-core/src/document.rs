//! Documents — named instances of a schema whose content is tracked over
//! time.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A tracked document.
///
/// `update_period` and `snapshot_period` are cadence hints for external
/// schedulers; nothing in this crate enforces them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
  pub document_id:     Uuid,
  pub name:            String,
  /// Name of the schema the document conforms to.
  pub schema:          String,
  pub url:             String,
  pub update_period:   u32,
  pub snapshot_period: u32,
  pub created_at:      DateTime<Utc>,
  /// Time of the last successful commit. Never moves backwards.
  pub last_update:     Option<DateTime<Utc>>,
}

/// Input to [`MonitorStore::add_document`](crate::store::MonitorStore::add_document).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewDocument {
  pub name:            String,
  pub schema:          String,
  pub url:             String,
  pub update_period:   u32,
  pub snapshot_period: u32,
}

impl NewDocument {
  /// A document with a one-minute update period and a daily snapshot period.
  pub fn new(
    name: impl Into<String>,
    schema: impl Into<String>,
    url: impl Into<String>,
  ) -> Self {
    Self {
      name:            name.into(),
      schema:          schema.into(),
      url:             url.into(),
      update_period:   60,
      snapshot_period: 86_400,
    }
  }
}
