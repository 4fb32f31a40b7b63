//! In-memory [`EventLog`] for engine tests.

use std::cell::{Cell, RefCell};

use chrono::{DateTime, TimeZone, Utc};
use uuid::Uuid;

use crate::{
  document::Document,
  event::{Event, EventKind, NewEvent},
  log::EventLog,
  schema::{PathDecl, Schema, SchemaPath},
  tree::{EventStream, TreeEvent},
};

#[derive(Debug, thiserror::Error)]
#[error("injected append failure")]
pub struct Injected;

pub struct MemoryLog {
  schema:      Schema,
  paths:       Vec<SchemaPath>,
  document:    RefCell<Document>,
  events:      RefCell<Vec<(i64, Event)>>,
  /// Appends left before every further append fails.
  appends_left: Cell<Option<usize>>,
}

pub const DOC: &str = "doc";

pub fn at(secs: i64) -> DateTime<Utc> { Utc.timestamp_opt(secs, 0).unwrap() }

impl MemoryLog {
  pub fn new(decls: Vec<PathDecl>) -> Self {
    let schema_id = Uuid::new_v4();
    let paths = decls
      .iter()
      .zip(1..)
      .map(|(decl, path_id)| decl.to_path(path_id, schema_id))
      .collect();
    Self {
      schema: Schema {
        schema_id,
        name: "test".into(),
        description: String::new(),
        definition: String::new(),
        created_at: at(0),
      },
      paths,
      document: RefCell::new(Document {
        document_id:     Uuid::new_v4(),
        name:            DOC.into(),
        schema:          "test".into(),
        url:             "http://example.invalid/doc".into(),
        update_period:   60,
        snapshot_period: 86_400,
        created_at:      at(0),
        last_update:     None,
      }),
      events: RefCell::new(vec![]),
      appends_left: Cell::new(None),
    }
  }

  pub fn fail_after(&self, appends: usize) {
    self.appends_left.set(Some(appends));
  }

  pub fn last_update(&self) -> Option<DateTime<Utc>> {
    self.document.borrow().last_update
  }

  pub fn set_last(&self, at: DateTime<Utc>) {
    self.document.borrow_mut().last_update = Some(at);
  }

  /// Events recorded under `path`, in append order.
  pub fn events_at(&self, path: &str) -> Vec<Event> {
    let path_id = self
      .paths
      .iter()
      .find(|p| p.path == path)
      .map(|p| p.path_id)
      .expect("known path");
    self
      .events
      .borrow()
      .iter()
      .filter(|(p, _)| *p == path_id)
      .map(|(_, e)| e.clone())
      .collect()
  }

  pub fn count(&self, kind: EventKind) -> usize {
    self
      .events
      .borrow()
      .iter()
      .filter(|(_, e)| e.kind == kind)
      .count()
  }
}

impl EventLog for MemoryLog {
  type Error = Injected;

  fn find_schema(&self, name: &str) -> Result<Option<Schema>, Injected> {
    Ok((self.schema.name == name).then(|| self.schema.clone()))
  }

  fn schema_paths(&self, schema_id: Uuid) -> Result<Vec<SchemaPath>, Injected> {
    Ok(
      self
        .paths
        .iter()
        .filter(|p| p.schema_id == schema_id)
        .cloned()
        .collect(),
    )
  }

  fn find_document(&self, name: &str) -> Result<Option<Document>, Injected> {
    let doc = self.document.borrow();
    Ok((doc.name == name).then(|| doc.clone()))
  }

  fn append(&self, path_id: i64, event: &NewEvent) -> Result<i64, Injected> {
    if let Some(left) = self.appends_left.get() {
      if left == 0 {
        return Err(Injected);
      }
      self.appends_left.set(Some(left - 1));
    }
    let mut events = self.events.borrow_mut();
    let seq = events.len() as i64 + 1;
    events.push((path_id, Event {
      seq,
      document_id: event.document_id,
      recorded_at: event.recorded_at,
      kind: event.kind,
      parent: event.parent.clone(),
      value: event.value.clone(),
      attrs: event.attrs.clone(),
    }));
    Ok(seq)
  }

  fn events(
    &self,
    path_id: i64,
    document_id: Uuid,
    from: Option<DateTime<Utc>>,
    to: DateTime<Utc>,
  ) -> Result<Vec<Event>, Injected> {
    let mut out: Vec<Event> = self
      .events
      .borrow()
      .iter()
      .filter(|(p, e)| {
        *p == path_id
          && e.document_id == document_id
          && from.is_none_or(|f| e.recorded_at >= f)
          && e.recorded_at <= to
      })
      .map(|(_, e)| e.clone())
      .collect();
    out.sort_by_key(|e| (e.recorded_at, e.seq));
    Ok(out)
  }

  fn latest_snapshot(
    &self,
    path_id: i64,
    document_id: Uuid,
    at: DateTime<Utc>,
  ) -> Result<Option<DateTime<Utc>>, Injected> {
    Ok(
      self
        .events
        .borrow()
        .iter()
        .filter(|(p, e)| {
          *p == path_id
            && e.document_id == document_id
            && e.kind == EventKind::Snapshot
            && e.recorded_at <= at
        })
        .map(|(_, e)| e.recorded_at)
        .max(),
    )
  }

  fn set_last_update(
    &self,
    document_id: Uuid,
    at: DateTime<Utc>,
  ) -> Result<(), Injected> {
    let mut doc = self.document.borrow_mut();
    if doc.document_id == document_id {
      doc.last_update = Some(at);
    }
    Ok(())
  }
}

// ─── Tree builders ───────────────────────────────────────────────────────────

/// A `<channel id=".."><name>..</name></channel>` element.
pub fn channel(id: &str, name: &str) -> Vec<TreeEvent> {
  vec![
    TreeEvent::enter("channel", &[("id", id)]),
    TreeEvent::enter("name", &[]),
    TreeEvent::text(name),
    TreeEvent::exit("name"),
    TreeEvent::exit("channel"),
  ]
}

/// Wrap elements in a `<lineup>` root.
pub fn lineup(children: impl IntoIterator<Item = Vec<TreeEvent>>) -> EventStream {
  let mut events = vec![TreeEvent::enter("lineup", &[])];
  events.extend(children.into_iter().flatten());
  events.push(TreeEvent::exit("lineup"));
  EventStream::from(events)
}
