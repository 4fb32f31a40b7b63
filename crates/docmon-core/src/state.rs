//! Replayed element state.
//!
//! State is never stored. It is always a fold over the events of one path,
//! rebuilt for each commit or checkout.

use std::collections::{BTreeMap, HashMap};

use crate::event::{Event, EventKind};

/// The materialised attributes and text of one element at some instant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
  pub attrs:      BTreeMap<String, String>,
  pub value:      Option<String>,
  /// Sequence number of the event that introduced the element. Later
  /// changes keep it, so siblings render in first-addition order.
  pub introduced: i64,
}

impl Element {
  /// Whether the element already holds exactly these attributes and text.
  pub fn same_content(
    &self,
    attrs: &BTreeMap<String, String>,
    value: Option<&str>,
  ) -> bool {
    self.value.as_deref() == value && &self.attrs == attrs
  }
}

/// Identity → element, for the siblings under one parent.
pub type ParentState = HashMap<String, Element>;

/// Parent key → siblings, for one path.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PathState {
  parents: HashMap<String, ParentState>,
}

impl PathState {
  pub fn get(&self, parent: &str, identity: &str) -> Option<&Element> {
    self.parents.get(parent)?.get(identity)
  }

  /// Insert or replace an element. A replaced element keeps its
  /// `introduced` sequence.
  pub fn upsert(&mut self, parent: &str, identity: &str, mut element: Element) {
    let siblings = self.parents.entry(parent.to_owned()).or_default();
    if let Some(existing) = siblings.get(identity) {
      element.introduced = existing.introduced;
    }
    siblings.insert(identity.to_owned(), element);
  }

  pub fn remove(&mut self, parent: &str, identity: &str) -> Option<Element> {
    let siblings = self.parents.get_mut(parent)?;
    let removed = siblings.remove(identity);
    if siblings.is_empty() {
      self.parents.remove(parent);
    }
    removed
  }

  /// The elements under `parent`, ordered by introduction then identity.
  pub fn children_of(&self, parent: &str) -> Vec<(&str, &Element)> {
    let mut out: Vec<(&str, &Element)> = self
      .parents
      .get(parent)
      .map(|s| s.iter().map(|(k, v)| (k.as_str(), v)).collect())
      .unwrap_or_default();
    out.sort_by(|a, b| a.1.introduced.cmp(&b.1.introduced).then(a.0.cmp(b.0)));
    out
  }

  /// Every `(parent, identity, element)` triple, in a deterministic order.
  pub fn entries(&self) -> Vec<(&str, &str, &Element)> {
    let mut out: Vec<(&str, &str, &Element)> = self
      .parents
      .iter()
      .flat_map(|(parent, siblings)| {
        siblings
          .iter()
          .map(move |(identity, e)| (parent.as_str(), identity.as_str(), e))
      })
      .collect();
    out.sort_by(|a, b| {
      a.2
        .introduced
        .cmp(&b.2.introduced)
        .then(a.0.cmp(b.0))
        .then(a.1.cmp(b.1))
    });
    out
  }

  pub fn len(&self) -> usize { self.parents.values().map(HashMap::len).sum() }

  pub fn is_empty(&self) -> bool { self.parents.is_empty() }
}

/// Fold the events of one path into its state.
///
/// Events are applied in `(recorded_at, seq)` order regardless of the order
/// they are given in. `snapshot`, `addition` and `change` upsert the element;
/// `removal` deletes it if present. The same events always yield the same
/// state.
pub fn replay<'a, I>(events: I, identity_attr: Option<&str>) -> PathState
where
  I: IntoIterator<Item = &'a Event>,
{
  let mut ordered: Vec<&Event> = events.into_iter().collect();
  ordered.sort_by_key(|e| (e.recorded_at, e.seq));

  let mut state = PathState::default();
  for event in ordered {
    let identity = event.identity(identity_attr);
    match event.kind {
      EventKind::Snapshot | EventKind::Addition | EventKind::Change => {
        state.upsert(&event.parent, identity, Element {
          attrs:      event.attrs.clone(),
          value:      event.value.clone(),
          introduced: event.seq,
        });
      }
      EventKind::Removal => {
        state.remove(&event.parent, identity);
      }
    }
  }
  state
}

#[cfg(test)]
mod tests {
  use chrono::{DateTime, TimeZone, Utc};
  use uuid::Uuid;

  use super::*;

  fn at(secs: i64) -> DateTime<Utc> { Utc.timestamp_opt(secs, 0).unwrap() }

  fn event(
    seq: i64,
    secs: i64,
    kind: EventKind,
    id: &str,
    value: Option<&str>,
  ) -> Event {
    Event {
      seq,
      document_id: Uuid::nil(),
      recorded_at: at(secs),
      kind,
      parent: String::new(),
      value: value.map(str::to_owned),
      attrs: BTreeMap::from([("id".to_owned(), id.to_owned())]),
    }
  }

  #[test]
  fn change_replaces_and_removal_deletes() {
    let events = vec![
      event(1, 10, EventKind::Addition, "a", Some("one")),
      event(2, 10, EventKind::Addition, "b", Some("two")),
      event(3, 20, EventKind::Change, "a", Some("uno")),
      event(4, 30, EventKind::Removal, "b", None),
    ];
    let state = replay(&events, Some("id"));
    assert_eq!(state.len(), 1);
    assert_eq!(state.get("", "a").unwrap().value.as_deref(), Some("uno"));
    assert!(state.get("", "b").is_none());
  }

  #[test]
  fn removal_of_unknown_element_is_a_noop() {
    let events = vec![event(1, 10, EventKind::Removal, "ghost", None)];
    assert!(replay(&events, Some("id")).is_empty());
  }

  #[test]
  fn replay_orders_by_time_then_sequence() {
    let shuffled = vec![
      event(3, 20, EventKind::Removal, "a", None),
      event(2, 10, EventKind::Change, "a", Some("second")),
      event(1, 10, EventKind::Addition, "a", Some("first")),
    ];
    assert!(replay(&shuffled, Some("id")).is_empty());

    let state = replay(&shuffled[1..], Some("id"));
    assert_eq!(state.get("", "a").unwrap().value.as_deref(), Some("second"));
  }

  #[test]
  fn change_keeps_introduction_order() {
    let events = vec![
      event(1, 10, EventKind::Addition, "z", None),
      event(2, 10, EventKind::Addition, "a", None),
      event(3, 20, EventKind::Change, "z", Some("x")),
    ];
    let state = replay(&events, Some("id"));
    let order: Vec<&str> =
      state.children_of("").into_iter().map(|(id, _)| id).collect();
    assert_eq!(order, ["z", "a"]);
  }

  #[test]
  fn path_without_identity_uses_empty_key() {
    let events = vec![event(1, 10, EventKind::Snapshot, "ignored", Some("v"))];
    let state = replay(&events, None);
    assert_eq!(state.get("", "").unwrap().value.as_deref(), Some("v"));
  }
}
