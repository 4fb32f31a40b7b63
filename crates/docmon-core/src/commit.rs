//! The commit engine.
//!
//! An incoming document is walked depth-first in lock-step with the
//! [`PathTree`]. Each element is matched by `(path, parent key, identity)`
//! against the baseline state replayed from the event log and classified as
//! an addition, a change, or unchanged. Baseline elements that the document
//! no longer contains are then recorded as removals.
//!
//! The parent key of an element is the identity of its nearest ancestor whose
//! path declares an identity attribute, or the empty string if there is none.

use std::collections::{BTreeMap, HashMap, HashSet, hash_map::Entry};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
  Error, Result,
  document::Document,
  event::{EventKind, NewEvent},
  log::{EventLog, find_anchor, resolve},
  path_tree::PathTree,
  schema::SchemaPath,
  state::{PathState, replay},
  tree::{TreeEvent, TreeSource},
};

const WHITESPACE: [char; 4] = [' ', '\t', '\r', '\n'];

#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum CommitMode {
  /// Diff against the replayed baseline; record additions, changes and
  /// removals.
  #[default]
  Incremental,
  /// Record every element unconditionally as a snapshot event. No removals
  /// are recorded.
  Snapshot,
}

/// What a commit appended.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommitSummary {
  pub document:     String,
  pub mode:         CommitMode,
  pub committed_at: DateTime<Utc>,
  /// The snapshot the baseline was replayed from, for incremental commits.
  pub anchor:       Option<DateTime<Utc>>,
  pub snapshots:    usize,
  pub additions:    usize,
  pub changes:      usize,
  pub removals:     usize,
}

impl CommitSummary {
  pub fn total(&self) -> usize {
    self.snapshots + self.additions + self.changes + self.removals
  }
}

/// Commit `source` as the content of `document` at time `now`.
///
/// `now` must be strictly later than the document's last update. Events are
/// appended to `log` as the walk proceeds; on error the caller must discard
/// the enclosing transaction.
pub fn commit<L, S>(
  log: &L,
  document: &str,
  source: S,
  mode: CommitMode,
  now: DateTime<Utc>,
) -> Result<CommitSummary>
where
  L: EventLog,
  S: TreeSource,
{
  let (doc, tree) = resolve(log, document)?;

  // Each commit owns a distinct instant.
  if let Some(last_update) = doc.last_update
    && last_update >= now
  {
    return Err(Error::TimeOrderingViolation {
      document: doc.name.clone(),
      last_update,
      now,
    });
  }

  let anchor = match mode {
    CommitMode::Incremental => {
      find_anchor(log, &tree, doc.document_id, now)?
    }
    CommitMode::Snapshot => None,
  };

  let mut committer = Committer {
    log,
    tree: &tree,
    document: &doc,
    source,
    mode,
    now,
    baselines: BaselineCache {
      document_id: doc.document_id,
      anchor,
      now,
      entries: HashMap::new(),
    },
    seen: HashSet::new(),
    summary: CommitSummary {
      document: doc.name.clone(),
      mode,
      committed_at: now,
      anchor,
      snapshots: 0,
      additions: 0,
      changes: 0,
      removals: 0,
    },
  };

  let (tag, attrs) = committer.root_element()?;
  let root = tree
    .root(&tag)
    .ok_or_else(|| Error::mismatch(format!("/{tag}"), "no such path in schema"))?;
  committer.walk(root, "", attrs)?;
  committer.expect_end()?;

  if mode == CommitMode::Incremental {
    committer.record_removals()?;
  }

  log
    .set_last_update(doc.document_id, now)
    .map_err(Error::persistence)?;

  let summary = committer.summary;
  tracing::info!(
    document = %summary.document,
    mode = ?summary.mode,
    snapshots = summary.snapshots,
    additions = summary.additions,
    changes = summary.changes,
    removals = summary.removals,
    "document committed"
  );
  Ok(summary)
}

// ─── Baseline ────────────────────────────────────────────────────────────────

struct Baseline {
  state:     PathState,
  /// `(parent, identity)` pairs matched or added by this commit.
  preserved: HashSet<(String, String)>,
}

/// Baseline state per path node, replayed the first time the node is
/// touched and kept for the rest of one commit.
struct BaselineCache {
  document_id: uuid::Uuid,
  anchor:      Option<DateTime<Utc>>,
  now:         DateTime<Utc>,
  entries:     HashMap<usize, Baseline>,
}

impl BaselineCache {
  fn get<L: EventLog>(
    &mut self,
    log: &L,
    tree: &PathTree,
    node: usize,
  ) -> Result<&mut Baseline> {
    match self.entries.entry(node) {
      Entry::Occupied(entry) => Ok(entry.into_mut()),
      Entry::Vacant(entry) => {
        let path = &tree.node(node).path;
        let events = log
          .events(path.path_id, self.document_id, self.anchor, self.now)
          .map_err(Error::persistence)?;
        let state = replay(&events, path.identity.as_deref());
        Ok(entry.insert(Baseline {
          state,
          preserved: HashSet::new(),
        }))
      }
    }
  }
}

// ─── Walk ────────────────────────────────────────────────────────────────────

struct Committer<'a, L, S> {
  log:       &'a L,
  tree:      &'a PathTree,
  document:  &'a Document,
  source:    S,
  mode:      CommitMode,
  now:       DateTime<Utc>,
  baselines: BaselineCache,
  /// `(node, parent, identity)` of every element seen in this document.
  seen:      HashSet<(usize, String, String)>,
  summary:   CommitSummary,
}

impl<L: EventLog, S: TreeSource> Committer<'_, L, S> {
  fn root_element(&mut self) -> Result<(String, Vec<(String, String)>)> {
    loop {
      match self.source.next_event()? {
        Some(TreeEvent::Enter { name, attrs }) => return Ok((name, attrs)),
        Some(TreeEvent::Text(text)) if text.trim_matches(WHITESPACE).is_empty() => {}
        Some(TreeEvent::Text(_)) => {
          return Err(Error::Malformed("text outside the root element".into()));
        }
        Some(TreeEvent::Exit { name }) => {
          return Err(Error::Malformed(format!("unbalanced end of {name:?}")));
        }
        None => {
          return Err(Error::Malformed("document has no root element".into()));
        }
      }
    }
  }

  fn expect_end(&mut self) -> Result<()> {
    loop {
      match self.source.next_event()? {
        None => return Ok(()),
        Some(TreeEvent::Text(text)) if text.trim_matches(WHITESPACE).is_empty() => {}
        Some(_) => {
          return Err(Error::Malformed("content after the root element".into()));
        }
      }
    }
  }

  fn walk(
    &mut self,
    node: usize,
    parent: &str,
    attrs: Vec<(String, String)>,
  ) -> Result<()> {
    let tree = self.tree;
    let path = &tree.node(node).path;
    let attrs = check_attributes(path, attrs)?;
    let identity = self.claim_identity(node, parent, &attrs)?;
    let child_parent = if path.identity.is_some() {
      identity.clone()
    } else {
      parent.to_owned()
    };

    let mut value = String::new();
    loop {
      match self.source.next_event()? {
        Some(TreeEvent::Enter { name, attrs }) => {
          let child = tree.child(node, &name).ok_or_else(|| {
            Error::mismatch(
              format!("{}/{name}", path.path),
              "no such path in schema",
            )
          })?;
          self.walk(child, &child_parent, attrs)?;
        }
        Some(TreeEvent::Text(text)) => {
          let token = text.trim_matches(WHITESPACE);
          if token.is_empty() {
            continue;
          }
          if !tree.node(node).is_leaf() {
            return Err(Error::mismatch(
              &path.path,
              "text is not allowed at a path with child elements",
            ));
          }
          if !value.is_empty() {
            value.push(' ');
          }
          value.push_str(token);
        }
        Some(TreeEvent::Exit { .. }) => break,
        None => {
          return Err(Error::Malformed(format!(
            "document ended inside {}",
            path.path
          )));
        }
      }
    }

    let value = (!value.is_empty()).then_some(value);
    if let (Some(text), Some(value_type)) = (&value, path.value_type)
      && !value_type.accepts(text)
    {
      return Err(Error::mismatch(
        &path.path,
        format!("text {text:?} is not a valid {value_type:?} value"),
      ));
    }

    self.classify(node, parent, &identity, attrs, value)
  }

  /// Resolve the element's identity and make sure no sibling in this
  /// document already claimed it.
  fn claim_identity(
    &mut self,
    node: usize,
    parent: &str,
    attrs: &BTreeMap<String, String>,
  ) -> Result<String> {
    let path = &self.tree.node(node).path;
    let identity = match &path.identity {
      Some(attr) => match attrs.get(attr) {
        Some(value) if !value.is_empty() => value.clone(),
        _ => {
          return Err(Error::MissingIdentity {
            path:      path.path.clone(),
            attribute: attr.clone(),
          });
        }
      },
      None => String::new(),
    };

    if !self
      .seen
      .insert((node, parent.to_owned(), identity.clone()))
    {
      return Err(if path.identity.is_some() {
        Error::DuplicateIdentity {
          path: path.path.clone(),
          parent: parent.to_owned(),
          identity,
        }
      } else {
        Error::mismatch(
          &path.path,
          "multiple elements at a path without identity attribute",
        )
      });
    }
    Ok(identity)
  }

  fn classify(
    &mut self,
    node: usize,
    parent: &str,
    identity: &str,
    attrs: BTreeMap<String, String>,
    value: Option<String>,
  ) -> Result<()> {
    let kind = match self.mode {
      CommitMode::Snapshot => Some(EventKind::Snapshot),
      CommitMode::Incremental => {
        let baseline = self.baselines.get(self.log, self.tree, node)?;
        let kind = match baseline.state.get(parent, identity) {
          None => Some(EventKind::Addition),
          Some(existing) if existing.same_content(&attrs, value.as_deref()) => {
            None
          }
          Some(_) => Some(EventKind::Change),
        };
        baseline
          .preserved
          .insert((parent.to_owned(), identity.to_owned()));
        kind
      }
    };

    match kind {
      Some(kind) => self.append(node, kind, parent, value, attrs),
      None => Ok(()),
    }
  }

  /// Record a removal for every baseline element this document did not
  /// contain. Paths the walk never reached are treated as touched with
  /// nothing preserved.
  fn record_removals(&mut self) -> Result<()> {
    let mut pending: Vec<(usize, String, String)> = vec![];
    for node in 0..self.tree.len() {
      let baseline = self.baselines.get(self.log, self.tree, node)?;
      for (parent, identity, _) in baseline.state.entries() {
        let key = (parent.to_owned(), identity.to_owned());
        if !baseline.preserved.contains(&key) {
          pending.push((node, key.0, key.1));
        }
      }
    }

    for (node, parent, identity) in pending {
      let mut attrs = BTreeMap::new();
      if let Some(attr) = &self.tree.node(node).path.identity
        && !identity.is_empty()
      {
        attrs.insert(attr.clone(), identity);
      }
      self.append(node, EventKind::Removal, &parent, None, attrs)?;
    }
    Ok(())
  }

  fn append(
    &mut self,
    node: usize,
    kind: EventKind,
    parent: &str,
    value: Option<String>,
    attrs: BTreeMap<String, String>,
  ) -> Result<()> {
    let path = &self.tree.node(node).path;
    let event = NewEvent {
      document_id: self.document.document_id,
      recorded_at: self.now,
      kind,
      parent: parent.to_owned(),
      value,
      attrs,
    };
    let seq = self
      .log
      .append(path.path_id, &event)
      .map_err(Error::persistence)?;
    tracing::debug!(path = %path.path, ?kind, parent, seq, "event appended");

    match kind {
      EventKind::Snapshot => self.summary.snapshots += 1,
      EventKind::Addition => self.summary.additions += 1,
      EventKind::Change => self.summary.changes += 1,
      EventKind::Removal => self.summary.removals += 1,
    }
    Ok(())
  }
}

/// Check every attribute against the path's declarations.
fn check_attributes(
  path: &SchemaPath,
  attrs: Vec<(String, String)>,
) -> Result<BTreeMap<String, String>> {
  let mut checked = BTreeMap::new();
  for (name, value) in attrs {
    let Some(decl) = path.attribute(&name) else {
      return Err(Error::mismatch(
        &path.path,
        format!("undeclared attribute {name:?}"),
      ));
    };
    // An empty identity is reported as missing by `claim_identity`.
    let empty_identity =
      value.is_empty() && path.identity.as_deref() == Some(name.as_str());
    if !empty_identity && !decl.value_type.accepts(&value) {
      return Err(Error::mismatch(
        &path.path,
        format!(
          "attribute {name:?} value {value:?} is not a valid {:?} value",
          decl.value_type
        ),
      ));
    }
    checked.insert(name, value);
  }
  Ok(checked)
}
