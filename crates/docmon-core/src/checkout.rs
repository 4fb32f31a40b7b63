//! The checkout engine: rebuild a document as it was at a given instant.

use chrono::{DateTime, Utc};

use crate::{
  Error, Result,
  log::{EventLog, find_anchor, resolve},
  path_tree::PathTree,
  state::{PathState, replay},
  tree::{TreeEvent, TreeSink},
};

/// Render the content of `document` as of `at` into `sink`.
///
/// State is replayed for every path from the latest snapshot at or before
/// `at` up to and including `at`. Returns the anchor time.
pub fn checkout<L, K>(
  log: &L,
  document: &str,
  at: DateTime<Utc>,
  sink: &mut K,
) -> Result<DateTime<Utc>>
where
  L: EventLog,
  K: TreeSink + ?Sized,
{
  let (doc, tree) = resolve(log, document)?;
  let anchor = find_anchor(log, &tree, doc.document_id, at)?.ok_or_else(
    || Error::NoSnapshotFound {
      document: doc.name.clone(),
      at,
    },
  )?;

  let mut states = Vec::with_capacity(tree.len());
  for node in tree.nodes() {
    let events = log
      .events(node.path.path_id, doc.document_id, Some(anchor), at)
      .map_err(Error::persistence)?;
    states.push(replay(&events, node.path.identity.as_deref()));
  }

  for &root in tree.roots() {
    render(&tree, &states, sink, root, "")?;
  }

  tracing::info!(document = %doc.name, %at, %anchor, "document checked out");
  Ok(anchor)
}

/// Emit every element of `node` filed under `parent`, each followed by its
/// children and its text.
fn render<K: TreeSink + ?Sized>(
  tree: &PathTree,
  states: &[PathState],
  sink: &mut K,
  node: usize,
  parent: &str,
) -> Result<()> {
  let path = &tree.node(node).path;
  let tag = path.tag();

  for (identity, element) in states[node].children_of(parent) {
    // Declared attributes first, in declaration order.
    let mut attrs: Vec<(String, String)> = path
      .attributes
      .iter()
      .filter_map(|decl| {
        element
          .attrs
          .get(&decl.name)
          .map(|v| (decl.name.clone(), v.clone()))
      })
      .collect();
    attrs.extend(
      element
        .attrs
        .iter()
        .filter(|(name, _)| path.attribute(name).is_none())
        .map(|(k, v)| (k.clone(), v.clone())),
    );

    sink.emit(TreeEvent::Enter {
      name: tag.to_owned(),
      attrs,
    })?;

    let child_parent = if path.identity.is_some() { identity } else { parent };
    for &child in tree.node(node).children() {
      render(tree, states, sink, child, child_parent)?;
    }

    if let Some(value) = &element.value {
      sink.emit(TreeEvent::Text(value.clone()))?;
    }
    sink.emit(TreeEvent::Exit { name: tag.to_owned() })?;
  }
  Ok(())
}
