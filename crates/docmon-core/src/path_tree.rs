//! [`PathTree`] — the schema's paths linked into an explicit tree.
//!
//! Paths are stored flat and keyed by their slash-separated string; no parent
//! pointers are persisted. The tree is recovered once, at construction, by
//! sorting the strings and attaching each path to the path one segment
//! shorter.

use std::collections::HashMap;

use crate::{Error, Result, schema::SchemaPath};

/// One node of a [`PathTree`].
#[derive(Debug, Clone)]
pub struct PathNode {
  pub path:     SchemaPath,
  /// Child node indices in declaration (path id) order.
  children:     Vec<usize>,
}

impl PathNode {
  pub fn children(&self) -> &[usize] { &self.children }

  pub fn is_leaf(&self) -> bool { self.children.is_empty() }
}

/// The paths of one schema, sorted by path string and linked into a tree.
#[derive(Debug, Clone)]
pub struct PathTree {
  nodes: Vec<PathNode>,
  roots: Vec<usize>,
}

impl PathTree {
  /// Build the tree. Fails on duplicate or malformed path strings and on
  /// paths whose parent path is missing.
  pub fn new(mut paths: Vec<SchemaPath>) -> Result<Self> {
    paths.sort_by(|a, b| a.path.cmp(&b.path));

    let mut index: HashMap<String, usize> = HashMap::with_capacity(paths.len());
    let mut nodes: Vec<PathNode> = Vec::with_capacity(paths.len());
    let mut roots = vec![];

    for path in paths {
      if !path.path.starts_with('/')
        || path.path[1..].split('/').any(str::is_empty)
      {
        return Err(Error::InvalidSchema(format!(
          "malformed path {:?}",
          path.path
        )));
      }
      if index.contains_key(&path.path) {
        return Err(Error::InvalidSchema(format!(
          "duplicate path {:?}",
          path.path
        )));
      }

      let split = path.path.rfind('/').unwrap_or(0);
      let parent = if split == 0 {
        None
      } else {
        let parent_path = &path.path[..split];
        // Sorting places every parent before its descendants.
        let Some(&parent) = index.get(parent_path) else {
          return Err(Error::InvalidSchema(format!(
            "path {:?} has no parent path {parent_path:?}",
            path.path
          )));
        };
        Some(parent)
      };

      let idx = nodes.len();
      index.insert(path.path.clone(), idx);
      match parent {
        Some(p) => nodes[p].children.push(idx),
        None => roots.push(idx),
      }
      nodes.push(PathNode { path, children: vec![] });
    }

    for i in 0..nodes.len() {
      let mut children = std::mem::take(&mut nodes[i].children);
      children.sort_by_key(|&c| nodes[c].path.path_id);
      nodes[i].children = children;
    }
    roots.sort_by_key(|&r| nodes[r].path.path_id);

    Ok(Self { nodes, roots })
  }

  pub fn len(&self) -> usize { self.nodes.len() }

  pub fn is_empty(&self) -> bool { self.nodes.is_empty() }

  pub fn node(&self, idx: usize) -> &PathNode { &self.nodes[idx] }

  /// Nodes in path-string order.
  pub fn nodes(&self) -> impl Iterator<Item = &PathNode> { self.nodes.iter() }

  /// Top-level nodes in declaration order.
  pub fn roots(&self) -> &[usize] { &self.roots }

  /// The top-level node whose tag is `tag`.
  pub fn root(&self, tag: &str) -> Option<usize> {
    self
      .roots
      .iter()
      .copied()
      .find(|&r| self.nodes[r].path.tag() == tag)
  }

  /// The child of `parent` whose tag is `tag`.
  pub fn child(&self, parent: usize, tag: &str) -> Option<usize> {
    self.nodes[parent]
      .children
      .iter()
      .copied()
      .find(|&c| self.nodes[c].path.tag() == tag)
  }

  /// All paths in the subtree rooted at `prefix`: the path equal to `prefix`
  /// and every path starting with `prefix + "/"`, in path-string order.
  pub fn subtree<'a>(
    &'a self,
    prefix: &'a str,
  ) -> impl Iterator<Item = &'a SchemaPath> + 'a {
    self.nodes.iter().map(|n| &n.path).filter(move |p| {
      p.path == prefix
        || p
          .path
          .strip_prefix(prefix)
          .is_some_and(|rest| rest.starts_with('/'))
    })
  }
}
