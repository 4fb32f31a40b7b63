//! A format-neutral view of a structured document as a stream of events.
//!
//! The commit engine reads from a [`TreeSource`] and the checkout engine
//! writes to a [`TreeSink`], so neither depends on a concrete serialization.
//! `docmon-xml` provides the XML implementations.

use crate::Result;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TreeEvent {
  /// Opening of an element with its attributes, in document order.
  Enter {
    name:  String,
    attrs: Vec<(String, String)>,
  },
  /// A run of character data inside the current element.
  Text(String),
  Exit { name: String },
}

impl TreeEvent {
  pub fn enter(name: &str, attrs: &[(&str, &str)]) -> Self {
    Self::Enter {
      name:  name.to_owned(),
      attrs: attrs
        .iter()
        .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
        .collect(),
    }
  }

  pub fn text(text: &str) -> Self { Self::Text(text.to_owned()) }

  pub fn exit(name: &str) -> Self {
    Self::Exit { name: name.to_owned() }
  }
}

/// A lazy, pull-based sequence of [`TreeEvent`]s. `Ok(None)` marks the end.
pub trait TreeSource {
  fn next_event(&mut self) -> Result<Option<TreeEvent>>;
}

/// A consumer of [`TreeEvent`]s.
pub trait TreeSink {
  fn emit(&mut self, event: TreeEvent) -> Result<()>;
}

impl<T: TreeSource + ?Sized> TreeSource for &mut T {
  fn next_event(&mut self) -> Result<Option<TreeEvent>> {
    (**self).next_event()
  }
}

impl<T: TreeSink + ?Sized> TreeSink for &mut T {
  fn emit(&mut self, event: TreeEvent) -> Result<()> { (**self).emit(event) }
}

/// Collects events in memory.
impl TreeSink for Vec<TreeEvent> {
  fn emit(&mut self, event: TreeEvent) -> Result<()> {
    self.push(event);
    Ok(())
  }
}

/// A [`TreeSource`] over events already held in memory.
#[derive(Debug, Clone)]
pub struct EventStream(std::vec::IntoIter<TreeEvent>);

impl From<Vec<TreeEvent>> for EventStream {
  fn from(events: Vec<TreeEvent>) -> Self { Self(events.into_iter()) }
}

impl TreeSource for EventStream {
  fn next_event(&mut self) -> Result<Option<TreeEvent>> { Ok(self.0.next()) }
}
