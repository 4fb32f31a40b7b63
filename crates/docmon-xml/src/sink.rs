//! [`XmlSink`] — writes checkout output as XML.

use std::io::Write;

use docmon_core::tree::{TreeEvent, TreeSink};
use quick_xml::{
  Writer,
  events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event},
};

/// Serializes element events as XML.
///
/// With a non-empty `prefix` or `indent`, every element starts on its own
/// line beginning with `prefix` followed by one `indent` per nesting level.
/// The declaration line carries no prefix.
/// Text stays on the line of its element. Elements with neither children
/// nor text are written in empty-element form.
pub struct XmlSink<W: Write> {
  writer:   Writer<W>,
  prefix:   String,
  indent:   String,
  /// Whether anything has been written yet.
  started:  bool,
  /// Start tag not yet written, held back until it is known whether the
  /// element is empty.
  pending:  Option<BytesStart<'static>>,
  /// One entry per open element: whether it has child elements.
  open:     Vec<bool>,
}

impl<W: Write> XmlSink<W> {
  pub fn new(output: W) -> Self {
    Self {
      writer:  Writer::new(output),
      prefix:  String::new(),
      indent:  String::new(),
      started: false,
      pending: None,
      open:    vec![],
    }
  }

  pub fn with_indent(mut self, prefix: &str, indent: &str) -> Self {
    self.prefix = prefix.to_owned();
    self.indent = indent.to_owned();
    self
  }

  /// Write an `<?xml version="1.0" encoding="UTF-8"?>` declaration.
  pub fn declaration(mut self) -> std::io::Result<Self> {
    self
      .writer
      .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
    self.started = true;
    Ok(self)
  }

  /// Flush and hand back the underlying writer. Fails if elements are still
  /// open.
  pub fn finish(mut self) -> docmon_core::Result<W> {
    if !self.open.is_empty() {
      return Err(docmon_core::Error::Malformed(format!(
        "{} element(s) left open",
        self.open.len()
      )));
    }
    if self.started && self.breaks_lines() {
      self.writer.get_mut().write_all(b"\n")?;
    }
    let mut output = self.writer.into_inner();
    output.flush()?;
    Ok(output)
  }

  fn breaks_lines(&self) -> bool { !self.prefix.is_empty() || !self.indent.is_empty() }

  fn new_line(&mut self, depth: usize) -> std::io::Result<()> {
    if !self.breaks_lines() {
      return Ok(());
    }
    let mut line = String::with_capacity(1 + self.prefix.len() + depth * self.indent.len());
    line.push('\n');
    line.push_str(&self.prefix);
    for _ in 0..depth {
      line.push_str(&self.indent);
    }
    self.writer.get_mut().write_all(line.as_bytes())
  }

  fn flush_pending(&mut self) -> std::io::Result<()> {
    match self.pending.take() {
      Some(start) => self.writer.write_event(Event::Start(start)),
      None => Ok(()),
    }
  }
}

impl<W: Write> TreeSink for XmlSink<W> {
  fn emit(&mut self, event: TreeEvent) -> docmon_core::Result<()> {
    match event {
      TreeEvent::Enter { name, attrs } => {
        self.flush_pending()?;
        if let Some(has_children) = self.open.last_mut() {
          *has_children = true;
        }
        if self.started {
          self.new_line(self.open.len())?;
        } else {
          self.writer.get_mut().write_all(self.prefix.as_bytes())?;
        }
        let mut start = BytesStart::new(name);
        for (key, value) in &attrs {
          start.push_attribute((key.as_str(), value.as_str()));
        }
        self.pending = Some(start);
        self.open.push(false);
        self.started = true;
      }
      TreeEvent::Text(text) => {
        if self.open.is_empty() {
          return Err(docmon_core::Error::Malformed(
            "text outside any element".into(),
          ));
        }
        self.flush_pending()?;
        self.writer.write_event(Event::Text(BytesText::new(&text)))?;
      }
      TreeEvent::Exit { name } => {
        let Some(has_children) = self.open.pop() else {
          return Err(docmon_core::Error::Malformed(format!(
            "unbalanced end of {name:?}"
          )));
        };
        if let Some(start) = self.pending.take() {
          self.writer.write_event(Event::Empty(start))?;
          return Ok(());
        }
        if has_children {
          self.new_line(self.open.len())?;
        }
        self.writer.write_event(Event::End(BytesEnd::new(name)))?;
      }
    }
    Ok(())
  }
}
