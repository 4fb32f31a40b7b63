//! [`XmlSource`] — a pull parser that feeds XML into the commit engine.

use std::io::{BufRead, Cursor};

use docmon_core::tree::{TreeEvent, TreeSource};
use quick_xml::{Reader, events::Event};

/// Reads element events from XML.
///
/// Element and attribute names are reduced to their local part. Namespace
/// declarations and `xsi:` attributes are dropped. Empty elements are
/// reported as a start immediately followed by an end. Comments, processing
/// instructions and the declaration are skipped.
pub struct XmlSource<R> {
  reader: Reader<R>,
  buf:    Vec<u8>,
}

impl XmlSource<Cursor<Vec<u8>>> {
  pub fn from_bytes(bytes: Vec<u8>) -> Self { Self::new(Cursor::new(bytes)) }
}

impl<R: BufRead> XmlSource<R> {
  pub fn new(input: R) -> Self {
    let mut reader = Reader::from_reader(input);
    let config = reader.config_mut();
    config.trim_text(false);
    config.expand_empty_elements = true;
    Self {
      reader,
      buf: Vec::new(),
    }
  }
}

fn utf8(bytes: &[u8]) -> docmon_core::Result<String> {
  std::str::from_utf8(bytes)
    .map(str::to_owned)
    .map_err(|e| docmon_core::Error::Malformed(format!("invalid UTF-8 name: {e}")))
}

impl<R: BufRead> TreeSource for XmlSource<R> {
  fn next_event(&mut self) -> docmon_core::Result<Option<TreeEvent>> {
    loop {
      self.buf.clear();
      let event = match self.reader.read_event_into(&mut self.buf) {
        Ok(event) => event,
        Err(e) => {
          return Err(docmon_core::Error::Malformed(format!(
            "at byte {}: {e}",
            self.reader.buffer_position()
          )));
        }
      };

      let tree_event = match event {
        Event::Start(start) => {
          let name = utf8(start.local_name().as_ref())?;
          let mut attrs = vec![];
          for attr in start.attributes() {
            let attr = attr.map_err(|e| docmon_core::Error::Malformed(e.to_string()))?;
            if attr.key.as_namespace_binding().is_some()
              || attr.key.prefix().is_some_and(|p| p.as_ref() == b"xsi")
            {
              continue;
            }
            let value = attr
              .unescape_value()
              .map_err(|e| docmon_core::Error::Malformed(e.to_string()))?;
            attrs.push((utf8(attr.key.local_name().as_ref())?, value.into_owned()));
          }
          TreeEvent::Enter { name, attrs }
        }
        Event::End(end) => TreeEvent::Exit {
          name: utf8(end.local_name().as_ref())?,
        },
        Event::Text(text) => TreeEvent::Text(
          text
            .unescape()
            .map_err(|e| docmon_core::Error::Malformed(e.to_string()))?
            .into_owned(),
        ),
        Event::CData(data) => {
          TreeEvent::Text(String::from_utf8_lossy(&data.into_inner()).into_owned())
        }
        Event::Eof => return Ok(None),
        _ => continue,
      };
      return Ok(Some(tree_event));
    }
  }
}
