//! Derive path declarations from an XML Schema (XSD).
//!
//! Only the subset needed to describe monitored documents is understood:
//! global and local `element`s (by `name`, `type` or `ref`), named and
//! anonymous `complexType`s with `sequence`, `attribute`, `simpleContent`
//! and `complexContent` extensions, and `simpleType` restrictions of
//! built-in types. Every global element becomes a top-level path.
//!
//! The identity attribute of an element is declared with the non-standard
//! `idAttribute` attribute on the `element`:
//!
//! ```xml
//! <xs:element name="channel" idAttribute="id">
//!   <xs:complexType>
//!     <xs:sequence><xs:element name="name" type="xs:string"/></xs:sequence>
//!     <xs:attribute name="id" type="xs:int"/>
//!   </xs:complexType>
//! </xs:element>
//! ```

use std::collections::HashMap;

use docmon_core::schema::{AttributeDecl, PathDecl, ValueType};
use quick_xml::{Reader, events::Event};

use crate::{Error, Result};

// ─── DOM ─────────────────────────────────────────────────────────────────────

/// A schema element with local names only.
#[derive(Debug)]
struct Node {
  name:     String,
  attrs:    Vec<(String, String)>,
  children: Vec<Node>,
}

impl Node {
  fn attr(&self, name: &str) -> Option<&str> {
    self
      .attrs
      .iter()
      .find(|(k, _)| k == name)
      .map(|(_, v)| v.as_str())
  }

  fn child(&self, name: &str) -> Option<&Node> {
    self.children.iter().find(|c| c.name == name)
  }

  fn label(&self) -> String {
    match self.attr("name") {
      Some(name) => format!("{} {name:?}", self.name),
      None => self.name.clone(),
    }
  }
}

fn parse(xsd: &str) -> Result<Node> {
  let mut reader = Reader::from_str(xsd);
  let config = reader.config_mut();
  config.trim_text(true);
  config.expand_empty_elements = true;

  let mut stack: Vec<Node> = vec![];
  loop {
    let event = reader
      .read_event()
      .map_err(|e| Error::Xml(format!("at byte {}: {e}", reader.buffer_position())))?;
    match event {
      Event::Start(start) => {
        let name = String::from_utf8_lossy(start.local_name().as_ref()).into_owned();
        let mut attrs = vec![];
        for attr in start.attributes() {
          let attr = attr.map_err(|e| Error::Xml(e.to_string()))?;
          if attr.key.as_namespace_binding().is_some() {
            continue;
          }
          let key = String::from_utf8_lossy(attr.key.local_name().as_ref()).into_owned();
          let value = attr
            .unescape_value()
            .map_err(|e| Error::Xml(e.to_string()))?
            .into_owned();
          attrs.push((key, value));
        }
        stack.push(Node { name, attrs, children: vec![] });
      }
      Event::End(_) => {
        let Some(node) = stack.pop() else {
          return Err(Error::Xml("unbalanced end tag".into()));
        };
        match stack.last_mut() {
          Some(parent) => parent.children.push(node),
          None => return Ok(node),
        }
      }
      Event::Eof => return Err(Error::Xml("no schema element".into())),
      _ => {}
    }
  }
}

/// Element references can form cycles that named-type tracking cannot see.
const MAX_DEPTH: usize = 64;

// ─── Types ───────────────────────────────────────────────────────────────────

fn local(qname: &str) -> &str {
  qname.rsplit_once(':').map_or(qname, |(_, name)| name)
}

/// Map a built-in XSD type to a value type. Unknown built-ins are strings.
fn builtin(type_name: &str) -> ValueType {
  match local(type_name) {
    "byte" | "short" | "int" | "integer" | "long" | "unsignedByte"
    | "unsignedShort" | "unsignedInt" | "unsignedLong" | "positiveInteger"
    | "negativeInteger" | "nonNegativeInteger" | "nonPositiveInteger" => {
      ValueType::Integer
    }
    "float" | "double" | "decimal" => ValueType::Float,
    "time" => ValueType::Time,
    _ => ValueType::String,
  }
}

/// What an element type contributes to its path.
#[derive(Default)]
struct Content<'d> {
  value_type: Option<ValueType>,
  attributes: Vec<AttributeDecl>,
  elements:   Vec<&'d Node>,
}

// ─── Reader ──────────────────────────────────────────────────────────────────

struct PathReader<'d> {
  elements:      HashMap<&'d str, &'d Node>,
  complex_types: HashMap<&'d str, &'d Node>,
  simple_types:  HashMap<&'d str, &'d Node>,
  /// Named complex types currently being expanded.
  expanding:     Vec<&'d str>,
  paths:         Vec<PathDecl>,
}

impl<'d> PathReader<'d> {
  fn new(schema: &'d Node) -> Self {
    let mut reader = Self {
      elements:      HashMap::new(),
      complex_types: HashMap::new(),
      simple_types:  HashMap::new(),
      expanding:     vec![],
      paths:         vec![],
    };
    for child in &schema.children {
      let Some(name) = child.attr("name") else { continue };
      let table = match child.name.as_str() {
        "element" => &mut reader.elements,
        "complexType" => &mut reader.complex_types,
        "simpleType" => &mut reader.simple_types,
        _ => continue,
      };
      table.insert(name, child);
    }
    reader
  }

  fn element(&mut self, node: &'d Node, parent: &str) -> Result<()> {
    if let Some(target) = node.attr("ref") {
      let referenced = self
        .elements
        .get(local(target))
        .copied()
        .ok_or_else(|| Error::Schema(format!("unresolved element reference {target:?}")))?;
      return self.element(referenced, parent);
    }

    let name = node
      .attr("name")
      .ok_or_else(|| Error::Schema(format!("element without name under {parent:?}")))?;
    let path = format!("{parent}/{name}");
    if path.matches('/').count() > MAX_DEPTH {
      return Err(Error::Schema(format!("{path} is nested too deeply")));
    }

    let mut named_type = None;
    let content = if let Some(inline) = node.child("complexType") {
      self.complex(inline)?
    } else if let Some(inline) = node.child("simpleType") {
      Content {
        value_type: Some(self.simple(inline)?),
        ..Content::default()
      }
    } else if let Some(type_name) = node.attr("type") {
      let type_name = local(type_name);
      if let Some(&complex) = self.complex_types.get(type_name) {
        if self.expanding.contains(&type_name) {
          return Err(Error::Schema(format!(
            "recursive type {type_name:?} at {path}"
          )));
        }
        self.expanding.push(type_name);
        named_type = Some(type_name);
        self.complex(complex)?
      } else {
        Content {
          value_type: Some(self.value_type(type_name)?),
          ..Content::default()
        }
      }
    } else {
      Content {
        value_type: Some(ValueType::String),
        ..Content::default()
      }
    };

    let identity = node.attr("idAttribute").map(str::to_owned);
    if let Some(identity) = &identity
      && !content.attributes.iter().any(|a| &a.name == identity)
    {
      return Err(Error::Schema(format!(
        "idAttribute {identity:?} of {path} is not a declared attribute"
      )));
    }

    tracing::debug!(%path, ?identity, "schema path");
    self.paths.push(PathDecl {
      path: path.clone(),
      identity,
      attributes: content.attributes,
      value_type: content.value_type,
    });

    for child in content.elements {
      self.element(child, &path)?;
    }
    if named_type.is_some() {
      self.expanding.pop();
    }
    Ok(())
  }

  fn complex(&mut self, node: &'d Node) -> Result<Content<'d>> {
    let mut content = Content::default();
    for child in &node.children {
      match child.name.as_str() {
        "sequence" => self.sequence(child, &mut content.elements)?,
        "attribute" => content.attributes.push(self.attribute(child)?),
        "simpleContent" => {
          let derivation = child
            .child("extension")
            .or_else(|| child.child("restriction"))
            .ok_or_else(|| Error::Schema("simpleContent without derivation".into()))?;
          let base = derivation.attr("base").unwrap_or("string");
          content.value_type = Some(self.value_type(local(base))?);
          for attr in derivation.children.iter().filter(|c| c.name == "attribute") {
            content.attributes.push(self.attribute(attr)?);
          }
        }
        "complexContent" => {
          let extension = child.child("extension").ok_or_else(|| {
            Error::Schema("complexContent is only supported as an extension".into())
          })?;
          if let Some(base) = extension.attr("base") {
            let base = local(base);
            let base_type = self
              .complex_types
              .get(base)
              .copied()
              .ok_or_else(|| Error::Schema(format!("unknown base type {base:?}")))?;
            let inherited = self.complex(base_type)?;
            content.attributes.extend(inherited.attributes);
            content.elements.extend(inherited.elements);
          }
          let own = self.complex(extension)?;
          content.attributes.extend(own.attributes);
          content.elements.extend(own.elements);
        }
        "annotation" => {}
        other => {
          return Err(Error::Schema(format!(
            "{other:?} in {} is not supported",
            node.label()
          )));
        }
      }
    }
    Ok(content)
  }

  fn sequence(&mut self, node: &'d Node, out: &mut Vec<&'d Node>) -> Result<()> {
    for child in &node.children {
      match child.name.as_str() {
        "element" => out.push(child),
        "sequence" => self.sequence(child, out)?,
        "annotation" => {}
        other => {
          return Err(Error::Schema(format!(
            "{other:?} in a sequence is not supported"
          )));
        }
      }
    }
    Ok(())
  }

  fn attribute(&mut self, node: &'d Node) -> Result<AttributeDecl> {
    let name = node
      .attr("name")
      .ok_or_else(|| Error::Schema(format!("{} must have a name", node.label())))?;
    let value_type = if let Some(inline) = node.child("simpleType") {
      self.simple(inline)?
    } else {
      self.value_type(local(node.attr("type").unwrap_or("string")))?
    };
    Ok(AttributeDecl::new(name, value_type))
  }

  /// The value type of a named simple type or built-in type.
  fn value_type(&self, type_name: &str) -> Result<ValueType> {
    let mut type_name = type_name;
    // A chain of restrictions can never be longer than the number of types.
    for _ in 0..=self.simple_types.len() {
      let Some(simple) = self.simple_types.get(type_name) else {
        return Ok(builtin(type_name));
      };
      type_name = local(restriction_base(simple)?);
    }
    Err(Error::Schema(format!("circular simpleType {type_name:?}")))
  }

  fn simple(&self, node: &Node) -> Result<ValueType> {
    self.value_type(local(restriction_base(node)?))
  }
}

fn restriction_base(simple: &Node) -> Result<&str> {
  simple
    .child("restriction")
    .and_then(|r| r.attr("base"))
    .ok_or_else(|| Error::Schema(format!("{} has no restriction base", simple.label())))
}

/// Read the path declarations of every global element in `xsd`, parents
/// before children, in document order.
pub fn read_paths(xsd: &str) -> Result<Vec<PathDecl>> {
  let schema = parse(xsd)?;
  if schema.name != "schema" {
    return Err(Error::Schema(format!(
      "root element is {:?}, not \"schema\"",
      schema.name
    )));
  }

  let mut reader = PathReader::new(&schema);
  for child in schema.children.iter().filter(|c| c.name == "element") {
    reader.element(child, "")?;
  }
  if reader.paths.is_empty() {
    return Err(Error::Schema("schema declares no elements".into()));
  }
  Ok(reader.paths)
}
