//! Error type for `docmon-xml`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("XML parse error: {0}")]
  Xml(String),

  /// The XSD uses a construct the path reader does not support, or is
  /// internally inconsistent.
  #[error("schema definition error: {0}")]
  Schema(String),

  #[error("I/O error: {0}")]
  Io(#[from] std::io::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
