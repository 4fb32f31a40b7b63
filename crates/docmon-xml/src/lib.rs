//! XML adapters for docmon.
//!
//! [`XmlSource`] turns an XML byte stream into the element events the commit
//! engine consumes, [`XmlSink`] writes checkout output back out as XML, and
//! [`schema::read_paths`] derives a schema's path declarations from an XSD.

mod sink;
mod source;

pub mod error;
pub mod schema;

pub use error::{Error, Result};
pub use sink::XmlSink;
pub use source::XmlSource;
