//! Core types and engines for the docmon temporal document store.
//!
//! Documents are described by a schema (a tree of slash-separated paths) and
//! every observed change to a document is recorded as an immutable event.
//! [`commit`] diffs an incoming document against the replayed state and
//! appends events; [`checkout`] rebuilds the document as of any instant.
//!
//! This crate is free of database and XML dependencies. Storage backends
//! implement [`log::EventLog`]; serialization formats implement
//! [`tree::TreeSource`] and [`tree::TreeSink`].

pub mod checkout;
pub mod commit;
pub mod document;
pub mod error;
pub mod event;
pub mod log;
pub mod path_tree;
pub mod schema;
pub mod state;
pub mod store;
pub mod tree;

pub use error::{Error, Result};

#[cfg(test)]
mod testing;
