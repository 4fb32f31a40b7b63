//! SQLite backend for the docmon document store.
//!
//! Wraps [`tokio_rusqlite`] so all database access runs on a dedicated thread
//! without blocking the async runtime. Each store operation is one SQLite
//! transaction; the commit and checkout engines of `docmon-core` run inside
//! it against a transaction-bound [`docmon_core::log::EventLog`].

mod encode;
mod log;
mod schema;
mod store;

pub mod error;

pub use error::{Error, Result};
pub use store::SqliteStore;

#[cfg(test)]
mod tests;
