//! Persistent store: schema, entity types, and the SQLite-backed store.

pub mod schema;
pub mod store;
pub mod types;

pub use store::{NewLlmRun, SqliteStore};
pub use types::*;
