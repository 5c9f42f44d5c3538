//! Storage backends for factgraph
//!
//! The graph engine and embedding pipeline talk to storage through the
//! `FactStore` trait. The primary implementation is `SqliteStore`.

mod sqlite;
mod traits;

pub use sqlite::SqliteStore;
pub use traits::{EmbeddingStats, FactStore, OpenStore, StorageError, StorageResult};
