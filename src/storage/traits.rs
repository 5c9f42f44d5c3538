//! Storage trait definitions

use crate::graph::{
    Corpus, CorpusId, EmbeddingStatus, Fact, FactId, FactLink, FactSummary,
    ParseLabelError, ProjectId,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Date parsing error: {0}")]
    DateParse(String),

    #[error("Invalid stored value: {0}")]
    InvalidValue(String),

    #[error("Storage lock poisoned")]
    LockPoisoned,
}

impl From<ParseLabelError> for StorageError {
    fn from(e: ParseLabelError) -> Self {
        StorageError::InvalidValue(e.to_string())
    }
}

impl From<uuid::Error> for StorageError {
    fn from(e: uuid::Error) -> Self {
        StorageError::InvalidValue(e.to_string())
    }
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Aggregate embedding counts over facts that have a statement
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingStats {
    pub total: u64,
    pub embedded: u64,
    pub pending: u64,
    pub failed: u64,
}

impl EmbeddingStats {
    /// Percentage of embeddable facts currently embedded
    pub fn completion_rate(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        let rate = self.embedded as f64 / self.total as f64 * 100.0;
        (rate * 100.0).round() / 100.0
    }
}

/// Trait for fact graph storage backends
///
/// Implementations must be thread-safe (Send + Sync): the embedding pipeline
/// updates status columns from background tasks while requests write facts.
pub trait FactStore: Send + Sync {
    // === Corpus Operations ===

    /// Create or update a corpus
    fn save_corpus(&self, corpus: &Corpus) -> StorageResult<()>;

    fn load_corpus(&self, id: &CorpusId) -> StorageResult<Option<Corpus>>;

    /// List corpora, optionally restricted to one project
    fn list_corpora(&self, project_id: Option<&ProjectId>) -> StorageResult<Vec<Corpus>>;

    /// Delete a corpus with all its facts and their links.
    ///
    /// Child corpora lose their parent, and with it every basis their facts
    /// held. Returns the ids of the facts removed by the cascade.
    fn delete_corpus(&self, id: &CorpusId) -> StorageResult<Vec<FactId>>;

    /// Clear the basis of facts in `corpus_id` whose basis lives in `basis_corpus_id`
    fn clear_bases_into(&self, corpus_id: &CorpusId, basis_corpus_id: &CorpusId) -> StorageResult<usize>;

    /// Clear the basis of every fact in `corpus_id`
    fn clear_bases_in(&self, corpus_id: &CorpusId) -> StorageResult<usize>;

    // === Fact Operations ===

    fn insert_fact(&self, fact: &Fact) -> StorageResult<()>;

    /// Overwrite every column of an existing fact
    fn update_fact(&self, fact: &Fact) -> StorageResult<()>;

    fn load_fact(&self, id: &FactId) -> StorageResult<Option<Fact>>;

    /// Load many facts in one query. Unknown ids are skipped; order is unspecified.
    fn load_facts(&self, ids: &[FactId]) -> StorageResult<Vec<Fact>>;

    /// Load the minimal projection of a fact
    fn load_summary(&self, id: &FactId) -> StorageResult<Option<FactSummary>>;

    /// Load the minimal projection of many facts in one query
    fn load_summaries(&self, ids: &[FactId]) -> StorageResult<Vec<FactSummary>>;

    /// Delete a fact; its links cascade and dependents lose their basis
    fn delete_fact(&self, id: &FactId) -> StorageResult<bool>;

    /// Clear the basis of every fact derived from `id`
    fn clear_dependent_bases(&self, id: &FactId) -> StorageResult<usize>;

    // === Link Operations ===

    fn insert_link(&self, link: &FactLink) -> StorageResult<()>;

    fn delete_link(&self, a: &FactId, b: &FactId) -> StorageResult<bool>;

    /// Whether `a` and `b` are linked, in either orientation
    fn link_exists(&self, a: &FactId, b: &FactId) -> StorageResult<bool>;

    /// All links touching any of `ids`
    fn links_for(&self, ids: &[FactId]) -> StorageResult<Vec<FactLink>>;

    /// Drop every link touching `id`
    fn delete_links_for(&self, id: &FactId) -> StorageResult<usize>;

    // === Embedding State ===

    /// Facts with `status` and a statement, oldest first.
    ///
    /// Pending facts are ordered by creation time, every other status by
    /// last update time.
    fn facts_with_status(&self, status: EmbeddingStatus, limit: usize) -> StorageResult<Vec<Fact>>;

    fn mark_embedded(
        &self,
        id: &FactId,
        at: DateTime<Utc>,
        model: &str,
        version: &str,
    ) -> StorageResult<()>;

    /// Set status to failed and record the error in the fact's metadata
    fn mark_failed(&self, id: &FactId, error: &str, at: DateTime<Utc>) -> StorageResult<()>;

    fn mark_pending(&self, id: &FactId) -> StorageResult<()>;

    fn embedding_stats(&self) -> StorageResult<EmbeddingStats>;
}

/// Extension trait for opening stores from paths
pub trait OpenStore: FactStore + Sized {
    /// Open or create a store at the given path
    fn open(path: impl AsRef<Path>) -> StorageResult<Self>;

    /// Create an in-memory store (useful for testing)
    fn open_in_memory() -> StorageResult<Self>;
}
