//! factgraph: fact graph consistency engine with a semantic index
//!
//! Organizes atomic statements ("facts") into corpora nested under projects
//! and keeps an external embedding/vector index eventually consistent with
//! them.
//!
//! # Core Concepts
//!
//! - **Corpora**: collections of facts; a corpus may derive from a parent corpus
//! - **Basis**: a knowledge fact may derive from one knowledge fact in its own
//!   corpus or in the parent corpus
//! - **Links**: undirected edges between facts sharing corpus and context
//! - **Embedding sync**: each statement change is pushed to the RAG service
//!   in the background; failures are recorded on the fact and retried on demand
//!
//! # Example
//!
//! ```
//! use factgraph::{FactGraph, NewFact, OpenStore, ProjectId, SqliteStore};
//! use std::sync::Arc;
//!
//! let graph = FactGraph::new(Arc::new(SqliteStore::open_in_memory().unwrap()));
//! let corpus = graph.create_corpus(ProjectId::new(), "notes", None).unwrap();
//! let fact = graph
//!     .create_fact(NewFact::new(corpus.id).with_statement("water boils at 100C"))
//!     .unwrap();
//! assert!(graph.resolve_chain(&fact.id).unwrap().is_empty());
//! ```

pub mod api;
pub mod auth;
pub mod embedding;
mod graph;
pub mod rag;
pub mod search;
pub mod storage;

pub use api::{ApiError, ApiResult, FactGraphApi};
pub use auth::{ActorId, AllowAll, Authorizer, Role, StaticGrants};
pub use embedding::{Dispatch, EmbedOutcome, EmbeddingPipeline, SkipReason};
pub use graph::{
    normalize_statement, Corpus, CorpusId, EmbeddingInfo, EmbeddingStatus, Fact, FactChange,
    FactContext, FactGraph, FactId, FactLink, FactRecord, FactState, FactSummary, FactUpdate,
    GraphError, GraphResult, Metadata, NewFact, ParseLabelError, ProjectId, Validator, Violation,
    EMBEDDING_ERROR_KEY, EMBEDDING_FAILED_AT_KEY, MAX_CHAIN_DEPTH,
};
pub use rag::{HealthMonitor, HealthState, RagClient, RagConfig, RagError};
pub use search::{normalize_score, ScoredFact, SemanticSearch, MAX_SEARCH_LIMIT};
pub use storage::{
    EmbeddingStats, FactStore, OpenStore, SqliteStore, StorageError, StorageResult,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
