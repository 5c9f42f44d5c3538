//! Core fact graph: corpora, facts, links and the rules that bind them

mod chain;
mod corpus;
mod engine;
mod fact;
mod link;
mod validate;

#[cfg(test)]
mod tests;

pub use chain::MAX_CHAIN_DEPTH;
pub use corpus::{Corpus, CorpusId, ProjectId};
pub use engine::{FactChange, FactGraph, GraphError, GraphResult};
pub use fact::{
    normalize_statement, EmbeddingInfo, EmbeddingStatus, Fact, FactContext, FactId, FactRecord,
    FactState, FactSummary, FactUpdate, Metadata, NewFact, ParseLabelError, EMBEDDING_ERROR_KEY,
    EMBEDDING_FAILED_AT_KEY,
};
pub use link::FactLink;
pub use validate::{Validator, Violation};
