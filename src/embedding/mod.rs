//! Embedding synchronization between the fact store and the RAG index
//!
//! Status moves `pending -> embedded`, `pending -> failed`,
//! `failed -> pending` (explicit retry) and `embedded -> pending` (statement
//! changed). Facts without a statement are never transitioned.

mod pipeline;

pub use pipeline::{Dispatch, EmbedOutcome, EmbeddingPipeline, SkipReason};
