//! Client for the external embedding and vector search (RAG) service
//!
//! - `RagClient`: typed calls with per-class timeouts and bounded retry
//! - `RagTransport`: the wire seam, with `HttpTransport` (production) and
//!   `MockTransport` (scripted replies for tests)
//! - `HealthMonitor`: background probe publishing service availability

mod client;
mod config;
mod error;
mod health;
mod transport;
mod types;

pub use client::RagClient;
pub use config::{CallClass, ConfigError, RagConfig};
pub use error::RagError;
pub use health::{HealthMonitor, HealthState};
pub use transport::{
    HttpTransport, Method, MockReply, MockTransport, RagRequest, RagTransport, RawResponse,
    TransportFailure,
};
pub use types::{
    EmbedRequest, EmbedResponse, HealthResponse, SearchRequest, SearchResponse, SearchResult,
};
