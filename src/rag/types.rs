//! Wire types for the RAG service JSON contract

use serde::{Deserialize, Serialize};

/// `POST /embed` request body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbedRequest {
    pub fact_id: String,
    pub statement: String,
    /// Partition key; carries the corpus id
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_id: Option<String>,
}

/// `POST /embed` response body.
///
/// The service may answer 200 with `success = false`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbedResponse {
    pub success: bool,
    #[serde(default)]
    pub fact_id: String,
    #[serde(default)]
    pub message: String,
}

/// `POST /search` request body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchRequest {
    pub query: String,
    pub limit: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_ids: Option<Vec<String>>,
}

/// `POST /search` response body
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SearchResponse {
    #[serde(default)]
    pub results: Vec<SearchResult>,
}

/// A single search hit as reported by the service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub fact_id: String,
    /// Raw cosine distance in [0, 2]; lower is closer
    #[serde(default = "missing_distance")]
    pub score: f64,
    /// Text the service matched on
    #[serde(default)]
    pub statement: String,
}

fn missing_distance() -> f64 {
    f64::NAN
}

/// `GET /health` response body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    #[serde(default)]
    pub provider: Option<String>,
    #[serde(default)]
    pub chromadb: Option<String>,
    #[serde(default)]
    pub embedding_dimension: Option<u32>,
}

impl HealthResponse {
    pub fn is_healthy(&self) -> bool {
        self.status == "healthy"
    }
}
