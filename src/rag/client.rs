//! Resilient client for the RAG service

use super::config::{CallClass, RagConfig};
use super::error::RagError;
use super::transport::{HttpTransport, Method, RagRequest, RagTransport, TransportFailure};
use super::types::{EmbedRequest, EmbedResponse, HealthResponse, SearchRequest, SearchResponse};
use crate::graph::{CorpusId, FactId};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;

/// Typed access to the RAG service.
///
/// Every call has a class-specific timeout and is retried with exponential
/// backoff on transport failures and server errors. Client errors (4xx)
/// return immediately. Errors are returned as values, never panics.
#[derive(Clone)]
pub struct RagClient {
    config: Arc<RagConfig>,
    transport: Arc<dyn RagTransport>,
}

impl RagClient {
    /// Client over HTTP to the configured host and port
    pub fn new(config: RagConfig) -> Result<Self, RagError> {
        let transport = HttpTransport::new(config.base_url())
            .map_err(|e| RagError::Unknown(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self::with_transport(config, Arc::new(transport)))
    }

    pub fn with_transport(config: RagConfig, transport: Arc<dyn RagTransport>) -> Self {
        Self {
            config: Arc::new(config),
            transport,
        }
    }

    pub fn config(&self) -> &RagConfig {
        &self.config
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    /// Push a fact's statement into the index.
    ///
    /// A response with `success = false` is returned as-is; interpreting it
    /// is up to the caller.
    pub async fn embed(
        &self,
        fact_id: &FactId,
        statement: &str,
        corpus_id: Option<&CorpusId>,
    ) -> Result<EmbedResponse, RagError> {
        let body = EmbedRequest {
            fact_id: fact_id.to_string(),
            statement: statement.to_string(),
            context_id: corpus_id.map(|c| c.to_string()),
        };
        self.call(CallClass::Embed, Method::Post, "/embed", Some(&body))
            .await
    }

    /// Nearest neighbours of `query`, optionally restricted to some corpora
    pub async fn search(
        &self,
        query: &str,
        limit: usize,
        corpus_ids: Option<&[CorpusId]>,
    ) -> Result<SearchResponse, RagError> {
        let body = SearchRequest {
            query: query.to_string(),
            limit,
            context_ids: corpus_ids.map(|ids| ids.iter().map(|c| c.to_string()).collect()),
        };
        self.call(CallClass::Search, Method::Post, "/search", Some(&body))
            .await
    }

    pub async fn health(&self) -> Result<HealthResponse, RagError> {
        self.call::<HealthResponse, ()>(CallClass::Health, Method::Get, "/health", None)
            .await
    }

    async fn call<T, B>(
        &self,
        class: CallClass,
        method: Method,
        path: &'static str,
        body: Option<&B>,
    ) -> Result<T, RagError>
    where
        T: DeserializeOwned,
        B: Serialize,
    {
        if !self.config.enabled {
            return Err(RagError::Disabled);
        }

        let request = RagRequest {
            method,
            path,
            body: body
                .map(serde_json::to_value)
                .transpose()
                .map_err(|e| RagError::Unknown(e.to_string()))?,
            timeout: self.config.timeout_for(class),
        };

        let max_attempts = self.config.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            let error = match self.transport.send(&request).await {
                Ok(raw) if raw.is_success() => {
                    return serde_json::from_str(&raw.body).map_err(|e| {
                        RagError::Unknown(format!("invalid response from {}: {}", path, e))
                    });
                }
                Ok(raw) => RagError::HttpStatus { status: raw.status },
                Err(failure) => self.classify(failure, &request),
            };

            if !error.is_retryable() || attempt >= max_attempts {
                tracing::warn!(
                    path,
                    attempt,
                    kind = %error.kind(),
                    error = %error,
                    "RAG service call failed"
                );
                return Err(error);
            }

            let delay = self.config.backoff_for(attempt);
            tracing::debug!(
                path,
                attempt,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "retrying RAG service call"
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }

    fn classify(&self, failure: TransportFailure, request: &RagRequest) -> RagError {
        match failure {
            TransportFailure::ConnectionRefused => RagError::ConnectionRefused {
                url: self.config.base_url(),
            },
            TransportFailure::Timeout => RagError::Timeout {
                secs: request.timeout.as_secs(),
            },
            TransportFailure::Network(message) => RagError::Network(message),
        }
    }
}
