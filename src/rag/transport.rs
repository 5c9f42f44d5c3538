//! Transport seam between the RAG client and the network
//!
//! Two implementations:
//! - `HttpTransport`: JSON over HTTP with `reqwest` (production)
//! - `MockTransport`: scripted replies per path, records every call (testing)

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

/// A single request to the service
#[derive(Debug, Clone, PartialEq)]
pub struct RagRequest {
    pub method: Method,
    pub path: &'static str,
    pub body: Option<serde_json::Value>,
    pub timeout: Duration,
}

/// A response that reached us, whatever its status
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
    pub status: u16,
    pub body: String,
}

impl RawResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// A request that produced no response
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportFailure {
    #[error("connection refused")]
    ConnectionRefused,

    #[error("request timed out")]
    Timeout,

    #[error("{0}")]
    Network(String),
}

/// How requests reach the RAG service.
#[async_trait]
pub trait RagTransport: Send + Sync {
    async fn send(&self, request: &RagRequest) -> Result<RawResponse, TransportFailure>;
}

/// `reqwest`-backed transport
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
}

impl HttpTransport {
    pub fn new(base_url: impl Into<String>) -> Result<Self, TransportFailure> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| TransportFailure::Network(e.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }

    fn classify(error: reqwest::Error) -> TransportFailure {
        if error.is_timeout() {
            TransportFailure::Timeout
        } else if error.is_connect() {
            TransportFailure::ConnectionRefused
        } else {
            TransportFailure::Network(error.to_string())
        }
    }
}

#[async_trait]
impl RagTransport for HttpTransport {
    async fn send(&self, request: &RagRequest) -> Result<RawResponse, TransportFailure> {
        let url = format!("{}{}", self.base_url, request.path);
        let mut builder = match request.method {
            Method::Get => self.client.get(&url),
            Method::Post => self.client.post(&url),
        }
        .timeout(request.timeout);

        if let Some(ref body) = request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await.map_err(Self::classify)?;
        let status = response.status().as_u16();
        let body = response.text().await.map_err(Self::classify)?;
        Ok(RawResponse { status, body })
    }
}

/// Scripted reply for the mock transport
#[derive(Debug, Clone, PartialEq)]
pub enum MockReply {
    Status(u16, String),
    Fail(TransportFailure),
}

impl MockReply {
    /// A reply with a JSON body
    pub fn json(status: u16, body: serde_json::Value) -> Self {
        MockReply::Status(status, body.to_string())
    }
}

/// Mock transport for testing.
///
/// Replies queued for a path are consumed in order; once a path's queue is
/// empty its default reply (if any) is returned on every call.
#[derive(Default)]
pub struct MockTransport {
    queued: Mutex<HashMap<String, VecDeque<MockReply>>>,
    defaults: Mutex<HashMap<String, MockReply>>,
    calls: Mutex<Vec<RagRequest>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a one-shot reply for `path`
    pub fn with_reply(self, path: &str, reply: MockReply) -> Self {
        self.push_reply(path, reply);
        self
    }

    /// Reply used for `path` when nothing is queued
    pub fn with_default(self, path: &str, reply: MockReply) -> Self {
        self.set_default(path, reply);
        self
    }

    pub fn push_reply(&self, path: &str, reply: MockReply) {
        self.queued
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .entry(path.to_string())
            .or_default()
            .push_back(reply);
    }

    pub fn set_default(&self, path: &str, reply: MockReply) {
        self.defaults
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(path.to_string(), reply);
    }

    /// Every request sent so far, in order
    pub fn calls(&self) -> Vec<RagRequest> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn call_count(&self, path: &str) -> usize {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|r| r.path == path)
            .count()
    }

    fn next_reply(&self, path: &str) -> Option<MockReply> {
        let queued = self
            .queued
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get_mut(path)
            .and_then(VecDeque::pop_front);
        queued.or_else(|| {
            self.defaults
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .get(path)
                .cloned()
        })
    }
}

#[async_trait]
impl RagTransport for MockTransport {
    async fn send(&self, request: &RagRequest) -> Result<RawResponse, TransportFailure> {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(request.clone());

        match self.next_reply(request.path) {
            Some(MockReply::Status(status, body)) => Ok(RawResponse { status, body }),
            Some(MockReply::Fail(failure)) => Err(failure),
            None => Err(TransportFailure::Network(format!(
                "no mock reply for {}",
                request.path
            ))),
        }
    }
}
