//! Normalized error taxonomy for RAG service calls

use thiserror::Error;

/// A failed call to the RAG service.
///
/// Returned as a value from every client operation; callers decide whether
/// to record, log or ignore it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RagError {
    #[error("Cannot connect to RAG service at {url}")]
    ConnectionRefused { url: String },

    #[error("RAG service timed out after {secs}s")]
    Timeout { secs: u64 },

    #[error("RAG service returned HTTP {status}")]
    HttpStatus { status: u16 },

    #[error("Network error: {0}")]
    Network(String),

    #[error("RAG service is disabled")]
    Disabled,

    #[error("Unexpected RAG service error: {0}")]
    Unknown(String),
}

impl RagError {
    /// Stable machine-readable error kind
    pub fn kind(&self) -> String {
        match self {
            RagError::ConnectionRefused { .. } => "connection-refused".to_string(),
            RagError::Timeout { .. } => "timeout".to_string(),
            RagError::HttpStatus { status } => format!("http-status-{}", status),
            RagError::Network(_) => "network-error".to_string(),
            RagError::Disabled => "service-disabled".to_string(),
            RagError::Unknown(_) => "unknown".to_string(),
        }
    }

    /// Transport failures and server errors are worth another attempt;
    /// client errors are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            RagError::ConnectionRefused { .. } | RagError::Timeout { .. } | RagError::Network(_) => {
                true
            }
            RagError::HttpStatus { status } => *status >= 500,
            RagError::Disabled | RagError::Unknown(_) => false,
        }
    }
}
