//! Fact representation: the atomic statement stored in a corpus

use super::corpus::CorpusId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

/// Free-form per-fact metadata (a JSON object)
pub type Metadata = serde_json::Map<String, serde_json::Value>;

/// Metadata key holding the last embedding error message
pub const EMBEDDING_ERROR_KEY: &str = "embedding_error";

/// Metadata key holding the RFC 3339 timestamp of the last embedding failure
pub const EMBEDDING_FAILED_AT_KEY: &str = "embedding_failed_at";

/// Unique identifier for a fact
///
/// Ordered so that link pairs can be stored canonically. The ordering of the
/// hyphenated string form matches the ordering of the UUID bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FactId(Uuid);

impl FactId {
    /// Create a new random FactId
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create a FactId from an existing UUID
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl Default for FactId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for FactId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for FactId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Error returned when a stored or user-supplied enum label is unknown
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown {kind}: '{value}'")]
pub struct ParseLabelError {
    pub kind: &'static str,
    pub value: String,
}

/// Partition tag constraining which relationships a fact may take part in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FactContext {
    Global,
    Builder,
    #[default]
    Knowledge,
}

impl FactContext {
    pub fn as_str(&self) -> &'static str {
        match self {
            FactContext::Global => "global",
            FactContext::Builder => "builder",
            FactContext::Knowledge => "knowledge",
        }
    }

    /// Only knowledge facts may be derived from a basis fact.
    pub fn allows_basis(&self) -> bool {
        matches!(self, FactContext::Knowledge)
    }
}

impl std::fmt::Display for FactContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FactContext {
    type Err = ParseLabelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "global" => Ok(FactContext::Global),
            "builder" => Ok(FactContext::Builder),
            "knowledge" => Ok(FactContext::Knowledge),
            other => Err(ParseLabelError {
                kind: "fact context",
                value: other.to_string(),
            }),
        }
    }
}

/// Editorial state of a fact
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FactState {
    Clarify,
    Conflict,
    Ready,
    Rejected,
    Confirmed,
}

impl FactState {
    pub fn as_str(&self) -> &'static str {
        match self {
            FactState::Clarify => "clarify",
            FactState::Conflict => "conflict",
            FactState::Ready => "ready",
            FactState::Rejected => "rejected",
            FactState::Confirmed => "confirmed",
        }
    }
}

impl std::fmt::Display for FactState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FactState {
    type Err = ParseLabelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "clarify" => Ok(FactState::Clarify),
            "conflict" => Ok(FactState::Conflict),
            "ready" => Ok(FactState::Ready),
            "rejected" => Ok(FactState::Rejected),
            "confirmed" => Ok(FactState::Confirmed),
            other => Err(ParseLabelError {
                kind: "fact state",
                value: other.to_string(),
            }),
        }
    }
}

/// Reconciliation state of a fact in the external vector index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingStatus {
    #[default]
    Pending,
    Embedded,
    Failed,
}

impl EmbeddingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EmbeddingStatus::Pending => "pending",
            EmbeddingStatus::Embedded => "embedded",
            EmbeddingStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for EmbeddingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EmbeddingStatus {
    type Err = ParseLabelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(EmbeddingStatus::Pending),
            "embedded" => Ok(EmbeddingStatus::Embedded),
            "failed" => Ok(EmbeddingStatus::Failed),
            other => Err(ParseLabelError {
                kind: "embedding status",
                value: other.to_string(),
            }),
        }
    }
}

/// Embedding bookkeeping persisted alongside each fact
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingInfo {
    pub status: EmbeddingStatus,
    pub last_embedded_at: Option<DateTime<Utc>>,
    pub model: Option<String>,
    pub version: Option<String>,
}

/// An atomic statement belonging to exactly one corpus
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fact {
    pub id: FactId,
    pub corpus_id: CorpusId,
    /// Absent when the fact still needs clarification
    pub statement: Option<String>,
    pub context: FactContext,
    pub state: FactState,
    /// Weak reference to the fact this one is derived from
    pub basis_id: Option<FactId>,
    pub metadata: Metadata,
    pub embedding: EmbeddingInfo,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Fact {
    /// The statement text if it is non-blank
    pub fn statement_text(&self) -> Option<&str> {
        self.statement
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    pub fn has_statement(&self) -> bool {
        self.statement_text().is_some()
    }

    /// Minimal projection used by chain traversal and hydration
    pub fn summary(&self) -> FactSummary {
        FactSummary {
            id: self.id,
            corpus_id: self.corpus_id,
            statement: self.statement.clone(),
            state: self.state,
            context: self.context,
            basis_id: self.basis_id,
        }
    }
}

/// Trim a statement, mapping blank input to `None`
pub fn normalize_statement(statement: Option<String>) -> Option<String> {
    statement.and_then(|s| {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            None
        } else if trimmed.len() == s.len() {
            Some(s)
        } else {
            Some(trimmed.to_string())
        }
    })
}

/// Minimal fact projection: enough to render an ancestry chain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FactSummary {
    pub id: FactId,
    pub corpus_id: CorpusId,
    pub statement: Option<String>,
    pub state: FactState,
    pub context: FactContext,
    pub basis_id: Option<FactId>,
}

/// A fact together with its resolved relations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FactRecord {
    pub fact: Fact,
    pub basis: Option<FactSummary>,
    pub linked: Vec<FactId>,
}

/// Input for creating a fact
#[derive(Debug, Clone)]
pub struct NewFact {
    pub corpus_id: CorpusId,
    pub statement: Option<String>,
    pub context: FactContext,
    /// Explicit state; ignored when the statement is blank
    pub state: Option<FactState>,
    pub basis_id: Option<FactId>,
    pub metadata: Metadata,
}

impl NewFact {
    pub fn new(corpus_id: CorpusId) -> Self {
        Self {
            corpus_id,
            statement: None,
            context: FactContext::default(),
            state: None,
            basis_id: None,
            metadata: Metadata::new(),
        }
    }

    pub fn with_statement(mut self, statement: impl Into<String>) -> Self {
        self.statement = Some(statement.into());
        self
    }

    pub fn with_context(mut self, context: FactContext) -> Self {
        self.context = context;
        self
    }

    pub fn with_state(mut self, state: FactState) -> Self {
        self.state = Some(state);
        self
    }

    pub fn with_basis(mut self, basis_id: FactId) -> Self {
        self.basis_id = Some(basis_id);
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}

/// Partial update of a fact. `None` leaves a field untouched.
#[derive(Debug, Clone, Default)]
pub struct FactUpdate {
    /// `Some(None)` clears the statement
    pub statement: Option<Option<String>>,
    pub context: Option<FactContext>,
    pub state: Option<FactState>,
    /// `Some(None)` clears the basis
    pub basis_id: Option<Option<FactId>>,
    pub corpus_id: Option<CorpusId>,
    /// Replaces the metadata map wholesale
    pub metadata: Option<Metadata>,
}

impl FactUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_statement(mut self, statement: impl Into<String>) -> Self {
        self.statement = Some(Some(statement.into()));
        self
    }

    pub fn clear_statement(mut self) -> Self {
        self.statement = Some(None);
        self
    }

    pub fn with_context(mut self, context: FactContext) -> Self {
        self.context = Some(context);
        self
    }

    pub fn with_state(mut self, state: FactState) -> Self {
        self.state = Some(state);
        self
    }

    pub fn with_basis(mut self, basis_id: FactId) -> Self {
        self.basis_id = Some(Some(basis_id));
        self
    }

    pub fn clear_basis(mut self) -> Self {
        self.basis_id = Some(None);
        self
    }

    pub fn move_to(mut self, corpus_id: CorpusId) -> Self {
        self.corpus_id = Some(corpus_id);
        self
    }

    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// Whether the update touches a field covered by structural validation
    pub fn touches_structure(&self) -> bool {
        self.context.is_some() || self.basis_id.is_some() || self.corpus_id.is_some()
    }
}
