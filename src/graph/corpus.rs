//! Corpus: a named collection of facts, optionally derived from a parent corpus

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

/// Identifier of the project a corpus belongs to.
///
/// Projects are managed elsewhere; this crate only references them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProjectId(Uuid);

impl ProjectId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl Default for ProjectId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ProjectId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ProjectId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Unique identifier for a corpus
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorpusId(Uuid);

impl CorpusId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl Default for CorpusId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for CorpusId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for CorpusId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// A named collection of facts within a project
///
/// `basis_corpus_id` designates the parent generation that knowledge facts
/// in this corpus may derive from. The parent graph forms a forest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Corpus {
    pub id: CorpusId,
    pub project_id: ProjectId,
    pub name: String,
    pub basis_corpus_id: Option<CorpusId>,
    pub created_at: DateTime<Utc>,
}

impl Corpus {
    /// Create a root corpus (no basis corpus)
    pub fn new(project_id: ProjectId, name: impl Into<String>) -> Self {
        Self {
            id: CorpusId::new(),
            project_id,
            name: name.into(),
            basis_corpus_id: None,
            created_at: Utc::now(),
        }
    }

    /// Derive this corpus from a parent corpus
    pub fn with_basis_corpus(mut self, basis_corpus_id: CorpusId) -> Self {
        self.basis_corpus_id = Some(basis_corpus_id);
        self
    }

    /// Whether a fact in `corpus_id` may serve as basis for facts in this corpus
    pub fn accepts_basis_from(&self, corpus_id: &CorpusId) -> bool {
        self.basis_corpus_id.as_ref() == Some(corpus_id) || &self.id == corpus_id
    }
}
