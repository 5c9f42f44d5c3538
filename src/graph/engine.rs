//! FactGraph: the consistency engine over corpora, facts and links

use super::chain;
use super::corpus::{Corpus, CorpusId, ProjectId};
use super::fact::{
    normalize_statement, EmbeddingInfo, EmbeddingStatus, Fact, FactId, FactRecord, FactState,
    FactSummary, FactUpdate, NewFact,
};
use super::link::FactLink;
use super::validate::{Validator, Violation};
use crate::storage::{FactStore, StorageError};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

/// Errors that can occur in fact graph operations
#[derive(Debug, Error)]
pub enum GraphError {
    #[error("{0}")]
    Violation(#[from] Violation),

    #[error("Corpus not found: {0}")]
    CorpusNotFound(CorpusId),

    #[error("Fact not found: {0}")]
    FactNotFound(FactId),

    #[error("Basis fact not found: {0}")]
    BasisNotFound(FactId),

    #[error("Invalid corpus: {0}")]
    InvalidCorpus(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

impl GraphError {
    /// Whether the error was caused by the caller's input rather than the store
    pub fn is_client_error(&self) -> bool {
        !matches!(self, GraphError::Storage(_))
    }
}

/// Result type for fact graph operations
pub type GraphResult<T> = Result<T, GraphError>;

/// Outcome of a fact update
#[derive(Debug, Clone)]
pub struct FactChange {
    pub fact: Fact,
    /// The statement text changed and is non-empty
    pub needs_embedding: bool,
}

/// The fact graph engine
///
/// Every write goes through the validator before reaching the store. The
/// store is shared with the embedding pipeline.
#[derive(Clone)]
pub struct FactGraph {
    store: Arc<dyn FactStore>,
}

impl FactGraph {
    pub fn new(store: Arc<dyn FactStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn FactStore> {
        &self.store
    }

    fn validator(&self) -> Validator<'_> {
        Validator::new(self.store.as_ref())
    }

    // === Corpora ===

    /// Create a corpus, optionally derived from a parent in the same project
    pub fn create_corpus(
        &self,
        project_id: ProjectId,
        name: &str,
        basis_corpus_id: Option<CorpusId>,
    ) -> GraphResult<Corpus> {
        let name = name.trim();
        if name.is_empty() {
            return Err(GraphError::InvalidCorpus("name must not be blank".into()));
        }

        let mut corpus = Corpus::new(project_id, name);
        if let Some(parent_id) = basis_corpus_id {
            self.check_parent(&corpus, &parent_id)?;
            corpus.basis_corpus_id = Some(parent_id);
        }

        self.store.save_corpus(&corpus)?;
        tracing::debug!(corpus_id = %corpus.id, project_id = %project_id, "corpus created");
        Ok(corpus)
    }

    pub fn get_corpus(&self, id: &CorpusId) -> GraphResult<Corpus> {
        self.store
            .load_corpus(id)?
            .ok_or(GraphError::CorpusNotFound(*id))
    }

    pub fn list_corpora(&self, project_id: Option<&ProjectId>) -> GraphResult<Vec<Corpus>> {
        Ok(self.store.list_corpora(project_id)?)
    }

    /// Change or clear the parent a corpus derives from.
    ///
    /// Facts in the corpus whose basis lived in the previous parent lose
    /// their basis. Clearing the parent clears every basis in the corpus.
    pub fn set_basis_corpus(
        &self,
        id: &CorpusId,
        basis_corpus_id: Option<CorpusId>,
    ) -> GraphResult<Corpus> {
        let mut corpus = self.get_corpus(id)?;
        if corpus.basis_corpus_id == basis_corpus_id {
            return Ok(corpus);
        }
        if let Some(parent_id) = basis_corpus_id {
            self.check_parent(&corpus, &parent_id)?;
        }

        let previous = corpus.basis_corpus_id;
        corpus.basis_corpus_id = basis_corpus_id;
        self.store.save_corpus(&corpus)?;

        let cleared = match (previous, basis_corpus_id) {
            (_, None) => self.store.clear_bases_in(id)?,
            (Some(previous), Some(_)) => self.store.clear_bases_into(id, &previous)?,
            (None, Some(_)) => 0,
        };
        if cleared > 0 {
            tracing::info!(corpus_id = %id, cleared, "cleared bases after parent corpus change");
        }
        Ok(corpus)
    }

    /// Delete a corpus and everything in it. Returns the removed fact ids.
    pub fn delete_corpus(&self, id: &CorpusId) -> GraphResult<Vec<FactId>> {
        self.get_corpus(id)?;
        let removed = self.store.delete_corpus(id)?;
        tracing::info!(corpus_id = %id, facts = removed.len(), "corpus deleted");
        Ok(removed)
    }

    fn check_parent(&self, corpus: &Corpus, parent_id: &CorpusId) -> GraphResult<()> {
        if parent_id == &corpus.id {
            return Err(GraphError::InvalidCorpus(
                "corpus cannot be its own basis corpus".into(),
            ));
        }
        let parent = self.get_corpus(parent_id)?;
        if parent.project_id != corpus.project_id {
            return Err(GraphError::InvalidCorpus(
                "basis corpus must belong to the same project".into(),
            ));
        }
        Ok(())
    }

    // === Facts ===

    /// Validate and persist a new fact.
    ///
    /// A blank statement forces `clarify`; otherwise the supplied state is
    /// used, defaulting to `ready`. Embedding starts out `pending`.
    pub fn create_fact(&self, input: NewFact) -> GraphResult<Fact> {
        let corpus = self.get_corpus(&input.corpus_id)?;
        let statement = normalize_statement(input.statement);
        let state = match statement {
            None => FactState::Clarify,
            Some(_) => input.state.unwrap_or(FactState::Ready),
        };

        let now = Utc::now();
        let fact = Fact {
            id: FactId::new(),
            corpus_id: corpus.id,
            statement,
            context: input.context,
            state,
            basis_id: input.basis_id,
            metadata: input.metadata,
            embedding: EmbeddingInfo::default(),
            created_at: now,
            updated_at: now,
        };

        self.validator().check_fact(&fact, &corpus)?;
        self.store.insert_fact(&fact)?;
        tracing::debug!(fact_id = %fact.id, corpus_id = %fact.corpus_id, context = %fact.context, "fact created");
        Ok(fact)
    }

    pub fn get_fact(&self, id: &FactId) -> GraphResult<Fact> {
        self.store.load_fact(id)?.ok_or(GraphError::FactNotFound(*id))
    }

    /// Load a fact with its basis summary and linked fact ids
    pub fn get_record(&self, id: &FactId) -> GraphResult<FactRecord> {
        let fact = self.get_fact(id)?;
        let basis = match fact.basis_id {
            Some(basis_id) => self.store.load_summary(&basis_id)?,
            None => None,
        };
        let linked = self
            .store
            .links_for(&[fact.id])?
            .iter()
            .filter_map(|link| link.other(&fact.id))
            .collect();
        Ok(FactRecord {
            fact,
            basis,
            linked,
        })
    }

    /// Apply a partial update.
    ///
    /// Moving to another corpus clears the basis and drops links; a basis
    /// supplied alongside a move is rejected. A context change drops links.
    /// Facts derived from this one lose their basis when it moves or leaves
    /// the knowledge context. A changed statement resets embedding to
    /// `pending`.
    pub fn update_fact(&self, id: &FactId, update: FactUpdate) -> GraphResult<FactChange> {
        let current = self.get_fact(id)?;
        let structural = update.touches_structure();

        let relocating = update
            .corpus_id
            .is_some_and(|corpus_id| corpus_id != current.corpus_id);
        if relocating && matches!(update.basis_id, Some(Some(_))) {
            return Err(Violation::RelocationWithBasis.into());
        }

        let mut candidate = current.clone();
        if let Some(corpus_id) = update.corpus_id {
            candidate.corpus_id = corpus_id;
        }
        if let Some(context) = update.context {
            candidate.context = context;
        }
        if let Some(basis_id) = update.basis_id {
            candidate.basis_id = basis_id;
        }
        if relocating {
            candidate.basis_id = None;
        }
        if let Some(metadata) = update.metadata {
            candidate.metadata = metadata;
        }

        let mut statement_changed = false;
        if let Some(statement) = update.statement {
            candidate.statement = normalize_statement(statement);
            statement_changed = candidate.statement != current.statement;
        }

        candidate.state = match (current.has_statement(), candidate.has_statement()) {
            (_, false) => FactState::Clarify,
            (false, true) => update.state.unwrap_or(FactState::Ready),
            (true, true) => update.state.unwrap_or(current.state),
        };

        let corpus = self.get_corpus(&candidate.corpus_id)?;
        if relocating {
            let origin = self.get_corpus(&current.corpus_id)?;
            if origin.project_id != corpus.project_id {
                return Err(GraphError::InvalidCorpus(
                    "facts cannot move to a corpus in another project".into(),
                ));
            }
        }
        if structural {
            self.validator().check_fact(&candidate, &corpus)?;
        }

        if statement_changed {
            candidate.embedding.status = EmbeddingStatus::Pending;
            candidate.embedding.last_embedded_at = None;
        }
        candidate.updated_at = Utc::now();

        self.store.update_fact(&candidate)?;

        let context_changed = candidate.context != current.context;
        if relocating || context_changed {
            let dropped = self.store.delete_links_for(id)?;
            if dropped > 0 {
                tracing::debug!(fact_id = %id, dropped, "links dropped after relocation or context change");
            }
        }
        if relocating || (context_changed && !candidate.context.allows_basis()) {
            let cleared = self.store.clear_dependent_bases(id)?;
            if cleared > 0 {
                tracing::info!(fact_id = %id, cleared, "cleared basis of dependent facts");
            }
        }

        let needs_embedding = statement_changed && candidate.has_statement();
        Ok(FactChange {
            fact: candidate,
            needs_embedding,
        })
    }

    /// Delete a fact. Its links go with it and dependents lose their basis.
    pub fn delete_fact(&self, id: &FactId) -> GraphResult<Fact> {
        let fact = self.get_fact(id)?;
        self.store.delete_fact(id)?;
        tracing::debug!(fact_id = %id, corpus_id = %fact.corpus_id, "fact deleted");
        Ok(fact)
    }

    // === Links ===

    pub fn link(&self, a: &FactId, b: &FactId) -> GraphResult<FactLink> {
        if a == b {
            return Err(Violation::SelfLink.into());
        }
        let first = self.summary(a)?;
        let second = self.summary(b)?;
        self.validator().check_link(&first, &second)?;

        let link = FactLink::new(*a, *b);
        self.store.insert_link(&link)?;
        Ok(link)
    }

    /// Remove a link in either orientation. Returns whether one existed.
    pub fn unlink(&self, a: &FactId, b: &FactId) -> GraphResult<bool> {
        Ok(self.store.delete_link(a, b)?)
    }

    // === Reads ===

    /// Ancestry of a fact, root first, excluding the fact itself
    pub fn resolve_chain(&self, id: &FactId) -> GraphResult<Vec<FactSummary>> {
        let start = self.summary(id)?;
        Ok(chain::resolve_chain(self.store.as_ref(), &start)?)
    }

    /// Bulk-load records for `ids`. Unknown ids are absent from the map.
    pub fn load_records(&self, ids: &[FactId]) -> GraphResult<HashMap<FactId, FactRecord>> {
        let facts = self.store.load_facts(ids)?;

        let basis_ids: Vec<FactId> = facts.iter().filter_map(|f| f.basis_id).collect();
        let bases: HashMap<FactId, FactSummary> = self
            .store
            .load_summaries(&basis_ids)?
            .into_iter()
            .map(|s| (s.id, s))
            .collect();

        let mut linked: HashMap<FactId, Vec<FactId>> = HashMap::new();
        for link in self.store.links_for(ids)? {
            let (low, high) = link.ids();
            linked.entry(low).or_default().push(high);
            linked.entry(high).or_default().push(low);
        }

        Ok(facts
            .into_iter()
            .map(|fact| {
                let basis = fact.basis_id.and_then(|b| bases.get(&b).cloned());
                let links = linked.remove(&fact.id).unwrap_or_default();
                let id = fact.id;
                (
                    id,
                    FactRecord {
                        fact,
                        basis,
                        linked: links,
                    },
                )
            })
            .collect())
    }

    fn summary(&self, id: &FactId) -> GraphResult<FactSummary> {
        self.store
            .load_summary(id)?
            .ok_or(GraphError::FactNotFound(*id))
    }
}
