//! Structural rules for basis references and links
//!
//! Rules are checked in a fixed order and the first failing rule wins:
//!
//! 1. a basis on a `global` or `builder` fact is forbidden
//! 2. a knowledge fact may only carry a basis if its corpus has a basis corpus
//! 3. a fact is never its own basis
//! 4. the basis fact must exist
//! 5. the basis fact must be a knowledge fact
//! 6. the basis fact must live in the corpus's basis corpus or in the fact's own corpus

use super::corpus::Corpus;
use super::engine::{GraphError, GraphResult};
use super::fact::{Fact, FactContext, FactSummary};
use crate::storage::FactStore;
use thiserror::Error;

/// A broken structural rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Violation {
    #[error("context forbids basis: {0} facts cannot derive from another fact")]
    ContextForbidsBasis(FactContext),

    #[error("no parent corpus to derive from")]
    NoParentCorpus,

    #[error("fact cannot be its own basis")]
    SelfBasis,

    #[error("basis fact must have context knowledge, found {0}")]
    BasisNotKnowledge(FactContext),

    #[error("basis must be in same corpus or in the corpus's declared parent")]
    BasisOutsideLineage,

    #[error("a basis cannot be assigned while moving a fact to another corpus")]
    RelocationWithBasis,

    #[error("fact cannot link to itself")]
    SelfLink,

    #[error("linked facts must belong to the same corpus")]
    LinkCorpusMismatch,

    #[error("linked facts must share the same context")]
    LinkContextMismatch,

    #[error("facts are already linked")]
    DuplicateLink,
}

/// Checks candidate facts and links against the graph rules
pub struct Validator<'a> {
    store: &'a dyn FactStore,
}

impl<'a> Validator<'a> {
    pub fn new(store: &'a dyn FactStore) -> Self {
        Self { store }
    }

    /// Validate a fact about to be persisted into `corpus`
    pub fn check_fact(&self, candidate: &Fact, corpus: &Corpus) -> GraphResult<()> {
        let Some(basis_id) = candidate.basis_id else {
            return Ok(());
        };

        if !candidate.context.allows_basis() {
            return Err(Violation::ContextForbidsBasis(candidate.context).into());
        }

        if corpus.basis_corpus_id.is_none() {
            return Err(Violation::NoParentCorpus.into());
        }

        if basis_id == candidate.id {
            return Err(Violation::SelfBasis.into());
        }

        let basis = self
            .store
            .load_summary(&basis_id)?
            .ok_or(GraphError::BasisNotFound(basis_id))?;

        if basis.context != FactContext::Knowledge {
            return Err(Violation::BasisNotKnowledge(basis.context).into());
        }

        if !corpus.accepts_basis_from(&basis.corpus_id) {
            return Err(Violation::BasisOutsideLineage.into());
        }

        Ok(())
    }

    /// Validate a prospective link between two existing facts
    pub fn check_link(&self, a: &FactSummary, b: &FactSummary) -> GraphResult<()> {
        if a.id == b.id {
            return Err(Violation::SelfLink.into());
        }
        if a.corpus_id != b.corpus_id {
            return Err(Violation::LinkCorpusMismatch.into());
        }
        if a.context != b.context {
            return Err(Violation::LinkContextMismatch.into());
        }
        if self.store.link_exists(&a.id, &b.id)? {
            return Err(Violation::DuplicateLink.into());
        }
        Ok(())
    }
}
