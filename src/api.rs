//! Transport-independent API layer.
//!
//! `FactGraphApi` is the single entry point for consumer-facing operations.
//! Every call checks the caller's role on the owning project first, then
//! runs the graph operation, then hands content changes to the embedding
//! pipeline without waiting for it.

use std::collections::HashSet;
use std::sync::Arc;

use thiserror::Error;
use tokio::runtime::Handle;

use crate::auth::{ActorId, Authorizer, Role};
use crate::embedding::{Dispatch, EmbeddingPipeline};
use crate::graph::{
    Corpus, CorpusId, Fact, FactGraph, FactId, FactLink, FactRecord, FactSummary, FactUpdate,
    GraphError, NewFact, ProjectId,
};
use crate::rag::RagClient;
use crate::search::{ScoredFact, SemanticSearch};
use crate::storage::{EmbeddingStats, FactStore, StorageError};

/// Errors returned by the API layer
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{actor} lacks {role} access to project {project}")]
    Denied {
        actor: ActorId,
        project: ProjectId,
        role: Role,
    },

    #[error("corpus {corpus_id} does not belong to project {project_id}")]
    ForeignCorpus {
        corpus_id: CorpusId,
        project_id: ProjectId,
    },

    #[error(transparent)]
    Graph(#[from] GraphError),
}

impl From<StorageError> for ApiError {
    fn from(e: StorageError) -> Self {
        ApiError::Graph(GraphError::Storage(e))
    }
}

impl ApiError {
    /// Whether the error was caused by the caller rather than the backend
    pub fn is_client_error(&self) -> bool {
        match self {
            ApiError::Denied { .. } | ApiError::ForeignCorpus { .. } => true,
            ApiError::Graph(e) => e.is_client_error(),
        }
    }
}

/// Result type for API operations
pub type ApiResult<T> = Result<T, ApiError>;

/// Single entry point for all consumer-facing operations.
#[derive(Clone)]
pub struct FactGraphApi {
    graph: FactGraph,
    pipeline: EmbeddingPipeline,
    search: SemanticSearch,
    authorizer: Arc<dyn Authorizer>,
}

impl FactGraphApi {
    /// Wire up the API over a store and RAG client.
    ///
    /// Embedding tasks are spawned on `runtime`.
    pub fn new(
        store: Arc<dyn FactStore>,
        client: RagClient,
        authorizer: Arc<dyn Authorizer>,
        runtime: Handle,
    ) -> Self {
        let graph = FactGraph::new(store.clone());
        let pipeline = EmbeddingPipeline::with_runtime(store, client.clone(), runtime);
        let search = SemanticSearch::new(graph.clone(), client);
        Self {
            graph,
            pipeline,
            search,
            authorizer,
        }
    }

    pub fn graph(&self) -> &FactGraph {
        &self.graph
    }

    pub fn pipeline(&self) -> &EmbeddingPipeline {
        &self.pipeline
    }

    fn authorize(&self, actor: &ActorId, project: &ProjectId, role: Role) -> ApiResult<()> {
        if self.authorizer.has_role(actor, project, role) {
            Ok(())
        } else {
            tracing::debug!(%actor, %project, %role, "access denied");
            Err(ApiError::Denied {
                actor: actor.clone(),
                project: *project,
                role,
            })
        }
    }

    fn authorize_corpus(
        &self,
        actor: &ActorId,
        corpus_id: &CorpusId,
        role: Role,
    ) -> ApiResult<Corpus> {
        let corpus = self.graph.get_corpus(corpus_id)?;
        self.authorize(actor, &corpus.project_id, role)?;
        Ok(corpus)
    }

    fn authorize_fact(&self, actor: &ActorId, fact_id: &FactId, role: Role) -> ApiResult<Fact> {
        let fact = self.graph.get_fact(fact_id)?;
        self.authorize_corpus(actor, &fact.corpus_id, role)?;
        Ok(fact)
    }

    // --- Corpora ---

    pub fn create_corpus(
        &self,
        actor: &ActorId,
        project: ProjectId,
        name: &str,
        basis_corpus_id: Option<CorpusId>,
    ) -> ApiResult<Corpus> {
        self.authorize(actor, &project, Role::Editor)?;
        Ok(self.graph.create_corpus(project, name, basis_corpus_id)?)
    }

    pub fn set_basis_corpus(
        &self,
        actor: &ActorId,
        corpus_id: &CorpusId,
        basis_corpus_id: Option<CorpusId>,
    ) -> ApiResult<Corpus> {
        self.authorize_corpus(actor, corpus_id, Role::Editor)?;
        Ok(self.graph.set_basis_corpus(corpus_id, basis_corpus_id)?)
    }

    /// Delete a corpus with all of its facts
    pub fn delete_corpus(
        &self,
        actor: &ActorId,
        corpus_id: &CorpusId,
    ) -> ApiResult<Vec<FactId>> {
        self.authorize_corpus(actor, corpus_id, Role::Editor)?;
        let removed = self.graph.delete_corpus(corpus_id)?;
        for id in &removed {
            self.pipeline.forget(id);
        }
        Ok(removed)
    }

    pub fn list_corpora(&self, actor: &ActorId, project: &ProjectId) -> ApiResult<Vec<Corpus>> {
        self.authorize(actor, project, Role::Viewer)?;
        Ok(self.graph.list_corpora(Some(project))?)
    }

    // --- Facts ---

    /// Create a fact and dispatch it for embedding when it has a statement
    pub fn create_fact(&self, actor: &ActorId, input: NewFact) -> ApiResult<Fact> {
        self.authorize_corpus(actor, &input.corpus_id, Role::Editor)?;
        let fact = self.graph.create_fact(input)?;
        if fact.has_statement() {
            // Detached; the outcome lands in the fact's embedding status
            drop(self.pipeline.enqueue(fact.id));
        }
        Ok(fact)
    }

    /// Update a fact; a changed statement is re-dispatched for embedding
    pub fn update_fact(
        &self,
        actor: &ActorId,
        id: &FactId,
        update: FactUpdate,
    ) -> ApiResult<Fact> {
        self.authorize_fact(actor, id, Role::Editor)?;
        if let Some(target) = update.corpus_id {
            self.authorize_corpus(actor, &target, Role::Editor)?;
        }
        let change = self.graph.update_fact(id, update)?;
        if change.needs_embedding {
            drop(self.pipeline.enqueue(change.fact.id));
        }
        Ok(change.fact)
    }

    pub fn delete_fact(&self, actor: &ActorId, id: &FactId) -> ApiResult<Fact> {
        self.authorize_fact(actor, id, Role::Editor)?;
        let fact = self.graph.delete_fact(id)?;
        self.pipeline.forget(id);
        Ok(fact)
    }

    pub fn get_fact(&self, actor: &ActorId, id: &FactId) -> ApiResult<FactRecord> {
        self.authorize_fact(actor, id, Role::Viewer)?;
        Ok(self.graph.get_record(id)?)
    }

    pub fn link(&self, actor: &ActorId, a: &FactId, b: &FactId) -> ApiResult<FactLink> {
        self.authorize_fact(actor, a, Role::Editor)?;
        self.authorize_fact(actor, b, Role::Editor)?;
        Ok(self.graph.link(a, b)?)
    }

    pub fn unlink(&self, actor: &ActorId, a: &FactId, b: &FactId) -> ApiResult<bool> {
        self.authorize_fact(actor, a, Role::Editor)?;
        self.authorize_fact(actor, b, Role::Editor)?;
        Ok(self.graph.unlink(a, b)?)
    }

    /// Ancestry of a fact, root first
    pub fn basis_chain(&self, actor: &ActorId, id: &FactId) -> ApiResult<Vec<FactSummary>> {
        self.authorize_fact(actor, id, Role::Viewer)?;
        Ok(self.graph.resolve_chain(id)?)
    }

    // --- Search ---

    /// Semantic search within a project.
    ///
    /// Without an explicit filter every corpus of the project is searched.
    /// Corpora from other projects are rejected.
    pub async fn search(
        &self,
        actor: &ActorId,
        project: &ProjectId,
        query: &str,
        limit: usize,
        corpus_ids: Option<Vec<CorpusId>>,
    ) -> ApiResult<Vec<ScoredFact>> {
        self.authorize(actor, project, Role::Viewer)?;
        let owned = self.project_corpora(project)?;

        let filter = match corpus_ids {
            Some(ids) => {
                if let Some(foreign) = ids.iter().find(|id| !owned.contains(id)) {
                    return Err(ApiError::ForeignCorpus {
                        corpus_id: *foreign,
                        project_id: *project,
                    });
                }
                ids
            }
            None => owned.into_iter().collect(),
        };
        if filter.is_empty() {
            return Ok(Vec::new());
        }

        Ok(self.search.search_by_text(query, limit, Some(&filter)).await)
    }

    /// Facts similar to `id`, restricted to the fact's own project
    pub async fn find_similar(
        &self,
        actor: &ActorId,
        id: &FactId,
        limit: usize,
        same_corpus_only: bool,
    ) -> ApiResult<Vec<ScoredFact>> {
        let fact = self.authorize_fact(actor, id, Role::Viewer)?;
        let project = self.graph.get_corpus(&fact.corpus_id)?.project_id;
        let owned: Vec<CorpusId> = self.project_corpora(&project)?.into_iter().collect();

        Ok(self
            .search
            .find_similar(id, limit, same_corpus_only, Some(&owned))
            .await)
    }

    // --- Embedding administration ---

    /// Store-wide embedding counts
    pub fn embedding_stats(
        &self,
        actor: &ActorId,
        project: &ProjectId,
    ) -> ApiResult<EmbeddingStats> {
        self.authorize(actor, project, Role::Viewer)?;
        Ok(self.pipeline.stats()?)
    }

    pub fn process_pending(
        &self,
        actor: &ActorId,
        project: &ProjectId,
        limit: usize,
    ) -> ApiResult<Dispatch> {
        self.authorize(actor, project, Role::Admin)?;
        Ok(self.pipeline.process_pending(limit)?)
    }

    pub fn retry_failed(
        &self,
        actor: &ActorId,
        project: &ProjectId,
        limit: usize,
    ) -> ApiResult<Dispatch> {
        self.authorize(actor, project, Role::Admin)?;
        Ok(self.pipeline.retry_failed(limit)?)
    }

    fn project_corpora(&self, project: &ProjectId) -> ApiResult<HashSet<CorpusId>> {
        Ok(self
            .graph
            .list_corpora(Some(project))?
            .into_iter()
            .map(|c| c.id)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::StaticGrants;
    use crate::rag::{MockReply, MockTransport, RagConfig};
    use crate::storage::{OpenStore, SqliteStore};
    use serde_json::json;

    fn api(grants: StaticGrants) -> FactGraphApi {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let transport = Arc::new(MockTransport::new().with_default(
            "/embed",
            MockReply::json(200, json!({ "success": true, "fact_id": "x", "message": "ok" })),
        ));
        let client = RagClient::with_transport(RagConfig::default(), transport);
        FactGraphApi::new(store, client, Arc::new(grants), Handle::current())
    }

    #[tokio::test]
    async fn viewer_cannot_write() {
        let project = ProjectId::new();
        let editor = ActorId::from("editor");
        let viewer = ActorId::from("viewer");
        let api = api(
            StaticGrants::new()
                .with_grant(editor.clone(), project, Role::Editor)
                .with_grant(viewer.clone(), project, Role::Viewer),
        );

        let corpus = api.create_corpus(&editor, project, "notes", None).unwrap();
        let denied = api.create_fact(&viewer, NewFact::new(corpus.id).with_statement("X"));
        assert!(matches!(denied, Err(ApiError::Denied { role: Role::Editor, .. })));
        assert_eq!(api.graph().store().embedding_stats().unwrap().total, 0);

        assert_eq!(api.list_corpora(&viewer, &project).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn pipeline_administration_requires_admin() {
        let project = ProjectId::new();
        let editor = ActorId::from("editor");
        let api = api(StaticGrants::new().with_grant(editor.clone(), project, Role::Editor));

        let err = api.process_pending(&editor, &project, 10).unwrap_err();
        assert!(err.is_client_error());
        assert!(matches!(api.retry_failed(&editor, &project, 10), Err(ApiError::Denied { .. })));
    }

    #[tokio::test]
    async fn search_rejects_foreign_corpus() {
        let project = ProjectId::new();
        let other = ProjectId::new();
        let actor = ActorId::from("ada");
        let api = api(
            StaticGrants::new()
                .with_grant(actor.clone(), project, Role::Editor)
                .with_grant(actor.clone(), other, Role::Editor),
        );
        let foreign = api.create_corpus(&actor, other, "theirs", None).unwrap();

        let err = api
            .search(&actor, &project, "q", 5, Some(vec![foreign.id]))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::ForeignCorpus { corpus_id, .. } if corpus_id == foreign.id));
    }
}
