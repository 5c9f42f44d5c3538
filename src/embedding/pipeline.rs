//! Fire-and-forget synchronization of fact statements into the vector index

use crate::graph::{EmbeddingStatus, Fact, FactId};
use crate::rag::RagClient;
use crate::storage::{EmbeddingStats, FactStore, StorageResult};
use chrono::Utc;
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

/// Why a fact was not sent to the index
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The fact no longer exists
    Missing,
    /// The fact has no statement to embed
    EmptyStatement,
}

/// Result of a single embedding attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EmbedOutcome {
    Embedded,
    Skipped(SkipReason),
    /// Status was set to failed; carries the recorded error message
    Failed(String),
}

/// Tasks started by a batch operation
#[derive(Debug)]
pub struct Dispatch {
    handles: Vec<JoinHandle<EmbedOutcome>>,
}

impl Dispatch {
    /// Number of facts dispatched
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Wait for every dispatched task. Panicked tasks are reported as failures.
    pub async fn join(self) -> Vec<EmbedOutcome> {
        let mut outcomes = Vec::with_capacity(self.handles.len());
        for handle in self.handles {
            outcomes.push(match handle.await {
                Ok(outcome) => outcome,
                Err(e) => EmbedOutcome::Failed(format!("embedding task aborted: {}", e)),
            });
        }
        outcomes
    }
}

/// Keeps the external index eventually consistent with fact statements.
///
/// Each fact is embedded on its own detached task. Failures are recorded on
/// the fact (`failed` status plus error metadata) and never surface to the
/// code that triggered the write.
#[derive(Clone)]
pub struct EmbeddingPipeline {
    store: Arc<dyn FactStore>,
    client: RagClient,
    runtime: Handle,
}

impl EmbeddingPipeline {
    /// Pipeline spawning onto the current tokio runtime
    ///
    /// # Panics
    ///
    /// Panics when called outside a tokio runtime.
    pub fn new(store: Arc<dyn FactStore>, client: RagClient) -> Self {
        Self::with_runtime(store, client, Handle::current())
    }

    pub fn with_runtime(store: Arc<dyn FactStore>, client: RagClient, runtime: Handle) -> Self {
        Self {
            store,
            client,
            runtime,
        }
    }

    pub fn client(&self) -> &RagClient {
        &self.client
    }

    /// Submit a fact for embedding and return immediately.
    ///
    /// The returned handle may be dropped; the outcome is also visible
    /// through the fact's embedding status.
    pub fn enqueue(&self, fact_id: FactId) -> JoinHandle<EmbedOutcome> {
        let pipeline = self.clone();
        self.runtime
            .spawn(async move { pipeline.embed_now(&fact_id).await })
    }

    /// Embed a fact on the current task and record the outcome
    pub async fn embed_now(&self, fact_id: &FactId) -> EmbedOutcome {
        let fact = match self.store.load_fact(fact_id) {
            Ok(Some(fact)) => fact,
            Ok(None) => {
                tracing::debug!(fact_id = %fact_id, "fact vanished before embedding");
                return EmbedOutcome::Skipped(SkipReason::Missing);
            }
            Err(e) => return self.record_failure(fact_id, e.to_string()),
        };

        let Some(statement) = fact.statement_text() else {
            return EmbedOutcome::Skipped(SkipReason::EmptyStatement);
        };

        match self
            .client
            .embed(&fact.id, statement, Some(&fact.corpus_id))
            .await
        {
            Ok(response) if response.success => self.record_success(&fact),
            Ok(response) => {
                let message = if response.message.is_empty() {
                    "embedding service reported failure".to_string()
                } else {
                    response.message
                };
                self.record_failure(fact_id, message)
            }
            Err(e) => self.record_failure(fact_id, e.to_string()),
        }
    }

    /// Dispatch up to `limit` pending facts, oldest first
    pub fn process_pending(&self, limit: usize) -> StorageResult<Dispatch> {
        let facts = self
            .store
            .facts_with_status(EmbeddingStatus::Pending, limit)?;
        tracing::info!(count = facts.len(), "dispatching pending embeddings");
        Ok(self.dispatch(&facts))
    }

    /// Flip up to `limit` failed facts back to pending and dispatch them.
    ///
    /// A fact that cannot be reset is logged and stays failed; the rest
    /// are still dispatched.
    pub fn retry_failed(&self, limit: usize) -> StorageResult<Dispatch> {
        let facts = self
            .store
            .facts_with_status(EmbeddingStatus::Failed, limit)?;
        let mut handles = Vec::with_capacity(facts.len());
        for fact in &facts {
            match self.store.mark_pending(&fact.id) {
                Ok(()) => handles.push(self.enqueue(fact.id)),
                Err(e) => {
                    tracing::warn!(fact_id = %fact.id, error = %e, "could not reset failed embedding")
                }
            }
        }
        tracing::info!(count = handles.len(), "retrying failed embeddings");
        Ok(Dispatch { handles })
    }

    pub fn stats(&self) -> StorageResult<EmbeddingStats> {
        self.store.embedding_stats()
    }

    /// Note that a fact was deleted.
    ///
    /// The service has no delete endpoint, so the index entry stays behind
    /// until the index is rebuilt. Search drops ids that no longer resolve.
    pub fn forget(&self, fact_id: &FactId) {
        tracing::debug!(fact_id = %fact_id, "fact deleted; index entry left to expire");
    }

    fn dispatch(&self, facts: &[Fact]) -> Dispatch {
        Dispatch {
            handles: facts.iter().map(|f| self.enqueue(f.id)).collect(),
        }
    }

    fn record_success(&self, fact: &Fact) -> EmbedOutcome {
        let config = self.client.config();
        match self.store.mark_embedded(
            &fact.id,
            Utc::now(),
            &config.embedding_model,
            &config.embedding_version,
        ) {
            Ok(()) => {
                tracing::debug!(fact_id = %fact.id, "fact embedded");
                EmbedOutcome::Embedded
            }
            Err(e) => self.record_failure(&fact.id, e.to_string()),
        }
    }

    fn record_failure(&self, fact_id: &FactId, message: String) -> EmbedOutcome {
        tracing::warn!(fact_id = %fact_id, error = %message, "embedding failed");
        if let Err(e) = self.store.mark_failed(fact_id, &message, Utc::now()) {
            tracing::error!(fact_id = %fact_id, error = %e, "could not record embedding failure");
        }
        EmbedOutcome::Failed(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{Corpus, EmbeddingInfo, FactContext, FactState, ProjectId, EMBEDDING_ERROR_KEY};
    use crate::rag::{MockReply, MockTransport, RagConfig, TransportFailure};
    use crate::storage::{OpenStore, SqliteStore};
    use serde_json::json;

    struct Harness {
        store: Arc<SqliteStore>,
        transport: Arc<MockTransport>,
        pipeline: EmbeddingPipeline,
        corpus: Corpus,
    }

    fn harness(transport: MockTransport) -> Harness {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let corpus = Corpus::new(ProjectId::new(), "notes");
        store.save_corpus(&corpus).unwrap();
        let transport = Arc::new(transport);
        let config = RagConfig {
            base_backoff_ms: 1,
            ..RagConfig::default()
        };
        let client = RagClient::with_transport(config, transport.clone());
        let pipeline = EmbeddingPipeline::new(store.clone(), client);
        Harness {
            store,
            transport,
            pipeline,
            corpus,
        }
    }

    fn insert(h: &Harness, statement: Option<&str>) -> Fact {
        let now = Utc::now();
        let fact = Fact {
            id: FactId::new(),
            corpus_id: h.corpus.id,
            statement: statement.map(str::to_string),
            context: FactContext::Knowledge,
            state: FactState::Ready,
            basis_id: None,
            metadata: Default::default(),
            embedding: EmbeddingInfo::default(),
            created_at: now,
            updated_at: now,
        };
        h.store.insert_fact(&fact).unwrap();
        fact
    }

    fn embed_ok() -> MockReply {
        MockReply::json(200, json!({ "success": true, "fact_id": "x", "message": "ok" }))
    }

    #[tokio::test]
    async fn successful_embed_records_tags() {
        let h = harness(MockTransport::new().with_default("/embed", embed_ok()));
        let fact = insert(&h, Some("X"));

        let outcome = h.pipeline.enqueue(fact.id).await.unwrap();
        assert_eq!(outcome, EmbedOutcome::Embedded);

        let stored = h.store.load_fact(&fact.id).unwrap().unwrap();
        assert_eq!(stored.embedding.status, EmbeddingStatus::Embedded);
        assert_eq!(stored.embedding.model.as_deref(), Some("all-MiniLM-L6-v2"));
        assert_eq!(stored.embedding.version.as_deref(), Some("1"));

        let body = h.transport.calls()[0].body.clone().unwrap();
        assert_eq!(body["context_id"], h.corpus.id.to_string());
        assert_eq!(body["statement"], "X");
    }

    #[tokio::test]
    async fn service_reported_failure_marks_failed() {
        let h = harness(MockTransport::new().with_default(
            "/embed",
            MockReply::json(200, json!({ "success": false, "fact_id": "x", "message": "model not loaded" })),
        ));
        let fact = insert(&h, Some("X"));

        let outcome = h.pipeline.embed_now(&fact.id).await;
        assert_eq!(outcome, EmbedOutcome::Failed("model not loaded".into()));
        let stored = h.store.load_fact(&fact.id).unwrap().unwrap();
        assert_eq!(stored.embedding.status, EmbeddingStatus::Failed);
        assert_eq!(stored.metadata[EMBEDDING_ERROR_KEY], "model not loaded");
    }

    #[tokio::test]
    async fn empty_and_missing_facts_are_skipped() {
        let h = harness(MockTransport::new().with_default("/embed", embed_ok()));
        let blank = insert(&h, None);

        assert_eq!(
            h.pipeline.embed_now(&blank.id).await,
            EmbedOutcome::Skipped(SkipReason::EmptyStatement)
        );
        assert_eq!(
            h.pipeline.embed_now(&FactId::new()).await,
            EmbedOutcome::Skipped(SkipReason::Missing)
        );
        assert!(h.transport.calls().is_empty());
        let stored = h.store.load_fact(&blank.id).unwrap().unwrap();
        assert_eq!(stored.embedding.status, EmbeddingStatus::Pending);
    }

    #[tokio::test]
    async fn process_pending_dispatches_each_fact() {
        let h = harness(MockTransport::new().with_default("/embed", embed_ok()));
        insert(&h, Some("a"));
        insert(&h, Some("b"));
        insert(&h, None);
        insert(&h, Some("c"));

        let dispatch = h.pipeline.process_pending(2).unwrap();
        assert_eq!(dispatch.len(), 2);
        let outcomes = dispatch.join().await;
        assert!(outcomes.iter().all(|o| *o == EmbedOutcome::Embedded));

        let stats = h.pipeline.stats().unwrap();
        assert_eq!(stats.total, 3);
        assert_eq!(stats.embedded, 2);
        assert_eq!(stats.pending, 1);
        assert_eq!(stats.completion_rate(), 66.67);
    }

    #[tokio::test]
    async fn retry_failed_flips_to_pending_and_reattempts() {
        let h = harness(
            MockTransport::new()
                .with_default("/embed", MockReply::Fail(TransportFailure::ConnectionRefused)),
        );
        let fact = insert(&h, Some("X"));

        let outcome = h.pipeline.embed_now(&fact.id).await;
        assert!(matches!(outcome, EmbedOutcome::Failed(ref m) if m.contains("Cannot connect")));
        assert_eq!(h.transport.call_count("/embed"), 3);

        h.transport.set_default("/embed", embed_ok());
        let dispatch = h.pipeline.retry_failed(10).unwrap();
        assert_eq!(dispatch.len(), 1);
        assert_eq!(dispatch.join().await, vec![EmbedOutcome::Embedded]);

        let stored = h.store.load_fact(&fact.id).unwrap().unwrap();
        assert_eq!(stored.embedding.status, EmbeddingStatus::Embedded);
        assert!(!stored.metadata.contains_key(EMBEDDING_ERROR_KEY));
    }

    #[tokio::test]
    async fn retry_failed_dispatches_the_rest_when_one_reset_fails() {
        let h = harness(MockTransport::new().with_default("/embed", embed_ok()));
        let facts: Vec<Fact> = ["a", "b", "c"]
            .into_iter()
            .map(|s| insert(&h, Some(s)))
            .collect();
        for fact in &facts {
            h.store.mark_failed(&fact.id, "down", Utc::now()).unwrap();
        }

        let stuck = facts[1].id;
        h.store
            .conn()
            .unwrap()
            .execute_batch(&format!(
                "CREATE TRIGGER stuck_fact BEFORE UPDATE OF embedding_status ON facts
                 WHEN NEW.id = '{}' AND NEW.embedding_status = 'pending'
                 BEGIN SELECT RAISE(ABORT, 'row locked'); END;",
                stuck
            ))
            .unwrap();

        let dispatch = h.pipeline.retry_failed(10).unwrap();
        assert_eq!(dispatch.len(), 2);
        assert_eq!(
            dispatch.join().await,
            vec![EmbedOutcome::Embedded, EmbedOutcome::Embedded]
        );

        for fact in &facts {
            let status = h.store.load_fact(&fact.id).unwrap().unwrap().embedding.status;
            let want = if fact.id == stuck {
                EmbeddingStatus::Failed
            } else {
                EmbeddingStatus::Embedded
            };
            assert_eq!(status, want);
        }
    }
}
