//! Shared fixtures for the integration tests
//!
//! Builds a full `FactGraphApi` over an in-memory store and a scripted RAG
//! transport, so tests can drive writes and observe the embedding status
//! the background tasks leave behind.

#![allow(dead_code)]

use factgraph::rag::{MockReply, MockTransport};
use factgraph::{
    ActorId, AllowAll, Corpus, EmbeddingStatus, Fact, FactGraphApi, FactId, NewFact, OpenStore,
    ProjectId, RagClient, RagConfig, SqliteStore,
};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

pub struct TestEnv {
    pub api: FactGraphApi,
    pub store: Arc<SqliteStore>,
    pub transport: Arc<MockTransport>,
    pub project: ProjectId,
    pub actor: ActorId,
}

/// Fast-retry configuration pointing at the default service address
pub fn test_config() -> RagConfig {
    RagConfig {
        base_backoff_ms: 1,
        ..RagConfig::default()
    }
}

pub fn env_with(transport: MockTransport) -> TestEnv {
    env_with_config(transport, test_config())
}

pub fn env_with_config(transport: MockTransport, config: RagConfig) -> TestEnv {
    let store = Arc::new(SqliteStore::open_in_memory().expect("in-memory store"));
    let transport = Arc::new(transport);
    let client = RagClient::with_transport(config, transport.clone());
    let api = FactGraphApi::new(
        store.clone(),
        client,
        Arc::new(AllowAll),
        tokio::runtime::Handle::current(),
    );
    TestEnv {
        api,
        store,
        transport,
        project: ProjectId::new(),
        actor: ActorId::from("tester"),
    }
}

/// An environment whose service accepts every embedding
pub fn env() -> TestEnv {
    env_with(MockTransport::new().with_default("/embed", embed_ok()))
}

pub fn embed_ok() -> MockReply {
    MockReply::json(200, json!({ "success": true, "fact_id": "", "message": "ok" }))
}

pub fn search_reply(hits: &[(String, f64, &str)]) -> MockReply {
    let results: Vec<_> = hits
        .iter()
        .map(|(id, score, statement)| json!({ "fact_id": id, "score": score, "statement": statement }))
        .collect();
    MockReply::json(200, json!({ "results": results }))
}

impl TestEnv {
    pub fn corpus(&self, name: &str) -> Corpus {
        self.api
            .create_corpus(&self.actor, self.project, name, None)
            .expect("create corpus")
    }

    pub fn child_corpus(&self, name: &str, parent: &Corpus) -> Corpus {
        self.api
            .create_corpus(&self.actor, self.project, name, Some(parent.id))
            .expect("create child corpus")
    }

    pub fn fact(&self, corpus: &Corpus, statement: &str) -> Fact {
        self.api
            .create_fact(&self.actor, NewFact::new(corpus.id).with_statement(statement))
            .expect("create fact")
    }

    pub fn reload(&self, id: &FactId) -> Fact {
        self.api.graph().get_fact(id).expect("fact exists")
    }

    /// Poll until the fact reaches `status`, yielding to background tasks
    pub async fn wait_for_status(&self, id: &FactId, status: EmbeddingStatus) -> Fact {
        for _ in 0..200 {
            let fact = self.reload(id);
            if fact.embedding.status == status {
                return fact;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!(
            "fact {} never reached {:?} (now {:?})",
            id,
            status,
            self.reload(id).embedding.status
        );
    }
}
