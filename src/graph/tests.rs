//! Serialization tests with wire-shaped fixtures

use super::*;
use serde_json::{json, Value};

fn fact_fixture() -> Value {
    json!({
        "id": "0f8fad5b-d9cb-469f-a165-70867728950e",
        "corpus_id": "7c9e6679-7425-40de-944b-e07fc1f90ae7",
        "statement": "Quantum entanglement is non-local",
        "context": "knowledge",
        "state": "ready",
        "basis_id": null,
        "metadata": { "source": "seminar notes" },
        "embedding": {
            "status": "embedded",
            "last_embedded_at": "2025-11-30T10:23:00Z",
            "model": "all-MiniLM-L6-v2",
            "version": "1"
        },
        "created_at": "2025-11-29T08:00:00Z",
        "updated_at": "2025-11-30T10:23:00Z"
    })
}

#[test]
fn fact_deserializes_from_fixture() {
    let fact: Fact = serde_json::from_value(fact_fixture()).unwrap();
    assert_eq!(fact.context, FactContext::Knowledge);
    assert_eq!(fact.state, FactState::Ready);
    assert_eq!(fact.embedding.status, EmbeddingStatus::Embedded);
    assert_eq!(fact.metadata["source"], "seminar notes");
    assert_eq!(
        fact.id.to_string(),
        "0f8fad5b-d9cb-469f-a165-70867728950e"
    );
}

#[test]
fn fact_serializes_labels_lowercase() {
    let fact: Fact = serde_json::from_value(fact_fixture()).unwrap();
    let value = serde_json::to_value(&fact).unwrap();
    assert_eq!(value["context"], "knowledge");
    assert_eq!(value["embedding"]["status"], "embedded");
    assert_eq!(value["id"], fact_fixture()["id"]);
}

#[test]
fn unknown_context_is_rejected() {
    let mut fixture = fact_fixture();
    fixture["context"] = json!("project");
    assert!(serde_json::from_value::<Fact>(fixture).is_err());
}

#[test]
fn record_carries_basis_and_links() {
    let fact: Fact = serde_json::from_value(fact_fixture()).unwrap();
    let linked = FactId::new();
    let record = FactRecord {
        basis: None,
        linked: vec![linked],
        fact,
    };
    let value = serde_json::to_value(&record).unwrap();
    assert!(value["basis"].is_null());
    assert_eq!(value["linked"][0], json!(linked.to_string()));
    assert_eq!(value["fact"]["statement"], "Quantum entanglement is non-local");
}

#[test]
fn corpus_round_trips_through_json() {
    let project = ProjectId::new();
    let parent = Corpus::new(project, "generation 1");
    let child = Corpus::new(project, "generation 2").with_basis_corpus(parent.id);

    let json = serde_json::to_string(&child).unwrap();
    let back: Corpus = serde_json::from_str(&json).unwrap();
    assert_eq!(back, child);
    assert_eq!(back.basis_corpus_id, Some(parent.id));
}
