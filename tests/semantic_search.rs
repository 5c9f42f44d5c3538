//! Semantic search through the API against a scripted RAG service

mod common;

use common::{env, search_reply};
use factgraph::rag::MockReply;
use factgraph::{ApiError, FactId, NewFact, ProjectId};
use std::collections::HashSet;

#[tokio::test]
async fn search_keeps_service_order_and_drops_unknown_ids() {
    let env = env();
    let base = env.corpus("physics");
    let corpus = env.child_corpus("quantum", &base);
    let root = env.fact(&base, "matter has wave properties");
    let entangled = env
        .api
        .create_fact(
            &env.actor,
            NewFact::new(corpus.id)
                .with_statement("entangled particles share state")
                .with_basis(root.id),
        )
        .unwrap();
    let tunnelling = env.fact(&corpus, "particles tunnel through barriers");
    env.api
        .link(&env.actor, &entangled.id, &tunnelling.id)
        .unwrap();

    env.transport.push_reply(
        "/search",
        search_reply(&[
            (tunnelling.id.to_string(), 0.2, "particles tunnel through barriers"),
            (FactId::new().to_string(), 0.3, "deleted long ago"),
            ("not-a-uuid".to_string(), 0.4, "garbage"),
            (entangled.id.to_string(), 0.8, "entangled particles share state"),
        ]),
    );

    let hits = env
        .api
        .search(&env.actor, &env.project, "quantum", 10, None)
        .await
        .unwrap();

    let ids: Vec<_> = hits.iter().map(|h| h.record.fact.id).collect();
    assert_eq!(ids, vec![tunnelling.id, entangled.id]);
    assert_eq!(hits[0].score, 90.0);
    assert_eq!(hits[1].score, 60.0);
    assert_eq!(hits[0].matched_text, "particles tunnel through barriers");
    assert_eq!(hits[0].record.linked, vec![entangled.id]);
    assert_eq!(hits[1].record.basis.as_ref().map(|b| b.id), Some(root.id));

    // The filter defaults to every corpus of the project
    let calls = env.transport.calls();
    let body = calls.last().unwrap().body.as_ref().unwrap();
    assert_eq!(body["query"], "quantum");
    assert_eq!(body["limit"], 10);
    let sent: HashSet<String> = body["context_ids"]
        .as_array()
        .unwrap()
        .iter()
        .map(|v| v.as_str().unwrap().to_string())
        .collect();
    let expected: HashSet<String> = [base.id.to_string(), corpus.id.to_string()].into();
    assert_eq!(sent, expected);
}

#[tokio::test]
async fn service_errors_degrade_to_empty_results() {
    let env = env();
    let corpus = env.corpus("notes");
    env.fact(&corpus, "something");
    env.transport
        .set_default("/search", MockReply::Status(400, "bad query".into()));

    let hits = env
        .api
        .search(&env.actor, &env.project, "anything", 5, None)
        .await
        .unwrap();
    assert!(hits.is_empty());
    assert_eq!(env.transport.call_count("/search"), 1);
}

#[tokio::test]
async fn blank_query_and_zero_limit_skip_the_service() {
    let env = env();
    env.corpus("notes");

    let blank = env
        .api
        .search(&env.actor, &env.project, "   ", 5, None)
        .await
        .unwrap();
    let zero = env
        .api
        .search(&env.actor, &env.project, "quantum", 0, None)
        .await
        .unwrap();

    assert!(blank.is_empty());
    assert!(zero.is_empty());
    assert_eq!(env.transport.call_count("/search"), 0);
}

#[tokio::test]
async fn limit_is_capped_at_service_maximum() {
    let env = env();
    env.corpus("notes");
    env.transport.push_reply("/search", search_reply(&[]));

    env.api
        .search(&env.actor, &env.project, "quantum", 5000, None)
        .await
        .unwrap();

    let calls = env.transport.calls();
    assert_eq!(calls.last().unwrap().body.as_ref().unwrap()["limit"], 100);
}

#[tokio::test]
async fn corpora_from_other_projects_are_rejected() {
    let env = env();
    env.corpus("mine");
    let theirs = env
        .api
        .create_corpus(&env.actor, ProjectId::new(), "theirs", None)
        .unwrap();

    let err = env
        .api
        .search(&env.actor, &env.project, "quantum", 5, Some(vec![theirs.id]))
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::ForeignCorpus { corpus_id, .. } if corpus_id == theirs.id));
    assert_eq!(env.transport.call_count("/search"), 0);
}

#[tokio::test]
async fn find_similar_excludes_the_source_fact() {
    let env = env();
    let corpus = env.corpus("notes");
    let source = env.fact(&corpus, "cats are mammals");
    let near = env.fact(&corpus, "dogs are mammals");
    let far = env.fact(&corpus, "snakes are reptiles");

    env.transport.push_reply(
        "/search",
        search_reply(&[
            (source.id.to_string(), 0.0, "cats are mammals"),
            (near.id.to_string(), 0.1, "dogs are mammals"),
            (far.id.to_string(), 0.9, "snakes are reptiles"),
        ]),
    );

    let hits = env
        .api
        .find_similar(&env.actor, &source.id, 1, true)
        .await
        .unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].record.fact.id, near.id);

    let calls = env.transport.calls();
    let body = calls.last().unwrap().body.as_ref().unwrap();
    assert_eq!(body["query"], "cats are mammals");
    assert_eq!(body["limit"], 2);
    assert_eq!(body["context_ids"][0], corpus.id.to_string());
}

#[tokio::test]
async fn find_similar_without_statement_is_empty() {
    let env = env();
    let corpus = env.corpus("notes");
    let blank = env
        .api
        .create_fact(&env.actor, NewFact::new(corpus.id))
        .unwrap();

    let hits = env
        .api
        .find_similar(&env.actor, &blank.id, 5, false)
        .await
        .unwrap();
    assert!(hits.is_empty());
    assert_eq!(env.transport.call_count("/search"), 0);
}

#[tokio::test]
async fn find_similar_searches_only_the_project_corpora() {
    let env = env();
    let mine = env.corpus("mine");
    let other = env.corpus("other");
    let source = env.fact(&mine, "cats are mammals");
    let near = env.fact(&other, "lions are mammals");

    let theirs = env
        .api
        .create_corpus(&env.actor, ProjectId::new(), "theirs", None)
        .unwrap();
    let foreign = env.fact(&theirs, "tigers are mammals");

    // Foreign facts would outrank everything if the index were searched whole
    env.transport.push_reply(
        "/search",
        search_reply(&[
            (source.id.to_string(), 0.0, "cats are mammals"),
            (near.id.to_string(), 0.3, "lions are mammals"),
        ]),
    );

    let hits = env
        .api
        .find_similar(&env.actor, &source.id, 2, false)
        .await
        .unwrap();
    let ids: Vec<_> = hits.iter().map(|h| h.record.fact.id).collect();
    assert_eq!(ids, vec![near.id]);

    let calls = env.transport.calls();
    let body = calls.last().unwrap().body.as_ref().unwrap();
    let sent: HashSet<String> = body["context_ids"]
        .as_array()
        .unwrap()
        .iter()
        .map(|v| v.as_str().unwrap().to_string())
        .collect();
    let expected: HashSet<String> = [mine.id.to_string(), other.id.to_string()].into();
    assert_eq!(sent, expected);
    assert!(!sent.contains(&foreign.corpus_id.to_string()));
}

#[tokio::test]
async fn find_similar_leaves_room_for_the_source_at_the_limit_cap() {
    let env = env();
    let corpus = env.corpus("notes");
    let source = env.fact(&corpus, "cats are mammals");
    env.transport.push_reply("/search", search_reply(&[]));

    env.api
        .find_similar(&env.actor, &source.id, 500, true)
        .await
        .unwrap();

    let calls = env.transport.calls();
    assert_eq!(calls.last().unwrap().body.as_ref().unwrap()["limit"], 100);
}
