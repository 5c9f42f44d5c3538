//! Semantic search over facts through the RAG index

use crate::graph::{CorpusId, FactGraph, FactId, FactRecord};
use crate::rag::RagClient;
use serde::Serialize;

/// Largest result count the service accepts per query
pub const MAX_SEARCH_LIMIT: usize = 100;

/// A hydrated search hit
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredFact {
    pub record: FactRecord,
    /// Similarity percentage in [0, 100]; higher is closer
    pub score: f64,
    /// Text the service matched on
    pub matched_text: String,
}

/// Map a cosine distance in [0, 2] to a similarity percentage.
///
/// Out-of-range distances are clamped; NaN counts as maximally distant.
pub fn normalize_score(distance: f64) -> f64 {
    let d = if distance.is_nan() {
        2.0
    } else {
        distance.clamp(0.0, 2.0)
    };
    let score = (1.0 - d / 2.0) * 100.0;
    (score * 100.0).round() / 100.0
}

/// Search façade: queries the index and hydrates hits from the fact store.
///
/// Search never fails. Service errors and store errors degrade to an
/// empty result and are logged.
#[derive(Clone)]
pub struct SemanticSearch {
    graph: FactGraph,
    client: RagClient,
}

impl SemanticSearch {
    pub fn new(graph: FactGraph, client: RagClient) -> Self {
        Self { graph, client }
    }

    /// Facts closest to `query`, in service order
    pub async fn search_by_text(
        &self,
        query: &str,
        limit: usize,
        corpus_filter: Option<&[CorpusId]>,
    ) -> Vec<ScoredFact> {
        let query = query.trim();
        if query.is_empty() || limit == 0 || !self.client.is_enabled() {
            return Vec::new();
        }
        let limit = limit.min(MAX_SEARCH_LIMIT);

        let response = match self.client.search(query, limit, corpus_filter).await {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(kind = %e.kind(), error = %e, "semantic search failed");
                return Vec::new();
            }
        };

        let hits: Vec<(FactId, f64, String)> = response
            .results
            .into_iter()
            .filter_map(|hit| match hit.fact_id.parse::<FactId>() {
                Ok(id) => Some((id, hit.score, hit.statement)),
                Err(_) => {
                    tracing::debug!(fact_id = %hit.fact_id, "ignoring search hit with malformed id");
                    None
                }
            })
            .collect();

        let ids: Vec<FactId> = hits.iter().map(|(id, _, _)| *id).collect();
        let mut records = match self.graph.load_records(&ids) {
            Ok(records) => records,
            Err(e) => {
                tracing::warn!(error = %e, "failed to hydrate search results");
                return Vec::new();
            }
        };

        let results: Vec<ScoredFact> = hits
            .into_iter()
            .filter_map(|(id, distance, matched_text)| {
                records.remove(&id).map(|record| ScoredFact {
                    record,
                    score: normalize_score(distance),
                    matched_text,
                })
            })
            .collect();

        if results.len() < ids.len() {
            tracing::debug!(
                dropped = ids.len() - results.len(),
                "search hits without a local fact"
            );
        }
        results
    }

    /// Facts similar to an existing fact, never including the fact itself.
    ///
    /// Searches the fact's own corpus when `same_corpus_only` is set,
    /// otherwise `within` (or the whole index when `None`). At most
    /// `MAX_SEARCH_LIMIT - 1` results are returned, since the source fact
    /// takes one slot of the query.
    pub async fn find_similar(
        &self,
        fact_id: &FactId,
        limit: usize,
        same_corpus_only: bool,
        within: Option<&[CorpusId]>,
    ) -> Vec<ScoredFact> {
        if limit == 0 {
            return Vec::new();
        }
        let limit = limit.min(MAX_SEARCH_LIMIT - 1);
        let source = match self.graph.get_fact(fact_id) {
            Ok(fact) => fact,
            Err(e) => {
                tracing::debug!(fact_id = %fact_id, error = %e, "similarity source unavailable");
                return Vec::new();
            }
        };
        let Some(statement) = source.statement_text() else {
            return Vec::new();
        };

        let own_corpus = [source.corpus_id];
        let filter = if same_corpus_only {
            Some(&own_corpus[..])
        } else {
            within
        };

        let mut results = self.search_by_text(statement, limit + 1, filter).await;
        results.retain(|hit| hit.record.fact.id != *fact_id);
        results.truncate(limit);
        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_endpoints_and_midpoint() {
        assert_eq!(normalize_score(0.0), 100.0);
        assert_eq!(normalize_score(1.0), 50.0);
        assert_eq!(normalize_score(2.0), 0.0);
    }

    #[test]
    fn normalize_clamps_and_handles_nan() {
        assert_eq!(normalize_score(-0.5), 100.0);
        assert_eq!(normalize_score(7.0), 0.0);
        assert_eq!(normalize_score(f64::NAN), 0.0);
        assert_eq!(normalize_score(f64::INFINITY), 0.0);
    }

    #[test]
    fn normalize_rounds_to_two_decimals() {
        assert_eq!(normalize_score(0.1234), 93.83);
    }

    #[test]
    fn normalize_is_monotonic_and_bounded() {
        let mut previous = f64::INFINITY;
        for step in 0..=400 {
            let d = -1.0 + step as f64 * 0.01;
            let score = normalize_score(d);
            assert!((0.0..=100.0).contains(&score));
            assert!(score <= previous);
            previous = score;
        }
    }
}
