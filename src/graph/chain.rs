//! Basis chain resolution

use super::fact::{FactId, FactSummary};
use crate::storage::{FactStore, StorageResult};
use std::collections::HashSet;

/// Maximum number of basis hops followed from a single fact
pub const MAX_CHAIN_DEPTH: usize = 50;

/// Walk basis pointers upward from `start`.
///
/// Returns ancestors ordered root first, immediate basis last. The starting
/// fact itself is excluded. Traversal stops silently on a missing fact, a
/// revisited fact, or after `MAX_CHAIN_DEPTH` hops.
pub(crate) fn resolve_chain(
    store: &dyn FactStore,
    start: &FactSummary,
) -> StorageResult<Vec<FactSummary>> {
    let mut visited: HashSet<FactId> = HashSet::from([start.id]);
    let mut chain = Vec::new();
    let mut next = start.basis_id;

    while let Some(id) = next {
        if chain.len() >= MAX_CHAIN_DEPTH {
            tracing::debug!(fact_id = %start.id, "basis chain truncated at depth limit");
            break;
        }
        if !visited.insert(id) {
            tracing::warn!(fact_id = %start.id, cycle_at = %id, "basis cycle detected");
            break;
        }
        let Some(summary) = store.load_summary(&id)? else {
            break;
        };
        next = summary.basis_id;
        chain.push(summary);
    }

    chain.reverse();
    Ok(chain)
}
