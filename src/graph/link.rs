//! Undirected link edges between facts

use super::fact::FactId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An unordered pair of linked facts.
///
/// The pair is stored canonically (smaller id first), so `(a, b)` and
/// `(b, a)` are the same link.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FactLink {
    low: FactId,
    high: FactId,
    pub created_at: DateTime<Utc>,
}

impl FactLink {
    pub fn new(a: FactId, b: FactId) -> Self {
        let (low, high) = Self::canonical(a, b);
        Self {
            low,
            high,
            created_at: Utc::now(),
        }
    }

    pub(crate) fn from_parts(low: FactId, high: FactId, created_at: DateTime<Utc>) -> Self {
        let (low, high) = Self::canonical(low, high);
        Self {
            low,
            high,
            created_at,
        }
    }

    /// Order a pair of ids the way links are stored
    pub fn canonical(a: FactId, b: FactId) -> (FactId, FactId) {
        if a <= b {
            (a, b)
        } else {
            (b, a)
        }
    }

    pub fn ids(&self) -> (FactId, FactId) {
        (self.low, self.high)
    }

    /// The id on the other end of the link, if `id` is one of its ends
    pub fn other(&self, id: &FactId) -> Option<FactId> {
        if &self.low == id {
            Some(self.high)
        } else if &self.high == id {
            Some(self.low)
        } else {
            None
        }
    }
}
