//! Source adapters: one uniform `search` over heterogeneous backends.
//!
//! An adapter never fails outward. Backend errors are logged and turned into
//! an empty list so one misbehaving source cannot abort a routing decision.

pub mod catalog;
pub mod corpus;
pub mod lexical;
pub mod web;

use async_trait::async_trait;

use crate::types::{Candidate, SourceKind};

/// A backend failed. Never crosses the adapter boundary.
#[derive(Debug, thiserror::Error)]
pub enum AdapterError {
    #[error("source unavailable: {0}")]
    Unavailable(String),
    #[error("source not configured")]
    NotConfigured,
}

#[async_trait]
pub trait SourceAdapter: Send + Sync {
    fn name(&self) -> &str;

    fn kind(&self) -> SourceKind;

    /// Candidates sorted by descending score, ties in the adapter's insertion
    /// order. Empty or whitespace-only text yields an empty list.
    async fn search(&self, question_text: &str, limit: usize) -> Vec<Candidate>;
}

/// Turn a backend result into the adapter's infallible output.
pub(crate) fn absorb(adapter: &str, result: Result<Vec<Candidate>, AdapterError>) -> Vec<Candidate> {
    match result {
        Ok(candidates) => candidates,
        Err(AdapterError::NotConfigured) => {
            tracing::debug!(adapter, "source not configured, skipping");
            Vec::new()
        }
        Err(e) => {
            tracing::warn!(adapter, error = %e, "source adapter failed, returning no candidates");
            Vec::new()
        }
    }
}

/// Stable sort by descending score, then cut to `limit` (at least 1).
pub(crate) fn rank(mut candidates: Vec<Candidate>, limit: usize) -> Vec<Candidate> {
    candidates.sort_by(|a, b| b.score.total_cmp(&a.score));
    candidates.truncate(limit.max(1));
    candidates
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cand(id: &str, score: f64) -> Candidate {
        Candidate::new(SourceKind::Faq, id, id, "", score, serde_json::Value::Null)
    }

    #[test]
    fn rank_keeps_insertion_order_on_ties() {
        let ranked = rank(vec![cand("a", 0.5), cand("b", 0.9), cand("c", 0.5)], 10);
        let ids: Vec<_> = ranked.iter().map(|c| c.source_id.as_str()).collect();
        assert_eq!(ids, ["b", "a", "c"]);
    }

    #[test]
    fn rank_truncates_to_at_least_one() {
        assert_eq!(rank(vec![cand("a", 0.1), cand("b", 0.2)], 0).len(), 1);
        assert_eq!(rank(vec![cand("a", 0.1), cand("b", 0.2)], 1)[0].source_id, "b");
    }

    #[test]
    fn absorb_turns_errors_into_empty() {
        assert!(absorb("x", Err(AdapterError::Unavailable("down".into()))).is_empty());
        assert!(absorb("x", Err(AdapterError::NotConfigured)).is_empty());
        assert_eq!(absorb("x", Ok(vec![cand("a", 1.0)])).len(), 1);
    }
}
