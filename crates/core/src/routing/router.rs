//! Confidence-gated routing across tiers: local sources, then web search,
//! then a degraded local answer, then escalation.

use std::cmp::Ordering;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;

use super::classifier::classify;
use crate::config::DeskCfg;
use crate::retrieval::SourceAdapter;
use crate::types::{Candidate, Outcome, Question, RoutingDecision, SourceKind, Tier};

/// One candidate plus where it came from, for the merge tie-break.
struct Ranked {
    candidate: Candidate,
    adapter: usize,
    position: usize,
}

fn merge_order(a: &Ranked, b: &Ranked) -> Ordering {
    let corpus_first = |r: &Ranked| r.candidate.source_kind != SourceKind::CorpusEntry;
    b.candidate
        .score
        .total_cmp(&a.candidate.score)
        .then_with(|| corpus_first(a).cmp(&corpus_first(b)))
        .then_with(|| a.adapter.cmp(&b.adapter))
        .then_with(|| a.position.cmp(&b.position))
}

pub struct ConfidenceRouter {
    local: Vec<Arc<dyn SourceAdapter>>,
    web: Option<Arc<dyn SourceAdapter>>,
    threshold: f64,
    top_k: usize,
    adapter_timeout: Duration,
}

impl ConfidenceRouter {
    /// Local adapters are queried in registration order; that order breaks
    /// score ties between them.
    pub fn new(
        local: Vec<Arc<dyn SourceAdapter>>,
        web: Option<Arc<dyn SourceAdapter>>,
        cfg: &DeskCfg,
    ) -> Self {
        Self {
            local,
            web,
            threshold: cfg.confidence_threshold,
            top_k: cfg.top_k.max(1),
            adapter_timeout: cfg.adapter_timeout(),
        }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Query every local adapter concurrently and merge the results.
    /// Dropping the returned future aborts the outstanding searches.
    pub async fn search_local(&self, text: &str) -> Vec<Candidate> {
        let mut set = JoinSet::new();
        for (idx, adapter) in self.local.iter().enumerate() {
            let adapter = Arc::clone(adapter);
            let text = text.to_owned();
            let limit = self.top_k;
            let timeout = self.adapter_timeout;
            set.spawn(async move {
                let results = bounded_search(adapter.as_ref(), &text, limit, timeout).await;
                (idx, results)
            });
        }

        let mut merged = Vec::new();
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((adapter, results)) => {
                    merged.extend(results.into_iter().enumerate().map(|(position, candidate)| Ranked {
                        candidate,
                        adapter,
                        position,
                    }));
                }
                Err(e) => tracing::warn!(error = %e, "source adapter task failed"),
            }
        }
        merged.sort_by(merge_order);
        merged.into_iter().map(|r| r.candidate).collect()
    }

    pub async fn route(&self, question: &Question) -> RoutingDecision {
        let (category, priority) = classify(&question.text);
        let decide = |outcome, tier, candidates| RoutingDecision {
            outcome,
            winning_tier: tier,
            winning_candidates: candidates,
            category,
            priority,
        };

        let mut local = self.search_local(&question.text).await;
        let best = local.first().map(|c| c.score);
        if best.is_some_and(|b| b >= self.threshold) {
            local.truncate(self.top_k);
            tracing::debug!(question = %question.id, ?best, "answered from local sources");
            return decide(Outcome::Answered, Some(Tier::Local), local);
        }

        if let Some(web) = &self.web {
            let results = bounded_search(web.as_ref(), &question.text, self.top_k, self.adapter_timeout).await;
            if !results.is_empty() {
                tracing::debug!(question = %question.id, hits = results.len(), "answered from web search");
                return decide(Outcome::Answered, Some(Tier::Web), results);
            }
        }

        if !local.is_empty() {
            local.truncate(self.top_k);
            tracing::debug!(question = %question.id, ?best, "answered with low confidence");
            return decide(Outcome::Answered, Some(Tier::LocalLowConfidence), local);
        }

        decide(Outcome::Escalated, None, Vec::new())
    }
}

async fn bounded_search(
    adapter: &dyn SourceAdapter,
    text: &str,
    limit: usize,
    timeout: Duration,
) -> Vec<Candidate> {
    match tokio::time::timeout(timeout, adapter.search(text, limit)).await {
        Ok(results) => results,
        Err(_) => {
            tracing::warn!(adapter = adapter.name(), timeout_secs = timeout.as_secs(), "source adapter timed out");
            Vec::new()
        }
    }
}
