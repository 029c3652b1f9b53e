//! Semantic search over the validated corpus.

use std::sync::Arc;

use async_trait::async_trait;
use deskloop_llm::embedding::Embedder;
use serde_json::json;

use super::{AdapterError, SourceAdapter, absorb, rank};
use crate::store::SupportStore;
use crate::types::{Candidate, CorpusEntry, SourceKind};

/// Cosine similarity, clamped to [0, 1]. Zero vectors and mismatched
/// dimensions score 0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let (mut dot, mut na, mut nb) = (0.0_f64, 0.0_f64, 0.0_f64);
    for (x, y) in a.iter().zip(b) {
        let (x, y) = (*x as f64, *y as f64);
        dot += x * y;
        na += x * x;
        nb += y * y;
    }
    if na == 0.0 || nb == 0.0 {
        return 0.0;
    }
    (dot / (na.sqrt() * nb.sqrt())).clamp(0.0, 1.0)
}

/// Best similarity between the question and any stored view of the entry.
/// `None` when no view has the question's dimension.
pub fn entry_score(query: &[f32], entry: &CorpusEntry) -> Option<f64> {
    entry
        .embeddings()
        .filter(|v| v.len() == query.len())
        .map(|v| cosine_similarity(query, v))
        .reduce(f64::max)
}

pub struct CorpusAdapter {
    store: Arc<dyn SupportStore>,
    embedder: Arc<dyn Embedder>,
}

impl CorpusAdapter {
    pub fn new(store: Arc<dyn SupportStore>, embedder: Arc<dyn Embedder>) -> Self {
        Self { store, embedder }
    }

    async fn try_search(&self, question_text: &str, limit: usize) -> Result<Vec<Candidate>, AdapterError> {
        let query = self
            .embedder
            .embed(question_text)
            .await
            .map_err(|e| AdapterError::Unavailable(format!("embedding: {e}")))?;
        let entries = self
            .store
            .validated_corpus()
            .await
            .map_err(|e| AdapterError::Unavailable(format!("corpus: {e}")))?;

        let mut candidates = Vec::new();
        for entry in entries.iter().filter(|e| e.validated) {
            let Some(score) = entry_score(&query, entry) else {
                tracing::debug!(entry = %entry.id, "embedding dimension mismatch, skipping entry");
                continue;
            };
            if score <= 0.0 {
                continue;
            }
            candidates.push(Candidate::new(
                SourceKind::CorpusEntry,
                entry.id.to_string(),
                entry.question_text.clone(),
                entry.answer_text.clone(),
                score,
                json!({
                    "created_from": entry.created_from.as_db_str(),
                    "ticket_id": entry.ticket_id,
                    "question_id": entry.question_id,
                }),
            ));
        }
        Ok(rank(candidates, limit))
    }
}

#[async_trait]
impl SourceAdapter for CorpusAdapter {
    fn name(&self) -> &str {
        "corpus"
    }

    fn kind(&self) -> SourceKind {
        SourceKind::CorpusEntry
    }

    async fn search(&self, question_text: &str, limit: usize) -> Vec<Candidate> {
        if question_text.trim().is_empty() {
            return Vec::new();
        }
        absorb(self.name(), self.try_search(question_text, limit).await)
    }
}
