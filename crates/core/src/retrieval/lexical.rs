//! Keyword scoring over static documents (knowledge base, FAQ, historical tickets).

use async_trait::async_trait;

use super::{SourceAdapter, rank};
use crate::types::{Candidate, SourceKind};

/// Score a question against a document's searchable text.
///
/// 1.0 when the whole question (case-insensitive) occurs in the text.
/// Otherwise the share of question words that are longer than two
/// characters and occur in the text, over the question's total word count.
pub fn lexical_score(question: &str, text: &str) -> f64 {
    let query = question.trim().to_lowercase();
    if query.is_empty() {
        return 0.0;
    }
    let haystack = text.to_lowercase();
    if haystack.contains(&query) {
        return 1.0;
    }

    let words: Vec<&str> = query.split_whitespace().collect();
    if words.is_empty() {
        return 0.0;
    }
    let matches = words
        .iter()
        .filter(|w| w.chars().count() > 2 && haystack.contains(*w))
        .count();
    matches as f64 / words.len() as f64
}

/// One searchable document.
#[derive(Debug, Clone)]
pub struct LexicalDoc {
    pub id: String,
    pub title: String,
    /// Rendered content returned to the caller.
    pub content: String,
    /// Text the score is computed over.
    pub searchable: String,
    pub metadata: serde_json::Value,
}

/// Adapter over an ordered, in-memory document list.
#[derive(Debug)]
pub struct LexicalAdapter {
    name: String,
    kind: SourceKind,
    docs: Vec<LexicalDoc>,
}

impl LexicalAdapter {
    pub fn new(name: impl Into<String>, kind: SourceKind, docs: Vec<LexicalDoc>) -> Self {
        Self { name: name.into(), kind, docs }
    }

    pub fn len(&self) -> usize {
        self.docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }

    pub fn docs(&self) -> &[LexicalDoc] {
        &self.docs
    }

    fn score_all(&self, question_text: &str) -> Vec<Candidate> {
        self.docs
            .iter()
            .filter_map(|doc| {
                let score = lexical_score(question_text, &doc.searchable);
                (score > 0.0).then(|| {
                    Candidate::new(
                        self.kind,
                        doc.id.clone(),
                        doc.title.clone(),
                        doc.content.clone(),
                        score,
                        doc.metadata.clone(),
                    )
                })
            })
            .collect()
    }
}

#[async_trait]
impl SourceAdapter for LexicalAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> SourceKind {
        self.kind
    }

    async fn search(&self, question_text: &str, limit: usize) -> Vec<Candidate> {
        if question_text.trim().is_empty() {
            return Vec::new();
        }
        rank(self.score_all(question_text), limit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(id: &str, text: &str) -> LexicalDoc {
        LexicalDoc {
            id: id.into(),
            title: id.into(),
            content: text.into(),
            searchable: text.into(),
            metadata: serde_json::json!({}),
        }
    }

    #[test]
    fn full_question_substring_scores_one() {
        assert_eq!(lexical_score("Imprimante", "L'IMPRIMANTE du bureau 304"), 1.0);
    }

    #[test]
    fn partial_match_counts_long_words_over_all_words() {
        // "vpn" and "bloqué" match; "le" is too short; "depuis" absent → 2 / 4.
        let score = lexical_score("le vpn bloqué depuis", "client VPN bloqué");
        assert_eq!(score, 0.5);
    }

    #[test]
    fn short_words_never_count_but_still_divide() {
        // Only "au" would match but it is two characters long.
        assert_eq!(lexical_score("au xyz", "au revoir"), 0.0);
    }

    #[test]
    fn empty_question_scores_zero() {
        assert_eq!(lexical_score("   ", "anything"), 0.0);
    }

    #[test]
    fn three_of_five_is_exactly_point_six() {
        let score = lexical_score("vpn wifi dns zzz yyy", "vpn wifi dns");
        assert_eq!(score, 0.6);
    }

    #[tokio::test]
    async fn search_sorts_and_keeps_insertion_order_on_ties() {
        let adapter = LexicalAdapter::new(
            "kb",
            SourceKind::KbArticle,
            vec![
                doc("1", "outlook lent"),
                doc("2", "vpn outlook lent"),
                doc("3", "outlook lent aussi"),
                doc("4", "rien à voir"),
            ],
        );
        let results = adapter.search("vpn outlook lent", 10).await;
        let ids: Vec<_> = results.iter().map(|c| c.source_id.as_str()).collect();
        assert_eq!(ids, ["2", "1", "3"]);
        assert_eq!(results[0].score, 1.0);
    }

    #[tokio::test]
    async fn whitespace_question_returns_empty() {
        let adapter = LexicalAdapter::new("kb", SourceKind::KbArticle, vec![doc("1", "vpn")]);
        assert!(adapter.search(" \t ", 4).await.is_empty());
    }

    #[tokio::test]
    async fn search_respects_limit() {
        let adapter = LexicalAdapter::new(
            "faq",
            SourceKind::Faq,
            vec![doc("1", "vpn"), doc("2", "vpn"), doc("3", "vpn")],
        );
        assert_eq!(adapter.search("vpn", 2).await.len(), 2);
    }
}
