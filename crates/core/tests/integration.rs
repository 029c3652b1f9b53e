//! End-to-end routing tests for the help desk, without a database:
//! question → local sources → web fallback → degraded answer → escalation.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use deskloop_core::config::DeskCfg;
use deskloop_core::escalation::{MockTicketing, RemoteTicket, StaticDirectory, Ticketing, TicketingError};
use deskloop_core::retrieval::SourceAdapter;
use deskloop_core::routing::classify;
use deskloop_core::store::{MemoryStore, SupportStore};
use deskloop_core::types::{Candidate, Category, Outcome, Priority, SourceKind, Ticket, TicketStatus, Tier};
use deskloop_core::{DeskReply, HelpDesk};
use deskloop_llm::embedding::MockEmbedder;
use deskloop_llm::provider::MockProvider;

/// Returns the same scores for every question.
struct Stub {
    kind: SourceKind,
    scores: Vec<f64>,
}

#[async_trait]
impl SourceAdapter for Stub {
    fn name(&self) -> &str {
        "stub"
    }

    fn kind(&self) -> SourceKind {
        self.kind
    }

    async fn search(&self, _question_text: &str, limit: usize) -> Vec<Candidate> {
        self.scores
            .iter()
            .take(limit)
            .enumerate()
            .map(|(i, s)| {
                Candidate::new(self.kind, i.to_string(), format!("{} {i}", self.kind.as_str()), "contenu", *s, serde_json::json!({}))
            })
            .collect()
    }
}

fn stub(kind: SourceKind, scores: &[f64]) -> Arc<dyn SourceAdapter> {
    Arc::new(Stub { kind, scores: scores.to_vec() })
}

fn embedder() -> Arc<MockEmbedder> {
    Arc::new(MockEmbedder::with_vocabulary(&["vpn", "routeur", "imprimante", "outlook"]))
}

async fn ask_with(local: &[f64], web: &[f64]) -> DeskReply {
    let store = Arc::new(MemoryStore::new());
    let desk = HelpDesk::builder(store, embedder())
        .local_adapter(stub(SourceKind::Faq, local))
        .web(stub(SourceKind::Web, web))
        .build()
        .unwrap();
    desk.ask("jdoe", "question quelconque").await.unwrap()
}

#[tokio::test]
async fn vpn_question_with_empty_sources_is_escalated() {
    let store = Arc::new(MemoryStore::new());
    let ticketing = Arc::new(MockTicketing::new());
    let desk = HelpDesk::builder(store.clone(), embedder())
        .ticketing(ticketing.clone())
        .directory(Arc::new(StaticDirectory::new().with_entry("jdoe", "Jane Doe", None)))
        .build()
        .unwrap();

    let reply = desk.ask("jdoe", "Je ne peux pas me connecter au VPN").await.unwrap();

    assert_eq!(reply.decision.outcome, Outcome::Escalated);
    assert_eq!(reply.decision.category, Category::Reseau);
    assert_eq!(reply.decision.priority, Priority::Moyenne);
    assert!(reply.answer.is_none());

    let receipt = reply.escalation.expect("escalated reply carries a receipt");
    assert!(receipt.mirrored);
    assert_eq!(receipt.ticket.category, Category::Reseau);
    assert_eq!(receipt.ticket.priority, Priority::Moyenne);
    assert_eq!(receipt.ticket.status, TicketStatus::New);
    assert_eq!(receipt.ticket.requester.as_deref(), Some("Jane Doe"));
    assert_eq!(ticketing.created_count(), 1);
    assert_eq!(store.list_tickets().await.unwrap().len(), 1);
}

#[tokio::test]
async fn best_score_exactly_at_threshold_is_answered_locally() {
    let reply = ask_with(&[0.6], &[0.0]).await;
    assert_eq!(reply.decision.outcome, Outcome::Answered);
    assert_eq!(reply.decision.winning_tier, Some(Tier::Local));
    assert!(reply.answer_id.is_some());
}

#[tokio::test]
async fn best_score_just_below_threshold_goes_to_web() {
    let reply = ask_with(&[0.599999], &[0.0, 0.0]).await;
    assert_eq!(reply.decision.winning_tier, Some(Tier::Web));
    assert_eq!(reply.decision.winning_candidates.len(), 2);
    assert!(reply.decision.winning_candidates.iter().all(|c| c.source_kind == SourceKind::Web));
}

#[tokio::test]
async fn below_threshold_and_no_web_gives_low_confidence_answer() {
    let reply = ask_with(&[0.599999, 0.1], &[]).await;
    assert_eq!(reply.decision.outcome, Outcome::Answered);
    assert_eq!(reply.decision.winning_tier, Some(Tier::LocalLowConfidence));
    assert_eq!(reply.decision.winning_candidates[0].score, 0.599999);
    assert!(reply.escalation.is_none());
}

#[tokio::test]
async fn no_candidates_anywhere_is_escalated() {
    let reply = ask_with(&[], &[]).await;
    assert_eq!(reply.decision.outcome, Outcome::Escalated);
    assert_eq!(reply.decision.winning_tier, None);
    assert!(reply.decision.winning_candidates.is_empty());
    assert!(reply.escalation.is_some());
}

#[tokio::test]
async fn local_answer_keeps_top_k_candidates() {
    let store = Arc::new(MemoryStore::new());
    let cfg = DeskCfg { top_k: 2, ..DeskCfg::default() };
    let desk = HelpDesk::builder(store, embedder())
        .config(cfg)
        .local_adapter(stub(SourceKind::KbArticle, &[0.9, 0.8]))
        .local_adapter(stub(SourceKind::Faq, &[0.95]))
        .build()
        .unwrap();
    let reply = desk.ask("jdoe", "q").await.unwrap();
    let scores: Vec<f64> = reply.decision.winning_candidates.iter().map(|c| c.score).collect();
    assert_eq!(scores, [0.95, 0.9]);
}

#[tokio::test]
async fn unavailable_corpus_embedding_does_not_break_routing() {
    let store = Arc::new(MemoryStore::new());
    let desk = HelpDesk::builder(store, Arc::new(MockEmbedder::unavailable()))
        .local_adapter(stub(SourceKind::Faq, &[0.7]))
        .build()
        .unwrap();
    let reply = desk.ask("jdoe", "q").await.unwrap();
    assert_eq!(reply.decision.winning_tier, Some(Tier::Local));
}

#[tokio::test]
async fn seeded_catalog_answers_printer_question() {
    let store = Arc::new(MemoryStore::new());
    let desk = HelpDesk::builder(store, embedder()).catalog().build().unwrap();
    let reply = desk.ask("jdoe", "imprimante").await.unwrap();
    assert_eq!(reply.decision.winning_tier, Some(Tier::Local));
    assert_eq!(reply.decision.winning_candidates[0].score, 1.0);
}

#[tokio::test]
async fn generated_answer_exposes_category_tag() {
    let store = Arc::new(MemoryStore::new());
    let desk = HelpDesk::builder(store, embedder())
        .local_adapter(stub(SourceKind::Faq, &[0.9]))
        .generation(Arc::new(MockProvider::new("Utilisez AnyConnect. [Catégorie: Réseau]")))
        .build()
        .unwrap();
    let answer = desk.ask("jdoe", "vpn ?").await.unwrap().answer.unwrap();
    assert_eq!(answer.text, "Utilisez AnyConnect.");
    assert_eq!(answer.category_tag, Some(Category::Reseau));
}

#[tokio::test]
async fn repeated_escalation_reuses_open_ticket() {
    let store = Arc::new(MemoryStore::new());
    let desk = HelpDesk::builder(store.clone(), embedder()).build().unwrap();

    let first = desk.ask("jdoe", "Le scanner du 2e étage est HS").await.unwrap();
    let second = desk.ask("jdoe", "le scanner du 2e  étage est HS").await.unwrap();
    let other = desk.ask("asmith", "Le scanner du 2e étage est HS").await.unwrap();

    let (first, second, other) = (first.escalation.unwrap(), second.escalation.unwrap(), other.escalation.unwrap());
    assert!(!first.reused);
    assert!(second.reused);
    assert_eq!(first.ticket.id, second.ticket.id);
    assert_ne!(first.ticket.id, other.ticket.id);
    assert_eq!(store.list_tickets().await.unwrap().len(), 2);
}

/// Ticketing that answers after a pause, so two escalations overlap.
struct SlowTicketing(MockTicketing);

#[async_trait]
impl Ticketing for SlowTicketing {
    fn name(&self) -> &str {
        "slow"
    }

    async fn create_remote_ticket(&self, ticket: &Ticket) -> Result<String, TicketingError> {
        tokio::time::sleep(Duration::from_millis(50)).await;
        self.0.create_remote_ticket(ticket).await
    }

    async fn fetch_remote_ticket(&self, external_id: &str) -> Result<RemoteTicket, TicketingError> {
        self.0.fetch_remote_ticket(external_id).await
    }

    async fn list_followups(&self, external_id: &str) -> Result<Vec<String>, TicketingError> {
        self.0.list_followups(external_id).await
    }
}

#[tokio::test]
async fn simultaneous_identical_questions_open_one_remote_ticket() {
    let store = Arc::new(MemoryStore::new());
    let ticketing = Arc::new(SlowTicketing(MockTicketing::new()));
    let desk = HelpDesk::builder(store.clone(), embedder()).ticketing(ticketing.clone()).build().unwrap();

    let (a, b) = tokio::join!(desk.ask("jdoe", "Le fax ne marche pas"), desk.ask("jdoe", "Le fax ne marche pas"));
    let (a, b) = (a.unwrap().escalation.unwrap(), b.unwrap().escalation.unwrap());

    assert_eq!(a.ticket.id, b.ticket.id);
    assert!(a.reused != b.reused);
    assert_eq!(store.list_tickets().await.unwrap().len(), 1);
    assert_eq!(ticketing.0.created_count(), 1);
    assert!(store.list_tickets().await.unwrap()[0].external_id.is_some());
}

#[tokio::test]
async fn answer_feedback_round_trip() {
    let store = Arc::new(MemoryStore::new());
    let desk = HelpDesk::builder(store, embedder())
        .local_adapter(stub(SourceKind::Faq, &[0.9]))
        .build()
        .unwrap();
    let id = desk.ask("jdoe", "q").await.unwrap().answer_id.unwrap();
    let record = desk.submit_feedback(id, true).await.unwrap();
    assert_eq!((record.validity, record.resolution_count), (1, 1));
}

#[test]
fn classification_is_idempotent() {
    let first = classify("VPN connection timeout");
    assert_eq!(first.0, Category::Reseau);
    for _ in 0..10 {
        assert_eq!(classify("VPN connection timeout"), first);
    }
}
