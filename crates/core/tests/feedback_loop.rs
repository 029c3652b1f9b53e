//! The learning loop end to end: escalate, resolve, and get answered from
//! the corpus next time.

use std::sync::Arc;

use deskloop_core::HelpDesk;
use deskloop_core::error::DeskError;
use deskloop_core::escalation::MockTicketing;
use deskloop_core::escalation::ticketing::REMOTE_SOLVED;
use deskloop_core::feedback::sync;
use deskloop_core::store::{MemoryStore, SupportStore};
use deskloop_core::types::{Outcome, ResolutionEvent, SourceKind, TicketStatus, Tier};
use deskloop_llm::embedding::{HashEmbedder, MockEmbedder};
use uuid::Uuid;

/// A handful of support terms, for tests that need exact control over which
/// questions match.
fn embedder() -> Arc<MockEmbedder> {
    Arc::new(MockEmbedder::with_vocabulary(&[
        "vpn",
        "routeur",
        "redémarrer",
        "imprimante",
        "outlook",
        "mot de passe",
    ]))
}

fn desk(store: Arc<MemoryStore>) -> HelpDesk {
    HelpDesk::builder(store, embedder()).build().unwrap()
}

/// Same local embedder the binary falls back to without an endpoint.
fn hashing_desk(store: Arc<MemoryStore>) -> HelpDesk {
    HelpDesk::builder(store, Arc::new(HashEmbedder)).build().unwrap()
}

#[tokio::test]
async fn resolved_router_ticket_answers_the_next_question() {
    let store = Arc::new(MemoryStore::new());
    let desk = hashing_desk(store.clone());

    let first = desk.ask("jdoe", "Le routeur du bureau ne répond plus").await.unwrap();
    assert_eq!(first.decision.outcome, Outcome::Escalated);
    let ticket = first.escalation.unwrap().ticket;

    let resolved = desk
        .record_resolution(ResolutionEvent::resolved(ticket.id, "Marc Leroy", "Il faut redémarrer le routeur"))
        .await
        .unwrap();
    assert_eq!(resolved.status, TicketStatus::Resolved);

    let next = desk.ask("asmith", "mon routeur ne fonctionne pas, comment redémarrer").await.unwrap();
    assert_eq!(next.decision.outcome, Outcome::Answered);
    assert_eq!(next.decision.winning_tier, Some(Tier::Local));
    let best = &next.decision.winning_candidates[0];
    assert_eq!(best.source_kind, SourceKind::CorpusEntry);
    assert!(best.score >= 0.6);
    assert_eq!(best.content, "Il faut redémarrer le routeur");
    assert!(next.escalation.is_none());
    assert_eq!(store.list_tickets().await.unwrap().len(), 1);
}

#[tokio::test]
async fn asking_the_original_description_again_hits_the_new_entry() {
    let store = Arc::new(MemoryStore::new());
    let desk = hashing_desk(store.clone());
    let text = "Outlook refuse de s'ouvrir ce matin";

    let ticket = desk.ask("jdoe", text).await.unwrap().escalation.unwrap().ticket;
    desk.record_resolution(ResolutionEvent::resolved(ticket.id, "Marc", "Réparer le profil Outlook"))
        .await
        .unwrap();

    let again = desk.ask("jdoe", &ticket.description).await.unwrap();
    assert_eq!(again.decision.winning_tier, Some(Tier::Local));
    let best = &again.decision.winning_candidates[0];
    assert_eq!(best.source_kind, SourceKind::CorpusEntry);
    assert!((best.score - 1.0).abs() < 1e-6);
    assert_eq!(best.metadata["ticket_id"], ticket.id.to_string());
    assert!(again.escalation.is_none());
}

#[tokio::test]
async fn solution_wording_alone_is_enough_to_match() {
    let store = Arc::new(MemoryStore::new());
    let desk = hashing_desk(store.clone());

    let ticket = desk.ask("jdoe", "Impossible d'ouvrir la session Windows").await.unwrap().escalation.unwrap().ticket;
    desk.record_resolution(ResolutionEvent::resolved(ticket.id, "Marc", "Déverrouiller le compte dans l'annuaire"))
        .await
        .unwrap();

    let next = desk.ask("asmith", "comment déverrouiller mon compte").await.unwrap();
    assert_eq!(next.decision.winning_tier, Some(Tier::Local));
    assert_eq!(next.decision.winning_candidates[0].content, "Déverrouiller le compte dans l'annuaire");
}

#[tokio::test]
async fn failed_embedding_fails_the_resolution_and_writes_nothing() {
    let store = Arc::new(MemoryStore::new());
    let desk = HelpDesk::builder(store.clone(), Arc::new(MockEmbedder::unavailable())).build().unwrap();

    let ticket = desk.ask("jdoe", "imprimante bloquée").await.unwrap().escalation.unwrap().ticket;
    let err = desk
        .record_resolution(ResolutionEvent::resolved(ticket.id, "Marc", "Vider la file d'impression"))
        .await
        .unwrap_err();

    assert!(matches!(err, DeskError::EmbeddingUnavailable(_)));
    let stored = store.ticket(ticket.id).await.unwrap().unwrap();
    assert_eq!(stored.status, TicketStatus::New);
    assert!(stored.solution.is_none());
    assert_eq!(store.corpus_len().await, 0);
}

#[tokio::test]
async fn resolution_for_unknown_ticket_is_not_found() {
    let desk = desk(Arc::new(MemoryStore::new()));
    let id = Uuid::new_v4();
    let err = desk.record_resolution(ResolutionEvent::resolved(id, "Marc", "x")).await.unwrap_err();
    assert!(matches!(err, DeskError::TicketNotFound(got) if got == id));
}

#[tokio::test]
async fn explicit_lifecycle_then_close() {
    let store = Arc::new(MemoryStore::new());
    let desk = desk(store.clone());
    let ticket = desk.ask("jdoe", "mot de passe expiré").await.unwrap().escalation.unwrap().ticket;

    desk.start_progress(ticket.id).await.unwrap();
    assert!(matches!(desk.close(ticket.id).await, Err(DeskError::InvalidTransition(_))));
    desk.record_resolution(ResolutionEvent::resolved(ticket.id, "Marc", "Réinitialiser le mot de passe"))
        .await
        .unwrap();
    assert_eq!(desk.close(ticket.id).await.unwrap().status, TicketStatus::Closed);
    assert_eq!(store.corpus_len().await, 1);
}

#[tokio::test]
async fn resolved_ticket_is_no_longer_reused_for_the_same_question() {
    let store = Arc::new(MemoryStore::new());
    let desk = desk(store.clone());

    let first = desk.ask("jdoe", "Le fax ne marche pas").await.unwrap().escalation.unwrap().ticket;
    desk.record_resolution(ResolutionEvent::resolved(first.id, "Marc", "Le fax a été remplacé"))
        .await
        .unwrap();

    // Nothing in the vocabulary matches, so the corpus cannot answer it.
    let second = desk.ask("jdoe", "Le fax ne marche pas").await.unwrap().escalation.unwrap();
    assert!(!second.reused);
    assert_ne!(second.ticket.id, first.id);
}

#[tokio::test]
async fn remote_resolution_sync_feeds_the_corpus() {
    let store = Arc::new(MemoryStore::new());
    let ticketing = Arc::new(MockTicketing::new());
    let desk = HelpDesk::builder(store.clone(), embedder()).ticketing(ticketing.clone()).build().unwrap();

    let ticket = desk.ask("jdoe", "vpn coupé en télétravail").await.unwrap().escalation.unwrap().ticket;
    let external_id = ticket.external_id.clone().unwrap();
    ticketing.add_followup(&external_id, "Mettre à jour le client VPN puis se reconnecter");
    ticketing.set_status(&external_id, REMOTE_SOLVED, None);

    let resolved = sync::run_cycle(store.as_ref(), ticketing.as_ref(), &desk.resolution_loop()).await.unwrap();
    assert_eq!(resolved, 1);

    let next = desk.ask("asmith", "Mon VPN ne marche plus").await.unwrap();
    assert_eq!(next.decision.winning_tier, Some(Tier::Local));
    assert_eq!(
        next.decision.winning_candidates[0].content,
        "Mettre à jour le client VPN puis se reconnecter"
    );
}

#[tokio::test]
async fn seeding_is_idempotent() {
    let store = Arc::new(MemoryStore::new());
    let desk = desk(store.clone());
    let seeded = desk.seed_corpus().await.unwrap();
    assert!(seeded > 0);
    assert_eq!(desk.seed_corpus().await.unwrap(), 0);
    assert_eq!(store.corpus_len().await, seeded);
}
