//! Resolution feedback: a human-solved ticket becomes a validated corpus entry.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use deskloop_llm::embedding::Embedder;
use uuid::Uuid;

use crate::config::DeskCfg;
use crate::error::DeskError;
use crate::escalation::lifecycle::validate_resolution;
use crate::store::SupportStore;
use crate::types::{CorpusEntry, CorpusOrigin, ResolutionEvent, Ticket};

/// Tags attached to every resolution entry.
const RESOLUTION_TAGS: [&str; 2] = ["ticket résolu", "solution validée"];

/// Deterministic text embedded for a resolved ticket. Same ticket and
/// resolution always give the same bytes.
pub fn canonical_text(ticket: &Ticket, technician_name: &str, solution: &str) -> String {
    let category = ticket.category.label();
    let mut tags = vec![category.to_lowercase()];
    tags.extend(RESOLUTION_TAGS.iter().map(|t| (*t).to_owned()));
    tags.push(ticket.title.to_lowercase());
    format!(
        "Catégorie: {category}\n\
Priorité: {priority}\n\
Titre: {title}\n\
Problème: {description}\n\
Technicien: {technician}\n\
Solution: {solution}\n\
Mots-clés: {tags}",
        priority = ticket.priority.label(),
        title = ticket.title,
        description = ticket.description,
        technician = technician_name.trim(),
        solution = solution.trim(),
        tags = tags.join(", "),
    )
}

pub struct ResolutionLoop {
    store: Arc<dyn SupportStore>,
    embedder: Arc<dyn Embedder>,
    timeout: Duration,
}

impl ResolutionLoop {
    pub fn new(store: Arc<dyn SupportStore>, embedder: Arc<dyn Embedder>, cfg: &DeskCfg) -> Self {
        Self { store, embedder, timeout: cfg.adapter_timeout() }
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, DeskError> {
        match tokio::time::timeout(self.timeout, self.embedder.embed(text)).await {
            Ok(Ok(v)) if !v.is_empty() => Ok(v),
            Ok(Ok(_)) => Err(DeskError::EmbeddingUnavailable("empty vector".into())),
            Ok(Err(e)) => Err(DeskError::EmbeddingUnavailable(e.to_string())),
            Err(_) => Err(DeskError::EmbeddingUnavailable(format!(
                "timed out after {}s",
                self.timeout.as_secs()
            ))),
        }
    }

    /// Canonical block, original problem and solution. The block carries
    /// labels and tags, so a short question is matched against the other two.
    async fn embed_views(
        &self,
        canonical: &str,
        problem: &str,
        solution: &str,
    ) -> Result<(Vec<f32>, Vec<f32>, Vec<f32>), DeskError> {
        let canonical = self.embed(canonical).await?;
        let problem = self.embed(problem).await?;
        let solution = self.embed(solution).await?;
        Ok((canonical, problem, solution))
    }

    /// Mark the ticket resolved and add its corpus entry, both or neither.
    ///
    /// Nothing is written when the ticket is unknown, the transition is not
    /// allowed, the event is malformed, or the text cannot be embedded.
    pub async fn record_resolution(&self, event: ResolutionEvent) -> Result<Ticket, DeskError> {
        if event.technician_name.trim().is_empty() {
            return Err(DeskError::Validation("technician name is empty".into()));
        }
        if event.solution_text.trim().is_empty() {
            return Err(DeskError::Validation("solution text is empty".into()));
        }

        let current = self
            .store
            .ticket(event.ticket_id)
            .await?
            .ok_or(DeskError::TicketNotFound(event.ticket_id))?;
        validate_resolution(current.status, event.status)?;

        let text = canonical_text(&current, &event.technician_name, &event.solution_text);
        let solution = event.solution_text.trim();
        let (embedding, question_embedding, answer_embedding) = self
            .embed_views(&text, &current.description, solution)
            .await
            .inspect_err(|e| {
                tracing::warn!(ticket = %current.id, error = %e, "resolution not recorded, embedding failed");
            })?;

        let now = Utc::now();
        let resolved = Ticket {
            status: event.status,
            technician_name: Some(event.technician_name.trim().to_owned()),
            technician_email: event.technician_email.clone(),
            solution: Some(event.solution_text.trim().to_owned()),
            resolved_at: Some(now),
            ..current.clone()
        };
        let entry = CorpusEntry {
            id: Uuid::new_v4(),
            question_text: current.description.clone(),
            answer_text: solution.to_owned(),
            embedding,
            question_embedding,
            answer_embedding,
            validated: true,
            created_from: CorpusOrigin::Resolution,
            question_id: current.question_id,
            ticket_id: Some(current.id),
            created_at: now,
        };

        self.store.commit_resolution(&resolved, current.status, &entry).await?;
        tracing::info!(
            ticket = %resolved.id,
            entry = %entry.id,
            status = resolved.status.as_db_str(),
            technician = %event.technician_name,
            "resolution recorded, corpus entry added"
        );
        Ok(resolved)
    }

    /// Seed manual question/answer pairs when the corpus is empty. Pairs that
    /// cannot be embedded are skipped. Returns how many were stored.
    pub async fn seed_manual_entries(&self, pairs: &[(&str, &str)]) -> Result<usize, DeskError> {
        if !self.store.validated_corpus().await?.is_empty() {
            return Ok(0);
        }
        let mut seeded = 0;
        for (question, answer) in pairs {
            let embedding = match self.embed(question).await {
                Ok(v) => v,
                Err(e) => {
                    tracing::warn!(question, error = %e, "skipping seed entry");
                    continue;
                }
            };
            let entry = CorpusEntry {
                id: Uuid::new_v4(),
                question_text: (*question).to_owned(),
                answer_text: (*answer).to_owned(),
                embedding,
                question_embedding: Vec::new(),
                answer_embedding: Vec::new(),
                validated: true,
                created_from: CorpusOrigin::Manual,
                question_id: None,
                ticket_id: None,
                created_at: Utc::now(),
            };
            self.store.insert_corpus_entry(&entry).await?;
            seeded += 1;
        }
        if seeded > 0 {
            tracing::info!(seeded, "corpus seeded");
        }
        Ok(seeded)
    }
}

#[cfg(test)]
mod tests {
    use deskloop_llm::embedding::MockEmbedder;

    use super::*;
    use crate::escalation::lifecycle::InvalidTransition;
    use crate::store::MemoryStore;
    use crate::types::{Category, Priority, TicketStatus};

    fn ticket(status: TicketStatus) -> Ticket {
        Ticket {
            id: Uuid::new_v4(),
            external_id: None,
            question_id: Some(Uuid::new_v4()),
            title: "Le routeur ne répond plus".into(),
            description: "Le routeur ne répond plus depuis ce matin".into(),
            category: Category::Reseau,
            priority: Priority::Moyenne,
            status,
            assignee: "tech.reseau@helpdesk.example".into(),
            requester: None,
            dedup_key: "k".into(),
            technician_name: None,
            technician_email: None,
            solution: None,
            created_at: Utc::now(),
            resolved_at: None,
        }
    }

    async fn setup(embedder: MockEmbedder, status: TicketStatus) -> (Arc<MemoryStore>, ResolutionLoop, Ticket) {
        let store = Arc::new(MemoryStore::new());
        let t = ticket(status);
        store.insert_ticket(None, t.clone(), false).await.unwrap();
        let resolution = ResolutionLoop::new(store.clone(), Arc::new(embedder), &DeskCfg::default());
        (store, resolution, t)
    }

    fn vocab() -> MockEmbedder {
        MockEmbedder::with_vocabulary(&["routeur", "redémarrer", "imprimante"])
    }

    #[test]
    fn canonical_text_is_stable() {
        let t = ticket(TicketStatus::New);
        let text = canonical_text(&t, " Marc ", "Redémarrer le routeur ");
        assert_eq!(text, canonical_text(&t, "Marc", "Redémarrer le routeur"));
        assert!(text.starts_with("Catégorie: Réseau\nPriorité: Moyenne\nTitre: Le routeur ne répond plus\n"));
        assert!(text.contains("Technicien: Marc\nSolution: Redémarrer le routeur\n"));
        assert!(text.ends_with("Mots-clés: réseau, ticket résolu, solution validée, le routeur ne répond plus"));
    }

    #[tokio::test]
    async fn resolution_updates_ticket_and_corpus_together() {
        let (store, resolution, t) = setup(vocab(), TicketStatus::New).await;
        let resolved = resolution
            .record_resolution(ResolutionEvent::resolved(t.id, "Marc", "Redémarrer le routeur"))
            .await
            .unwrap();

        assert_eq!(resolved.status, TicketStatus::Resolved);
        assert!(resolved.resolved_at.is_some());
        let stored = store.ticket(t.id).await.unwrap().unwrap();
        assert_eq!(stored.solution.as_deref(), Some("Redémarrer le routeur"));
        assert_eq!(stored.technician_name.as_deref(), Some("Marc"));

        let corpus = store.validated_corpus().await.unwrap();
        assert_eq!(corpus.len(), 1);
        assert_eq!(corpus[0].created_from, CorpusOrigin::Resolution);
        assert_eq!(corpus[0].ticket_id, Some(t.id));
        assert_eq!(corpus[0].question_id, t.question_id);
        assert_eq!(corpus[0].embedding, vec![1.0, 1.0, 0.0]);
        assert_eq!(corpus[0].question_embedding, vec![1.0, 0.0, 0.0]);
        assert_eq!(corpus[0].answer_embedding, vec![1.0, 1.0, 0.0]);
    }

    #[tokio::test]
    async fn embedding_failure_writes_nothing() {
        let (store, resolution, t) = setup(MockEmbedder::unavailable(), TicketStatus::InProgress).await;
        let err = resolution
            .record_resolution(ResolutionEvent::resolved(t.id, "Marc", "Redémarrer"))
            .await
            .unwrap_err();
        assert!(matches!(err, DeskError::EmbeddingUnavailable(_)));
        assert_eq!(store.ticket(t.id).await.unwrap().unwrap().status, TicketStatus::InProgress);
        assert_eq!(store.corpus_len().await, 0);
    }

    #[tokio::test]
    async fn unknown_ticket_is_not_found() {
        let (_store, resolution, _t) = setup(vocab(), TicketStatus::New).await;
        let id = Uuid::new_v4();
        let err = resolution.record_resolution(ResolutionEvent::resolved(id, "Marc", "x")).await.unwrap_err();
        assert!(matches!(err, DeskError::TicketNotFound(got) if got == id));
    }

    #[tokio::test]
    async fn a_ticket_feeds_the_corpus_once() {
        let (store, resolution, t) = setup(vocab(), TicketStatus::New).await;
        resolution.record_resolution(ResolutionEvent::resolved(t.id, "Marc", "Redémarrer")).await.unwrap();
        let err = resolution
            .record_resolution(ResolutionEvent::resolved(t.id, "Marc", "Redémarrer encore"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DeskError::InvalidTransition(InvalidTransition { from: TicketStatus::Resolved, .. })
        ));
        assert_eq!(store.corpus_len().await, 1);
    }

    #[tokio::test]
    async fn closing_resolution_passes_through_resolved() {
        let (_store, resolution, t) = setup(vocab(), TicketStatus::New).await;
        let event = ResolutionEvent { status: TicketStatus::Closed, ..ResolutionEvent::resolved(t.id, "Marc", "ok") };
        assert_eq!(resolution.record_resolution(event).await.unwrap().status, TicketStatus::Closed);
    }

    #[tokio::test]
    async fn malformed_event_is_rejected() {
        let (store, resolution, t) = setup(vocab(), TicketStatus::New).await;
        let err = resolution.record_resolution(ResolutionEvent::resolved(t.id, "Marc", "   ")).await.unwrap_err();
        assert!(matches!(err, DeskError::Validation(_)));
        assert_eq!(store.corpus_len().await, 0);
    }

    #[tokio::test]
    async fn seeding_only_fills_an_empty_corpus() {
        let store = Arc::new(MemoryStore::new());
        let resolution = ResolutionLoop::new(store.clone(), Arc::new(vocab()), &DeskCfg::default());
        let pairs = [("imprimante hors ligne", "Relancer le spouleur"), ("routeur", "Redémarrer")];
        assert_eq!(resolution.seed_manual_entries(&pairs).await.unwrap(), 2);
        assert_eq!(resolution.seed_manual_entries(&pairs).await.unwrap(), 0);
        assert_eq!(store.corpus_len().await, 2);
    }
}
