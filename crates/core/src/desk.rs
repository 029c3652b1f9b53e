//! The orchestration layer: one question in, one answer or one ticket out.

use std::sync::Arc;

use deskloop_llm::embedding::Embedder;
use deskloop_llm::provider::LlmProvider;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::config::DeskCfg;
use crate::error::DeskError;
use crate::escalation::{Directory, EscalationManager, EscalationReceipt, Ticketing};
use crate::feedback::ResolutionLoop;
use crate::feedback::answers;
use crate::retrieval::SourceAdapter;
use crate::retrieval::catalog;
use crate::retrieval::corpus::CorpusAdapter;
use crate::routing::{AnswerRenderer, ConfidenceRouter, RenderedAnswer, technician_for};
use crate::store::SupportStore;
use crate::types::{AnswerRecord, Outcome, Question, ResolutionEvent, RoutingDecision, Ticket};

/// Everything the asker gets back for one question.
#[derive(Debug, Clone)]
pub struct DeskReply {
    pub question: Question,
    pub decision: RoutingDecision,
    /// Set when answered.
    pub answer: Option<RenderedAnswer>,
    pub answer_id: Option<Uuid>,
    /// Set when escalated.
    pub escalation: Option<EscalationReceipt>,
}

pub struct HelpDesk {
    cfg: DeskCfg,
    store: Arc<dyn SupportStore>,
    router: ConfidenceRouter,
    renderer: AnswerRenderer,
    escalation: EscalationManager,
    resolution: Arc<ResolutionLoop>,
}

impl HelpDesk {
    pub fn builder(store: Arc<dyn SupportStore>, embedder: Arc<dyn Embedder>) -> HelpDeskBuilder {
        HelpDeskBuilder {
            cfg: DeskCfg::default(),
            store,
            embedder,
            local: Vec::new(),
            web: None,
            generation: None,
            ticketing: None,
            directory: None,
        }
    }

    pub fn config(&self) -> &DeskCfg {
        &self.cfg
    }

    /// Shared with the background resolution sync.
    pub fn resolution_loop(&self) -> Arc<ResolutionLoop> {
        Arc::clone(&self.resolution)
    }

    pub async fn ask(&self, asker_id: &str, text: &str) -> Result<DeskReply, DeskError> {
        self.ask_with_cancel(asker_id, text, &CancellationToken::new()).await
    }

    /// Like `ask`, but gives up with `Cancelled` if the token fires before
    /// anything is written.
    pub async fn ask_with_cancel(
        &self,
        asker_id: &str,
        text: &str,
        cancel: &CancellationToken,
    ) -> Result<DeskReply, DeskError> {
        if asker_id.trim().is_empty() {
            return Err(DeskError::Validation("asker id is empty".into()));
        }
        if text.trim().is_empty() {
            return Err(DeskError::Validation("question text is empty".into()));
        }
        let question = Question::new(asker_id.trim(), text.trim());

        let decision = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(DeskError::Cancelled),
            d = self.router.route(&question) => d,
        };

        match (decision.outcome, decision.winning_tier) {
            (Outcome::Answered, Some(tier)) => {
                let rendered = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Err(DeskError::Cancelled),
                    r = self.renderer.render(&question.text, tier, &decision.winning_candidates) => r,
                };
                self.store.insert_question(&question).await?;
                let record = answers::record_answer(self.store.as_ref(), &question, &rendered.text, tier).await?;
                tracing::info!(question = %question.id, tier = tier.as_str(), answer = %record.id, "question answered");
                Ok(DeskReply {
                    question,
                    decision,
                    answer: Some(rendered),
                    answer_id: Some(record.id),
                    escalation: None,
                })
            }
            _ => {
                if cancel.is_cancelled() {
                    return Err(DeskError::Cancelled);
                }
                let contact = technician_for(decision.category);
                let receipt = self
                    .escalation
                    .create_ticket(&question, decision.category, decision.priority, &contact)
                    .await?;
                Ok(DeskReply { question, decision, answer: None, answer_id: None, escalation: Some(receipt) })
            }
        }
    }

    pub async fn record_resolution(&self, event: ResolutionEvent) -> Result<Ticket, DeskError> {
        self.resolution.record_resolution(event).await
    }

    pub async fn submit_feedback(&self, answer_id: Uuid, is_valid: bool) -> Result<AnswerRecord, DeskError> {
        answers::submit_feedback(self.store.as_ref(), answer_id, is_valid).await
    }

    pub async fn start_progress(&self, ticket_id: Uuid) -> Result<Ticket, DeskError> {
        self.escalation.start_progress(ticket_id).await
    }

    pub async fn close(&self, ticket_id: Uuid) -> Result<Ticket, DeskError> {
        self.escalation.close(ticket_id).await
    }

    pub async fn tickets(&self) -> Result<Vec<Ticket>, DeskError> {
        Ok(self.store.list_tickets().await?)
    }

    /// Seed the built-in manual pairs into an empty corpus.
    pub async fn seed_corpus(&self) -> Result<usize, DeskError> {
        self.resolution.seed_manual_entries(catalog::SEED_CORPUS).await
    }
}

/// Collaborators are injected here; the corpus adapter is always registered
/// after the other local adapters.
pub struct HelpDeskBuilder {
    cfg: DeskCfg,
    store: Arc<dyn SupportStore>,
    embedder: Arc<dyn Embedder>,
    local: Vec<Arc<dyn SourceAdapter>>,
    web: Option<Arc<dyn SourceAdapter>>,
    generation: Option<Arc<dyn LlmProvider>>,
    ticketing: Option<Arc<dyn Ticketing>>,
    directory: Option<Arc<dyn Directory>>,
}

impl HelpDeskBuilder {
    pub fn config(mut self, cfg: DeskCfg) -> Self {
        self.cfg = cfg;
        self
    }

    pub fn local_adapter(mut self, adapter: Arc<dyn SourceAdapter>) -> Self {
        self.local.push(adapter);
        self
    }

    /// Knowledge base, FAQ and historical tickets, in that order.
    pub fn catalog(self) -> Self {
        self.local_adapter(Arc::new(catalog::kb_adapter()))
            .local_adapter(Arc::new(catalog::faq_adapter()))
            .local_adapter(Arc::new(catalog::ticket_adapter()))
    }

    pub fn web(mut self, adapter: Arc<dyn SourceAdapter>) -> Self {
        self.web = Some(adapter);
        self
    }

    pub fn generation(mut self, provider: Arc<dyn LlmProvider>) -> Self {
        self.generation = Some(provider);
        self
    }

    pub fn ticketing(mut self, ticketing: Arc<dyn Ticketing>) -> Self {
        self.ticketing = Some(ticketing);
        self
    }

    pub fn directory(mut self, directory: Arc<dyn Directory>) -> Self {
        self.directory = Some(directory);
        self
    }

    pub fn build(self) -> Result<HelpDesk, DeskError> {
        self.cfg.validate()?;
        let mut local = self.local;
        local.push(Arc::new(CorpusAdapter::new(Arc::clone(&self.store), Arc::clone(&self.embedder))));

        Ok(HelpDesk {
            router: ConfidenceRouter::new(local, self.web, &self.cfg),
            renderer: AnswerRenderer::new(self.generation, &self.cfg),
            escalation: EscalationManager::new(Arc::clone(&self.store), self.ticketing, self.directory, &self.cfg),
            resolution: Arc::new(ResolutionLoop::new(Arc::clone(&self.store), self.embedder, &self.cfg)),
            store: self.store,
            cfg: self.cfg,
        })
    }
}
