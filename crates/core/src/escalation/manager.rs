//! Ticket creation for escalated questions and the explicit lifecycle steps.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use uuid::Uuid;

use super::directory::Directory;
use super::lifecycle::validate_transition;
use super::ticketing::Ticketing;
use crate::config::DeskCfg;
use crate::error::DeskError;
use crate::store::{SupportStore, TicketInsert};
use crate::types::{Category, Contact, Priority, Question, Ticket, TicketStatus};

/// Outcome of an escalation.
#[derive(Debug, Clone, PartialEq)]
pub struct EscalationReceipt {
    pub ticket: Ticket,
    /// The ticket exists in the remote ticketing system.
    pub mirrored: bool,
    /// An open ticket for the same asker and question was reused.
    pub reused: bool,
}

/// Asker plus question text, lower-cased with whitespace collapsed.
pub fn dedup_key(asker_id: &str, text: &str) -> String {
    let normalized = text.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase();
    format!("{}\u{1f}{}", asker_id.trim(), normalized)
}

fn reused(ticket: Ticket) -> EscalationReceipt {
    let mirrored = ticket.external_id.is_some();
    EscalationReceipt { ticket, mirrored, reused: true }
}

fn truncate_title(text: &str, max_chars: usize) -> String {
    text.trim().chars().take(max_chars).collect()
}

pub struct EscalationManager {
    store: Arc<dyn SupportStore>,
    ticketing: Option<Arc<dyn Ticketing>>,
    directory: Option<Arc<dyn Directory>>,
    title_max_chars: usize,
    dedup: bool,
    timeout: Duration,
}

impl EscalationManager {
    pub fn new(
        store: Arc<dyn SupportStore>,
        ticketing: Option<Arc<dyn Ticketing>>,
        directory: Option<Arc<dyn Directory>>,
        cfg: &DeskCfg,
    ) -> Self {
        Self {
            store,
            ticketing,
            directory,
            title_max_chars: cfg.title_max_chars,
            dedup: cfg.dedup_open_tickets,
            timeout: cfg.adapter_timeout(),
        }
    }

    /// Open a ticket for a question nobody could answer. The question is
    /// recorded in the same write as the ticket.
    ///
    /// The local ticket is written first, under the dedup guard. Only a newly
    /// created ticket is mirrored into the ticketing system, and mirroring is
    /// best effort: on failure the ticket keeps no external id and `mirrored`
    /// is false.
    pub async fn create_ticket(
        &self,
        question: &Question,
        category: Category,
        priority: Priority,
        contact: &Contact,
    ) -> Result<EscalationReceipt, DeskError> {
        if question.text.trim().is_empty() {
            return Err(DeskError::Validation("question text is empty".into()));
        }
        if contact.email.trim().is_empty() {
            return Err(DeskError::Validation(format!("no contact for category {category}")));
        }

        let key = dedup_key(&question.asker_id, &question.text);
        if self.dedup {
            if let Some(existing) = self.store.find_open_ticket(&key).await? {
                self.store.insert_question(question).await?;
                tracing::info!(ticket = %existing.id, question = %question.id, "reusing open ticket");
                return Ok(reused(existing));
            }
        }

        let ticket = Ticket {
            id: Uuid::new_v4(),
            external_id: None,
            question_id: Some(question.id),
            title: truncate_title(&question.text, self.title_max_chars),
            description: question.text.clone(),
            category,
            priority,
            status: TicketStatus::New,
            assignee: contact.email.clone(),
            requester: Some(self.requester_name(&question.asker_id).await),
            dedup_key: key,
            technician_name: None,
            technician_email: None,
            solution: None,
            created_at: Utc::now(),
            resolved_at: None,
        };

        let mut ticket = match self.store.insert_ticket(Some(question), ticket, self.dedup).await? {
            TicketInsert::Created(ticket) => ticket,
            TicketInsert::Existing(ticket) => {
                // Lost a race against an identical escalation.
                tracing::info!(ticket = %ticket.id, "concurrent escalation, reusing open ticket");
                return Ok(reused(ticket));
            }
        };

        if let Some(external_id) = self.mirror(&ticket).await {
            match self.store.set_external_id(ticket.id, &external_id).await {
                Ok(()) => ticket.external_id = Some(external_id),
                Err(e) => {
                    tracing::warn!(ticket = %ticket.id, external_id = %external_id, error = %e, "remote ticket created but not linked");
                }
            }
        }
        let mirrored = ticket.external_id.is_some();
        tracing::info!(
            ticket = %ticket.id,
            category = %ticket.category,
            priority = %ticket.priority,
            assignee = %ticket.assignee,
            mirrored,
            "ticket created"
        );
        Ok(EscalationReceipt { ticket, mirrored, reused: false })
    }

    async fn requester_name(&self, login: &str) -> String {
        let Some(directory) = &self.directory else {
            return login.to_owned();
        };
        match tokio::time::timeout(self.timeout, directory.lookup(login)).await {
            Ok(Ok(Some(entry))) => entry.display_name,
            Ok(Ok(None)) => login.to_owned(),
            Ok(Err(e)) => {
                tracing::warn!(login, error = %e, "directory lookup failed");
                login.to_owned()
            }
            Err(_) => {
                tracing::warn!(login, "directory lookup timed out");
                login.to_owned()
            }
        }
    }

    async fn mirror(&self, ticket: &Ticket) -> Option<String> {
        let ticketing = self.ticketing.as_ref()?;
        match tokio::time::timeout(self.timeout, ticketing.create_remote_ticket(ticket)).await {
            Ok(Ok(id)) => Some(id),
            Ok(Err(e)) => {
                tracing::warn!(ticket = %ticket.id, system = ticketing.name(), error = %e, "ticket mirroring failed");
                None
            }
            Err(_) => {
                tracing::warn!(ticket = %ticket.id, system = ticketing.name(), "ticket mirroring timed out");
                None
            }
        }
    }

    /// New → InProgress.
    pub async fn start_progress(&self, id: Uuid) -> Result<Ticket, DeskError> {
        self.transition(id, TicketStatus::InProgress).await
    }

    /// Resolved → Closed.
    pub async fn close(&self, id: Uuid) -> Result<Ticket, DeskError> {
        self.transition(id, TicketStatus::Closed).await
    }

    async fn transition(&self, id: Uuid, to: TicketStatus) -> Result<Ticket, DeskError> {
        let mut ticket = self.store.ticket(id).await?.ok_or(DeskError::TicketNotFound(id))?;
        validate_transition(ticket.status, to)?;
        self.store.update_ticket_status(id, ticket.status, to).await?;
        tracing::info!(ticket = %id, from = ticket.status.as_db_str(), to = to.as_db_str(), "ticket status changed");
        ticket.status = to;
        Ok(ticket)
    }
}
