//! Persistence for questions, tickets, corpus entries and answers.
//!
//! These tables are the only state shared across questions. Every method is
//! one atomic unit of work, so a reader never sees a ticket marked Resolved
//! without its corpus entry, or the reverse.

pub mod memory;
pub mod pg;

use async_trait::async_trait;
use uuid::Uuid;

use crate::types::{AnswerRecord, CorpusEntry, Question, Ticket, TicketStatus};

pub use memory::MemoryStore;
pub use pg::PgStore;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    /// A conditional write lost a race (e.g. the ticket changed status meanwhile).
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("corrupt row: {0}")]
    Corrupt(String),
}

/// Result of inserting a ticket under the open-ticket dedup guard.
#[derive(Debug, Clone, PartialEq)]
pub enum TicketInsert {
    Created(Ticket),
    /// An open ticket with the same dedup key already existed; nothing was written.
    Existing(Ticket),
}

impl TicketInsert {
    pub fn into_ticket(self) -> Ticket {
        match self {
            Self::Created(t) | Self::Existing(t) => t,
        }
    }
}

#[async_trait]
pub trait SupportStore: Send + Sync {
    async fn insert_question(&self, question: &Question) -> Result<(), StoreError>;

    /// Insert a ticket, and the question that raised it, in one unit of work.
    /// With `dedup`, an open ticket sharing the dedup key wins and only the
    /// question is written.
    async fn insert_ticket(
        &self,
        question: Option<&Question>,
        ticket: Ticket,
        dedup: bool,
    ) -> Result<TicketInsert, StoreError>;

    /// Link a local ticket to its remote mirror.
    async fn set_external_id(&self, id: Uuid, external_id: &str) -> Result<(), StoreError>;

    async fn find_open_ticket(&self, dedup_key: &str) -> Result<Option<Ticket>, StoreError>;

    async fn ticket(&self, id: Uuid) -> Result<Option<Ticket>, StoreError>;

    /// All tickets, oldest first.
    async fn list_tickets(&self) -> Result<Vec<Ticket>, StoreError>;

    /// Open tickets that have a remote mirror, oldest first.
    async fn open_mirrored_tickets(&self) -> Result<Vec<Ticket>, StoreError>;

    /// Move a ticket from `from` to `to`. `Conflict` if it is no longer in `from`.
    async fn update_ticket_status(
        &self,
        id: Uuid,
        from: TicketStatus,
        to: TicketStatus,
    ) -> Result<(), StoreError>;

    /// Validated corpus entries, oldest first.
    async fn validated_corpus(&self) -> Result<Vec<CorpusEntry>, StoreError>;

    async fn insert_corpus_entry(&self, entry: &CorpusEntry) -> Result<(), StoreError>;

    /// Write the resolved ticket and its corpus entry together. The stored
    /// ticket must still be in `expected` status, otherwise `Conflict` and
    /// nothing is written.
    async fn commit_resolution(
        &self,
        ticket: &Ticket,
        expected: TicketStatus,
        entry: &CorpusEntry,
    ) -> Result<(), StoreError>;

    async fn insert_answer(&self, answer: &AnswerRecord) -> Result<(), StoreError>;

    /// Record a user's verdict. Returns the updated answer, or `None` if unknown.
    async fn record_answer_feedback(
        &self,
        id: Uuid,
        is_valid: bool,
    ) -> Result<Option<AnswerRecord>, StoreError>;
}
