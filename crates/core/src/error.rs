use uuid::Uuid;

use crate::escalation::lifecycle::InvalidTransition;
use crate::store::StoreError;

/// Errors surfaced to callers of the help desk. Adapter-level failures never
/// reach this type; they are absorbed as empty result lists.
#[derive(Debug, thiserror::Error)]
pub enum DeskError {
    #[error("ticket not found: {0}")]
    TicketNotFound(Uuid),
    #[error("answer not found: {0}")]
    AnswerNotFound(Uuid),
    #[error("embedding unavailable: {0}")]
    EmbeddingUnavailable(String),
    #[error("validation failed: {0}")]
    Validation(String),
    #[error(transparent)]
    InvalidTransition(#[from] InvalidTransition),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("cancelled")]
    Cancelled,
}
