use crate::types::TicketStatus;

/// Error when an invalid ticket status transition is attempted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidTransition {
    pub from: TicketStatus,
    pub to: TicketStatus,
}

impl std::fmt::Display for InvalidTransition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid ticket transition: {:?} → {:?}", self.from, self.to)
    }
}

impl std::error::Error for InvalidTransition {}

/// Validate a ticket status transition.
///
/// Valid transitions:
///   new → in_progress (a technician picked it up)
///   new → resolved (resolution arrived before anyone picked it up)
///   in_progress → resolved
///   resolved → closed
pub fn validate_transition(from: TicketStatus, to: TicketStatus) -> Result<(), InvalidTransition> {
    let valid = matches!(
        (from, to),
        (TicketStatus::New, TicketStatus::InProgress)
            | (TicketStatus::New, TicketStatus::Resolved)
            | (TicketStatus::InProgress, TicketStatus::Resolved)
            | (TicketStatus::Resolved, TicketStatus::Closed)
    );
    if valid { Ok(()) } else { Err(InvalidTransition { from, to }) }
}

/// A resolution may land on Resolved, or on Closed by passing through Resolved.
pub fn validate_resolution(from: TicketStatus, target: TicketStatus) -> Result<(), InvalidTransition> {
    match target {
        TicketStatus::Resolved => validate_transition(from, TicketStatus::Resolved),
        TicketStatus::Closed => {
            validate_transition(from, TicketStatus::Resolved)?;
            validate_transition(TicketStatus::Resolved, TicketStatus::Closed)
        }
        _ => Err(InvalidTransition { from, to: target }),
    }
}
