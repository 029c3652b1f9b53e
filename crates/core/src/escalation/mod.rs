//! Human escalation: ticket lifecycle, ticket creation, and the external
//! ticketing and directory collaborators.

pub mod directory;
pub mod lifecycle;
pub mod manager;
pub mod ticketing;

pub use directory::{Directory, DirectoryEntry, StaticDirectory};
pub use manager::{EscalationManager, EscalationReceipt, dedup_key};
pub use ticketing::{GlpiClient, MockTicketing, RemoteTicket, Ticketing, TicketingError};
