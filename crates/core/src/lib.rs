pub mod config;
pub mod desk;
pub mod error;
pub mod escalation;
pub mod feedback;
pub mod retrieval;
pub mod routing;
pub mod store;
pub mod types;

pub use desk::{DeskReply, HelpDesk};
