//! Deciding which tier answers a question, and how the answer is worded.

pub mod answer;
pub mod classifier;
pub mod router;

pub use answer::{AnswerRenderer, RenderedAnswer};
pub use classifier::{classify, technician_for};
pub use router::ConfidenceRouter;
