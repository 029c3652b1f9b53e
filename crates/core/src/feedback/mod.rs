//! Learning from humans: resolved tickets grow the corpus, and askers rate
//! the answers they were shown.

pub mod answers;
pub mod resolution;
pub mod sync;

pub use resolution::{ResolutionLoop, canonical_text};
