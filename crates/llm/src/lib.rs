//! Clients for the model-backed collaborators: text generation and embeddings.

pub mod embedding;
pub mod http;
pub mod provider;
