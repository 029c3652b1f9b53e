//! Embedding collaborator: text → fixed-length vector.
//!
//! `HttpEmbedder` talks to any OpenAI-compatible `/embeddings` endpoint
//! (Ollama serves `nomic-embed-text` this way). `HashEmbedder` is the
//! deterministic local placeholder used in ephemeral mode.

use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

/// Dimension of the hashing placeholder.
pub const HASH_EMBED_DIM: usize = 256;

#[derive(Debug, thiserror::Error)]
pub enum EmbedError {
    #[error("embedding service unavailable: {0}")]
    Unavailable(String),
    #[error("invalid embedding response: {0}")]
    InvalidResponse(String),
}

pub type EmbedFuture<'a> = Pin<Box<dyn Future<Output = Result<Vec<f32>, EmbedError>> + Send + 'a>>;

pub trait Embedder: Send + Sync {
    fn name(&self) -> &str;

    fn embed<'a>(&'a self, text: &'a str) -> EmbedFuture<'a>;
}

// ── HTTP ──

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a str,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

pub struct HttpEmbedder {
    model: String,
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl HttpEmbedder {
    pub fn new(model: String, base_url: String, api_key: Option<String>, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            model,
            client,
            base_url: base_url.trim_end_matches('/').to_owned(),
            api_key,
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/embeddings", self.base_url)
    }

    async fn request(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        let body = EmbeddingRequest { model: &self.model, input: text };
        let mut builder = self.client.post(self.endpoint()).json(&body);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }
        let resp = builder
            .send()
            .await
            .map_err(|e| EmbedError::Unavailable(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            tracing::warn!(status = status.as_u16(), "embedding endpoint returned an error status");
            return Err(EmbedError::Unavailable(format!("{status}: {text}")));
        }

        let api: EmbeddingResponse = resp.json().await
            .map_err(|e| EmbedError::InvalidResponse(e.to_string()))?;
        let vector = api.data.into_iter().next()
            .map(|d| d.embedding)
            .ok_or_else(|| EmbedError::InvalidResponse("empty data array".into()))?;
        if vector.is_empty() {
            return Err(EmbedError::InvalidResponse("zero-length vector".into()));
        }
        Ok(vector)
    }
}

impl Embedder for HttpEmbedder {
    fn name(&self) -> &str {
        "http"
    }

    fn embed<'a>(&'a self, text: &'a str) -> EmbedFuture<'a> {
        Box::pin(self.request(text))
    }
}

/// Build an HTTP embedder from `DESKLOOP_EMBED_MODEL`, `DESKLOOP_EMBED_BASE_URL`
/// and optionally `DESKLOOP_EMBED_API_KEY`. Returns `None` if model or URL is missing.
pub fn from_env(timeout: Duration) -> Option<HttpEmbedder> {
    let model = std::env::var("DESKLOOP_EMBED_MODEL").ok()?;
    let base_url = std::env::var("DESKLOOP_EMBED_BASE_URL").ok()?;
    let api_key = std::env::var("DESKLOOP_EMBED_API_KEY").ok().filter(|k| !k.is_empty());
    Some(HttpEmbedder::new(model, base_url, api_key, timeout))
}

// ── Local placeholders ──

/// Function words that carry no topic. Dropped before hashing so they do
/// not dilute short questions.
const STOPWORDS: &[&str] = &[
    "les", "des", "une", "est", "sont", "pas", "plus", "pour", "dans", "par", "sur", "avec",
    "sans", "sous", "aux", "que", "qui", "quoi", "comment", "mon", "mes", "ton", "tes", "son",
    "ses", "nos", "vos", "leur", "leurs", "mais", "donc", "car", "elle", "ils", "elles", "nous",
    "vous", "cette", "ces", "cet", "tout", "tous", "très", "faut", "peux", "peut", "suis",
    "depuis", "encore", "comme", "aussi", "bien", "the", "and", "for", "with", "not",
];

/// 64-bit FNV-1a. Fixed constants, so vectors stay comparable across builds.
fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for b in bytes {
        hash ^= u64::from(*b);
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    hash
}

/// Bag-of-words feature hashing. Same input always yields the same vector;
/// texts sharing words land close together.
#[derive(Debug, Default, Clone)]
pub struct HashEmbedder;

impl HashEmbedder {
    pub fn vector(text: &str) -> Vec<f32> {
        let mut v = vec![0.0_f32; HASH_EMBED_DIM];
        let lower = text.to_lowercase();
        for token in lower
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| t.chars().count() > 2 && !STOPWORDS.contains(t))
        {
            v[(fnv1a(token.as_bytes()) % HASH_EMBED_DIM as u64) as usize] += 1.0;
        }
        v
    }
}

impl Embedder for HashEmbedder {
    fn name(&self) -> &str {
        "hash"
    }

    fn embed<'a>(&'a self, text: &'a str) -> EmbedFuture<'a> {
        let v = Self::vector(text);
        Box::pin(async move { Ok(v) })
    }
}

/// Test double: one dimension per vocabulary phrase, 1.0 when the phrase occurs.
/// `unavailable()` fails every call.
#[derive(Debug, Clone)]
pub struct MockEmbedder {
    vocabulary: Option<Vec<String>>,
}

impl MockEmbedder {
    pub fn with_vocabulary(words: &[&str]) -> Self {
        Self { vocabulary: Some(words.iter().map(|w| w.to_lowercase()).collect()) }
    }

    pub fn unavailable() -> Self {
        Self { vocabulary: None }
    }
}

impl Embedder for MockEmbedder {
    fn name(&self) -> &str {
        "mock"
    }

    fn embed<'a>(&'a self, text: &'a str) -> EmbedFuture<'a> {
        let result = match &self.vocabulary {
            Some(vocab) => {
                let lower = text.to_lowercase();
                Ok(vocab
                    .iter()
                    .map(|w| if lower.contains(w.as_str()) { 1.0 } else { 0.0 })
                    .collect())
            }
            None => Err(EmbedError::Unavailable("mock embedder offline".into())),
        };
        Box::pin(async move { result })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn hash_embedder_is_deterministic() {
        let e = HashEmbedder;
        let a = e.embed("imprimante bloquée").await.unwrap();
        let b = e.embed("imprimante bloquée").await.unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), HASH_EMBED_DIM);
    }

    #[test]
    fn hash_embedder_ignores_short_tokens_and_case() {
        assert_eq!(HashEmbedder::vector("VPN le"), HashEmbedder::vector("vpn"));
        assert!(HashEmbedder::vector("a b").iter().all(|x| *x == 0.0));
    }

    #[test]
    fn fnv1a_matches_reference_values() {
        assert_eq!(fnv1a(b""), 0xcbf2_9ce4_8422_2325);
        assert_eq!(fnv1a(b"a"), 0xaf63_dc4c_8601_ec8c);
        assert_eq!(fnv1a(b"foobar"), 0x8594_4171_f739_67e8);
    }

    #[test]
    fn hash_embedder_skips_function_words() {
        assert_eq!(
            HashEmbedder::vector("mon routeur ne fonctionne pas, comment redémarrer"),
            HashEmbedder::vector("routeur fonctionne redémarrer"),
        );
    }

    #[tokio::test]
    async fn mock_embedder_marks_vocabulary_presence() {
        let e = MockEmbedder::with_vocabulary(&["vpn", "routeur", "redémarrer"]);
        let v = e.embed("Redémarrer le routeur").await.unwrap();
        assert_eq!(v, vec![0.0, 1.0, 1.0]);
    }

    #[tokio::test]
    async fn unavailable_mock_fails() {
        let err = MockEmbedder::unavailable().embed("x").await.unwrap_err();
        assert!(matches!(err, EmbedError::Unavailable(_)));
    }

    #[test]
    fn endpoint_strips_trailing_slash() {
        let e = HttpEmbedder::new("nomic-embed-text".into(), "http://ollama:11434/v1/".into(), None, Duration::from_secs(10));
        assert_eq!(e.endpoint(), "http://ollama:11434/v1/embeddings");
    }
}
