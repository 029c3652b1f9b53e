//! Turning winning candidates into the text shown to the asker.

use std::sync::Arc;
use std::time::Duration;

use deskloop_llm::provider::{ChatMessage, CompletionRequest, LlmProvider};

use super::classifier::parse_category_tag;
use crate::config::DeskCfg;
use crate::types::{Candidate, Category, Tier};

#[derive(Debug, Clone, PartialEq)]
pub struct RenderedAnswer {
    pub text: String,
    /// Category named by a `[Catégorie: X]` tag in generated prose, if any.
    pub category_tag: Option<Category>,
    /// True when the text came from the generation service.
    pub generated: bool,
}

pub struct AnswerRenderer {
    provider: Option<Arc<dyn LlmProvider>>,
    timeout: Duration,
    max_tokens: u32,
    temperature: f32,
}

impl AnswerRenderer {
    pub fn new(provider: Option<Arc<dyn LlmProvider>>, cfg: &DeskCfg) -> Self {
        Self {
            provider,
            timeout: cfg.adapter_timeout(),
            max_tokens: cfg.generation_max_tokens,
            temperature: cfg.generation_temperature,
        }
    }

    /// Plain rendering only.
    pub fn plain(cfg: &DeskCfg) -> Self {
        Self::new(None, cfg)
    }

    pub async fn render(&self, question: &str, tier: Tier, candidates: &[Candidate]) -> RenderedAnswer {
        if let Some(provider) = &self.provider {
            let request = CompletionRequest {
                messages: vec![ChatMessage::user(build_prompt(question, candidates))],
                max_tokens: self.max_tokens,
                temperature: self.temperature,
            };
            match tokio::time::timeout(self.timeout, provider.complete(request)).await {
                Ok(Ok(resp)) if !resp.content.trim().is_empty() => {
                    let (text, category_tag) = parse_category_tag(&resp.content);
                    return RenderedAnswer { text, category_tag, generated: true };
                }
                Ok(Ok(_)) => tracing::warn!(provider = provider.name(), "empty generation, using plain answer"),
                Ok(Err(e)) => tracing::warn!(provider = provider.name(), error = %e, "generation failed, using plain answer"),
                Err(_) => tracing::warn!(provider = provider.name(), "generation timed out, using plain answer"),
            }
        }
        RenderedAnswer { text: plain_answer(tier, candidates), category_tag: None, generated: false }
    }
}

/// Context prompt listing every winning candidate.
pub fn build_prompt(question: &str, candidates: &[Candidate]) -> String {
    let mut context = Vec::with_capacity(candidates.len() * 4);
    for (i, c) in candidates.iter().enumerate() {
        context.push(format!("[Source {} - {}]", i + 1, c.source_kind.as_str().to_uppercase()));
        context.push(format!("Titre: {}", c.title));
        context.push(c.content.clone());
        context.push("\n---\n".to_owned());
    }
    format!(
        "Tu es un assistant IT helpdesk. Réponds à la question en utilisant UNIQUEMENT \
les informations fournies dans le contexte ci-dessous. Si l'information n'est pas \
dans le contexte, dis-le clairement.\n\n\
CONTEXTE:\n{}\n\n\
QUESTION: {}\n\n\
RÉPONSE (sois concis et précis, cite les sources si pertinent):",
        context.join("\n"),
        question
    )
}

fn plain_answer(tier: Tier, candidates: &[Candidate]) -> String {
    match tier {
        Tier::Web => candidates
            .iter()
            .map(|c| format!("- {}\n  {}\n  {}", c.title, c.content, c.source_id))
            .collect::<Vec<_>>()
            .join("\n"),
        Tier::Local | Tier::LocalLowConfidence => {
            let Some(best) = candidates.first() else {
                return String::new();
            };
            let mut text = format!("{}\n\n{}", best.title, best.content);
            if tier == Tier::LocalLowConfidence {
                text.push_str("\n\n(Réponse approximative : aucune source ne correspond précisément.)");
            }
            text
        }
    }
}

#[cfg(test)]
mod tests {
    use deskloop_llm::provider::MockProvider;

    use super::*;
    use crate::types::SourceKind;

    fn cand(kind: SourceKind, title: &str, content: &str) -> Candidate {
        Candidate::new(kind, "1", title, content, 0.9, serde_json::Value::Null)
    }

    #[test]
    fn prompt_lists_sources_in_order() {
        let prompt = build_prompt(
            "vpn ?",
            &[cand(SourceKind::Faq, "VPN", "AnyConnect"), cand(SourceKind::KbArticle, "Guide", "...")],
        );
        let first = prompt.find("[Source 1 - FAQ]").unwrap();
        let second = prompt.find("[Source 2 - KB_ARTICLE]").unwrap();
        assert!(first < second);
        assert!(prompt.contains("Titre: VPN"));
        assert!(prompt.contains("QUESTION: vpn ?"));
    }

    #[tokio::test]
    async fn generated_text_has_tag_stripped() {
        let provider: Arc<dyn LlmProvider> = Arc::new(MockProvider::new("Relancez le client.\n[Catégorie: Réseau]"));
        let renderer = AnswerRenderer::new(Some(provider), &DeskCfg::default());
        let answer = renderer.render("vpn", Tier::Local, &[cand(SourceKind::Faq, "t", "c")]).await;
        assert!(answer.generated);
        assert_eq!(answer.text, "Relancez le client.");
        assert_eq!(answer.category_tag, Some(Category::Reseau));
    }

    #[tokio::test]
    async fn unavailable_generation_falls_back_to_best_candidate() {
        let provider: Arc<dyn LlmProvider> = Arc::new(MockProvider::unavailable());
        let renderer = AnswerRenderer::new(Some(provider), &DeskCfg::default());
        let answer = renderer
            .render("vpn", Tier::Local, &[cand(SourceKind::Faq, "VPN", "AnyConnect"), cand(SourceKind::Faq, "x", "y")])
            .await;
        assert!(!answer.generated);
        assert_eq!(answer.text, "VPN\n\nAnyConnect");
        assert_eq!(answer.category_tag, None);
    }

    #[tokio::test]
    async fn plain_web_answer_lists_links() {
        let renderer = AnswerRenderer::plain(&DeskCfg::default());
        let web = Candidate::new(SourceKind::Web, "https://a.example", "A", "snippet", 0.0, serde_json::Value::Null);
        let answer = renderer.render("q", Tier::Web, &[web]).await;
        assert!(answer.text.contains("https://a.example"));
    }

    #[tokio::test]
    async fn low_confidence_answer_is_flagged() {
        let renderer = AnswerRenderer::plain(&DeskCfg::default());
        let answer = renderer.render("q", Tier::LocalLowConfidence, &[cand(SourceKind::Faq, "t", "c")]).await;
        assert!(answer.text.contains("approximative"));
    }
}
