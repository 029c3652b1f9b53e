use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ── Questions ──────────────────────────────────────────────────

/// An incoming support question. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Question {
    pub id: Uuid,
    /// Directory login of the person asking.
    pub asker_id: String,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

impl Question {
    pub fn new(asker_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            asker_id: asker_id.into(),
            text: text.into(),
            created_at: Utc::now(),
        }
    }
}

// ── Retrieval ──────────────────────────────────────────────────

/// Backend a candidate was retrieved from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    LocalTicket,
    KbArticle,
    Faq,
    CorpusEntry,
    Web,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LocalTicket => "local_ticket",
            Self::KbArticle => "kb_article",
            Self::Faq => "faq",
            Self::CorpusEntry => "corpus_entry",
            Self::Web => "web",
        }
    }
}

/// One scored retrieval result. Lives for a single routing decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub source_kind: SourceKind,
    pub source_id: String,
    pub title: String,
    pub content: String,
    /// Always within [0, 1]; higher is better.
    pub score: f64,
    pub metadata: serde_json::Value,
}

impl Candidate {
    pub fn new(
        source_kind: SourceKind,
        source_id: impl Into<String>,
        title: impl Into<String>,
        content: impl Into<String>,
        score: f64,
        metadata: serde_json::Value,
    ) -> Self {
        Self {
            source_kind,
            source_id: source_id.into(),
            title: title.into(),
            content: content.into(),
            score: clamp_score(score),
            metadata,
        }
    }
}

/// Clamp into [0, 1]; NaN maps to 0.
pub fn clamp_score(score: f64) -> f64 {
    if score.is_nan() { 0.0 } else { score.clamp(0.0, 1.0) }
}

// ── Classification ─────────────────────────────────────────────

/// Support category. Declaration order is the tie-break order of the classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Category {
    Reseau,
    Materiel,
    Logiciel,
    Compte,
    Messagerie,
    Systeme,
    Acces,
    Telephonie,
    BaseDeDonnees,
    /// Sentinel when no keyword matched.
    Autre,
}

impl Category {
    /// Scored categories, in tie-break order. `Autre` is not scored.
    pub const SCORED: [Category; 9] = [
        Self::Reseau,
        Self::Materiel,
        Self::Logiciel,
        Self::Compte,
        Self::Messagerie,
        Self::Systeme,
        Self::Acces,
        Self::Telephonie,
        Self::BaseDeDonnees,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Self::Reseau => "Réseau",
            Self::Materiel => "Matériel",
            Self::Logiciel => "Logiciel",
            Self::Compte => "Compte",
            Self::Messagerie => "Messagerie",
            Self::Systeme => "Système",
            Self::Acces => "Accès",
            Self::Telephonie => "Téléphonie",
            Self::BaseDeDonnees => "Base de données",
            Self::Autre => "Autre",
        }
    }

    /// Parse a label, case-insensitively.
    pub fn from_label(s: &str) -> Option<Self> {
        let needle = s.trim().to_lowercase();
        Self::SCORED
            .iter()
            .chain(std::iter::once(&Self::Autre))
            .find(|c| c.label().to_lowercase() == needle)
            .copied()
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Urgency level of an escalated question.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Priority {
    Urgente,
    Haute,
    Moyenne,
    Basse,
}

impl Priority {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Urgente => "Urgente",
            Self::Haute => "Haute",
            Self::Moyenne => "Moyenne",
            Self::Basse => "Basse",
        }
    }

    pub fn from_label(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "urgente" => Some(Self::Urgente),
            "haute" => Some(Self::Haute),
            "moyenne" => Some(Self::Moyenne),
            "basse" => Some(Self::Basse),
            _ => None,
        }
    }

    /// Urgency code understood by the remote ticketing system.
    pub fn remote_code(&self) -> u8 {
        match self {
            Self::Basse => 2,
            Self::Moyenne => 3,
            Self::Haute => 4,
            Self::Urgente => 5,
        }
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Responsible queue for a category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contact {
    pub queue: String,
    pub email: String,
}

// ── Routing ────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Outcome {
    Answered,
    Escalated,
}

/// Which tier produced the answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Local,
    Web,
    LocalLowConfidence,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Web => "web",
            Self::LocalLowConfidence => "local_low_confidence",
        }
    }

    pub fn from_db(s: &str) -> Option<Self> {
        match s {
            "local" => Some(Self::Local),
            "web" => Some(Self::Web),
            "local_low_confidence" => Some(Self::LocalLowConfidence),
            _ => None,
        }
    }
}

/// The single, terminal routing verdict for one question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingDecision {
    pub outcome: Outcome,
    /// `None` when escalated.
    pub winning_tier: Option<Tier>,
    pub winning_candidates: Vec<Candidate>,
    pub category: Category,
    pub priority: Priority,
}

// ── Tickets ────────────────────────────────────────────────────

/// Ticket lifecycle: New → InProgress → Resolved → Closed.
/// InProgress may be skipped; Closed is only reachable from Resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TicketStatus {
    New,
    InProgress,
    Resolved,
    Closed,
}

impl TicketStatus {
    pub fn from_db(s: &str) -> Option<Self> {
        match s {
            "new" => Some(Self::New),
            "in_progress" => Some(Self::InProgress),
            "resolved" => Some(Self::Resolved),
            "closed" => Some(Self::Closed),
            _ => None,
        }
    }

    pub fn as_db_str(&self) -> &'static str {
        match self {
            Self::New => "new",
            Self::InProgress => "in_progress",
            Self::Resolved => "resolved",
            Self::Closed => "closed",
        }
    }

    /// New and InProgress tickets still await a human.
    pub fn is_open(&self) -> bool {
        matches!(self, Self::New | Self::InProgress)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ticket {
    pub id: Uuid,
    /// Id in the remote ticketing system; unset when mirroring failed.
    pub external_id: Option<String>,
    pub question_id: Option<Uuid>,
    pub title: String,
    pub description: String,
    pub category: Category,
    pub priority: Priority,
    pub status: TicketStatus,
    /// Queue e-mail the category routes to.
    pub assignee: String,
    /// Display name of the asker, from the directory when available.
    pub requester: Option<String>,
    /// Asker + normalized question text; see `escalation::manager::dedup_key`.
    pub dedup_key: String,
    pub technician_name: Option<String>,
    pub technician_email: Option<String>,
    pub solution: Option<String>,
    pub created_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

/// Inbound signal that a human solved a ticket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolutionEvent {
    pub ticket_id: Uuid,
    pub technician_name: String,
    pub technician_email: Option<String>,
    pub solution_text: String,
    pub status: TicketStatus,
}

impl ResolutionEvent {
    pub fn resolved(
        ticket_id: Uuid,
        technician_name: impl Into<String>,
        solution_text: impl Into<String>,
    ) -> Self {
        Self {
            ticket_id,
            technician_name: technician_name.into(),
            technician_email: None,
            solution_text: solution_text.into(),
            status: TicketStatus::Resolved,
        }
    }
}

// ── Corpus ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CorpusOrigin {
    Manual,
    Resolution,
}

impl CorpusOrigin {
    pub fn as_db_str(&self) -> &'static str {
        match self {
            Self::Manual => "manual",
            Self::Resolution => "resolution",
        }
    }

    pub fn from_db(s: &str) -> Option<Self> {
        match s {
            "manual" => Some(Self::Manual),
            "resolution" => Some(Self::Resolution),
            _ => None,
        }
    }
}

/// A technician-validated question/answer pair. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorpusEntry {
    pub id: Uuid,
    pub question_text: String,
    pub answer_text: String,
    /// Embedding of the full entry text (the canonical block for resolutions).
    pub embedding: Vec<f32>,
    /// Embedding of `question_text` alone. Empty when not computed.
    #[serde(default)]
    pub question_embedding: Vec<f32>,
    /// Embedding of `answer_text` alone. Empty when not computed.
    #[serde(default)]
    pub answer_embedding: Vec<f32>,
    pub validated: bool,
    pub created_from: CorpusOrigin,
    pub question_id: Option<Uuid>,
    pub ticket_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl CorpusEntry {
    /// Every stored view of the entry that a question can match.
    pub fn embeddings(&self) -> impl Iterator<Item = &[f32]> {
        [&self.embedding, &self.question_embedding, &self.answer_embedding]
            .into_iter()
            .map(Vec::as_slice)
            .filter(|v| !v.is_empty())
    }
}

// ── Answers ────────────────────────────────────────────────────

/// An answer shown to a user, with the user's verdict on it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnswerRecord {
    pub id: Uuid,
    pub question_id: Uuid,
    pub text: String,
    pub tier: Tier,
    /// 1 = helpful, -1 = not helpful, 0 = no feedback yet.
    pub validity: i32,
    pub resolution_count: i32,
    pub created_at: DateTime<Utc>,
}
