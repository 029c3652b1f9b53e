use async_trait::async_trait;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{StoreError, SupportStore, TicketInsert};
use crate::types::{AnswerRecord, CorpusEntry, Question, Ticket, TicketStatus};

#[derive(Debug, Default)]
struct Tables {
    questions: Vec<Question>,
    tickets: Vec<Ticket>,
    corpus: Vec<CorpusEntry>,
    answers: Vec<AnswerRecord>,
}

/// In-process store for ephemeral mode and tests. One lock guards every
/// table, so each method is atomic.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn question_count(&self) -> usize {
        self.tables.lock().await.questions.len()
    }

    pub async fn corpus_len(&self) -> usize {
        self.tables.lock().await.corpus.len()
    }
}

#[async_trait]
impl SupportStore for MemoryStore {
    async fn insert_question(&self, question: &Question) -> Result<(), StoreError> {
        self.tables.lock().await.questions.push(question.clone());
        Ok(())
    }

    async fn insert_ticket(
        &self,
        question: Option<&Question>,
        ticket: Ticket,
        dedup: bool,
    ) -> Result<TicketInsert, StoreError> {
        let mut tables = self.tables.lock().await;
        if let Some(question) = question {
            tables.questions.push(question.clone());
        }
        if dedup {
            if let Some(existing) = tables
                .tickets
                .iter()
                .find(|t| t.status.is_open() && t.dedup_key == ticket.dedup_key)
            {
                return Ok(TicketInsert::Existing(existing.clone()));
            }
        }
        tables.tickets.push(ticket.clone());
        Ok(TicketInsert::Created(ticket))
    }

    async fn set_external_id(&self, id: Uuid, external_id: &str) -> Result<(), StoreError> {
        let mut tables = self.tables.lock().await;
        let ticket = tables
            .tickets
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or_else(|| StoreError::Conflict(format!("ticket {id} does not exist")))?;
        ticket.external_id = Some(external_id.to_owned());
        Ok(())
    }

    async fn find_open_ticket(&self, dedup_key: &str) -> Result<Option<Ticket>, StoreError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .tickets
            .iter()
            .find(|t| t.status.is_open() && t.dedup_key == dedup_key)
            .cloned())
    }

    async fn ticket(&self, id: Uuid) -> Result<Option<Ticket>, StoreError> {
        let tables = self.tables.lock().await;
        Ok(tables.tickets.iter().find(|t| t.id == id).cloned())
    }

    async fn list_tickets(&self) -> Result<Vec<Ticket>, StoreError> {
        Ok(self.tables.lock().await.tickets.clone())
    }

    async fn open_mirrored_tickets(&self) -> Result<Vec<Ticket>, StoreError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .tickets
            .iter()
            .filter(|t| t.status.is_open() && t.external_id.is_some())
            .cloned()
            .collect())
    }

    async fn update_ticket_status(
        &self,
        id: Uuid,
        from: TicketStatus,
        to: TicketStatus,
    ) -> Result<(), StoreError> {
        let mut tables = self.tables.lock().await;
        let ticket = tables
            .tickets
            .iter_mut()
            .find(|t| t.id == id && t.status == from)
            .ok_or_else(|| StoreError::Conflict(format!("ticket {id} is not {}", from.as_db_str())))?;
        ticket.status = to;
        Ok(())
    }

    async fn validated_corpus(&self) -> Result<Vec<CorpusEntry>, StoreError> {
        let tables = self.tables.lock().await;
        Ok(tables.corpus.iter().filter(|e| e.validated).cloned().collect())
    }

    async fn insert_corpus_entry(&self, entry: &CorpusEntry) -> Result<(), StoreError> {
        self.tables.lock().await.corpus.push(entry.clone());
        Ok(())
    }

    async fn commit_resolution(
        &self,
        ticket: &Ticket,
        expected: TicketStatus,
        entry: &CorpusEntry,
    ) -> Result<(), StoreError> {
        let mut tables = self.tables.lock().await;
        let stored = tables
            .tickets
            .iter_mut()
            .find(|t| t.id == ticket.id && t.status == expected)
            .ok_or_else(|| {
                StoreError::Conflict(format!("ticket {} is not {}", ticket.id, expected.as_db_str()))
            })?;
        *stored = ticket.clone();
        tables.corpus.push(entry.clone());
        Ok(())
    }

    async fn insert_answer(&self, answer: &AnswerRecord) -> Result<(), StoreError> {
        self.tables.lock().await.answers.push(answer.clone());
        Ok(())
    }

    async fn record_answer_feedback(
        &self,
        id: Uuid,
        is_valid: bool,
    ) -> Result<Option<AnswerRecord>, StoreError> {
        let mut tables = self.tables.lock().await;
        let Some(answer) = tables.answers.iter_mut().find(|a| a.id == id) else {
            return Ok(None);
        };
        if is_valid {
            answer.validity = 1;
            answer.resolution_count += 1;
        } else {
            answer.validity = -1;
        }
        Ok(Some(answer.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Category, CorpusOrigin, Priority, Tier};
    use chrono::Utc;

    fn ticket(key: &str) -> Ticket {
        Ticket {
            id: Uuid::new_v4(),
            external_id: None,
            question_id: None,
            title: "VPN".into(),
            description: "VPN en panne".into(),
            category: Category::Reseau,
            priority: Priority::Moyenne,
            status: TicketStatus::New,
            assignee: "tech.reseau@helpdesk.example".into(),
            requester: None,
            dedup_key: key.into(),
            technician_name: None,
            technician_email: None,
            solution: None,
            created_at: Utc::now(),
            resolved_at: None,
        }
    }

    fn entry(ticket_id: Uuid) -> CorpusEntry {
        CorpusEntry {
            id: Uuid::new_v4(),
            question_text: "q".into(),
            answer_text: "a".into(),
            embedding: vec![1.0],
            question_embedding: Vec::new(),
            answer_embedding: Vec::new(),
            validated: true,
            created_from: CorpusOrigin::Resolution,
            question_id: None,
            ticket_id: Some(ticket_id),
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn dedup_returns_open_ticket() {
        let store = MemoryStore::new();
        let first = store.insert_ticket(None, ticket("k"), true).await.unwrap();
        assert!(matches!(first, TicketInsert::Created(_)));
        let second = store.insert_ticket(None, ticket("k"), true).await.unwrap();
        assert!(matches!(second, TicketInsert::Existing(_)));
        assert_eq!(store.list_tickets().await.unwrap().len(), 1);

        // Without the guard the duplicate is written.
        store.insert_ticket(None, ticket("k"), false).await.unwrap();
        assert_eq!(store.list_tickets().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn question_is_written_with_its_ticket() {
        let store = MemoryStore::new();
        let q = Question::new("jdoe", "VPN en panne");
        store.insert_ticket(Some(&q), ticket("k"), true).await.unwrap();
        let again = Question::new("jdoe", "VPN en panne");
        let reused = store.insert_ticket(Some(&again), ticket("k"), true).await.unwrap();
        assert!(matches!(reused, TicketInsert::Existing(_)));
        assert_eq!(store.question_count().await, 2);
        assert_eq!(store.list_tickets().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn external_id_is_linked_after_insert() {
        let store = MemoryStore::new();
        let t = store.insert_ticket(None, ticket("k"), true).await.unwrap().into_ticket();
        store.set_external_id(t.id, "42").await.unwrap();
        assert_eq!(store.ticket(t.id).await.unwrap().unwrap().external_id.as_deref(), Some("42"));
        assert_eq!(store.open_mirrored_tickets().await.unwrap().len(), 1);
        assert!(matches!(store.set_external_id(Uuid::new_v4(), "43").await, Err(StoreError::Conflict(_))));
    }

    #[tokio::test]
    async fn commit_resolution_is_conditional() {
        let store = MemoryStore::new();
        let t = store.insert_ticket(None, ticket("k"), true).await.unwrap().into_ticket();
        let mut resolved = t.clone();
        resolved.status = TicketStatus::Resolved;

        store.commit_resolution(&resolved, TicketStatus::New, &entry(t.id)).await.unwrap();
        assert_eq!(store.corpus_len().await, 1);

        // Second commit expecting New conflicts and writes nothing.
        let err = store
            .commit_resolution(&resolved, TicketStatus::New, &entry(t.id))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
        assert_eq!(store.corpus_len().await, 1);
    }

    #[tokio::test]
    async fn feedback_updates_validity() {
        let store = MemoryStore::new();
        let answer = AnswerRecord {
            id: Uuid::new_v4(),
            question_id: Uuid::new_v4(),
            text: "redémarrer".into(),
            tier: Tier::Local,
            validity: 0,
            resolution_count: 0,
            created_at: Utc::now(),
        };
        store.insert_answer(&answer).await.unwrap();
        let up = store.record_answer_feedback(answer.id, true).await.unwrap().unwrap();
        assert_eq!((up.validity, up.resolution_count), (1, 1));
        let down = store.record_answer_feedback(answer.id, false).await.unwrap().unwrap();
        assert_eq!((down.validity, down.resolution_count), (-1, 1));
        assert!(store.record_answer_feedback(Uuid::new_v4(), true).await.unwrap().is_none());
    }
}
