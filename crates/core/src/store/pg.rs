use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use super::{StoreError, SupportStore, TicketInsert};
use crate::types::{
    AnswerRecord, Category, CorpusEntry, CorpusOrigin, Priority, Question, Ticket, TicketStatus,
    Tier,
};

const TICKET_COLUMNS: &str = "id, external_id, question_id, title, description, category, priority, status, \
     assignee, requester, dedup_key, technician_name, technician_email, solution, created_at, resolved_at";

/// Postgres-backed store. Each trait method is one statement or one transaction.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn fetch_tickets(&self, filter: &str) -> Result<Vec<Ticket>, StoreError> {
        let rows: Vec<TicketRow> = sqlx::query_as(&format!(
            "SELECT {TICKET_COLUMNS} FROM ticket {filter} ORDER BY created_at ASC"
        ))
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Ticket::try_from).collect()
    }
}

#[async_trait]
impl SupportStore for PgStore {
    async fn insert_question(&self, question: &Question) -> Result<(), StoreError> {
        insert_question(&self.pool, question).await
    }

    async fn insert_ticket(
        &self,
        question: Option<&Question>,
        ticket: Ticket,
        dedup: bool,
    ) -> Result<TicketInsert, StoreError> {
        let mut tx = self.pool.begin().await?;

        if let Some(question) = question {
            insert_question(&mut *tx, question).await?;
        }

        if dedup {
            // Serializes concurrent escalations of the same question.
            sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
                .bind(&ticket.dedup_key)
                .execute(&mut *tx)
                .await?;
            let existing: Option<TicketRow> = sqlx::query_as(&format!(
                "SELECT {TICKET_COLUMNS} FROM ticket \
                 WHERE dedup_key = $1 AND status IN ('new', 'in_progress') \
                 ORDER BY created_at ASC LIMIT 1"
            ))
            .bind(&ticket.dedup_key)
            .fetch_optional(&mut *tx)
            .await?;
            if let Some(row) = existing {
                tx.commit().await?;
                return Ok(TicketInsert::Existing(row.try_into()?));
            }
        }

        sqlx::query(&format!(
            "INSERT INTO ticket ({TICKET_COLUMNS}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)"
        ))
        .bind(ticket.id)
        .bind(&ticket.external_id)
        .bind(ticket.question_id)
        .bind(&ticket.title)
        .bind(&ticket.description)
        .bind(ticket.category.label())
        .bind(ticket.priority.label())
        .bind(ticket.status.as_db_str())
        .bind(&ticket.assignee)
        .bind(&ticket.requester)
        .bind(&ticket.dedup_key)
        .bind(&ticket.technician_name)
        .bind(&ticket.technician_email)
        .bind(&ticket.solution)
        .bind(ticket.created_at)
        .bind(ticket.resolved_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(TicketInsert::Created(ticket))
    }

    async fn set_external_id(&self, id: Uuid, external_id: &str) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE ticket SET external_id = $1 WHERE id = $2")
            .bind(external_id)
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::Conflict(format!("ticket {id} does not exist")));
        }
        Ok(())
    }

    async fn find_open_ticket(&self, dedup_key: &str) -> Result<Option<Ticket>, StoreError> {
        let row: Option<TicketRow> = sqlx::query_as(&format!(
            "SELECT {TICKET_COLUMNS} FROM ticket \
             WHERE dedup_key = $1 AND status IN ('new', 'in_progress') \
             ORDER BY created_at ASC LIMIT 1"
        ))
        .bind(dedup_key)
        .fetch_optional(&self.pool)
        .await?;
        row.map(Ticket::try_from).transpose()
    }

    async fn ticket(&self, id: Uuid) -> Result<Option<Ticket>, StoreError> {
        let row: Option<TicketRow> =
            sqlx::query_as(&format!("SELECT {TICKET_COLUMNS} FROM ticket WHERE id = $1"))
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        row.map(Ticket::try_from).transpose()
    }

    async fn list_tickets(&self) -> Result<Vec<Ticket>, StoreError> {
        self.fetch_tickets("").await
    }

    async fn open_mirrored_tickets(&self) -> Result<Vec<Ticket>, StoreError> {
        self.fetch_tickets("WHERE external_id IS NOT NULL AND status IN ('new', 'in_progress')")
            .await
    }

    async fn update_ticket_status(
        &self,
        id: Uuid,
        from: TicketStatus,
        to: TicketStatus,
    ) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE ticket SET status = $1 WHERE id = $2 AND status = $3")
            .bind(to.as_db_str())
            .bind(id)
            .bind(from.as_db_str())
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::Conflict(format!("ticket {id} is not {}", from.as_db_str())));
        }
        Ok(())
    }

    async fn validated_corpus(&self) -> Result<Vec<CorpusEntry>, StoreError> {
        let rows: Vec<CorpusRow> = sqlx::query_as(
            "SELECT id, question_text, answer_text, embedding, question_embedding, answer_embedding, \
             validated, created_from, question_id, ticket_id, created_at \
             FROM corpus_entry WHERE validated ORDER BY created_at ASC",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(CorpusEntry::try_from).collect()
    }

    async fn insert_corpus_entry(&self, entry: &CorpusEntry) -> Result<(), StoreError> {
        insert_corpus(&self.pool, entry).await
    }

    async fn commit_resolution(
        &self,
        ticket: &Ticket,
        expected: TicketStatus,
        entry: &CorpusEntry,
    ) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            "UPDATE ticket SET status = $1, technician_name = $2, technician_email = $3, \
             solution = $4, resolved_at = $5 WHERE id = $6 AND status = $7",
        )
        .bind(ticket.status.as_db_str())
        .bind(&ticket.technician_name)
        .bind(&ticket.technician_email)
        .bind(&ticket.solution)
        .bind(ticket.resolved_at)
        .bind(ticket.id)
        .bind(expected.as_db_str())
        .execute(&mut *tx)
        .await?;
        if result.rows_affected() == 0 {
            // Dropping the transaction rolls it back.
            return Err(StoreError::Conflict(format!(
                "ticket {} is not {}",
                ticket.id,
                expected.as_db_str()
            )));
        }

        insert_corpus(&mut *tx, entry).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn insert_answer(&self, answer: &AnswerRecord) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO answer (id, question_id, text, tier, validity, resolution_count, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(answer.id)
        .bind(answer.question_id)
        .bind(&answer.text)
        .bind(answer.tier.as_str())
        .bind(answer.validity)
        .bind(answer.resolution_count)
        .bind(answer.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn record_answer_feedback(
        &self,
        id: Uuid,
        is_valid: bool,
    ) -> Result<Option<AnswerRecord>, StoreError> {
        let row: Option<AnswerRow> = sqlx::query_as(
            "UPDATE answer SET \
             validity = CASE WHEN $2 THEN 1 ELSE -1 END, \
             resolution_count = resolution_count + CASE WHEN $2 THEN 1 ELSE 0 END \
             WHERE id = $1 \
             RETURNING id, question_id, text, tier, validity, resolution_count, created_at",
        )
        .bind(id)
        .bind(is_valid)
        .fetch_optional(&self.pool)
        .await?;
        row.map(AnswerRecord::try_from).transpose()
    }
}

async fn insert_question<'e, E>(executor: E, question: &Question) -> Result<(), StoreError>
where
    E: sqlx::PgExecutor<'e>,
{
    sqlx::query("INSERT INTO question (id, asker_id, text, created_at) VALUES ($1, $2, $3, $4)")
        .bind(question.id)
        .bind(&question.asker_id)
        .bind(&question.text)
        .bind(question.created_at)
        .execute(executor)
        .await?;
    Ok(())
}

async fn insert_corpus<'e, E>(executor: E, entry: &CorpusEntry) -> Result<(), StoreError>
where
    E: sqlx::PgExecutor<'e>,
{
    sqlx::query(
        "INSERT INTO corpus_entry (id, question_text, answer_text, embedding, question_embedding, \
         answer_embedding, validated, created_from, question_id, ticket_id, created_at) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)",
    )
    .bind(entry.id)
    .bind(&entry.question_text)
    .bind(&entry.answer_text)
    .bind(&entry.embedding)
    .bind(&entry.question_embedding)
    .bind(&entry.answer_embedding)
    .bind(entry.validated)
    .bind(entry.created_from.as_db_str())
    .bind(entry.question_id)
    .bind(entry.ticket_id)
    .bind(entry.created_at)
    .execute(executor)
    .await?;
    Ok(())
}

// ── Row types ──────────────────────────────────────────────────

#[derive(sqlx::FromRow)]
struct TicketRow {
    id: Uuid,
    external_id: Option<String>,
    question_id: Option<Uuid>,
    title: String,
    description: String,
    category: String,
    priority: String,
    status: String,
    assignee: String,
    requester: Option<String>,
    dedup_key: String,
    technician_name: Option<String>,
    technician_email: Option<String>,
    solution: Option<String>,
    created_at: chrono::DateTime<chrono::Utc>,
    resolved_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl TryFrom<TicketRow> for Ticket {
    type Error = StoreError;

    fn try_from(row: TicketRow) -> Result<Self, StoreError> {
        let corrupt = |field: &str, value: &str| {
            StoreError::Corrupt(format!("ticket {}: bad {field} {value:?}", row.id))
        };
        let category = Category::from_label(&row.category).ok_or_else(|| corrupt("category", &row.category))?;
        let priority = Priority::from_label(&row.priority).ok_or_else(|| corrupt("priority", &row.priority))?;
        let status = TicketStatus::from_db(&row.status).ok_or_else(|| corrupt("status", &row.status))?;
        Ok(Self {
            id: row.id,
            external_id: row.external_id,
            question_id: row.question_id,
            title: row.title,
            description: row.description,
            category,
            priority,
            status,
            assignee: row.assignee,
            requester: row.requester,
            dedup_key: row.dedup_key,
            technician_name: row.technician_name,
            technician_email: row.technician_email,
            solution: row.solution,
            created_at: row.created_at,
            resolved_at: row.resolved_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct CorpusRow {
    id: Uuid,
    question_text: String,
    answer_text: String,
    embedding: Vec<f32>,
    question_embedding: Vec<f32>,
    answer_embedding: Vec<f32>,
    validated: bool,
    created_from: String,
    question_id: Option<Uuid>,
    ticket_id: Option<Uuid>,
    created_at: chrono::DateTime<chrono::Utc>,
}

impl TryFrom<CorpusRow> for CorpusEntry {
    type Error = StoreError;

    fn try_from(row: CorpusRow) -> Result<Self, StoreError> {
        let created_from = CorpusOrigin::from_db(&row.created_from).ok_or_else(|| {
            StoreError::Corrupt(format!("corpus entry {}: bad origin {:?}", row.id, row.created_from))
        })?;
        Ok(Self {
            id: row.id,
            question_text: row.question_text,
            answer_text: row.answer_text,
            embedding: row.embedding,
            question_embedding: row.question_embedding,
            answer_embedding: row.answer_embedding,
            validated: row.validated,
            created_from,
            question_id: row.question_id,
            ticket_id: row.ticket_id,
            created_at: row.created_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct AnswerRow {
    id: Uuid,
    question_id: Uuid,
    text: String,
    tier: String,
    validity: i32,
    resolution_count: i32,
    created_at: chrono::DateTime<chrono::Utc>,
}

impl TryFrom<AnswerRow> for AnswerRecord {
    type Error = StoreError;

    fn try_from(row: AnswerRow) -> Result<Self, StoreError> {
        let tier = Tier::from_db(&row.tier)
            .ok_or_else(|| StoreError::Corrupt(format!("answer {}: bad tier {:?}", row.id, row.tier)))?;
        Ok(Self {
            id: row.id,
            question_id: row.question_id,
            text: row.text,
            tier,
            validity: row.validity,
            resolution_count: row.resolution_count,
            created_at: row.created_at,
        })
    }
}
