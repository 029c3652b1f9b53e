use chrono::Utc;
use uuid::Uuid;

use crate::error::DeskError;
use crate::store::SupportStore;
use crate::types::{AnswerRecord, Question, Tier};

/// Store the answer shown for a question, with no verdict yet.
pub async fn record_answer(
    store: &dyn SupportStore,
    question: &Question,
    text: &str,
    tier: Tier,
) -> Result<AnswerRecord, DeskError> {
    let record = AnswerRecord {
        id: Uuid::new_v4(),
        question_id: question.id,
        text: text.to_owned(),
        tier,
        validity: 0,
        resolution_count: 0,
        created_at: Utc::now(),
    };
    store.insert_answer(&record).await?;
    Ok(record)
}

/// Helpful sets validity to 1 and bumps the resolution count; not helpful sets -1.
pub async fn submit_feedback(
    store: &dyn SupportStore,
    answer_id: Uuid,
    is_valid: bool,
) -> Result<AnswerRecord, DeskError> {
    let record = store
        .record_answer_feedback(answer_id, is_valid)
        .await?
        .ok_or(DeskError::AnswerNotFound(answer_id))?;
    tracing::info!(answer = %answer_id, is_valid, resolution_count = record.resolution_count, "answer feedback recorded");
    Ok(record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    #[tokio::test]
    async fn votes_update_the_record() {
        let store = MemoryStore::new();
        let q = Question::new("jdoe", "vpn");
        let rec = record_answer(&store, &q, "relancer", Tier::Local).await.unwrap();
        assert_eq!(rec.validity, 0);

        let up = submit_feedback(&store, rec.id, true).await.unwrap();
        assert_eq!((up.validity, up.resolution_count), (1, 1));
        let down = submit_feedback(&store, rec.id, false).await.unwrap();
        assert_eq!((down.validity, down.resolution_count), (-1, 1));
    }

    #[tokio::test]
    async fn unknown_answer_is_not_found() {
        let store = MemoryStore::new();
        let err = submit_feedback(&store, Uuid::new_v4(), true).await.unwrap_err();
        assert!(matches!(err, DeskError::AnswerNotFound(_)));
    }
}
