//! Consultation log: visits to practitioners, with notes and an
//! optional voice memo.
//!
//! The memo can arrive with the entry or be recorded afterwards; either
//! way the audio is uploaded before `audio_path` is written. Playback
//! goes through a short-lived signed URL.

use serde_json::json;
use uuid::Uuid;

use crate::attachments::{self, Attachment, SIGNED_URL_TTL_SECS};
use crate::backend::{decode_row, Backend, BackendError, SelectQuery};
use crate::core::ServiceError;
use crate::live::LiveTable;
use crate::models::{Consultation, ConsultationInput};
use std::sync::Arc;

pub const TABLE: &str = "consultations";
pub const BUCKET: &str = "consultation-audio";

/// Create a consultation entry, uploading its voice memo first when one
/// was recorded.
pub async fn create_consultation(
    backend: &dyn Backend,
    input: ConsultationInput,
    memo: Option<Attachment>,
) -> Result<Consultation, ServiceError> {
    let user = backend.current_user().await?;

    let audio_path = match memo {
        Some(memo) => Some(upload_memo(backend, user.id, memo).await?),
        None => None,
    };

    let row = json!({
        "user_id": user.id,
        "practitioner": input.practitioner,
        "specialty": input.specialty,
        "consultation_date": input.consultation_date,
        "notes": input.notes,
        "audio_path": audio_path,
    });
    let stored = backend.insert_row(TABLE, row).await?;
    Ok(decode_row(stored)?)
}

/// Attach a voice memo to an existing entry, replacing any previous one.
/// The old object stays in the bucket.
pub async fn attach_voice_memo(
    backend: &dyn Backend,
    id: Uuid,
    memo: Attachment,
) -> Result<Consultation, ServiceError> {
    let user = backend.current_user().await?;
    let key = upload_memo(backend, user.id, memo).await?;
    let updated = backend
        .update_row(TABLE, id, json!({ "audio_path": key }))
        .await?;
    Ok(decode_row(updated)?)
}

/// Edit an entry's descriptive fields. The memo, if any, is untouched.
pub async fn update_consultation(
    backend: &dyn Backend,
    id: Uuid,
    input: ConsultationInput,
) -> Result<Consultation, ServiceError> {
    let patch = json!({
        "practitioner": input.practitioner,
        "specialty": input.specialty,
        "consultation_date": input.consultation_date,
        "notes": input.notes,
    });
    let updated = backend.update_row(TABLE, id, patch).await?;
    Ok(decode_row(updated)?)
}

pub async fn delete_consultation(backend: &dyn Backend, id: Uuid) -> Result<(), ServiceError> {
    backend.delete_row(TABLE, id).await?;
    Ok(())
}

pub async fn fetch_consultation(
    backend: &dyn Backend,
    id: Uuid,
) -> Result<Consultation, ServiceError> {
    let rows = backend
        .select_rows(TABLE, SelectQuery::new().eq("id", id.to_string()))
        .await?;
    let row = rows
        .into_iter()
        .next()
        .ok_or_else(|| BackendError::RowNotFound {
            table: TABLE.to_string(),
            id,
        })?;
    Ok(decode_row(row)?)
}

/// The signed-in user's consultations, most recent visit first.
pub async fn list_consultations(backend: &dyn Backend) -> Result<Vec<Consultation>, ServiceError> {
    let user = backend.current_user().await?;
    let rows = backend.select_rows(TABLE, user_query(user.id)).await?;
    rows.into_iter().map(|row| Ok(decode_row(row)?)).collect()
}

/// Signed URL for playing an entry's voice memo, or `None` when none
/// was recorded.
pub async fn voice_memo_url(
    backend: &dyn Backend,
    consultation: &Consultation,
) -> Result<Option<String>, ServiceError> {
    match consultation.audio_path.as_deref() {
        Some(path) => Ok(Some(
            backend.signed_url(BUCKET, path, SIGNED_URL_TTL_SECS).await?,
        )),
        None => Ok(None),
    }
}

/// Self-refreshing consultation list for the signed-in user.
pub async fn live_consultations(
    backend: Arc<dyn Backend>,
) -> Result<LiveTable<Consultation>, ServiceError> {
    let user = backend.current_user().await?;
    Ok(LiveTable::open(backend, TABLE, user_query(user.id)).await?)
}

async fn upload_memo(
    backend: &dyn Backend,
    user_id: Uuid,
    memo: Attachment,
) -> Result<String, ServiceError> {
    let key = attachments::object_key(user_id, &memo.file_name);
    let content_type = memo.content_type();
    backend
        .upload_object(BUCKET, &key, memo.bytes, &content_type)
        .await?;
    Ok(key)
}

fn user_query(user_id: Uuid) -> SelectQuery {
    SelectQuery::new()
        .eq("user_id", user_id.to_string())
        .order_desc("consultation_date")
}

// ═══════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryBackend;
    use chrono::NaiveDate;

    fn backend() -> Arc<MemoryBackend> {
        Arc::new(MemoryBackend::signed_in())
    }

    fn visit_input() -> ConsultationInput {
        ConsultationInput {
            practitioner: "Dr Lefèvre".to_string(),
            specialty: Some("Cardiologie".to_string()),
            consultation_date: NaiveDate::from_ymd_opt(2024, 4, 2).unwrap(),
            notes: Some("Tension correcte".to_string()),
        }
    }

    #[tokio::test]
    async fn create_with_a_memo_uploads_the_audio_first() {
        let backend = backend();
        let memo = Attachment::new("memo.m4a", vec![1, 2, 3, 4]);

        let visit = create_consultation(backend.as_ref(), visit_input(), Some(memo))
            .await
            .unwrap();

        let path = visit.audio_path.as_deref().expect("audio_path set");
        assert_eq!(backend.object(BUCKET, path), Some(vec![1, 2, 3, 4]));
        let content_type = backend.object_content_type(BUCKET, path).unwrap();
        assert!(content_type.starts_with("audio/"), "{content_type}");
    }

    #[tokio::test]
    async fn memo_recorded_after_the_fact_replaces_the_path() {
        let backend = backend();
        let visit = create_consultation(backend.as_ref(), visit_input(), None)
            .await
            .unwrap();
        assert!(visit.audio_path.is_none());

        let updated = attach_voice_memo(
            backend.as_ref(),
            visit.id,
            Attachment::new("memo.m4a", vec![9, 9]),
        )
        .await
        .unwrap();

        let path = updated.audio_path.as_deref().unwrap();
        assert_eq!(backend.object(BUCKET, path), Some(vec![9, 9]));
    }

    #[tokio::test]
    async fn memo_url_is_none_without_a_recording() {
        let backend = backend();
        let visit = create_consultation(backend.as_ref(), visit_input(), None)
            .await
            .unwrap();
        assert_eq!(
            voice_memo_url(backend.as_ref(), &visit).await.unwrap(),
            None
        );
    }

    #[tokio::test]
    async fn memo_url_signs_the_stored_key() {
        let backend = backend();
        let visit = create_consultation(
            backend.as_ref(),
            visit_input(),
            Some(Attachment::new("memo.m4a", vec![0])),
        )
        .await
        .unwrap();

        let url = voice_memo_url(backend.as_ref(), &visit)
            .await
            .unwrap()
            .expect("signed url");
        assert!(url.contains(visit.audio_path.as_deref().unwrap()));
    }

    #[tokio::test]
    async fn list_is_ordered_by_visit_date_desc() {
        let backend = backend();
        for (practitioner, date) in [
            ("Dr Morel", "2024-01-15"),
            ("Dr Lefèvre", "2024-04-02"),
            ("Dr Haddad", "2024-02-28"),
        ] {
            let mut input = visit_input();
            input.practitioner = practitioner.to_string();
            input.consultation_date = date.parse().unwrap();
            create_consultation(backend.as_ref(), input, None)
                .await
                .unwrap();
        }

        let listed = list_consultations(backend.as_ref()).await.unwrap();
        let names: Vec<&str> = listed.iter().map(|c| c.practitioner.as_str()).collect();
        assert_eq!(names, ["Dr Lefèvre", "Dr Haddad", "Dr Morel"]);
    }

    #[tokio::test]
    async fn update_keeps_the_existing_memo() {
        let backend = backend();
        let visit = create_consultation(
            backend.as_ref(),
            visit_input(),
            Some(Attachment::new("memo.m4a", vec![7])),
        )
        .await
        .unwrap();
        let path = visit.audio_path.clone();

        let mut input = visit_input();
        input.notes = Some("Prochain rendez-vous en juin".to_string());
        let updated = update_consultation(backend.as_ref(), visit.id, input)
            .await
            .unwrap();

        assert_eq!(updated.audio_path, path);
        assert_eq!(
            updated.notes.as_deref(),
            Some("Prochain rendez-vous en juin")
        );
    }

    #[tokio::test]
    async fn delete_removes_the_row() {
        let backend = backend();
        let visit = create_consultation(backend.as_ref(), visit_input(), None)
            .await
            .unwrap();
        delete_consultation(backend.as_ref(), visit.id)
            .await
            .unwrap();
        assert!(backend.rows(TABLE).is_empty());
    }
}
