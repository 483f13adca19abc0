use drill_core::model::HistoryRecord;
use sqlx::Row;

use super::SqliteRepository;
use super::mapping::{details_to_json, map_history_row, ser};
use crate::repository::{HistoryLoad, HistoryRepository, SkippedRow, StorageError, name_matches};

#[async_trait::async_trait]
impl HistoryRepository for SqliteRepository {
    async fn save_session(&self, record: &HistoryRecord) -> Result<i64, StorageError> {
        let details_json = details_to_json(record.details())?;

        let res = sqlx::query(
            r"
                INSERT INTO practice_sessions (
                    student_name, started_at, completed_at, elapsed_seconds,
                    total_questions, correct_count, accuracy, details_json
                )
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            ",
        )
        .bind(record.student_name())
        .bind(record.started_at())
        .bind(record.completed_at())
        .bind(record.elapsed_seconds())
        .bind(i64::from(record.total_questions()))
        .bind(i64::from(record.score()))
        .bind(record.accuracy())
        .bind(details_json)
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        Ok(res.last_insert_rowid())
    }

    async fn load_sessions(&self, name_filter: Option<&str>) -> Result<HistoryLoad, StorageError> {
        let rows = sqlx::query(
            r"
                SELECT
                    id, student_name, started_at, completed_at,
                    total_questions, correct_count, details_json
                FROM practice_sessions
                ORDER BY completed_at DESC, id DESC
            ",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        let mut out = HistoryLoad::default();
        for row in rows {
            match map_history_row(&row) {
                Ok(history) => {
                    if name_matches(history.record.student_name(), name_filter) {
                        out.rows.push(history);
                    }
                }
                Err(error) => {
                    let id = row.try_get::<i64, _>("id").map_err(ser)?;
                    out.skipped.push(SkippedRow { id, error });
                }
            }
        }

        Ok(out)
    }
}
