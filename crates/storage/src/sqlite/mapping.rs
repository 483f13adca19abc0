use drill_core::model::{AnswerDetail, HistoryRecord};
use sqlx::Row;

use crate::repository::{HistoryRow, StorageError};

pub(crate) fn ser<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Serialization(e.to_string())
}

pub(crate) fn u32_from_i64(field: &'static str, v: i64) -> Result<u32, StorageError> {
    u32::try_from(v).map_err(|_| StorageError::Serialization(format!("invalid {field}: {v}")))
}

pub(crate) fn details_to_json(details: &[AnswerDetail]) -> Result<String, StorageError> {
    serde_json::to_string(details).map_err(ser)
}

pub(crate) fn details_from_json(raw: &str) -> Result<Vec<AnswerDetail>, StorageError> {
    serde_json::from_str(raw).map_err(ser)
}

/// Decode a `practice_sessions` row. The stored `accuracy` column is not read
/// back; the record derives it from the counts.
pub(crate) fn map_history_row(row: &sqlx::sqlite::SqliteRow) -> Result<HistoryRow, StorageError> {
    let id: i64 = row.try_get("id").map_err(ser)?;
    let student_name: String = row.try_get("student_name").map_err(ser)?;
    let started_at = row.try_get("started_at").map_err(ser)?;
    let completed_at = row.try_get("completed_at").map_err(ser)?;
    let total_questions = u32_from_i64(
        "total_questions",
        row.try_get::<i64, _>("total_questions").map_err(ser)?,
    )?;
    let correct_count = u32_from_i64(
        "correct_count",
        row.try_get::<i64, _>("correct_count").map_err(ser)?,
    )?;
    let details = details_from_json(&row.try_get::<String, _>("details_json").map_err(ser)?)?;

    let record = HistoryRecord::from_persisted(
        student_name,
        started_at,
        completed_at,
        total_questions,
        correct_count,
        details,
    )
    .map_err(ser)?;

    Ok(HistoryRow::new(id, record))
}
