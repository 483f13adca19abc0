use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::warn;

use drill_core::model::AnswerDetail;
use storage::repository::{HistoryRepository, HistoryRow};

use crate::error::SessionError;

/// Storage identifier for a persisted history record.
///
/// NOTE: This is `i64` to match `SQLite` row IDs.
pub type HistoryRecordId = i64;

/// Presentation-agnostic list item for one saved session.
///
/// No pre-formatted strings; the UI decides how to show timestamps and
/// percentages.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryListItem {
    pub id: HistoryRecordId,
    pub student_name: String,
    pub completed_at: DateTime<Utc>,
    pub elapsed_seconds: i64,

    pub total: u32,
    pub correct: u32,
    /// Unrounded, in `0.0..=100.0`.
    pub accuracy_percent: f64,
}

impl HistoryListItem {
    #[must_use]
    pub fn from_row(row: &HistoryRow) -> Self {
        let record = &row.record;
        Self {
            id: row.id,
            student_name: record.student_name().to_owned(),
            completed_at: record.completed_at(),
            elapsed_seconds: record.elapsed_seconds(),
            total: record.total_questions(),
            correct: record.score(),
            accuracy_percent: record.accuracy_percent(),
        }
    }
}

/// Aggregate over the sessions in one listing.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HistorySummary {
    pub sessions: usize,
    /// Mean of the per-session accuracy percentages; `None` when empty.
    pub mean_accuracy_percent: Option<f64>,
}

impl HistorySummary {
    #[must_use]
    pub fn from_items(items: &[HistoryListItem]) -> Self {
        let mean_accuracy_percent = if items.is_empty() {
            None
        } else {
            let sum: f64 = items.iter().map(|item| item.accuracy_percent).sum();
            let count = u32::try_from(items.len()).unwrap_or(u32::MAX);
            Some(sum / f64::from(count))
        };
        Self {
            sessions: items.len(),
            mean_accuracy_percent,
        }
    }
}

/// One history page: newest-first items, their summary, and how many stored
/// rows could not be read.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryListing {
    pub items: Vec<HistoryListItem>,
    pub summary: HistorySummary,
    pub skipped: usize,
}

/// A saved session with its per-question breakdown.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryDetail {
    pub item: HistoryListItem,
    pub answers: Vec<AnswerDetail>,
}

/// Read-side facade over saved practice history.
#[derive(Clone)]
pub struct HistoryService {
    history: Arc<dyn HistoryRepository>,
}

impl HistoryService {
    #[must_use]
    pub fn new(history: Arc<dyn HistoryRepository>) -> Self {
        Self { history }
    }

    async fn load(
        &self,
        name_filter: Option<&str>,
    ) -> Result<(Vec<HistoryRow>, usize), SessionError> {
        let load = self.history.load_sessions(name_filter).await?;
        for skipped in &load.skipped {
            warn!(
                row_id = skipped.id,
                error = %skipped.error,
                "skipping unreadable history row"
            );
        }
        Ok((load.rows, load.skipped.len()))
    }

    /// List saved sessions newest first, optionally filtered by student name.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Storage` if the repository cannot be read.
    pub async fn list(&self, name_filter: Option<&str>) -> Result<HistoryListing, SessionError> {
        let (rows, skipped) = self.load(name_filter).await?;
        let items: Vec<HistoryListItem> = rows.iter().map(HistoryListItem::from_row).collect();
        Ok(HistoryListing {
            summary: HistorySummary::from_items(&items),
            items,
            skipped,
        })
    }

    /// Fetch one saved session with its per-question breakdown.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Storage` if the repository cannot be read.
    pub async fn details(
        &self,
        id: HistoryRecordId,
    ) -> Result<Option<HistoryDetail>, SessionError> {
        let (rows, _) = self.load(None).await?;
        Ok(rows.into_iter().find(|row| row.id == id).map(|row| HistoryDetail {
            item: HistoryListItem::from_row(&row),
            answers: row.record.details().to_vec(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use drill_core::model::{HistoryRecord, SessionResult};
    use drill_core::time::fixed_now;
    use storage::repository::InMemoryRepository;

    fn record(name: &str, correct: &[bool]) -> HistoryRecord {
        let now = fixed_now();
        let details = correct
            .iter()
            .map(|ok| AnswerDetail::new("2 × 3", if *ok { 6 } else { 5 }, 6))
            .collect();
        let result =
            SessionResult::from_details(name, now, now + Duration::seconds(90), details).unwrap();
        HistoryRecord::from_result(&result)
    }

    #[test]
    fn list_item_is_presentation_agnostic() {
        let row = HistoryRow::new(42, record("Lin", &[true, false, true, true]));
        let item = HistoryListItem::from_row(&row);

        assert_eq!(item.id, 42);
        assert_eq!(item.student_name, "Lin");
        assert_eq!(item.total, 4);
        assert_eq!(item.correct, 3);
        assert_eq!(item.accuracy_percent, 75.0);
        assert_eq!(item.elapsed_seconds, 90);
    }

    #[test]
    fn summary_averages_session_accuracy() {
        let items: Vec<_> = [
            record("Lin", &[true, true]),
            record("Lin", &[true, false, false, false]),
        ]
        .into_iter()
        .enumerate()
        .map(|(i, r)| {
            let id = i64::try_from(i).unwrap();
            HistoryListItem::from_row(&HistoryRow::new(id, r))
        })
        .collect();

        let summary = HistorySummary::from_items(&items);
        assert_eq!(summary.sessions, 2);
        assert_eq!(summary.mean_accuracy_percent, Some(62.5));

        let empty = HistorySummary::from_items(&[]);
        assert_eq!(empty.sessions, 0);
        assert_eq!(empty.mean_accuracy_percent, None);
    }

    #[tokio::test]
    async fn list_filters_by_name_and_fetches_details() {
        let repo = InMemoryRepository::new();
        let lin = repo.save_session(&record("Lin", &[true, true])).await.unwrap();
        repo.save_session(&record("Sam", &[false])).await.unwrap();

        let svc = HistoryService::new(Arc::new(repo));
        let all = svc.list(None).await.unwrap();
        assert_eq!(all.items.len(), 2);
        assert_eq!(all.summary.mean_accuracy_percent, Some(50.0));
        assert_eq!(all.skipped, 0);

        let lins = svc.list(Some("lin")).await.unwrap();
        assert_eq!(lins.items.len(), 1);
        assert_eq!(lins.items[0].id, lin);
        assert_eq!(lins.summary.sessions, 1);

        let detail = svc.details(lin).await.unwrap().unwrap();
        assert_eq!(detail.item.student_name, "Lin");
        assert_eq!(detail.answers.len(), 2);
        assert!(detail.answers.iter().all(|d| d.is_correct));
        assert!(svc.details(999).await.unwrap().is_none());
    }
}
