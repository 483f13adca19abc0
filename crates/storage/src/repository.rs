use async_trait::async_trait;
use drill_core::model::HistoryRecord;
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// Errors surfaced by storage adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error("connection error: {0}")]
    Connection(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// A persisted history record with its storage id.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryRow {
    pub id: i64,
    pub record: HistoryRecord,
}

impl HistoryRow {
    #[must_use]
    pub fn new(id: i64, record: HistoryRecord) -> Self {
        Self { id, record }
    }
}

/// A stored row that could not be decoded.
#[derive(Debug)]
pub struct SkippedRow {
    pub id: i64,
    pub error: StorageError,
}

/// Result of a history load: decoded rows plus rows that were skipped.
#[derive(Debug, Default)]
pub struct HistoryLoad {
    pub rows: Vec<HistoryRow>,
    pub skipped: Vec<SkippedRow>,
}

/// Returns true when `name` matches the student-name filter.
///
/// Matching is a case-insensitive substring test on the trimmed filter; a
/// missing or blank filter matches every name.
#[must_use]
pub fn name_matches(name: &str, filter: Option<&str>) -> bool {
    let Some(filter) = filter.map(str::trim).filter(|f| !f.is_empty()) else {
        return true;
    };
    name.to_lowercase().contains(&filter.to_lowercase())
}

/// Repository contract for finished practice sessions.
#[async_trait]
pub trait HistoryRepository: Send + Sync {
    /// Append one finished session.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the record cannot be stored.
    async fn save_session(&self, record: &HistoryRecord) -> Result<i64, StorageError>;

    /// Load sessions newest first, optionally filtered by student name.
    ///
    /// Rows that cannot be decoded are reported in `HistoryLoad::skipped`
    /// instead of failing the whole load.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the store cannot be read.
    async fn load_sessions(&self, name_filter: Option<&str>) -> Result<HistoryLoad, StorageError>;
}

/// Simple in-memory repository implementation for testing and prototyping.
#[derive(Clone, Default)]
pub struct InMemoryRepository {
    sessions: Arc<Mutex<Vec<HistoryRow>>>,
}

impl InMemoryRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl HistoryRepository for InMemoryRepository {
    async fn save_session(&self, record: &HistoryRecord) -> Result<i64, StorageError> {
        let mut guard = self
            .sessions
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        let id = i64::try_from(guard.len())
            .map_err(|_| StorageError::Serialization("history id overflow".into()))?
            + 1;
        guard.push(HistoryRow::new(id, record.clone()));
        Ok(id)
    }

    async fn load_sessions(&self, name_filter: Option<&str>) -> Result<HistoryLoad, StorageError> {
        let guard = self
            .sessions
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        let mut rows: Vec<HistoryRow> = guard
            .iter()
            .filter(|row| name_matches(row.record.student_name(), name_filter))
            .cloned()
            .collect();
        rows.sort_by(|a, b| {
            b.record
                .completed_at()
                .cmp(&a.record.completed_at())
                .then(b.id.cmp(&a.id))
        });
        Ok(HistoryLoad {
            rows,
            skipped: Vec::new(),
        })
    }
}

/// Aggregates repositories behind trait objects for easy backend swapping.
#[derive(Clone)]
pub struct Storage {
    pub history: Arc<dyn HistoryRepository>,
}

impl Storage {
    #[must_use]
    pub fn in_memory() -> Self {
        let history: Arc<dyn HistoryRepository> = Arc::new(InMemoryRepository::new());
        Self { history }
    }
}
