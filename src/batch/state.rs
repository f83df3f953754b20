use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::WorkError;

/// One unit of caller work plus the fields used to report on it. The payload
/// is shared so retries can hand the caller a fresh clone of the item.
pub struct WorkItem<T> {
    pub id: String,
    pub label: String,
    pub payload: Arc<T>,
}

impl<T> WorkItem<T> {
    pub fn new(id: impl Into<String>, label: impl Into<String>, payload: T) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            payload: Arc::new(payload),
        }
    }

    pub fn payload(&self) -> &T {
        &self.payload
    }
}

impl<T> Clone for WorkItem<T> {
    fn clone(&self) -> Self {
        Self {
            id: self.id.clone(),
            label: self.label.clone(),
            payload: self.payload.clone(),
        }
    }
}

impl<T> fmt::Debug for WorkItem<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkItem")
            .field("id", &self.id)
            .field("label", &self.label)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkStatus {
    Success,
    Failed,
    Skipped,
}

#[derive(Debug, Clone)]
pub struct WorkResult<T> {
    pub item: WorkItem<T>,
    /// Position in the submitted list.
    pub index: usize,
    pub status: WorkStatus,
    pub error: Option<WorkError>,
    /// `None` for items that never started.
    pub duration: Option<Duration>,
    /// Calls made to the caller function.
    pub attempts: u32,
    pub finished_at: chrono::DateTime<chrono::Utc>,
}

impl<T> WorkResult<T> {
    pub fn skipped(item: WorkItem<T>, index: usize, error: WorkError) -> Self {
        Self {
            item,
            index,
            status: WorkStatus::Skipped,
            error: Some(error),
            duration: None,
            attempts: 0,
            finished_at: chrono::Utc::now(),
        }
    }
}

/// Every item's terminal result, in submission order.
#[derive(Debug, Clone)]
pub struct BatchResult<T> {
    pub run_id: String,
    pub results: Vec<WorkResult<T>>,
    pub total_duration: Duration,
    pub aborted: bool,
}

impl<T> BatchResult<T> {
    fn count(&self, status: WorkStatus) -> usize {
        self.results.iter().filter(|r| r.status == status).count()
    }

    pub fn total(&self) -> usize {
        self.results.len()
    }

    pub fn successes(&self) -> usize {
        self.count(WorkStatus::Success)
    }

    pub fn failures(&self) -> usize {
        self.count(WorkStatus::Failed)
    }

    pub fn skipped(&self) -> usize {
        self.count(WorkStatus::Skipped)
    }

    /// Successes over all items; 0.0 for an empty batch.
    pub fn success_rate(&self) -> f64 {
        if self.results.is_empty() {
            0.0
        } else {
            self.successes() as f64 / self.total() as f64
        }
    }

    /// Mean over items that actually ran.
    pub fn average_duration(&self) -> Option<Duration> {
        let ran: Vec<Duration> = self.results.iter().filter_map(|r| r.duration).collect();
        if ran.is_empty() {
            return None;
        }
        Some(ran.iter().sum::<Duration>() / ran.len() as u32)
    }

    pub fn by_status(&self, status: WorkStatus) -> impl Iterator<Item = &WorkResult<T>> {
        self.results.iter().filter(move |r| r.status == status)
    }
}
