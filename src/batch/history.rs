use serde::Serialize;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::batch::state::{WorkResult, WorkStatus};
use crate::errors::{InvsyncResult, WorkError};

#[derive(Debug, Clone, Serialize)]
pub struct JournalEntry {
    pub run_id: String,
    pub index: usize,
    pub item_id: String,
    pub label: String,
    pub status: WorkStatus,
    pub error: Option<WorkError>,
    pub duration_ms: Option<u64>,
    pub attempts: u32,
    pub ts: chrono::DateTime<chrono::Utc>,
}

impl JournalEntry {
    pub fn from_result<T>(run_id: &str, result: &WorkResult<T>) -> Self {
        Self {
            run_id: run_id.to_string(),
            index: result.index,
            item_id: result.item.id.clone(),
            label: result.item.label.clone(),
            status: result.status,
            error: result.error.clone(),
            duration_ms: result.duration.map(|d| d.as_millis() as u64),
            attempts: result.attempts,
            ts: result.finished_at,
        }
    }
}

/// Append-only JSONL record of one batch run, one line per terminal item.
pub struct BatchJournal {
    pub run_id: String,
    file_path: PathBuf,
}

impl BatchJournal {
    pub fn create(dir: &Path, run_id: &str) -> InvsyncResult<Self> {
        std::fs::create_dir_all(dir)?;
        Ok(Self {
            run_id: run_id.to_string(),
            file_path: dir.join(format!("batch_{run_id}.jsonl")),
        })
    }

    pub fn path(&self) -> &Path {
        &self.file_path
    }

    pub fn append<T>(&self, result: &WorkResult<T>) -> InvsyncResult<()> {
        let line = serde_json::to_string(&JournalEntry::from_result(&self.run_id, result))?;
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.file_path)?;
        writeln!(file, "{}", line)?;
        tracing::debug!(
            path = %self.file_path.display(),
            item = %result.item.id,
            "journal entry appended"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::state::WorkItem;
    use std::time::Duration;

    #[test]
    fn appends_one_line_per_result() {
        let tmp = tempfile::tempdir().unwrap();
        let journal = BatchJournal::create(&tmp.path().join("journal"), "run-1").unwrap();

        let done = WorkResult {
            item: WorkItem::new("VIN123", "2021 Civic", ()),
            index: 0,
            status: WorkStatus::Success,
            error: None,
            duration: Some(Duration::from_millis(42)),
            attempts: 1,
            finished_at: chrono::Utc::now(),
        };
        let skipped = WorkResult::skipped(
            WorkItem::new("VIN456", "2019 Accord", ()),
            1,
            WorkError::Aborted {
                failure_rate: 0.6,
                threshold: 0.5,
            },
        );
        journal.append(&done).unwrap();
        journal.append(&skipped).unwrap();

        let text = std::fs::read_to_string(journal.path()).unwrap();
        let lines: Vec<serde_json::Value> = text
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["status"], "success");
        assert_eq!(lines[0]["duration_ms"], 42);
        assert_eq!(lines[1]["status"], "skipped");
        assert_eq!(lines[1]["error"]["kind"], "aborted");
        assert_eq!(lines[1]["run_id"], "run-1");
    }
}
