use std::path::PathBuf;

use serde::Serialize;
use tokio::sync::broadcast;

use crate::batch::state::WorkStatus;
use crate::errors::{FailureSnapshot, WorkError};
use crate::executor::outcome::{ActionOutcome, StrategyKind};

/// Observability stream for dashboards, metrics and logs. Publishing never
/// blocks and never fails the caller.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum AutomationEvent {
    ActionAttempted {
        action: String,
        kind: String,
        strategy: StrategyKind,
        /// 1-based pass number.
        attempt: u32,
        success: bool,
        reason: Option<String>,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
    ActionCompleted {
        action: String,
        kind: String,
        outcome: ActionOutcome,
        snapshot: Option<SnapshotRef>,
    },
    ItemCompleted {
        run_id: String,
        index: usize,
        item_id: String,
        label: String,
        status: WorkStatus,
        error: Option<WorkError>,
        duration_ms: Option<u64>,
        attempts: u32,
    },
    ChunkCompleted {
        run_id: String,
        chunk: usize,
        chunk_len: usize,
        processed: usize,
        failed: usize,
        total: usize,
    },
    BatchAborted {
        run_id: String,
        failure_rate: f64,
        threshold: f64,
        skipped: usize,
    },
}

/// Where a failure snapshot can be found: on disk, or inline when it was
/// not persisted.
#[derive(Debug, Clone, Serialize)]
pub struct SnapshotRef {
    pub path: Option<PathBuf>,
    pub base64: Option<String>,
}

impl From<&FailureSnapshot> for SnapshotRef {
    fn from(snapshot: &FailureSnapshot) -> Self {
        match &snapshot.path {
            Some(path) => Self {
                path: Some(path.clone()),
                base64: None,
            },
            None => Self {
                path: None,
                base64: Some(snapshot.image.to_base64()),
            },
        }
    }
}

#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<AutomationEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AutomationEvent> {
        self.tx.subscribe()
    }

    /// Fire-and-forget. Having no subscribers is not an error.
    pub fn emit(&self, event: AutomationEvent) {
        if self.tx.send(event).is_err() {
            tracing::trace!("event dropped, no subscribers");
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
