use std::fmt::Display;
use std::future::Future;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Duration, Instant};

use futures_util::future::join_all;

use crate::backoff::{retry_with_backoff, RetryPolicy};
use crate::batch::history::BatchJournal;
use crate::batch::loop_control::ErrorMonitor;
use crate::batch::queue::WorkQueue;
use crate::batch::state::{BatchResult, WorkItem, WorkResult, WorkStatus};
use crate::config::{AppConfig, BatchConfig};
use crate::errors::WorkError;
use crate::event_bus::{AutomationEvent, EventBus};

#[derive(Debug, Clone, PartialEq)]
pub struct BatchOptions {
    pub max_concurrency: usize,
    pub batch_size: usize,
    pub per_item_timeout: Duration,
    pub error_threshold: f64,
    pub abort_on_error: bool,
    pub item_retry: RetryPolicy,
}

impl From<&BatchConfig> for BatchOptions {
    fn from(config: &BatchConfig) -> Self {
        Self {
            max_concurrency: config.max_concurrency,
            batch_size: config.batch_size,
            per_item_timeout: Duration::from_millis(config.per_item_timeout_ms),
            error_threshold: config.error_threshold,
            abort_on_error: config.abort_on_error,
            item_retry: config.item_retry.clone(),
        }
    }
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self::from(&BatchConfig::default())
    }
}

/// State for one `process` call. Nothing outlives the call.
struct Run {
    id: String,
    monitor: ErrorMonitor,
    journal: Option<BatchJournal>,
}

type Slot<T> = (usize, WorkItem<T>);

/// Drives work items through a caller function with a bounded pool of
/// cooperative workers, chunk by chunk.
pub struct BatchProcessor {
    options: BatchOptions,
    events: Option<EventBus>,
    journal_dir: Option<PathBuf>,
}

impl BatchProcessor {
    pub fn new(options: BatchOptions) -> Self {
        Self {
            options,
            events: None,
            journal_dir: None,
        }
    }

    /// Options from `[batch]`, journal from `[journal]`.
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            options: BatchOptions::from(&config.batch),
            events: None,
            journal_dir: config.journal.dir.clone(),
        }
    }

    pub fn with_event_bus(mut self, events: EventBus) -> Self {
        self.events = Some(events);
        self
    }

    pub fn with_journal(mut self, dir: impl Into<PathBuf>) -> Self {
        self.journal_dir = Some(dir.into());
        self
    }

    pub fn options(&self) -> &BatchOptions {
        &self.options
    }

    /// Process every item and return one result per item, in submission
    /// order. Item errors and timeouts are recorded, never returned.
    pub async fn process<T, F, Fut, E>(&self, items: Vec<WorkItem<T>>, f: F) -> BatchResult<T>
    where
        F: Fn(WorkItem<T>) -> Fut,
        Fut: Future<Output = Result<(), E>>,
        E: Display,
    {
        let started = Instant::now();
        let total = items.len();
        let run_id = uuid::Uuid::new_v4().to_string();
        let run = Run {
            journal: self.open_journal(&run_id),
            id: run_id,
            monitor: ErrorMonitor::new(total, self.options.error_threshold, self.options.abort_on_error),
        };
        let batch_size = self.options.batch_size.max(1);

        tracing::info!(
            run_id = %run.id,
            total,
            batch_size,
            max_concurrency = self.options.max_concurrency,
            "batch started"
        );

        let mut results: Vec<WorkResult<T>> = Vec::with_capacity(total);
        let mut pending = items.into_iter().enumerate();
        let mut chunk_index = 0usize;
        let mut skipped = 0usize;

        loop {
            let chunk: Vec<Slot<T>> = pending.by_ref().take(batch_size).collect();
            if chunk.is_empty() {
                break;
            }

            if run.monitor.is_aborted() {
                for (index, item) in chunk {
                    results.push(self.skip(&run, index, item));
                    skipped += 1;
                }
                continue;
            }

            let chunk_len = chunk.len();
            let pool = self.options.max_concurrency.max(1).min(chunk_len);
            let queue = WorkQueue::new(chunk);
            tracing::debug!(run_id = %run.id, chunk = chunk_index, chunk_len, pool, "chunk started");

            let workers = (0..pool).map(|worker| self.worker(worker, &queue, &f, &run));
            for finished in join_all(workers).await {
                results.extend(finished);
            }

            // Left behind when a worker stopped early.
            for (index, item) in queue.drain() {
                results.push(self.skip(&run, index, item));
                skipped += 1;
            }

            let aborted = run.monitor.check_chunk_boundary();
            tracing::info!(
                run_id = %run.id,
                chunk = chunk_index,
                processed = run.monitor.processed(),
                failed = run.monitor.failed(),
                aborted,
                "chunk completed"
            );
            self.emit(AutomationEvent::ChunkCompleted {
                run_id: run.id.clone(),
                chunk: chunk_index,
                chunk_len,
                processed: run.monitor.processed(),
                failed: run.monitor.failed(),
                total,
            });
            chunk_index += 1;
        }

        let aborted = run.monitor.is_aborted();
        if aborted {
            tracing::warn!(
                run_id = %run.id,
                failure_rate = run.monitor.failure_rate(),
                threshold = self.options.error_threshold,
                skipped,
                "batch aborted, error threshold exceeded"
            );
            self.emit(AutomationEvent::BatchAborted {
                run_id: run.id.clone(),
                failure_rate: run.monitor.failure_rate(),
                threshold: self.options.error_threshold,
                skipped,
            });
        }

        results.sort_by_key(|r| r.index);
        let batch = BatchResult {
            run_id: run.id,
            results,
            total_duration: started.elapsed(),
            aborted,
        };
        tracing::info!(
            run_id = %batch.run_id,
            successes = batch.successes(),
            failures = batch.failures(),
            skipped = batch.skipped(),
            success_rate = batch.success_rate(),
            elapsed_ms = batch.total_duration.as_millis() as u64,
            "batch finished"
        );
        batch
    }

    /// Claim items one at a time until the queue is empty or the run aborts.
    async fn worker<T, F, Fut, E>(
        &self,
        worker: usize,
        queue: &WorkQueue<Slot<T>>,
        f: &F,
        run: &Run,
    ) -> Vec<WorkResult<T>>
    where
        F: Fn(WorkItem<T>) -> Fut,
        Fut: Future<Output = Result<(), E>>,
        E: Display,
    {
        let mut done = Vec::new();
        while !run.monitor.should_stop_early() {
            let Some((index, item)) = queue.pop() else {
                break;
            };
            tracing::debug!(run_id = %run.id, worker, item = %item.id, "item claimed");
            let result = self.process_item(index, item, f).await;
            run.monitor.record(result.status);
            self.report(run, &result);
            done.push(result);
        }
        done
    }

    /// The timeout covers every retry and backoff wait of the item.
    async fn process_item<T, F, Fut, E>(&self, index: usize, item: WorkItem<T>, f: &F) -> WorkResult<T>
    where
        F: Fn(WorkItem<T>) -> Fut,
        Fut: Future<Output = Result<(), E>>,
        E: Display,
    {
        let started = Instant::now();
        let attempts = AtomicU32::new(0);
        let timeout = self.options.per_item_timeout;

        let outcome = tokio::time::timeout(
            timeout,
            retry_with_backoff(
                &self.options.item_retry,
                |_| {
                    attempts.fetch_add(1, Ordering::SeqCst);
                    f(item.clone())
                },
                |failed| {
                    tracing::warn!(
                        item = %item.id,
                        attempt = failed.attempt,
                        remaining = failed.remaining,
                        error = %failed.error,
                        "item attempt failed, retrying"
                    );
                },
            ),
        )
        .await;

        let (status, error) = match outcome {
            Ok(Ok(())) => (WorkStatus::Success, None),
            Ok(Err(e)) => (
                WorkStatus::Failed,
                Some(WorkError::Failed {
                    message: e.to_string(),
                }),
            ),
            Err(_) => (
                WorkStatus::Failed,
                Some(WorkError::TimedOut {
                    timeout_ms: timeout.as_millis() as u64,
                }),
            ),
        };

        WorkResult {
            item,
            index,
            status,
            error,
            duration: Some(started.elapsed()),
            attempts: attempts.load(Ordering::SeqCst),
            finished_at: chrono::Utc::now(),
        }
    }

    fn skip<T>(&self, run: &Run, index: usize, item: WorkItem<T>) -> WorkResult<T> {
        let result = WorkResult::skipped(
            item,
            index,
            WorkError::Aborted {
                failure_rate: run.monitor.failure_rate(),
                threshold: run.monitor.threshold(),
            },
        );
        self.report(run, &result);
        result
    }

    fn report<T>(&self, run: &Run, result: &WorkResult<T>) {
        match &result.error {
            Some(error) if result.status == WorkStatus::Failed => {
                tracing::warn!(run_id = %run.id, item = %result.item.id, label = %result.item.label, %error, "item failed");
            }
            _ => {
                tracing::debug!(run_id = %run.id, item = %result.item.id, status = ?result.status, "item finished");
            }
        }

        if let Some(journal) = &run.journal {
            if let Err(e) = journal.append(result) {
                tracing::warn!(run_id = %run.id, error = %e, "journal write failed");
            }
        }

        self.emit(AutomationEvent::ItemCompleted {
            run_id: run.id.clone(),
            index: result.index,
            item_id: result.item.id.clone(),
            label: result.item.label.clone(),
            status: result.status,
            error: result.error.clone(),
            duration_ms: result.duration.map(|d| d.as_millis() as u64),
            attempts: result.attempts,
        });
    }

    fn open_journal(&self, run_id: &str) -> Option<BatchJournal> {
        let dir = self.journal_dir.as_ref()?;
        match BatchJournal::create(dir, run_id) {
            Ok(journal) => Some(journal),
            Err(e) => {
                tracing::warn!(dir = %dir.display(), error = %e, "batch journal unavailable");
                None
            }
        }
    }

    fn emit(&self, event: AutomationEvent) {
        if let Some(events) = &self.events {
            events.emit(event);
        }
    }
}
