// Error-rate monitoring for one batch run.
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use crate::batch::state::WorkStatus;

pub struct ErrorMonitor {
    total_items: usize,
    threshold: f64,
    abort_on_error: bool,
    processed: AtomicUsize,
    failed: AtomicUsize,
    aborted: AtomicBool,
}

impl ErrorMonitor {
    pub fn new(total_items: usize, threshold: f64, abort_on_error: bool) -> Self {
        Self {
            total_items,
            threshold,
            abort_on_error,
            processed: AtomicUsize::new(0),
            failed: AtomicUsize::new(0),
            aborted: AtomicBool::new(false),
        }
    }

    pub fn record(&self, status: WorkStatus) {
        match status {
            WorkStatus::Success => {
                self.processed.fetch_add(1, Ordering::SeqCst);
            }
            WorkStatus::Failed => {
                self.failed.fetch_add(1, Ordering::SeqCst);
                self.processed.fetch_add(1, Ordering::SeqCst);
            }
            WorkStatus::Skipped => {}
        }
    }

    pub fn processed(&self) -> usize {
        self.processed.load(Ordering::SeqCst)
    }

    pub fn failed(&self) -> usize {
        self.failed.load(Ordering::SeqCst)
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// failed / processed so far.
    pub fn failure_rate(&self) -> f64 {
        match self.processed() {
            0 => 0.0,
            n => self.failed() as f64 / n as f64,
        }
    }

    pub fn is_aborted(&self) -> bool {
        self.aborted.load(Ordering::SeqCst)
    }

    /// Checked by workers before claiming an item. Once failures exceed the
    /// threshold as a share of the whole batch, the final rate is bound to
    /// exceed it too, so nothing further is started.
    pub fn should_stop_early(&self) -> bool {
        if self.is_aborted() {
            return true;
        }
        if !self.abort_on_error || self.total_items == 0 {
            return false;
        }
        let share = self.failed() as f64 / self.total_items as f64;
        if share > self.threshold {
            self.aborted.store(true, Ordering::SeqCst);
            return true;
        }
        false
    }

    /// Checked once every worker of a chunk has exited.
    pub fn check_chunk_boundary(&self) -> bool {
        if self.is_aborted() {
            return true;
        }
        if !self.abort_on_error || self.processed() == 0 {
            return false;
        }
        if self.failure_rate() > self.threshold {
            self.aborted.store(true, Ordering::SeqCst);
            return true;
        }
        false
    }
}
