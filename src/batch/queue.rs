use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Shared FIFO the workers of one chunk drain. `pop` is the only operation
/// workers use, so each entry is handed out exactly once.
#[derive(Debug)]
pub struct WorkQueue<T> {
    inner: Mutex<VecDeque<T>>,
}

impl<T> WorkQueue<T> {
    pub fn new(items: impl IntoIterator<Item = T>) -> Self {
        Self {
            inner: Mutex::new(items.into_iter().collect()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<T>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn pop(&self) -> Option<T> {
        self.lock().pop_front()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Take whatever no worker claimed.
    pub fn drain(&self) -> Vec<T> {
        self.lock().drain(..).collect()
    }
}
