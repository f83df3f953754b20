pub mod history;
pub mod loop_control;
pub mod processor;
pub mod queue;
pub mod state;

pub use history::BatchJournal;
pub use processor::{BatchOptions, BatchProcessor};
pub use state::{BatchResult, WorkItem, WorkResult, WorkStatus};
