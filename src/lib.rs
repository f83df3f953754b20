pub mod backoff;
pub mod batch;
pub mod config;
pub mod driver;
pub mod errors;
pub mod event_bus;
pub mod executor;
pub mod matching;
pub mod perception;

pub use backoff::RetryPolicy;
pub use batch::{BatchOptions, BatchProcessor, BatchResult, WorkItem, WorkResult, WorkStatus};
pub use config::AppConfig;
pub use driver::{Locator, UiAction, UiDriver};
pub use errors::{AutomationFailure, InvsyncError, InvsyncResult, WorkError};
pub use event_bus::{AutomationEvent, EventBus};
pub use executor::{ActionOutcome, ActionRequest, InteractionEngine, StrategyKind};
pub use perception::{RecognitionTarget, TextRecognizer};

/// Install the fmt subscriber, filtered by `RUST_LOG` (default `info`).
/// Later calls are no-ops.
pub fn init_tracing() {
    let _ = dotenvy::dotenv();
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    if tracing_subscriber::fmt().with_env_filter(filter).try_init().is_err() {
        tracing::trace!("tracing subscriber already installed");
    }
}
