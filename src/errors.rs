use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::perception::screenshot::ScreenImage;

#[derive(Debug, Error)]
pub enum InvsyncError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Driver error: {0}")]
    Driver(String),

    #[error("Recognition error: {0}")]
    Recognition(String),

    #[error("Snapshot error: {0}")]
    Snapshot(String),

    #[error("Verification error: {0}")]
    Verification(String),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML deserialize error: {0}")]
    TomlDe(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSer(#[from] toml::ser::Error),
}

impl serde::Serialize for InvsyncError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::ser::Serializer,
    {
        serializer.serialize_str(self.to_string().as_str())
    }
}

pub type InvsyncResult<T> = Result<T, InvsyncError>;

/// Why a single strategy attempt did not complete. Folded into the pass
/// failure and, once the retry budget is gone, into [`AutomationFailure`].
#[derive(Debug, Clone, Error, PartialEq)]
pub enum TransientFailure {
    #[error("element not found: {0}")]
    NotFound(String),

    #[error("element not actionable: {0}")]
    NotActionable(String),

    #[error("dispatch failed: {0}")]
    DispatchFailed(String),

    #[error("completion check failed: expected {expected:?}, found {actual:?}")]
    CompletionMismatch {
        expected: String,
        actual: Option<String>,
    },

    #[error("verification returned false")]
    VerificationFailed,

    #[error("verification raised: {0}")]
    VerificationErrored(String),

    #[error("recognition failed: {0}")]
    RecognitionFailed(String),

    #[error("attempt timed out after {0:?}")]
    TimedOut(Duration),
}

/// Forensic artifact captured when an action gives up.
#[derive(Debug, Clone)]
pub struct FailureSnapshot {
    pub image: ScreenImage,
    /// Set when the snapshot store persisted the image.
    pub path: Option<PathBuf>,
}

/// Terminal error for one action: every strategy and every retry exhausted.
/// Never mutated after the engine builds it.
#[derive(Debug, Clone, Error)]
#[error("{kind} '{target}' failed after {attempts} attempt(s) in {elapsed:?}: {message}{}", SnapshotSuffix(.snapshot))]
pub struct AutomationFailure {
    pub kind: String,
    pub target: String,
    pub message: String,
    pub attempts: u32,
    pub elapsed: Duration,
    /// One entry per failed strategy attempt, oldest first.
    pub reasons: Vec<String>,
    pub snapshot: Option<FailureSnapshot>,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl AutomationFailure {
    pub fn snapshot_path(&self) -> Option<&std::path::Path> {
        self.snapshot.as_ref().and_then(|s| s.path.as_deref())
    }
}

struct SnapshotSuffix<'a>(&'a Option<FailureSnapshot>);

impl fmt::Display for SnapshotSuffix<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(FailureSnapshot { path: Some(path), .. }) => {
                write!(f, " (snapshot: {})", path.display())
            }
            Some(_) => write!(f, " (snapshot captured in memory)"),
            None => Ok(()),
        }
    }
}

/// Failure recorded on a WorkResult. Never thrown out of the batch processor.
#[derive(Debug, Clone, Error, PartialEq, serde::Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WorkError {
    #[error("item failed: {message}")]
    Failed { message: String },

    #[error("item timed out after {timeout_ms}ms")]
    TimedOut { timeout_ms: u64 },

    #[error("batch aborted: failure rate {failure_rate:.2} exceeded threshold {threshold:.2}")]
    Aborted { failure_rate: f64, threshold: f64 },
}
