use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::AutomationFailure;

/// Which strategy satisfied an action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    Structural,
    Recognition,
    None,
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            StrategyKind::Structural => "structural",
            StrategyKind::Recognition => "recognition",
            StrategyKind::None => "none",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionOutcome {
    pub success: bool,
    pub strategy: StrategyKind,
    pub elapsed: Duration,
    /// Passes consumed beyond the first.
    pub retries: u32,
    pub error: Option<String>,
}

impl ActionOutcome {
    pub fn succeeded(strategy: StrategyKind, elapsed: Duration, retries: u32) -> Self {
        Self {
            success: true,
            strategy,
            elapsed,
            retries,
            error: None,
        }
    }

    /// Metrics view of a terminal failure.
    pub fn from_failure(failure: &AutomationFailure) -> Self {
        Self {
            success: false,
            strategy: StrategyKind::None,
            elapsed: failure.elapsed,
            retries: failure.attempts.saturating_sub(1),
            error: Some(failure.to_string()),
        }
    }
}
