use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::InvsyncResult;
use crate::perception::types::BoundingBox;

/// How an element's position is sampled before interacting with it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SettleConfig {
    /// Consecutive samples that must agree.
    pub samples: usize,
    pub interval_ms: u64,
    pub tolerance_px: f64,
}

impl Default for SettleConfig {
    fn default() -> Self {
        Self {
            samples: 3,
            interval_ms: 50,
            tolerance_px: 1.0,
        }
    }
}

pub struct SettleDetector {
    config: SettleConfig,
    last_bounds: Option<BoundingBox>,
    stable_count: usize,
}

impl SettleDetector {
    pub fn new(config: SettleConfig) -> Self {
        Self {
            config,
            last_bounds: None,
            stable_count: 0,
        }
    }

    pub fn with_default() -> Self {
        Self::new(SettleConfig::default())
    }

    pub fn reset(&mut self) {
        self.last_bounds = None;
        self.stable_count = 0;
    }

    /// Feed one sample; returns true once enough consecutive samples agree.
    /// A missing or empty box (detached, collapsed) resets the run.
    pub fn observe(&mut self, bounds: Option<BoundingBox>) -> bool {
        let Some(current) = bounds.filter(|b| !b.is_empty()) else {
            self.reset();
            return false;
        };

        match self.last_bounds {
            Some(last) if last.approx_eq(&current, self.config.tolerance_px) => {
                self.stable_count += 1;
            }
            _ => self.stable_count = 1,
        }
        self.last_bounds = Some(current);
        self.stable_count >= self.config.samples.max(1)
    }
}

/// Sample `read_bounds` over one window of `samples` readings. Returns false
/// as soon as the element moves or disappears; the caller decides whether to
/// try another window.
pub async fn wait_for_settle<F, Fut>(read_bounds: F, config: &SettleConfig) -> InvsyncResult<bool>
where
    F: Fn() -> Fut,
    Fut: Future<Output = InvsyncResult<Option<BoundingBox>>>,
{
    let mut detector = SettleDetector::new(config.clone());
    let samples = config.samples.max(1);

    for i in 0..samples {
        let bounds = read_bounds().await?;
        if detector.observe(bounds) {
            return Ok(true);
        }
        if detector.stable_count != i + 1 {
            tracing::debug!(sample = i, "element moved during settle window");
            return Ok(false);
        }
        if i + 1 < samples {
            tokio::time::sleep(Duration::from_millis(config.interval_ms)).await;
        }
    }
    Ok(false)
}
