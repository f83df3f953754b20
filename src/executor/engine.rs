use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::backoff::{retry_with_backoff, RetryPolicy};
use crate::config::{AppConfig, InteractionConfig};
use crate::driver::traits::UiDriver;
use crate::driver::types::Locator;
use crate::errors::{AutomationFailure, FailureSnapshot, TransientFailure};
use crate::event_bus::{AutomationEvent, EventBus, SnapshotRef};
use crate::executor::outcome::{ActionOutcome, StrategyKind};
use crate::executor::request::ActionRequest;
use crate::executor::strategy::{RecognitionStrategy, Strategy, StructuralStrategy};
use crate::perception::screenshot::SnapshotStore;
use crate::perception::traits::TextRecognizer;

/// Settings shared by the engine and its strategies.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    pub interaction: InteractionConfig,
    pub fuzzy_threshold: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            interaction: InteractionConfig::default(),
            fuzzy_threshold: crate::matching::DEFAULT_THRESHOLD,
        }
    }
}

impl From<&AppConfig> for EngineConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            interaction: config.interaction.clone(),
            fuzzy_threshold: config.matcher.fuzzy_threshold,
        }
    }
}

impl EngineConfig {
    pub fn attempt_timeout(&self, request: &ActionRequest) -> Duration {
        request
            .timeout
            .unwrap_or_else(|| Duration::from_millis(self.interaction.timeout_ms))
    }

    pub fn retry_policy(&self, request: &ActionRequest) -> RetryPolicy {
        let policy = self.interaction.retry.clone();
        match request.retries {
            Some(retries) => policy.with_retries(retries),
            None => policy,
        }
    }
}

/// Executes [`ActionRequest`]s against one UI session. Holds no global
/// state; create one per session.
pub struct InteractionEngine {
    driver: Arc<dyn UiDriver>,
    config: Arc<EngineConfig>,
    strategies: Vec<Box<dyn Strategy>>,
    snapshots: Option<SnapshotStore>,
    events: Option<EventBus>,
}

impl InteractionEngine {
    /// Engine with the structural strategy only.
    pub fn new(driver: Arc<dyn UiDriver>, config: EngineConfig) -> Self {
        let config = Arc::new(config);
        let structural = StructuralStrategy::new(driver.clone(), config.clone());
        Self {
            driver,
            config,
            strategies: vec![Box::new(structural)],
            snapshots: None,
            events: None,
        }
    }

    /// Driver, optional recognizer and snapshot store wired from `[interaction]`,
    /// `[matcher]` and `[snapshots]`.
    pub fn from_config(
        driver: Arc<dyn UiDriver>,
        recognizer: Option<Arc<dyn TextRecognizer>>,
        config: &AppConfig,
    ) -> Self {
        let mut engine = Self::new(driver, EngineConfig::from(config));
        if let Some(recognizer) = recognizer {
            engine = engine.with_recognizer(recognizer);
        }
        if config.snapshots.persist {
            engine = engine.with_snapshot_store(SnapshotStore::new(config.snapshots.resolved_dir()));
        }
        engine
    }

    /// Appends the recognition fallback after the existing strategies.
    pub fn with_recognizer(self, recognizer: Arc<dyn TextRecognizer>) -> Self {
        let strategy = RecognitionStrategy::new(self.driver.clone(), recognizer, self.config.clone());
        self.with_strategy(Box::new(strategy))
    }

    pub fn with_strategy(mut self, strategy: Box<dyn Strategy>) -> Self {
        self.strategies.push(strategy);
        self
    }

    pub fn with_snapshot_store(mut self, store: SnapshotStore) -> Self {
        self.snapshots = Some(store);
        self
    }

    pub fn with_event_bus(mut self, events: EventBus) -> Self {
        self.events = Some(events);
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Run `request` through every strategy, verifying and retrying, until it
    /// succeeds or the retry budget is gone. [`AutomationFailure`] is the only
    /// error that leaves this function.
    pub async fn execute(&self, request: &ActionRequest) -> Result<ActionOutcome, AutomationFailure> {
        let started = Instant::now();
        let policy = self.config.retry_policy(request);
        let mut reasons: Vec<String> = Vec::new();

        tracing::info!(
            action = %request.name,
            kind = request.kind(),
            locator = %request.locator,
            max_attempts = policy.max_attempts(),
            "executing action"
        );

        let result = retry_with_backoff(
            &policy,
            |attempt| self.run_pass(request, attempt, policy.max_attempts()),
            |failed| {
                tracing::warn!(
                    action = %request.name,
                    attempt = failed.attempt,
                    remaining = failed.remaining,
                    delay_ms = failed.delay.as_millis() as u64,
                    "all strategies failed, backing off"
                );
                reasons.extend(failed.error.iter().cloned());
            },
        )
        .await;

        match result {
            Ok((strategy, attempt)) => {
                let outcome = ActionOutcome::succeeded(strategy, started.elapsed(), attempt);
                tracing::info!(
                    action = %request.name,
                    strategy = %strategy,
                    retries = attempt,
                    elapsed_ms = outcome.elapsed.as_millis() as u64,
                    "action succeeded"
                );
                self.emit(AutomationEvent::ActionCompleted {
                    action: request.name.clone(),
                    kind: request.kind().to_string(),
                    outcome: outcome.clone(),
                    snapshot: None,
                });
                Ok(outcome)
            }
            Err(last) => {
                reasons.extend(last);
                let failure = self.fail(request, policy.max_attempts(), started, reasons).await;
                tracing::error!(action = %request.name, error = %failure, "action failed");
                self.emit(AutomationEvent::ActionCompleted {
                    action: request.name.clone(),
                    kind: request.kind().to_string(),
                    outcome: ActionOutcome::from_failure(&failure),
                    snapshot: failure.snapshot.as_ref().map(SnapshotRef::from),
                });
                Err(failure)
            }
        }
    }

    pub async fn click(&self, name: &str, locator: Locator) -> Result<ActionOutcome, AutomationFailure> {
        self.execute(&ActionRequest::click(name, locator)).await
    }

    pub async fn type_text(
        &self,
        name: &str,
        locator: Locator,
        value: &str,
    ) -> Result<ActionOutcome, AutomationFailure> {
        self.execute(&ActionRequest::type_text(name, locator, value)).await
    }

    pub async fn select_option(
        &self,
        name: &str,
        locator: Locator,
        value: &str,
    ) -> Result<ActionOutcome, AutomationFailure> {
        self.execute(&ActionRequest::select_option(name, locator, value)).await
    }

    /// One pass over the strategy chain. Returns the winning strategy and the
    /// 0-based pass index, or one reason per failed strategy.
    async fn run_pass(
        &self,
        request: &ActionRequest,
        attempt: u32,
        max_attempts: u32,
    ) -> Result<(StrategyKind, u32), Vec<String>> {
        let mut reasons = Vec::new();

        for strategy in self.strategies.iter().filter(|s| s.applies_to(request)) {
            let kind = strategy.kind();
            let result = match self.guarded_attempt(&**strategy, request).await {
                Ok(()) => self.verify(request).await,
                Err(e) => Err(e),
            };

            self.emit(AutomationEvent::ActionAttempted {
                action: request.name.clone(),
                kind: request.kind().to_string(),
                strategy: kind,
                attempt: attempt + 1,
                success: result.is_ok(),
                reason: result.as_ref().err().map(|e| e.to_string()),
                timestamp: chrono::Utc::now(),
            });

            match result {
                Ok(()) => return Ok((kind, attempt)),
                Err(e) => {
                    tracing::debug!(action = %request.name, attempt = attempt + 1, strategy = %kind, reason = %e, "strategy failed");
                    reasons.push(format!("pass {} {kind}: {e}", attempt + 1));
                }
            }
        }

        if reasons.is_empty() {
            reasons.push(format!("pass {}: no applicable strategy", attempt + 1));
        }

        // The terminal snapshot is taken by `fail`.
        if attempt + 1 < max_attempts {
            if let Some(store) = &self.snapshots {
                if self.config.interaction.capture_snapshots {
                    let label = format!("{}_{}_attempt{}", request.kind(), request.name, attempt + 1);
                    match self.driver.screenshot().await {
                        Ok(image) => {
                            if let Err(e) = store.save(&image, &label).await {
                                tracing::warn!(action = %request.name, error = %e, "attempt snapshot not saved");
                            }
                        }
                        Err(e) => tracing::warn!(action = %request.name, error = %e, "attempt screenshot failed"),
                    }
                }
            }
        }

        Err(reasons)
    }

    /// Hard stop for a strategy that hangs inside the driver or recognizer.
    /// Twice the actionability budget leaves room for settle and dispatch.
    async fn guarded_attempt(&self, strategy: &dyn Strategy, request: &ActionRequest) -> Result<(), TransientFailure> {
        let budget = self.config.attempt_timeout(request).saturating_mul(2);
        match tokio::time::timeout(budget, strategy.attempt(request)).await {
            Ok(result) => result,
            Err(_) => Err(TransientFailure::TimedOut(budget)),
        }
    }

    /// A predicate error counts as a failed attempt, never as fatal.
    async fn verify(&self, request: &ActionRequest) -> Result<(), TransientFailure> {
        let Some(check) = &request.verify else {
            return Ok(());
        };
        match check().await {
            Ok(true) => Ok(()),
            Ok(false) => Err(TransientFailure::VerificationFailed),
            Err(e) => {
                tracing::warn!(action = %request.name, error = %e, "verification predicate raised");
                Err(TransientFailure::VerificationErrored(e.to_string()))
            }
        }
    }

    async fn fail(
        &self,
        request: &ActionRequest,
        attempts: u32,
        started: Instant,
        reasons: Vec<String>,
    ) -> AutomationFailure {
        let snapshot = if self.config.interaction.capture_snapshots {
            self.capture_snapshot(request).await
        } else {
            None
        };
        let message = reasons
            .last()
            .cloned()
            .unwrap_or_else(|| "all strategies exhausted".to_string());

        AutomationFailure {
            kind: request.kind().to_string(),
            target: request.name.clone(),
            message,
            attempts,
            elapsed: started.elapsed(),
            reasons,
            snapshot,
            timestamp: chrono::Utc::now(),
        }
    }

    async fn capture_snapshot(&self, request: &ActionRequest) -> Option<FailureSnapshot> {
        let image = match self.driver.screenshot().await {
            Ok(image) => image,
            Err(e) => {
                tracing::warn!(action = %request.name, error = %e, "failure screenshot unavailable");
                return None;
            }
        };

        let path = match &self.snapshots {
            Some(store) => match store.save(&image, &format!("{}_{}", request.kind(), request.name)).await {
                Ok(path) => Some(path),
                Err(e) => {
                    tracing::warn!(action = %request.name, error = %e, "failure snapshot not saved");
                    None
                }
            },
            None => None,
        };
        Some(FailureSnapshot { image, path })
    }

    fn emit(&self, event: AutomationEvent) {
        if let Some(events) = &self.events {
            events.emit(event);
        }
    }
}
