use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use crate::backoff;
use crate::driver::traits::UiDriver;
use crate::driver::types::{ElementHandle, Locator, UiAction};
use crate::errors::{InvsyncError, TransientFailure};
use crate::executor::coordinator::pointer_target;
use crate::executor::dispatcher::{dispatch_pointer, pointer_steps};
use crate::executor::engine::EngineConfig;
use crate::executor::outcome::StrategyKind;
use crate::executor::request::ActionRequest;
use crate::executor::text_input;
use crate::matching;
use crate::perception::screenshot::ScreenImage;
use crate::perception::stability::wait_for_settle;
use crate::perception::template::find_template;
use crate::perception::traits::TextRecognizer;
use crate::perception::types::{BoundingBox, RecognitionTarget, TextSearch};

/// One way of getting an action done. The engine walks its strategies in
/// order on every pass and stops at the first that succeeds.
#[async_trait]
pub trait Strategy: Send + Sync {
    fn kind(&self) -> StrategyKind;

    fn applies_to(&self, request: &ActionRequest) -> bool;

    /// Perform the action once, including its completion check. The caller's
    /// verifier runs afterwards in the engine.
    async fn attempt(&self, request: &ActionRequest) -> Result<(), TransientFailure>;
}

/// Locate through the document structure, wait until actionable and
/// settled, then dispatch through the driver.
pub struct StructuralStrategy {
    driver: Arc<dyn UiDriver>,
    config: Arc<EngineConfig>,
}

impl StructuralStrategy {
    pub fn new(driver: Arc<dyn UiDriver>, config: Arc<EngineConfig>) -> Self {
        Self { driver, config }
    }

    async fn resolve(&self, locator: &Locator) -> Result<Option<ElementHandle>, InvsyncError> {
        let Locator::FuzzyLabel { label, role } = locator else {
            return self.driver.locate(locator).await;
        };

        let elements = self.driver.labeled_elements(role.as_deref()).await?;
        let labels: Vec<&str> = elements.iter().map(|e| e.label.as_str()).collect();
        Ok(matching::best_match(label, &labels, self.config.fuzzy_threshold).map(|m| {
            tracing::debug!(wanted = %label, matched = m.value, score = m.score, "fuzzy label resolved");
            elements[m.index].handle.clone()
        }))
    }

    /// Poll until the element exists and is actionable.
    async fn wait_actionable(
        &self,
        locator: &Locator,
        deadline: Instant,
    ) -> Result<ElementHandle, TransientFailure> {
        let poll = Duration::from_millis(self.config.interaction.poll_interval_ms.max(1));
        let mut seen = false;
        let mut last_error = None;

        loop {
            match self.resolve(locator).await {
                Ok(Some(handle)) => {
                    seen = true;
                    match self.driver.actionable(&handle).await {
                        Ok(true) => return Ok(handle),
                        Ok(false) => {}
                        Err(e) => last_error = Some(e.to_string()),
                    }
                }
                Ok(None) => {}
                Err(e) => last_error = Some(e.to_string()),
            }

            if Instant::now() + poll > deadline {
                let detail = match last_error {
                    Some(e) => format!("{locator} ({e})"),
                    None => locator.to_string(),
                };
                return Err(if seen {
                    TransientFailure::NotActionable(detail)
                } else {
                    TransientFailure::NotFound(detail)
                });
            }
            tokio::time::sleep(poll).await;
        }
    }

    async fn wait_settled(&self, handle: &ElementHandle, deadline: Instant) -> Result<(), TransientFailure> {
        let settle = &self.config.interaction.settle;
        let pause = Duration::from_millis(settle.interval_ms.max(1));
        loop {
            let settled = wait_for_settle(|| self.driver.bounds(handle), settle)
                .await
                .map_err(|e| TransientFailure::NotActionable(format!("{handle}: {e}")))?;
            if settled {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(TransientFailure::NotActionable(format!("{handle} never settled")));
            }
            // A detached element ends its window without sleeping.
            tokio::time::sleep(pause).await;
        }
    }
}

#[async_trait]
impl Strategy for StructuralStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Structural
    }

    fn applies_to(&self, _request: &ActionRequest) -> bool {
        true
    }

    async fn attempt(&self, request: &ActionRequest) -> Result<(), TransientFailure> {
        let deadline = Instant::now() + self.config.attempt_timeout(request);

        let handle = self.wait_actionable(&request.locator, deadline).await?;
        self.driver
            .scroll_into_view(&handle)
            .await
            .map_err(|e| TransientFailure::NotActionable(format!("scroll {handle}: {e}")))?;
        self.wait_settled(&handle, deadline).await?;

        tracing::debug!(action = %request.name, element = %handle, kind = request.kind(), "dispatching");
        self.driver
            .dispatch(&handle, &request.action)
            .await
            .map_err(|e| TransientFailure::DispatchFailed(e.to_string()))?;

        text_input::check_element(self.driver.as_ref(), &handle, &request.action).await
    }
}

/// Locate the fallback target on a screenshot and act on its coordinates.
pub struct RecognitionStrategy {
    driver: Arc<dyn UiDriver>,
    recognizer: Arc<dyn TextRecognizer>,
    config: Arc<EngineConfig>,
}

impl RecognitionStrategy {
    pub fn new(driver: Arc<dyn UiDriver>, recognizer: Arc<dyn TextRecognizer>, config: Arc<EngineConfig>) -> Self {
        Self {
            driver,
            recognizer,
            config,
        }
    }

    async fn capture(&self) -> Result<ScreenImage, TransientFailure> {
        self.driver
            .screenshot()
            .await
            .map_err(|e| TransientFailure::RecognitionFailed(format!("screenshot: {e}")))
    }

    async fn find_text(
        &self,
        image: &ScreenImage,
        needle: &str,
        search: TextSearch,
    ) -> Result<BoundingBox, TransientFailure> {
        let hit = backoff::retry(&self.config.interaction.recognition_retry, "find_text", |_| {
            self.recognizer.find_text(image, needle, search)
        })
        .await
        .map_err(|e| TransientFailure::RecognitionFailed(e.to_string()))?;

        match hit.bbox {
            Some(bbox) if hit.found => {
                tracing::debug!(needle, matched = ?hit.matched_text, score = hit.score, "text located");
                Ok(bbox)
            }
            _ => Err(TransientFailure::NotFound(format!("text \"{needle}\" on screen"))),
        }
    }

    async fn locate(&self, image: &ScreenImage, target: &RecognitionTarget) -> Result<BoundingBox, TransientFailure> {
        match target {
            RecognitionTarget::Text { needle, search } => self.find_text(image, needle, *search).await,
            RecognitionTarget::Image { template, min_score } => {
                let haystack = image.clone();
                let template = template.clone();
                let min_score = *min_score;
                let found = tokio::task::spawn_blocking(move || find_template(&haystack, &template, min_score))
                    .await
                    .map_err(|e| TransientFailure::RecognitionFailed(format!("template task: {e}")))?
                    .map_err(|e| TransientFailure::RecognitionFailed(e.to_string()))?;
                found
                    .map(|m| m.bbox)
                    .ok_or_else(|| TransientFailure::NotFound(target.describe()))
            }
        }
    }

    async fn click_at(&self, bbox: &BoundingBox, image: &ScreenImage, action: &UiAction) -> Result<(), TransientFailure> {
        let point = pointer_target(bbox, image)
            .ok_or_else(|| TransientFailure::NotActionable(format!("located region {bbox:?} is off screen")))?;
        dispatch_pointer(self.driver.as_ref(), &pointer_steps(action, point)).await
    }
}

#[async_trait]
impl Strategy for RecognitionStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Recognition
    }

    fn applies_to(&self, request: &ActionRequest) -> bool {
        request.fallback.is_some()
    }

    async fn attempt(&self, request: &ActionRequest) -> Result<(), TransientFailure> {
        let Some(target) = request.fallback.as_ref() else {
            return Err(TransientFailure::RecognitionFailed("no fallback target".into()));
        };

        let image = self.capture().await?;
        let bbox = self.locate(&image, target).await?;
        self.click_at(&bbox, &image, &request.action).await?;

        if let UiAction::SelectOption { value } = &request.action {
            tokio::time::sleep(Duration::from_millis(self.config.interaction.option_open_delay_ms)).await;
            let opened = self.capture().await?;
            let search = TextSearch {
                fuzzy: true,
                threshold: self.config.fuzzy_threshold,
            };
            let option = self.find_text(&opened, value, search).await?;
            self.click_at(&option, &opened, &UiAction::Click).await?;
        }

        text_input::check_focused(self.driver.as_ref(), &request.action).await
    }
}
