use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;
use futures_util::FutureExt;

use crate::driver::types::{Locator, UiAction};
use crate::errors::InvsyncResult;
use crate::perception::types::RecognitionTarget;

/// Zero-argument async check run after every dispatched action.
pub type Verifier = Arc<dyn Fn() -> BoxFuture<'static, InvsyncResult<bool>> + Send + Sync>;

/// One logical interaction. Built once per call site and never mutated by
/// the engine.
#[derive(Clone)]
pub struct ActionRequest {
    /// Human-readable target, used in logs and failures.
    pub name: String,
    pub locator: Locator,
    pub action: UiAction,
    pub fallback: Option<RecognitionTarget>,
    pub verify: Option<Verifier>,
    /// Per-attempt actionability budget. `None` uses the engine default.
    pub timeout: Option<Duration>,
    /// Additional passes after the first. `None` uses the engine default.
    pub retries: Option<u32>,
}

impl ActionRequest {
    pub fn new(name: impl Into<String>, locator: Locator, action: UiAction) -> Self {
        Self {
            name: name.into(),
            locator,
            action,
            fallback: None,
            verify: None,
            timeout: None,
            retries: None,
        }
    }

    pub fn click(name: impl Into<String>, locator: Locator) -> Self {
        Self::new(name, locator, UiAction::Click)
    }

    /// Replaces the field's content with `value`.
    pub fn type_text(name: impl Into<String>, locator: Locator, value: impl Into<String>) -> Self {
        Self::new(
            name,
            locator,
            UiAction::SetValue {
                value: value.into(),
                clear_first: true,
            },
        )
    }

    pub fn select_option(name: impl Into<String>, locator: Locator, value: impl Into<String>) -> Self {
        Self::new(
            name,
            locator,
            UiAction::SelectOption {
                value: value.into(),
            },
        )
    }

    pub fn with_fallback(mut self, target: RecognitionTarget) -> Self {
        self.fallback = Some(target);
        self
    }

    pub fn with_verify<F, Fut>(mut self, check: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = InvsyncResult<bool>> + Send + 'static,
    {
        self.verify = Some(Arc::new(move || check().boxed()));
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = Some(retries);
        self
    }

    pub fn kind(&self) -> &'static str {
        self.action.kind()
    }
}

impl fmt::Debug for ActionRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionRequest")
            .field("name", &self.name)
            .field("locator", &self.locator)
            .field("action", &self.action)
            .field("fallback", &self.fallback.as_ref().map(|t| t.describe()))
            .field("verify", &self.verify.is_some())
            .field("timeout", &self.timeout)
            .field("retries", &self.retries)
            .finish()
    }
}
