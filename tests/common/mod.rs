//! In-memory stand-ins for a browser session and a recognition backend.
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use invsync_lib::backoff::RetryPolicy;
use invsync_lib::config::InteractionConfig;
use invsync_lib::driver::{ElementHandle, LabeledElement, Locator, PointerAction, UiAction, UiDriver};
use invsync_lib::errors::{InvsyncError, InvsyncResult};
use invsync_lib::executor::EngineConfig;
use invsync_lib::perception::stability::SettleConfig;
use invsync_lib::perception::{BoundingBox, Recognition, RecognizedToken, ScreenImage, TextRecognizer};

pub const SCREEN_W: u32 = 1280;
pub const SCREEN_H: u32 = 800;

/// Short timeouts and delays so failing paths finish in milliseconds.
pub fn fast_config(retries: u32) -> EngineConfig {
    EngineConfig {
        interaction: InteractionConfig {
            retry: RetryPolicy::new(retries, 1, 4, 2.0),
            timeout_ms: 40,
            poll_interval_ms: 5,
            capture_snapshots: true,
            settle: SettleConfig {
                samples: 2,
                interval_ms: 1,
                tolerance_px: 1.0,
            },
            recognition_retry: RetryPolicy::none(),
            option_open_delay_ms: 1,
        },
        fuzzy_threshold: 70.0,
    }
}

#[derive(Debug, Clone)]
pub struct Element {
    pub actionable: bool,
    pub value: Option<String>,
    pub label: Option<String>,
    pub bounds: BoundingBox,
    /// Value the field snaps back to after every write (debounced input).
    pub sticky_value: Option<String>,
    /// `(value, label)` pairs for selects.
    pub options: Vec<(String, String)>,
    /// Reports no layout box, like a node removed from the render tree.
    pub detached: bool,
}

impl Element {
    pub fn button() -> Self {
        Self {
            actionable: true,
            value: None,
            label: None,
            bounds: BoundingBox::new(100.0, 100.0, 80.0, 24.0),
            sticky_value: None,
            options: Vec::new(),
            detached: false,
        }
    }

    pub fn input(value: &str) -> Self {
        Self {
            value: Some(value.to_string()),
            ..Self::button()
        }
    }

    pub fn select(options: &[(&str, &str)]) -> Self {
        Self {
            options: options
                .iter()
                .map(|(v, l)| (v.to_string(), l.to_string()))
                .collect(),
            ..Self::input("")
        }
    }

    pub fn disabled(mut self) -> Self {
        self.actionable = false;
        self
    }

    pub fn detached(mut self) -> Self {
        self.detached = true;
        self
    }

    pub fn sticky(mut self, value: &str) -> Self {
        self.sticky_value = Some(value.to_string());
        self
    }
}

pub struct ScriptedDriver {
    locators: Mutex<HashMap<String, String>>,
    elements: Mutex<HashMap<String, Element>>,
    labeled: Mutex<Vec<LabeledElement>>,
    screen: Mutex<ScreenImage>,
    focused: Mutex<Option<String>>,
    fail_screenshots: bool,
    pub dispatched: Mutex<Vec<(String, UiAction)>>,
    pub pointer_log: Mutex<Vec<PointerAction>>,
    pub locate_calls: AtomicUsize,
    pub bounds_calls: AtomicUsize,
    pub screenshots: AtomicUsize,
}

impl ScriptedDriver {
    pub fn new() -> Self {
        Self {
            locators: Mutex::new(HashMap::new()),
            elements: Mutex::new(HashMap::new()),
            labeled: Mutex::new(Vec::new()),
            screen: Mutex::new(ScreenImage::new(Vec::new(), SCREEN_W, SCREEN_H)),
            focused: Mutex::new(None),
            fail_screenshots: false,
            dispatched: Mutex::new(Vec::new()),
            pointer_log: Mutex::new(Vec::new()),
            locate_calls: AtomicUsize::new(0),
            bounds_calls: AtomicUsize::new(0),
            screenshots: AtomicUsize::new(0),
        }
    }

    pub fn with_element(self, locator: &Locator, id: &str, element: Element) -> Self {
        self.locators
            .lock()
            .unwrap()
            .insert(locator.to_string(), id.to_string());
        self.elements.lock().unwrap().insert(id.to_string(), element);
        self
    }

    /// Element reachable only through the label listing.
    pub fn with_labeled(self, id: &str, label: &str, element: Element) -> Self {
        self.labeled.lock().unwrap().push(LabeledElement {
            handle: ElementHandle::new(id),
            label: label.to_string(),
        });
        self.elements.lock().unwrap().insert(id.to_string(), element);
        self
    }

    pub fn with_screen(self, screen: ScreenImage) -> Self {
        *self.screen.lock().unwrap() = screen;
        self
    }

    pub fn without_screenshots(mut self) -> Self {
        self.fail_screenshots = true;
        self
    }

    pub fn set_focused(&self, value: Option<&str>) {
        *self.focused.lock().unwrap() = value.map(str::to_string);
    }

    pub fn element(&self, id: &str) -> Option<Element> {
        self.elements.lock().unwrap().get(id).cloned()
    }

    pub fn dispatch_count(&self) -> usize {
        self.dispatched.lock().unwrap().len()
    }

    pub fn pointer_actions(&self) -> Vec<PointerAction> {
        self.pointer_log.lock().unwrap().clone()
    }

    fn with_element_mut<R>(&self, handle: &ElementHandle, f: impl FnOnce(&mut Element) -> R) -> InvsyncResult<R> {
        let mut elements = self.elements.lock().unwrap();
        let element = elements
            .get_mut(handle.id())
            .ok_or_else(|| InvsyncError::Driver(format!("stale handle {handle}")))?;
        Ok(f(element))
    }
}

#[async_trait]
impl UiDriver for ScriptedDriver {
    async fn locate(&self, locator: &Locator) -> InvsyncResult<Option<ElementHandle>> {
        self.locate_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .locators
            .lock()
            .unwrap()
            .get(&locator.to_string())
            .map(ElementHandle::new))
    }

    async fn actionable(&self, handle: &ElementHandle) -> InvsyncResult<bool> {
        self.with_element_mut(handle, |e| e.actionable)
    }

    async fn scroll_into_view(&self, _handle: &ElementHandle) -> InvsyncResult<()> {
        Ok(())
    }

    async fn bounds(&self, handle: &ElementHandle) -> InvsyncResult<Option<BoundingBox>> {
        self.bounds_calls.fetch_add(1, Ordering::SeqCst);
        self.with_element_mut(handle, |e| (!e.detached).then_some(e.bounds))
    }

    async fn dispatch(&self, handle: &ElementHandle, action: &UiAction) -> InvsyncResult<()> {
        self.dispatched
            .lock()
            .unwrap()
            .push((handle.id().to_string(), action.clone()));
        self.with_element_mut(handle, |e| match action {
            UiAction::Click => {}
            UiAction::SetValue { value, .. } => {
                e.value = Some(e.sticky_value.clone().unwrap_or_else(|| value.clone()));
            }
            UiAction::SelectOption { value } => {
                let wanted = value.to_lowercase();
                if let Some((v, l)) = e
                    .options
                    .iter()
                    .find(|(v, l)| v == value || l.to_lowercase() == wanted)
                {
                    e.value = Some(v.clone());
                    e.label = Some(l.clone());
                }
            }
        })
    }

    async fn screenshot(&self) -> InvsyncResult<ScreenImage> {
        self.screenshots.fetch_add(1, Ordering::SeqCst);
        if self.fail_screenshots {
            return Err(InvsyncError::Driver("capture unavailable".into()));
        }
        Ok(self.screen.lock().unwrap().clone())
    }

    async fn pointer(&self, action: &PointerAction) -> InvsyncResult<()> {
        self.pointer_log.lock().unwrap().push(action.clone());
        Ok(())
    }

    async fn read_value(&self, handle: &ElementHandle) -> InvsyncResult<Option<String>> {
        self.with_element_mut(handle, |e| e.value.clone())
    }

    async fn selected_label(&self, handle: &ElementHandle) -> InvsyncResult<Option<String>> {
        self.with_element_mut(handle, |e| e.label.clone())
    }

    async fn focused_value(&self) -> InvsyncResult<Option<String>> {
        Ok(self.focused.lock().unwrap().clone())
    }

    async fn labeled_elements(&self, _role: Option<&str>) -> InvsyncResult<Vec<LabeledElement>> {
        Ok(self.labeled.lock().unwrap().clone())
    }
}

/// Recognizer returning a fixed token list, optionally failing first.
pub struct ScriptedRecognizer {
    tokens: Vec<RecognizedToken>,
    failures_left: AtomicUsize,
    pub calls: AtomicUsize,
}

impl ScriptedRecognizer {
    pub fn new(tokens: Vec<RecognizedToken>) -> Self {
        Self {
            tokens,
            failures_left: AtomicUsize::new(0),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    pub fn failing_first(self, failures: usize) -> Self {
        self.failures_left.store(failures, Ordering::SeqCst);
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TextRecognizer for ScriptedRecognizer {
    async fn recognize(&self, _image: &ScreenImage) -> InvsyncResult<Recognition> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let pending = self.failures_left.load(Ordering::SeqCst);
        if pending > 0 {
            self.failures_left.store(pending - 1, Ordering::SeqCst);
            return Err(InvsyncError::Recognition("backend timeout".into()));
        }
        Ok(Recognition {
            text: self
                .tokens
                .iter()
                .map(|t| t.text.as_str())
                .collect::<Vec<_>>()
                .join(" "),
            tokens: self.tokens.clone(),
        })
    }
}

pub fn token(text: &str, x: f64, y: f64) -> RecognizedToken {
    RecognizedToken {
        text: text.to_string(),
        confidence: 0.93,
        bbox: BoundingBox::new(x, y, 60.0, 20.0),
    }
}
