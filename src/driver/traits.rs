use async_trait::async_trait;

use crate::driver::types::{ElementHandle, LabeledElement, Locator, PointerAction, UiAction};
use crate::errors::InvsyncResult;
use crate::perception::screenshot::ScreenImage;
use crate::perception::types::BoundingBox;

/// Live UI session the interaction engine acts on (one browser context).
///
/// "Not found" is `Ok(None)`, never an error. Errors are reserved for the
/// driver itself failing (session gone, protocol error).
#[async_trait]
pub trait UiDriver: Send + Sync {
    async fn locate(&self, locator: &Locator) -> InvsyncResult<Option<ElementHandle>>;

    /// Visible, attached and enabled.
    async fn actionable(&self, handle: &ElementHandle) -> InvsyncResult<bool>;

    async fn scroll_into_view(&self, handle: &ElementHandle) -> InvsyncResult<()>;

    /// Current on-screen box, `None` once detached.
    async fn bounds(&self, handle: &ElementHandle) -> InvsyncResult<Option<BoundingBox>>;

    async fn dispatch(&self, handle: &ElementHandle, action: &UiAction) -> InvsyncResult<()>;

    async fn screenshot(&self) -> InvsyncResult<ScreenImage>;

    async fn pointer(&self, action: &PointerAction) -> InvsyncResult<()>;

    /// Current value of an input or select. Text entry and option selection
    /// are only considered complete once this reads back the intended value.
    async fn read_value(&self, handle: &ElementHandle) -> InvsyncResult<Option<String>>;

    /// Visible label of the selected option.
    async fn selected_label(&self, _handle: &ElementHandle) -> InvsyncResult<Option<String>> {
        Ok(None)
    }

    /// Value of the focused element, used after synthetic input.
    async fn focused_value(&self) -> InvsyncResult<Option<String>> {
        Ok(None)
    }

    /// Elements with a human-readable label, optionally filtered by role.
    async fn labeled_elements(&self, _role: Option<&str>) -> InvsyncResult<Vec<LabeledElement>> {
        Ok(Vec::new())
    }
}
