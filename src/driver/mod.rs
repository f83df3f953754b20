pub mod traits;
pub mod types;

pub use traits::UiDriver;
pub use types::{ElementHandle, LabeledElement, Locator, PointerAction, UiAction};
