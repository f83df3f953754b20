use std::fmt;

use serde::{Deserialize, Serialize};

/// Structural description of a UI element.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "by", rename_all = "snake_case")]
pub enum Locator {
    Css { selector: String },
    XPath { expression: String },
    Role { role: String, name: Option<String> },
    Text { text: String },
    /// Resolved through the driver's label listing and the fuzzy matcher.
    FuzzyLabel { label: String, role: Option<String> },
}

impl Locator {
    pub fn css(selector: impl Into<String>) -> Self {
        Locator::Css {
            selector: selector.into(),
        }
    }

    pub fn xpath(expression: impl Into<String>) -> Self {
        Locator::XPath {
            expression: expression.into(),
        }
    }

    pub fn role(role: impl Into<String>, name: Option<&str>) -> Self {
        Locator::Role {
            role: role.into(),
            name: name.map(str::to_string),
        }
    }

    pub fn text(text: impl Into<String>) -> Self {
        Locator::Text { text: text.into() }
    }

    pub fn fuzzy_label(label: impl Into<String>, role: Option<&str>) -> Self {
        Locator::FuzzyLabel {
            label: label.into(),
            role: role.map(str::to_string),
        }
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Locator::Css { selector } => write!(f, "css={selector}"),
            Locator::XPath { expression } => write!(f, "xpath={expression}"),
            Locator::Role { role, name: Some(name) } => write!(f, "role={role}[name=\"{name}\"]"),
            Locator::Role { role, name: None } => write!(f, "role={role}"),
            Locator::Text { text } => write!(f, "text=\"{text}\""),
            Locator::FuzzyLabel { label, role: Some(role) } => write!(f, "label~=\"{label}\" role={role}"),
            Locator::FuzzyLabel { label, role: None } => write!(f, "label~=\"{label}\""),
        }
    }
}

/// Opaque driver-issued reference to a live element.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ElementHandle(pub String);

impl ElementHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn id(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ElementHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Element exposed to fuzzy label lookup.
#[derive(Debug, Clone, PartialEq)]
pub struct LabeledElement {
    pub handle: ElementHandle,
    pub label: String,
}

/// Action performed on a located element.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum UiAction {
    Click,
    SetValue { value: String, clear_first: bool },
    SelectOption { value: String },
}

impl UiAction {
    pub fn kind(&self) -> &'static str {
        match self {
            UiAction::Click => "click",
            UiAction::SetValue { .. } => "type",
            UiAction::SelectOption { .. } => "select",
        }
    }
}

/// Synthetic input at screen coordinates, used by the recognition path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PointerAction {
    Click { x: f64, y: f64 },
    /// Type into whatever currently has focus.
    TypeText { text: String, clear_first: bool },
}
