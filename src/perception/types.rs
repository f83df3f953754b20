use serde::{Deserialize, Serialize};

use crate::perception::screenshot::ScreenImage;

/// Axis-aligned box in screen pixels (origin top-left).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl BoundingBox {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self { x, y, width, height }
    }

    pub fn center(&self) -> (f64, f64) {
        (self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    /// Smallest box enclosing both.
    pub fn union(&self, other: &BoundingBox) -> BoundingBox {
        let x1 = self.x.min(other.x);
        let y1 = self.y.min(other.y);
        let x2 = (self.x + self.width).max(other.x + other.width);
        let y2 = (self.y + self.height).max(other.y + other.height);
        BoundingBox::new(x1, y1, x2 - x1, y2 - y1)
    }

    /// True when every edge moved by at most `tolerance` pixels.
    pub fn approx_eq(&self, other: &BoundingBox, tolerance: f64) -> bool {
        (self.x - other.x).abs() <= tolerance
            && (self.y - other.y).abs() <= tolerance
            && (self.width - other.width).abs() <= tolerance
            && (self.height - other.height).abs() <= tolerance
    }

    pub fn is_empty(&self) -> bool {
        self.width <= 0.0 || self.height <= 0.0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecognizedToken {
    pub text: String,
    /// 0.0–1.0 as reported by the recognition backend.
    pub confidence: f32,
    pub bbox: BoundingBox,
}

/// Output of one recognition pass over an image.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Recognition {
    pub text: String,
    pub tokens: Vec<RecognizedToken>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TextSearch {
    pub fuzzy: bool,
    /// 0–100, only used when `fuzzy` is set.
    pub threshold: f64,
}

impl Default for TextSearch {
    fn default() -> Self {
        Self {
            fuzzy: true,
            threshold: crate::matching::DEFAULT_THRESHOLD,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextMatch {
    pub found: bool,
    pub bbox: Option<BoundingBox>,
    pub matched_text: Option<String>,
    pub score: f64,
}

impl TextMatch {
    pub fn not_found() -> Self {
        Self {
            found: false,
            bbox: None,
            matched_text: None,
            score: 0.0,
        }
    }
}

/// What the recognition fallback looks for on screen.
#[derive(Debug, Clone)]
pub enum RecognitionTarget {
    Text { needle: String, search: TextSearch },
    Image { template: ScreenImage, min_score: f64 },
}

impl RecognitionTarget {
    /// Fuzzy text search with the default threshold.
    pub fn text(needle: impl Into<String>) -> Self {
        RecognitionTarget::Text {
            needle: needle.into(),
            search: TextSearch::default(),
        }
    }

    pub fn exact_text(needle: impl Into<String>) -> Self {
        RecognitionTarget::Text {
            needle: needle.into(),
            search: TextSearch {
                fuzzy: false,
                threshold: 100.0,
            },
        }
    }

    pub fn image(template: ScreenImage, min_score: f64) -> Self {
        RecognitionTarget::Image { template, min_score }
    }

    pub fn describe(&self) -> String {
        match self {
            RecognitionTarget::Text { needle, .. } => format!("text \"{needle}\""),
            RecognitionTarget::Image { template, .. } => {
                format!("image template {}x{}", template.width, template.height)
            }
        }
    }
}
