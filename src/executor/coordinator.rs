// Maps recognized regions to pointer coordinates.
use crate::perception::screenshot::ScreenImage;
use crate::perception::types::BoundingBox;

/// Centre of `bbox` in screen pixels, or `None` when the box is empty or
/// its centre falls outside the captured image.
pub fn pointer_target(bbox: &BoundingBox, screen: &ScreenImage) -> Option<(f64, f64)> {
    if bbox.is_empty() {
        return None;
    }
    let (x, y) = bbox.center();
    let inside_x = x >= 0.0 && (screen.width == 0 || x < screen.width as f64);
    let inside_y = y >= 0.0 && (screen.height == 0 || y < screen.height as f64);
    (inside_x && inside_y).then_some((x.round(), y.round()))
}
