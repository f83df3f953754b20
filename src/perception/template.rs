//! Image-template matching for the recognition fallback.
//!
//! Both images are decoded, converted to grayscale and, for large screens,
//! downscaled by an integer factor. A coarse scan followed by a local refine
//! finds the position with the lowest mean absolute difference.
use image::imageops::FilterType;
use image::GrayImage;

use crate::errors::InvsyncResult;
use crate::perception::screenshot::ScreenImage;
use crate::perception::types::BoundingBox;

/// Longest haystack edge scanned at full detail.
const MAX_SCAN_EDGE: u32 = 640;

#[derive(Debug, Clone, PartialEq)]
pub struct TemplateMatch {
    pub bbox: BoundingBox,
    /// 0.0–1.0, 1.0 is a pixel-exact match.
    pub score: f64,
}

/// Locate `template` inside `haystack`. CPU bound; call from a blocking thread.
pub fn find_template(
    haystack: &ScreenImage,
    template: &ScreenImage,
    min_score: f64,
) -> InvsyncResult<Option<TemplateMatch>> {
    let hay = haystack.decode()?.to_luma8();
    let tpl = template.decode()?.to_luma8();

    if tpl.width() == 0 || tpl.height() == 0 || tpl.width() > hay.width() || tpl.height() > hay.height() {
        return Ok(None);
    }

    // Decoded size, not the capture metadata, defines the match box.
    let (tpl_w, tpl_h) = (tpl.width(), tpl.height());
    let factor = (hay.width().max(hay.height()) + MAX_SCAN_EDGE - 1) / MAX_SCAN_EDGE;
    let factor = factor.max(1).min(tpl.width()).min(tpl.height());
    let (hay_s, tpl_s) = if factor > 1 {
        (
            image::imageops::resize(&hay, hay.width() / factor, hay.height() / factor, FilterType::Triangle),
            image::imageops::resize(&tpl, (tpl.width() / factor).max(1), (tpl.height() / factor).max(1), FilterType::Triangle),
        )
    } else {
        (hay, tpl)
    };

    let Some((x, y, sad)) = scan(&hay_s, &tpl_s) else {
        return Ok(None);
    };

    let pixels = (tpl_s.width() * tpl_s.height()) as f64;
    let score = 1.0 - sad as f64 / (pixels * 255.0);
    tracing::debug!(x, y, score, factor, "template scan finished");

    if score < min_score {
        return Ok(None);
    }

    let f = factor as f64;
    Ok(Some(TemplateMatch {
        bbox: BoundingBox::new(
            x as f64 * f,
            y as f64 * f,
            tpl_w as f64,
            tpl_h as f64,
        ),
        score,
    }))
}

/// Sum of absolute differences at (x, y), abandoning once `limit` is passed.
fn sad_at(hay: &GrayImage, tpl: &GrayImage, x: u32, y: u32, limit: u64) -> u64 {
    let mut total = 0u64;
    for ty in 0..tpl.height() {
        for tx in 0..tpl.width() {
            let a = hay.get_pixel(x + tx, y + ty).0[0] as i32;
            let b = tpl.get_pixel(tx, ty).0[0] as i32;
            total += (a - b).unsigned_abs() as u64;
        }
        if total > limit {
            return total;
        }
    }
    total
}

fn scan(hay: &GrayImage, tpl: &GrayImage) -> Option<(u32, u32, u64)> {
    if tpl.width() > hay.width() || tpl.height() > hay.height() {
        return None;
    }
    let max_x = hay.width() - tpl.width();
    let max_y = hay.height() - tpl.height();
    let step = (tpl.width().min(tpl.height()) / 4).max(1);

    let mut best: Option<(u32, u32, u64)> = None;
    let consider = |x: u32, y: u32, best: &mut Option<(u32, u32, u64)>| {
        let limit = best.map_or(u64::MAX, |b| b.2);
        let sad = sad_at(hay, tpl, x, y, limit);
        if best.map_or(true, |b| sad < b.2) {
            *best = Some((x, y, sad));
        }
    };

    let mut y = 0;
    while y <= max_y {
        let mut x = 0;
        while x <= max_x {
            consider(x, y, &mut best);
            x += step;
        }
        y += step;
    }

    if step > 1 {
        if let Some((bx, by, _)) = best {
            for y in by.saturating_sub(step)..=(by + step).min(max_y) {
                for x in bx.saturating_sub(step)..=(bx + step).min(max_x) {
                    consider(x, y, &mut best);
                }
            }
        }
    }
    best
}
