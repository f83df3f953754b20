use async_trait::async_trait;

use crate::errors::InvsyncResult;
use crate::matching;
use crate::perception::screenshot::ScreenImage;
use crate::perception::types::{BoundingBox, Recognition, RecognizedToken, TextMatch, TextSearch};

/// Screen-text recognition backend used by the recognition fallback.
/// Implementations only have to provide `recognize`.
#[async_trait]
pub trait TextRecognizer: Send + Sync {
    async fn recognize(&self, image: &ScreenImage) -> InvsyncResult<Recognition>;

    /// Find `needle` among recognized tokens and runs of adjacent tokens.
    async fn find_text(
        &self,
        image: &ScreenImage,
        needle: &str,
        search: TextSearch,
    ) -> InvsyncResult<TextMatch> {
        let recognition = self.recognize(image).await?;
        Ok(locate_text(&recognition.tokens, needle, search))
    }
}

/// One token or a run of adjacent tokens.
struct Phrase {
    text: String,
    bbox: BoundingBox,
}

fn phrases(tokens: &[RecognizedToken], words: usize) -> Vec<Phrase> {
    let mut out = Vec::new();
    for len in (1..=words.max(1)).rev() {
        for window in tokens.windows(len) {
            let text = window
                .iter()
                .map(|t| t.text.trim())
                .collect::<Vec<_>>()
                .join(" ");
            let bbox = window[1..]
                .iter()
                .fold(window[0].bbox, |acc, t| acc.union(&t.bbox));
            out.push(Phrase { text, bbox });
        }
    }
    out
}

/// Matching used by the default `find_text`. Exact (case-insensitive)
/// phrase equality wins outright; otherwise the fuzzy matcher picks among
/// single tokens and runs with the needle's word count.
pub fn locate_text(tokens: &[RecognizedToken], needle: &str, search: TextSearch) -> TextMatch {
    let needle = collapse(needle);
    if needle.is_empty() || tokens.is_empty() {
        return TextMatch::not_found();
    }

    let words = needle.split(' ').count();
    let candidates = phrases(tokens, words);

    let wanted = needle.to_lowercase();
    if let Some(hit) = candidates.iter().find(|p| collapse(&p.text).to_lowercase() == wanted) {
        return TextMatch {
            found: true,
            bbox: Some(hit.bbox),
            matched_text: Some(hit.text.clone()),
            score: 100.0,
        };
    }

    if !search.fuzzy {
        return TextMatch::not_found();
    }

    let texts: Vec<&str> = candidates.iter().map(|p| p.text.as_str()).collect();
    match matching::best_match(&needle, &texts, search.threshold) {
        Some(m) => TextMatch {
            found: true,
            bbox: Some(candidates[m.index].bbox),
            matched_text: Some(m.value.to_string()),
            score: m.score,
        },
        None => TextMatch::not_found(),
    }
}

fn collapse(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
