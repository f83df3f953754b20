//! Edit-distance based fuzzy matching on a 0–100 scale.
//!
//! Three scores are computed on normalised input (lower-cased, punctuation
//! folded to spaces) and the best one wins:
//!   - ratio:         indel similarity of the whole strings
//!   - partial ratio: best ratio of the shorter string against equally long
//!                    windows of the longer one
//!   - token sort:    ratio after sorting whitespace-separated tokens

pub const DEFAULT_THRESHOLD: f64 = 70.0;

#[derive(Debug, Clone, PartialEq)]
pub struct FuzzyMatch<'a> {
    pub index: usize,
    pub value: &'a str,
    pub score: f64,
}

fn normalize(s: &str) -> String {
    let folded: String = s
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();
    folded.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn lcs_len(a: &[char], b: &[char]) -> usize {
    if a.is_empty() || b.is_empty() {
        return 0;
    }
    let mut prev = vec![0usize; b.len() + 1];
    let mut curr = vec![0usize; b.len() + 1];
    for &ca in a {
        for (j, &cb) in b.iter().enumerate() {
            curr[j + 1] = if ca == cb {
                prev[j] + 1
            } else {
                curr[j].max(prev[j + 1])
            };
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b.len()]
}

fn indel_ratio(a: &[char], b: &[char]) -> f64 {
    let total = a.len() + b.len();
    if total == 0 {
        return 100.0;
    }
    200.0 * lcs_len(a, b) as f64 / total as f64
}

fn partial_ratio(a: &[char], b: &[char]) -> f64 {
    let (short, long) = if a.len() <= b.len() { (a, b) } else { (b, a) };
    if short.is_empty() {
        return if long.is_empty() { 100.0 } else { 0.0 };
    }
    let mut best = 0.0f64;
    for window in long.windows(short.len()) {
        let score = indel_ratio(short, window);
        if score > best {
            best = score;
            if best >= 100.0 {
                break;
            }
        }
    }
    best
}

fn token_sort(s: &str) -> Vec<char> {
    let mut tokens: Vec<&str> = s.split_whitespace().collect();
    tokens.sort_unstable();
    tokens.join(" ").chars().collect()
}

/// Best of the three scores for a pair of raw strings.
pub fn similarity(a: &str, b: &str) -> f64 {
    let na = normalize(a);
    let nb = normalize(b);
    let ca: Vec<char> = na.chars().collect();
    let cb: Vec<char> = nb.chars().collect();

    let ratio = indel_ratio(&ca, &cb);
    let partial = partial_ratio(&ca, &cb);
    let sorted = indel_ratio(&token_sort(&na), &token_sort(&nb));
    ratio.max(partial).max(sorted)
}

/// Highest scoring candidate at or above `threshold`. Ties keep the earliest
/// candidate, so identical inputs always give identical output.
pub fn best_match<'a, S: AsRef<str>>(
    target: &str,
    candidates: &'a [S],
    threshold: f64,
) -> Option<FuzzyMatch<'a>> {
    let mut best: Option<FuzzyMatch<'a>> = None;
    for (index, candidate) in candidates.iter().enumerate() {
        let value = candidate.as_ref();
        let score = similarity(target, value);
        if best.as_ref().map_or(true, |b| score > b.score) {
            best = Some(FuzzyMatch { index, value, score });
        }
    }
    match best {
        Some(m) if m.score >= threshold => {
            tracing::trace!(needle = target, matched = m.value, score = m.score, "fuzzy match");
            Some(m)
        }
        _ => None,
    }
}

pub fn best_match_index<S: AsRef<str>>(target: &str, candidates: &[S], threshold: f64) -> Option<usize> {
    best_match(target, candidates, threshold).map(|m| m.index)
}
