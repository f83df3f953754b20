pub mod fuzzy;

pub use fuzzy::{best_match, best_match_index, similarity, FuzzyMatch, DEFAULT_THRESHOLD};
