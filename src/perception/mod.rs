pub mod screenshot;
pub mod stability;
pub mod template;
pub mod traits;
pub mod types;

pub use screenshot::{ScreenImage, SnapshotStore};
pub use traits::TextRecognizer;
pub use types::{BoundingBox, Recognition, RecognitionTarget, RecognizedToken, TextMatch, TextSearch};
