// Screen images and failure snapshot persistence.
use std::path::{Path, PathBuf};

use base64::Engine as _;

use crate::errors::{InvsyncError, InvsyncResult};

/// Encoded (PNG or JPEG) screen capture as handed over by the UI driver.
#[derive(Debug, Clone, PartialEq)]
pub struct ScreenImage {
    pub bytes: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub captured_at: chrono::DateTime<chrono::Utc>,
}

impl ScreenImage {
    pub fn new(bytes: Vec<u8>, width: u32, height: u32) -> Self {
        Self {
            bytes,
            width,
            height,
            captured_at: chrono::Utc::now(),
        }
    }

    /// Encode an in-memory RGBA buffer as PNG.
    pub fn from_rgba(image: &image::RgbaImage) -> InvsyncResult<Self> {
        let mut png = Vec::new();
        image.write_to(&mut std::io::Cursor::new(&mut png), image::ImageFormat::Png)?;
        Ok(Self::new(png, image.width(), image.height()))
    }

    pub fn decode(&self) -> InvsyncResult<image::DynamicImage> {
        Ok(image::load_from_memory(&self.bytes)?)
    }

    pub fn to_base64(&self) -> String {
        base64::engine::general_purpose::STANDARD.encode(&self.bytes)
    }

    fn extension(&self) -> &'static str {
        match image::guess_format(&self.bytes) {
            Ok(image::ImageFormat::Png) => "png",
            Ok(image::ImageFormat::Jpeg) => "jpg",
            Ok(image::ImageFormat::WebP) => "webp",
            _ => "bin",
        }
    }
}

/// Writes failure snapshots to a directory, one file per capture.
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    dir: PathBuf,
}

impl SnapshotStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Persist `image` as `<utc>_<label>_<id>.<ext>` and return its path.
    pub async fn save(&self, image: &ScreenImage, label: &str) -> InvsyncResult<PathBuf> {
        tokio::fs::create_dir_all(&self.dir).await.map_err(|e| {
            InvsyncError::Snapshot(format!("create {}: {e}", self.dir.display()))
        })?;

        let id = uuid::Uuid::new_v4().simple().to_string();
        let file_name = format!(
            "{}_{}_{}.{}",
            image.captured_at.format("%Y%m%dT%H%M%S%.3fZ"),
            sanitize(label),
            &id[..8],
            image.extension()
        );
        let path = self.dir.join(file_name);
        tokio::fs::write(&path, &image.bytes).await?;
        tracing::debug!(path = %path.display(), "snapshot saved");
        Ok(path)
    }
}

/// Keeps ASCII alphanumerics, maps everything else to `_`, caps the length.
fn sanitize(label: &str) -> String {
    let cleaned: String = label
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '_' })
        .take(48)
        .collect();
    let trimmed = cleaned.trim_matches('_');
    if trimmed.is_empty() {
        "action".to_string()
    } else {
        trimmed.to_string()
    }
}

/// `<local data dir>/invsync/snapshots`, falling back to the working directory.
pub fn default_snapshot_dir() -> PathBuf {
    if let Some(base) = dirs::data_local_dir() {
        return base.join("invsync").join("snapshots");
    }
    std::env::current_dir()
        .unwrap_or_else(|_| PathBuf::from("."))
        .join("snapshots")
}
