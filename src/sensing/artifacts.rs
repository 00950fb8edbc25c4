use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use image::{ImageFormat, RgbImage};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    Raw,
    Annotated,
}

impl ArtifactKind {
    fn suffix(self) -> &'static str {
        match self {
            ArtifactKind::Raw => "raw",
            ArtifactKind::Annotated => "annotated",
        }
    }
}

/// `<dir>/slide_<YYYYmmdd_HHMMSS>_<kind>.jpg`
pub fn slide_path(dir: &Path, captured_at: DateTime<Utc>, kind: ArtifactKind) -> PathBuf {
    dir.join(format!(
        "slide_{}_{}.jpg",
        captured_at.format("%Y%m%d_%H%M%S"),
        kind.suffix()
    ))
}

/// Encodes `frame` as JPEG on a blocking worker.
pub async fn save_frame(frame: RgbImage, path: PathBuf) -> Result<PathBuf> {
    tokio::task::spawn_blocking(move || {
        frame
            .save_with_format(&path, ImageFormat::Jpeg)
            .with_context(|| format!("failed to write {}", path.display()))?;
        Ok(path)
    })
    .await
    .context("artifact writer join failed")?
}
